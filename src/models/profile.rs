use serde::{Deserialize, Serialize};

/// Identity returned by `GET /auth/me`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub gender: Option<String>,
}

impl UserProfile {
    /// Best label for display: username, then email.
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("unknown user")
    }
}
