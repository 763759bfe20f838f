use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Externally supplied endpoints. All three are treated as opaque strings.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ApiConfig {
    /// Origin of the receipt service, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Where the identity provider login flow starts.
    pub login_url: String,
    /// Where the identity provider logout flow starts.
    pub logout_url: String,
}

impl ApiConfig {
    /// Joins `path` onto the base origin. Absolute URLs pass through unchanged.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
