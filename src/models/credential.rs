use std::fmt;

use http::HeaderValue;

/// Opaque bearer string authorizing API calls.
///
/// `Debug` never prints the value, so credentials can sit in structs that
/// end up in log lines.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessCredential(String);

impl AccessCredential {
    pub fn new(token: impl Into<String>) -> Self {
        AccessCredential(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// The bearer as a header value; `None` when the token holds bytes a
    /// header cannot carry, such as control characters.
    pub fn header_value(&self) -> Option<HeaderValue> {
        let mut value = HeaderValue::from_str(&self.bearer()).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessCredential(<redacted>)")
    }
}

impl From<String> for AccessCredential {
    fn from(token: String) -> Self {
        AccessCredential(token)
    }
}

impl From<&str> for AccessCredential {
    fn from(token: &str) -> Self {
        AccessCredential(token.to_string())
    }
}
