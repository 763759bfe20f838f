use std::sync::Arc;

use taxtracker::config::{config_from_yaml, ConfigV1};
use taxtracker::state::AppState;

/// Config pointing every endpoint at `base_url`, with a short smoothing ramp.
pub fn build_config(base_url: &str) -> ConfigV1 {
    let yaml = format!(
        r#"
version: "1.0.0"
api:
  base_url: "{base_url}"
  login_url: "https://idp.example.com/login"
  logout_url: "https://idp.example.com/logout"
upload:
  min_visible_ms: 40
  min_animation_ms: 20
  frame_interval_ms: 5
logging:
  level: "warn"
  format: "json"
"#
    );
    config_from_yaml(&yaml).expect("Failed to parse integration test config")
}

pub fn build_state(config: ConfigV1) -> AppState {
    AppState::build(Arc::new(config)).expect("state should build")
}
