use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    suppressed: u64,
}

/// Rate-limits log lines per key, counting what it held back.
///
/// Each key gets its own window: the first event in a window is emitted,
/// later ones are suppressed until `interval` has passed.
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Some(suppressed_count)` when a log for `key` should be emitted,
    /// otherwise `None` and the event is counted as suppressed for the active window.
    pub fn should_emit(&self, key: &str) -> Option<u64> {
        self.should_emit_at(key, Instant::now())
    }

    fn should_emit_at(&self, key: &str, now: Instant) -> Option<u64> {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match windows.get_mut(key) {
            Some(window) if now.duration_since(window.opened_at) >= self.interval => {
                let suppressed = window.suppressed;
                window.opened_at = now;
                window.suppressed = 0;
                Some(suppressed)
            }
            Some(window) => {
                window.suppressed += 1;
                None
            }
            None => {
                windows.insert(
                    key.to_string(),
                    Window {
                        opened_at: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }

    /// Drops the window for `key`, e.g. once an upload has finished.
    pub fn forget(&self, key: &str) {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }
}
