use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::config::UploadConfig;
use crate::error::ApiError;
use crate::models::UploadReceipt;
use crate::utils::LogThrottle;

/// Highest percent reported while the server has not confirmed the upload.
pub const MAX_UNCONFIRMED_PERCENT: u8 = 99;

/// What one upload reports, in order: transport ticks, a single `Confirmed`
/// when the server accepted the file, cosmetic `Smoothing` frames, then
/// `Completed`. A failure ends the stream with `Failed` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Progress(u8),
    Confirmed(UploadReceipt),
    Smoothing(u8),
    Completed,
    Failed(ApiError),
}

impl UploadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadEvent::Completed | UploadEvent::Failed(_))
    }
}

/// `floor(sent / total * 100)`, held below 100 until the server answers.
pub fn transfer_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (u128::from(sent.min(total)) * 100 / u128::from(total)) as u8;
    percent.min(MAX_UNCONFIRMED_PERCENT)
}

/// Sending half of an upload's event stream.
///
/// Transport ticks are deduplicated against the highest percent already
/// reported, so a retried transfer starting again from zero never moves the
/// displayed value backwards.
#[derive(Clone)]
pub struct UploadEvents {
    inner: Arc<EventsInner>,
}

struct EventsInner {
    tx: mpsc::UnboundedSender<UploadEvent>,
    last_real: AtomicU8,
    key: String,
    throttle: Arc<LogThrottle>,
}

impl UploadEvents {
    pub fn channel(
        key: impl Into<String>,
        throttle: Arc<LogThrottle>,
    ) -> (UploadEvents, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = UploadEvents {
            inner: Arc::new(EventsInner {
                tx,
                last_real: AtomicU8::new(0),
                key: key.into(),
                throttle,
            }),
        };
        (events, rx)
    }

    /// Highest transport-reported percent so far.
    pub fn last_real(&self) -> u8 {
        self.inner.last_real.load(Ordering::SeqCst)
    }

    pub fn transfer(&self, sent: u64, total: u64) {
        let percent = transfer_percent(sent, total);
        let previous = self.inner.last_real.fetch_max(percent, Ordering::SeqCst);
        if percent <= previous {
            return;
        }
        if let Some(suppressed_count) = self.inner.throttle.should_emit(&self.inner.key) {
            debug!(
                event_name = "upload.progress",
                event_domain = "upload",
                task = self.inner.key.as_str(),
                percent,
                sent,
                total,
                suppressed_count,
                "upload progress"
            );
        }
        self.emit(UploadEvent::Progress(percent));
    }

    pub fn confirmed(&self, receipt: UploadReceipt) {
        self.emit(UploadEvent::Confirmed(receipt));
    }

    pub fn smoothing(&self, percent: u8) {
        self.emit(UploadEvent::Smoothing(percent));
    }

    pub fn completed(&self) {
        self.inner.throttle.forget(&self.inner.key);
        self.emit(UploadEvent::Completed);
    }

    pub fn failed(&self, error: ApiError) {
        self.inner.throttle.forget(&self.inner.key);
        self.emit(UploadEvent::Failed(error));
    }

    fn emit(&self, event: UploadEvent) {
        // A closed receiver means nobody renders this upload any more.
        let _ = self.inner.tx.send(event);
    }
}

/// Cosmetic ramp from the last real percent up to 100.
///
/// Purely a function of elapsed animation time; it is only ever planned
/// after the server confirmed the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingPlan {
    pub from: u8,
    pub duration: Duration,
}

impl SmoothingPlan {
    /// Stretches the ramp so the whole upload lasts at least
    /// `min_visible`, but never animates for less than `min_animation`.
    pub fn new(last_real: u8, transfer_elapsed: Duration, config: &UploadConfig) -> Self {
        let duration = config
            .min_visible()
            .saturating_sub(transfer_elapsed)
            .max(config.min_animation());
        SmoothingPlan {
            from: last_real.min(100),
            duration,
        }
    }

    pub fn percent_at(&self, elapsed: Duration) -> u8 {
        if self.duration.is_zero() || elapsed >= self.duration {
            return 100;
        }
        let span = f64::from(100 - self.from);
        let fraction = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        (f64::from(self.from) + span * fraction).floor().min(100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_visible_ms: u64, min_animation_ms: u64) -> UploadConfig {
        UploadConfig {
            min_visible_ms,
            min_animation_ms,
            ..UploadConfig::default()
        }
    }

    #[test]
    fn transfer_percent_floors_and_caps() {
        assert_eq!(transfer_percent(0, 0), 0);
        assert_eq!(transfer_percent(1, 3), 33);
        assert_eq!(transfer_percent(999, 1000), 99);
        assert_eq!(transfer_percent(1000, 1000), MAX_UNCONFIRMED_PERCENT);
        assert_eq!(transfer_percent(5000, 1000), MAX_UNCONFIRMED_PERCENT);
    }

    #[test]
    fn fast_upload_is_stretched_to_minimum_duration() {
        let plan = SmoothingPlan::new(40, Duration::from_millis(200), &config(1200, 300));
        assert_eq!(plan.duration, Duration::from_millis(1000));
        assert_eq!(plan.percent_at(Duration::ZERO), 40);
        assert_eq!(plan.percent_at(Duration::from_millis(500)), 70);
        assert_eq!(plan.percent_at(Duration::from_millis(1000)), 100);
    }

    #[test]
    fn slow_upload_still_gets_the_animation_floor() {
        let plan = SmoothingPlan::new(99, Duration::from_secs(5), &config(1200, 300));
        assert_eq!(plan.duration, Duration::from_millis(300));
    }

    #[test]
    fn ramp_is_monotonic_and_never_leaps() {
        let plan = SmoothingPlan::new(0, Duration::from_millis(200), &config(1200, 300));
        let mut previous = plan.percent_at(Duration::ZERO);
        let mut t = Duration::ZERO;
        while t <= plan.duration {
            t += Duration::from_millis(16);
            let current = plan.percent_at(t);
            assert!(current >= previous);
            assert!(current - previous <= 3, "jumped {} -> {}", previous, current);
            previous = current;
        }
        assert_eq!(previous, 100);
    }

    #[tokio::test]
    async fn retried_transfer_does_not_move_backwards() {
        let (events, mut rx) =
            UploadEvents::channel("t", Arc::new(LogThrottle::new(Duration::from_secs(1))));
        events.transfer(50, 100);
        events.transfer(10, 100);
        events.transfer(60, 100);
        drop(events);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        assert_eq!(seen, vec![UploadEvent::Progress(50), UploadEvent::Progress(60)]);
    }
}
