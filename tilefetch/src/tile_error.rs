//! Per-tile failure escalation for providers.
//!
//! A provider keeps one [`TileProviderError`] per logical operation and threads
//! it back through [`TileProviderError::report_error`] on every failure of that
//! operation. The record counts repeat failures and lets listeners ask for a
//! retry by setting [`TileProviderError::retry`].

use std::fmt;

use tracing::warn;

use crate::error::FetchError;
use crate::event::Event;

/// `times_retried` after [`TileProviderError::report_success`].
pub const SUCCEEDED: i32 = -1;

/// Context of one failure, fed into [`TileProviderError::report_error`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileFailure {
    pub provider: Option<String>,
    pub message: String,
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub level: Option<u32>,
    pub error: Option<FetchError>,
}

impl TileFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn tile(mut self, x: u32, y: u32, level: u32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self.level = Some(level);
        self
    }

    pub fn error(mut self, error: FetchError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Escalation record for a provider operation that keeps failing.
#[derive(Debug, Clone, PartialEq)]
pub struct TileProviderError {
    pub provider: Option<String>,
    pub message: String,
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub level: Option<u32>,
    /// `-1` after a success, `0` on a first failure, `n` on the nth repeat.
    pub times_retried: i32,
    /// Set by listeners to ask for another attempt. Last writer wins.
    pub retry: bool,
    pub error: Option<FetchError>,
}

impl TileProviderError {
    fn from_failure(failure: TileFailure) -> Self {
        Self {
            provider: failure.provider,
            message: failure.message,
            x: failure.x,
            y: failure.y,
            level: failure.level,
            times_retried: 0,
            retry: false,
            error: failure.error,
        }
    }

    /// Records a failure and notifies listeners.
    ///
    /// With no `previous` record a new one starts at `times_retried == 0`.
    /// Otherwise the previous record is updated in place: its context is
    /// replaced, `retry` is cleared and `times_retried` goes up by one.
    ///
    /// Listeners run synchronously and may set `retry`. When nobody listens
    /// and the failure names a provider, it is logged instead. The returned
    /// record must be passed back on the next failure of the same operation.
    pub fn report_error(
        previous: Option<TileProviderError>,
        event: Option<&Event<TileProviderError>>,
        failure: TileFailure,
    ) -> TileProviderError {
        let mut record = match previous {
            None => Self::from_failure(failure),
            Some(mut record) => {
                record.provider = failure.provider;
                record.message = failure.message;
                record.x = failure.x;
                record.y = failure.y;
                record.level = failure.level;
                record.error = failure.error;
                record.retry = false;
                record.times_retried += 1;
                record
            }
        };

        match event {
            Some(event) if event.number_of_listeners() > 0 => event.raise_event(&mut record),
            _ => {
                if let Some(provider) = &record.provider {
                    warn!(
                        provider = %provider,
                        x = ?record.x,
                        y = ?record.y,
                        level = ?record.level,
                        times_retried = record.times_retried,
                        "{}",
                        record.message
                    );
                }
            }
        }

        record
    }

    /// Marks the operation as recovered. A later failure counts as a first one.
    pub fn report_success(previous: Option<&mut TileProviderError>) {
        if let Some(record) = previous {
            record.times_retried = SUCCEEDED;
        }
    }
}

impl fmt::Display for TileProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "{provider}: ")?;
        }
        f.write_str(&self.message)?;
        if let (Some(x), Some(y), Some(level)) = (self.x, self.y, self.level) {
            write!(f, " (tile {x},{y} level {level})")?;
        }
        Ok(())
    }
}

impl std::error::Error for TileProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use proptest::prelude::*;

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    /// Runs `f` with a subscriber writing into the returned buffer.
    fn capture_logs(f: impl FnOnce()) -> String {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        log.text()
    }

    fn failure() -> TileFailure {
        TileFailure::new("tile failed")
            .provider("ArcGIS")
            .tile(1, 2, 3)
            .error(FetchError::Status {
                url: "http://x/3/2/1".to_string(),
                status: 503,
            })
    }

    #[test]
    fn test_unobserved_failure_is_logged() {
        let output = capture_logs(|| {
            TileProviderError::report_error(None, None, failure());
        });
        assert!(output.contains("WARN"));
        assert!(output.contains("tile failed"));
        assert!(output.contains("ArcGIS"));
    }

    #[test]
    fn test_observed_or_anonymous_failure_is_not_logged() {
        let event = Event::new();
        event.add_event_listener(|_: &mut TileProviderError| {});
        let output = capture_logs(|| {
            TileProviderError::report_error(None, Some(&event), failure());
            TileProviderError::report_error(None, None, TileFailure::new("no provider"));
        });
        assert!(output.is_empty(), "unexpected log output: {}", output);
    }

    #[test]
    fn test_first_failure_counts_zero() {
        let record = TileProviderError::report_error(None, None, failure());
        assert_eq!(record.times_retried, 0);
        assert!(!record.retry);
        assert_eq!(record.level, Some(3));
    }

    #[test]
    fn test_repeat_failure_increments() {
        let first = TileProviderError::report_error(None, None, failure());
        let second = TileProviderError::report_error(Some(first), None, failure());
        assert_eq!(second.times_retried, 1);
    }

    #[test]
    fn test_success_then_failure_restarts_streak() {
        let mut record = TileProviderError::report_error(None, None, failure());
        record = TileProviderError::report_error(Some(record), None, failure());
        TileProviderError::report_success(Some(&mut record));
        assert_eq!(record.times_retried, SUCCEEDED);

        let record = TileProviderError::report_error(Some(record), None, failure());
        assert_eq!(record.times_retried, 0);
    }

    #[test]
    fn test_report_success_without_record_is_noop() {
        TileProviderError::report_success(None);
    }

    #[test]
    fn test_update_replaces_context_and_clears_retry() {
        let mut record = TileProviderError::report_error(None, None, failure());
        record.retry = true;

        let record = TileProviderError::report_error(
            Some(record),
            None,
            TileFailure::new("second").tile(9, 9, 9),
        );

        assert!(!record.retry);
        assert_eq!(record.message, "second");
        assert_eq!(record.provider, None);
        assert_eq!(record.x, Some(9));
        assert_eq!(record.error, None);
    }

    #[test]
    fn test_listeners_last_writer_wins() {
        let event = Event::new();
        event.add_event_listener(|record: &mut TileProviderError| record.retry = true);
        event.add_event_listener(|record: &mut TileProviderError| record.retry = false);

        let record = TileProviderError::report_error(None, Some(&event), failure());
        assert!(!record.retry);
    }

    #[test]
    fn test_listener_sees_count() {
        let event = Event::new();
        event.add_event_listener(|record: &mut TileProviderError| {
            record.retry = record.times_retried < 2;
        });

        let mut record = TileProviderError::report_error(None, Some(&event), failure());
        assert!(record.retry);
        record = TileProviderError::report_error(Some(record), Some(&event), failure());
        assert!(record.retry);
        record = TileProviderError::report_error(Some(record), Some(&event), failure());
        assert!(!record.retry);
    }

    #[test]
    fn test_display() {
        let record = TileProviderError::report_error(None, None, failure());
        assert_eq!(record.to_string(), "ArcGIS: tile failed (tile 1,2 level 3)");
    }

    proptest! {
        #[test]
        fn prop_count_tracks_current_streak(outcomes in proptest::collection::vec(any::<bool>(), 1..40)) {
            let mut record: Option<TileProviderError> = None;
            let mut streak = 0i32;

            for failed in outcomes {
                if failed {
                    record = Some(TileProviderError::report_error(record.take(), None, failure()));
                    streak += 1;
                    prop_assert_eq!(record.as_ref().map(|r| r.times_retried), Some(streak - 1));
                } else {
                    TileProviderError::report_success(record.as_mut());
                    streak = 0;
                }
            }
        }

        #[test]
        fn prop_fresh_record_always_zero(x in 0u32..1024, y in 0u32..1024, level in 0u32..23) {
            let record = TileProviderError::report_error(
                None,
                None,
                TileFailure::new("m").tile(x, y, level),
            );
            prop_assert_eq!(record.times_retried, 0);
        }
    }
}
