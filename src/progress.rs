//! Progress reporting for model acquisition
//!
//! First-time model loading downloads weights and builds an inference
//! session, which can take long enough that callers want feedback. Anything
//! implementing [`ProgressSink`] can receive percentage updates; plain
//! closures qualify through a blanket impl.

/// Receives percentage updates in `0..=100` during model acquisition
///
/// Sequences delivered to a sink are monotonically non-decreasing, each
/// value arrives at most once, and `100` arrives exactly once per successful
/// initialization.
pub trait ProgressSink: Send + Sync {
    /// Handle one percentage update
    fn on_progress(&self, percent: u8);
}

/// Sink that discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn on_progress(&self, _percent: u8) {}
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        self(percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_noop_sink_accepts_updates() {
        let sink = NoOpProgress;
        sink.on_progress(0);
        sink.on_progress(50);
        sink.on_progress(100);
    }

    #[test]
    fn test_closure_as_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |percent: u8| seen.lock().unwrap().push(percent);

        let as_trait: &dyn ProgressSink = &sink;
        as_trait.on_progress(10);
        as_trait.on_progress(100);

        assert_eq!(*seen.lock().unwrap(), vec![10, 100]);
    }
}
