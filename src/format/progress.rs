//! Synchronous progress reporting for decode and encode.

use std::fmt;
use std::sync::Arc;

/// A progress notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Completed fraction in `[0, 1]`.
    pub fraction: f64,
    /// Short description of the running operation.
    pub text: String,
}

/// Callback receiving progress events on the calling thread.
pub type ProgressObserver = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Fan-out of progress events to registered observers.
#[derive(Clone, Default)]
pub struct Progress {
    observers: Vec<ProgressObserver>,
    text: String,
}

impl Progress {
    /// Progress with no observers; reporting is a no-op.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn with_observers(observers: Vec<ProgressObserver>) -> Self {
        Self {
            observers,
            text: String::new(),
        }
    }

    /// Set the text attached to subsequent events.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn add_observer(&mut self, observer: ProgressObserver) {
        self.observers.push(observer);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    /// Notify every observer. `fraction` is clamped to `[0, 1]`.
    pub fn report(&self, fraction: f64) {
        if self.observers.is_empty() {
            return;
        }
        let event = ProgressEvent {
            fraction: fraction.clamp(0.0, 1.0),
            text: self.text.clone(),
        };
        for observer in &self.observers {
            observer(&event);
        }
    }

    /// Report `done` out of `total` steps.
    pub fn report_step(&self, done: usize, total: usize) {
        if total == 0 {
            self.report(1.0);
        } else {
            self.report(done as f64 / total as f64);
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("observers", &self.observers.len())
            .field("text", &self.text)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_observers_receive_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut progress = Progress::silent().with_text("Reading");
        progress.add_observer(Arc::new(move |event: &ProgressEvent| {
            sink.lock().push(event.clone());
        }));

        progress.report_step(1, 4);
        progress.report(2.0);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].fraction, 0.25);
        assert_eq!(seen[0].text, "Reading");
        assert_eq!(seen[1].fraction, 1.0);
    }

    #[test]
    fn test_silent_progress() {
        let progress = Progress::silent();
        assert!(!progress.has_observers());
        progress.report(0.5);
    }
}
