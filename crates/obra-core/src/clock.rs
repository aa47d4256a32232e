use chrono::Local;

/// Source of the timestamp label stamped on every appended message.
pub trait Clock: Send {
    /// Current local time as a short 12-hour label, e.g. `03:45 PM`.
    fn now_label(&self) -> String;
}

/// Wall clock in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now_label(&self) -> String {
        Local::now().format("%I:%M %p").to_string()
    }
}

/// Always returns the same label. Used by tests and transcript fixtures.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl FixedClock {
    pub fn new(label: &str) -> Self {
        Self(label.to_string())
    }
}

impl Clock for FixedClock {
    fn now_label(&self) -> String {
        self.0.clone()
    }
}
