//! Aggregate request/receive counters.

/// Monotonic outcome counters. Values only ever grow until [`Statistics::reset`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    frames_received: u32,
    no_answer: u32,
    partial_failure: u32,
    rx_success: u32,
}

impl Statistics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames_received: 0,
            no_answer: 0,
            partial_failure: 0,
            rx_success: 0,
        }
    }

    /// Frames that passed the radio integrity check.
    #[must_use]
    pub const fn frames_received(&self) -> u32 {
        self.frames_received
    }

    /// Requests that never produced a single fragment.
    #[must_use]
    pub const fn no_answer(&self) -> u32 {
        self.no_answer
    }

    /// Requests that produced fragments but never assembled.
    #[must_use]
    pub const fn partial_failure(&self) -> u32 {
        self.partial_failure
    }

    /// Payloads assembled successfully.
    #[must_use]
    pub const fn rx_success(&self) -> u32 {
        self.rx_success
    }

    pub fn record_frame(&mut self) {
        self.frames_received = self.frames_received.saturating_add(1);
    }

    pub fn record_no_answer(&mut self) {
        self.no_answer = self.no_answer.saturating_add(1);
    }

    pub fn record_partial_failure(&mut self) {
        self.partial_failure = self.partial_failure.saturating_add(1);
    }

    pub fn record_success(&mut self) {
        self.rx_success = self.rx_success.saturating_add(1);
    }

    /// Clears every counter. Only called on a full system reset.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
