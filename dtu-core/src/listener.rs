//! Notification hooks for publishing collaborators.

/// Receives the polling core's outward notifications.
///
/// Every method defaults to a no-op so a publisher only implements the hooks
/// it cares about. Calls happen synchronously from the main loop and must
/// return quickly.
pub trait DtuListener {
    /// A payload for `slot` was assembled.
    fn payload_ready(&mut self, _slot: usize) {}

    fn sun_window_changed(&mut self, _sunrise: u32, _sunset: u32) {}

    fn sunrise(&mut self, _timestamp: u32) {}

    fn sunset(&mut self, _timestamp: u32) {}

    fn second_tick(&mut self, _timestamp: u32) {}

    fn minute_tick(&mut self, _timestamp: u32) {}
}

/// Listener that ignores every notification.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoListener;

impl DtuListener for NoListener {}
