use std::sync::atomic::{AtomicBool, Ordering};

/// One-slot marker for the frame awaiting a reply.
///
/// Set when a frame is handed to the socket, cleared by the first valid
/// reply or by a disconnect. Only one frame can be marked at a time.
#[derive(Debug, Default)]
pub struct InFlightGate {
    marked: AtomicBool,
}

impl InFlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a frame as in flight. Returns false if one already is.
    pub fn try_mark(&self) -> bool {
        self.marked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the marker. Returns whether a frame was in flight.
    pub fn clear(&self) -> bool {
        self.marked.swap(false, Ordering::AcqRel)
    }

    pub fn is_in_flight(&self) -> bool {
        self.marked.load(Ordering::Acquire)
    }
}
