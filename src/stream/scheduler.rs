//! Animation-frame scheduling for the capture loop.
//!
//! At most one frame callback is pending at any time. Cancelling clears it
//! synchronously, so no loop iteration can run after `cancel_all` returns.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRequestId(u64);

#[derive(Debug, Default)]
pub struct FrameScheduler {
    next_id: u64,
    pending: Option<FrameRequestId>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the loop for the next animation frame, replacing any
    /// previously pending request.
    pub fn request(&mut self) -> FrameRequestId {
        self.next_id += 1;
        let id = FrameRequestId(self.next_id);
        self.pending = Some(id);
        id
    }

    pub fn cancel_all(&mut self) {
        self.pending = None;
    }

    /// Consume the pending request for this animation frame.
    pub fn take_pending(&mut self) -> Option<FrameRequestId> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
