use serde::Serialize;

/// Outcome of a pipeline operation.
pub trait MessageResponse {
    fn is_success(&self) -> bool;
}

/// Outcome of a send.
///
/// `delivered` reports whether the channel accepted the frame. It says
/// nothing about whether any subscriber processed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendResponse {
    delivered: bool,
}

impl SendResponse {
    pub fn new(delivered: bool) -> Self {
        Self { delivered }
    }

    pub fn delivered(&self) -> bool {
        self.delivered
    }

    pub fn is_success(&self) -> bool {
        self.delivered
    }
}

impl MessageResponse for SendResponse {
    fn is_success(&self) -> bool {
        self.delivered
    }
}
