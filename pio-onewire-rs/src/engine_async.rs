#![allow(async_fn_in_trait)]
use crate::{EngineError, EngineStatus};

/// Asynchronous counterpart of [`TimingEngine`](crate::TimingEngine).
///
/// Only waiting for a sampled symbol suspends; the other operations complete immediately.
pub trait TimingEngineAsync {
    /// Start generating time slots on `pin`, beginning with a reset cycle.
    fn start(&mut self, pin: u8) -> Result<(), EngineError>;

    /// Stop generating time slots and drop both queues.
    fn stop(&mut self);

    /// Sample the status register.
    fn status(&mut self) -> EngineStatus;

    /// Enqueue one symbol for transmission.
    fn push_symbol(&mut self, symbol: bool) -> Result<(), EngineError>;

    /// Wait for the next sampled symbol, suspending the calling task.
    ///
    /// # Errors
    /// [`EngineError::Timeout`] if no symbol arrives within the engine's bounded wait.
    async fn pop_symbol(&mut self) -> Result<bool, EngineError>;
}
