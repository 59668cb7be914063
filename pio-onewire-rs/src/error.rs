#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Timing engine faults.
///
/// Any of these aborts the bus operation in progress; the bus master never retries.
pub enum EngineError {
    /// A symbol was pushed while the outbound queue had no free slot.
    QueueFull,
    /// No symbol arrived within the bounded wait: the engine is stalled,
    /// or the outbound queue never drained.
    Timeout,
    /// `start` was called on an engine that was not stopped first.
    AlreadyRunning,
}

impl core::fmt::Display for EngineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::QueueFull => f.write_str("outbound symbol queue full"),
            Self::Timeout => f.write_str("timing engine timed out"),
            Self::AlreadyRunning => f.write_str("timing engine already running"),
        }
    }
}

impl core::error::Error for EngineError {}

#[derive(Debug, PartialEq, Eq)]
/// Errors while bringing up a bus master.
pub enum SetupError<P> {
    /// The pin could not be put in its idle state.
    Pin(P),
    /// The timing engine failed to start or to complete its first reset cycle.
    Engine(EngineError),
}

impl<P> From<EngineError> for SetupError<P> {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}
