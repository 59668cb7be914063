use bitfield_struct::bitfield;

use crate::EngineError;

/// Status register of a timing engine.
///
/// Sampled by the bus master before every symbol it pushes; the bus master never
/// pushes while [`tx_full`](EngineStatus::tx_full) is set.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct EngineStatus {
    /// Time-slot generation is active.
    pub running: bool,
    /// The outbound (host to engine) queue has no free slot.
    pub tx_full: bool,
    /// The inbound (engine to host) queue holds no symbol.
    pub rx_empty: bool,
    /// Level of the 1-Wire line at the most recent sample.
    pub line_level: bool,
    /// Symbols waiting in the outbound queue.
    #[bits(3)]
    pub tx_level: u8,
    #[bits(1)]
    __: u8,
}

/// A hardware-timed execution unit generating 1-Wire time slots, such as a PIO state machine
/// clocked at 1 MHz.
///
/// Once started, the engine works through symbols on its own:
/// * every [`start`](TimingEngine::start) first runs one reset/presence cycle (line low for more
///   than 480 µs, release, sample at about 70 µs, then about 400 µs of recovery) and produces
///   exactly one inbound symbol: the line level sampled in the listen window. `false` means a
///   device answered with a presence pulse.
/// * after that, each symbol taken from the outbound queue is transmitted in exactly one bit
///   slot, and each bit slot produces exactly one inbound symbol. A `false` symbol is a write-0
///   slot and produces a dummy `false`. A `true` symbol is a write-1 slot, which is also the read
///   slot: it produces the line level sampled about 15 µs into the slot.
///
/// The host never touches the wire itself.
pub trait TimingEngine {
    /// Start generating time slots on `pin`, beginning with a reset cycle.
    ///
    /// # Errors
    /// [`EngineError::AlreadyRunning`] unless the engine was stopped first.
    fn start(&mut self, pin: u8) -> Result<(), EngineError>;

    /// Stop generating time slots and drop both queues. The line is released.
    fn stop(&mut self);

    /// Sample the status register.
    fn status(&mut self) -> EngineStatus;

    /// Enqueue one symbol for transmission.
    ///
    /// # Errors
    /// [`EngineError::QueueFull`] if the outbound queue has no free slot. The symbol is dropped.
    fn push_symbol(&mut self, symbol: bool) -> Result<(), EngineError>;

    /// Wait for the next sampled symbol.
    ///
    /// # Errors
    /// [`EngineError::Timeout`] if no symbol arrives within the engine's bounded wait.
    fn pop_symbol(&mut self) -> Result<bool, EngineError>;
}
