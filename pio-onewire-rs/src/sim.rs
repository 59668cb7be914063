//! A software [`TimingEngine`] with simulated 1-Wire slaves.
//!
//! [`SimulatedEngine`] keeps the two bounded symbol queues of a PIO-style engine and evaluates
//! every bit slot against a wired-AND line shared by up to [`MAX_DEVICES`] [`SimDevice`]s.
//! Slots are worked off whenever the host samples the status register or waits for a symbol,
//! so a host that pushes without popping sees the outbound queue fill up exactly as it would on
//! hardware.
//!
//! Simulated slaves understand the ROM layer (search, conditional search, match, skip and read
//! ROM) and three kinds of function command: `0x44` starts a temperature conversion, during
//! which read slots return 0 until it completes, `0xBE` returns the nine byte scratchpad, and
//! any other command byte turns the device into a loopback that echoes the command and then
//! every byte written to it.

use core::convert::Infallible;

use heapless::{Deque, Vec};
use onewire_core::{
    ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD,
    ONEWIRE_SEARCH_CMD, ONEWIRE_SKIP_ROM_CMD, RomId, crc8,
};

use crate::{EngineError, EngineStatus, IdlePin, TimingEngine, TimingEngineAsync};

/// Depth of each symbol queue.
pub const QUEUE_DEPTH: usize = 4;

/// Most slaves one simulated line can carry.
pub const MAX_DEVICES: usize = 16;

/// Function command returning the scratchpad.
pub const READ_SCRATCHPAD_CMD: u8 = 0xbe;

/// Function command starting a temperature conversion.
pub const CONVERT_T_CMD: u8 = 0x44;

/// Read slots a conversion keeps answering 0 for, unless configured otherwise.
pub const DEFAULT_CONVERSION_SLOTS: u16 = 40;

/// Power-on scratchpad of a DS18B20: 85 °C, alarm limits 75/70 °C, 12-bit resolution.
const POWER_ON_SCRATCHPAD: [u8; 8] = [0x50, 0x05, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Deselected until the next reset.
    Idle,
    RomCommand { byte: u8, bit: u8 },
    /// `step` 0 sends the bit, 1 its complement, 2 receives the master's direction.
    Search { bit: u8, step: u8 },
    MatchRom { bit: u8 },
    ReadRom { bit: u8 },
    Function { byte: u8, bit: u8 },
    Scratchpad { index: u8, bit: u8 },
    EchoOut { byte: u8, bit: u8 },
    EchoIn { byte: u8, bit: u8 },
    /// Read slots answer 0 while `left` is non-zero, then 1.
    Converting { left: u16 },
}

/// One simulated slave.
#[derive(Debug, Clone)]
pub struct SimDevice {
    rom: RomId,
    alarmed: bool,
    scratchpad: [u8; 9],
    measured: i16,
    conversion_slots: u16,
    phase: Phase,
}

impl SimDevice {
    /// A slave with address `rom` and a DS18B20 power-on scratchpad.
    ///
    /// The address is taken as is: a ROM code with a wrong check byte makes a device that the
    /// search reports as a CRC failure.
    pub fn new(rom: RomId) -> Self {
        Self {
            rom,
            alarmed: false,
            scratchpad: [0; 9],
            measured: i16::from_le_bytes([POWER_ON_SCRATCHPAD[0], POWER_ON_SCRATCHPAD[1]]),
            conversion_slots: DEFAULT_CONVERSION_SLOTS,
            phase: Phase::Idle,
        }
        .with_scratchpad(POWER_ON_SCRATCHPAD)
    }

    /// Replace the first eight scratchpad bytes. The ninth is their CRC-8.
    pub fn with_scratchpad(mut self, data: [u8; 8]) -> Self {
        self.scratchpad[..8].copy_from_slice(&data);
        self.scratchpad[8] = crc8(&data);
        self
    }

    /// Report a raw DS18B20 temperature reading (1/16 °C per LSB), already in the scratchpad.
    pub fn with_temperature_raw(mut self, raw: i16) -> Self {
        self.measured = raw;
        let mut data = POWER_ON_SCRATCHPAD;
        data[..2].copy_from_slice(&raw.to_le_bytes());
        self.with_scratchpad(data)
    }

    /// Temperature the next conversion measures (1/16 °C per LSB). Until then the scratchpad
    /// keeps reporting what it held before.
    pub fn with_measurement_raw(mut self, raw: i16) -> Self {
        self.measured = raw;
        self
    }

    /// How many read slots a conversion takes, at least one.
    pub fn with_conversion_slots(mut self, slots: u16) -> Self {
        self.conversion_slots = slots.max(1);
        self
    }

    /// Answer the conditional search.
    pub fn with_alarm(mut self, alarmed: bool) -> Self {
        self.alarmed = alarmed;
        self
    }

    /// The device address.
    pub fn rom(&self) -> RomId {
        self.rom
    }

    /// The scratchpad, check byte included.
    pub fn scratchpad(&self) -> &[u8; 9] {
        &self.scratchpad
    }

    fn reset(&mut self) {
        // A conversion runs to completion even when the master stops polling
        if matches!(self.phase, Phase::Converting { left } if left > 0) {
            self.finish_conversion();
        }
        self.phase = Phase::RomCommand { byte: 0, bit: 0 };
    }

    fn finish_conversion(&mut self) {
        let mut data = [0; 8];
        data.copy_from_slice(&self.scratchpad[..8]);
        data[..2].copy_from_slice(&self.measured.to_le_bytes());
        self.scratchpad[..8].copy_from_slice(&data);
        self.scratchpad[8] = crc8(&data);
        log::trace!("sim: {:x} converted {}", self.rom, self.measured);
    }

    /// The level this device leaves on the line during a read slot.
    fn drive(&self) -> bool {
        match self.phase {
            Phase::Search { bit, step: 0 } => self.rom.bit(bit as usize),
            Phase::Search { bit, step: 1 } => !self.rom.bit(bit as usize),
            Phase::ReadRom { bit } => self.rom.bit(bit as usize),
            Phase::Scratchpad { index, bit } => self.scratchpad[index as usize] & (1 << bit) != 0,
            Phase::EchoOut { byte, bit } => byte & (1 << bit) != 0,
            Phase::Converting { left } => left == 0,
            _ => true,
        }
    }

    /// Advance by one slot in which the line settled at `level`.
    fn observe(&mut self, level: bool) {
        let received = |byte: u8, bit: u8| byte | ((level as u8) << bit);
        if self.phase == (Phase::Converting { left: 1 }) {
            self.finish_conversion();
        }
        self.phase = match self.phase {
            Phase::Idle => Phase::Idle,
            Phase::RomCommand { byte, bit } => {
                let byte = received(byte, bit);
                if bit < 7 {
                    Phase::RomCommand { byte, bit: bit + 1 }
                } else {
                    self.rom_command(byte)
                }
            }
            Phase::Search { bit, step: 2 } | Phase::MatchRom { bit }
                if level != self.rom.bit(bit as usize) =>
            {
                Phase::Idle
            }
            Phase::Search { bit: 63, step: 2 }
            | Phase::MatchRom { bit: 63 }
            | Phase::ReadRom { bit: 63 } => Phase::Function { byte: 0, bit: 0 },
            Phase::Search { bit, step: 2 } => Phase::Search {
                bit: bit + 1,
                step: 0,
            },
            Phase::Search { bit, step } => Phase::Search {
                bit,
                step: step + 1,
            },
            Phase::MatchRom { bit } => Phase::MatchRom { bit: bit + 1 },
            Phase::ReadRom { bit } => Phase::ReadRom { bit: bit + 1 },
            Phase::Function { byte, bit } => {
                let byte = received(byte, bit);
                match (bit, byte) {
                    (0..7, _) => Phase::Function { byte, bit: bit + 1 },
                    (_, READ_SCRATCHPAD_CMD) => Phase::Scratchpad { index: 0, bit: 0 },
                    (_, CONVERT_T_CMD) => Phase::Converting {
                        left: self.conversion_slots,
                    },
                    _ => Phase::EchoOut { byte, bit: 0 },
                }
            }
            Phase::Scratchpad { index, bit } => match (index, bit) {
                (_, 0..7) => Phase::Scratchpad {
                    index,
                    bit: bit + 1,
                },
                (0..8, _) => Phase::Scratchpad {
                    index: index + 1,
                    bit: 0,
                },
                _ => Phase::Idle,
            },
            Phase::EchoOut { byte, bit } if bit < 7 => Phase::EchoOut { byte, bit: bit + 1 },
            Phase::EchoOut { .. } => Phase::EchoIn { byte: 0, bit: 0 },
            Phase::Converting { left } => Phase::Converting {
                left: left.saturating_sub(1),
            },
            Phase::EchoIn { byte, bit } => {
                let byte = received(byte, bit);
                if bit < 7 {
                    Phase::EchoIn { byte, bit: bit + 1 }
                } else {
                    Phase::EchoOut { byte, bit: 0 }
                }
            }
        };
    }

    fn rom_command(&self, cmd: u8) -> Phase {
        match cmd {
            ONEWIRE_SEARCH_CMD => Phase::Search { bit: 0, step: 0 },
            ONEWIRE_CONDITIONAL_SEARCH_CMD if self.alarmed => Phase::Search { bit: 0, step: 0 },
            ONEWIRE_MATCH_ROM_CMD => Phase::MatchRom { bit: 0 },
            ONEWIRE_SKIP_ROM_CMD => Phase::Function { byte: 0, bit: 0 },
            ONEWIRE_READ_ROM_CMD => Phase::ReadRom { bit: 0 },
            _ => Phase::Idle,
        }
    }
}

/// Counters kept by a [`SimulatedEngine`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimStats {
    /// Symbols accepted into the outbound queue.
    pub pushes: usize,
    /// Symbols handed to the host.
    pub pops: usize,
    /// Pushes refused because the outbound queue was full.
    pub queue_full_events: usize,
    /// Deepest the outbound queue has been.
    pub max_outbound_depth: usize,
    /// Reset cycles run.
    pub resets: usize,
}

/// A software timing engine driving a simulated line.
#[derive(Debug, Default)]
pub struct SimulatedEngine {
    devices: Vec<SimDevice, MAX_DEVICES>,
    outbound: Deque<bool, QUEUE_DEPTH>,
    inbound: Deque<bool, QUEUE_DEPTH>,
    running: bool,
    pin: Option<u8>,
    line_level: bool,
    stuck_low: bool,
    stall_after: Option<usize>,
    slots: usize,
    stats: SimStats,
}

impl SimulatedEngine {
    /// An engine with an empty line.
    pub fn new() -> Self {
        Self {
            line_level: true,
            ..Default::default()
        }
    }

    /// Attach a slave, refusing it once [`MAX_DEVICES`] are on the line.
    pub fn add_device(&mut self, device: SimDevice) -> Result<(), SimDevice> {
        log::trace!("sim: attaching {:x}", device.rom);
        self.devices.push(device)
    }

    /// Attach a slave. Slaves beyond [`MAX_DEVICES`] are dropped with a warning.
    pub fn with_device(mut self, device: SimDevice) -> Self {
        if let Err(device) = self.add_device(device) {
            log::warn!("sim: line full, dropping {:x}", device.rom);
        }
        self
    }

    /// Hold the line low, as a short to ground would.
    pub fn with_stuck_low(mut self, stuck: bool) -> Self {
        self.stuck_low = stuck;
        self
    }

    /// Stop producing symbols after `slots` bit slots, as a hung state machine would.
    /// Reset cycles still complete.
    pub fn with_stall_after(mut self, slots: usize) -> Self {
        self.stall_after = Some(slots);
        self
    }

    /// The slaves on the line.
    pub fn devices(&self) -> &[SimDevice] {
        &self.devices
    }

    /// Queue and slot counters.
    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Pin the engine was last started on.
    pub fn pin(&self) -> Option<u8> {
        self.pin
    }

    fn stalled(&self) -> bool {
        self.stall_after.is_some_and(|n| self.slots >= n)
    }

    /// Level sampled in the presence window.
    fn reset_cycle(&mut self) -> bool {
        self.stats.resets += 1;
        self.devices.iter_mut().for_each(SimDevice::reset);
        let present = !self.devices.is_empty() || self.stuck_low;
        !present
    }

    /// Level sampled in one bit slot.
    fn bit_slot(&mut self, symbol: bool) -> bool {
        let level = symbol && !self.stuck_low && self.devices.iter().all(SimDevice::drive);
        for device in self.devices.iter_mut() {
            device.observe(level);
        }
        self.slots += 1;
        level
    }

    /// Work off queued symbols while there is room for their samples.
    fn run(&mut self) {
        if !self.running {
            return;
        }
        while !self.inbound.is_full() && !self.stalled() {
            let Some(symbol) = self.outbound.pop_front() else {
                break;
            };
            let level = self.bit_slot(symbol);
            self.line_level = level;
            // Room was checked above
            let _ = self.inbound.push_back(level);
        }
    }
}

impl TimingEngine for SimulatedEngine {
    fn start(&mut self, pin: u8) -> Result<(), EngineError> {
        if self.running {
            return Err(EngineError::AlreadyRunning);
        }
        self.running = true;
        self.pin = Some(pin);
        self.outbound.clear();
        self.inbound.clear();
        let level = self.reset_cycle();
        self.line_level = level;
        let _ = self.inbound.push_back(level);
        log::trace!("sim: started on pin {pin}, presence sample {level}");
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.outbound.clear();
        self.inbound.clear();
    }

    fn status(&mut self) -> EngineStatus {
        self.run();
        EngineStatus::new()
            .with_running(self.running)
            .with_tx_full(self.outbound.is_full())
            .with_rx_empty(self.inbound.is_empty())
            .with_line_level(self.line_level && !self.stuck_low)
            .with_tx_level(self.outbound.len() as u8)
    }

    fn push_symbol(&mut self, symbol: bool) -> Result<(), EngineError> {
        if self.outbound.push_back(symbol).is_err() {
            self.stats.queue_full_events += 1;
            return Err(EngineError::QueueFull);
        }
        self.stats.pushes += 1;
        self.stats.max_outbound_depth = self.stats.max_outbound_depth.max(self.outbound.len());
        Ok(())
    }

    fn pop_symbol(&mut self) -> Result<bool, EngineError> {
        self.run();
        let symbol = self.inbound.pop_front().ok_or(EngineError::Timeout)?;
        self.stats.pops += 1;
        Ok(symbol)
    }
}

impl TimingEngineAsync for SimulatedEngine {
    fn start(&mut self, pin: u8) -> Result<(), EngineError> {
        TimingEngine::start(self, pin)
    }

    fn stop(&mut self) {
        TimingEngine::stop(self)
    }

    fn status(&mut self) -> EngineStatus {
        TimingEngine::status(self)
    }

    fn push_symbol(&mut self, symbol: bool) -> Result<(), EngineError> {
        TimingEngine::push_symbol(self, symbol)
    }

    async fn pop_symbol(&mut self) -> Result<bool, EngineError> {
        TimingEngine::pop_symbol(self)
    }
}

/// A pin standing in for the line's GPIO. Remembers how it was last configured.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimPin {
    idle: bool,
    pull_up: bool,
    idle_requests: usize,
}

impl SimPin {
    /// A pin in its reset state, not yet idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pin was put in its idle state.
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Whether the internal pull-up was requested.
    pub fn pull_up(&self) -> bool {
        self.pull_up
    }

    /// How many times the pin was put in its idle state.
    pub fn idle_requests(&self) -> usize {
        self.idle_requests
    }
}

impl embedded_hal::digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl IdlePin for SimPin {
    fn set_idle(&mut self, pull_up: bool) -> Result<(), Self::Error> {
        self.idle = true;
        self.pull_up = pull_up;
        self.idle_requests += 1;
        Ok(())
    }
}
