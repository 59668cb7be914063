use embedded_hal::delay::DelayNs;
use onewire_core::{OneWire, OneWireResult, PresenceResult};

use crate::{EngineError, EngineStatus, OneWireMaster, TimingEngine};

/// Symbol that leaves the line to the addressed device during a read slot.
pub(crate) const RELEASE: bool = true;

impl<E: TimingEngine, P, D: DelayNs> OneWireMaster<E, P, D> {
    /// Wait until the outbound queue has room for one symbol.
    ///
    /// Polls the status register at most `retries` times after the first look.
    pub(crate) fn wait_tx_ready(&mut self) -> Result<EngineStatus, EngineError> {
        let mut tries = 0;
        loop {
            let status = self.engine.status();
            if !status.tx_full() {
                return Ok(status);
            }
            if tries >= self.config.retries {
                log::warn!("1-Wire: outbound queue stuck full after {tries} polls");
                return Err(EngineError::Timeout);
            }
            tries += 1;
            self.delay.delay_us(self.config.poll_interval_us);
        }
    }

    /// One bit slot in lock step: room confirmed, one symbol out, one symbol back.
    fn slot(&mut self, symbol: bool) -> Result<bool, EngineError> {
        self.wait_tx_ready()?;
        self.engine.push_symbol(symbol)?;
        let sample = self.engine.pop_symbol()?;
        log::trace!("1-Wire slot: sent {} sampled {}", symbol as u8, sample as u8);
        Ok(sample)
    }
}

impl<E: TimingEngine, P, D: DelayNs> OneWire for OneWireMaster<E, P, D> {
    type Status = PresenceResult;

    type BusError = EngineError;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        // Restarting the engine runs its reset cycle and drops anything still queued
        self.engine.stop();
        self.engine.start(self.config.pin)?;
        let level = self.engine.pop_symbol()?;
        let presence = if level {
            PresenceResult::NoDevice
        } else {
            PresenceResult::Present
        };
        if presence == PresenceResult::NoDevice {
            log::debug!("No devices responded to 1W bus reset");
        }
        Ok(presence)
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        (0..8).try_for_each(|i| self.write_bit(byte & (1 << i) != 0))
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        let mut byte = 0;
        for i in 0..8 {
            if self.read_bit()? {
                byte |= 1 << i;
            }
        }
        Ok(byte)
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        // The echo of a write slot carries no information
        self.slot(bit)?;
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        Ok(self.slot(RELEASE)?)
    }
}
