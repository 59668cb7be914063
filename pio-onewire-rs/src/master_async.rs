use embedded_hal_async::delay::DelayNs;
use onewire_core::{OneWireAsync, OneWireResult, PresenceResult};

use crate::{BusConfig, EngineError, EngineStatus, TimingEngineAsync, master::RELEASE};

/// Asynchronous 1-Wire bus master. Built with
/// [`OneWireMasterBuilder::build_async`](crate::OneWireMasterBuilder::build_async).
///
/// Waiting for a sampled symbol and pausing between queue polls suspend the calling task;
/// everything else behaves as in [`OneWireMaster`](crate::OneWireMaster).
pub struct OneWireMasterAsync<E, P, D> {
    pub(crate) engine: E,
    pub(crate) pin: P,
    pub(crate) delay: D,
    pub(crate) config: BusConfig,
}

impl<E, P, D> OneWireMasterAsync<E, P, D> {
    /// The configuration the bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The timing engine, for inspection.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: TimingEngineAsync, P, D> OneWireMasterAsync<E, P, D> {
    /// Stop the timing engine and release the bus, returning its parts.
    pub fn release(mut self) -> (E, P, D) {
        self.engine.stop();
        (self.engine, self.pin, self.delay)
    }
}

impl<E: TimingEngineAsync, P, D: DelayNs> OneWireMasterAsync<E, P, D> {
    async fn wait_tx_ready(&mut self) -> Result<EngineStatus, EngineError> {
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
            self.delay.delay_us(self.config.poll_interval_us).await;
        }
    }

    async fn slot(&mut self, symbol: bool) -> Result<bool, EngineError> {
        self.wait_tx_ready().await?;
        self.engine.push_symbol(symbol)?;
        let sample = self.engine.pop_symbol().await?;
        log::trace!("1-Wire slot: sent {} sampled {}", symbol as u8, sample as u8);
        Ok(sample)
    }
}

impl<E: TimingEngineAsync, P, D: DelayNs> OneWireAsync for OneWireMasterAsync<E, P, D> {
    type Status = PresenceResult;

    type BusError = EngineError;

    async fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.engine.stop();
        self.engine.start(self.config.pin)?;
        if self.engine.pop_symbol().await? {
            log::debug!("No devices responded to 1W bus reset");
            Ok(PresenceResult::NoDevice)
        } else {
            Ok(PresenceResult::Present)
        }
    }

    async fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        for i in 0..8 {
            self.write_bit(byte & (1 << i) != 0).await?;
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        let mut byte = 0;
        for i in 0..8 {
            if self.read_bit().await? {
                byte |= 1 << i;
            }
        }
        Ok(byte)
    }

    async fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.slot(bit).await?;
        Ok(())
    }

    async fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        Ok(self.slot(RELEASE).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use futures::executor::block_on;
    use onewire_core::OneWireError;

    /// Engine whose outbound queue reports full for a number of polls.
    #[derive(Default)]
    struct Congested {
        full_polls: usize,
        polls: usize,
        pushed: usize,
    }

    impl TimingEngineAsync for Congested {
        fn start(&mut self, _pin: u8) -> Result<(), EngineError> {
            Ok(())
        }

        fn stop(&mut self) {}

        fn status(&mut self) -> EngineStatus {
            self.polls += 1;
            EngineStatus::new()
                .with_running(true)
                .with_tx_full(self.polls <= self.full_polls)
        }

        fn push_symbol(&mut self, _symbol: bool) -> Result<(), EngineError> {
            self.pushed += 1;
            Ok(())
        }

        async fn pop_symbol(&mut self) -> Result<bool, EngineError> {
            Ok(true)
        }
    }

    fn master(full_polls: usize) -> OneWireMasterAsync<Congested, (), NoopDelay> {
        OneWireMasterAsync {
            engine: Congested {
                full_polls,
                ..Default::default()
            },
            pin: (),
            delay: NoopDelay::new(),
            config: BusConfig {
                retries: 3,
                ..Default::default()
            },
        }
    }

    #[test]
    fn full_queue_times_out_without_pushing() {
        let mut bus = master(usize::MAX);
        assert_eq!(
            block_on(bus.write_bit(false)),
            Err(OneWireError::BusFault(EngineError::Timeout))
        );
        assert_eq!(bus.engine().pushed, 0);
        // Initial look plus one poll per retry
        assert_eq!(bus.engine().polls, 4);
    }

    #[test]
    fn waits_for_room() {
        let mut bus = master(3);
        assert_eq!(block_on(bus.read_bit()), Ok(true));
        assert_eq!(bus.engine().pushed, 1);
    }
}
