#![no_std]
#![deny(missing_docs)]

/*! # pio-onewire
 *
 * A 1-Wire bus master built on a hardware timing engine: a co-processor (such as an RP2040 PIO
 * state machine) that generates every reset and bit slot with 1 µs resolution, independent of
 * host scheduling. The host exchanges one-bit symbols with it through two small queues, in lock
 * step: every symbol pushed is matched by one symbol popped before the next push.
 *
 * [`OneWireMaster`] implements [`OneWire`] over any [`TimingEngine`], and [`OneWireMasterAsync`]
 * implements [`OneWireAsync`] over any [`TimingEngineAsync`]. With the `sim` feature,
 * [`sim::SimulatedEngine`] provides a software engine with simulated slaves.
 */

pub use onewire_core::{
    Discovery, OneWire, OneWireAsync, OneWireError, OneWireResult, OneWireSearch,
    OneWireSearchAsync, OneWireSearchKind, PresenceResult, RomId, crc8,
};
mod engine;
mod engine_async;
mod error;
mod master;
mod master_async;
mod pin;
#[cfg(feature = "sim")]
pub mod sim;

pub use engine::{EngineStatus, TimingEngine};
pub use engine_async::TimingEngineAsync;
pub use error::{EngineError, SetupError};
pub use master_async::OneWireMasterAsync;
pub use pin::{IdlePin, OpenDrain};

/// Results of bus master set-up.
pub type SetupResult<T, P> = Result<T, SetupError<P>>;

/// Bus configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Pin driving the 1-Wire line, as numbered by the timing engine.
    pub pin: u8,
    /// Request the internal pull-up in addition to the mandatory external resistor.
    pub pullup_enabled: bool,
    /// How many times the outbound queue status is polled before giving up with
    /// [`EngineError::Timeout`].
    pub retries: u8,
    /// Pause between two polls of the outbound queue status, in microseconds.
    pub poll_interval_us: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            pin: 0,
            pullup_enabled: true,
            retries: 100,
            poll_interval_us: 10,
        }
    }
}

/// A 1-Wire bus master: exclusive owner of one line and the timing engine driving it.
///
/// Takes ownership of the engine, the line's pin (implementing [`IdlePin`]) and a timer object
/// implementing the [`DelayNs`](embedded_hal::delay::DelayNs) trait.
/// Operations take `&mut self`, so symbols of two operations can never interleave; share a bus
/// between tasks by putting the whole master behind a mutex.
pub struct OneWireMaster<E, P, D> {
    pub(crate) engine: E,
    pub(crate) pin: P,
    pub(crate) delay: D,
    pub(crate) config: BusConfig,
}

/// Builder for creating a [`OneWireMaster`] or [`OneWireMasterAsync`] with custom configuration.
#[derive(Debug, Default)]
pub struct OneWireMasterBuilder {
    pub(crate) config: BusConfig,
}

impl OneWireMasterBuilder {
    /// Sets the whole bus configuration.
    pub fn with_config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the pin driving the 1-Wire line.
    pub fn with_pin(mut self, pin: u8) -> Self {
        self.config.pin = pin;
        self
    }

    /// Enables or disables the internal pull-up request.
    pub fn with_pullup(mut self, enabled: bool) -> Self {
        self.config.pullup_enabled = enabled;
        self
    }

    /// Sets the retry count.
    ///
    /// The retry count is used to determine how long
    /// the host waits for room in the outbound queue before timing out.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.config.retries = retries;
        self
    }

    /// Sets the pause between polls of the outbound queue, in microseconds.
    pub fn with_poll_interval_us(mut self, us: u32) -> Self {
        self.config.poll_interval_us = us;
        self
    }

    /// Builds a new [`OneWireMaster`].
    ///
    /// The pin is put in its idle state before the engine starts, so the line is never driven
    /// low by accident. The engine's first reset cycle is completed and its presence sample
    /// discarded.
    pub fn build<E: TimingEngine, P: IdlePin, D>(
        self,
        mut engine: E,
        mut pin: P,
        delay: D,
    ) -> SetupResult<OneWireMaster<E, P, D>, P::Error> {
        pin.set_idle(self.config.pullup_enabled)
            .map_err(SetupError::Pin)?;
        engine.start(self.config.pin)?;
        let level = engine.pop_symbol()?;
        log::debug!(
            "1-Wire master on pin {}: initial presence {}",
            self.config.pin,
            !level
        );
        Ok(OneWireMaster {
            engine,
            pin,
            delay,
            config: self.config,
        })
    }

    /// Builds a new [`OneWireMasterAsync`]. See [`build`](OneWireMasterBuilder::build).
    pub async fn build_async<E: TimingEngineAsync, P: IdlePin, D>(
        self,
        mut engine: E,
        mut pin: P,
        delay: D,
    ) -> SetupResult<OneWireMasterAsync<E, P, D>, P::Error> {
        pin.set_idle(self.config.pullup_enabled)
            .map_err(SetupError::Pin)?;
        engine.start(self.config.pin)?;
        let level = engine.pop_symbol().await?;
        log::debug!(
            "1-Wire master on pin {}: initial presence {}",
            self.config.pin,
            !level
        );
        Ok(OneWireMasterAsync {
            engine,
            pin,
            delay,
            config: self.config,
        })
    }
}

impl<E, P, D> OneWireMaster<E, P, D> {
    /// Creates a new [`OneWireMaster`] with the default configuration on `pin`.
    pub fn new(engine: E, pin: P, delay: D, line: u8) -> SetupResult<Self, P::Error>
    where
        E: TimingEngine,
        P: IdlePin,
    {
        OneWireMasterBuilder::default()
            .with_pin(line)
            .build(engine, pin, delay)
    }

    /// The configuration the bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The timing engine, for inspection.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: TimingEngine, P, D> OneWireMaster<E, P, D> {
    /// Stop the timing engine and release the bus, returning its parts.
    pub fn release(mut self) -> (E, P, D) {
        self.engine.stop();
        (self.engine, self.pin, self.delay)
    }
}
