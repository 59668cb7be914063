use embedded_hal::digital::{ErrorType, OutputPin};

/// The pin carrying the 1-Wire line, seen from the bus master before the timing engine takes it over.
pub trait IdlePin: ErrorType {
    /// Put the pin in its idle-safe state: an input (or released open-drain output) so the
    /// line floats high, with the internal pull-up requested if `pull_up` is set.
    ///
    /// The internal pull-up only supplements the external pull-up resistor the bus needs.
    fn set_idle(&mut self, pull_up: bool) -> Result<(), Self::Error>;
}

/// An open-drain [`OutputPin`] used as the 1-Wire line. Setting it high releases the line.
///
/// Open-drain outputs have no internal pull-up to request; the external resistor holds the line.
#[derive(Debug)]
pub struct OpenDrain<P>(P);

impl<P> OpenDrain<P> {
    /// Wrap an open-drain output pin.
    pub fn new(pin: P) -> Self {
        Self(pin)
    }

    /// Return the wrapped pin.
    pub fn into_inner(self) -> P {
        self.0
    }
}

impl<P: OutputPin> ErrorType for OpenDrain<P> {
    type Error = P::Error;
}

impl<P: OutputPin> IdlePin for OpenDrain<P> {
    fn set_idle(&mut self, pull_up: bool) -> Result<(), Self::Error> {
        if pull_up {
            log::debug!("open-drain pin: internal pull-up not available, relying on the external one");
        }
        self.0.set_high()
    }
}
