use crate::{
    Discovery, ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD, ONEWIRE_SKIP_ROM_CMD, OneWireError,
    OneWireResult, OneWireSearch, OneWireSearchKind, RomId, crc::OneWireCrc,
};

/// Trait for the status reported by a bus reset.
pub trait OneWireStatus {
    /// Whether at least one device answered the reset with a presence pulse.
    fn presence(&self) -> bool;

    /// Whether a short circuit was detected during the reset.
    fn shortcircuit(&self) -> bool {
        false
    }

    /// Level of the 1-Wire line, if the bus master can sample it.
    fn logic_level(&self) -> Option<bool> {
        None
    }
}

/// Outcome of a bus reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceResult {
    /// At least one device pulled the bus low during the listen window.
    Present,
    /// Nobody answered. Not an error: the bus is simply empty.
    NoDevice,
}

impl OneWireStatus for PresenceResult {
    fn presence(&self) -> bool {
        matches!(self, Self::Present)
    }
}

/// Result of one [`OneWire::read_triplet`] sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triplet {
    /// Wired-AND of the current address bit of all participating devices.
    pub id_bit: bool,
    /// Wired-AND of the complemented address bit.
    pub complement_bit: bool,
    /// Direction bit written back; devices whose bit differs drop out.
    pub direction: bool,
}

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, and writing and reading bits.
///
/// Bit and byte operations are not cancellable once started; none of them is retried
/// on failure.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// An absent presence pulse is reported through the status, not as an error.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus, least significant bit first.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus, least significant bit first.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes a single bit in one write time slot.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit in one read time slot.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// # Note: Not intended for public API use.
    /// ## This method is internally used by the [search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html).
    ///
    /// Generates three time slots: two read time slots and one write time slot. The
    /// write time slot depends on the two bits read and on `direction`:
    ///
    /// | id bit | complement | written |
    /// |--------|------------|---------|
    /// | 0      | 1          | 0       |
    /// | 1      | 0          | 1       |
    /// | 0      | 0          | `direction` |
    /// | 1      | 1          | 1       |
    ///
    /// Bus masters with a hardware triplet command can override this.
    fn read_triplet(&mut self, direction: bool) -> OneWireResult<Triplet, Self::BusError> {
        let id_bit = self.read_bit()?;
        let complement_bit = self.read_bit()?;
        let direction = match (id_bit, complement_bit) {
            (false, false) => direction,
            (id_bit, _) => id_bit,
        };
        self.write_bit(direction)?;
        Ok(Triplet {
            id_bit,
            complement_bit,
            direction,
        })
    }

    /// Writes every byte of `bytes` in order.
    fn write_bytes(&mut self, bytes: &[u8]) -> OneWireResult<(), Self::BusError> {
        bytes.iter().try_for_each(|&b| self.write_byte(b))
    }

    /// Fills `buf` with bytes read from the bus.
    fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        for b in buf.iter_mut() {
            *b = self.read_byte()?;
        }
        Ok(())
    }

    /// Reads a block whose last byte is the CRC-8 of the preceding bytes,
    /// such as a scratchpad.
    ///
    /// # Errors
    /// [`OneWireError::InvalidLength`] if `buf` cannot hold data and a check byte,
    /// [`OneWireError::InvalidCrc`] if the check fails.
    fn read_bytes_checked(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        if buf.len() < 2 {
            return Err(OneWireError::InvalidLength);
        }
        self.read_bytes(buf)?;
        if OneWireCrc::validate(buf) {
            Ok(())
        } else {
            Err(OneWireError::InvalidCrc)
        }
    }

    /// Addresses devices on the 1-Wire bus.
    /// The first [`OneWire::read_byte`], [`OneWire::read_bit`], [`OneWire::write_byte`], [`OneWire::write_bit`] operation should be preceded by this method to address devices on the bus.
    /// Note: A [`OneWire::read_byte`] or [`OneWire::read_bit`] call will return garbage data if this method is called without specifying a ROM address on a bus with multiple devices.
    /// # Arguments
    /// * `rom` - The ROM address of the device to address. Pass [`None`] to skip ROM addressing and address all devices on the bus.
    ///
    /// # Errors
    /// [`OneWireError::NoDevicePresent`] if no device answers the reset.
    fn address(&mut self, rom: Option<RomId>) -> OneWireResult<(), Self::BusError> {
        if !self.reset()?.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        match rom {
            Some(rom) => {
                self.write_byte(ONEWIRE_MATCH_ROM_CMD)?;
                self.write_bytes(rom.as_bytes())
            }
            None => self.write_byte(ONEWIRE_SKIP_ROM_CMD),
        }
    }

    /// Reads the ROM code of the only device on a single-drop bus.
    ///
    /// With several devices present the wired-AND of their codes is returned,
    /// which almost always fails the CRC check.
    fn read_rom(&mut self) -> OneWireResult<RomId, Self::BusError> {
        if !self.reset()?.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        self.write_byte(ONEWIRE_READ_ROM_CMD)?;
        let mut rom = [0; 8];
        self.read_bytes(&mut rom)?;
        let rom = RomId::new(rom);
        if rom.is_valid() {
            Ok(rom)
        } else {
            Err(OneWireError::InvalidRomCrc(rom))
        }
    }

    /// Discovers every device on the bus, collecting up to `N` addresses.
    ///
    /// See [`OneWireSearch::discover`].
    fn search<const N: usize>(&mut self) -> OneWireResult<Discovery<N>, Self::BusError>
    where
        Self: Sized,
    {
        OneWireSearch::new(self, OneWireSearchKind::Normal).discover(None)
    }
}
