#![allow(async_fn_in_trait)]
use crate::{
    Discovery, ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD, ONEWIRE_SKIP_ROM_CMD, OneWireError,
    OneWireResult, OneWireSearchAsync, OneWireSearchKind, OneWireStatus, RomId, Triplet,
    crc::OneWireCrc,
};

/// Asynchronous 1-Wire bus primitives.
///
/// Mirrors [`OneWire`](crate::OneWire) operation for operation: waiting for a time slot
/// suspends the calling task instead of blocking it. Errors are the same as for the
/// blocking trait.
pub trait OneWireAsync {
    /// Outcome of a reset, see [`OneWireStatus`].
    type Status: OneWireStatus;
    /// Fault type of the bus master.
    type BusError;

    /// Resets the bus and samples the presence pulse.
    async fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte, least significant bit first.
    async fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte, least significant bit first.
    async fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes one bit in a write time slot.
    async fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads one bit in a read time slot.
    async fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Two read slots and one write slot, as [`OneWire::read_triplet`](crate::OneWire::read_triplet).
    async fn read_triplet(&mut self, direction: bool) -> OneWireResult<Triplet, Self::BusError> {
        let id_bit = self.read_bit().await?;
        let complement_bit = self.read_bit().await?;
        let direction = match (id_bit, complement_bit) {
            (false, false) => direction,
            (id_bit, _) => id_bit,
        };
        self.write_bit(direction).await?;
        Ok(Triplet {
            id_bit,
            complement_bit,
            direction,
        })
    }

    /// Writes every byte of `bytes` in order.
    async fn write_bytes(&mut self, bytes: &[u8]) -> OneWireResult<(), Self::BusError> {
        for &b in bytes {
            self.write_byte(b).await?;
        }
        Ok(())
    }

    /// Fills `buf` with bytes read from the bus.
    async fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        for b in buf.iter_mut() {
            *b = self.read_byte().await?;
        }
        Ok(())
    }

    /// Reads a block whose last byte is the CRC-8 of the preceding bytes.
    async fn read_bytes_checked(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        if buf.len() < 2 {
            return Err(OneWireError::InvalidLength);
        }
        self.read_bytes(buf).await?;
        if OneWireCrc::validate(buf) {
            Ok(())
        } else {
            Err(OneWireError::InvalidCrc)
        }
    }

    /// Resets the bus, then selects `rom` with MATCH ROM, or every device with SKIP ROM.
    async fn address(&mut self, rom: Option<RomId>) -> OneWireResult<(), Self::BusError> {
        if !self.reset().await?.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        match rom {
            Some(rom) => {
                self.write_byte(ONEWIRE_MATCH_ROM_CMD).await?;
                self.write_bytes(rom.as_bytes()).await
            }
            None => self.write_byte(ONEWIRE_SKIP_ROM_CMD).await,
        }
    }

    /// Reads the ROM code of the only device on a single-drop bus.
    async fn read_rom(&mut self) -> OneWireResult<RomId, Self::BusError> {
        if !self.reset().await?.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        self.write_byte(ONEWIRE_READ_ROM_CMD).await?;
        let mut rom = [0; 8];
        self.read_bytes(&mut rom).await?;
        let rom = RomId::new(rom);
        if rom.is_valid() {
            Ok(rom)
        } else {
            Err(OneWireError::InvalidRomCrc(rom))
        }
    }

    /// Discovers every device on the bus, collecting up to `N` addresses.
    async fn search<const N: usize>(&mut self) -> OneWireResult<Discovery<N>, Self::BusError>
    where
        Self: Sized,
    {
        OneWireSearchAsync::new(self, OneWireSearchKind::Normal)
            .discover(None)
            .await
    }
}
