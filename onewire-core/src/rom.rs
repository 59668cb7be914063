use crate::crc::crc8;

/// 64-bit ROM code naming one device on the bus.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0    | Family code (e.g., 0x28 for DS18B20) |
/// | 1-6  | Serial number, least significant byte first |
/// | 7    | CRC-8 of bytes 0-6 |
///
/// The bytes are sent on the wire in this order, least significant bit first, so the
/// `u64` view is little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RomId([u8; 8]);

impl RomId {
    /// Wrap raw ROM bytes as read from the bus. No validation is done.
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Build a ROM code from family and serial number, computing the check byte.
    pub fn from_parts(family: u8, serial: [u8; 6]) -> Self {
        let mut bytes = [family, 0, 0, 0, 0, 0, 0, 0];
        bytes[1..7].copy_from_slice(&serial);
        bytes[7] = crc8(&bytes[..7]);
        Self(bytes)
    }

    /// Family code.
    pub fn family(&self) -> u8 {
        self.0[0]
    }

    /// 48-bit serial number.
    pub fn serial(&self) -> [u8; 6] {
        let mut serial = [0; 6];
        serial.copy_from_slice(&self.0[1..7]);
        serial
    }

    /// Check byte stored in the ROM.
    pub fn crc(&self) -> u8 {
        self.0[7]
    }

    /// Whether the check byte matches the CRC-8 of the first seven bytes.
    pub fn is_valid(&self) -> bool {
        crc8(&self.0[..7]) == self.0[7]
    }

    /// Raw bytes in wire order.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Bit `n` (0-63) of the code in transmission order.
    pub fn bit(&self, n: usize) -> bool {
        self.0[n / 8] & (1 << (n % 8)) != 0
    }
}

impl From<[u8; 8]> for RomId {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl From<RomId> for [u8; 8] {
    fn from(rom: RomId) -> Self {
        rom.0
    }
}

impl From<u64> for RomId {
    fn from(value: u64) -> Self {
        Self(value.to_le_bytes())
    }
}

impl From<RomId> for u64 {
    fn from(rom: RomId) -> Self {
        u64::from_le_bytes(rom.0)
    }
}

impl core::fmt::LowerHex for RomId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:016x}", u64::from(*self))
    }
}

impl core::fmt::Display for RomId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02x}-", self.family())?;
        for b in self.serial().iter().rev() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
