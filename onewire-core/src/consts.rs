//! ROM command bytes understood by every 1-Wire slave.

/// Address one device: followed by its 64-bit ROM code, least significant byte first.
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Address every device on the bus at once.
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Read the ROM code of the only device on a single-drop bus.
pub const ONEWIRE_READ_ROM_CMD: u8 = 0x33;

/// Command to search for devices on the 1-Wire bus
pub const ONEWIRE_SEARCH_CMD: u8 = 0xf0;

/// Command to search for devices in alarm state on the 1-Wire bus
pub const ONEWIRE_CONDITIONAL_SEARCH_CMD: u8 = 0xec;
