use crate::RomId;

/// One wire communication error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneWireError<E> {
    /// The bus master reported a fault (queue overrun, timeout, ...).
    /// The wire is unresponsive or mis-wired; the caller decides whether to rescan.
    BusFault(E),
    /// Indicates that no device is present on the bus.
    NoDevicePresent,
    /// Every device stopped answering in the middle of a sequence
    /// (both search bits read back as 1).
    DevicesVanished,
    /// The wire answered every slot with 0, the signature of a line held low.
    ShortCircuit,
    /// A data block failed its trailing CRC-8.
    InvalidCrc,
    /// Computed CRC of the ROM is invalid. Carries the rejected candidate.
    InvalidRomCrc(RomId),
    /// A CRC-checked block was too short to carry a check byte.
    InvalidLength,
    /// A multi-transaction operation was cancelled between transactions.
    Cancelled,
}

impl<E> OneWireError<E> {
    /// Whether the error means the physical bus needs attention,
    /// in which case the device population should be discovered again.
    pub fn is_bus_fault(&self) -> bool {
        matches!(
            self,
            Self::BusFault(_) | Self::DevicesVanished | Self::ShortCircuit
        )
    }
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::BusFault(other)
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for OneWireError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BusFault(e) => write!(f, "bus fault: {e:?}"),
            Self::NoDevicePresent => f.write_str("no device present"),
            Self::DevicesVanished => f.write_str("devices stopped responding"),
            Self::ShortCircuit => f.write_str("bus held low"),
            Self::InvalidCrc => f.write_str("CRC mismatch"),
            Self::InvalidRomCrc(rom) => write!(f, "CRC mismatch in ROM {rom:x}"),
            Self::InvalidLength => f.write_str("block too short for a CRC"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl<E: core::fmt::Debug> core::error::Error for OneWireError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_faults() {
        assert!(OneWireError::BusFault(()).is_bus_fault());
        assert!(OneWireError::<()>::DevicesVanished.is_bus_fault());
        assert!(OneWireError::<()>::ShortCircuit.is_bus_fault());
        assert!(!OneWireError::<()>::NoDevicePresent.is_bus_fault());
        assert!(!OneWireError::<()>::InvalidCrc.is_bus_fault());
        assert!(!OneWireError::<()>::InvalidRomCrc(RomId::new([0; 8])).is_bus_fault());
    }

    #[test]
    fn wraps_hardware_errors() {
        #[derive(Debug, PartialEq)]
        struct Stalled;
        let err: OneWireError<Stalled> = Stalled.into();
        assert_eq!(err, OneWireError::BusFault(Stalled));
    }
}
