use core::sync::atomic::AtomicBool;

use crate::{
    Discovery, OneWireAsync, OneWireSearchKind, OneWireStatus, RomId, error::OneWireError,
    search::{OneWireSearch, cancelled},
};

/// A structure for asynchronous searching of devices on a 1-Wire bus.
/// This structure implements the search algorithm for discovering devices on the 1-Wire bus.
/// It maintains the state of the search.
///
/// The algorithm and its outcomes are those of [`OneWireSearch`].
pub struct OneWireSearchAsync<'a, T> {
    inner: OneWireSearch<'a, T>,
}

impl<T> core::fmt::Debug for OneWireSearchAsync<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.inner, f)
    }
}

impl<'a, T> OneWireSearchAsync<'a, T> {
    /// Creates a new [OneWireSearchAsync] instance.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWireAsync` trait.
    /// * `cmd` - The kind of search: all devices, or devices in alarm state.
    pub fn new(onewire: &'a mut T, cmd: OneWireSearchKind) -> Self {
        Self {
            inner: OneWireSearch::new(onewire, cmd),
        }
    }

    /// Creates a new [`OneWireSearchAsync`] instance with a specific family code.
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWireAsync` trait.
    /// * `cmd` - The kind of search: all devices, or devices in alarm state.
    /// * `family` - The family code of the devices to search for.
    pub fn with_family(onewire: &'a mut T, cmd: OneWireSearchKind, family: u8) -> Self {
        Self {
            inner: OneWireSearch::with_family(onewire, cmd, family),
        }
    }

    /// Skip the remaining devices of the family of the last device found.
    pub fn skip_family(&mut self) {
        self.inner.skip_family();
    }
}

impl<T: OneWireAsync> OneWireSearchAsync<'_, T> {
    /// Searches for the next device on the 1-Wire bus. See [`OneWireSearch::next`].
    pub async fn next(&mut self) -> Result<Option<RomId>, OneWireError<T::BusError>> {
        let st = &mut self.inner;
        if st.last_device {
            return Ok(None);
        }
        let status = st.onewire.reset().await?;
        if !status.presence() {
            log::debug!("search: no presence pulse");
            st.clear();
            return Ok(None);
        }
        if status.shortcircuit() {
            st.clear();
            return Err(OneWireError::ShortCircuit);
        }
        st.onewire.write_byte(st.cmd).await?;
        let mut last_zero = 0;
        let mut family_zero = 0;
        for id_bit_num in 1..=64u8 {
            let dir = st.direction(id_bit_num);
            let triplet = st.onewire.read_triplet(dir).await?;
            if triplet.id_bit && triplet.complement_bit {
                st.clear();
                return Err(OneWireError::DevicesVanished);
            }
            if !triplet.id_bit && !triplet.complement_bit && !triplet.direction {
                last_zero = id_bit_num;
                if last_zero < 9 {
                    family_zero = last_zero;
                }
            }
            st.set_bit(id_bit_num, triplet.direction);
        }
        st.finish_pass(last_zero, family_zero)
    }

    /// Runs the search to completion. See [`OneWireSearch::discover`].
    pub async fn discover<const N: usize>(
        &mut self,
        cancel: Option<&AtomicBool>,
    ) -> Result<Discovery<N>, OneWireError<T::BusError>> {
        let mut found = Discovery::default();
        loop {
            if cancelled(cancel) {
                return Err(OneWireError::Cancelled);
            }
            let keep_going = match self.next().await {
                Ok(Some(rom)) => found.record(Ok(rom)),
                Ok(None) => break,
                Err(OneWireError::InvalidRomCrc(rom)) => found.record(Err(rom)),
                Err(e) => return Err(e),
            };
            if !keep_going {
                break;
            }
        }
        Ok(found)
    }

    /// Verifies if the device with the given ROM code is present on the 1-Wire bus.
    /// See [`OneWireSearch::verify`].
    pub async fn verify(&mut self, rom: RomId) -> Result<bool, OneWireError<T::BusError>> {
        self.inner.prepare_verify(rom);
        let res = match self.next().await {
            Ok(found) => Ok(found == Some(rom)),
            Err(OneWireError::DevicesVanished | OneWireError::InvalidRomCrc(_)) => Ok(false),
            Err(e) => Err(e),
        };
        self.inner.clear();
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        OneWire, OneWireResult, PresenceResult,
        search::tests::{FakeBus, rom},
    };
    use futures::executor::block_on;

    impl OneWireAsync for FakeBus {
        type Status = PresenceResult;
        type BusError = ();

        async fn reset(&mut self) -> OneWireResult<PresenceResult, ()> {
            OneWire::reset(self)
        }

        async fn write_byte(&mut self, byte: u8) -> OneWireResult<(), ()> {
            OneWire::write_byte(self, byte)
        }

        async fn read_byte(&mut self) -> OneWireResult<u8, ()> {
            OneWire::read_byte(self)
        }

        async fn write_bit(&mut self, bit: bool) -> OneWireResult<(), ()> {
            OneWire::write_bit(self, bit)
        }

        async fn read_bit(&mut self) -> OneWireResult<bool, ()> {
            OneWire::read_bit(self)
        }
    }

    #[test]
    fn finds_all_devices() {
        let roms = [rom(0x28, 1), rom(0x28, 2), rom(0x10, 3)];
        let mut bus = FakeBus::new(&roms);
        let found = block_on(OneWireAsync::search::<4>(&mut bus)).unwrap();
        assert_eq!(found.len(), 3);
        for r in &roms {
            assert!(found.devices.contains(r));
        }
    }

    #[test]
    fn empty_bus() {
        let mut bus = FakeBus::new(&[]);
        let found = block_on(OneWireAsync::search::<4>(&mut bus)).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn verify() {
        let present = rom(0x28, 1);
        let mut bus = FakeBus::new(&[present, rom(0x28, 2)]);
        let mut search = OneWireSearchAsync::new(&mut bus, OneWireSearchKind::Normal);
        assert_eq!(block_on(search.verify(present)), Ok(true));
        assert_eq!(block_on(search.verify(rom(0x42, 1))), Ok(false));
    }
}
