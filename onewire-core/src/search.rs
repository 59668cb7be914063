use core::sync::atomic::{AtomicBool, Ordering};

use crate::{
    ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD, OneWire, OneWireStatus, RomId,
    error::OneWireError,
};

/// A structure for searching devices on a 1-Wire bus.
/// This structure implements the search algorithm for discovering devices on the 1-Wire bus.
/// It maintains the state of the search, and borrows the bus for as long as the search lives.
pub struct OneWireSearch<'a, T> {
    pub(crate) onewire: &'a mut T,
    pub(crate) cmd: u8,
    pub(crate) last_device: bool,
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    family: u8,
    rom: [u8; 8],
}

impl<T> core::fmt::Debug for OneWireSearch<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OneWireSearch")
            .field("cmd", &self.cmd)
            .field("last_device", &self.last_device)
            .field("last_discrepancy", &self.last_discrepancy)
            .field("last_family_discrepancy", &self.last_family_discrepancy)
            .field("family", &self.family)
            .field("rom", &self.rom)
            .finish()
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Type of search performed using [`OneWireSearch`] or [`OneWireSearchAsync`](crate::OneWireSearchAsync).
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_CMD,
    /// Search only for devices with alarm
    Alarmed = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

/// Devices found by a complete discovery.
#[derive(Debug, Default, Clone)]
pub struct Discovery<const N: usize> {
    /// CRC-valid addresses, in the order the search resolved them.
    pub devices: heapless::Vec<RomId, N>,
    /// Candidates whose check byte did not match. Each one was logged as a warning; those past
    /// the first `N` are only logged.
    pub crc_failures: heapless::Vec<RomId, N>,
    /// More valid devices answered than `N`; the search stopped early.
    pub truncated: bool,
}

impl<const N: usize> Discovery<N> {
    /// Number of valid devices found.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no valid device was found.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate over the valid devices.
    pub fn iter(&self) -> impl Iterator<Item = &RomId> {
        self.devices.iter()
    }

    /// Files one search result. Returns `false` once `devices` is full and the search must stop.
    pub(crate) fn record(&mut self, found: Result<RomId, RomId>) -> bool {
        match found {
            Ok(rom) => {
                if self.devices.push(rom).is_err() {
                    log::warn!("search: more than {} devices on the bus, stopping", N);
                    self.truncated = true;
                }
            }
            Err(rom) => {
                log::warn!("search: discarding ROM {rom:x} with invalid CRC");
                if self.crc_failures.push(rom).is_err() {
                    log::debug!("search: CRC failure list full, not keeping {rom:x}");
                }
            }
        }
        !self.truncated
    }
}

impl<'a, T> OneWireSearch<'a, T> {
    /// Creates a new [`OneWireSearch`] instance.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `cmd` - The kind of search: all devices, or devices in alarm state.
    pub fn new(onewire: &'a mut T, cmd: OneWireSearchKind) -> Self {
        Self::with_family(onewire, cmd, 0)
    }

    /// Creates a new [`OneWireSearch`] instance with a specific family code.
    ///
    /// The first pass goes straight to the subtree of `family`, and the search ends
    /// as soon as it resolves a device of another family.
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `cmd` - The kind of search: all devices, or devices in alarm state.
    /// * `family` - The family code of the devices to search for. 0 searches all families.
    pub fn with_family(onewire: &'a mut T, cmd: OneWireSearchKind, family: u8) -> Self {
        let mut search = Self {
            onewire,
            cmd: cmd as _,
            last_device: false,
            last_discrepancy: 0,
            last_family_discrepancy: 0,
            family,
            rom: [0; 8],
        };
        search.clear();
        search
    }

    /// Skip the remaining devices of the family of the last device found.
    /// The next pass continues with the next family.
    pub fn skip_family(&mut self) {
        self.last_discrepancy = self.last_family_discrepancy;
        self.last_family_discrepancy = 0;
        if self.last_discrepancy == 0 {
            self.last_device = true;
        }
    }

    /// Resets the search state.
    pub(crate) fn clear(&mut self) {
        self.last_device = false;
        self.last_family_discrepancy = 0;
        self.rom = [self.family, 0, 0, 0, 0, 0, 0, 0];
        // Forcing every bit up to 64 steers the first pass into the family subtree
        self.last_discrepancy = if self.family != 0 { 64 } else { 0 };
    }

    /// Targets the next pass at `rom` alone.
    pub(crate) fn prepare_verify(&mut self, rom: RomId) {
        self.clear();
        self.rom = *rom.as_bytes();
        self.last_discrepancy = 64;
    }

    /// Direction to take at bit `id_bit_num` (1-64) when devices disagree.
    pub(crate) fn direction(&self, id_bit_num: u8) -> bool {
        if id_bit_num < self.last_discrepancy {
            let bit = id_bit_num as usize - 1;
            self.rom[bit / 8] & (1 << (bit % 8)) != 0
        } else {
            id_bit_num == self.last_discrepancy
        }
    }

    pub(crate) fn set_bit(&mut self, id_bit_num: u8, value: bool) {
        let bit = id_bit_num as usize - 1;
        let mask = 1 << (bit % 8);
        if value {
            self.rom[bit / 8] |= mask;
        } else {
            self.rom[bit / 8] &= !mask;
        }
    }

    /// Book-keeping at the end of a complete pass.
    pub(crate) fn finish_pass<E>(
        &mut self,
        last_zero: u8,
        family_zero: u8,
    ) -> Result<Option<RomId>, OneWireError<E>> {
        self.last_discrepancy = last_zero;
        self.last_family_discrepancy = family_zero;
        self.last_device = last_zero == 0;
        let rom = RomId::new(self.rom);
        log::debug!(
            "search: pass resolved {rom:x}, last discrepancy {}",
            self.last_discrepancy
        );
        if self.rom == [0; 8] {
            self.clear();
            return Err(OneWireError::ShortCircuit);
        }
        if self.family != 0 && rom.family() != self.family {
            // Left the family subtree
            self.last_device = true;
            return Ok(None);
        }
        if !rom.is_valid() {
            return Err(OneWireError::InvalidRomCrc(rom));
        }
        Ok(Some(rom))
    }
}

pub(crate) fn cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

impl<T: OneWire> OneWireSearch<'_, T> {
    /// Searches for devices on the 1-Wire bus.
    /// This method implements the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html) to discover devices connected to the bus.
    /// The [next](OneWireSearch::next) method can be called repeatedly to find all devices on the bus.
    /// At the end of the search, calling this method will return `None` to indicate that no more devices are present.
    /// The search state is reset if the [verify](OneWireSearch::verify) method is called.
    ///
    /// # Returns
    /// * `Ok(Some(rom))` for every device resolved, in depth-first order, taking the 0 branch
    ///   of a discrepancy before the 1 branch.
    /// * `Ok(None)` once the search is exhausted, or if nobody answers the reset.
    ///
    /// # Errors
    /// * [`OneWireError::InvalidRomCrc`] if the resolved address fails its check. The search
    ///   state has already moved past this address: calling `next` again continues the search.
    /// * [`OneWireError::DevicesVanished`] if no device answered a bit, [`OneWireError::ShortCircuit`]
    ///   if every bit read back as 0. Both restart the search.
    /// * [`OneWireError::BusFault`] from the bus master.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<RomId>, OneWireError<T::BusError>> {
        if self.last_device {
            return Ok(None); // If the last device was found, return None
        }
        let status = self.onewire.reset()?;
        if !status.presence() {
            log::debug!("search: no presence pulse");
            self.clear();
            return Ok(None);
        }
        if status.shortcircuit() {
            self.clear();
            return Err(OneWireError::ShortCircuit);
        }
        self.onewire.write_byte(self.cmd)?;
        let mut last_zero = 0;
        let mut family_zero = 0;
        for id_bit_num in 1..=64u8 {
            let dir = self.direction(id_bit_num);
            let triplet = self.onewire.read_triplet(dir)?;
            if triplet.id_bit && triplet.complement_bit {
                // Nobody is driving the bus any more
                self.clear();
                return Err(OneWireError::DevicesVanished);
            }
            if !triplet.id_bit && !triplet.complement_bit && !triplet.direction {
                last_zero = id_bit_num;
                if last_zero < 9 {
                    family_zero = last_zero;
                }
            }
            self.set_bit(id_bit_num, triplet.direction);
        }
        self.finish_pass(last_zero, family_zero)
    }

    /// Runs the search to completion and collects the result.
    ///
    /// Addresses failing their CRC are reported in [`Discovery::crc_failures`] and do not stop
    /// the search. `cancel` is checked before every pass, never in the middle of one.
    ///
    /// # Errors
    /// [`OneWireError::Cancelled`] if `cancel` was raised, and the errors of [next](OneWireSearch::next)
    /// other than [`OneWireError::InvalidRomCrc`].
    pub fn discover<const N: usize>(
        &mut self,
        cancel: Option<&AtomicBool>,
    ) -> Result<Discovery<N>, OneWireError<T::BusError>> {
        let mut found = Discovery::default();
        loop {
            if cancelled(cancel) {
                return Err(OneWireError::Cancelled);
            }
            let keep_going = match self.next() {
                Ok(Some(rom)) => found.record(Ok(rom)),
                Ok(None) => break,
                Err(OneWireError::InvalidRomCrc(rom)) => found.record(Err(rom)),
                Err(e) => return Err(e),
            };
            if !keep_going {
                break;
            }
        }
        log::debug!(
            "search: {} devices, {} CRC failures",
            found.devices.len(),
            found.crc_failures.len()
        );
        Ok(found)
    }

    /// Verifies if the device with the given ROM code is present on the 1-Wire bus.
    ///
    /// This functions resets the search state, and calling [next](OneWireSearch::next) after this call will start a new search.
    pub fn verify(&mut self, rom: RomId) -> Result<bool, OneWireError<T::BusError>> {
        self.prepare_verify(rom);
        let res = match self.next() {
            Ok(found) => Ok(found == Some(rom)),
            Err(OneWireError::DevicesVanished | OneWireError::InvalidRomCrc(_)) => Ok(false),
            Err(e) => Err(e),
        };
        self.clear();
        res
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{OneWireResult, PresenceResult};

    /// Slaves answering the search protocol bit by bit, on a wired-AND line.
    pub(crate) struct FakeBus {
        pub(crate) devices: heapless::Vec<RomId, 8>,
        active: heapless::Vec<bool, 8>,
        pub(crate) alarmed: heapless::Vec<bool, 8>,
        bit: usize,
        phase: u8,
        pub(crate) stuck_low: bool,
        pub(crate) vanish_at: Option<usize>,
        pub(crate) resets: usize,
    }

    impl FakeBus {
        pub(crate) fn new(devices: &[RomId]) -> Self {
            Self {
                devices: heapless::Vec::from_slice(devices).unwrap(),
                active: heapless::Vec::new(),
                alarmed: devices.iter().map(|_| true).collect(),
                bit: 0,
                phase: 0,
                stuck_low: false,
                vanish_at: None,
                resets: 0,
            }
        }

        fn line(&self, complement: bool) -> bool {
            if self.stuck_low {
                return false;
            }
            if self.vanish_at == Some(self.bit) {
                return true;
            }
            self.devices
                .iter()
                .zip(&self.active)
                .filter(|&(_, &active)| active)
                .all(|(rom, _)| rom.bit(self.bit) != complement)
        }
    }

    impl OneWire for FakeBus {
        type Status = PresenceResult;
        type BusError = ();

        fn reset(&mut self) -> OneWireResult<PresenceResult, ()> {
            self.resets += 1;
            self.bit = 0;
            self.phase = 0;
            self.active = self.devices.iter().map(|_| true).collect();
            if self.devices.is_empty() && !self.stuck_low {
                Ok(PresenceResult::NoDevice)
            } else {
                Ok(PresenceResult::Present)
            }
        }

        fn write_byte(&mut self, byte: u8) -> OneWireResult<(), ()> {
            if byte == ONEWIRE_CONDITIONAL_SEARCH_CMD {
                for (active, &alarmed) in self.active.iter_mut().zip(&self.alarmed) {
                    *active &= alarmed;
                }
            }
            Ok(())
        }

        fn read_byte(&mut self) -> OneWireResult<u8, ()> {
            Err(OneWireError::BusFault(()))
        }

        fn write_bit(&mut self, bit: bool) -> OneWireResult<(), ()> {
            assert_eq!(self.phase, 2, "direction written out of sequence");
            for (rom, active) in self.devices.iter().zip(self.active.iter_mut()) {
                *active &= rom.bit(self.bit) == bit;
            }
            self.bit += 1;
            self.phase = 0;
            Ok(())
        }

        fn read_bit(&mut self) -> OneWireResult<bool, ()> {
            let complement = self.phase == 1;
            self.phase += 1;
            Ok(self.line(complement))
        }
    }

    pub(crate) fn rom(family: u8, serial: u8) -> RomId {
        RomId::from_parts(family, [serial, 0x5a, 0x01, 0x00, 0x00, 0x00])
    }

    fn sorted<const N: usize>(roms: &heapless::Vec<RomId, N>) -> heapless::Vec<RomId, N> {
        let mut roms = roms.clone();
        roms.sort_unstable();
        roms
    }

    #[test]
    fn empty_bus() {
        let mut bus = FakeBus::new(&[]);
        let found = bus.search::<4>().unwrap();
        assert!(found.is_empty());
        assert!(found.crc_failures.is_empty());
        assert_eq!(bus.resets, 1);
    }

    #[test]
    fn single_device() {
        let dev = rom(0x28, 0x11);
        let mut bus = FakeBus::new(&[dev]);
        let found = bus.search::<4>().unwrap();
        assert_eq!(found.devices.as_slice(), &[dev]);
        assert!(found.devices[0].is_valid());
        // One pass, no discrepancy left
        assert_eq!(bus.resets, 1);
    }

    #[test]
    fn devices_differing_in_one_serial_bit() {
        for k in 8..56 {
            let a = RomId::from_parts(0x28, [0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);
            let mut bytes = *a.as_bytes();
            bytes[k / 8] ^= 1 << (k % 8);
            let b = RomId::from_parts(bytes[0], bytes[1..7].try_into().unwrap());
            let mut bus = FakeBus::new(&[b, a]);
            let found = bus.search::<4>().unwrap();
            assert_eq!(found.len(), 2, "bit {k}");
            assert_ne!(found.devices[0], found.devices[1]);
            assert!(found.iter().all(RomId::is_valid));
            assert_eq!(sorted(&found.devices), sorted(&bus.devices));
        }
    }

    #[test]
    fn zero_branch_first() {
        let low = RomId::from_parts(0x28, [0x00, 0, 0, 0, 0, 0]);
        let high = RomId::from_parts(0x28, [0x01, 0, 0, 0, 0, 0]);
        let mut bus = FakeBus::new(&[high, low]);
        let found = bus.search::<4>().unwrap();
        assert_eq!(found.devices.as_slice(), &[low, high]);
    }

    #[test]
    fn many_devices() {
        let roms = [
            rom(0x28, 0x01),
            rom(0x28, 0x02),
            rom(0x10, 0x7f),
            rom(0x42, 0x80),
            rom(0x28, 0xfe),
            rom(0x01, 0x33),
        ];
        let mut bus = FakeBus::new(&roms);
        let found = bus.search::<8>().unwrap();
        assert_eq!(found.len(), roms.len());
        assert_eq!(sorted(&found.devices), sorted(&bus.devices));
        assert!(!found.truncated);
    }

    #[test]
    fn crc_failure_does_not_stop_search() {
        let good = rom(0x28, 0x01);
        let mut bad = *rom(0x28, 0x02).as_bytes();
        bad[7] ^= 0xff;
        let bad = RomId::new(bad);
        let other = rom(0x28, 0x04);
        let mut bus = FakeBus::new(&[good, bad, other]);
        let found = bus.search::<4>().unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.devices.contains(&good));
        assert!(found.devices.contains(&other));
        assert_eq!(found.crc_failures.as_slice(), &[bad]);
    }

    #[test]
    fn crc_failures_beyond_capacity_do_not_stop_search() {
        let corrupt = |serial| {
            let mut bytes = *rom(0x28, serial).as_bytes();
            bytes[7] ^= 0x01;
            RomId::new(bytes)
        };
        let (first, second) = (corrupt(0x00), corrupt(0x02));
        let good = rom(0x28, 0xff);
        let mut bus = FakeBus::new(&[first, second, good]);
        let found = bus.search::<1>().unwrap();
        assert_eq!(found.devices.as_slice(), &[good]);
        assert_eq!(found.crc_failures.len(), 1);
        assert!(!found.truncated);
    }

    #[test]
    fn next_continues_after_crc_failure() {
        let mut bad = *rom(0x28, 0x00).as_bytes();
        bad[7] ^= 0x01;
        let bad = RomId::new(bad);
        let good = rom(0x28, 0x01);
        let mut bus = FakeBus::new(&[bad, good]);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        assert_eq!(search.next(), Err(OneWireError::InvalidRomCrc(bad)));
        assert_eq!(search.next(), Ok(Some(good)));
        assert_eq!(search.next(), Ok(None));
    }

    #[test]
    fn vanished_devices() {
        let mut bus = FakeBus::new(&[rom(0x28, 0x01)]);
        bus.vanish_at = Some(20);
        assert_eq!(bus.search::<4>().unwrap_err(), OneWireError::DevicesVanished);
    }

    #[test]
    fn stuck_low_line() {
        let mut bus = FakeBus::new(&[]);
        bus.stuck_low = true;
        assert_eq!(bus.search::<4>().unwrap_err(), OneWireError::ShortCircuit);
    }

    #[test]
    fn truncates_at_capacity() {
        let mut bus = FakeBus::new(&[rom(0x28, 1), rom(0x28, 2), rom(0x28, 3)]);
        let found = bus.search::<2>().unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.truncated);
    }

    #[test]
    fn cancelled_between_passes() {
        let mut bus = FakeBus::new(&[rom(0x28, 1), rom(0x28, 2)]);
        let cancel = AtomicBool::new(true);
        let res = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal).discover::<4>(Some(&cancel));
        assert_eq!(res.unwrap_err(), OneWireError::Cancelled);
        assert_eq!(bus.resets, 0);
    }

    #[test]
    fn family_search() {
        let roms = [rom(0x10, 1), rom(0x28, 1), rom(0x28, 2), rom(0x42, 1)];
        let mut bus = FakeBus::new(&roms);
        let found = OneWireSearch::with_family(&mut bus, OneWireSearchKind::Normal, 0x28)
            .discover::<4>(None)
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.family() == 0x28));
    }

    #[test]
    fn family_skip() {
        // 0x10 sorts before 0x28 in transmission order
        let roms = [rom(0x10, 1), rom(0x10, 2), rom(0x28, 1)];
        let mut bus = FakeBus::new(&roms);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        let first = search.next().unwrap().unwrap();
        assert_eq!(first.family(), 0x10);
        search.skip_family();
        assert_eq!(search.next(), Ok(Some(roms[2])));
        assert_eq!(search.next(), Ok(None));
    }

    #[test]
    fn alarm_search() {
        let roms = [rom(0x28, 1), rom(0x28, 2), rom(0x28, 3)];
        let mut bus = FakeBus::new(&roms);
        bus.alarmed[0] = false;
        bus.alarmed[2] = false;
        let found = OneWireSearch::new(&mut bus, OneWireSearchKind::Alarmed)
            .discover::<4>(None)
            .unwrap();
        assert_eq!(found.devices.as_slice(), &[roms[1]]);
    }

    #[test]
    fn verify_presence() {
        let present = rom(0x28, 1);
        let mut bus = FakeBus::new(&[present, rom(0x28, 2)]);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        assert_eq!(search.verify(present), Ok(true));
        assert_eq!(search.verify(rom(0x28, 9)), Ok(false));
        // Search state was reset: a full search still finds both
        assert_eq!(search.discover::<4>(None).unwrap().len(), 2);
    }
}
