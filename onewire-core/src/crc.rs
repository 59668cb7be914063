/// Reflected form of the Dallas/Maxim polynomial x^8 + x^5 + x^4 + 1.
const POLY: u8 = 0x8c;

#[cfg(feature = "crc-table")]
static TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = update_bitwise(0, i as u8);
        i += 1;
    }
    table
};

const fn update_bitwise(crc: u8, byte: u8) -> u8 {
    let mut crc = crc ^ byte; // XOR the byte with the current CRC value
    let mut bit = 0;
    while bit < 8 {
        if crc & 0x1 == 0x1 {
            crc = (crc >> 1) ^ POLY;
        } else {
            crc >>= 1;
        }
        bit += 1;
    }
    crc
}

#[derive(Debug, Default, Clone, Copy)]
/// Calculate CRC-8 used in 1-Wire communications.
pub struct OneWireCrc(u8);

impl OneWireCrc {
    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    pub fn update(&mut self, byte: u8) {
        #[cfg(feature = "crc-table")]
        {
            self.0 = TABLE[(self.0 ^ byte) as usize];
        }
        #[cfg(not(feature = "crc-table"))]
        {
            self.0 = update_bitwise(self.0, byte);
        }
    }

    /// Validate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes.
    ///
    /// Running the CRC over a block followed by its own CRC leaves the register at zero.
    pub fn validate(sequence: &[u8]) -> bool {
        sequence.len() >= 2 && crc8(sequence) == 0
    }
}

/// Error returned by [`verify`] for input too short to hold data and a check byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidLength;

impl core::fmt::Display for InvalidLength {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("need at least one data byte and a check byte")
    }
}

impl core::error::Error for InvalidLength {}

/// Compute the 1-Wire CRC-8 of `bytes`. The CRC of an empty sequence is 0.
pub fn crc8(bytes: &[u8]) -> u8 {
    let mut crc = OneWireCrc::default();
    bytes.iter().for_each(|&b| crc.update(b));
    crc.value()
}

/// Check a block whose last byte is the CRC-8 of the bytes before it.
pub fn verify(bytes: &[u8]) -> Result<bool, InvalidLength> {
    match bytes.split_last() {
        Some((&check, data)) if !data.is_empty() => Ok(crc8(data) == check),
        _ => Err(InvalidLength),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn known_rom() {
        // DS18B20 ROM from Maxim application note 27
        let rom = [0x02, 0x1c, 0xb8, 0x01, 0x00, 0x00, 0x00, 0xa2];
        assert_eq!(crc8(&rom[..7]), 0xa2);
        assert_eq!(verify(&rom), Ok(true));
        assert!(OneWireCrc::validate(&rom));
    }

    #[test]
    fn table_matches_bitwise() {
        for byte in 0..=255u8 {
            for seed in [0x00, 0x5a, 0xff] {
                let mut crc = OneWireCrc(seed);
                crc.update(byte);
                assert_eq!(crc.value(), update_bitwise(seed, byte));
            }
        }
    }

    #[test]
    fn too_short() {
        assert_eq!(verify(&[]), Err(InvalidLength));
        assert_eq!(verify(&[0x00]), Err(InvalidLength));
        assert!(!OneWireCrc::validate(&[0x00]));
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn invalid_length_is_an_error() {
        fn as_error(e: &dyn core::error::Error) -> &dyn core::error::Error {
            e
        }
        let err = verify(&[0x42]).unwrap_err();
        assert!(as_error(&err).source().is_none());
    }

    #[test]
    fn appended_crc_verifies() {
        let mut rng = rand::rng();
        for len in 1..32 {
            let mut buf = [0u8; 33];
            rng.fill(&mut buf[..len]);
            buf[len] = crc8(&buf[..len]);
            assert_eq!(verify(&buf[..=len]), Ok(true), "length {len}");
        }
    }

    #[test]
    fn corrupted_check_byte_fails() {
        let mut rng = rand::rng();
        for _ in 0..64 {
            let mut block = [0u8; 8];
            rng.fill(&mut block[..7]);
            block[7] = crc8(&block[..7]);
            let flip: u8 = rng.random_range(1..=255);
            block[7] ^= flip;
            assert_eq!(verify(&block), Ok(false));
        }
    }

    #[test]
    fn every_single_bit_error_is_detected() {
        let mut block = [0x28, 0xff, 0x4c, 0x31, 0x91, 0x16, 0x04, 0x00];
        block[7] = crc8(&block[..7]);
        for bit in 0..64 {
            let mut corrupted = block;
            corrupted[bit / 8] ^= 1 << (bit % 8);
            assert_eq!(verify(&corrupted), Ok(false), "bit {bit}");
        }
    }
}
