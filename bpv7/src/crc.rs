//! CRC protection of serialized blocks, per RFC 9171 §4.2.1.
//!
//! The CRC is always computed over the complete serialization of a block
//! with the trailing CRC slot zero-filled, then written big-endian over that
//! slot. Verification recomputes over the received bytes with the slot
//! zeroed again.

use crate::Error;

const X25: ::crc::Crc<u16> = ::crc::Crc::<u16>::new(&::crc::CRC_16_IBM_SDLC);
const CASTAGNOLI: ::crc::Crc<u32> = ::crc::Crc::<u32>::new(&::crc::CRC_32_ISCSI);

const ZEROS: [u8; 4] = [0; 4];

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum CrcType {
    #[default]
    None,
    X25,
    Crc32c,
}

impl CrcType {
    /// Width of the CRC value in bytes.
    pub fn width(self) -> usize {
        match self {
            CrcType::None => 0,
            CrcType::X25 => 2,
            CrcType::Crc32c => 4,
        }
    }
}

impl From<CrcType> for u64 {
    fn from(value: CrcType) -> Self {
        match value {
            CrcType::None => 0,
            CrcType::X25 => 1,
            CrcType::Crc32c => 2,
        }
    }
}

impl TryFrom<u64> for CrcType {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Error> {
        match value {
            0 => Ok(CrcType::None),
            1 => Ok(CrcType::X25),
            2 => Ok(CrcType::Crc32c),
            v => Err(Error::InvalidCrcType(v)),
        }
    }
}

/// Computes the CRC of a fully-serialized block whose trailing CRC slot is
/// zero-filled, and overwrites the slot with the big-endian result.
pub fn patch(crc_type: CrcType, block: &mut [u8]) {
    match crc_type {
        CrcType::None => {}
        CrcType::X25 => {
            let crc = X25.checksum(block);
            let at = block.len() - 2;
            block[at..].copy_from_slice(&crc.to_be_bytes());
        }
        CrcType::Crc32c => {
            let crc = CASTAGNOLI.checksum(block);
            let at = block.len() - 4;
            block[at..].copy_from_slice(&crc.to_be_bytes());
        }
    }
}

/// Verifies the trailing CRC of a fully-serialized block.
pub fn verify(crc_type: CrcType, block: &[u8]) -> Result<(), Error> {
    let width = crc_type.width();
    if block.len() < width {
        return Err(Error::InvalidStructure("block shorter than its CRC"));
    }
    let (body, tail) = block.split_at(block.len() - width);
    match crc_type {
        CrcType::None => Ok(()),
        CrcType::X25 => {
            let mut digest = X25.digest();
            digest.update(body);
            digest.update(&ZEROS[..2]);
            if digest.finalize().to_be_bytes() == tail {
                Ok(())
            } else {
                Err(Error::CrcMismatch)
            }
        }
        CrcType::Crc32c => {
            let mut digest = CASTAGNOLI.digest();
            digest.update(body);
            digest.update(&ZEROS);
            if digest.finalize().to_be_bytes() == tail {
                Ok(())
            } else {
                Err(Error::CrcMismatch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x25_check_value() {
        // "123456789" -> 0x906E for CRC-16/IBM-SDLC
        assert_eq!(X25.checksum(b"123456789"), 0x906E);
    }

    #[test]
    fn crc32c_check_value() {
        // "123456789" -> 0xE3069283 for CRC-32/ISCSI
        assert_eq!(CASTAGNOLI.checksum(b"123456789"), 0xE3069283);
    }

    #[test]
    fn patch_then_verify() {
        for crc_type in [CrcType::X25, CrcType::Crc32c] {
            let mut block = b"some serialized block".to_vec();
            block.extend(std::iter::repeat(0).take(crc_type.width()));
            patch(crc_type, &mut block);
            verify(crc_type, &block).unwrap();
        }
    }

    #[test]
    fn corruption_detected() {
        let mut block = b"some serialized block".to_vec();
        block.extend([0, 0, 0, 0]);
        patch(CrcType::Crc32c, &mut block);
        for i in 0..block.len() {
            let mut corrupt = block.clone();
            corrupt[i] ^= 0x01;
            assert!(matches!(
                verify(CrcType::Crc32c, &corrupt),
                Err(Error::CrcMismatch)
            ));
        }
    }

    #[test]
    fn none_always_passes() {
        verify(CrcType::None, b"anything").unwrap();
    }
}
