//! Checksum-14: CRC-16/CCITT (poly 0x1021, init 0xFFFF, unreflected) masked to 14 bits.

use crc::{CRC_16_IBM_3740, Crc};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

const MASK_14: u16 = 0x3fff;

/// Checksum over a whole raw frame, header byte included.
pub fn checksum14(frame: &[u8]) -> u16 {
    CRC16.checksum(frame) & MASK_14
}
