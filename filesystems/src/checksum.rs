// Checksums used by on-disk headers
// Each one works on a private copy with the checksum field zeroed, the
// caller's buffer is never touched

use byteorder::{BigEndian, ByteOrder};

/// Copy `data` and zero the 4-byte checksum field at `checksum_offset`
fn zeroed_copy(data: &[u8], checksum_offset: usize) -> Vec<u8> {
    let mut copy = data.to_vec();
    if let Some(field) = copy.get_mut(checksum_offset..checksum_offset + 4) {
        field.fill(0);
    }
    copy
}

/// Rolling sum with carry-around over big-endian 32-bit words, complemented.
///
/// This is the AmigaDOS boot block checksum: whenever an addition
/// overflows, the accumulator is incremented by one.
pub fn carry_around_checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let copy = zeroed_copy(data, checksum_offset);
    let mut sum: u32 = 0;
    for word in copy.chunks_exact(4) {
        let (next, carry) = sum.overflowing_add(BigEndian::read_u32(word));
        sum = if carry { next.wrapping_add(1) } else { next };
    }
    !sum
}

/// Two's-complement sum of big-endian 32-bit words.
///
/// Plain wrapping addition, then negated, so that summing every word of
/// the structure including the stored checksum gives zero.
pub fn negated_block_sum(data: &[u8], checksum_offset: usize) -> u32 {
    let copy = zeroed_copy(data, checksum_offset);
    let sum = copy
        .chunks_exact(4)
        .fold(0u32, |acc, word| acc.wrapping_add(BigEndian::read_u32(word)));
    sum.wrapping_neg()
}

/// CRC-32C over a sector with its checksum field zeroed, as used by
/// metadata-checksumming filesystems. The result is the value the disk
/// stores little-endian.
pub fn crc32c_sector(data: &[u8], checksum_offset: usize) -> u32 {
    crc32c::crc32c(&zeroed_copy(data, checksum_offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_around_reference_boot_block() {
        // "DOS\0", checksum slot, root block 880, remaining words zero
        let mut block = vec![0u8; 1024];
        block[0..4].copy_from_slice(b"DOS\0");
        block[8..12].copy_from_slice(&880u32.to_be_bytes());

        assert_eq!(carry_around_checksum(&block, 4), 0xBBB0_A98F);
    }

    #[test]
    fn test_carry_is_added_back() {
        let mut block = vec![0u8; 12];
        block[0..4].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        block[8..12].copy_from_slice(&2u32.to_be_bytes());
        // 0xFFFFFFFF + 2 overflows to 1, carry makes it 2
        assert_eq!(carry_around_checksum(&block, 4), !2u32);
    }

    #[test]
    fn test_checksum_field_is_ignored() {
        let mut block = vec![0u8; 512];
        block[0..4].copy_from_slice(&2u32.to_be_bytes());
        let before = negated_block_sum(&block, 0x14);
        block[0x14..0x18].copy_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        assert_eq!(negated_block_sum(&block, 0x14), before);
        // Caller's buffer keeps its stored value
        assert_eq!(&block[0x14..0x18], &0xDEAD_BEEFu32.to_be_bytes());
    }

    #[test]
    fn test_negated_sum_balances_to_zero() {
        let mut block = vec![0u8; 512];
        block[0..4].copy_from_slice(&2u32.to_be_bytes());
        block[0x1FC..0x200].copy_from_slice(&1u32.to_be_bytes());
        let checksum = negated_block_sum(&block, 0x14);
        assert_eq!(checksum, 0u32.wrapping_sub(3));

        block[0x14..0x18].copy_from_slice(&checksum.to_be_bytes());
        let total = block
            .chunks_exact(4)
            .fold(0u32, |acc, w| acc.wrapping_add(BigEndian::read_u32(w)));
        assert_eq!(total, 0);
    }

    #[test]
    fn test_crc32c_known_value() {
        // Standard CRC-32C check value
        assert_eq!(crc32c::crc32c(b"123456789"), 0xE306_9283);
        let data = b"1234\xFF\xFF\xFF\xFF56789".to_vec();
        assert_eq!(crc32c_sector(&data, 4), crc32c::crc32c(b"1234\0\0\0\056789"));
    }
}
