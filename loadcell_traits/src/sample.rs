//! Raw sample helpers shared by every source implementation.

/// Width of one HX711 conversion in bits.
pub const SAMPLE_BITS: u32 = 24;

const SIGN_BIT: u32 = 1 << (SAMPLE_BITS - 1);
const SAMPLE_MASK: u32 = (1 << SAMPLE_BITS) - 1;

/// Sign-extend a 24-bit two's-complement field to `i32`. Bits above 23 are ignored.
#[inline]
pub fn sign_extend_24(raw: u32) -> i32 {
    let v = raw & SAMPLE_MASK;
    if v & SIGN_BIT != 0 {
        (v | !SAMPLE_MASK) as i32
    } else {
        v as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_values_pass_through() {
        assert_eq!(sign_extend_24(0), 0);
        assert_eq!(sign_extend_24(1), 1);
        assert_eq!(sign_extend_24(0x7F_FFFF), 8_388_607);
    }

    #[test]
    fn negative_values_extend() {
        assert_eq!(sign_extend_24(0xFF_FFFF), -1);
        assert_eq!(sign_extend_24(0x80_0000), -8_388_608);
    }

    #[test]
    fn upper_bits_are_ignored() {
        assert_eq!(sign_extend_24(0xAB00_0001), 1);
        assert_eq!(sign_extend_24(0x0180_0000), -8_388_608);
    }
}
