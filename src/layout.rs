//! Linear buffer <-> square texel grid mapping.
//!
//! A buffer of N 32-bit words is reinterpreted as a side x side grid of
//! RGBA32UI texels, four packed words per texel. Only buffers that fill the
//! square exactly (N = 4 * side^2) are supported; there is no truncation or
//! padding policy for remainders.

use crate::error::{Error, Result};

/// One texel: four packed words, i.e. two independent cipher blocks.
pub type Texel = [u32; 4];

/// Words packed into a single texel.
pub const WORDS_PER_TEXEL: u32 = 4;

/// Bytes occupied by one texel (RGBA32UI).
pub const BYTES_PER_TEXEL: u32 = 16;

/// Compute the grid side length backing a buffer of `word_count` words.
///
/// Fails fast, before any device resource is touched: the count must fill
/// whole texels, the texel count must be a perfect square with a non-zero
/// side, and the side must stay below the device maximum.
pub fn compute_grid_side(word_count: u32, max_side: u32) -> Result<u32> {
    if word_count == 0 || word_count % WORDS_PER_TEXEL != 0 {
        return Err(Error::InvalidArgument(format!(
            "buffer of {word_count} words does not fill whole {WORDS_PER_TEXEL}-word texels"
        )));
    }
    let texels = word_count / WORDS_PER_TEXEL;
    let side = texels.isqrt();
    if side == 0 || side * side != texels {
        return Err(Error::InvalidArgument(format!(
            "buffer of {word_count} words ({texels} texels) does not map to a square grid"
        )));
    }
    if side >= max_side {
        return Err(Error::ResourceExhausted(format!(
            "grid side {side} reaches the device maximum of {max_side}"
        )));
    }
    Ok(side)
}

/// Pack a linear word buffer into row-major texels covering a side x side
/// grid exactly.
pub fn pack(words: &[u32], side: u32) -> Result<Vec<Texel>> {
    let expected = (side * side * WORDS_PER_TEXEL) as usize;
    if words.len() != expected {
        return Err(Error::InvalidArgument(format!(
            "{} words cannot fill a {side}x{side} grid exactly ({expected} required)",
            words.len()
        )));
    }
    Ok(words
        .chunks_exact(WORDS_PER_TEXEL as usize)
        .map(|quad| [quad[0], quad[1], quad[2], quad[3]])
        .collect())
}

/// Exact inverse of [`pack`]: flatten row-major texels back to words.
pub fn unpack(texels: &[Texel]) -> Vec<u32> {
    texels.iter().flatten().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_SIDE: u32 = 16_384;

    #[test]
    fn side_of_a_perfect_square_buffer() {
        assert_eq!(compute_grid_side(4, MAX_SIDE).unwrap(), 1);
        assert_eq!(compute_grid_side(64, MAX_SIDE).unwrap(), 4);
        assert_eq!(compute_grid_side(100, MAX_SIDE).unwrap(), 5);
    }

    #[test]
    fn non_square_lengths_are_rejected() {
        // 6 words is not even a whole number of texels
        assert!(matches!(
            compute_grid_side(6, MAX_SIDE),
            Err(Error::InvalidArgument(_))
        ));
        // 20 words = 5 texels, not a perfect square
        assert!(matches!(
            compute_grid_side(20, MAX_SIDE),
            Err(Error::InvalidArgument(_))
        ));
        assert!(compute_grid_side(0, MAX_SIDE).is_err());
    }

    #[test]
    fn side_at_or_above_device_maximum_is_rejected() {
        assert!(matches!(
            compute_grid_side(64, 4),
            Err(Error::ResourceExhausted(_))
        ));
        assert!(compute_grid_side(64, 5).is_ok());
    }

    #[test]
    fn pack_unpack_is_the_identity() {
        let words: Vec<u32> = (0..64).collect();
        let texels = pack(&words, 4).unwrap();
        assert_eq!(texels.len(), 16);
        assert_eq!(texels[0], [0, 1, 2, 3]);
        assert_eq!(texels[15], [60, 61, 62, 63]);
        assert_eq!(unpack(&texels), words);
    }

    #[test]
    fn pack_rejects_a_length_that_does_not_fill_the_grid() {
        let words: Vec<u32> = (0..60).collect();
        assert!(pack(&words, 4).is_err());
    }
}
