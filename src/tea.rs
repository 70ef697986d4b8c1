//! TEA block cipher, host side.
//!
//! TEA is a known-weak cipher; it is used here because every 64-bit block is
//! independent, which makes the workload embarrassingly parallel. The exact
//! same round function runs inside the per-pixel shader, so this module
//! doubles as the oracle the GPU output is checked against.

use crate::error::{Error, Result};

/// One cipher block: two 32-bit words.
pub type Block = [u32; 2];

/// 128-bit key as four 32-bit words, fixed for the duration of a run.
pub type Key = [u32; 4];

/// Golden-ratio round constant.
pub const DELTA: u32 = 0x9e37_79b9;

/// Encrypt one block with `rounds` iterations.
///
/// All arithmetic wraps; there is no failure mode and no upper bound on
/// `rounds` (a count large enough to overflow the accumulator still inverts
/// correctly under [`decrypt_block`] with the same count).
pub fn encrypt_block(block: Block, key: &Key, rounds: u32) -> Block {
    let [mut v0, mut v1] = block;
    let mut sum = 0u32;
    for _ in 0..rounds {
        sum = sum.wrapping_add(DELTA);
        v0 = v0.wrapping_add(
            ((v1 << 4).wrapping_add(key[0]))
                ^ v1.wrapping_add(sum)
                ^ ((v1 >> 5).wrapping_add(key[1])),
        );
        v1 = v1.wrapping_add(
            ((v0 << 4).wrapping_add(key[2]))
                ^ v0.wrapping_add(sum)
                ^ ((v0 >> 5).wrapping_add(key[3])),
        );
    }
    [v0, v1]
}

/// Decrypt one block: the exact algebraic inverse of [`encrypt_block`].
///
/// The accumulator starts at `DELTA * rounds` (wrapping) and v1 is unwound
/// before v0, mirroring the forward dependency order.
pub fn decrypt_block(block: Block, key: &Key, rounds: u32) -> Block {
    let [mut v0, mut v1] = block;
    let mut sum = DELTA.wrapping_mul(rounds);
    for _ in 0..rounds {
        v1 = v1.wrapping_sub(
            ((v0 << 4).wrapping_add(key[2]))
                ^ v0.wrapping_add(sum)
                ^ ((v0 >> 5).wrapping_add(key[3])),
        );
        v0 = v0.wrapping_sub(
            ((v1 << 4).wrapping_add(key[0]))
                ^ v1.wrapping_add(sum)
                ^ ((v1 >> 5).wrapping_add(key[1])),
        );
        sum = sum.wrapping_sub(DELTA);
    }
    [v0, v1]
}

/// Encrypt a word buffer block-wise (consecutive pairs form blocks).
pub fn encrypt_words(words: &[u32], key: &Key, rounds: u32) -> Result<Vec<u32>> {
    transform_words(words, key, rounds, encrypt_block)
}

/// Decrypt a word buffer block-wise.
pub fn decrypt_words(words: &[u32], key: &Key, rounds: u32) -> Result<Vec<u32>> {
    transform_words(words, key, rounds, decrypt_block)
}

fn transform_words(
    words: &[u32],
    key: &Key,
    rounds: u32,
    transform: fn(Block, &Key, u32) -> Block,
) -> Result<Vec<u32>> {
    if words.is_empty() || words.len() % 2 != 0 {
        return Err(Error::InvalidArgument(format!(
            "word count {} is not a positive multiple of 2",
            words.len()
        )));
    }
    let mut out = Vec::with_capacity(words.len());
    for pair in words.chunks_exact(2) {
        let [v0, v1] = transform([pair[0], pair[1]], key, rounds);
        out.push(v0);
        out.push(v1);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: Key = [0xDEAD_BEEF, 0xCAFE_FACE, 0xFACE_B00C, 0xF00D_1337];

    #[test]
    fn round_trip_inverts_for_all_round_counts() {
        let block: Block = [0xFFFF_0005, 0xFFFF_000A];
        for rounds in [0u32, 1, 2, 16, 32, 64] {
            let cipher = encrypt_block(block, &KEY, rounds);
            assert_eq!(decrypt_block(cipher, &KEY, rounds), block, "rounds={rounds}");
        }
    }

    #[test]
    fn zero_rounds_is_identity() {
        let block: Block = [123, 456];
        assert_eq!(encrypt_block(block, &KEY, 0), block);
        assert_eq!(decrypt_block(block, &KEY, 0), block);
    }

    #[test]
    fn encryption_changes_the_block() {
        let block: Block = [300, 400];
        assert_ne!(encrypt_block(block, &KEY, 32), block);
    }

    #[test]
    fn accumulator_wraparound_still_inverts() {
        // 3 * DELTA already overflows u32, so this exercises the wrapping path
        let block: Block = [0x0102_0304, 0x0506_0708];
        let cipher = encrypt_block(block, &KEY, 3);
        assert_eq!(decrypt_block(cipher, &KEY, 3), block);
    }

    #[test]
    fn word_helpers_apply_the_cipher_per_block() {
        let words = [1u32, 2, 3, 4, 5, 6];
        let cipher = encrypt_words(&words, &KEY, 32).unwrap();
        for (i, pair) in words.chunks_exact(2).enumerate() {
            let expected = encrypt_block([pair[0], pair[1]], &KEY, 32);
            assert_eq!(&cipher[i * 2..i * 2 + 2], &expected);
        }
        assert_eq!(decrypt_words(&cipher, &KEY, 32).unwrap(), words);
    }

    #[test]
    fn odd_word_counts_are_rejected() {
        assert!(encrypt_words(&[1, 2, 3], &KEY, 32).is_err());
        assert!(encrypt_words(&[], &KEY, 32).is_err());
    }
}
