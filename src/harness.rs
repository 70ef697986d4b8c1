//! End-to-end verification round trip.
//!
//! Encrypt on the device, check every block against the host cipher, decrypt
//! the device's own ciphertext on the device, and check that against the
//! original input. The host cipher is the oracle; any disagreement is a
//! correctness failure, not a tolerance question.

use crate::error::{Error, Result};
use crate::gpu::{shaders, DeviceContext};
use crate::tea::{self, Key};
use serde::Serialize;
use tracing::info;

/// One block's worth of comparison: what went in, what the device produced,
/// and what it should have produced.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct BlockReport {
    pub index: usize,
    pub input: [u32; 2],
    pub output: [u32; 2],
    pub expected: [u32; 2],
}

impl BlockReport {
    pub fn matches(&self) -> bool {
        self.output == self.expected
    }
}

/// Full report of one encrypt/decrypt round trip.
#[derive(Debug, Serialize)]
pub struct RoundTripReport {
    pub device: String,
    pub backend: String,
    pub words: usize,
    pub rounds: u32,
    /// Device encryption vs host encryption, per block.
    pub encrypt: Vec<BlockReport>,
    /// Device decryption of the device ciphertext vs the original input.
    pub decrypt: Vec<BlockReport>,
    /// Host decryption of the device ciphertext also reproduced the input.
    pub host_decrypt_consistent: bool,
}

impl RoundTripReport {
    pub fn passed(&self) -> bool {
        self.host_decrypt_consistent
            && self.encrypt.iter().all(BlockReport::matches)
            && self.decrypt.iter().all(BlockReport::matches)
    }

    pub fn mismatches(&self) -> usize {
        self.encrypt
            .iter()
            .chain(self.decrypt.iter())
            .filter(|b| !b.matches())
            .count()
    }

    pub fn blocks(&self) -> usize {
        self.encrypt.len()
    }
}

/// Drive one full round trip over `input` with a fixed key and round count.
///
/// Every resource the context acquires is released before this returns,
/// on success and on every failure path.
pub fn round_trip(
    ctx: &mut DeviceContext,
    input: &[u32],
    key: &Key,
    rounds: u32,
) -> Result<RoundTripReport> {
    let result = round_trip_inner(ctx, input, key, rounds);
    ctx.cleanup();
    result
}

fn round_trip_inner(
    ctx: &mut DeviceContext,
    input: &[u32],
    key: &Key,
    rounds: u32,
) -> Result<RoundTripReport> {
    let word_count = u32::try_from(input.len())
        .map_err(|_| Error::InvalidArgument("input buffer length exceeds u32".into()))?;
    ctx.set_viewport(word_count)?;

    // encrypt on the device
    ctx.create_surfaces(input)?;
    ctx.create_routine(shaders::ENCRYPT_WGSL)?;
    ctx.run(key, rounds)?;
    let ciphertext = ctx.read_surfaces(word_count)?;

    let expected_cipher = tea::encrypt_words(input, key, rounds)?;
    let encrypt = collect_blocks(input, &ciphertext, &expected_cipher);
    info!(
        "device encryption: {}/{} blocks match the host cipher",
        encrypt.iter().filter(|b| b.matches()).count(),
        encrypt.len()
    );

    // decrypt on the device, seeded from the device's own ciphertext
    ctx.release_surfaces();
    ctx.release_routine();
    ctx.create_surfaces(&ciphertext)?;
    ctx.create_routine(shaders::DECRYPT_WGSL)?;
    ctx.run(key, rounds)?;
    let device_plain = ctx.read_surfaces(word_count)?;

    let host_plain = tea::decrypt_words(&ciphertext, key, rounds)?;
    let decrypt = collect_blocks(&ciphertext, &device_plain, input);
    info!(
        "device decryption: {}/{} blocks reproduce the original input",
        decrypt.iter().filter(|b| b.matches()).count(),
        decrypt.len()
    );

    Ok(RoundTripReport {
        device: ctx.device_name().to_string(),
        backend: format!("{:?}", ctx.backend()),
        words: input.len(),
        rounds,
        encrypt,
        decrypt,
        host_decrypt_consistent: host_plain == input,
    })
}

fn collect_blocks(input: &[u32], output: &[u32], expected: &[u32]) -> Vec<BlockReport> {
    input
        .chunks_exact(2)
        .zip(output.chunks_exact(2))
        .zip(expected.chunks_exact(2))
        .enumerate()
        .map(|(index, ((i, o), e))| BlockReport {
            index,
            input: [i[0], i[1]],
            output: [o[0], o[1]],
            expected: [e[0], e[1]],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_collection_pairs_words_in_order() {
        let input = [1u32, 2, 3, 4];
        let output = [5u32, 6, 7, 8];
        let expected = [5u32, 6, 0, 0];
        let blocks = collect_blocks(&input, &output, &expected);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].matches());
        assert!(!blocks[1].matches());
        assert_eq!(blocks[1].index, 1);
        assert_eq!(blocks[1].input, [3, 4]);
    }
}
