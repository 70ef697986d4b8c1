//! Teatime: TEA block cipher on the GPU via Vulkan/Metal/DX12/GL
//!
//! Demonstrates running a symmetric block cipher as a fragment pass over a
//! texture instead of a compute kernel: a word buffer becomes a square
//! RGBA32UI grid, one full-screen quad draw encrypts every texel, and the
//! result is read back and cross-checked against the host cipher.
//!
//! Not a security tool. TEA is known-weak and serves only as a reference
//! cipher that parallelizes per block.

mod cli;
mod error;
mod gpu;
mod harness;
mod layout;
mod tea;

pub use error::{Error, Result};
pub use gpu::{parse_device_version, shaders, CipherParams, DeviceContext, GpuBackend};
pub use harness::{round_trip, BlockReport, RoundTripReport};
pub use layout::{compute_grid_side, pack, unpack, Texel};
pub use tea::{decrypt_block, decrypt_words, encrypt_block, encrypt_words, Block, Key, DELTA};

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;

/// GPU round trip for the TEA block cipher
///
/// Encrypts a demo word buffer on the GPU, verifies every block against the
/// host cipher, then decrypts the GPU ciphertext and verifies it reproduces
/// the original input.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Number of 32-bit words to process (must be 4 times a perfect square)
    #[arg(short, long, default_value = "64")]
    words: u32,

    /// TEA round count (encrypt and decrypt must agree)
    #[arg(short, long, default_value = "32")]
    rounds: u32,

    /// 128-bit key as 32 hex digits
    #[arg(short, long, default_value = "deadbeefcafefacefaceb00cf00d1337")]
    key: String,

    /// GPU device index
    #[arg(long, default_value = "0")]
    gpu: u32,

    /// GPU backend to use
    #[arg(long, default_value = "auto")]
    backend: GpuBackend,

    /// Quiet mode - suppress per-block output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the full report as JSON on stdout
    #[arg(long)]
    json: bool,
}

pub fn run_from_args<I, S>(args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
{
    let args = Args::parse_from(args);
    run(args)
}

/// The demo input pattern: word i is `0xFFFF0000 | ((i + 1) * 5)`.
pub fn demo_input(words: u32) -> Vec<u32> {
    (0..words)
        .map(|i| 0xFFFF_0000 | (i + 1).wrapping_mul(5))
        .collect()
}

fn parse_key(hex_key: &str) -> anyhow::Result<Key> {
    let bytes = hex::decode(hex_key.trim_start_matches("0x")).context("Invalid hex in key")?;
    let bytes: [u8; 16] = bytes
        .try_into()
        .map_err(|_| anyhow!("key must be exactly 32 hex digits"))?;
    let mut key = [0u32; 4];
    for (word, quad) in key.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]]);
    }
    Ok(key)
}

pub fn run(args: Args) -> anyhow::Result<()> {
    cli::init_tracing(args.verbose, args.quiet || args.json);

    let key = parse_key(&args.key)?;
    let input = demo_input(args.words);

    let mut ctx = pollster::block_on(DeviceContext::new(args.gpu, args.backend))?;
    info!("GPU: {} ({:?} backend)", ctx.device_name(), ctx.backend());

    let report = harness::round_trip(&mut ctx, &input, &key, args.rounds)?;

    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else if !args.quiet {
        print_report(&report);
    }

    if report.passed() {
        info!("round trip OK: {} blocks verified", report.blocks());
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} block comparisons mismatched between device and host",
            report.mismatches(),
            report.blocks() * 2
        ))
    }
}

fn print_report(report: &RoundTripReport) {
    for b in &report.encrypt {
        println!(
            "{}. Encrypting Input = {:08x} {:08x} Output = {:08x} {:08x} Expected = {:08x} {:08x}",
            b.index, b.input[0], b.input[1], b.output[0], b.output[1], b.expected[0],
            b.expected[1]
        );
    }
    for b in &report.decrypt {
        println!(
            "{}. Decrypting Input = {:08x} {:08x} Output = {:08x} {:08x} Expected = {:08x} {:08x}",
            b.index, b.input[0], b.input[1], b.output[0], b.output[1], b.expected[0],
            b.expected[1]
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_input_matches_the_reference_pattern() {
        let input = demo_input(4);
        assert_eq!(input, [0xFFFF_0005, 0xFFFF_000A, 0xFFFF_000F, 0xFFFF_0014]);
    }

    #[test]
    fn key_parses_big_endian_words() {
        let key = parse_key("deadbeefcafefacefaceb00cf00d1337").unwrap();
        assert_eq!(key, [0xDEAD_BEEF, 0xCAFE_FACE, 0xFACE_B00C, 0xF00D_1337]);
        let key = parse_key("0xDEADBEEFCAFEFACEFACEB00CF00D1337").unwrap();
        assert_eq!(key, [0xDEAD_BEEF, 0xCAFE_FACE, 0xFACE_B00C, 0xF00D_1337]);
    }

    #[test]
    fn short_or_invalid_keys_are_rejected() {
        assert!(parse_key("deadbeef").is_err());
        assert!(parse_key("not hex at all, not even close!!").is_err());
    }
}
