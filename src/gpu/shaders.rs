//! Embedded per-pixel program sources.
//!
//! The encrypt and decrypt variants are plain WGSL text; a routine is built
//! from one of them composed with the shared quad stage. Each variant
//! declares the same parameter contract: the input surface, the key as a
//! 4-word vector and the round count (the output surface is the render
//! target of the pass).

/// Shared vertex stage and parameter bindings, prepended to every variant.
pub(crate) const QUAD_WGSL: &str = include_str!("../shaders/quad.wgsl");

/// Per-pixel TEA encryption.
pub const ENCRYPT_WGSL: &str = include_str!("../shaders/encrypt.wgsl");

/// Per-pixel TEA decryption.
pub const DECRYPT_WGSL: &str = include_str!("../shaders/decrypt.wgsl");
