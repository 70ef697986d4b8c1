//! GPU execution of the cipher.
//!
//! The core technique, kept deliberately visible: the word buffer is not fed
//! to a compute kernel but reinterpreted as a side x side grid of RGBA32UI
//! texels (two cipher blocks per texel) and transformed by a single
//! full-screen fragment pass into an offscreen render target. The rasterizer
//! provides the parallel loop; one fragment invocation equals one texel of
//! output.

mod context;
mod pipeline;
pub mod shaders;

pub use context::{parse_device_version, DeviceContext, GpuBackend};
pub use pipeline::CipherRoutine;

use bytemuck::{Pod, Zeroable};

/// Uniform parameters bound to the per-pixel routine.
///
/// Layout matches the WGSL `CipherParams` struct: a vec4 key followed by the
/// round count, padded out to the 16-byte uniform alignment.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CipherParams {
    pub key: [u32; 4],
    pub rounds: u32,
    pub _padding: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_params_match_the_wgsl_uniform_layout() {
        assert_eq!(std::mem::size_of::<CipherParams>(), 32);
        assert_eq!(std::mem::align_of::<CipherParams>(), 4);
    }
}
