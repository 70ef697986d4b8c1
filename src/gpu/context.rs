//! Device context and surface lifecycle.
//!
//! One [`DeviceContext`] is alive per run. It owns the offscreen target (the
//! output texture), both data surfaces and the routine binding, and every
//! release step is individually idempotent so [`DeviceContext::cleanup`] is
//! safe on a context that failed partway through setup.

use crate::error::{Error, Result};
use crate::gpu::CipherRoutine;
use crate::layout::{self, Texel, BYTES_PER_TEXEL};
use crate::tea::Key;
use clap::ValueEnum;
use std::sync::Arc;
use tracing::{debug, info};

/// Minimum major version required of a GL-class device.
const MIN_GL_MAJOR: u32 = 3;

/// GPU backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum GpuBackend {
    /// Automatically select best available backend (Vulkan -> Metal -> DX12 -> GL)
    #[default]
    Auto,
    /// Vulkan backend (Linux, Windows, Android)
    Vulkan,
    /// DirectX 12 backend (Windows only)
    Dx12,
    /// Metal backend (macOS, iOS)
    Metal,
    /// OpenGL backend (fallback)
    Gl,
}

impl GpuBackend {
    /// Convert to wgpu::Backends bitflag
    pub fn to_wgpu_backends(self) -> wgpu::Backends {
        match self {
            GpuBackend::Auto => wgpu::Backends::all(),
            GpuBackend::Vulkan => wgpu::Backends::VULKAN,
            GpuBackend::Dx12 => wgpu::Backends::DX12,
            GpuBackend::Metal => wgpu::Backends::METAL,
            GpuBackend::Gl => wgpu::Backends::GL,
        }
    }

    /// Fallback order for Auto mode
    pub fn fallback_order() -> &'static [GpuBackend] {
        &[
            GpuBackend::Vulkan,
            GpuBackend::Metal,
            GpuBackend::Dx12,
            GpuBackend::Gl,
        ]
    }

    /// Human-readable name for logging
    pub fn name(self) -> &'static str {
        match self {
            GpuBackend::Auto => "auto",
            GpuBackend::Vulkan => "Vulkan",
            GpuBackend::Dx12 => "DX12",
            GpuBackend::Metal => "Metal",
            GpuBackend::Gl => "OpenGL",
        }
    }
}

impl std::fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parse the leading `<major>.<minor>` of a device-reported version string.
///
/// A string that does not start with two dot-separated integers is a hard
/// [`Error::UnsupportedDevice`], never a default.
pub fn parse_device_version(version: &str) -> Result<(u32, u32)> {
    fn leading_u32(s: &str) -> Option<(u32, &str)> {
        let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        if end == 0 {
            return None;
        }
        s[..end].parse().ok().map(|value| (value, &s[end..]))
    }

    let parsed = (|| {
        let (major, rest) = leading_u32(version)?;
        let rest = rest.strip_prefix('.')?;
        let (minor, _) = leading_u32(rest)?;
        Some((major, minor))
    })();
    parsed.ok_or_else(|| {
        Error::UnsupportedDevice(format!("version string {version:?} cannot be parsed"))
    })
}

/// Both data surfaces plus the staging buffer for readback.
///
/// Created together after a successful layout validation, dropped together.
struct Surfaces {
    input_view: wgpu::TextureView,
    output: wgpu::Texture,
    output_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

/// Process-scoped handle for one cipher run.
pub struct DeviceContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    side: Option<u32>,
    surfaces: Option<Surfaces>,
    routine: Option<CipherRoutine>,
    completed_run: bool,
}

impl DeviceContext {
    /// Create a device context with the specified backend.
    pub async fn new(device_index: u32, backend: GpuBackend) -> Result<Self> {
        match backend {
            GpuBackend::Auto => Self::new_with_fallback(device_index).await,
            _ => Self::try_backend(device_index, backend, false).await,
        }
    }

    /// Create a context trying backends in fallback order.
    async fn new_with_fallback(device_index: u32) -> Result<Self> {
        // First pass: try to find hardware GPU, skip software renderers
        for &backend in GpuBackend::fallback_order() {
            debug!("Trying {} backend (hardware only)...", backend);
            match Self::try_backend(device_index, backend, true).await {
                Ok(ctx) => {
                    info!("Using {} backend: {}", backend, ctx.device_name());
                    return Ok(ctx);
                }
                Err(e) => {
                    debug!("{} backend failed (hardware): {}", backend, e);
                }
            }
        }

        // Second pass: accept software renderers as fallback
        debug!("No hardware GPU found, trying software renderers...");
        for &backend in GpuBackend::fallback_order() {
            debug!("Trying {} backend (including software)...", backend);
            match Self::try_backend(device_index, backend, false).await {
                Ok(ctx) => {
                    info!(
                        "Using {} backend (software): {}",
                        backend,
                        ctx.device_name()
                    );
                    return Ok(ctx);
                }
                Err(e) => {
                    debug!("{} backend failed: {}", backend, e);
                }
            }
        }

        Err(Error::UnsupportedDevice("no GPU backends available".into()))
    }

    /// Check if adapter is a software renderer
    fn is_software_adapter(info: &wgpu::AdapterInfo) -> bool {
        if info.device_type == wgpu::DeviceType::Cpu {
            return true;
        }
        let name_lower = info.name.to_lowercase();
        name_lower.contains("llvmpipe")
            || name_lower.contains("swiftshader")
            || name_lower.contains("software")
            || name_lower.contains("lavapipe")
            || name_lower.contains("mesa software")
    }

    async fn try_backend(
        device_index: u32,
        backend: GpuBackend,
        hardware_only: bool,
    ) -> Result<Self> {
        let backends = backend.to_wgpu_backends();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let mut adapters: Vec<_> = instance.enumerate_adapters(backends).await;

        if hardware_only {
            adapters.retain(|a| !Self::is_software_adapter(&a.get_info()));
        }

        if adapters.is_empty() {
            return Err(Error::UnsupportedDevice(format!(
                "no {backend} adapters found"
            )));
        }

        // Sort by device type (discrete > virtual > integrated > cpu)
        // and by backend priority (Vulkan > Metal > DX12 > GL)
        adapters.sort_by_key(|a| {
            let info = a.get_info();
            let device_priority = match info.device_type {
                wgpu::DeviceType::DiscreteGpu => 0,
                wgpu::DeviceType::VirtualGpu => 1,
                wgpu::DeviceType::IntegratedGpu => 2,
                wgpu::DeviceType::Cpu => 3,
                _ => 4,
            };
            let backend_priority = match info.backend {
                wgpu::Backend::Vulkan => 0,
                wgpu::Backend::Metal => 1,
                wgpu::Backend::Dx12 => 2,
                wgpu::Backend::Gl => 3,
                _ => 4,
            };
            (device_priority, backend_priority)
        });

        let adapter = adapters
            .into_iter()
            .nth(device_index as usize)
            .ok_or_else(|| {
                Error::InvalidArgument(format!("GPU device index {device_index} out of range"))
            })?;

        let adapter_info = adapter.get_info();

        // The GL driver string carries the GL version; the other backends'
        // baselines already exceed the GL 3.0 feature floor this tool needs.
        if adapter_info.backend == wgpu::Backend::Gl {
            let (major, minor) = parse_device_version(&adapter_info.driver_info)?;
            if major < MIN_GL_MAJOR {
                return Err(Error::UnsupportedDevice(format!(
                    "minimum required GL version {MIN_GL_MAJOR}.0, device reports {major}.{minor}"
                )));
            }
            debug!("GL device version {major}.{minor}");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("teatime"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Device {
                op: "request_device",
                detail: e.to_string(),
            })?;

        let limits = device.limits();
        info!(
            "device: {} ({:?}), max grid side {}",
            adapter_info.name,
            adapter_info.backend,
            limits.max_texture_dimension_2d
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            limits,
            side: None,
            surfaces: None,
            routine: None,
            completed_run: false,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.adapter_info.name
    }

    pub fn backend(&self) -> wgpu::Backend {
        self.adapter_info.backend
    }

    /// Maximum grid side the device can back with one texture.
    pub fn max_grid_side(&self) -> u32 {
        self.limits.max_texture_dimension_2d
    }

    /// Grid side recorded by the last [`Self::set_viewport`] call, if any.
    pub fn grid_side(&self) -> Option<u32> {
        self.side
    }

    /// Record the grid side for a run over `word_count` words.
    ///
    /// Establishes the 1:1 texel-to-output mapping: the render pass covers a
    /// side x side attachment and every fragment writes exactly one element.
    /// Must be called once per run, before surface creation.
    pub fn set_viewport(&mut self, word_count: u32) -> Result<()> {
        let side = layout::compute_grid_side(word_count, self.max_grid_side())?;
        info!("grid: {side} x {side} texels ({word_count} words)");
        self.side = Some(side);
        Ok(())
    }

    fn configured_side(&self) -> Result<u32> {
        self.side.ok_or_else(|| {
            Error::InvalidArgument("viewport not configured; call set_viewport first".into())
        })
    }

    /// The side implied by `word_count` must agree with the configured one.
    fn checked_side(&self, word_count: u32) -> Result<u32> {
        let side = self.configured_side()?;
        let implied = layout::compute_grid_side(word_count, self.max_grid_side())?;
        if implied != side {
            return Err(Error::InvalidArgument(format!(
                "viewport grid side ({side}) != side implied by buffer of {word_count} words ({implied})"
            )));
        }
        Ok(side)
    }

    /// Allocate the input and output surfaces and upload `words` into the
    /// input surface.
    ///
    /// On any failure nothing is kept: partially created resources are
    /// dropped before the error propagates.
    pub fn create_surfaces(&mut self, words: &[u32]) -> Result<()> {
        if words.is_empty() {
            return Err(Error::InvalidArgument("input buffer is empty".into()));
        }
        let word_count = u32::try_from(words.len())
            .map_err(|_| Error::InvalidArgument("input buffer length exceeds u32".into()))?;
        let side = self.checked_side(word_count)?;
        let texels = layout::pack(words, side)?;

        let error_scopes = self.push_error_scopes();

        let extent = wgpu::Extent3d {
            width: side,
            height: side,
            depth_or_array_layers: 1,
        };
        let descriptor = wgpu::TextureDescriptor {
            label: None,
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Uint,
            usage: wgpu::TextureUsages::empty(),
            view_formats: &[],
        };

        let input = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tea-input-surface"),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            ..descriptor
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &input,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(side * BYTES_PER_TEXEL),
                rows_per_image: Some(side),
            },
            extent,
        );

        let output = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tea-output-surface"),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            ..descriptor
        });

        // copy_texture_to_buffer rows must be 256-byte aligned
        let padded_bytes_per_row =
            (side * BYTES_PER_TEXEL).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tea-readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(side),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        self.pop_error_scopes("create_surfaces", error_scopes)?;

        let input_view = input.create_view(&wgpu::TextureViewDescriptor::default());
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());
        self.surfaces = Some(Surfaces {
            input_view,
            output,
            output_view,
            readback,
            padded_bytes_per_row,
        });
        self.completed_run = false;
        debug!("created {side}x{side} input and output surfaces");
        Ok(())
    }

    /// Compile the per-pixel routine from `source` and bind it to this
    /// context, releasing any previous routine first.
    pub fn create_routine(&mut self, source: &str) -> Result<()> {
        self.release_routine();
        let routine = CipherRoutine::new(&self.device, source)?;
        self.routine = Some(routine);
        Ok(())
    }

    /// Run the bound routine over the surfaces: one full-frame draw, blocking
    /// until the device has materialized every output texel.
    pub fn run(&mut self, key: &Key, rounds: u32) -> Result<()> {
        let routine = self
            .routine
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("no routine bound; call create_routine".into()))?;
        let surfaces = self.surfaces.as_ref().ok_or_else(|| {
            Error::InvalidArgument("no surfaces; call create_surfaces before run".into())
        })?;
        routine.run(
            &self.device,
            &self.queue,
            &surfaces.input_view,
            &surfaces.output_view,
            key,
            rounds,
        )?;
        self.completed_run = true;
        Ok(())
    }

    /// Read the output surface back into a linear word buffer.
    pub fn read_surfaces(&self, word_count: u32) -> Result<Vec<u32>> {
        let side = self.checked_side(word_count)?;
        let surfaces = self.surfaces.as_ref().ok_or_else(|| {
            Error::InvalidArgument("no surfaces to read; create_surfaces was not called".into())
        })?;
        if !self.completed_run {
            return Err(Error::InvalidArgument(
                "output surface holds no results; no routine has run".into(),
            ));
        }

        let error_scopes = self.push_error_scopes();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tea-readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &surfaces.output,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &surfaces.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(surfaces.padded_bytes_per_row),
                    rows_per_image: Some(side),
                },
            },
            wgpu::Extent3d {
                width: side,
                height: side,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        self.pop_error_scopes("copy_texture_to_buffer", error_scopes)?;

        let slice = surfaces.readback.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| Error::Device {
                op: "poll",
                detail: e.to_string(),
            })?;
        pollster::block_on(rx)
            .map_err(|_| Error::Device {
                op: "map_async",
                detail: "map callback dropped without a result".into(),
            })?
            .map_err(|e| Error::Device {
                op: "map_async",
                detail: e.to_string(),
            })?;

        let data = slice.get_mapped_range();
        let row_bytes = (side * BYTES_PER_TEXEL) as usize;
        let mut texels: Vec<Texel> = Vec::with_capacity((side * side) as usize);
        for row in 0..side as usize {
            let start = row * surfaces.padded_bytes_per_row as usize;
            texels.extend_from_slice(bytemuck::cast_slice(&data[start..start + row_bytes]));
        }
        drop(data);
        surfaces.readback.unmap();
        debug!("read back {} words from the output surface", word_count);
        Ok(layout::unpack(&texels))
    }

    /// Release both surfaces. Idempotent; safe with no surfaces.
    pub fn release_surfaces(&mut self) {
        if self.surfaces.take().is_some() {
            debug!("released surfaces");
        }
        self.completed_run = false;
    }

    /// Release the routine binding. Idempotent.
    pub fn release_routine(&mut self) {
        if self.routine.take().is_some() {
            debug!("released routine");
        }
    }

    /// Release everything this context owns.
    ///
    /// Runs every release step even when earlier ones are no-ops, so it is
    /// safe on a partially initialized context and safe to call repeatedly.
    pub fn cleanup(&mut self) {
        self.release_routine();
        self.release_surfaces();
        self.side = None;
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
    }

    fn push_error_scopes(&self) -> (wgpu::ErrorScopeGuard, wgpu::ErrorScopeGuard) {
        let oom = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        (oom, validation)
    }

    /// Scopes pop in reverse push order: validation first, then out-of-memory.
    fn pop_error_scopes(
        &self,
        op: &'static str,
        scopes: (wgpu::ErrorScopeGuard, wgpu::ErrorScopeGuard),
    ) -> Result<()> {
        let (oom_scope, validation_scope) = scopes;
        let validation = pollster::block_on(validation_scope.pop());
        let oom = pollster::block_on(oom_scope.pop());
        if let Some(err) = oom {
            return Err(Error::ResourceExhausted(err.to_string()));
        }
        if let Some(err) = validation {
            return Err(Error::Device {
                op,
                detail: err.to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_strings_with_a_numeric_prefix_parse() {
        assert_eq!(parse_device_version("3.0").unwrap(), (3, 0));
        assert_eq!(parse_device_version("4.6.0 NVIDIA 551.61").unwrap(), (4, 6));
        assert_eq!(
            parse_device_version("3.2 (Core Profile) Mesa 24.0.1").unwrap(),
            (3, 2)
        );
    }

    #[test]
    fn malformed_version_strings_are_a_hard_failure() {
        for bad in ["", "3", "3.", ".5", "Mesa 24.0", "abc"] {
            assert!(
                matches!(
                    parse_device_version(bad),
                    Err(Error::UnsupportedDevice(_))
                ),
                "expected {bad:?} to be rejected"
            );
        }
    }
}
