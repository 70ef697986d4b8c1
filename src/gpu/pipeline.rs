//! The per-pixel cipher routine.
//!
//! A routine is a render pipeline whose fragment stage applies the cipher to
//! the texel under the fragment. "Dispatching" it means drawing one quad that
//! covers the whole output grid.

use crate::error::{Error, Result};
use crate::gpu::shaders::QUAD_WGSL;
use crate::gpu::CipherParams;
use crate::tea::Key;
use tracing::debug;
use wgpu::util::DeviceExt;

/// Compiled per-pixel program plus its parameter bindings.
pub struct CipherRoutine {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl CipherRoutine {
    /// Compile and link the routine from the caller-supplied `source` and
    /// resolve its parameter bindings.
    ///
    /// The source is composed with the shared quad stage before compilation.
    /// On failure the diagnostic log is captured and nothing is left bound.
    pub fn new(device: &wgpu::Device, source: &str) -> Result<Self> {
        let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

        let composed = [QUAD_WGSL, source].join("\n\n");
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tea-cipher-shader"),
            source: wgpu::ShaderSource::Wgsl(composed.into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("tea-cipher-bindings"),
                entries: &[
                    // input surface
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Uint,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    // key + round count
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(
                                std::mem::size_of::<CipherParams>() as u64,
                            ),
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tea-cipher-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("tea-cipher-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba32Uint,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(error_scope.pop()) {
            return Err(Error::Compile {
                log: err.to_string(),
            });
        }

        debug!("cipher routine compiled and linked");
        Ok(Self {
            pipeline,
            bind_group_layout,
        })
    }

    /// Bind the surfaces and cipher parameters, draw one quad covering the
    /// full grid, and block until the device completes.
    pub(crate) fn run(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        key: &Key,
        rounds: u32,
    ) -> Result<()> {
        let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

        let params = CipherParams {
            key: *key,
            rounds,
            _padding: [0; 3],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tea-cipher-params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tea-cipher-bind-group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tea-cipher-pass"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tea-cipher-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: output,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            // four corner vertices, one quad
            pass.draw(0..4, 0..1);
        }
        queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(error_scope.pop()) {
            return Err(Error::Device {
                op: "run_cipher_pass",
                detail: err.to_string(),
            });
        }

        // synchronization barrier: return only after all outputs materialize
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| Error::Device {
                op: "poll",
                detail: e.to_string(),
            })?;
        debug!("cipher pass complete ({rounds} rounds)");
        Ok(())
    }
}
