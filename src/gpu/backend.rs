// gpu/backend.rs — `KernelBackend` on wgpu.
//
// MAPPING
// ────────
//   compile          prepend `const TILE_SIZE`, create_shader_module inside a
//                    validation error scope, plus the compilation messages
//   link             create_compute_pipeline against the fixed layout, with
//                    a bind group over the host resources
//   bind             rebuild the program's bind group (group 0) from the table
//   push_frame_state queue.write_buffer into the group 1 uniform
//   write_feedback   queue.write_buffer into the feedback storage buffer
//   dispatch         compute pass recorded into a pending encoder
//   barrier          finish + submit the pending encoder
//   read_feedback    copy storage → staging, submit, map (blocks), unmap
//
// Queue writes are applied before the next submission, and submissions
// execute in order, so "reset, dispatch, barrier, read" on the host is
// "sentinel write, kernel, copy, map" on the GPU timeline. wgpu inserts the
// storage-write → copy-read barrier between the compute pass and the copy.
//
// WHY A STAGING BUFFER
// ─────────────────────
// A buffer with STORAGE usage cannot also be MAP_READ without the
// MAPPABLE_PRIMARY_BUFFERS native feature. The feedback value is therefore
// copied into a 4-byte MAP_READ buffer before mapping. The copy happens in
// `read_feedback` itself, so a read always sees the latest storage contents,
// including a bare sentinel write with no dispatch in between.

use std::borrow::Cow;
use std::num::NonZeroU32;

use wgpu::util::DeviceExt;

use crate::backend::{CompileError, KernelBackend, LinkError, ReadbackError};
use crate::binding::{
    AccessMode, BindingError, BindingTable, HostResources, ResourceBinding, ResourceId,
};
use crate::dispatch::{specialize_kernel, Dispatcher, ExecutionGrid, PRELUDE_LINES};
use crate::feedback::SENTINEL;
use crate::frame::FrameState;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::image::{GpuImage, IMAGE_FORMAT};
use crate::image::InputImage;

/// Entry point every kernel must define.
pub const KERNEL_ENTRY_POINT: &str = "main";

const FEEDBACK_SIZE: u64 = std::mem::size_of::<i32>() as u64;

const OUTPUT_IMAGE_ID: ResourceId = ResourceId(0);
const INPUT_IMAGE_ID: ResourceId = ResourceId(1);
const FEEDBACK_ID: ResourceId = ResourceId(2);
const INPUT_SAMPLER_ID: ResourceId = ResourceId(3);

// ---------------------------------------------------------------------------
// Unit / program types
// ---------------------------------------------------------------------------

/// A validated shader module.
pub struct WgpuShader {
    module: wgpu::ShaderModule,
    log: String,
}

/// A compute pipeline and its group 0 bind group. `link` binds the host
/// resources, so every program can be dispatched; `bind` replaces the group.
pub struct WgpuKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    log: String,
}

impl WgpuKernel {
    /// Non-fatal compiler output (warnings), possibly empty.
    pub fn log(&self) -> &str {
        &self.log
    }
}

// ---------------------------------------------------------------------------
// WgpuBackend
// ---------------------------------------------------------------------------

pub struct WgpuBackend {
    gpu: GpuDevice,
    output: GpuImage,
    input: GpuImage,
    input_sampler: wgpu::Sampler,
    feedback: wgpu::Buffer,
    feedback_staging: wgpu::Buffer,
    frame_uniform: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    kernel_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    tile_size: NonZeroU32,
    pending: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    /// Allocate the host resources: output image of `width` × `height`,
    /// the uploaded input image and its sampler, the feedback buffer and the
    /// frame uniform.
    ///
    /// Fails if the tile size or either image exceeds the device limits.
    pub fn new(
        gpu: GpuDevice,
        input: &InputImage,
        width: NonZeroU32,
        height: NonZeroU32,
        dispatcher: &Dispatcher,
    ) -> Result<Self, GpuError> {
        gpu.check_workgroup(dispatcher.tile_size())?;
        gpu.check_texture_size(width.get(), height.get())?;
        gpu.check_texture_size(input.width(), input.height())?;

        let output = GpuImage::storage(&gpu, width.get(), height.get());
        let input = GpuImage::upload(&gpu, input);
        let input_sampler = create_input_sampler(&gpu);

        let feedback = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("feedback"),
            contents: bytemuck::bytes_of(&SENTINEL),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });
        let feedback_staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("feedback staging"),
            size: FEEDBACK_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_uniform = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame state"),
            contents: bytemuck::bytes_of(&FrameState::at(0.0)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let kernel_layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel resources"),
            entries: &[
                // 0: output image, write-only storage texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: IMAGE_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                // 1: input image
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
                // 2: feedback (storage read_write)
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(FEEDBACK_SIZE),
                    },
                    count: None,
                },
                // 3: input sampler, nearest only (Rgba32Float is unfilterable)
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let frame_layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame state"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<FrameState>() as u64,
                    ),
                },
                count: None,
            }],
        });
        let frame_bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame state"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_uniform.as_entire_binding(),
            }],
        });

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kernel pipeline layout"),
            bind_group_layouts: &[&kernel_layout, &frame_layout],
            push_constant_ranges: &[],
        });

        Ok(WgpuBackend {
            gpu,
            output,
            input,
            input_sampler,
            feedback,
            feedback_staging,
            frame_uniform,
            frame_bind_group,
            kernel_layout,
            pipeline_layout,
            tile_size: dispatcher.tile_size(),
            pending: None,
        })
    }

    pub fn gpu(&self) -> &GpuDevice {
        &self.gpu
    }

    /// Look up the resource behind `binding`, checking the declared access
    /// against what the resource was created for.
    fn resolve(&self, binding: &ResourceBinding) -> Result<wgpu::BindingResource<'_>, BindingError> {
        let (access, resource) = match binding.resource {
            OUTPUT_IMAGE_ID => (AccessMode::Write, wgpu::BindingResource::TextureView(&self.output.view)),
            INPUT_IMAGE_ID => (AccessMode::Sample, wgpu::BindingResource::TextureView(&self.input.view)),
            FEEDBACK_ID => (AccessMode::Storage, self.feedback.as_entire_binding()),
            INPUT_SAMPLER_ID => (AccessMode::Sampler, wgpu::BindingResource::Sampler(&self.input_sampler)),
            other => {
                return Err(BindingError::UnknownResource {
                    slot: binding.slot,
                    resource: other,
                })
            }
        };
        if access != binding.access {
            return Err(BindingError::AccessMismatch {
                slot: binding.slot,
                resource: binding.resource,
                access: binding.access,
            });
        }
        Ok(resource)
    }

    fn create_bind_group(&self, bindings: &[ResourceBinding]) -> Result<wgpu::BindGroup, BindingError> {
        let entries = bindings
            .iter()
            .map(|b| {
                Ok(wgpu::BindGroupEntry {
                    binding: b.slot.index(),
                    resource: self.resolve(b)?,
                })
            })
            .collect::<Result<Vec<_>, BindingError>>()?;

        Ok(self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel resources"),
            layout: &self.kernel_layout,
            entries: &entries,
        }))
    }

    /// Submit whatever has been recorded since the last barrier.
    fn flush(&mut self) {
        if let Some(encoder) = self.pending.take() {
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
        }
    }
}

impl KernelBackend for WgpuBackend {
    type Unit = WgpuShader;
    type Program = WgpuKernel;

    fn resources(&self) -> HostResources {
        HostResources {
            output_image: OUTPUT_IMAGE_ID,
            input_image: INPUT_IMAGE_ID,
            feedback: FEEDBACK_ID,
            input_sampler: INPUT_SAMPLER_ID,
        }
    }

    fn compile(&mut self, source: &str) -> Result<WgpuShader, CompileError> {
        let source = specialize_kernel(source, self.tile_size);
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kernel"),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
        });
        let info = pollster::block_on(module.get_compilation_info());
        let scope_error = pollster::block_on(device.pop_error_scope());

        let log = format_compilation_messages(&info.messages);
        let has_errors = info
            .messages
            .iter()
            .any(|m| m.message_type == wgpu::CompilationMessageType::Error);

        if has_errors || scope_error.is_some() {
            // `module` is dropped here, releasing the rejected unit.
            let log = match (log.is_empty(), scope_error) {
                (true, Some(e)) => e.to_string(),
                _ => log,
            };
            return Err(CompileError { log });
        }
        if !log.is_empty() {
            log::warn!("kernel compiled with warnings:\n{log}");
        }
        Ok(WgpuShader { module, log })
    }

    fn link(&mut self, unit: WgpuShader) -> Result<WgpuKernel, LinkError> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("kernel"),
            layout: Some(&self.pipeline_layout),
            module: &unit.module,
            entry_point: KERNEL_ENTRY_POINT,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(LinkError { log: e.to_string() });
        }
        let bind_group = self
            .create_bind_group(BindingTable::new(self.resources()).entries())
            .map_err(|e| LinkError { log: e.to_string() })?;
        Ok(WgpuKernel {
            pipeline,
            bind_group,
            log: unit.log,
        })
    }

    fn bind(
        &mut self,
        program: &mut WgpuKernel,
        bindings: &[ResourceBinding],
    ) -> Result<(), BindingError> {
        program.bind_group = self.create_bind_group(bindings)?;
        Ok(())
    }

    fn push_frame_state(&mut self, state: &FrameState) {
        self.gpu
            .queue
            .write_buffer(&self.frame_uniform, 0, bytemuck::bytes_of(state));
    }

    fn write_feedback(&mut self, value: i32) {
        self.gpu
            .queue
            .write_buffer(&self.feedback, 0, bytemuck::bytes_of(&value));
    }

    fn dispatch(&mut self, program: &WgpuKernel, grid: ExecutionGrid) {
        let mut encoder = match self.pending.take() {
            Some(encoder) => encoder,
            None => self
                .gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("kernel dispatch"),
                }),
        };
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("kernel"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &program.bind_group, &[]);
            pass.set_bind_group(1, &self.frame_bind_group, &[]);
            pass.dispatch_workgroups(grid.groups_x, grid.groups_y, 1);
        }
        self.pending = Some(encoder);
    }

    fn barrier(&mut self) {
        self.flush();
    }

    fn read_feedback(&mut self) -> Result<i32, ReadbackError> {
        // Anything still pending must run before the copy.
        self.flush();

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("feedback readback"),
            });
        encoder.copy_buffer_to_buffer(&self.feedback, 0, &self.feedback_staging, 0, FEEDBACK_SIZE);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.feedback_staging.slice(..);
        self.gpu.map_read_blocking(&slice)?;
        let value = bytemuck::pod_read_unaligned::<i32>(&slice.get_mapped_range());
        self.feedback_staging.unmap();
        Ok(value)
    }

    fn read_output(&mut self) -> Result<Vec<[f32; 4]>, ReadbackError> {
        self.flush();
        self.output.readback(&self.gpu)
    }
}

/// Nearest-neighbour sampler for the input image. Out-of-range coordinates
/// read transparent black when the device supports border clamping, the
/// nearest edge texel otherwise.
fn create_input_sampler(gpu: &GpuDevice) -> wgpu::Sampler {
    let (address_mode, border_color) = if gpu
        .device
        .features()
        .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
    {
        (
            wgpu::AddressMode::ClampToBorder,
            Some(wgpu::SamplerBorderColor::TransparentBlack),
        )
    } else {
        log::debug!("ADDRESS_MODE_CLAMP_TO_BORDER unavailable, input sampler clamps to edge");
        (wgpu::AddressMode::ClampToEdge, None)
    };
    gpu.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("input sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        border_color,
        ..Default::default()
    })
}

/// Render compiler messages as `line:col: kind: message` lines, with line
/// numbers counted in the kernel file rather than the specialized source.
fn format_compilation_messages(messages: &[wgpu::CompilationMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let kind = match m.message_type {
                wgpu::CompilationMessageType::Error => "error",
                wgpu::CompilationMessageType::Warning => "warning",
                wgpu::CompilationMessageType::Info => "info",
            };
            match &m.location {
                Some(loc) => format!(
                    "{}:{}: {kind}: {}",
                    kernel_line(loc.line_number),
                    loc.line_position,
                    m.message
                ),
                None => format!("{kind}: {}", m.message),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map a line of the specialized source back to the kernel file.
fn kernel_line(specialized_line: u32) -> u32 {
    specialized_line.saturating_sub(PRELUDE_LINES)
}
