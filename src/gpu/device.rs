// gpu/device.rs — wgpu device setup.
//
// Responsibilities:
//   - Enumerate adapters for the requested backends and pick a hardware one.
//   - Create the device and queue.
//   - Route uncaptured wgpu errors to the logger instead of panicking.
//   - Provide the blocking map helper every readback goes through.
//   - Check the tile size and image sizes against the device limits before
//     any resource or pipeline is created.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` may hand back a software rasterizer
// (llvmpipe, WARP) when it is the only adapter that satisfies the power
// preference heuristics. We enumerate explicitly, prefer real hardware, and
// fall back to whatever exists with the adapter name logged.
//
// ERROR SCOPES:
// Shader compilation and pipeline creation run inside validation error
// scopes (see gpu/backend.rs), so a bad kernel is reported instead of
// tripping the uncaptured-error handler. The handler installed here catches
// everything else and logs it.
//
// LIMITS:
// The device is requested with `wgpu::Limits::default()`. A tile size whose
// square exceeds `max_compute_invocations_per_workgroup` (256) would only
// surface as a pipeline validation error, and an oversized texture as an
// uncaptured error, so both are checked up front and reported as `GpuError`.

use std::fmt;
use std::num::NonZeroU32;

use crate::backend::ReadbackError;

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Errors from GPU device initialization.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no GPU adapter found for backends {0:?}")]
    NoSuitableAdapter(wgpu::Backends),
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("workgroup of {total} invocations exceeds device limit of {max}")]
    WorkgroupTooLarge { total: u64, max: u32 },
    #[error("tile size {tile} exceeds device workgroup dimension limit of {max}")]
    WorkgroupDimension { tile: u32, max: u32 },
    #[error("{width}×{height} texture exceeds device limit of {max} per side")]
    TextureTooLarge { width: u32, height: u32, max: u32 },
}

/// The GPU context: device, queue, and the adapter they came from.
///
/// # Field drop order
/// Struct fields drop top to bottom. `_instance` is declared last so the
/// `wgpu::Instance` outlives `device` and `queue`.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a device on the best adapter among `backends`.
    pub fn new(backends: wgpu::Backends) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(backends))
    }

    async fn init_async(backends: wgpu::Backends) -> Result<Self, GpuError> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::DEBUG
        } else {
            wgpu::InstanceFlags::empty()
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            flags,
            ..Default::default()
        });

        let all_adapters = instance.enumerate_adapters(backends);
        for a in &all_adapters {
            let info = a.get_info();
            log::debug!("adapter candidate: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        // Tier 1: real hardware. Tier 2: anything, software included.
        let adapter = pick_adapter(all_adapters, |a| a.get_info().device_type)
            .ok_or(GpuError::NoSuitableAdapter(backends))?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };
        if raw_info.device_type == wgpu::DeviceType::Cpu {
            log::warn!("using software adapter {adapter_info}");
        } else {
            log::info!("using adapter {adapter_info}");
        }

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("kernel-host"),
                    // Lets the input sampler clamp to a transparent border.
                    required_features: adapter.features()
                        & wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER,
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|e| {
            log::error!("uncaptured wgpu error: {e}");
        }));

        Ok(GpuDevice {
            device,
            queue,
            adapter_info,
            _instance: instance,
        })
    }

    /// Reject a `tile` × `tile` workgroup this device cannot run.
    pub fn check_workgroup(&self, tile: NonZeroU32) -> Result<(), GpuError> {
        check_workgroup(&self.device.limits(), tile)
    }

    /// Reject a 2-D texture this device cannot allocate.
    pub fn check_texture_size(&self, width: u32, height: u32) -> Result<(), GpuError> {
        check_texture_size(&self.device.limits(), width, height)
    }

    /// Map `slice` for reading and block until the map completes.
    ///
    /// Everything submitted to the queue before this call finishes first,
    /// which is what turns a readback into a full synchronization point.
    pub fn map_read_blocking(&self, slice: &wgpu::BufferSlice<'_>) -> Result<(), ReadbackError> {
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver outlives the poll below; a failed send only means
            // the caller already gave up.
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| ReadbackError::CallbackDropped)??;
        Ok(())
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuDevice {{ adapter: {} }}", self.adapter_info)
    }
}

fn check_workgroup(limits: &wgpu::Limits, tile: NonZeroU32) -> Result<(), GpuError> {
    let tile = tile.get();
    let max_dim = limits
        .max_compute_workgroup_size_x
        .min(limits.max_compute_workgroup_size_y);
    if tile > max_dim {
        return Err(GpuError::WorkgroupDimension { tile, max: max_dim });
    }
    let total = u64::from(tile) * u64::from(tile);
    let max = limits.max_compute_invocations_per_workgroup;
    if total > u64::from(max) {
        return Err(GpuError::WorkgroupTooLarge { total, max });
    }
    Ok(())
}

fn check_texture_size(limits: &wgpu::Limits, width: u32, height: u32) -> Result<(), GpuError> {
    let max = limits.max_texture_dimension_2d;
    if width > max || height > max {
        return Err(GpuError::TextureTooLarge { width, height, max });
    }
    Ok(())
}

/// Prefer discrete/integrated/virtual/other adapters over CPU ones,
/// keeping enumeration order within a tier.
fn pick_adapter<A>(adapters: Vec<A>, device_type: impl Fn(&A) -> wgpu::DeviceType) -> Option<A> {
    let (hardware, software): (Vec<A>, Vec<A>) = adapters
        .into_iter()
        .partition(|a| device_type(a) != wgpu::DeviceType::Cpu);
    hardware.into_iter().next().or_else(|| software.into_iter().next())
}
