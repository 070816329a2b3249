// gpu/image.rs — the two image resources the kernel sees.
//
//   GpuImage::upload   input image,  slot 1, TEXTURE_BINDING
//   GpuImage::storage  output image, slot 0, STORAGE_BINDING (textureStore)
//
// Both use `Rgba32Float` (16 bytes per texel). Rgba32Float is not
// filterable without an optional feature, so the input is read with
// `textureLoad` or through the nearest-only sampler at slot 3.
//
// ROW ALIGNMENT
// ──────────────
// Buffer↔texture copies need `bytes_per_row` to be a multiple of
// `wgpu::COPY_BYTES_PER_ROW_ALIGNMENT` (256). At 16 bytes per texel that
// means widths that are multiples of 16 copy without padding; anything
// else gets padded rows in the staging buffer, stripped again on readback.

use wgpu::util::DeviceExt;

use crate::backend::ReadbackError;
use crate::gpu::device::GpuDevice;
use crate::image::InputImage;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Texture format shared by the input and output images.
pub const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

const BYTES_PER_TEXEL: u32 = 16;

/// An RGBA f32 image resident on the GPU. Dropping it releases the texture.
pub struct GpuImage {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuImage {
    /// Upload a decoded input image through an aligned staging buffer.
    ///
    /// The copy is submitted immediately; queue ordering guarantees it lands
    /// before any later dispatch reads the texture.
    pub fn upload(gpu: &GpuDevice, src: &InputImage) -> Self {
        let (width, height) = (src.width(), src.height());
        let texture = Self::create_texture(
            gpu,
            "input image",
            width,
            height,
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let staging = pad_rows(bytemuck::cast_slice(src.texels()), width, height);
        let aligned_bytes_per_row = align_to(width * BYTES_PER_TEXEL, COPY_ALIGNMENT);

        let staging_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("input image staging"),
            contents: &staging,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("input image upload"),
            });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &staging_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            extent(width, height),
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        GpuImage { texture, view, width, height }
    }

    /// Allocate the write-only output image.
    pub fn storage(gpu: &GpuDevice, width: u32, height: u32) -> Self {
        let texture = Self::create_texture(
            gpu,
            "output image",
            width,
            height,
            wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuImage { texture, view, width, height }
    }

    fn create_texture(
        gpu: &GpuDevice,
        label: &str,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
    ) -> wgpu::Texture {
        gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage,
            view_formats: &[],
        })
    }

    /// Read the texture back as row-major texels. Blocks until every
    /// submitted command touching the texture has finished.
    pub fn readback(&self, gpu: &GpuDevice) -> Result<Vec<[f32; 4]>, ReadbackError> {
        let aligned_bytes_per_row = align_to(self.width * BYTES_PER_TEXEL, COPY_ALIGNMENT);
        let readback_size = (aligned_bytes_per_row * self.height) as u64;

        let readback_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("image readback"),
            size: readback_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("image readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            extent(self.width, self.height),
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback_buf.slice(..);
        gpu.map_read_blocking(&slice)?;

        let mapped = slice.get_mapped_range();
        let texels = strip_rows(&mapped, self.width, self.height);
        drop(mapped);
        readback_buf.unmap();

        Ok(texels)
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Copy tightly packed RGBA f32 rows into a buffer whose rows are padded to
/// the copy alignment.
fn pad_rows(packed: &[u8], width: u32, height: u32) -> Vec<u8> {
    let row_bytes = (width * BYTES_PER_TEXEL) as usize;
    let aligned = align_to(width * BYTES_PER_TEXEL, COPY_ALIGNMENT) as usize;
    let mut staging = vec![0u8; aligned * height as usize];
    for (y, row) in packed.chunks_exact(row_bytes).enumerate() {
        staging[y * aligned..y * aligned + row_bytes].copy_from_slice(row);
    }
    staging
}

/// Inverse of [`pad_rows`]: drop the alignment padding and decode texels.
fn strip_rows(padded: &[u8], width: u32, height: u32) -> Vec<[f32; 4]> {
    let row_bytes = (width * BYTES_PER_TEXEL) as usize;
    let aligned = align_to(width * BYTES_PER_TEXEL, COPY_ALIGNMENT) as usize;
    let mut out = Vec::with_capacity((width * height) as usize);
    for y in 0..height as usize {
        let row = &padded[y * aligned..y * aligned + row_bytes];
        out.extend(
            row.chunks_exact(BYTES_PER_TEXEL as usize)
                .map(|t| bytemuck::pod_read_unaligned::<[f32; 4]>(t)),
        );
    }
    out
}
