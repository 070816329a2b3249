// image.rs — input image decoding for the kernel's sampled texture.
//
// Every input is expanded to four f32 channels before upload, whatever its
// on-disk format, so the GPU side only ever sees `Rgba32Float`:
//
//   channels  layout  texel
//   ────────  ──────  ──────────────
//      1      Red     (r, 0, 0, 1)
//      3      Rgb     (r, g, b, 1)
//      4      Rgba    (r, g, b, a)
//
// A single-channel image lands in red only, not replicated to grey.
// Two-channel (luma + alpha) and anything else is rejected at startup:
// guessing a layout would upload undefined texel contents.
//
// Rows are stored top row first, which is also wgpu's texture origin, so
// no vertical flip is applied.

use std::path::{Path, PathBuf};

use image::DynamicImage;

/// Channel layout of a decoded input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Red,
    Rgb,
    Rgba,
}

impl ChannelLayout {
    pub fn from_channel_count(channels: u8) -> Result<Self, ImageLoadError> {
        match channels {
            1 => Ok(ChannelLayout::Red),
            3 => Ok(ChannelLayout::Rgb),
            4 => Ok(ChannelLayout::Rgba),
            other => Err(ImageLoadError::UnsupportedChannels(other)),
        }
    }

    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Red => 1,
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("cannot decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("unsupported image channel count {0} (expected 1, 3 or 4)")]
    UnsupportedChannels(u8),
    #[error("image has {actual} samples, expected {expected}")]
    SampleCount { expected: usize, actual: usize },
}

/// A decoded input image, expanded to RGBA f32 texels.
#[derive(Debug, Clone, PartialEq)]
pub struct InputImage {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl InputImage {
    /// Decode the file at `path`.
    pub fn open(path: &Path) -> Result<Self, ImageLoadError> {
        let img = image::open(path).map_err(|source| ImageLoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_dynamic(&img)
    }

    pub fn from_dynamic(img: &DynamicImage) -> Result<Self, ImageLoadError> {
        let layout = ChannelLayout::from_channel_count(img.color().channel_count())?;
        let samples = match layout {
            ChannelLayout::Red => img.to_luma32f().into_raw(),
            ChannelLayout::Rgb => img.to_rgb32f().into_raw(),
            ChannelLayout::Rgba => img.to_rgba32f().into_raw(),
        };
        Self::from_samples(img.width(), img.height(), layout, &samples)
    }

    /// Build from interleaved samples in `layout`.
    pub fn from_samples(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        samples: &[f32],
    ) -> Result<Self, ImageLoadError> {
        let expected = width as usize * height as usize * layout.channels();
        if samples.len() != expected {
            return Err(ImageLoadError::SampleCount { expected, actual: samples.len() });
        }
        let texels = samples
            .chunks_exact(layout.channels())
            .map(|s| match layout {
                ChannelLayout::Red => [s[0], 0.0, 0.0, 1.0],
                ChannelLayout::Rgb => [s[0], s[1], s[2], 1.0],
                ChannelLayout::Rgba => [s[0], s[1], s[2], s[3]],
            })
            .collect();
        Ok(InputImage { width, height, texels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major texels, top row first.
    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }
}
