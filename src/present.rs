// present.rs — Presentation: getting the computed output image on screen.
//
// The host only needs four things from a display surface, captured by the
// `Surface` trait. `MinifbSurface` is the shipped implementation: a fixed
// size, non-resizable window fed a packed 0x00RRGGBB framebuffer.
//
// Input is mapped to host events while polling:
//   Space         → ReloadRequested
//   Esc / close   → ShutdownRequested

use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::event::{EventQueue, HostEvent};

#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error("window error: {0}")]
    Window(#[from] minifb::Error),
    #[error("frame has {actual} texels, surface expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// A display surface the host can clear, present to and poll.
pub trait Surface {
    fn is_open(&self) -> bool;

    /// Reset the framebuffer to opaque black.
    fn clear(&mut self);

    /// Blit row-major RGBA texels (same size as the surface) and swap.
    fn present(&mut self, texels: &[[f32; 4]]) -> Result<(), PresentError>;

    /// Translate pending input into host events.
    fn poll_events(&mut self, events: &mut EventQueue);
}

/// Pack one RGBA f32 texel as 0x00RRGGBB. Channels are clamped to [0, 1];
/// alpha is ignored.
#[inline]
pub fn pack_rgb(texel: [f32; 4]) -> u32 {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(texel[0]) << 16) | (channel(texel[1]) << 8) | channel(texel[2])
}

/// Pack a whole frame into `fb`, which must be the same length.
pub fn pack_frame(texels: &[[f32; 4]], fb: &mut [u32]) -> Result<(), PresentError> {
    if texels.len() != fb.len() {
        return Err(PresentError::SizeMismatch {
            expected: fb.len(),
            actual: texels.len(),
        });
    }
    for (dst, &src) in fb.iter_mut().zip(texels) {
        *dst = pack_rgb(src);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// minifb window
// ---------------------------------------------------------------------------

pub struct MinifbSurface {
    window: Window,
    fb: Vec<u32>,
    width: usize,
    height: usize,
}

impl MinifbSurface {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self, PresentError> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;
        // One present per display refresh.
        window.set_target_fps(60);
        Ok(MinifbSurface {
            window,
            fb: vec![0u32; width * height],
            width,
            height,
        })
    }
}

impl Surface for MinifbSurface {
    fn is_open(&self) -> bool {
        self.window.is_open()
    }

    fn clear(&mut self) {
        self.fb.fill(0);
    }

    fn present(&mut self, texels: &[[f32; 4]]) -> Result<(), PresentError> {
        pack_frame(texels, &mut self.fb)?;
        self.window.update_with_buffer(&self.fb, self.width, self.height)?;
        Ok(())
    }

    fn poll_events(&mut self, events: &mut EventQueue) {
        if self.window.is_key_pressed(Key::Space, KeyRepeat::No) {
            events.push(HostEvent::ReloadRequested);
        }
        if !self.window.is_open() || self.window.is_key_down(Key::Escape) {
            events.push(HostEvent::ShutdownRequested);
        }
    }
}
