// frame.rs — per-frame uniforms pushed to the kernel before each dispatch.
//
// WGSL side (group 1, binding 0):
//
//   struct FrameState {
//       time:    f32,
//       color_a: vec3<f32>,
//       color_b: vec3<f32>,
//   }
//   @group(1) @binding(0) var<uniform> frame: FrameState;
//
// In the uniform address space a vec3<f32> is 16-byte aligned, so `time`
// is followed by 12 bytes of padding and each colour by 4. The Rust struct
// spells the padding out so it can derive `Pod`.

/// Per-frame scalar inputs. Never persisted.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameState {
    pub time: f32,
    _pad0: [f32; 3],
    pub color_a: [f32; 3],
    _pad1: f32,
    pub color_b: [f32; 3],
    _pad2: f32,
}

impl FrameState {
    pub fn new(time: f32, color_a: [f32; 3], color_b: [f32; 3]) -> Self {
        FrameState {
            time,
            _pad0: [0.0; 3],
            color_a,
            _pad1: 0.0,
            color_b,
            _pad2: 0.0,
        }
    }

    /// Uniforms for `seconds` since host start: two colours whose blue
    /// channel pulses with `(sin t + 1) / 2`.
    pub fn at(seconds: f64) -> Self {
        let pulse = ((seconds.sin() + 1.0) / 2.0) as f32;
        FrameState::new(seconds as f32, [0.2, 0.2, pulse], [0.8, 0.8, pulse])
    }
}
