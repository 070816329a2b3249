// kernel-host: run a WGSL compute kernel every frame, read one feedback
// value back, present the output image, and hot-swap the kernel on demand.
//
// Core:     program (lifecycle), binding (slot table), dispatch (grid),
//           feedback (sentinel / blocking read / edge report)
// Seam:     backend::KernelBackend, implemented for wgpu in gpu::backend
// Ambient:  config, source, image, frame, event, present, host

pub mod backend;
pub mod binding;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod feedback;
pub mod frame;
pub mod gpu;
pub mod host;
pub mod image;
pub mod present;
pub mod program;
pub mod source;
