// backend.rs — the seam between the host's frame protocol and the GPU.
//
// Everything the host does to the GPU goes through `KernelBackend`:
//
//   lifecycle:  compile → link → bind
//   per frame:  push_frame_state → write_feedback → dispatch → barrier
//               → read_feedback → read_output
//
// The production implementation is `gpu::backend::WgpuBackend`. The
// integration tests drive the same Program Manager / Feedback Channel /
// Dispatch Scheduler code against an in-memory backend that records every
// call, which is how frame ordering and reload safety are checked without
// a GPU.
//
// RESOURCE RELEASE
// ─────────────────
// There is no explicit `release` method. A compiled unit or a program is
// released when it is dropped: `link` consumes its unit, a rejected program
// is dropped inside `link`, and the Program Manager drops the previous
// program only after the new one is installed.

use crate::binding::{BindingError, HostResources, ResourceBinding};
use crate::dispatch::ExecutionGrid;
use crate::frame::FrameState;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The backend rejected the kernel source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("shader compilation error: {log}")]
pub struct CompileError {
    /// Human-readable diagnostics, as produced by the shader compiler.
    pub log: String,
}

/// The backend could not build an executable program from a compiled unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("program linking error: {log}")]
pub struct LinkError {
    pub log: String,
}

/// A host-visible readback (feedback value or output image) failed.
#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    #[error("buffer map failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("buffer map callback was dropped before it fired")]
    CallbackDropped,
}

// ---------------------------------------------------------------------------
// KernelBackend
// ---------------------------------------------------------------------------

/// GPU operations used by the kernel host.
///
/// All methods are called from the single frame-loop thread in strict
/// program order.
pub trait KernelBackend {
    /// A compiled but not yet linked kernel.
    type Unit;
    /// An executable kernel plus whatever binding state the backend keeps
    /// for it.
    type Program;

    /// Identities of the host resources (output image, input image,
    /// feedback buffer, input sampler). Stable for the lifetime of the
    /// backend.
    fn resources(&self) -> HostResources;

    /// Translate kernel source into a compiled unit.
    fn compile(&mut self, source: &str) -> Result<Self::Unit, CompileError>;

    /// Build a program from a compiled unit. The unit is consumed (and
    /// therefore released) whether or not linking succeeds.
    fn link(&mut self, unit: Self::Unit) -> Result<Self::Program, LinkError>;

    /// Attach `bindings` to `program`, replacing any previous attachment.
    fn bind(
        &mut self,
        program: &mut Self::Program,
        bindings: &[ResourceBinding],
    ) -> Result<(), BindingError>;

    /// Upload the per-frame uniforms read by the kernel.
    fn push_frame_state(&mut self, state: &FrameState);

    /// Overwrite the feedback buffer with `value`.
    fn write_feedback(&mut self, value: i32);

    /// Issue `program` over `grid`. Returns as soon as the work is recorded.
    fn dispatch(&mut self, program: &Self::Program, grid: ExecutionGrid);

    /// Make the writes of the preceding dispatch visible to later reads.
    fn barrier(&mut self);

    /// Read the feedback buffer, blocking until all GPU work issued before
    /// this call has retired.
    fn read_feedback(&mut self) -> Result<i32, ReadbackError>;

    /// Read the output image back as row-major RGBA texels.
    fn read_output(&mut self) -> Result<Vec<[f32; 4]>, ReadbackError>;
}
