// dispatch.rs — Dispatch Scheduler.
//
// The execution grid is the number of workgroups needed to cover the output
// image with square tiles of `tile_size` × `tile_size` invocations. It is
// computed once at startup; the tile size cannot change mid-run.
//
// Ceiling division means the last row/column of workgroups may hang past the
// image edge. The kernel must guard against out-of-bounds invocations:
//
//   if gid.x >= dims.x || gid.y >= dims.y { return; }
//
// The host does not enforce this.
//
// TILE SIZE IN THE KERNEL
// ────────────────────────
// naga 22 only accepts const-expressions in `@workgroup_size`, so a
// pipeline `override` cannot carry the tile size. The host instead prepends
//
//   const TILE_SIZE: u32 = <tile>u;
//
// to the kernel source before compiling it. Kernels use the name and must not
// declare it themselves.

use std::fmt;
use std::num::NonZeroU32;

use crate::backend::KernelBackend;

/// Name of the module-scope constant the host injects with the tile size.
///
/// Kernels use it in `@workgroup_size(TILE_SIZE, TILE_SIZE, 1)`, so the
/// workgroup extent and the grid are always derived from the same number.
pub const TILE_SIZE_CONSTANT: &str = "TILE_SIZE";

/// Number of source lines `specialize_kernel` puts in front of the kernel.
pub const PRELUDE_LINES: u32 = 1;

/// Prefix `source` with the `TILE_SIZE` declaration.
pub fn specialize_kernel(source: &str, tile_size: NonZeroU32) -> String {
    format!("const {TILE_SIZE_CONSTANT}: u32 = {}u;\n{source}", tile_size.get())
}

/// Workgroup counts in x and y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionGrid {
    pub groups_x: u32,
    pub groups_y: u32,
}

impl fmt::Display for ExecutionGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} workgroups", self.groups_x, self.groups_y)
    }
}

/// Compute the grid covering a `width` × `height` image.
///
/// Returns the smallest `(gx, gy)` with `gx * tile >= width` and
/// `gy * tile >= height`.
pub fn compute_grid(width: u32, height: u32, tile_size: NonZeroU32) -> ExecutionGrid {
    ExecutionGrid {
        groups_x: width.div_ceil(tile_size.get()),
        groups_y: height.div_ceil(tile_size.get()),
    }
}

/// Issues the active kernel over a fixed grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatcher {
    tile_size: NonZeroU32,
    grid: ExecutionGrid,
}

impl Dispatcher {
    pub fn new(width: u32, height: u32, tile_size: NonZeroU32) -> Self {
        Dispatcher {
            tile_size,
            grid: compute_grid(width, height, tile_size),
        }
    }

    pub fn tile_size(&self) -> NonZeroU32 {
        self.tile_size
    }

    pub fn grid(&self) -> ExecutionGrid {
        self.grid
    }

    /// Kernel source as handed to the compiler.
    pub fn specialize(&self, source: &str) -> String {
        specialize_kernel(source, self.tile_size)
    }

    /// Record the kernel invocation. Completion is asynchronous; call
    /// [`Dispatcher::barrier`] before reading anything the kernel wrote.
    pub fn dispatch<B: KernelBackend>(&self, backend: &mut B, program: &B::Program) {
        backend.dispatch(program, self.grid);
    }

    /// Order the dispatch's image and buffer writes before later reads.
    /// Does not block the calling thread.
    pub fn barrier<B: KernelBackend>(&self, backend: &mut B) {
        backend.barrier();
    }
}
