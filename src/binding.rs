// binding.rs — Resource Binding Table.
//
// The host and the kernel agree on four fixed slots in bind group 0:
//
//   slot  resource         access   WGSL declaration
//   ────  ───────────────  ───────  ─────────────────────────────────────────
//    0    output image     write    texture_storage_2d<rgba32float, write>
//    1    input image      sample   texture_2d<f32>
//    2    feedback buffer  storage  var<storage, read_write> i32 / atomic<i32>
//    3    input sampler    sampler  sampler (nearest, non-filtering)
//
// Slot 3 lets a kernel read slot 1 with normalized coordinates through
// `textureSampleLevel(input, input_sampler, uv, 0.0)`; `textureLoad` with
// texel coordinates works without it.
//
// The slot numbers are part of the kernel source contract; nothing is
// inferred from shader reflection. Resource identities are allocated once by
// the backend and never change, so re-applying the table after a reload
// points the new program at exactly the resources the old one used.
//
// A program swap may drop whatever was bound to the previous program (in
// wgpu a bind group belongs to the pipeline it was built for), so the
// Program Manager calls `apply` after every successful activation.

use std::fmt;

use crate::backend::KernelBackend;

// ---------------------------------------------------------------------------
// Slots, access modes, resource ids
// ---------------------------------------------------------------------------

/// A binding slot index shared by host and kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingSlot {
    OutputImage,
    InputImage,
    Feedback,
    InputSampler,
}

impl BindingSlot {
    pub const ALL: [BindingSlot; 4] = [
        BindingSlot::OutputImage,
        BindingSlot::InputImage,
        BindingSlot::Feedback,
        BindingSlot::InputSampler,
    ];

    /// The `@binding(n)` index used in the kernel.
    pub fn index(self) -> u32 {
        match self {
            BindingSlot::OutputImage => 0,
            BindingSlot::InputImage => 1,
            BindingSlot::Feedback => 2,
            BindingSlot::InputSampler => 3,
        }
    }

    /// The access mode the kernel contract assigns to this slot.
    pub fn access(self) -> AccessMode {
        match self {
            BindingSlot::OutputImage => AccessMode::Write,
            BindingSlot::InputImage => AccessMode::Sample,
            BindingSlot::Feedback => AccessMode::Storage,
            BindingSlot::InputSampler => AccessMode::Sampler,
        }
    }
}

impl fmt::Display for BindingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindingSlot::OutputImage => "output image",
            BindingSlot::InputImage => "input image",
            BindingSlot::Feedback => "feedback buffer",
            BindingSlot::InputSampler => "input sampler",
        };
        write!(f, "slot {} ({name})", self.index())
    }
}

/// How the kernel accesses a bound resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Write-only storage image.
    Write,
    /// Read-only sampled image.
    Sample,
    /// Read-write storage buffer.
    Storage,
    /// Sampler state used with the input image.
    Sampler,
}

/// Opaque identity of a host resource, allocated by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

/// The resources the host owns for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostResources {
    pub output_image: ResourceId,
    pub input_image: ResourceId,
    pub feedback: ResourceId,
    pub input_sampler: ResourceId,
}

/// One (slot, resource, access) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBinding {
    pub slot: BindingSlot,
    pub resource: ResourceId,
    pub access: AccessMode,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Raised by a backend that cannot honour a binding. Only reachable when the
/// table and the backend disagree about resource identities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("{slot}: unknown resource {resource:?}")]
    UnknownResource { slot: BindingSlot, resource: ResourceId },
    #[error("{slot}: resource {resource:?} cannot be bound for {access:?} access")]
    AccessMismatch {
        slot: BindingSlot,
        resource: ResourceId,
        access: AccessMode,
    },
}

// ---------------------------------------------------------------------------
// BindingTable
// ---------------------------------------------------------------------------

/// The fixed binding declaration applied to every active program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTable {
    entries: [ResourceBinding; 4],
}

impl BindingTable {
    pub fn new(resources: HostResources) -> Self {
        let entry = |slot: BindingSlot, resource| ResourceBinding {
            slot,
            resource,
            access: slot.access(),
        };
        BindingTable {
            entries: [
                entry(BindingSlot::OutputImage, resources.output_image),
                entry(BindingSlot::InputImage, resources.input_image),
                entry(BindingSlot::Feedback, resources.feedback),
                entry(BindingSlot::InputSampler, resources.input_sampler),
            ],
        }
    }

    pub fn entries(&self) -> &[ResourceBinding] {
        &self.entries
    }

    pub fn get(&self, slot: BindingSlot) -> &ResourceBinding {
        // Entries are stored in slot order.
        &self.entries[slot.index() as usize]
    }

    /// Bind every slot of the table to `program`. Idempotent: the backend
    /// replaces the program's previous attachment wholesale.
    pub fn apply<B: KernelBackend>(
        &self,
        backend: &mut B,
        program: &mut B::Program,
    ) -> Result<(), BindingError> {
        backend.bind(program, &self.entries)
    }
}
