// gpu/mod.rs — wgpu implementation of the kernel host's GPU side.
//
//   device   adapter selection, device/queue, blocking buffer map
//   image    input upload, output storage image, texture readback
//   backend  `KernelBackend` for wgpu: shader modules, compute pipelines,
//            bind groups, the feedback buffer and its staging copy
//
// Nothing outside this module names a wgpu type except the error enums and
// `config::BackendChoice`.

pub mod backend;
pub mod device;
pub mod image;
