// config.rs — startup parameters.
//
// Everything here is fixed for the lifetime of the process. Changing the
// resolution or tile size means restarting the host.

use std::num::NonZeroU32;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Which wgpu backends may be used when selecting an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum BackendChoice {
    /// Vulkan, Metal, DX12 or WebGPU, whichever the platform offers.
    #[default]
    Primary,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl BackendChoice {
    pub fn backends(self) -> wgpu::Backends {
        match self {
            BackendChoice::Primary => wgpu::Backends::PRIMARY,
            BackendChoice::Vulkan => wgpu::Backends::VULKAN,
            BackendChoice::Metal => wgpu::Backends::METAL,
            BackendChoice::Dx12 => wgpu::Backends::DX12,
            BackendChoice::Gl => wgpu::Backends::GL,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "kernel-host")]
#[command(about = "Run a hot-reloadable WGSL compute kernel every frame", long_about = None)]
#[command(version)]
pub struct HostConfig {
    /// Output image width in pixels
    #[arg(long, default_value = "720")]
    pub width: NonZeroU32,

    /// Output image height in pixels
    #[arg(long, default_value = "720")]
    pub height: NonZeroU32,

    /// Workgroup tile edge (the kernel runs TILE_SIZE × TILE_SIZE invocations per group)
    #[arg(long, default_value = "8")]
    pub tile_size: NonZeroU32,

    /// WGSL kernel source, re-read on every reload (Space)
    #[arg(long, default_value = "assets/shader/kernel.wgsl")]
    pub kernel: PathBuf,

    /// Input image bound at slot 1
    #[arg(long, default_value = "assets/stratis.png")]
    pub image: PathBuf,

    /// Graphics API used to find an adapter
    #[arg(long, value_enum, default_value_t = BackendChoice::Primary)]
    pub backend: BackendChoice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = HostConfig::try_parse_from(["kernel-host"]).unwrap();
        assert_eq!(cfg.width.get(), 720);
        assert_eq!(cfg.height.get(), 720);
        assert_eq!(cfg.tile_size.get(), 8);
        assert_eq!(cfg.kernel, PathBuf::from("assets/shader/kernel.wgsl"));
        assert_eq!(cfg.image, PathBuf::from("assets/stratis.png"));
        assert_eq!(cfg.backend, BackendChoice::Primary);
    }

    #[test]
    fn test_overrides() {
        let cfg = HostConfig::try_parse_from([
            "kernel-host",
            "--width",
            "640",
            "--height",
            "480",
            "--tile-size",
            "16",
            "--kernel",
            "k.wgsl",
            "--backend",
            "vulkan",
        ])
        .unwrap();
        assert_eq!((cfg.width.get(), cfg.height.get()), (640, 480));
        assert_eq!(cfg.tile_size.get(), 16);
        assert_eq!(cfg.kernel, PathBuf::from("k.wgsl"));
        assert_eq!(cfg.backend.backends(), wgpu::Backends::VULKAN);
    }

    #[test]
    fn test_zero_rejected() {
        for flag in ["--width", "--height", "--tile-size"] {
            let res = HostConfig::try_parse_from(["kernel-host", flag, "0"]);
            assert!(res.is_err(), "{flag} 0 should be rejected");
        }
    }

    #[test]
    fn test_negative_rejected() {
        assert!(HostConfig::try_parse_from(["kernel-host", "--width", "-4"]).is_err());
    }
}
