// main.rs — kernel-host binary.
//
// Usage:
//   cargo run --release -- --kernel assets/shader/kernel.wgsl --image assets/stratis.png
//
// Controls:
//   Space  re-read the kernel source and hot-swap it
//   Esc    quit
//
// Set RUST_LOG=debug for adapter enumeration details.

use std::process::ExitCode;

use clap::Parser;

use kernel_host::config::HostConfig;
use kernel_host::dispatch::Dispatcher;
use kernel_host::gpu::backend::WgpuBackend;
use kernel_host::gpu::device::GpuDevice;
use kernel_host::host::{KernelHost, StartupError};
use kernel_host::image::InputImage;
use kernel_host::present::MinifbSurface;
use kernel_host::source::SourceLoader;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = HostConfig::parse();

    let (mut host, mut surface) = match start(&config) {
        Ok(parts) => parts,
        Err(e) => {
            log::error!("startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    match host.run(&mut surface) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn start(config: &HostConfig) -> Result<(KernelHost<WgpuBackend>, MinifbSurface), StartupError> {
    let (width, height) = (config.width, config.height);
    let dispatcher = Dispatcher::new(width.get(), height.get(), config.tile_size);

    let gpu = GpuDevice::new(config.backend.backends())?;
    let input = InputImage::open(&config.image)?;
    log::info!(
        "input image {}: {}×{}",
        config.image.display(),
        input.width(),
        input.height()
    );

    let backend = WgpuBackend::new(gpu, &input, width, height, &dispatcher)?;
    let host = KernelHost::new(backend, SourceLoader::new(&config.kernel), dispatcher)?;

    let title = format!("kernel-host — {}", config.kernel.display());
    let surface = MinifbSurface::new(&title, width.get() as usize, height.get() as usize)?;
    Ok((host, surface))
}
