// host.rs — the frame loop.
//
// ONE FRAME
// ──────────
//   1. drain events            reload / shutdown, only ever between frames
//   2. surface.clear
//   3. push frame state        time + colours
//   4. feedback reset          sentinel 0
//   5. dispatch                active kernel over the fixed grid
//   6. barrier
//   7. feedback read           blocks until the GPU has finished the frame
//   8. edge report             LOS / BLOCKED on change only
//   9. output readback + surface.present
//  10. surface.poll_events
//
// Because step 7 waits for the frame's GPU work, the dispatch of frame N has
// retired before step 1 of frame N+1 can swap the kernel. No in-flight
// dispatch is ever cancelled.

use std::time::Instant;

use crate::backend::{KernelBackend, ReadbackError};
use crate::binding::BindingTable;
use crate::dispatch::Dispatcher;
use crate::event::EventQueue;
use crate::feedback::{FeedbackChannel, SignalEvent};
use crate::frame::FrameState;
use crate::gpu::device::GpuError;
use crate::image::ImageLoadError;
use crate::present::{PresentError, Surface};
use crate::program::{ProgramManager, ReloadError};
use crate::source::{SourceError, SourceLoader};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures that abort the process before the first frame.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Device(#[from] GpuError),
    #[error(transparent)]
    Image(#[from] ImageLoadError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("initial kernel rejected: {0}")]
    Kernel(#[from] ReloadError),
    #[error(transparent)]
    Present(#[from] PresentError),
}

/// Failures that end a running frame loop.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("no active kernel")]
    NoActiveProgram,
    #[error("readback failed: {0}")]
    Readback(#[from] ReadbackError),
    #[error(transparent)]
    Present(#[from] PresentError),
}

/// Why an in-session reload did not take effect. The previous kernel keeps
/// running in every case.
#[derive(Debug, thiserror::Error)]
pub enum HotReloadError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Program(#[from] ReloadError),
}

/// Whether the loop should keep going after handling events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

// ---------------------------------------------------------------------------
// KernelHost
// ---------------------------------------------------------------------------

pub struct KernelHost<B: KernelBackend> {
    backend: B,
    programs: ProgramManager<B>,
    bindings: BindingTable,
    dispatcher: Dispatcher,
    feedback: FeedbackChannel,
    loader: SourceLoader,
    events: EventQueue,
    frames: u64,
}

impl<B: KernelBackend> KernelHost<B> {
    /// Load and activate the initial kernel. With no earlier program to fall
    /// back on, any failure here is fatal.
    pub fn new(
        mut backend: B,
        loader: SourceLoader,
        dispatcher: Dispatcher,
    ) -> Result<Self, StartupError> {
        let bindings = BindingTable::new(backend.resources());
        let mut programs = ProgramManager::new();

        let source = loader.load()?;
        if let Err(e) = programs.reload(&mut backend, &source, &bindings) {
            log::error!("{e}");
            return Err(e.into());
        }
        log::info!(
            "kernel {} running over {} (tile {})",
            loader.path().display(),
            dispatcher.grid(),
            dispatcher.tile_size()
        );

        Ok(KernelHost {
            backend,
            programs,
            bindings,
            dispatcher,
            feedback: FeedbackChannel::new(),
            loader,
            events: EventQueue::new(),
            frames: 0,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn programs(&self) -> &ProgramManager<B> {
        &self.programs
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn feedback(&self) -> &FeedbackChannel {
        &self.feedback
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// Frames completed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Re-read the kernel source and hot-swap it. Failures are logged and
    /// returned; the previous kernel stays active.
    pub fn reload(&mut self) -> Result<(), HotReloadError> {
        let result = self
            .loader
            .load()
            .map_err(HotReloadError::from)
            .and_then(|source| {
                self.programs
                    .reload(&mut self.backend, &source, &self.bindings)
                    .map_err(HotReloadError::from)
            });
        match &result {
            Ok(()) => println!("Shader reload"),
            Err(e) => log::error!("{e}"),
        }
        result
    }

    /// Drain the event queue. Runs at the top of every frame.
    pub fn process_events(&mut self) -> Flow {
        let actions = self.events.drain();
        if actions.shutdown {
            return Flow::Shutdown;
        }
        if actions.reload {
            // Already logged; the old kernel keeps running.
            let _ = self.reload();
        }
        Flow::Continue
    }

    /// Run steps 3–8 of the frame protocol at `time` seconds.
    pub fn frame(&mut self, time: f64) -> Result<Option<SignalEvent>, FrameError> {
        let program = self.programs.active().ok_or(FrameError::NoActiveProgram)?;

        self.backend.push_frame_state(&FrameState::at(time));
        self.feedback.reset(&mut self.backend);
        self.dispatcher.dispatch(&mut self.backend, program);
        self.dispatcher.barrier(&mut self.backend);
        let raw = self.feedback.read_blocking(&mut self.backend)?;

        self.frames += 1;
        Ok(self.feedback.observe(raw))
    }

    /// The output image as computed by the last frame.
    pub fn output(&mut self) -> Result<Vec<[f32; 4]>, ReadbackError> {
        self.backend.read_output()
    }

    /// Drive frames until a shutdown event or the surface closes. Returns the
    /// number of frames rendered.
    pub fn run<S: Surface>(&mut self, surface: &mut S) -> Result<u64, FrameError> {
        let start = Instant::now();
        while surface.is_open() {
            if self.process_events() == Flow::Shutdown {
                break;
            }
            surface.clear();

            if let Some(event) = self.frame(start.elapsed().as_secs_f64())? {
                println!("{event}");
            }

            let texels = self.output()?;
            surface.present(&texels)?;
            surface.poll_events(&mut self.events);
        }
        log::info!("shutting down after {} frames", self.frames);
        Ok(self.frames)
    }
}
