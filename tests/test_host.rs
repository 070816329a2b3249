// tests/test_host.rs — the per-frame protocol and hot reload through
// `KernelHost`, using the recording backend and a kernel file on disk.
//
//   cargo test --test test_host

mod common;

use std::fs;
use std::num::NonZeroU32;

use common::{Call, MockBackend};
use kernel_host::dispatch::{Dispatcher, ExecutionGrid};
use kernel_host::event::{EventQueue, HostEvent};
use kernel_host::feedback::SignalEvent;
use kernel_host::host::{Flow, HotReloadError, KernelHost, StartupError};
use kernel_host::present::{PresentError, Surface};
use kernel_host::program::{ProgramState, ReloadError};
use kernel_host::source::SourceLoader;

fn dispatcher() -> Dispatcher {
    Dispatcher::new(720, 720, NonZeroU32::new(8).unwrap())
}

/// A kernel file in a temp dir plus a host running it.
fn host_with(source: &str) -> (tempfile::TempDir, std::path::PathBuf, KernelHost<MockBackend>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kernel.wgsl");
    fs::write(&path, source).unwrap();
    let host = KernelHost::new(MockBackend::new(), SourceLoader::new(&path), dispatcher()).unwrap();
    (dir, path, host)
}

// ===== Startup =====

#[test]
fn startup_fails_on_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let loader = SourceLoader::new(dir.path().join("nope.wgsl"));
    let err = KernelHost::new(MockBackend::new(), loader, dispatcher()).err().unwrap();
    assert!(matches!(err, StartupError::Source(_)));
}

#[test]
fn startup_fails_on_bad_kernel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kernel.wgsl");
    fs::write(&path, "error: no entry point").unwrap();
    let err = KernelHost::new(MockBackend::new(), SourceLoader::new(&path), dispatcher())
        .err()
        .unwrap();
    assert!(matches!(err, StartupError::Kernel(ReloadError::Compile(_))));
}

#[test]
fn startup_activates_kernel() {
    let (_dir, _path, host) = host_with("feedback = 0");
    assert_eq!(host.programs().state(), ProgramState::Active);
    assert_eq!(host.frames(), 0);
}

// ===== Frame protocol =====

#[test]
fn frame_issues_calls_in_protocol_order() {
    let (_dir, _path, mut host) = host_with("feedback = 0");
    let id = host.programs().active().unwrap().id;
    host.frame(0.5).unwrap();

    assert_eq!(
        host.backend().calls,
        vec![
            Call::PushFrame(0.5),
            Call::WriteFeedback(0),
            Call::Dispatch {
                program: id,
                grid: ExecutionGrid { groups_x: 90, groups_y: 90 },
            },
            Call::Barrier,
            Call::ReadFeedback,
        ]
    );
    assert_eq!(host.frames(), 1);
}

#[test]
fn sentinel_reset_every_frame() {
    // A kernel that never writes must read back the sentinel each frame,
    // even if the buffer held something else beforehand.
    let (_dir, _path, mut host) = host_with("no feedback directive");
    assert_eq!(host.frame(0.0).unwrap(), Some(SignalEvent::Los));
    for i in 1..5 {
        assert_eq!(host.frame(i as f64).unwrap(), None);
    }
    assert!(host.feedback().signal());
}

#[test]
fn edge_triggered_events_across_reloads() {
    // Per-frame signals [true, true, false, false, true].
    let (_dir, path, mut host) = host_with("feedback = 0");
    let mut events = Vec::new();
    for (frame, source) in ["feedback = 0", "feedback = 0", "feedback = 5", "feedback = 5", "feedback = 0"]
        .iter()
        .enumerate()
    {
        fs::write(&path, source).unwrap();
        host.events_mut().push(HostEvent::ReloadRequested);
        assert_eq!(host.process_events(), Flow::Continue);
        if let Some(e) = host.frame(frame as f64).unwrap() {
            events.push((frame, e));
        }
    }
    assert_eq!(
        events,
        vec![
            (0, SignalEvent::Los),
            (2, SignalEvent::Blocked),
            (4, SignalEvent::Los),
        ]
    );
}

#[test]
fn blocked_from_first_frame_is_silent() {
    let (_dir, _path, mut host) = host_with("feedback = 1");
    assert_eq!(host.frame(0.0).unwrap(), None);
    assert_eq!(host.frame(0.1).unwrap(), None);
    assert!(!host.feedback().signal());
}

// ===== Hot reload =====

#[test]
fn reload_swaps_kernel_between_frames() {
    let (_dir, path, mut host) = host_with("feedback = 0");
    let first = host.programs().active().unwrap().id;

    fs::write(&path, "feedback = 2").unwrap();
    for _ in 0..3 {
        host.events_mut().push(HostEvent::ReloadRequested);
    }
    assert_eq!(host.process_events(), Flow::Continue);

    let second = host.programs().active().unwrap().id;
    assert_ne!(first, second);
    assert_eq!(host.programs().generation(), 2, "queued reloads should coalesce");
    assert_eq!(host.backend().compiles, 2);
}

#[test]
fn failed_reload_keeps_running_previous_kernel() {
    let (_dir, path, mut host) = host_with("feedback = 0");
    let first = host.programs().active().unwrap().id;

    fs::write(&path, "error: oops").unwrap();
    let err = host.reload().unwrap_err();
    assert!(matches!(err, HotReloadError::Program(ReloadError::Compile(_))));

    host.frame(0.0).unwrap();
    assert!(host
        .backend()
        .calls
        .contains(&Call::Dispatch { program: first, grid: dispatcher().grid() }));
    assert_eq!(host.backend().units.get(), 0);
    assert_eq!(host.backend().programs.get(), 1);
}

#[test]
fn reload_with_missing_source_keeps_kernel() {
    let (_dir, path, mut host) = host_with("feedback = 0");
    let first = host.programs().active().unwrap().id;

    fs::remove_file(&path).unwrap();
    let err = host.reload().unwrap_err();
    assert!(matches!(err, HotReloadError::Source(_)));
    assert_eq!(host.programs().active().unwrap().id, first);
    assert_eq!(host.programs().state(), ProgramState::Active);
}

#[test]
fn shutdown_wins_over_reload() {
    let (_dir, _path, mut host) = host_with("feedback = 0");
    host.events_mut().push(HostEvent::ReloadRequested);
    host.events_mut().push(HostEvent::ShutdownRequested);
    assert_eq!(host.process_events(), Flow::Shutdown);
    assert_eq!(host.backend().compiles, 1);
}

// ===== run() with a scripted surface =====

/// Stays open for a fixed number of presents, pressing "reload" on one of
/// them.
struct ScriptedSurface {
    remaining: usize,
    reload_on: Option<usize>,
    clears: usize,
    presents: usize,
}

impl Surface for ScriptedSurface {
    fn is_open(&self) -> bool {
        self.remaining > 0
    }

    fn clear(&mut self) {
        self.clears += 1;
    }

    fn present(&mut self, texels: &[[f32; 4]]) -> Result<(), PresentError> {
        assert_eq!(texels.len(), 4);
        self.presents += 1;
        self.remaining -= 1;
        Ok(())
    }

    fn poll_events(&mut self, events: &mut EventQueue) {
        if self.reload_on == Some(self.presents) {
            events.push(HostEvent::ReloadRequested);
        }
    }
}

#[test]
fn run_renders_until_surface_closes() {
    let (_dir, _path, mut host) = host_with("feedback = 0");
    let mut surface = ScriptedSurface { remaining: 3, reload_on: None, clears: 0, presents: 0 };
    let frames = host.run(&mut surface).unwrap();
    assert_eq!(frames, 3);
    assert_eq!(surface.clears, 3);
    assert_eq!(surface.presents, 3);

    // Output is read after the feedback, once per frame.
    let calls = &host.backend().calls;
    let reads: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Call::ReadFeedback | Call::ReadOutput))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(reads.len(), 6);
    for pair in reads.chunks(2) {
        assert_eq!(calls[pair[0]], Call::ReadFeedback);
        assert_eq!(calls[pair[1]], Call::ReadOutput);
    }
}

#[test]
fn run_applies_reload_at_next_frame_start() {
    let (_dir, path, mut host) = host_with("feedback = 0");
    let first = host.programs().active().unwrap().id;
    fs::write(&path, "feedback = 4").unwrap();

    let mut surface = ScriptedSurface { remaining: 3, reload_on: Some(1), clears: 0, presents: 0 };
    host.run(&mut surface).unwrap();

    let dispatched: Vec<u32> = host
        .backend()
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::Dispatch { program, .. } => Some(*program),
            _ => None,
        })
        .collect();
    assert_eq!(dispatched.len(), 3);
    assert_eq!(dispatched[0], first);
    assert_ne!(dispatched[1], first);
    assert_eq!(dispatched[1], dispatched[2]);
    assert!(!host.feedback().signal());
}

#[test]
fn run_stops_on_shutdown_event() {
    let (_dir, _path, mut host) = host_with("feedback = 0");
    host.events_mut().push(HostEvent::ShutdownRequested);
    let mut surface = ScriptedSurface { remaining: 10, reload_on: None, clears: 0, presents: 0 };
    assert_eq!(host.run(&mut surface).unwrap(), 0);
    assert_eq!(surface.presents, 0);
}
