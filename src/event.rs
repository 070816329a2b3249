// event.rs — inbound host events.
//
// Input handling does not call into the Program Manager. The presentation
// surface pushes events while it polls the window, and the host drains the
// queue once per frame, before any GPU work for that frame is issued.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Re-read the kernel source and hot-swap it.
    ReloadRequested,
    /// Leave the frame loop.
    ShutdownRequested,
}

/// What the host should do after draining the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingActions {
    pub reload: bool,
    pub shutdown: bool,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<HostEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue::default()
    }

    pub fn push(&mut self, event: HostEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Empty the queue, folding its events into one set of actions.
    /// Several reload requests in one frame collapse into a single reload.
    pub fn drain(&mut self) -> PendingActions {
        let mut actions = PendingActions::default();
        for event in self.events.drain(..) {
            match event {
                HostEvent::ReloadRequested => actions.reload = true,
                HostEvent::ShutdownRequested => actions.shutdown = true,
            }
        }
        actions
    }
}
