// tests/common/mod.rs — in-memory `KernelBackend` for integration tests.
//
// "Kernels" are plain text. The recording backend understands three
// directives, one per line:
//
//   error: <msg>      compile fails with <msg> as the log
//   unlinkable        compile succeeds, link fails
//   feedback = <n>    on dispatch, write <n> into the feedback buffer
//
// Anything else is ignored, so a kernel without a `feedback` line leaves the
// host's sentinel untouched (LOS).
//
// Every compiled unit and program carries a `Live` token; counting the live
// tokens is how the tests check that failed attempts release what they made.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use kernel_host::backend::{CompileError, KernelBackend, LinkError, ReadbackError};
use kernel_host::binding::{
    AccessMode, BindingError, HostResources, ResourceBinding, ResourceId,
};
use kernel_host::dispatch::ExecutionGrid;
use kernel_host::frame::FrameState;

pub const RESOURCES: HostResources = HostResources {
    output_image: ResourceId(100),
    input_image: ResourceId(101),
    feedback: ResourceId(102),
    input_sampler: ResourceId(103),
};

/// Tracks how many objects of one kind are alive.
#[derive(Debug, Clone, Default)]
pub struct LiveCounter(Rc<Cell<usize>>);

impl LiveCounter {
    pub fn get(&self) -> usize {
        self.0.get()
    }

    fn token(&self) -> Live {
        self.0.set(self.0.get() + 1);
        Live(self.0.clone())
    }
}

#[derive(Debug)]
pub struct Live(Rc<Cell<usize>>);

impl Drop for Live {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

#[derive(Debug)]
pub struct MockUnit {
    pub source: String,
    _live: Live,
}

#[derive(Debug)]
pub struct MockProgram {
    pub id: u32,
    pub feedback: Option<i32>,
    pub bindings: BTreeMap<u32, (ResourceId, AccessMode)>,
    pub bind_calls: usize,
    _live: Live,
}

/// One recorded backend call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call {
    PushFrame(f32),
    WriteFeedback(i32),
    Dispatch { program: u32, grid: ExecutionGrid },
    Barrier,
    ReadFeedback,
    ReadOutput,
}

#[derive(Debug, Default)]
pub struct MockBackend {
    pub calls: Vec<Call>,
    pub units: LiveCounter,
    pub programs: LiveCounter,
    pub feedback_buffer: i32,
    pub compiles: usize,
    next_program: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend::default()
    }

    /// Forget recorded calls (keeps resource state).
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

fn directive<'a>(source: &'a str, key: &str) -> Option<&'a str> {
    source
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix(key))
        .map(str::trim)
}

impl KernelBackend for MockBackend {
    type Unit = MockUnit;
    type Program = MockProgram;

    fn resources(&self) -> HostResources {
        RESOURCES
    }

    fn compile(&mut self, source: &str) -> Result<MockUnit, CompileError> {
        self.compiles += 1;
        // The unit exists while the compiler runs, even if it is rejected.
        let unit = MockUnit {
            source: source.to_string(),
            _live: self.units.token(),
        };
        if let Some(msg) = directive(source, "error:") {
            return Err(CompileError { log: msg.to_string() });
        }
        Ok(unit)
    }

    fn link(&mut self, unit: MockUnit) -> Result<MockProgram, LinkError> {
        self.next_program += 1;
        let program = MockProgram {
            id: self.next_program,
            feedback: directive(&unit.source, "feedback =").and_then(|v| v.parse().ok()),
            bindings: BTreeMap::new(),
            bind_calls: 0,
            _live: self.programs.token(),
        };
        if directive(&unit.source, "unlinkable").is_some() {
            return Err(LinkError {
                log: format!("program {} has no entry point", program.id),
            });
        }
        Ok(program)
    }

    fn bind(
        &mut self,
        program: &mut MockProgram,
        bindings: &[ResourceBinding],
    ) -> Result<(), BindingError> {
        let mut table = BTreeMap::new();
        for b in bindings {
            let known = [
                (RESOURCES.output_image, AccessMode::Write),
                (RESOURCES.input_image, AccessMode::Sample),
                (RESOURCES.feedback, AccessMode::Storage),
                (RESOURCES.input_sampler, AccessMode::Sampler),
            ];
            match known.iter().find(|(id, _)| *id == b.resource) {
                None => {
                    return Err(BindingError::UnknownResource {
                        slot: b.slot,
                        resource: b.resource,
                    })
                }
                Some((_, access)) if *access != b.access => {
                    return Err(BindingError::AccessMismatch {
                        slot: b.slot,
                        resource: b.resource,
                        access: b.access,
                    })
                }
                Some(_) => {}
            }
            table.insert(b.slot.index(), (b.resource, b.access));
        }
        program.bindings = table;
        program.bind_calls += 1;
        Ok(())
    }

    fn push_frame_state(&mut self, state: &FrameState) {
        self.calls.push(Call::PushFrame(state.time));
    }

    fn write_feedback(&mut self, value: i32) {
        self.calls.push(Call::WriteFeedback(value));
        self.feedback_buffer = value;
    }

    fn dispatch(&mut self, program: &MockProgram, grid: ExecutionGrid) {
        self.calls.push(Call::Dispatch { program: program.id, grid });
        if let Some(v) = program.feedback {
            self.feedback_buffer = v;
        }
    }

    fn barrier(&mut self) {
        self.calls.push(Call::Barrier);
    }

    fn read_feedback(&mut self) -> Result<i32, ReadbackError> {
        self.calls.push(Call::ReadFeedback);
        Ok(self.feedback_buffer)
    }

    fn read_output(&mut self) -> Result<Vec<[f32; 4]>, ReadbackError> {
        self.calls.push(Call::ReadOutput);
        Ok(vec![[0.0, 0.0, 0.0, 1.0]; 4])
    }
}
