// program.rs — Program Manager: compile, link, activate, hot-swap.
//
// LIFECYCLE OF ONE ATTEMPT
// ─────────────────────────
//
//   Uninitialized ─► Compiling ─┬─► CompileFailed
//                               └─► Compiled ─► Linking ─┬─► LinkFailed
//                                                        └─► Active
//
// A failed attempt is terminal for that attempt only. Whatever program was
// active before it keeps serving frames; the user fixes the source and
// requests another reload.
//
// SWAP ORDER
// ───────────
// 1. compile + link the new program (failures drop the partial objects);
// 2. apply the Binding Table to the new program;
// 3. move it into `active`;
// 4. drop the previous program.
//
// Step 4 after step 3 is the "release only once the replacement is in
// force" rule. Ownership does the releasing: nothing outside this module can
// reach the active program mutably.

use crate::backend::{CompileError, KernelBackend, LinkError};
use crate::binding::{BindingError, BindingTable};

/// State of the most recent compile/link attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Uninitialized,
    Compiling,
    CompileFailed,
    Compiled,
    Linking,
    LinkFailed,
    Active,
}

/// Why a reload attempt was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReloadError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("binding failed: {0}")]
    Binding(#[from] BindingError),
}

/// Owner of the single active kernel program.
pub struct ProgramManager<B: KernelBackend> {
    active: Option<B::Program>,
    state: ProgramState,
    generation: u64,
}

impl<B: KernelBackend> Default for ProgramManager<B> {
    fn default() -> Self {
        ProgramManager::new()
    }
}

impl<B: KernelBackend> ProgramManager<B> {
    pub fn new() -> Self {
        ProgramManager {
            active: None,
            state: ProgramState::Uninitialized,
            generation: 0,
        }
    }

    /// State reached by the most recent attempt (or `Uninitialized`).
    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// The program used by dispatches, if one has ever been activated.
    pub fn active(&self) -> Option<&B::Program> {
        self.active.as_ref()
    }

    /// True when a dispatch may proceed.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Number of successful activations so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn compile(&mut self, backend: &mut B, source: &str) -> Result<B::Unit, CompileError> {
        self.state = ProgramState::Compiling;
        match backend.compile(source) {
            Ok(unit) => {
                self.state = ProgramState::Compiled;
                Ok(unit)
            }
            Err(e) => {
                self.state = ProgramState::CompileFailed;
                Err(e)
            }
        }
    }

    pub fn link(&mut self, backend: &mut B, unit: B::Unit) -> Result<B::Program, LinkError> {
        self.state = ProgramState::Linking;
        match backend.link(unit) {
            Ok(program) => Ok(program),
            Err(e) => {
                self.state = ProgramState::LinkFailed;
                Err(e)
            }
        }
    }

    /// Bind `program` through `table` and make it the active program.
    ///
    /// On a binding failure `program` is dropped and the previous active
    /// program is left in place.
    pub fn activate(
        &mut self,
        backend: &mut B,
        mut program: B::Program,
        table: &BindingTable,
    ) -> Result<(), BindingError> {
        if let Err(e) = table.apply(backend, &mut program) {
            self.state = ProgramState::LinkFailed;
            return Err(e);
        }
        let previous = self.active.replace(program);
        self.state = ProgramState::Active;
        self.generation += 1;
        drop(previous);
        Ok(())
    }

    /// compile → link → activate. Any failure leaves the active program
    /// untouched.
    pub fn reload(
        &mut self,
        backend: &mut B,
        source: &str,
        table: &BindingTable,
    ) -> Result<(), ReloadError> {
        let unit = self.compile(backend, source)?;
        let program = self.link(backend, unit)?;
        self.activate(backend, program, table)?;
        log::info!("kernel generation {} active", self.generation);
        Ok(())
    }
}
