//! The executable: call stack, run loop and the call/return protocol.

use std::rc::Rc;
use std::time::Instant;

use opo_common::{ObjectFile, Procedure, Value};
use opo_loader::LoadError;
use tracing::{debug, error, info};

use crate::activation::{Activation, Signal};
use crate::config::VmConfig;
use crate::error::RuntimeError;
use crate::execute::{step, Await, AwaitKind, Context, DialogState, Environment, Input};
use crate::heap::FrameHeap;
use crate::host::Host;
use crate::ops::coerce;
use crate::procedures::ProcedureTable;
use crate::rng::Rng;
use crate::stack::OperandStack;

/// How a call to [`Executable::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The entry procedure returned.
    Completed,
    /// STOP was executed.
    Stopped,
    /// An opcode with no handler was reached.
    Errored {
        procedure: String,
        pc: usize,
        opcode: u8,
    },
    /// Waiting for input; deliver it with [`Executable::resume`].
    AwaitingInput(AwaitKind),
    /// In a timed PAUSE until the deadline.
    Sleeping(Instant),
    /// The configured instruction budget ran out. Call `run` again to
    /// continue.
    StepLimit,
}

impl Outcome {
    /// Whether the program can make no further progress.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Outcome::Completed | Outcome::Stopped | Outcome::Errored { .. }
        )
    }
}

/// A loaded program and everything needed to run it.
pub struct Executable {
    config: VmConfig,
    call_stack: Vec<Activation>,
    heap: FrameHeap,
    stack: OperandStack,
    env: Environment,
    started: bool,
    finished: Option<Result<Outcome, RuntimeError>>,
    last_composite: Instant,
}

impl Executable {
    /// Prepares `object` to run. Its first procedure is the entry point.
    pub fn new(object: ObjectFile, host: Box<dyn Host>, config: VmConfig) -> Self {
        let heap = FrameHeap::new(config.effective_heap_size());
        Self {
            call_stack: Vec::new(),
            heap,
            stack: OperandStack::new(),
            env: Environment {
                procedures: ProcedureTable::new(object),
                host,
                awaiting: None,
                last_key: 0,
                last_error: 0,
                rng: Rng::default(),
                current_database: 0,
                dialog: DialogState::default(),
                menu_var: None,
                dir_entries: Vec::new(),
            },
            started: false,
            finished: None,
            last_composite: Instant::now(),
            config,
        }
    }

    /// Parses an object file image and prepares it to run.
    pub fn from_bytes(bytes: &[u8], host: Box<dyn Host>, config: VmConfig) -> Result<Self, LoadError> {
        let object = opo_loader::load(bytes)?;
        Ok(Self::new(object, host, config))
    }

    /// Makes the procedures of another object file callable, as `LOADM`
    /// does.
    pub fn load_module(&mut self, name: &str, module: ObjectFile) -> Result<(), RuntimeError> {
        self.env.procedures.add_module(name, module)
    }

    /// Runs until the program ends, waits, or uses up its step budget.
    ///
    /// Fatal errors are logged and returned; after one, and after any final
    /// outcome, further calls return the same result.
    pub fn run(&mut self) -> Result<Outcome, RuntimeError> {
        if let Some(done) = &self.finished {
            return done.clone();
        }
        if !self.started {
            self.started = true;
            if let Err(e) = self.enter_main() {
                return self.fail(e);
            }
        }

        let mut steps: u64 = 0;
        loop {
            match self.env.awaiting {
                Some(Await::Input(kind)) => {
                    self.env.host.composite();
                    return Ok(Outcome::AwaitingInput(kind));
                }
                Some(Await::Until(deadline)) if Instant::now() < deadline => {
                    self.env.host.composite();
                    return Ok(Outcome::Sleeping(deadline));
                }
                Some(Await::Until(_)) => self.env.awaiting = None,
                None => {}
            }

            if self.config.max_steps.is_some_and(|max| steps >= max) {
                return Ok(Outcome::StepLimit);
            }
            steps += 1;

            for done in self.env.host.poll_io() {
                let written = self
                    .heap
                    .write(&Value::Word(done.value), usize::from(done.status));
                if let Err(e) = written {
                    return self.fail(e);
                }
            }

            let Some((current, outer)) = self.call_stack.split_last_mut() else {
                return self.finish(Outcome::Completed);
            };
            let mut ctx = Context {
                activation: &mut *current,
                outer,
                heap: &mut self.heap,
                stack: &mut self.stack,
                env: &mut self.env,
            };
            if let Err(e) = step(&mut ctx) {
                return self.fail(e);
            }
            let signal = current.signal.take();

            if self.last_composite.elapsed() >= self.config.composite_interval {
                self.env.host.composite();
                self.last_composite = Instant::now();
            }

            match signal {
                None => {}
                Some(Signal::Stop) => {
                    info!("program stopped");
                    return self.finish(Outcome::Stopped);
                }
                Some(Signal::Return) => self.leave(),
                Some(Signal::Call(name)) => {
                    if let Err(e) = self.call(&name) {
                        return self.fail(e);
                    }
                }
                Some(Signal::Error) => {
                    let outcome = match self.call_stack.last() {
                        Some(a) => Outcome::Errored {
                            procedure: a.procedure.name.clone(),
                            pc: a.pc,
                            opcode: a.opcode,
                        },
                        None => Outcome::Errored {
                            procedure: String::new(),
                            pc: 0,
                            opcode: 0,
                        },
                    };
                    return self.finish(outcome);
                }
            }
        }
    }

    fn enter_main(&mut self) -> Result<(), RuntimeError> {
        let main = self
            .env
            .procedures
            .entry()
            .ok_or_else(|| RuntimeError::ProcedureNotFound {
                name: String::from("<entry>"),
            })?;
        info!(procedure = %main.name, "starting");
        self.enter(main)
    }

    /// Binds arguments from the operand stack and pushes an activation for
    /// `name`.
    fn call(&mut self, name: &str) -> Result<(), RuntimeError> {
        let procedure = self
            .env
            .procedures
            .lookup(name)
            .ok_or_else(|| RuntimeError::ProcedureNotFound {
                name: name.to_string(),
            })?;
        self.enter(procedure)
    }

    fn enter(&mut self, procedure: Rc<Procedure>) -> Result<(), RuntimeError> {
        if self.call_stack.len() >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }

        // Each argument is a value with its type code above it, last
        // parameter on top.
        let mut arguments = Vec::with_capacity(procedure.parameters.len());
        for (index, parameter) in procedure.parameters.iter().enumerate() {
            let tag = self.stack.pop()?;
            let found = tag.as_i32().unwrap_or(-1);
            if found != parameter.value_type as i32 {
                return Err(RuntimeError::ParameterTypeMismatch {
                    procedure: procedure.name.clone(),
                    index,
                    expected: parameter.value_type,
                    found,
                });
            }
            arguments.push(self.stack.pop()?);
        }

        let mut activation = Activation::new(Rc::clone(&procedure), &mut self.heap)?;
        activation.parameters = arguments;
        debug!(
            procedure = %procedure.name,
            frame = activation.frame,
            depth = self.call_stack.len() + 1,
            "call"
        );
        self.call_stack.push(activation);
        Ok(())
    }

    fn leave(&mut self) {
        if let Some(activation) = self.call_stack.pop() {
            debug!(procedure = %activation.procedure.name, "return");
            activation.release(&mut self.heap);
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Result<Outcome, RuntimeError> {
        self.env.host.composite();
        self.finished = Some(Ok(outcome.clone()));
        Ok(outcome)
    }

    fn fail(&mut self, e: RuntimeError) -> Result<Outcome, RuntimeError> {
        match self.call_stack.last() {
            Some(a) => error!(
                procedure = %a.procedure.name,
                pc = a.pc,
                opcode = a.opcode,
                error = %e,
                "run aborted"
            ),
            None => error!(error = %e, "run aborted"),
        }
        self.finished = Some(Err(e.clone()));
        Err(e)
    }

    /// Delivers input to a waiting executable and pushes the result the
    /// waiting opcode produces. Returns `false`, changing nothing, when the
    /// executable is not waiting for this kind of input.
    ///
    /// A confirmed dialog writes its editable lines back to their
    /// variables, and `MENU(var%)` writes back the highlighted item. A
    /// failed write ends the run with that error.
    pub fn resume(&mut self, input: Input) -> bool {
        let Some(Await::Input(kind)) = self.env.awaiting else {
            return false;
        };
        let result = match (kind, input) {
            (AwaitKind::Key, Input::Key(key)) => Some(Value::Word(key)),
            (AwaitKind::KeyString, Input::Key(key)) => {
                let c = char::from_u32(u32::from(key as u16));
                Some(Value::Str(c.map(String::from).unwrap_or_default()))
            }
            (AwaitKind::Pause, Input::Key(key)) => {
                self.env.last_key = key;
                None
            }
            (AwaitKind::Dialog, Input::Dialog(r)) | (AwaitKind::Menu, Input::Menu(r)) => {
                Some(Value::Word(r))
            }
            _ => return false,
        };
        self.env.awaiting = None;
        let written = match (kind, input) {
            (AwaitKind::Dialog, Input::Dialog(r)) => self.close_dialog(r != 0),
            (AwaitKind::Menu, _) => self.close_menu(),
            _ => Ok(()),
        };
        if let Err(e) = written {
            let _ = self.fail(e);
            return true;
        }
        if let Some(value) = result {
            self.stack.push(value);
        }
        true
    }

    fn close_dialog(&mut self, confirmed: bool) -> Result<(), RuntimeError> {
        let fields = std::mem::take(&mut self.env.dialog.fields);
        if confirmed {
            for (line, address, ty) in fields {
                if let Some(value) = self.env.host.dialog_field(line) {
                    self.heap.write(&coerce(value, ty)?, address)?;
                }
            }
        }
        self.env.host.dialog_hide();
        Ok(())
    }

    fn close_menu(&mut self) -> Result<(), RuntimeError> {
        if let Some(address) = self.env.menu_var.take() {
            if let Some(item) = self.env.host.menu_highlight() {
                self.heap.write(&Value::Word(item), address)?;
            }
        }
        self.env.host.menu_hide();
        Ok(())
    }

    /// Records a key press for `KEY`, `TESTEVENT` and `GETEVENT`.
    pub fn press_key(&mut self, key: i16) {
        self.env.last_key = key;
    }

    /// What the executable is waiting for, if anything.
    pub fn awaiting(&self) -> Option<AwaitKind> {
        match self.env.awaiting {
            Some(Await::Input(kind)) => Some(kind),
            _ => None,
        }
    }

    pub fn operand_stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn heap(&self) -> &FrameHeap {
        &self.heap
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Live activations, outermost first.
    pub fn activations(&self) -> &[Activation] {
        &self.call_stack
    }

    pub fn procedures(&self) -> &ProcedureTable {
        &self.env.procedures
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<Procedure>> {
        self.env.procedures.lookup(name)
    }

    /// Code of the last error swallowed by TRAP.
    pub fn last_error(&self) -> i16 {
        self.env.last_error
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }
}
