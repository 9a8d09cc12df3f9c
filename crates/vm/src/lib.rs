//! Interpreter for OPL object files.
//!
//! An [`Executable`] owns the program's procedures, a frame heap holding
//! every live procedure's variables, one operand stack and a call stack of
//! [`Activation`]s. [`Executable::run`] executes bytecode until the program
//! ends, stops, waits for input or exhausts its step budget. Everything
//! outside the interpreter (screen, dialogs, databases, files, devices, the
//! clock, module files) is reached through the [`Host`] traits.
//!
//! # Usage
//!
//! ```
//! use opo_common::ProcedureSections;
//! use opo_loader::ObjectFileWriter;
//! use opo_vm::{Executable, NullHost, Outcome, VmConfig};
//!
//! let main = ProcedureSections {
//!     name: "MAIN".into(),
//!     // push 7, return
//!     bytecode: vec![0x28, 0x07, 0x00, 0xC0],
//!     ..ProcedureSections::default()
//! };
//! let image = ObjectFileWriter::new("MAIN.OPL").procedure(main).finish().unwrap();
//!
//! let mut exe = Executable::from_bytes(&image, Box::new(NullHost), VmConfig::default()).unwrap();
//! assert_eq!(exe.run().unwrap(), Outcome::Completed);
//! assert_eq!(exe.operand_stack().peek(), Some(&opo_common::Value::Word(7)));
//! ```

pub mod activation;
pub mod config;
mod dispatch;
pub mod error;
pub mod execute;
pub mod heap;
pub mod host;
pub mod machine;
mod ops;
pub mod procedures;
mod resolve;
mod rng;
pub mod stack;

pub use activation::{Activation, Signal};
pub use config::{VmConfig, MAX_HEAP_SIZE};
pub use error::{describe, io_code, RuntimeError};
pub use execute::{AwaitKind, Input};
pub use heap::FrameHeap;
pub use host::{
    Clock, Database, DialogItem, Dialogs, FieldSpec, FileSystem, Host, IoCompletion, IoHandles,
    ModuleSource, NullHost, Screen,
};
pub use machine::{Executable, Outcome};
pub use procedures::ProcedureTable;
pub use stack::OperandStack;
