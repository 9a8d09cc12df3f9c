//! Integration tests for the interpreter, running small object files built
//! with the loader's writer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use opo_common::{ArrayDeclaration, ProcedureSections, StringDeclaration, Value, ValueType};
use opo_loader::ObjectFileWriter;
use opo_vm::{
    AwaitKind, Clock, Database, DialogItem, Dialogs, Executable, FieldSpec, FileSystem, Input,
    IoCompletion, IoHandles, ModuleSource, NullHost, Outcome, RuntimeError, Screen, VmConfig,
};

// ============================================================
// Helpers
// ============================================================

fn procedure(name: &str, bytecode: Vec<u8>) -> ProcedureSections {
    ProcedureSections {
        name: name.into(),
        bytecode,
        ..ProcedureSections::default()
    }
}

fn image(procedures: Vec<ProcedureSections>) -> Vec<u8> {
    procedures
        .into_iter()
        .fold(ObjectFileWriter::new("TEST.OPL"), |w, p| w.procedure(p))
        .finish()
        .unwrap()
}

fn executable(procedures: Vec<ProcedureSections>) -> Executable {
    executable_with(procedures, Box::new(NullHost), VmConfig::default())
}

fn executable_with(
    procedures: Vec<ProcedureSections>,
    host: Box<dyn opo_vm::Host>,
    config: VmConfig,
) -> Executable {
    Executable::from_bytes(&image(procedures), host, config).unwrap()
}

fn top(exe: &Executable) -> Option<Value> {
    exe.operand_stack().peek().cloned()
}

/// Bytecode pushing a string literal.
fn text(s: &str) -> Vec<u8> {
    let mut code = vec![0x2B, s.len() as u8];
    code.extend_from_slice(s.as_bytes());
    code
}

/// Bytecode pushing a Word literal.
fn word(w: i16) -> Vec<u8> {
    let [lo, hi] = w.to_le_bytes();
    vec![0x28, lo, hi]
}

/// Bytecode pushing a Long literal.
fn long(l: i32) -> Vec<u8> {
    let mut code = vec![0x29];
    code.extend_from_slice(&l.to_le_bytes());
    code
}

/// Bytecode pushing the address of the local at `offset`.
fn local_address(offset: u8) -> Vec<u8> {
    vec![0x04, offset, 0x00]
}

/// `ADD%:(a%, b%)` returning `a% + b%`.
fn add_procedure() -> ProcedureSections {
    ProcedureSections {
        parameter_types: vec![ValueType::Word, ValueType::Word],
        ..procedure("ADD%", vec![0x08, 0x12, 0x00, 0x08, 0x14, 0x00, 0x48, 0xC0])
    }
}

/// A host that records what the program asks of it, serves module
/// images and answers dialogs, menus, files and the clock from fixed
/// data.
#[derive(Default, Clone)]
struct RecordingHost {
    output: Rc<RefCell<String>>,
    modules: HashMap<String, Vec<u8>>,
    dialogs: Rc<RefCell<Vec<String>>>,
    /// Every other call, one line each.
    log: Rc<RefCell<Vec<String>>>,
    items: Rc<RefCell<Vec<(usize, DialogItem)>>>,
    buttons: Rc<RefCell<Vec<(String, i16)>>>,
    /// Dialog lines the user edited, by line number.
    answers: HashMap<usize, Value>,
    highlight: Option<i16>,
    files: Rc<RefCell<Vec<String>>>,
    timers: Rc<RefCell<Vec<IoCompletion>>>,
    expired: Rc<RefCell<Vec<IoCompletion>>>,
}

impl RecordingHost {
    fn record(&self, line: String) {
        self.log.borrow_mut().push(line);
    }
}

impl Screen for RecordingHost {
    fn print(&mut self, text: &str) {
        self.output.borrow_mut().push_str(text);
    }

    fn print_newline(&mut self) {
        self.output.borrow_mut().push('\n');
    }
}

impl Dialogs for RecordingHost {
    fn dialog_init(&mut self, title: &str, _flags: i16) {
        self.dialogs.borrow_mut().push(title.to_string());
    }

    fn dialog_text(&mut self, prompt: &str, body: &str, _align: i16) {
        self.record(format!("text {prompt:?} {body:?}"));
    }

    fn dialog_item(&mut self, line: usize, item: &DialogItem) {
        self.items.borrow_mut().push((line, item.clone()));
    }

    fn dialog_buttons(&mut self, buttons: &[(String, i16)]) {
        self.buttons.borrow_mut().extend_from_slice(buttons);
    }

    fn dialog_position(&mut self, x: i16, y: i16) {
        self.record(format!("position {x} {y}"));
    }

    fn dialog_field(&mut self, line: usize) -> Option<Value> {
        self.answers.get(&line).cloned()
    }

    fn dialog_hide(&mut self) {
        self.record("hide dialog".into());
    }

    fn menu_card(&mut self, title: &str, items: &[(String, i16)]) {
        self.record(format!("card {title} {items:?}"));
    }

    fn menu_show(&mut self, initial: i16) {
        self.record(format!("menu {initial}"));
    }

    fn menu_highlight(&mut self) -> Option<i16> {
        self.highlight
    }

    fn menu_hide(&mut self) {
        self.record("hide menu".into());
    }
}

impl Database for RecordingHost {
    fn open(&mut self, handle: u8, path: &str, fields: &[FieldSpec]) -> io::Result<()> {
        let names: Vec<String> = fields
            .iter()
            .map(|f| format!("{}:{:?}", f.name, f.value_type))
            .collect();
        self.record(format!("open {handle} {path} {}", names.join(" ")));
        Ok(())
    }

    fn create(&mut self, handle: u8, path: &str, _fields: &[FieldSpec]) -> io::Result<()> {
        self.record(format!("create {handle} {path}"));
        Ok(())
    }

    fn close(&mut self, handle: u8) -> io::Result<()> {
        self.record(format!("close {handle}"));
        Ok(())
    }

    fn append(&mut self, handle: u8) -> io::Result<()> {
        self.record(format!("append {handle}"));
        Ok(())
    }

    fn update(&mut self, handle: u8) -> io::Result<()> {
        self.record(format!("update {handle}"));
        Ok(())
    }

    fn field_value(&mut self, handle: u8, field: &str) -> Option<Value> {
        (handle == 1 && field == "NAME$").then(|| Value::Str("PSION".into()))
    }
}

impl IoHandles for RecordingHost {
    fn poll_io(&mut self) -> Vec<IoCompletion> {
        std::mem::take(&mut *self.expired.borrow_mut())
    }

    fn io_open(&mut self, name: &str, _mode: i16) -> io::Result<i16> {
        if name == "TIM:" {
            Ok(7)
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, name.to_string()))
        }
    }

    fn add_timer(&mut self, handle: i16, status: u16, interval: i32) -> io::Result<()> {
        self.record(format!("timer {handle} {status} {interval}"));
        self.timers
            .borrow_mut()
            .push(IoCompletion { status, value: 0 });
        Ok(())
    }
}

impl FileSystem for RecordingHost {
    fn exists(&mut self, path: &str) -> bool {
        self.files.borrow().iter().any(|f| f == path)
    }

    fn delete(&mut self, path: &str) -> io::Result<()> {
        let mut files = self.files.borrow_mut();
        let before = files.len();
        files.retain(|f| f != path);
        if files.len() == before {
            return Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()));
        }
        Ok(())
    }

    fn make_dir(&mut self, path: &str) -> io::Result<()> {
        self.record(format!("mkdir {path}"));
        Ok(())
    }

    fn set_path(&mut self, path: &str) -> io::Result<()> {
        self.record(format!("setpath {path}"));
        Ok(())
    }

    fn list_dir(&mut self, _pattern: &str) -> io::Result<Vec<String>> {
        Ok(self.files.borrow().clone())
    }
}

/// Always Friday 16 October 2026, 09:05:07, in UTC.
impl Clock for RecordingHost {
    fn now(&self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .and_then(|d| d.and_hms_opt(9, 5, 7))
            .unwrap()
    }

    fn local_time(&self, secs: i64) -> Option<NaiveDateTime> {
        DateTime::from_timestamp(secs, 0).map(|t| t.naive_utc())
    }

    fn timestamp(&self, local: NaiveDateTime) -> Option<i64> {
        Some(local.and_utc().timestamp())
    }
}

impl ModuleSource for RecordingHost {
    fn read_module(&mut self, name: &str) -> io::Result<Vec<u8>> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}

fn recording(procedures: Vec<ProcedureSections>, host: &RecordingHost) -> Executable {
    executable_with(procedures, Box::new(host.clone()), VmConfig::default())
}

// ============================================================
// Calls and returns
// ============================================================

#[test]
fn main_calls_add_and_leaves_seven() {
    let main = ProcedureSections {
        called: vec![("ADD%".into(), 2)],
        ..procedure(
            "MAIN",
            vec![
                0x28, 0x03, 0x00, // a% = 3
                0x28, 0x00, 0x00, // type Word
                0x28, 0x04, 0x00, // b% = 4
                0x28, 0x00, 0x00, // type Word
                0x53, 0x12, 0x00, // ADD%:
                0xC0,
            ],
        )
    };
    let mut exe = executable(vec![main, add_procedure()]);

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(7)));
    assert_eq!(exe.call_depth(), 0);
    assert!(exe.heap().allocations().is_empty());
}

#[test]
fn argument_type_mismatch_is_fatal() {
    let main = ProcedureSections {
        called: vec![("ADD%".into(), 2)],
        ..procedure(
            "MAIN",
            vec![
                0x28, 0x03, 0x00, 0x28, 0x00, 0x00, // a%
                0x28, 0x04, 0x00, 0x28, 0x01, 0x00, // b% tagged as Long
                0x53, 0x12, 0x00, 0xC0,
            ],
        )
    };
    let mut exe = executable(vec![main, add_procedure()]);

    assert_eq!(
        exe.run(),
        Err(RuntimeError::ParameterTypeMismatch {
            procedure: "ADD%".into(),
            index: 0,
            expected: ValueType::Word,
            found: 1,
        })
    );
}

#[test]
fn missing_procedure_is_fatal_and_sticky() {
    let main = ProcedureSections {
        called: vec![("NOPE".into(), 0)],
        ..procedure("MAIN", vec![0x53, 0x12, 0x00, 0xC0])
    };
    let mut exe = executable(vec![main]);

    let expected = Err(RuntimeError::ProcedureNotFound {
        name: "NOPE".into(),
    });
    assert_eq!(exe.run(), expected);
    assert_eq!(exe.run(), expected);
}

#[test]
fn unmatched_call_reference_is_unresolved() {
    let mut exe = executable(vec![procedure("MAIN", vec![0x53, 0x40, 0x00])]);
    assert_eq!(
        exe.run(),
        Err(RuntimeError::UnresolvedReference {
            procedure: "MAIN".into(),
            ee: 0x40,
        })
    );
}

#[test]
fn recursion_hits_depth_limit() {
    let main = ProcedureSections {
        called: vec![("MAIN".into(), 0)],
        ..procedure("MAIN", vec![0x53, 0x12, 0x00, 0xC0])
    };
    let config = VmConfig {
        max_call_depth: 8,
        ..VmConfig::default()
    };
    let mut exe = executable_with(vec![main], Box::new(NullHost), config);

    assert_eq!(exe.run(), Err(RuntimeError::CallDepthExceeded { limit: 8 }));
    assert_eq!(exe.call_depth(), 8);
}

#[test]
fn typed_zero_returns() {
    let main = ProcedureSections {
        called: vec![("F$".into(), 0)],
        ..procedure("MAIN", vec![0x53, 0x12, 0x00, 0xC0])
    };
    let mut exe = executable(vec![main, procedure("F$", vec![0x77])]);

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Str(String::new())));
}

#[test]
fn falling_off_the_end_returns() {
    let mut exe = executable(vec![procedure("MAIN", vec![0x28, 0x01, 0x00])]);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(1)));
}

// ============================================================
// Unknown opcodes, STOP, TRAP and ONERR
// ============================================================

#[test]
fn unknown_opcode_is_errored() {
    let mut exe = executable(vec![procedure("MAIN", vec![0x28, 0x01, 0x00, 0x2C])]);
    assert_eq!(
        exe.run(),
        Ok(Outcome::Errored {
            procedure: "MAIN".into(),
            pc: 4,
            opcode: 0x2C,
        })
    );
    // Final outcomes repeat.
    assert!(exe.run().unwrap().is_final());
}

#[test]
fn unknown_prefixed_opcode_is_errored() {
    let mut exe = executable(vec![procedure("MAIN", vec![0x57, 0x02])]);
    assert!(matches!(
        exe.run(),
        Ok(Outcome::Errored { opcode: 0x02, .. })
    ));
}

#[test]
fn stop_leaves_activations_in_place() {
    let mut exe = executable(vec![procedure("MAIN", vec![0xBB, 0x2C])]);
    assert_eq!(exe.run(), Ok(Outcome::Stopped));
    assert_eq!(exe.call_depth(), 1);
}

#[test]
fn trap_swallows_divide_by_zero() {
    let main = procedure(
        "MAIN",
        vec![
            0x28, 0x01, 0x00, // 1
            0x28, 0x00, 0x00, // 0
            0xBC, // TRAP
            0x54, // 1 / 0
            0x57, 0x07, // ERR
            0xC0,
        ],
    );
    let mut exe = executable(vec![main]);

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(-8)));
    assert_eq!(exe.last_error(), -8);
}

#[test]
fn trap_covers_only_the_next_instruction() {
    let main = procedure(
        "MAIN",
        vec![0xBC, 0x28, 0x01, 0x00, 0x28, 0x00, 0x00, 0x54, 0xC0],
    );
    let mut exe = executable(vec![main]);
    assert_eq!(exe.run(), Err(RuntimeError::DivideByZero));
}

#[test]
fn trap_never_swallows_stack_underflow() {
    let mut exe = executable(vec![procedure("MAIN", vec![0xBC, 0x80, 0xC0])]);
    assert_eq!(exe.run(), Err(RuntimeError::StackUnderflow));
}

#[test]
fn err_string_describes_codes() {
    let main = procedure("MAIN", vec![0x28, 0xF8, 0xFF, 0x57, 0xC4, 0xC0]);
    let mut exe = executable(vec![main]);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Str("Divide by zero".into())));
}

#[test]
fn onerr_records_handler_only() {
    let main = procedure("MAIN", vec![0xB1, 0x05, 0x00, 0xBB]);
    let mut exe = executable(vec![main]);
    assert_eq!(exe.run(), Ok(Outcome::Stopped));
    assert_eq!(exe.activations()[0].error_handler(), Some(5));
}

// ============================================================
// Branches
// ============================================================

#[test]
fn branch_if_false_is_relative_to_the_opcode() {
    let main = procedure(
        "MAIN",
        vec![
            0x28, 0x00, 0x00, // 0: false
            0x5B, 0x07, 0x00, // 3: branch to 10
            0x28, 0x01, 0x00, // 6
            0xC0, // 9
            0x28, 0x02, 0x00, // 10
            0xC0,
        ],
    );
    let mut exe = executable(vec![main]);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(2)));
}

#[test]
fn vector_selects_label() {
    let main = procedure(
        "MAIN",
        vec![
            0x28, 0x02, 0x00, // 0: index 2
            0xAB, 0x02, 0x00, 0x0A, 0x00, 0x0E, 0x00, // 3: VECTOR -> 13 or 17
            0xC0, // 10
            0x28, 0x01, 0x00, // 11 (unused)
            0xC0, // 14
            0xC0, // 15
            0xC0, // 16
            0x28, 0x09, 0x00, // 17
            0xC0,
        ],
    );
    let mut exe = executable(vec![main]);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(9)));
}

#[test]
fn jump_outside_bytecode_is_bad_jump() {
    let mut exe = executable(vec![procedure("MAIN", vec![0xBF, 0x40, 0x00])]);
    assert!(matches!(exe.run(), Err(RuntimeError::BadJump { .. })));
}

#[test]
fn step_limit_yields_and_resumes() {
    let config = VmConfig {
        max_steps: Some(10),
        ..VmConfig::default()
    };
    // GOTO itself.
    let mut exe = executable_with(
        vec![procedure("MAIN", vec![0xBF, 0x00, 0x00])],
        Box::new(NullHost),
        config,
    );
    assert_eq!(exe.run(), Ok(Outcome::StepLimit));
    assert_eq!(exe.run(), Ok(Outcome::StepLimit));
    assert_eq!(exe.call_depth(), 1);
}

// ============================================================
// Variables and EE resolution
// ============================================================

#[test]
fn outer_declaration_shadows_inner() {
    // MAIN and P2 both declare X%; P3 imports it.
    let main = ProcedureSections {
        frame_size: 2,
        globals: vec![("X%".into(), ValueType::Word, 0)],
        called: vec![("P2".into(), 0)],
        ..procedure(
            "MAIN",
            vec![0x04, 0x00, 0x00, 0x28, 0x0B, 0x00, 0x84, 0x53, 0x18, 0x00, 0xC0],
        )
    };
    let p2 = ProcedureSections {
        frame_size: 2,
        globals: vec![("X%".into(), ValueType::Word, 0)],
        called: vec![("P3%".into(), 0)],
        ..procedure(
            "P2",
            vec![0x04, 0x00, 0x00, 0x28, 0x05, 0x00, 0x84, 0x53, 0x18, 0x00, 0xC0],
        )
    };
    let p3 = ProcedureSections {
        global_references: vec![("X%".into(), ValueType::Word)],
        ..procedure("P3%", vec![0x08, 0x12, 0x00, 0x08, 0x12, 0x00, 0x48, 0xBB])
    };
    let mut exe = executable(vec![main, p2, p3]);

    assert_eq!(exe.run(), Ok(Outcome::Stopped));
    assert_eq!(top(&exe), Some(Value::Word(22)));
    let activations = exe.activations();
    assert_eq!(activations.len(), 3);
    // The second read hit the cache.
    assert_eq!(activations[2].resolution_scans(), 1);
}

#[test]
fn unresolved_import_is_fatal() {
    let p = ProcedureSections {
        global_references: vec![("MISSING%".into(), ValueType::Word)],
        ..procedure("MAIN", vec![0x08, 0x12, 0x00])
    };
    let mut exe = executable(vec![p]);
    assert_eq!(
        exe.run(),
        Err(RuntimeError::UnresolvedReference {
            procedure: "MAIN".into(),
            ee: 0x12,
        })
    );
}

#[test]
fn string_variable_roundtrip() {
    // s$ at 3 with its capacity byte at 2.
    let main = ProcedureSections {
        frame_size: 16,
        strings: vec![StringDeclaration {
            offset: 2,
            max_length: 10,
        }],
        ..procedure(
            "MAIN",
            vec![
                0x07, 0x03, 0x00, // address of s$
                0x2B, 0x05, b'H', b'E', b'L', b'L', b'O', // "HELLO"
                0x87, // store
                0x03, 0x03, 0x00, // s$
                0x03, 0x03, 0x00, // s$
                0x57, 0x14, // LEN
                0xC0,
            ],
        )
    };
    let mut exe = executable(vec![main]);

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    let stack = exe.operand_stack();
    assert_eq!(stack.len(), 2);
    assert_eq!(top(&exe), Some(Value::Word(5)));
    assert_eq!(stack.peek_at(1), Some(&Value::Str("HELLO".into())));
}

#[test]
fn array_index_is_checked_against_declaration() {
    // Count word at 2, elements from 4.
    let frame = |index: u8| ProcedureSections {
        frame_size: 12,
        arrays: vec![ArrayDeclaration {
            offset: 2,
            length: 3,
        }],
        ..procedure("MAIN", vec![0x28, index, 0x00, 0x10, 0x04, 0x00, 0xC0])
    };

    let mut ok = executable(vec![frame(3)]);
    assert_eq!(ok.run(), Ok(Outcome::Completed));
    assert_eq!(top(&ok), Some(Value::Word(0)));

    let mut high = executable(vec![frame(4)]);
    assert_eq!(
        high.run(),
        Err(RuntimeError::ArrayIndexOutOfBounds { index: 4 })
    );

    let mut low = executable(vec![frame(0)]);
    assert_eq!(
        low.run(),
        Err(RuntimeError::ArrayIndexOutOfBounds { index: 0 })
    );
}

/// MAIN declares `A$(3)` of capacity 5 and stores into `A$(2)`; `SUB$`
/// imports the array and reads element `index`.
fn outer_string_array(index: u8) -> Vec<ProcedureSections> {
    let main = ProcedureSections {
        frame_size: 24,
        // Count word at 2, capacity byte at 4, elements from 5.
        arrays: vec![ArrayDeclaration {
            offset: 2,
            length: 3,
        }],
        strings: vec![StringDeclaration {
            offset: 4,
            max_length: 5,
        }],
        globals: vec![("A$".into(), ValueType::Str, 5)],
        called: vec![("SUB$".into(), 0)],
        ..procedure(
            "MAIN",
            vec![
                0x28, 0x02, 0x00, // 2
                0x17, 0x05, 0x00, // address of A$(2)
                0x2B, 0x02, b'H', b'I', // "HI"
                0x87, // store
                0x53, 0x18, 0x00, // SUB$:
                0xC0,
            ],
        )
    };
    let sub = ProcedureSections {
        global_references: vec![("A$".into(), ValueType::Str)],
        ..procedure(
            "SUB$",
            vec![
                0x28, index, 0x00, // index
                0x1B, 0x12, 0x00, // A$(index)
                0xC0,
            ],
        )
    };
    vec![main, sub]
}

#[test]
fn imported_string_array_uses_owner_declarations() {
    let mut exe = executable(outer_string_array(2));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Str("HI".into())));

    let mut empty = executable(outer_string_array(3));
    assert_eq!(empty.run(), Ok(Outcome::Completed));
    assert_eq!(top(&empty), Some(Value::Str(String::new())));

    let mut high = executable(outer_string_array(4));
    assert_eq!(
        high.run(),
        Err(RuntimeError::ArrayIndexOutOfBounds { index: 4 })
    );
}

#[test]
fn database_field_through_host() {
    let main = procedure(
        "MAIN",
        vec![0x2B, 0x05, b'N', b'A', b'M', b'E', b'$', 0x23, 0x01, 0xC0],
    );
    let mut exe = executable_with(
        vec![main],
        Box::new(RecordingHost::default()),
        VmConfig::default(),
    );
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Str("PSION".into())));
}

// ============================================================
// Heap
// ============================================================

#[test]
fn alloc_returns_disjoint_blocks() {
    let main = ProcedureSections {
        frame_size: 4,
        ..procedure(
            "MAIN",
            vec![0x28, 0x64, 0x00, 0x57, 0x4B, 0x28, 0x32, 0x00, 0x57, 0x4B, 0xBB],
        )
    };
    let mut exe = executable(vec![main]);

    assert_eq!(exe.run(), Ok(Outcome::Stopped));
    let blocks: Vec<_> = exe.heap().allocations().to_vec();
    assert_eq!(blocks, vec![0..4, 4..104, 104..154]);
    assert_eq!(top(&exe), Some(Value::Word(104)));
}

#[test]
fn poke_and_peek() {
    let main = ProcedureSections {
        frame_size: 4,
        ..procedure(
            "MAIN",
            vec![
                0x28, 0x00, 0x00, 0x28, 0x34, 0x12, 0x98, // POKEW 0, $1234
                0x28, 0x00, 0x00, 0x57, 0x18, // PEEKB(0)
                0xC0,
            ],
        )
    };
    let mut exe = executable(vec![main]);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(0x34)));
}

// ============================================================
// Host interaction
// ============================================================

#[test]
fn print_goes_to_the_host() {
    let host = RecordingHost::default();
    let output = Rc::clone(&host.output);
    let main = procedure(
        "MAIN",
        vec![
            0x2B, 0x02, b'H', b'I', 0x8B, // PRINT "HI";
            0x28, 0x2A, 0x00, 0x88, // PRINT 42;
            0x92, // newline
            0xC0,
        ],
    );
    let mut exe = executable_with(vec![main], Box::new(host), VmConfig::default());

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(output.borrow().as_str(), "HI42\n");
}

#[test]
fn dialog_waits_for_result() {
    let host = RecordingHost::default();
    let titles = Rc::clone(&host.dialogs);
    let main = procedure(
        "MAIN",
        vec![
            0x2B, 0x04, b'T', b'I', b'T', b'L', 0xEC, 0x01, // dINIT "TITL"
            0x57, 0x37, // DIALOG
            0xC0,
        ],
    );
    let mut exe = executable_with(vec![main], Box::new(host), VmConfig::default());

    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::Dialog)));
    assert!(!exe.resume(Input::Key(13)));
    assert!(exe.resume(Input::Dialog(2)));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(2)));
    assert_eq!(titles.borrow().as_slice(), ["TITL".to_string()]);
}

#[test]
fn get_waits_for_a_key() {
    let mut exe = executable(vec![procedure("MAIN", vec![0x57, 0x0A, 0xC0])]);

    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::Key)));
    assert_eq!(exe.awaiting(), Some(AwaitKind::Key));
    // Still waiting until input arrives.
    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::Key)));
    assert!(exe.resume(Input::Key(65)));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(65)));
}

#[test]
fn get_string_delivers_a_character() {
    let mut exe = executable(vec![procedure("MAIN", vec![0x57, 0xC7, 0xC0])]);
    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::KeyString)));
    assert!(exe.resume(Input::Key(65)));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Str("A".into())));
}

#[test]
fn key_reads_and_clears_last_key() {
    let mut exe = executable(vec![procedure(
        "MAIN",
        vec![0x57, 0x34, 0x57, 0x13, 0x57, 0x13, 0xC0],
    )]);
    exe.press_key(27);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    let stack = exe.operand_stack();
    assert_eq!(stack.len(), 3);
    assert_eq!(top(&exe), Some(Value::Word(0)));
}

#[test]
fn timed_pause_sleeps() {
    let mut exe = executable(vec![procedure("MAIN", vec![0x28, 0x01, 0x00, 0xB5, 0xC0])]);

    let outcome = exe.run().unwrap();
    assert!(matches!(outcome, Outcome::Sleeping(_)));
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
}

#[test]
fn negative_pause_does_not_wait() {
    let mut exe = executable(vec![procedure("MAIN", vec![0x28, 0xFF, 0xFF, 0xB5, 0xC0])]);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
}

// ============================================================
// Databases
// ============================================================

#[test]
fn database_keywords_act_on_the_current_file() {
    let main = procedure(
        "MAIN",
        [
            text("A.DBF"),
            // OPEN "A.DBF", A, n%, s$
            vec![0xB4, 0x00, 0x00, 0x02, b'N', b'%', 0x03, 0x02, b'S', b'$', 0xFF],
            vec![0x9D],       // APPEND
            vec![0xBE, 0x02], // USE C
            vec![0xBD],       // UPDATE
            vec![0xA1],       // CLOSE
            text("B.DBF"),
            vec![0xA5, 0x01, 0xFF], // CREATE "B.DBF", B
            vec![0x9D],
            vec![0xC0],
        ]
        .concat(),
    );
    let host = RecordingHost::default();
    let mut exe = recording(vec![main], &host);

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(
        host.log.borrow().as_slice(),
        [
            "open 0 A.DBF N%:Word S$:Str",
            "append 0",
            "update 2",
            "close 2",
            "create 1 B.DBF",
            "append 1",
        ]
    );
}

#[test]
fn unsupported_database_is_a_trappable_error() {
    let open = [text("X"), vec![0xB4, 0x00, 0xFF]].concat();
    let mut trapped = executable(vec![procedure(
        "MAIN",
        [vec![0xBC], open.clone(), vec![0xC0]].concat(),
    )]);
    assert_eq!(trapped.run(), Ok(Outcome::Completed));
    assert_eq!(trapped.last_error(), -4);

    let mut fatal = executable(vec![procedure("MAIN", [open, vec![0xC0]].concat())]);
    assert!(matches!(
        fatal.run(),
        Err(RuntimeError::Io { operation: "OPEN", code: -4, .. })
    ));
}

#[test]
fn bad_field_type_in_open_is_invalid() {
    let main = procedure(
        "MAIN",
        [text("X"), vec![0xB4, 0x00, 0x09, 0x01, b'A', 0xFF, 0xC0]].concat(),
    );
    let host = RecordingHost::default();
    let mut exe = recording(vec![main], &host);
    assert_eq!(exe.run(), Err(RuntimeError::InvalidArgument));
    assert!(host.log.borrow().is_empty());
}

// ============================================================
// Dialog items and menus
// ============================================================

/// `choice%` at 2, `l&` at 4, `s$` at 9 with its capacity byte at 8.
fn dialog_program() -> ProcedureSections {
    ProcedureSections {
        frame_size: 24,
        strings: vec![StringDeclaration {
            offset: 8,
            max_length: 10,
        }],
        ..procedure(
            "MAIN",
            [
                local_address(2),
                word(2),
                vec![0x84], // choice% = 2
                text("T"),
                vec![0xEC, 0x01], // dINIT "T"
                local_address(2),
                text("C"),
                text("A,B"),
                vec![0xED, 0x01], // dCHOICE choice%, "C", "A,B"
                local_address(4),
                text("L"),
                long(0),
                long(100),
                vec![0xED, 0x02], // dLONG l&, "L", 0, 100
                vec![0x07, 0x09, 0x00],
                text("E"),
                word(5),
                vec![0xED, 0x07], // dEDIT s$, "E", 5
                text("Yes"),
                word(121),
                text("No"),
                word(110),
                vec![0xED, 0x0A, 0x02], // dBUTTONS "Yes", %y, "No", %n
                word(1),
                word(2),
                vec![0xED, 0x0B], // dPOSITION 1, 2
                vec![0x57, 0x37], // DIALOG
                vec![0xC0],
            ]
            .concat(),
        )
    }
}

#[test]
fn dialog_items_reach_the_host_in_order() {
    let host = RecordingHost::default();
    let mut exe = recording(vec![dialog_program()], &host);

    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::Dialog)));
    assert_eq!(
        host.items.borrow().as_slice(),
        [
            (
                1,
                DialogItem::Choice {
                    prompt: "C".into(),
                    choices: vec!["A".into(), "B".into()],
                    initial: 2,
                }
            ),
            (
                2,
                DialogItem::Long {
                    prompt: "L".into(),
                    initial: 0,
                    min: 0,
                    max: 100,
                }
            ),
            (
                3,
                DialogItem::Edit {
                    prompt: "E".into(),
                    initial: String::new(),
                    max_len: 5,
                }
            ),
        ]
    );
    assert_eq!(
        host.buttons.borrow().as_slice(),
        [("Yes".to_string(), 121), ("No".to_string(), 110)]
    );
    assert_eq!(host.log.borrow().as_slice(), ["position 1 2"]);
}

#[test]
fn confirmed_dialog_writes_fields_back() {
    let mut host = RecordingHost::default();
    host.answers.insert(1, Value::Word(1));
    host.answers.insert(2, Value::Word(42));
    host.answers.insert(3, Value::Str("OK".into()));
    let mut exe = recording(vec![dialog_program()], &host);

    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::Dialog)));
    assert!(exe.resume(Input::Dialog(121)));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(121)));
    assert_eq!(exe.heap().read(ValueType::Word, 2), Ok(Value::Word(1)));
    assert_eq!(exe.heap().read(ValueType::Long, 4), Ok(Value::Long(42)));
    assert_eq!(exe.heap().read(ValueType::Str, 9), Ok(Value::Str("OK".into())));
    assert_eq!(host.log.borrow().last().map(String::as_str), Some("hide dialog"));
}

#[test]
fn cancelled_dialog_leaves_fields_alone() {
    let mut host = RecordingHost::default();
    host.answers.insert(1, Value::Word(1));
    let mut exe = recording(vec![dialog_program()], &host);

    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::Dialog)));
    assert!(exe.resume(Input::Dialog(0)));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(0)));
    assert_eq!(exe.heap().read(ValueType::Word, 2), Ok(Value::Word(2)));
}

#[test]
fn alert_numbers_its_buttons() {
    let main = procedure(
        "MAIN",
        [
            text("Why"),
            text("Sure?"),
            text("A"),
            text("B"),
            vec![0x57, 0x38, 0x04], // ALERT("Why", "Sure?", "A", "B")
            vec![0xC0],
        ]
        .concat(),
    );
    let host = RecordingHost::default();
    let mut exe = recording(vec![main], &host);

    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::Dialog)));
    assert_eq!(host.dialogs.borrow().as_slice(), ["Why".to_string()]);
    assert_eq!(host.log.borrow().as_slice(), [r#"text "" "Sure?""#]);
    assert_eq!(
        host.buttons.borrow().as_slice(),
        [("A".to_string(), 1), ("B".to_string(), 2)]
    );
    assert!(exe.resume(Input::Dialog(2)));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(2)));
}

#[test]
fn menu_with_variable_starts_on_and_records_the_highlight() {
    let main = ProcedureSections {
        frame_size: 8,
        ..procedure(
            "MAIN",
            [
                local_address(2),
                word(0x0102),
                vec![0x84], // init% = card 1, item 2
                vec![0xEA], // mINIT
                text("File"),
                text("New"),
                word(110),
                text("Open"),
                word(111),
                vec![0xEB, 0x02], // mCARD "File", "New", %n, "Open", %o
                local_address(2),
                vec![0x57, 0x3A], // MENU(init%)
                vec![0xC0],
            ]
            .concat(),
        )
    };
    let host = RecordingHost {
        highlight: Some(0x0101),
        ..RecordingHost::default()
    };
    let mut exe = recording(vec![main], &host);

    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::Menu)));
    assert!(exe.resume(Input::Menu(110)));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(110)));
    assert_eq!(exe.heap().read(ValueType::Word, 2), Ok(Value::Word(0x0101)));
    assert_eq!(
        host.log.borrow().as_slice(),
        [
            r#"card File [("New", 110), ("Open", 111)]"#,
            "menu 258",
            "hide menu",
        ]
    );
}

#[test]
fn plain_menu_writes_nothing_back() {
    let main = procedure("MAIN", vec![0xEA, 0x57, 0x36, 0xC0]);
    let host = RecordingHost {
        highlight: Some(0x0101),
        ..RecordingHost::default()
    };
    let mut exe = recording(vec![main], &host);

    assert_eq!(exe.run(), Ok(Outcome::AwaitingInput(AwaitKind::Menu)));
    assert!(exe.resume(Input::Menu(0)));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(host.log.borrow().as_slice(), ["menu 0", "hide menu"]);
}

// ============================================================
// Date and time
// ============================================================

#[test]
fn clock_functions_read_the_host_clock() {
    let main = procedure(
        "MAIN",
        vec![
            0x57, 0x1E, // YEAR
            0x57, 0x17, // MONTH
            0x57, 0x04, // DAY
            0x57, 0x12, // HOUR
            0x57, 0x16, // MINUTE
            0x57, 0x1C, // SECOND
            0x57, 0xC1, // DATIM$
            0xC0,
        ],
    );
    let host = RecordingHost::default();
    let mut exe = recording(vec![main], &host);

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    let stack = exe.operand_stack();
    let words: Vec<Value> = (1..7).rev().filter_map(|d| stack.peek_at(d).cloned()).collect();
    assert_eq!(
        words,
        [2026, 10, 16, 9, 5, 7].map(Value::Word).to_vec()
    );
    assert_eq!(top(&exe), Some(Value::Str("Fri 16 Oct 2026 09:05:07".into())));
}

#[test]
fn datetosecs_counts_from_1970() {
    let main = procedure(
        "MAIN",
        [word(1970), word(1), word(2), word(0), word(0), word(1), vec![0x57, 0x45, 0xC0]].concat(),
    );
    let host = RecordingHost::default();
    let mut exe = recording(vec![main], &host);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Long(86_401)));
}

#[test]
fn month_and_day_names() {
    let main = procedure(
        "MAIN",
        [word(10), vec![0x57, 0xCD], word(7), vec![0x57, 0xC2], vec![0xC0]].concat(),
    );
    let mut exe = executable(vec![main]);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(exe.operand_stack().peek_at(1), Some(&Value::Str("Oct".into())));
    assert_eq!(top(&exe), Some(Value::Str("SUN".into())));

    let mut bad = executable(vec![procedure(
        "MAIN",
        [word(13), vec![0x57, 0xCD, 0xC0]].concat(),
    )]);
    assert_eq!(bad.run(), Err(RuntimeError::OutOfRange { value: 13 }));
}

#[test]
fn days_counts_from_1900() {
    let days = |d: i16, m: i16, y: i16| {
        let main = procedure(
            "MAIN",
            [word(d), word(m), word(y), vec![0x57, 0x40, 0xC0]].concat(),
        );
        let mut exe = executable(vec![main]);
        exe.run().map(|_| top(&exe))
    };
    assert_eq!(days(1, 1, 1900), Ok(Some(Value::Long(0))));
    assert_eq!(days(16, 10, 2026), Ok(Some(Value::Long(46309))));
    assert_eq!(days(30, 2, 2001), Err(RuntimeError::OutOfRange { value: 30 }));
    assert_eq!(days(1, 1, 1899), Err(RuntimeError::OutOfRange { value: 1899 }));
}

#[test]
fn seconds_convert_to_and_from_dates() {
    // Seven Word targets at 2, 4, ... 14.
    let targets: Vec<u8> = (0..7u8).flat_map(|i| local_address(2 + 2 * i)).collect();
    let main = ProcedureSections {
        frame_size: 16,
        ..procedure(
            "MAIN",
            [
                word(2001),
                word(9),
                word(9),
                word(1),
                word(46),
                word(40),
                vec![0x57, 0x45], // DATETOSECS
                targets,
                vec![0xFB], // SECSTODATE
                vec![0xC0],
            ]
            .concat(),
        )
    };
    let host = RecordingHost::default();
    let mut exe = recording(vec![main], &host);

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert!(exe.operand_stack().is_empty());
    let parts: Vec<Value> = (0..7)
        .map(|i| exe.heap().read(ValueType::Word, 2 + 2 * i).unwrap())
        .collect();
    assert_eq!(parts, [2001, 9, 9, 1, 46, 40, 252].map(Value::Word).to_vec());
}

// ============================================================
// Files and devices
// ============================================================

#[test]
fn file_keywords_go_through_the_host() {
    let main = procedure(
        "MAIN",
        [
            text(r"C:\A.TXT"),
            vec![0x57, 0x08], // EXIST
            text(r"C:\A.TXT"),
            vec![0xA7], // DELETE
            text(r"C:\A.TXT"),
            vec![0x57, 0x08],
            text(r"C:\*"),
            vec![0x57, 0xC3], // DIR$
            text(""),
            vec![0x57, 0xC3],
            text(r"C:\D"),
            vec![0xF8], // MKDIR
            text(r"C:\D"),
            vec![0xFA], // SETPATH
            vec![0xC0],
        ]
        .concat(),
    );
    let host = RecordingHost::default();
    host.files
        .borrow_mut()
        .extend([r"C:\A.TXT".to_string(), r"C:\B.TXT".to_string()]);
    let mut exe = recording(vec![main], &host);

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    let stack = exe.operand_stack();
    assert_eq!(stack.len(), 4);
    assert_eq!(stack.peek_at(3), Some(&Value::Word(-1)));
    assert_eq!(stack.peek_at(2), Some(&Value::Word(0)));
    assert_eq!(stack.peek_at(1), Some(&Value::Str(r"C:\B.TXT".into())));
    assert_eq!(top(&exe), Some(Value::Str(String::new())));
    assert_eq!(host.log.borrow().as_slice(), [r"mkdir C:\D", r"setpath C:\D"]);
}

#[test]
fn deleting_a_missing_file_reports_its_code() {
    let host = RecordingHost::default();
    let main = procedure("MAIN", [text("GONE"), vec![0xA7, 0xC0]].concat());
    let mut exe = recording(vec![main], &host);
    assert!(matches!(
        exe.run(),
        Err(RuntimeError::Io { operation: "DELETE", code: -33, .. })
    ));
}

/// Opens `TIM:` into `handle%` at 2, starts a timer of `interval&` (at 6)
/// with `status%` at 4, waits on it and pushes the final status.
fn timer_program() -> ProcedureSections {
    ProcedureSections {
        frame_size: 16,
        ..procedure(
            "MAIN",
            [
                local_address(2),
                text("TIM:"),
                word(0),
                vec![0x57, 0x0D, 0x80], // IOOPEN(handle%, "TIM:", 0)
                vec![0x05, 0x06, 0x00],
                long(5),
                vec![0x85], // interval& = 5
                vec![0x00, 0x02, 0x00],
                word(1),
                local_address(4),
                local_address(6),
                local_address(10),
                vec![0x57, 0x0B], // IOA(handle%, 1, status%, interval&, #0)
                local_address(4),
                vec![0xE8], // IOWAITSTAT status%
                vec![0x00, 0x04, 0x00],
                vec![0xC0],
            ]
            .concat(),
        )
    }
}

#[test]
fn iowaitstat_sleeps_until_the_timer_completes() {
    let host = RecordingHost::default();
    let mut exe = recording(vec![timer_program()], &host);

    assert!(matches!(exe.run(), Ok(Outcome::Sleeping(_))));
    assert_eq!(exe.heap().read(ValueType::Word, 2), Ok(Value::Word(7)));
    assert_eq!(exe.heap().read(ValueType::Word, 4), Ok(Value::Word(-46)));
    assert_eq!(host.log.borrow().as_slice(), ["timer 7 4 5"]);
    // IOA's result is still on the stack under the waiting address.
    assert_eq!(exe.operand_stack().peek_at(1), Some(&Value::Word(0)));

    std::thread::sleep(Duration::from_millis(60));
    assert!(matches!(exe.run(), Ok(Outcome::Sleeping(_))));

    let fired = std::mem::take(&mut *host.timers.borrow_mut());
    host.expired.borrow_mut().extend(fired);
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(0)));
}

#[test]
fn io_open_failure_returns_a_code() {
    let main = ProcedureSections {
        frame_size: 4,
        ..procedure(
            "MAIN",
            [local_address(2), text("COM:"), word(0), vec![0x57, 0x0D, 0xC0]].concat(),
        )
    };
    let host = RecordingHost::default();
    let mut exe = recording(vec![main], &host);
    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(-33)));
}

// ============================================================
// Modules
// ============================================================

fn lib_image() -> Vec<u8> {
    image(vec![procedure("LIB%", vec![0x28, 0x09, 0x00, 0xC0])])
}

#[test]
fn loadm_reads_module_through_host() {
    let mut host = RecordingHost::default();
    host.modules.insert("LIB".into(), lib_image());
    let main = ProcedureSections {
        called: vec![("LIB%".into(), 0)],
        ..procedure(
            "MAIN",
            vec![0x2B, 0x03, b'L', b'I', b'B', 0xAE, 0x53, 0x12, 0x00, 0xC0],
        )
    };
    let mut exe = executable_with(vec![main], Box::new(host), VmConfig::default());

    assert_eq!(exe.run(), Ok(Outcome::Completed));
    assert_eq!(top(&exe), Some(Value::Word(9)));
    assert!(exe.procedures().is_loaded("lib"));
}

#[test]
fn loadm_of_missing_module_fails() {
    let main = procedure("MAIN", vec![0x2B, 0x03, b'L', b'I', b'B', 0xAE, 0xC0]);
    let mut exe = executable(vec![main]);
    assert!(matches!(
        exe.run(),
        Err(RuntimeError::ModuleLoad { name, .. }) if name == "LIB"
    ));
}

#[test]
fn facade_module_loading() {
    let mut exe = executable(vec![procedure("MAIN", vec![0xC0])]);
    let module = opo_loader::load(&lib_image()).unwrap();

    exe.load_module("LIB", module.clone()).unwrap();
    assert!(exe.lookup("lib%").is_some());
    assert_eq!(
        exe.load_module("lib", module),
        Err(RuntimeError::ModuleAlreadyLoaded { name: "lib".into() })
    );
}
