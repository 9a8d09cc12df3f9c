//! External collaborators the interpreter drives but does not implement.
//!
//! Opcodes that draw, show dialogs, touch databases, files or devices,
//! read the clock or load modules call through these traits. Every method
//! has a headless default, so a host only overrides what it supports.
//! [`NullHost`] overrides nothing.

use std::io;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use opo_common::{Value, ValueType};

/// Error returned by collaborator operations a host does not provide.
pub fn unsupported(operation: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{operation} is not supported by this host"),
    )
}

/// Text window and graphics drawing.
pub trait Screen {
    fn print(&mut self, _text: &str) {}
    fn print_newline(&mut self) {}
    fn at(&mut self, _x: i16, _y: i16) {}
    fn cls(&mut self) {}
    fn font(&mut self, _font: i32, _style: i32) {}
    fn style(&mut self, _style: i32) {}
    fn beep(&mut self, _duration: i16, _pitch: i16) {}
    /// Transient message in a screen corner (`gIPRINT`).
    fn info_print(&mut self, _text: &str, _corner: i16) {}
    fn graphics_at(&mut self, _x: i16, _y: i16) {}
    fn graphics_move(&mut self, _dx: i16, _dy: i16) {}
    fn graphics_cls(&mut self) {}
    fn graphics_print(&mut self, _text: &str) {}
    /// Current graphics cursor as `(x, y)`.
    fn graphics_position(&self) -> (i16, i16) {
        (0, 0)
    }
    /// Pushes pending drawing to the display.
    fn composite(&mut self) {}
}

/// An editable dialog line. Initial values come from the variable the
/// line edits; the interpreter writes the final value back when the
/// dialog is confirmed.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogItem {
    Choice {
        prompt: String,
        choices: Vec<String>,
        /// 1-based index of the selected choice.
        initial: i16,
    },
    Long {
        prompt: String,
        initial: i32,
        min: i32,
        max: i32,
    },
    Float {
        prompt: String,
        initial: f64,
        min: f64,
        max: f64,
    },
    Edit {
        prompt: String,
        initial: String,
        max_len: i16,
    },
    File {
        prompt: String,
        initial: String,
        flags: i16,
    },
}

/// Dialog and menu construction. `show` calls are followed by the
/// interpreter waiting for the matching [`crate::Input`].
pub trait Dialogs {
    fn dialog_init(&mut self, _title: &str, _flags: i16) {}
    fn dialog_text(&mut self, _prompt: &str, _body: &str, _align: i16) {}
    /// Adds an editable line. `line` counts every line added since
    /// `dialog_init`, text lines included, from 1.
    fn dialog_item(&mut self, _line: usize, _item: &DialogItem) {}
    /// Adds a row of buttons as `(text, key)` pairs, left to right.
    fn dialog_buttons(&mut self, _buttons: &[(String, i16)]) {}
    fn dialog_position(&mut self, _x: i16, _y: i16) {}
    fn dialog_show(&mut self) {}
    /// Final value of an editable line after the dialog was confirmed.
    fn dialog_field(&mut self, _line: usize) -> Option<Value> {
        None
    }
    fn dialog_hide(&mut self) {}
    fn menu_init(&mut self) {}
    /// Adds a menu card of `(text, key)` items, top to bottom.
    fn menu_card(&mut self, _title: &str, _items: &[(String, i16)]) {}
    /// `initial` is `256 * card + item` of the item to highlight.
    fn menu_show(&mut self, _initial: i16) {}
    /// `256 * card + item` of the highlighted item when the menu closed.
    fn menu_highlight(&mut self) -> Option<i16> {
        None
    }
    fn menu_hide(&mut self) {}
}

/// A field declared by `OPEN` or `CREATE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub value_type: ValueType,
    pub name: String,
}

/// Database files, addressed by logical handle (0 for `A` to 25 for `Z`).
pub trait Database {
    fn open(&mut self, _handle: u8, _path: &str, _fields: &[FieldSpec]) -> io::Result<()> {
        Err(unsupported("OPEN"))
    }
    fn create(&mut self, _handle: u8, _path: &str, _fields: &[FieldSpec]) -> io::Result<()> {
        Err(unsupported("CREATE"))
    }
    fn close(&mut self, _handle: u8) -> io::Result<()> {
        Err(unsupported("CLOSE"))
    }
    /// Adds the current record buffer as a new record.
    fn append(&mut self, _handle: u8) -> io::Result<()> {
        Err(unsupported("APPEND"))
    }
    /// Replaces the current record with the record buffer.
    fn update(&mut self, _handle: u8) -> io::Result<()> {
        Err(unsupported("UPDATE"))
    }
    /// Value of `field` in the current record of logical file `handle`.
    fn field_value(&mut self, _handle: u8, _field: &str) -> Option<Value> {
        None
    }
}

/// A finished asynchronous request: `value` is written to the status word
/// at heap address `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoCompletion {
    pub status: u16,
    pub value: i16,
}

/// Device and file handles for the `IO` keywords. Handles are numbers the
/// host chooses in `io_open`.
pub trait IoHandles {
    /// Called once per instruction; returns requests finished since the
    /// last poll.
    fn poll_io(&mut self) -> Vec<IoCompletion> {
        Vec::new()
    }
    fn io_signal(&mut self) {}
    fn io_open(&mut self, name: &str, _mode: i16) -> io::Result<i16> {
        Err(unsupported(&format!("IOOPEN {name}")))
    }
    fn io_close(&mut self, _handle: i16) -> io::Result<()> {
        Err(unsupported("IOCLOSE"))
    }
    /// Reads at most `max` bytes.
    fn io_read(&mut self, _handle: i16, _max: usize) -> io::Result<Vec<u8>> {
        Err(unsupported("IOREAD"))
    }
    fn io_write(&mut self, _handle: i16, _data: &[u8]) -> io::Result<()> {
        Err(unsupported("IOWRITE"))
    }
    /// Moves the position of a file handle and returns the new position.
    fn io_seek(&mut self, _handle: i16, _mode: i16, _offset: i32) -> io::Result<i32> {
        Err(unsupported("IOSEEK"))
    }
    /// Starts a relative timer of `interval` tenths of a second. When it
    /// expires, `poll_io` reports a completion for `status`.
    fn add_timer(&mut self, _handle: i16, _status: u16, _interval: i32) -> io::Result<()> {
        Err(unsupported("timer"))
    }
}

/// Files and directories, named with device paths such as `C:\DATA\X.DBF`.
pub trait FileSystem {
    fn exists(&mut self, _path: &str) -> bool {
        false
    }
    fn delete(&mut self, _path: &str) -> io::Result<()> {
        Err(unsupported("DELETE"))
    }
    fn make_dir(&mut self, _path: &str) -> io::Result<()> {
        Err(unsupported("MKDIR"))
    }
    /// Sets the directory relative names are resolved against.
    fn set_path(&mut self, _path: &str) -> io::Result<()> {
        Err(unsupported("SETPATH"))
    }
    /// Full names of the entries matching `pattern`, in listing order.
    fn list_dir(&mut self, _pattern: &str) -> io::Result<Vec<String>> {
        Err(unsupported("DIR$"))
    }
}

/// Local date and time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    /// Local time `secs` seconds after 1970-01-01 00:00 UTC.
    fn local_time(&self, secs: i64) -> Option<NaiveDateTime> {
        Local
            .timestamp_opt(secs, 0)
            .single()
            .map(|t: DateTime<Local>| t.naive_local())
    }

    /// Seconds since 1970-01-01 00:00 UTC of a local time.
    fn timestamp(&self, local: NaiveDateTime) -> Option<i64> {
        Local
            .from_local_datetime(&local)
            .earliest()
            .map(|t| t.timestamp())
    }
}

/// Source of module images for `LOADM`.
pub trait ModuleSource {
    fn read_module(&mut self, name: &str) -> io::Result<Vec<u8>> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no module source for {name}"),
        ))
    }
}

/// Everything an executable needs from its environment.
pub trait Host:
    Screen + Dialogs + Database + IoHandles + FileSystem + Clock + ModuleSource
{
}

impl<T> Host for T where
    T: Screen + Dialogs + Database + IoHandles + FileSystem + Clock + ModuleSource
{
}

/// A host with no display, no dialogs, no database, no files and no
/// modules. Its clock is the local system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Screen for NullHost {}
impl Dialogs for NullHost {}
impl Database for NullHost {}
impl IoHandles for NullHost {}
impl FileSystem for NullHost {}
impl Clock for NullHost {}
impl ModuleSource for NullHost {}
