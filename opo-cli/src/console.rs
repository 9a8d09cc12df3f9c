//! A terminal host: text to stdout, keys and dialog answers from stdin.
//! Device paths map into the program's directory.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use opo_vm::{
    AwaitKind, Clock, Database, DialogItem, Dialogs, FileSystem, Input, IoCompletion, IoHandles,
    ModuleSource, Screen,
};
use tracing::debug;

const ENTER: i16 = 13;
const ESCAPE: i16 = 27;

/// Device name `IOOPEN` accepts for timers.
const TIMER_DEVICE: &str = "TIM:";

enum Handle {
    File(File),
    Timer,
}

/// Host for `opo run`. Modules and files are looked up in the program's
/// directory.
pub struct ConsoleHost {
    directory: PathBuf,
    /// Components set by `SETPATH`, applied to relative names.
    current: Vec<String>,
    out: io::Stdout,
    handles: HashMap<i16, Handle>,
    next_handle: i16,
    timers: Vec<(Instant, u16)>,
}

impl ConsoleHost {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            current: Vec::new(),
            out: io::stdout(),
            handles: HashMap::new(),
            next_handle: 1,
            timers: Vec::new(),
        }
    }

    /// Maps `C:\DIR\FILE` to `<directory>/DIR/FILE`. Names without a
    /// leading separator are relative to the `SETPATH` directory.
    fn local_path(&self, path: &str) -> PathBuf {
        let rest = match path.split_once(':') {
            Some((device, rest)) if device.len() == 1 => rest,
            _ => path,
        };
        let mut local = self.directory.clone();
        if !rest.starts_with(['\\', '/']) {
            local.extend(&self.current);
        }
        local.extend(
            rest.split(['\\', '/'])
                .filter(|part| !part.is_empty() && *part != ".." && *part != "."),
        );
        local
    }

    fn file(&mut self, handle: i16) -> io::Result<&mut File> {
        match self.handles.get_mut(&handle) {
            Some(Handle::File(file)) => Ok(file),
            _ => Err(bad_handle(handle)),
        }
    }

    fn write(&mut self, text: &str) {
        // A closed stdout is not the program's problem.
        let _ = self.out.write_all(text.as_bytes());
    }
}

impl Screen for ConsoleHost {
    fn print(&mut self, text: &str) {
        self.write(text);
    }

    fn print_newline(&mut self) {
        self.write("\n");
    }

    fn cls(&mut self) {
        let _ = self.out.flush();
    }

    fn info_print(&mut self, text: &str, _corner: i16) {
        eprintln!("{text}");
    }

    fn graphics_print(&mut self, text: &str) {
        self.write(text);
    }

    fn composite(&mut self) {
        let _ = self.out.flush();
    }
}

impl Dialogs for ConsoleHost {
    fn dialog_init(&mut self, title: &str, _flags: i16) {
        if !title.is_empty() {
            self.write(&format!("[{title}]\n"));
        }
    }

    fn dialog_text(&mut self, prompt: &str, body: &str, _align: i16) {
        self.write(&format!("{prompt}{body}\n"));
    }

    fn dialog_item(&mut self, line: usize, item: &DialogItem) {
        let text = match item {
            DialogItem::Choice {
                prompt, choices, ..
            } => format!("{line}. {prompt} ({})", choices.join("/")),
            DialogItem::Long { prompt, initial, .. } => format!("{line}. {prompt} {initial}"),
            DialogItem::Float { prompt, initial, .. } => format!("{line}. {prompt} {initial}"),
            DialogItem::Edit { prompt, initial, .. } | DialogItem::File { prompt, initial, .. } => {
                format!("{line}. {prompt} {initial}")
            }
        };
        self.write(&text);
        self.write("\n");
    }

    fn dialog_buttons(&mut self, buttons: &[(String, i16)]) {
        let row: Vec<String> = buttons
            .iter()
            .map(|(text, key)| format!("<{text}:{key}>"))
            .collect();
        self.write(&row.join(" "));
        self.write("\n");
    }

    fn menu_card(&mut self, title: &str, items: &[(String, i16)]) {
        self.write(&format!("{title}:"));
        for (text, key) in items {
            self.write(&format!(" {text}({key})"));
        }
        self.write("\n");
    }
}

impl Database for ConsoleHost {}

impl IoHandles for ConsoleHost {
    fn poll_io(&mut self) -> Vec<IoCompletion> {
        if self.timers.is_empty() {
            return Vec::new();
        }
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.timers.drain(..).partition(|(at, _)| *at <= now);
        self.timers = waiting;
        due.into_iter()
            .map(|(_, status)| IoCompletion { status, value: 0 })
            .collect()
    }

    fn io_open(&mut self, name: &str, mode: i16) -> io::Result<i16> {
        let handle = if name.eq_ignore_ascii_case(TIMER_DEVICE) {
            Handle::Timer
        } else {
            Handle::File(open_file(self.local_path(name), mode)?)
        };
        let number = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(number, handle);
        debug!(name, mode, handle = number, "io open");
        Ok(number)
    }

    fn io_close(&mut self, handle: i16) -> io::Result<()> {
        self.handles
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| bad_handle(handle))
    }

    fn io_read(&mut self, handle: i16, max: usize) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(max);
        self.file(handle)?.take(max as u64).read_to_end(&mut data)?;
        Ok(data)
    }

    fn io_write(&mut self, handle: i16, data: &[u8]) -> io::Result<()> {
        self.file(handle)?.write_all(data)
    }

    fn io_seek(&mut self, handle: i16, mode: i16, offset: i32) -> io::Result<i32> {
        let from = match mode {
            1 => SeekFrom::Start(u64::try_from(offset).unwrap_or(0)),
            2 => SeekFrom::End(i64::from(offset)),
            3 => SeekFrom::Current(i64::from(offset)),
            _ => return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad seek mode")),
        };
        let position = self.file(handle)?.seek(from)?;
        i32::try_from(position).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file too large"))
    }

    fn add_timer(&mut self, handle: i16, status: u16, interval: i32) -> io::Result<()> {
        if !matches!(self.handles.get(&handle), Some(Handle::Timer)) {
            return Err(bad_handle(handle));
        }
        let tenths = u64::try_from(interval).unwrap_or(0);
        self.timers
            .push((Instant::now() + Duration::from_millis(tenths * 100), status));
        Ok(())
    }
}

impl FileSystem for ConsoleHost {
    fn exists(&mut self, path: &str) -> bool {
        self.local_path(path).exists()
    }

    fn delete(&mut self, path: &str) -> io::Result<()> {
        fs::remove_file(self.local_path(path))
    }

    fn make_dir(&mut self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.local_path(path))
    }

    fn set_path(&mut self, path: &str) -> io::Result<()> {
        let rest = match path.split_once(':') {
            Some((device, rest)) if device.len() == 1 => rest,
            _ => path,
        };
        self.current = rest
            .split(['\\', '/'])
            .filter(|part| !part.is_empty() && *part != ".." && *part != ".")
            .map(str::to_string)
            .collect();
        Ok(())
    }

    /// `C:\DIR\*.TXT` lists matching files in `DIR`; a name without
    /// wildcards lists the directory it names.
    fn list_dir(&mut self, pattern: &str) -> io::Result<Vec<String>> {
        let (prefix, wanted) = match pattern.rfind(['\\', '/']) {
            Some(i) => pattern.split_at(i + 1),
            None => ("", pattern),
        };
        let (prefix, wanted) = if wanted.contains(['*', '?']) {
            (prefix.to_string(), wanted)
        } else if wanted.is_empty() {
            (prefix.to_string(), "*")
        } else {
            (format!("{pattern}\\"), "*")
        };
        let mut names: Vec<String> = fs::read_dir(self.local_path(&prefix))?
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| wildcard(wanted, name))
            .collect();
        names.sort();
        Ok(names.into_iter().map(|name| format!("{prefix}{name}")).collect())
    }
}

impl Clock for ConsoleHost {}

impl ModuleSource for ConsoleHost {
    fn read_module(&mut self, name: &str) -> io::Result<Vec<u8>> {
        // Device paths such as `C:\OPO\LIB` keep only the file name.
        let file = name.rsplit(['\\', '/']).next().unwrap_or(name);
        let direct = self.directory.join(file);
        let path = if direct.is_file() {
            direct
        } else {
            self.directory.join(format!("{file}.OPO"))
        };
        debug!(module = name, path = %path.display(), "reading module");
        std::fs::read(path)
    }
}

fn bad_handle(handle: i16) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("no I/O handle {handle}"))
}

/// Opens a file the way `IOOPEN` mode bits ask: the low nibble is 0 to
/// open, 1 to create, 2 to replace and 3 to append; `0x100` allows writes.
fn open_file(path: PathBuf, mode: i16) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    match mode & 0x0F {
        0 => options.write(mode & 0x100 != 0),
        1 => options.write(true).create_new(true),
        2 => options.write(true).create(true).truncate(true),
        3 => options.append(true).create(true),
        _ => return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad open mode")),
    };
    options.open(path)
}

/// Case-insensitive match with `*` and `?` wildcards.
fn wildcard(pattern: &str, name: &str) -> bool {
    fn matches(p: &[char], n: &[char]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some('*'), _) => matches(&p[1..], n) || (!n.is_empty() && matches(p, &n[1..])),
            (Some('?'), Some(_)) => matches(&p[1..], &n[1..]),
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => matches(&p[1..], &n[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    matches(&p, &n)
}

/// Turns stdin lines into the input a waiting program asked for.
pub struct StdinKeys {
    stdin: io::Stdin,
}

impl StdinKeys {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }

    pub fn next_input(&mut self, kind: AwaitKind) -> Input {
        let _ = io::stdout().flush();
        let line = self.read_line();
        match kind {
            AwaitKind::Key | AwaitKind::KeyString | AwaitKind::Pause => {
                Input::Key(key_code(line.as_deref()))
            }
            AwaitKind::Dialog => Input::Dialog(number(line.as_deref())),
            AwaitKind::Menu => Input::Menu(number(line.as_deref())),
        }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl Default for StdinKeys {
    fn default() -> Self {
        Self::new()
    }
}

/// First character of the line; Enter for an empty line, Escape at EOF.
fn key_code(line: Option<&str>) -> i16 {
    match line {
        None => ESCAPE,
        Some(line) => line
            .chars()
            .next()
            .and_then(|c| i16::try_from(u32::from(c)).ok())
            .unwrap_or(ENTER),
    }
}

fn number(line: Option<&str>) -> i16 {
    line.and_then(|l| l.trim().parse().ok()).unwrap_or(0)
}
