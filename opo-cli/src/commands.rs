//! CLI command implementations.

use std::path::Path;
use std::thread;
use std::time::Instant;

use opo_common::{EmbeddedKind, ObjectFile, Procedure};
use opo_vm::{Executable, Outcome, VmConfig};

use crate::console::ConsoleHost;

/// Print the header, embedded resources and procedure table.
pub fn info(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: info requires an input file");
        eprintln!("Usage: opo info <file.opo> [--json]");
        return Err(1);
    }

    let input = &args[0];
    let json = match args.get(1).map(String::as_str) {
        None => false,
        Some("--json") => true,
        Some(other) => {
            eprintln!("error: unexpected argument '{other}'");
            return Err(1);
        }
    };

    let object = read_object(input)?;

    if json {
        let text = serde_json::to_string_pretty(&object).map_err(|e| {
            eprintln!("error: cannot encode JSON: {e}");
            1
        })?;
        println!("{text}");
    } else {
        print_object(&object);
    }
    Ok(())
}

fn print_object(object: &ObjectFile) {
    let h = &object.header;
    println!("source: {}", h.source_filename);
    println!(
        "format: {:#06x}  translator: {:#06x}  runtime: {:#06x}  length: {}",
        h.format_version, h.translator_version, h.required_runtime_version, h.file_length
    );

    if !object.embedded.is_empty() {
        println!("embedded:");
        for e in &object.embedded {
            let kind = match e.kind {
                EmbeddedKind::Image => "image",
                EmbeddedKind::Opa => "opa",
                EmbeddedKind::Unknown => "unknown",
            };
            println!("  {kind:<8} {}..{} ({} bytes)", e.start, e.end, e.len());
        }
    }

    println!("procedures:");
    for p in &object.procedures {
        print_procedure(p);
    }
}

fn print_procedure(p: &Procedure) {
    println!(
        "  {} (line {}) frame {} bytes, {} bytes of code",
        p.name,
        p.source_line,
        p.frame_size,
        p.bytecode.len()
    );
    if !p.parameters.is_empty() {
        let types: Vec<_> = p
            .parameters
            .iter()
            .map(|q| format!("{:?}", q.value_type))
            .collect();
        println!("    parameters: {}", types.join(" "));
    }
    for g in &p.globals {
        println!("    global {} at {} (ee {})", g.name, g.offset, g.ee);
    }
    for c in &p.called {
        println!("    calls {} with {} args (ee {})", c.name, c.arg_count, c.ee);
    }
    for r in &p.global_references {
        println!("    imports {} (ee {})", r.name, r.ee);
    }
}

/// Execute a program on the console.
pub fn run(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: run requires an input file");
        eprintln!("Usage: opo run <file.opo> [--heap-size N] [--max-steps N]");
        return Err(1);
    }

    let input = &args[0];
    let config = parse_config(&args[1..])?;
    let object = read_object(input)?;

    let directory = Path::new(input)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let host = ConsoleHost::new(directory);
    let mut exe = Executable::new(object, Box::new(host), config);
    let mut keys = crate::console::StdinKeys::new();

    loop {
        match exe.run() {
            Ok(Outcome::Completed) | Ok(Outcome::Stopped) => return Ok(()),
            Ok(Outcome::Errored {
                procedure,
                pc,
                opcode,
            }) => {
                eprintln!("error: no handler for opcode {opcode:#04x} in {procedure} at pc {pc}");
                return Err(3);
            }
            Ok(Outcome::AwaitingInput(kind)) => {
                let input = keys.next_input(kind);
                exe.resume(input);
            }
            Ok(Outcome::Sleeping(deadline)) => {
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
            }
            Ok(Outcome::StepLimit) => {
                eprintln!("error: step limit reached");
                return Err(3);
            }
            Err(e) => {
                eprintln!("runtime error: {e}");
                return Err(3);
            }
        }
    }
}

fn parse_config(args: &[String]) -> Result<VmConfig, i32> {
    let mut config = VmConfig::default();
    let mut rest = args.iter();
    while let Some(flag) = rest.next() {
        let value = |v: Option<&String>| -> Result<u64, i32> {
            let v = v.ok_or_else(|| {
                eprintln!("error: {flag} requires a value");
                1
            })?;
            v.parse().map_err(|_| {
                eprintln!("error: invalid value '{v}' for {flag}");
                1
            })
        };
        match flag.as_str() {
            "--heap-size" => config.heap_size = value(rest.next())? as usize,
            "--max-steps" => config.max_steps = Some(value(rest.next())?),
            other => {
                eprintln!("error: unexpected argument '{other}'");
                return Err(1);
            }
        }
    }
    Ok(config)
}

fn read_object(path: &str) -> Result<ObjectFile, i32> {
    opo_loader::load_file(Path::new(path)).map_err(|e| {
        eprintln!("error: {e}");
        1
    })
}
