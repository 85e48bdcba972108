//! bfjit-dump: disassemble the code generated for a program.
//!
//! Compiles the program exactly as `bfjit` would and prints an
//! Intel-syntax listing with label bindings and branch targets
//! annotated, without running anything.

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process;

use bfjit_frontend::{compile, is_program_text, Program, TranslatorConfig};
use iced_x86::{Decoder, DecoderOptions, Formatter, FlowControl, Instruction, IntelFormatter};
use tracing_subscriber::EnvFilter;

struct Args {
    input: String,
    output: Option<String>,
    raw: Option<String>,
}

const USAGE: &str = "\
usage: bfjit-dump <file | source> [options]

Options:
  -o <file>      Write the listing to a file
  --raw <file>   Also write the raw code bytes to a file
  -h, --help     Show this help";

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        eprintln!("{USAGE}");
        process::exit(if args.len() < 2 { 2 } else { 0 });
    }

    let mut a = Args {
        input: args[1].clone(),
        output: None,
        raw: None,
    };

    let mut i = 2;
    while i < args.len() {
        let value = |i: usize| -> String {
            args.get(i).cloned().unwrap_or_else(|| {
                eprintln!("missing value for {}", args[i - 1]);
                process::exit(2);
            })
        };
        match args[i].as_str() {
            "-o" => {
                i += 1;
                a.output = Some(value(i));
            }
            "--raw" => {
                i += 1;
                a.raw = Some(value(i));
            }
            other => {
                eprintln!("unknown option: {other}");
                process::exit(2);
            }
        }
        i += 1;
    }
    a
}

fn die(msg: impl std::fmt::Display) -> ! {
    eprintln!("error: {msg}");
    process::exit(1);
}

fn load_source(arg: &str) -> Vec<u8> {
    let path = Path::new(arg);
    if !path.is_file() && is_program_text(arg) {
        return arg.as_bytes().to_vec();
    }
    fs::read(path).unwrap_or_else(|e| die(format_args!("cannot read {arg}: {e}")))
}

/// Names of the labels bound at each code offset.
fn label_names(program: &Program) -> BTreeMap<usize, Vec<String>> {
    let mut names: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut add = |offset: Option<usize>, name: String| {
        if let Some(offset) = offset {
            names.entry(offset).or_default().push(name);
        }
    };
    for (i, frame) in program.loops.iter().enumerate() {
        add(program.label_offset(frame.begin), format!("loop{i}.begin"));
        add(program.label_offset(frame.end), format!("loop{i}.end"));
    }
    add(program.label_offset(program.output_label), "output".to_string());
    names
}

fn dump(program: &Program, w: &mut impl Write) -> io::Result<()> {
    let labels = label_names(program);
    let layout = &program.layout;
    let sections = [
        (layout.prologue.start, "prologue"),
        (layout.body.start, "body"),
        (layout.epilogue.start, "epilogue"),
        (layout.output_stub.start, "output stub"),
    ];

    writeln!(
        w,
        "; {} bytes, {} ops, {} loops (max depth {})",
        program.stats.code_len, program.stats.ops, program.stats.loops, program.stats.max_depth
    )?;

    let code = &program.code;
    let mut decoder = Decoder::with_ip(64, code, 0, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut text = String::new();
    let mut instr = Instruction::default();

    while decoder.can_decode() {
        decoder.decode_out(&mut instr);
        let start = instr.ip() as usize;

        for &(at, name) in &sections {
            if at == start {
                writeln!(w, "\n; -- {name} --")?;
            }
        }
        if let Some(names) = labels.get(&start) {
            for name in names {
                writeln!(w, "{name}:")?;
            }
        }

        text.clear();
        formatter.format(&instr, &mut text);
        let bytes: Vec<String> = code[start..start + instr.len()]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        write!(w, "  {start:06x}  {:<30} {text}", bytes.join(" "))?;

        let is_branch = matches!(
            instr.flow_control(),
            FlowControl::UnconditionalBranch | FlowControl::ConditionalBranch | FlowControl::Call
        );
        if is_branch {
            let target = instr.near_branch_target() as usize;
            if let Some(names) = labels.get(&target) {
                write!(w, "    ; -> {}", names.join(", "))?;
            }
        }
        writeln!(w)?;
    }
    Ok(())
}

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let args = parse_args();
    let source = load_source(&args.input);
    let config = TranslatorConfig::from_env().unwrap_or_else(|e| die(e));
    let program =
        compile(&source, &config, bfjit_exec::host_routines()).unwrap_or_else(|e| die(e));

    if let Some(raw) = &args.raw {
        fs::write(raw, &program.code)
            .unwrap_or_else(|e| die(format_args!("cannot write {raw}: {e}")));
    }

    let result = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .unwrap_or_else(|e| die(format_args!("cannot create {path}: {e}")));
            let mut w = BufWriter::new(file);
            dump(&program, &mut w).and_then(|_| w.flush())
        }
        None => {
            let mut w = BufWriter::new(io::stdout().lock());
            dump(&program, &mut w).and_then(|_| w.flush())
        }
    };
    if let Err(e) = result {
        die(e);
    }
}
