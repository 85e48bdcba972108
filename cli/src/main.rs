//! bfjit: compile a program to x86-64 and run it in-process.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use bfjit_exec::ExecError;
use bfjit_frontend::{compile, is_program_text, CompileError, ConfigError, TranslatorConfig};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: bfjit <file | source>

Compiles the program in <file> (or the inline <source> text) to native
code and runs it. Input (',') is not supported and traps.

Environment:
  BFJIT_TAPE_SIZE   working region size in bytes (default: 30000)
  BFJIT_DUMP        hex-dump the generated code to stderr before running
  RUST_LOG          log filter (default: warn)";

/// Environment variable enabling the code dump.
const DUMP_ENV: &str = "BFJIT_DUMP";

#[derive(Error, Debug)]
enum DriverError {
    #[error("expected exactly one argument")]
    Usage,

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl DriverError {
    fn exit_code(&self) -> i32 {
        match self {
            DriverError::Usage => 2,
            _ => 1,
        }
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

/// Resolve the single argument to program text: an existing file is
/// read, operator-only text is taken as inline source, anything else is
/// reported as an unreadable file.
fn load_source(arg: &str) -> Result<Vec<u8>, DriverError> {
    let path = Path::new(arg);
    if !path.is_file() && is_program_text(arg) {
        return Ok(arg.as_bytes().to_vec());
    }
    fs::read(path).map_err(|source| DriverError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn dump_code(code: &[u8]) {
    let mut err = io::stderr().lock();
    for (i, chunk) in code.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let _ = writeln!(err, "{:08x}  {}", i * 16, hex.join(" "));
    }
}

fn run(args: &[String]) -> Result<(), DriverError> {
    let [arg] = args else {
        return Err(DriverError::Usage);
    };
    let source = load_source(arg)?;
    let config = TranslatorConfig::from_env()?;

    let program = compile(&source, &config, bfjit_exec::host_routines())?;
    info!(
        ops = program.stats.ops,
        loops = program.stats.loops,
        code_len = program.stats.code_len,
        "compiled {arg}"
    );
    if env::var_os(DUMP_ENV).is_some() {
        dump_code(&program.code);
    }

    let mut stdout = io::stdout().lock();
    let stats = bfjit_exec::execute(&program.code, &mut stdout)?;
    info!(bytes_written = stats.bytes_written, "done");
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("-h" | "--help")) {
        println!("{USAGE}");
        return;
    }

    init_logging();
    if let Err(err) = run(&args) {
        match &err {
            DriverError::Usage => eprintln!("{USAGE}"),
            other => eprintln!("error: {other}"),
        }
        process::exit(err.exit_code());
    }
}
