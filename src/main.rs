//! Purpose: `volctl` CLI entry point.
//! Role: Binary crate root; parses args, bootstraps `VolumeControl`, prints results on stdout.
//! Invariants: Non-interactive output and errors are JSON; terminals get plain text.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use volctl::api::{
    Error, ErrorKind, IsolationDomain, LibraryIdentity, ReusePolicy, VolumeControl,
    VolumeControlOptions, to_exit_code,
};

#[derive(Parser)]
#[command(
    name = "volctl",
    version,
    about = "Read and write the system master audio volume (0-100)",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Directory to extract the native backend into (default: OS temp dir)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(long, help = "Library file name without extension (default: platform name)")]
    name: Option<String>,
    #[arg(long, help = "Extract a private, uniquely-named copy of the native backend")]
    multi_domain: bool,
    #[arg(long, help = "Only reuse an undeletable existing library if its SHA-256 matches")]
    verify_existing: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current master volume.
    Get,
    /// Set the master volume.
    Set {
        #[arg(allow_negative_numbers = true, help = "Volume between 0 and 100")]
        value: i32,
    },
    /// Describe the native backend this invocation loaded.
    Info,
}

#[derive(Serialize)]
struct InfoReport {
    library: String,
    logical_name: String,
    extension: String,
    domain: u64,
    multi_domain: bool,
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    let options = options_from(&cli);
    let multi_domain = options.multi_domain;
    let control = VolumeControl::builder().options(options).build()?;

    match cli.command {
        Command::Get => {
            let volume = control.get_volume()?;
            if io::stdout().is_terminal() {
                println!("{volume}");
            } else {
                println!("{}", json!({ "volume": volume }));
            }
        }
        Command::Set { value } => {
            control.set_volume(value)?;
        }
        Command::Info => {
            let identity = LibraryIdentity::host();
            let report = InfoReport {
                library: control
                    .library_path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default(),
                logical_name: identity.logical_name,
                extension: identity.platform_extension.to_string(),
                domain: control.domain().map(IsolationDomain::id).unwrap_or_default(),
                multi_domain,
            };
            let json = serde_json::to_string(&report).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to encode info")
                    .with_source(err)
            })?;
            println!("{json}");
        }
    }
    Ok(())
}

fn options_from(cli: &Cli) -> VolumeControlOptions {
    VolumeControlOptions {
        directory: cli.dir.clone(),
        base_name: cli.name.clone(),
        multi_domain: cli.multi_domain,
        reuse: if cli.verify_existing {
            ReusePolicy::VerifyDigest
        } else {
            ReusePolicy::Trust
        },
        domain: None,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Io\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()))
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = std::error::Error::source(err);
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }
    causes
}
