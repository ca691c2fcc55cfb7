//! Purpose: `refworker` entry point: parse flags, start logging, serve stdin to stdout.
//! Role: Binary crate root; the only place process exit codes are decided.
//! Invariants: Stdout carries protocol responses only; diagnostics and logs go to stderr.
//! Invariants: Process exit code is derived from `to_exit_code`.
use std::io::{self, BufReader, BufWriter};

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use tracing::info;
use tracing_subscriber::EnvFilter;

use refworker::api::{Dispatcher, Error, ErrorKind, Worker, WorkerConfig, serve, to_exit_code};

const LOG_ENV: &str = "REFWORKER_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "refworker",
    version,
    about = "Line-delimited JSON call worker with handle-based results",
    long_about = None,
    after_help = r#"PROTOCOL
  One JSON request per stdin line; one JSON response per stdout line.
  Request types: call, getattr, del, ping.

EXAMPLES
  $ echo '{"id":"1","type":"call","target":"math","method":"sqrt","args":[16]}' | refworker
  {"id":"1","type":"value","value":4.0,"ref":null,"error":null}"#
)]
struct Cli {
    #[arg(
        long,
        value_name = "FILTER",
        help = "Log filter for stderr output (default: $REFWORKER_LOG, $RUST_LOG, or warn)"
    )]
    log_level: Option<String>,
    #[arg(long, help = "Reject unrecognized request types instead of treating them as call")]
    strict_types: bool,
    #[arg(long, help = "Disable loading file-path targets as units")]
    no_file_units: bool,
    #[arg(
        long,
        value_name = "EXT",
        default_value = "json",
        help = "File extension (without dot) that marks a target as a unit path"
    )]
    unit_extension: String,
    #[arg(
        long,
        value_name = "N",
        default_value_t = 200,
        help = "Maximum characters of rendering included in handle descriptors"
    )]
    repr_limit: usize,
}

impl Cli {
    fn config(&self) -> WorkerConfig {
        WorkerConfig {
            strict_types: self.strict_types,
            file_units: !self.no_file_units,
            unit_extension: self.unit_extension.clone(),
            repr_limit: self.repr_limit,
        }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                return Ok(0);
            }
            _ => {
                let rendered = err.to_string();
                let summary = rendered.lines().next().unwrap_or_default();
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(summary.trim_start_matches("error: ").to_string()));
            }
        },
    };

    init_tracing(cli.log_level.as_deref())?;
    let config = cli.config();
    config.validate()?;

    let mut dispatcher =
        Dispatcher::new(Worker::new(&config)).with_policy(config.type_policy());
    info!(
        strict_types = config.strict_types,
        file_units = config.file_units,
        unit_extension = %config.unit_extension,
        "worker started"
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    let summary = serve(
        &mut dispatcher,
        BufReader::new(stdin.lock()),
        BufWriter::new(stdout.lock()),
    )?;
    info!(
        requests = summary.requests,
        errors = summary.errors,
        refs_remaining = dispatcher.handler().store().size(),
        "input closed, worker exiting"
    );
    Ok(0)
}

fn init_tracing(level: Option<&str>) -> Result<(), Error> {
    let filter = match level {
        Some(directives) => EnvFilter::try_new(directives).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid --log-level '{directives}'"))
                .with_source(err)
        })?,
        None => EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message(format!("failed to initialize logging: {err}"))
        })
}

fn emit_error(err: &Error) {
    eprintln!("error: {}", error_message(err));
    if let Some(path) = err.path() {
        eprintln!("path: {}", path.display());
    }
    let mut cause = std::error::Error::source(err);
    while let Some(inner) = cause {
        eprintln!("caused by: {inner}");
        cause = inner.source();
    }
}

fn error_message(err: &Error) -> String {
    if err.message().is_empty() {
        err.category().to_string()
    } else {
        err.message().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn defaults_match_protocol_behavior() {
        let cli = Cli::try_parse_from(["refworker"]).expect("parse");
        let config = cli.config();
        assert!(!config.strict_types);
        assert!(config.file_units);
        assert_eq!(config.unit_extension, "json");
        assert_eq!(config.repr_limit, 200);
    }

    #[test]
    fn flags_populate_config() {
        let cli = Cli::try_parse_from([
            "refworker",
            "--strict-types",
            "--no-file-units",
            "--unit-extension",
            "unit",
            "--repr-limit",
            "40",
        ])
        .expect("parse");
        let config = cli.config();
        assert!(config.strict_types);
        assert!(!config.file_units);
        assert_eq!(config.unit_extension, "unit");
        assert_eq!(config.repr_limit, 40);
    }
}
