use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use js_tracer::output::{emit_json_to_stdout, emit_pretty_to_stdout, emit_to_file};
use js_tracer::{trace_source, TraceOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Traces the execution of a small JavaScript-like program, step by step.", long_about = None)]
struct TracerCli {
    /// Path to a file containing the user program. Mutually exclusive with `--inline-code`.
    #[arg(long)]
    file_path: Option<PathBuf>,

    /// The user program as a literal string. Mutually exclusive with `--file-path`.
    #[arg(long)]
    inline_code: Option<String>,

    /// Serialize `{code, trace}` as compact JSON to stdout.
    #[arg(long)]
    emit_json_to_stdout: bool,

    /// Serialize the same blob in a human-readable, deterministic form.
    #[arg(long)]
    emit_pretty_to_stdout: bool,

    /// Write `var trace = <json>;` to this path.
    #[arg(long)]
    emit_to_file: Option<PathBuf>,

    /// Step budget before the engine emits `instruction_limit_reached`.
    #[arg(long)]
    max_executed_lines: Option<usize>,

    /// Comma-separated override of the globals ignore list.
    #[arg(long, value_delimiter = ',')]
    global_ignore_list: Option<Vec<String>>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = TracerCli::parse();
    set_global_subscriber(cli.verbose);

    let source = match read_source(&cli) {
        Ok(source) => source,
        Err(message) => {
            error!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let options = TraceOptions {
        max_executed_lines: cli
            .max_executed_lines
            .or_else(|| env_usize("JS_TRACER_MAX_EXECUTED_LINES")),
        ignore_list: cli.global_ignore_list.or_else(|| {
            std::env::var("JS_TRACER_GLOBAL_IGNORE_LIST")
                .ok()
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
        }),
        script_name: None,
    };

    let trace = match trace_source(&source, options) {
        Ok(trace) => trace,
        Err(err) => {
            error!("internal invariant violated: {err}");
            return ExitCode::FAILURE;
        }
    };

    info!(steps = trace.trace.len(), "trace complete");

    let mut emitted_anything = false;
    if cli.emit_json_to_stdout {
        emitted_anything = true;
        if let Err(err) = emit_json_to_stdout(&trace) {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    }
    if cli.emit_pretty_to_stdout {
        emitted_anything = true;
        if let Err(err) = emit_pretty_to_stdout(&trace) {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    }
    if let Some(path) = &cli.emit_to_file {
        emitted_anything = true;
        if let Err(err) = emit_to_file(&trace, path) {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    }
    if !emitted_anything {
        if let Err(err) = emit_json_to_stdout(&trace) {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

fn read_source(cli: &TracerCli) -> Result<String, String> {
    match (&cli.file_path, &cli.inline_code) {
        (Some(_), Some(_)) => {
            Err("exactly one of --file-path / --inline-code must be provided, not both".into())
        }
        (Some(path), None) => std::fs::read_to_string(path)
            .map(|s| s.trim_end().to_string())
            .map_err(|e| format!("failed to read {}: {e}", path.display())),
        (None, Some(code)) => Ok(code.trim_end().to_string()),
        (None, None) => Err("exactly one of --file-path / --inline-code must be provided".into()),
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn set_global_subscriber(verbose: bool) {
    let default_filter = if verbose { "js_tracer=debug" } else { "js_tracer=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_file(false)
        .with_line_number(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
