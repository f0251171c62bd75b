//! A tree-walking execution tracer for a small JavaScript-like language,
//! producing the step-by-step trace format `trace-schema` defines.

pub mod ast;
pub mod encoder;
pub mod engine;
pub mod env;
pub mod error;
pub mod identity;
pub mod interpreter;
pub mod lexer;
pub mod output;
pub mod parser;
pub mod source_wrapper;
pub mod stdout_capture;
pub mod value;

use trace_schema::schema::Trace;

use crate::engine::StepEngine;
use crate::error::TracerError;
use crate::interpreter::Interpreter;
use crate::stdout_capture::StdoutCapture;

/// Knobs the CLI (or a test harness) can override; `None` means "use the
/// built-in default" at every layer.
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    pub max_executed_lines: Option<usize>,
    pub ignore_list: Option<Vec<String>>,
    pub script_name: Option<String>,
}

/// Runs the full pipeline (C1 → parse → interpret/C5 → finalize) over one
/// source string and returns the finished blob, or the `uncaught_exception`
/// disposition spec §7 mandates for a parse failure.
///
/// On parse failure the source is re-parsed unwrapped, purely to recover a
/// prelude-free line/col (see DESIGN.md, "independent re-parse").
pub fn trace_source(source: &str, options: TraceOptions) -> Result<Trace, TracerError> {
    let script_name = options
        .script_name
        .unwrap_or_else(|| source_wrapper::DEFAULT_SCRIPT_NAME.to_string());
    let wrapped = source_wrapper::wrap(source, script_name.clone());

    let program = match parser::parse(&wrapped.text) {
        Ok(program) => program,
        Err(_) => {
            let unwrapped_err = parser::parse(source.trim_end()).unwrap_err();
            return Ok(parse_failure_trace(source, unwrapped_err));
        }
    };

    let stdout = StdoutCapture::new();
    let mut engine = StepEngine::new(
        source.to_string(),
        script_name.clone(),
        stdout.clone(),
        options.max_executed_lines,
        options.ignore_list,
    );

    {
        let mut interpreter = Interpreter::new(script_name, stdout.clone(), &mut engine);
        interpreter.run(&program);
    }
    stdout.borrow_mut().release();

    Ok(engine.finish())
}

fn parse_failure_trace(source: &str, err: error::ParseError) -> Trace {
    use trace_schema::schema::{EventKind, TraceEntry};
    let mut entry = TraceEntry::terminal(
        EventKind::UncaughtException,
        String::new(),
        Some(err.to_string()),
    );
    entry.line = err.line as i64;
    entry.col = err.col as i64;
    Trace {
        code: source.to_string(),
        trace: vec![entry],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traces_three_var_decls_end_to_end() {
        let trace = trace_source("var x=1; var y=2; var z=x+y;", TraceOptions::default()).unwrap();
        let last = trace.trace.last().unwrap();
        assert_eq!(last.globals["z"], serde_json::json!(3));
        assert_eq!(last.ordered_globals, vec!["x", "y", "z"]);
    }

    #[test]
    fn syntax_error_produces_single_uncaught_exception_entry() {
        let trace = trace_source("var bad = (;", TraceOptions::default()).unwrap();
        assert_eq!(trace.trace.len(), 1);
        assert_eq!(
            trace.trace[0].event,
            trace_schema::schema::EventKind::UncaughtException
        );
    }
}
