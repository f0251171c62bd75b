//! The three emission modes spec §6 names. All three consume the same
//! [`Trace`] blob the finalizer hands back — nothing here touches the
//! interpreter or the engine.

use std::fmt;
use std::fs;
use std::io::{self, Write as _};
use std::path::Path;

use trace_schema::schema::Trace;
use trace_schema::tree::Tree;

#[derive(Debug)]
pub enum OutputError {
    Serialize(serde_json::Error),
    Io(io::Error),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Serialize(e) => write!(f, "failed to serialize trace: {e}"),
            OutputError::Io(e) => write!(f, "failed to write output: {e}"),
        }
    }
}

impl std::error::Error for OutputError {}

impl From<serde_json::Error> for OutputError {
    fn from(e: serde_json::Error) -> Self {
        OutputError::Serialize(e)
    }
}

impl From<io::Error> for OutputError {
    fn from(e: io::Error) -> Self {
        OutputError::Io(e)
    }
}

/// `emit-json-to-stdout`: compact `{code, trace}` JSON, one line, no trailing
/// newline dependency for downstream diffing tools.
pub fn emit_json_to_stdout(trace: &Trace) -> Result<(), OutputError> {
    let json = serde_json::to_string(trace)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(json.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

/// `emit-pretty-to-stdout`: a deterministic, human-readable rendering for
/// regression diffing — the call tree followed by one line per trace entry.
pub fn emit_pretty_to_stdout(trace: &Trace) -> Result<(), OutputError> {
    let rendered = render_pretty(trace);
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(rendered.as_bytes())?;
    Ok(())
}

fn render_pretty(trace: &Trace) -> String {
    let mut out = String::new();
    out.push_str(&Tree::from_trace(trace).to_string());
    out.push('\n');
    for (i, entry) in trace.trace.iter().enumerate() {
        out.push_str(&format!(
            "{i:>4}: {:?} {}:{} func={:?} globals={:?}\n",
            entry.event, entry.line, entry.col, entry.func_name, entry.ordered_globals
        ));
        if let Some(msg) = &entry.exception_msg {
            out.push_str(&format!("      exception_msg={msg:?}\n"));
        }
    }
    out
}

/// `emit-to-file <path>`: writes `var trace = <json>;`, the form the
/// browser-side visualizer `<script>`-includes directly.
pub fn emit_to_file(trace: &Trace, path: &Path) -> Result<(), OutputError> {
    let json = serde_json::to_string(trace)?;
    let contents = format!("var trace = {json};");
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_schema::schema::{EventKind, TraceEntry};

    fn sample_trace() -> Trace {
        let mut entry = TraceEntry::terminal(EventKind::StepLine, String::new(), None);
        entry.line = 1;
        entry.col = 1;
        entry.func_name = "<module>".into();
        entry.push_global("x", serde_json::json!(1));
        Trace {
            code: "var x=1;".into(),
            trace: vec![entry],
        }
    }

    #[test]
    fn pretty_rendering_includes_globals_and_tree() {
        let trace = sample_trace();
        let rendered = render_pretty(&trace);
        assert!(rendered.contains("globals=[\"x\"]"));
    }

    #[test]
    fn emit_to_file_wraps_json_in_var_assignment() {
        let trace = sample_trace();
        let dir = std::env::temp_dir().join(format!("js_tracer_output_test_{}", std::process::id()));
        emit_to_file(&trace, &dir).unwrap();
        let contents = fs::read_to_string(&dir).unwrap();
        assert!(contents.starts_with("var trace = {"));
        assert!(contents.ends_with("};"));
        fs::remove_file(&dir).unwrap();
    }
}
