//! Defines the visualizer's wire format.
//!
//! This was translated from the tagged-union trace format used by
//! OnlinePythonTutor-style execution visualizers. *Not* a columnar
//! profile format: every `TraceEntry` is a full, self-contained snapshot of
//! one program step, not an index into shared tables.
//!
//! # Data Model
//!
//! `globals`/`encoded_locals` hold primitives inline and compound values as
//! `["REF", id]`, with the full encoding of `id` stashed in that entry's
//! `heap` table. As an example, to find a global's class name (assuming it
//! is a plain object with a `__proto__` pair):
//!
//! ```no_run
//! # use trace_schema::schema::{Trace, TAG_REF};
//! # let trace: Trace = todo!();
//! let entry = &trace.trace[0];
//! let value = &entry.globals["obj"];
//! if let Some(arr) = value.as_array() {
//!     if arr.first().and_then(|t| t.as_str()) == Some(TAG_REF) {
//!         let id = arr[1].as_u64().unwrap();
//!         let _encoding = &entry.heap[&id];
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Small integer identifying a heap object for the lifetime of a trace.
pub type ObjectId = u64;

/// Small integer identifying one activation of a user function.
pub type FrameId = u64;

/// A JSON-serializable tagged representation of a runtime value: either a
/// primitive leaf or a `["REF", id]` pointer into a `HeapTable`.
///
/// `serde_json::Value` is used directly rather than a hand-rolled enum
/// because the wire forms are heterogeneous JSON arrays mixing tags,
/// strings, and numbers (`["JS_FUNCTION", name, body, props, null]`) — the
/// same shape a loosely-typed source tracer would naturally emit, and not
/// worth re-deriving a parallel Rust enum for.
pub type EncodedValue = Value;

/// Per-entry object id -> full encoding. Rebuilt fresh for every `TraceEntry`
/// (spec invariant: heap tables are per-snapshot, object ids persist).
pub type HeapTable = BTreeMap<ObjectId, EncodedValue>;

pub const TAG_REF: &str = "REF";
pub const TAG_SPECIAL_FLOAT: &str = "SPECIAL_FLOAT";
pub const TAG_JS_SPECIAL_VAL: &str = "JS_SPECIAL_VAL";
pub const TAG_JS_FUNCTION: &str = "JS_FUNCTION";
pub const TAG_LIST: &str = "LIST";
pub const TAG_INSTANCE: &str = "INSTANCE";
pub const TAG_INSTANCE_PPRINT: &str = "INSTANCE_PPRINT";

pub fn encode_ref(id: ObjectId) -> EncodedValue {
    serde_json::json!([TAG_REF, id])
}

pub fn encode_special_float(label: &str) -> EncodedValue {
    serde_json::json!([TAG_SPECIAL_FLOAT, label])
}

pub fn encode_js_special(label: &str) -> EncodedValue {
    serde_json::json!([TAG_JS_SPECIAL_VAL, label])
}

/// The kind of step the stepping engine observed at a break. Serializes to
/// the exact event-tag strings spec.md names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StepLine,
    Call,
    Return,
    Exception,
    UncaughtException,
    InstructionLimitReached,
}

/// One live user frame, ordered bottom-of-stack first within
/// `TraceEntry::stack_to_render`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackEntry {
    pub func_name: String,
    pub frame_id: FrameId,
    pub is_highlighted: bool,
    pub is_parent: bool,
    pub is_zombie: bool,
    pub parent_frame_id_list: Vec<FrameId>,
    pub unique_hash: String,
    pub ordered_varnames: Vec<String>,
    pub encoded_locals: BTreeMap<String, EncodedValue>,
}

impl StackEntry {
    pub fn new(func_name: String, frame_id: FrameId, is_highlighted: bool) -> Self {
        Self {
            unique_hash: format!("{func_name}_f{frame_id}"),
            func_name,
            frame_id,
            is_highlighted,
            is_parent: false,
            is_zombie: false,
            parent_frame_id_list: Vec::new(),
            ordered_varnames: Vec::new(),
            encoded_locals: BTreeMap::new(),
        }
    }

    /// Inserts a local binding, keeping `ordered_varnames` and
    /// `encoded_locals` in sync (spec invariant: the two always agree on
    /// key set and first-insertion order).
    pub fn push_local(&mut self, name: impl Into<String>, value: EncodedValue) {
        let name = name.into();
        if !self.encoded_locals.contains_key(&name) {
            self.ordered_varnames.push(name.clone());
        }
        self.encoded_locals.insert(name, value);
    }
}

/// One record in the output sequence: a single observable program step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub event: EventKind,
    pub line: i64,
    pub col: i64,
    pub func_name: String,
    pub stdout: String,
    pub globals: BTreeMap<String, EncodedValue>,
    pub ordered_globals: Vec<String>,
    pub stack_to_render: Vec<StackEntry>,
    pub heap: HeapTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_msg: Option<String>,
}

impl TraceEntry {
    /// An entry carrying only an event tag and (optionally) an exception
    /// message — used for the `instruction_limit_reached` terminal entry.
    pub fn terminal(event: EventKind, stdout: String, exception_msg: Option<String>) -> Self {
        Self {
            event,
            line: 0,
            col: 0,
            func_name: String::new(),
            stdout,
            globals: BTreeMap::new(),
            ordered_globals: Vec::new(),
            stack_to_render: Vec::new(),
            heap: HeapTable::new(),
            exception_msg,
        }
    }

    pub fn push_global(&mut self, name: impl Into<String>, value: EncodedValue) {
        let name = name.into();
        if !self.globals.contains_key(&name) {
            self.ordered_globals.push(name.clone());
        }
        self.globals.insert(name, value);
    }
}

/// Top-level output blob: `{ "code": ..., "trace": [...] }` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub code: String,
    pub trace: Vec<TraceEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_entry_keeps_ordered_varnames_in_sync() {
        let mut frame = StackEntry::new("f".into(), 1, true);
        frame.push_local("b", Value::from(2));
        frame.push_local("a", Value::from(1));
        frame.push_local("b", Value::from(20));
        assert_eq!(frame.ordered_varnames, vec!["b", "a"]);
        assert_eq!(frame.encoded_locals["b"], Value::from(20));
        assert_eq!(frame.unique_hash, "f_f1");
    }

    #[test]
    fn terminal_entry_round_trips() {
        let entry = TraceEntry::terminal(
            EventKind::InstructionLimitReached,
            "out".into(),
            Some("stopped".into()),
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: TraceEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event, EventKind::InstructionLimitReached);
        assert_eq!(back.exception_msg.as_deref(), Some("stopped"));
    }
}
