//! Trace-level transforms: the finalizer postprocessing step from spec §7
//! and the structural invariant checks from spec §8.
//!
//! Adapted from the stack-table rewriting passes this crate started from
//! (`collapse_frames`, `merge_function`, ...): those rewrote a shared
//! profiler stack table in place; here there is no shared table to rewrite,
//! only a flat, already-materialized sequence of per-entry snapshots, so
//! the transforms operate directly on `Trace` instead of index-remapping a
//! `RawStackTable`.

use std::collections::HashSet;

use thiserror::Error;

use crate::model::Steps;
use crate::schema::{EventKind, Trace, TraceEntry, TAG_REF};

/// Finalizer step (b): drop a trailing `return` entry whose rendered stack
/// is empty — the cosmetic synthetic top-level return (spec §7; spec §9
/// open question 2 says to follow the length-zero interpretation literally).
pub fn drop_trailing_empty_return(trace: &mut Trace) {
    if let Some(last) = trace.trace.last() {
        if last.event == EventKind::Return && last.stack_to_render.is_empty() {
            trace.trace.pop();
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("entry {0}: globals keys do not match ordered_globals")]
    GlobalsOrderMismatch(usize),
    #[error("entry {entry}: stack frame {frame} locals do not match ordered_varnames")]
    LocalsOrderMismatch { entry: usize, frame: usize },
    #[error("entry {entry}: stack frame {frame} has unique_hash {got:?}, expected {expected:?}")]
    UniqueHashMismatch {
        entry: usize,
        frame: usize,
        got: String,
        expected: String,
    },
    #[error("entry {0}: call event did not grow the stack by exactly one frame over the prior entry, with the lower frames unchanged")]
    CallStackGrowthMismatch(usize),
    #[error("entry {entry}: heap reference {object_id} has no matching heap entry")]
    DanglingReference { entry: usize, object_id: u64 },
}

/// Checks the spec §8 quantified invariants that are derivable purely from
/// a serialized trace. (Object-id reuse across the whole run and
/// round-trip/idempotence require the live identity registry or two full
/// runs; those are exercised as integration tests in `js-tracer` instead.)
pub fn validate_invariants(trace: &Trace) -> Result<(), ValidationError> {
    let steps = Steps::new(trace);
    for step in steps.iter() {
        let idx = step.index();
        let entry = step.entry();

        check_ordered_keys(
            entry.globals.keys().map(String::as_str),
            entry.ordered_globals.iter().map(String::as_str),
        )
        .then_some(())
        .ok_or(ValidationError::GlobalsOrderMismatch(idx))?;

        for (frame_idx, frame) in entry.stack_to_render.iter().enumerate() {
            let expected_hash = format!("{}_f{}", frame.func_name, frame.frame_id);
            if frame.unique_hash != expected_hash {
                return Err(ValidationError::UniqueHashMismatch {
                    entry: idx,
                    frame: frame_idx,
                    got: frame.unique_hash.clone(),
                    expected: expected_hash,
                });
            }

            check_ordered_keys(
                frame.encoded_locals.keys().map(String::as_str),
                frame.ordered_varnames.iter().map(String::as_str),
            )
            .then_some(())
            .ok_or(ValidationError::LocalsOrderMismatch {
                entry: idx,
                frame: frame_idx,
            })?;
        }

        if entry.event == EventKind::Call {
            if let Some(prev) = step.previous() {
                let prev_stack = prev.stack();
                let cur_stack = step.stack();
                let grows = cur_stack.len() == prev_stack.len() + 1;
                let prefix_matches = grows
                    && cur_stack[..prev_stack.len()]
                        .iter()
                        .zip(prev_stack)
                        .all(|(a, b)| a.frame_id == b.frame_id && a.func_name == b.func_name);
                if !prefix_matches {
                    return Err(ValidationError::CallStackGrowthMismatch(idx));
                }
            }
        }

        check_no_dangling_refs(entry, idx)?;
    }
    Ok(())
}

fn check_ordered_keys<'a>(
    keys: impl Iterator<Item = &'a str>,
    ordered: impl Iterator<Item = &'a str>,
) -> bool {
    let keys: HashSet<&str> = keys.collect();
    let ordered: Vec<&str> = ordered.collect();
    let ordered_set: HashSet<&str> = ordered.iter().copied().collect();
    keys == ordered_set && ordered.len() == ordered_set.len()
}

fn collect_refs(value: &serde_json::Value, out: &mut Vec<u64>) {
    match value {
        serde_json::Value::Array(items) => {
            if items.len() == 2 {
                if let (Some(tag), Some(id)) = (items[0].as_str(), items[1].as_u64()) {
                    if tag == TAG_REF {
                        out.push(id);
                        return;
                    }
                }
            }
            for item in items {
                collect_refs(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                collect_refs(v, out);
            }
        }
        _ => {}
    }
}

fn check_no_dangling_refs(entry: &TraceEntry, idx: usize) -> Result<(), ValidationError> {
    let mut refs = Vec::new();
    for value in entry.globals.values() {
        collect_refs(value, &mut refs);
    }
    for frame in &entry.stack_to_render {
        for value in frame.encoded_locals.values() {
            collect_refs(value, &mut refs);
        }
    }
    for value in entry.heap.values() {
        collect_refs(value, &mut refs);
    }
    for object_id in refs {
        if !entry.heap.contains_key(&object_id) {
            return Err(ValidationError::DanglingReference { entry: idx, object_id });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StackEntry;
    use serde_json::json;

    #[test]
    fn drops_trailing_empty_return_only() {
        let mut trace = Trace {
            code: String::new(),
            trace: vec![
                TraceEntry::terminal(EventKind::StepLine, String::new(), None),
                TraceEntry::terminal(EventKind::Return, String::new(), None),
            ],
        };
        drop_trailing_empty_return(&mut trace);
        assert_eq!(trace.trace.len(), 1);

        let mut trace_with_frame = Trace {
            code: String::new(),
            trace: vec![{
                let mut entry = TraceEntry::terminal(EventKind::Return, String::new(), None);
                entry.stack_to_render.push(StackEntry::new("f".into(), 1, true));
                entry
            }],
        };
        drop_trailing_empty_return(&mut trace_with_frame);
        assert_eq!(trace_with_frame.trace.len(), 1);
    }

    #[test]
    fn detects_dangling_reference() {
        let mut entry = TraceEntry::terminal(EventKind::StepLine, String::new(), None);
        entry.push_global("a", json!(["REF", 7]));
        let trace = Trace {
            code: String::new(),
            trace: vec![entry],
        };
        assert_eq!(
            validate_invariants(&trace),
            Err(ValidationError::DanglingReference {
                entry: 0,
                object_id: 7
            })
        );
    }

    #[test]
    fn accepts_resolved_reference() {
        let mut entry = TraceEntry::terminal(EventKind::StepLine, String::new(), None);
        entry.push_global("a", json!(["REF", 7]));
        entry.heap.insert(7, json!(["LIST", 1, 2]));
        let trace = Trace {
            code: String::new(),
            trace: vec![entry],
        };
        assert_eq!(validate_invariants(&trace), Ok(()));
    }
}
