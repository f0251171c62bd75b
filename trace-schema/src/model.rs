//! Read-only views for traversing a `Trace`, without dealing with its raw
//! vectors directly. Mirrors the wrapper-per-table pattern this crate
//! started from (`Sample`/`Stack`/`Frame` views over a columnar profile):
//! here the table is a flat `Vec<TraceEntry>`, and a `Step` plays the role
//! `Sample` used to.
//!
//! As an example, to find the function name at the top of the stack for a
//! given step index:
//!
//! ```no_run
//! # use trace_schema::schema::Trace;
//! # use trace_schema::model::Steps;
//! # let trace: Trace = todo!();
//! let step = Steps::new(&trace).get(3).unwrap();
//! let name: Option<&str> = step.top_frame().map(|f| f.func_name.as_str());
//! ```

use crate::schema::{EventKind, StackEntry, Trace, TraceEntry};

#[derive(Copy, Clone)]
pub struct Step<'t> {
    trace: &'t Trace,
    idx: usize,
}

impl<'t> Step<'t> {
    pub fn new(trace: &'t Trace, idx: usize) -> Self {
        Self { trace, idx }
    }

    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn entry(&self) -> &'t TraceEntry {
        &self.trace.trace[self.idx]
    }

    pub fn stack(&self) -> &'t [StackEntry] {
        &self.entry().stack_to_render
    }

    pub fn top_frame(&self) -> Option<&'t StackEntry> {
        self.stack().last()
    }

    pub fn previous(&self) -> Option<Step<'t>> {
        (self.idx > 0).then(|| Step::new(self.trace, self.idx - 1))
    }

    pub fn is_call(&self) -> bool {
        self.entry().event == EventKind::Call
    }

    pub fn is_return(&self) -> bool {
        self.entry().event == EventKind::Return
    }
}

/// A view over the whole sequence of steps in a trace.
pub struct Steps<'t> {
    trace: &'t Trace,
}

impl<'t> Steps<'t> {
    pub fn new(trace: &'t Trace) -> Self {
        Self { trace }
    }

    pub fn len(&self) -> usize {
        self.trace.trace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.trace.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<Step<'t>> {
        (idx < self.len()).then(|| Step::new(self.trace, idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = Step<'t>> + 't {
        let trace = self.trace;
        (0..trace.trace.len()).map(move |i| Step::new(trace, i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TraceEntry;

    fn empty_trace(events: Vec<EventKind>) -> Trace {
        Trace {
            code: String::new(),
            trace: events
                .into_iter()
                .map(|event| TraceEntry::terminal(event, String::new(), None))
                .collect(),
        }
    }

    #[test]
    fn steps_navigate_forward_and_back() {
        let trace = empty_trace(vec![EventKind::StepLine, EventKind::Call, EventKind::Return]);
        let steps = Steps::new(&trace);
        assert_eq!(steps.len(), 3);
        let call = steps.get(1).unwrap();
        assert!(call.is_call());
        assert_eq!(call.previous().unwrap().index(), 0);
        assert!(steps.get(3).is_none());
    }
}
