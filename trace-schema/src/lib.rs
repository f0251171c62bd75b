//! Wire format and read-only views for a captured execution trace.
//!
//! A trace is a time-ordered sequence of [`schema::TraceEntry`] snapshots —
//! one per observable program step — each carrying its own globals, call
//! stack, and heap. This crate only describes and validates that shape; the
//! `js-tracer` crate is the thing that produces it.

pub mod model;
pub mod schema;
pub mod transforms;
pub mod tree;

pub use schema::{EncodedValue, EventKind, HeapTable, StackEntry, Trace, TraceEntry};
