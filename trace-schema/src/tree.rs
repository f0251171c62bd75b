//! Deterministic, human-readable rendering of a trace's call structure —
//! backs the `emit-pretty-to-stdout` output option (spec §6), which must be
//! stable across runs for regression diffing.
//!
//! Adapted from the firefox-profiler call-tree builder this crate started
//! from: instead of aggregating sampled stacks by CPU weight, each node
//! aggregates the number of steps spent with that call site highlighted
//! (i.e. at the top of the stack).

use std::fmt::{self, Display};

use crate::model::Steps;
use crate::schema::{EventKind, Trace};

#[derive(Debug, Default)]
pub struct Tree {
    pub children: Vec<Node>,
}

#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub steps: u64,
    pub subtree: Tree,
}

impl Tree {
    pub fn from_trace(trace: &Trace) -> Self {
        let mut tree = Tree::default();

        for step in Steps::new(trace).iter() {
            let entry = step.entry();
            if entry.event == EventKind::InstructionLimitReached {
                continue;
            }

            let mut cursor = &mut tree;
            for frame in &entry.stack_to_render {
                let position = cursor
                    .children
                    .iter()
                    .position(|node| node.name == frame.func_name);
                let position = match position {
                    Some(position) => position,
                    None => {
                        cursor.children.push(Node {
                            name: frame.func_name.clone(),
                            steps: 0,
                            subtree: Tree::default(),
                        });
                        cursor.children.len() - 1
                    }
                };

                if frame.is_highlighted {
                    cursor.children[position].steps += 1;
                }
                cursor = &mut cursor.children[position].subtree;
            }
        }

        tree
    }
}

/// Renders like:
///
/// ```text
/// main (4 steps)
/// └─ factorial (3 steps)
///    └─ factorial (constructor) (1 steps)
/// ```
impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn inner(f: &mut fmt::Formatter<'_>, node: &Node, prefix: &str, marker: &str) -> fmt::Result {
            writeln!(f, "{prefix}{marker}{} ({} steps)", node.name, node.steps)?;

            let new_prefix = format!(
                "{prefix}{}",
                if marker.is_empty() {
                    ""
                } else if marker == "├─ " {
                    "│  "
                } else {
                    "   "
                }
            );

            let mut children = node.subtree.children.iter().peekable();
            while let Some(child) = children.next() {
                let new_marker = if children.peek().is_none() {
                    "└─ "
                } else {
                    "├─ "
                };
                inner(f, child, &new_prefix, new_marker)?;
            }
            Ok(())
        }

        for child in &self.children {
            inner(f, child, "", "")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{StackEntry, TraceEntry};

    #[test]
    fn builds_nested_call_tree() {
        let mut call_entry = TraceEntry::terminal(EventKind::Call, String::new(), None);
        call_entry
            .stack_to_render
            .push(StackEntry::new("main".into(), 1, false));
        call_entry
            .stack_to_render
            .push(StackEntry::new("helper".into(), 2, true));

        let trace = Trace {
            code: String::new(),
            trace: vec![call_entry],
        };

        let tree = Tree::from_trace(&trace);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "main");
        assert_eq!(tree.children[0].subtree.children[0].name, "helper");
        assert_eq!(tree.children[0].subtree.children[0].steps, 1);

        let rendered = tree.to_string();
        assert!(rendered.contains("main (0 steps)"));
        assert!(rendered.contains("└─ helper (1 steps)"));
    }
}
