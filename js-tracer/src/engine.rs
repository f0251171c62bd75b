//! Stepping Engine (C5): the debugger-listener half of the system. Consumes
//! breaks the interpreter raises through [`DebugHook`] and turns each one
//! into zero or one [`TraceEntry`], implementing spec §4.5's twelve-step
//! per-event procedure.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use trace_schema::schema::{EventKind, FrameId, StackEntry, Trace, TraceEntry};

use crate::encoder::Encoder;
use crate::env::Env;
use crate::identity::IdentityRegistry;
use crate::interpreter::Frame;
use crate::stdout_capture::StdoutCapture;
use crate::value::Value;

/// What a real single-step debugger API would hand a listener directly
/// (`isAtReturn`, exception state) rather than making it infer both from
/// raw position data — see SPEC_FULL.md's C5 elaboration.
pub struct BreakContext<'a> {
    pub script: &'a str,
    pub line0: u32,
    pub col: u32,
    pub frames: &'a [Frame],
    pub is_return: bool,
    pub is_exception: bool,
    pub exception_msg: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    StepIn,
    StepOut,
    /// The step budget was exceeded; the caller must unwind unconditionally.
    Abort,
}

pub trait DebugHook {
    fn on_break(&mut self, ctx: BreakContext) -> StepAction;
}

const DEFAULT_MAX_EXECUTED_LINES: usize = 300;

pub fn default_ignore_list() -> Vec<String> {
    let mut list: Vec<String> = crate::interpreter::INTRINSIC_GLOBALS
        .iter()
        .map(|s| s.to_string())
        .collect();
    list.extend(
        [
            "Buffer",
            "setTimeout",
            "setInterval",
            "setImmediate",
            "clearTimeout",
            "clearInterval",
            "clearImmediate",
            "process",
            "global",
            "module",
            "exports",
            "__dirname",
            "__filename",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    list
}

pub struct StepEngine {
    registry: IdentityRegistry,
    trace: Vec<TraceEntry>,
    prev_canonical_stack: Option<Vec<FrameId>>,
    max_executed_lines: usize,
    ignore_list: HashSet<String>,
    canonical_script: String,
    stdout: Rc<RefCell<StdoutCapture>>,
    code: String,
    halted: bool,
}

enum ScopeKind {
    Local,
    Catch,
    Closure,
    Global,
}

impl StepEngine {
    pub fn new(
        code: impl Into<String>,
        canonical_script: impl Into<String>,
        stdout: Rc<RefCell<StdoutCapture>>,
        max_executed_lines: Option<usize>,
        ignore_list: Option<Vec<String>>,
    ) -> Self {
        StepEngine {
            registry: IdentityRegistry::new(),
            trace: Vec::new(),
            prev_canonical_stack: None,
            max_executed_lines: max_executed_lines.unwrap_or(DEFAULT_MAX_EXECUTED_LINES),
            ignore_list: ignore_list.unwrap_or_else(default_ignore_list).into_iter().collect(),
            canonical_script: canonical_script.into(),
            stdout,
            code: code.into(),
            halted: false,
        }
    }

    /// Consumes the engine, applying the finalizer's trailing-return drop
    /// (spec §7(c)) and handing back the completed blob.
    pub fn finish(mut self) -> Trace {
        let mut trace = Trace {
            code: self.code.clone(),
            trace: std::mem::take(&mut self.trace),
        };
        trace_schema::transforms::drop_trailing_empty_return(&mut trace);
        trace
    }

    fn classify_scopes(env: &Env) -> Vec<(ScopeKind, Env)> {
        let mut out = Vec::new();
        let mut crossed_boundary = false;
        for scope_env in env.chain() {
            let (is_function_scope, is_catch_scope, is_root) = {
                let scope = scope_env.0.borrow();
                (scope.is_function_scope, scope.is_catch_scope, scope.parent.is_none())
            };
            if is_root {
                out.push((ScopeKind::Global, scope_env));
            } else if !crossed_boundary && is_catch_scope {
                out.push((ScopeKind::Catch, scope_env));
            } else if !crossed_boundary && is_function_scope {
                out.push((ScopeKind::Local, scope_env));
                crossed_boundary = true;
            } else {
                out.push((ScopeKind::Closure, scope_env));
            }
        }
        out
    }

    fn record_entry(&mut self, ctx: &BreakContext, mut line: i64) -> StepAction {
        if ctx.frames.is_empty() {
            return StepAction::StepIn;
        }

        let canon_stack: Vec<FrameId> = ctx
            .frames
            .iter()
            .rev()
            .map(|f| self.registry.canonicalize_frame(f.raw_id))
            .collect();

        let top = ctx.frames.last().expect("checked non-empty above");

        let mut event = EventKind::StepLine;
        if let Some(prev) = &self.prev_canonical_stack {
            if prev.len() + 1 == canon_stack.len() && canon_stack[1..] == prev[..] {
                event = EventKind::Call;
            }
        }
        if top.at_return {
            event = EventKind::Return;
        }
        if ctx.is_exception {
            event = EventKind::Exception;
        }

        if event == EventKind::Return {
            if let Some(prev_entry) = self.trace.last() {
                if let Some(prev_top) = prev_entry.stack_to_render.last() {
                    if prev_top.frame_id == canon_stack[0] {
                        line = prev_entry.line;
                    }
                }
            }
        }

        let stdout_snapshot = self.stdout.borrow().snapshot();
        let mut entry = TraceEntry {
            event,
            line,
            col: ctx.col as i64,
            func_name: top.func_name.clone(),
            stdout: stdout_snapshot,
            globals: BTreeMap::new(),
            ordered_globals: Vec::new(),
            stack_to_render: Vec::new(),
            heap: BTreeMap::new(),
            exception_msg: ctx.exception_msg.clone(),
        };

        let mut encoder = Encoder::new(&mut self.registry);

        // Step 9: globals — Global and Catch scopes of the top frame feed
        // `globals`, not just the module scope (spec §4.5 step 9).
        for (kind, scope_env) in Self::classify_scopes(&top.env) {
            if !matches!(kind, ScopeKind::Global | ScopeKind::Catch) {
                continue;
            }
            let (order, vars) = {
                let scope = scope_env.0.borrow();
                (scope.order.clone(), scope.vars.clone())
            };
            for name in order {
                if self.ignore_list.contains(&name) {
                    continue;
                }
                let value = vars.get(&name).cloned().unwrap_or(Value::Undefined);
                entry.push_global(name, encoder.encode(&value));
            }
        }

        // Step 10: per-frame locals, skipping the outermost wrapper frame.
        for frame in ctx.frames.iter().skip(1) {
            let frame_id = encoder.registry.canonicalize_frame(frame.raw_id);
            let mut func_name = frame.func_name.clone();
            if frame.is_constructor {
                func_name.push_str(" (constructor)");
            }
            let is_highlighted = std::ptr::eq(frame, top);
            let mut stack_entry = StackEntry::new(func_name, frame_id, is_highlighted);

            if let Some(receiver @ Value::Object(_)) = &frame.receiver {
                let encoded = encoder.encode(receiver);
                stack_entry.push_local("this", encoded);
            }

            let mut closure_depth = 0u32;
            for (kind, scope_env) in Self::classify_scopes(&frame.env) {
                match kind {
                    ScopeKind::Local | ScopeKind::Catch => {
                        let (order, vars) = {
                            let scope = scope_env.0.borrow();
                            (scope.order.clone(), scope.vars.clone())
                        };
                        for name in order {
                            let value = vars.get(&name).cloned().unwrap_or(Value::Undefined);
                            let encoded = encoder.encode(&value);
                            stack_entry.push_local(name, encoded);
                        }
                    }
                    ScopeKind::Closure => {
                        closure_depth += 1;
                        let prefix = if closure_depth == 1 {
                            "parent:".to_string()
                        } else {
                            format!("parent{closure_depth}:")
                        };
                        let (order, vars) = {
                            let scope = scope_env.0.borrow();
                            (scope.order.clone(), scope.vars.clone())
                        };
                        for name in order {
                            let value = vars.get(&name).cloned().unwrap_or(Value::Undefined);
                            let encoded = encoder.encode(&value);
                            stack_entry.push_local(format!("{prefix}{name}"), encoded);
                        }
                    }
                    ScopeKind::Global => {}
                }
            }

            if frame.at_return {
                let return_value = if frame.is_constructor {
                    frame.receiver.clone().unwrap_or(Value::Undefined)
                } else {
                    frame.return_value.clone().unwrap_or(Value::Undefined)
                };
                let encoded = encoder.encode(&return_value);
                stack_entry.push_local("__return__", encoded);
            }

            entry.stack_to_render.push(stack_entry);
        }

        entry.heap = encoder.heap;

        // Step 11: frame-return accounting happens after the entry is fully
        // built, so the just-returned activation keeps its ID for this
        // entry (spec §9).
        if top.at_return {
            self.registry.record_frame_return(top.raw_id);
        }

        self.trace.push(entry);
        self.prev_canonical_stack = Some(canon_stack);

        if self.trace.len() >= self.max_executed_lines {
            let msg = format!(
                "(stopped after {} steps to prevent possible infinite loop)",
                self.max_executed_lines
            );
            self.trace.push(TraceEntry::terminal(
                EventKind::InstructionLimitReached,
                self.stdout.borrow().snapshot(),
                Some(msg),
            ));
            self.halted = true;
            return StepAction::Abort;
        }

        StepAction::StepIn
    }
}

impl DebugHook for StepEngine {
    fn on_break(&mut self, mut ctx: BreakContext) -> StepAction {
        if self.halted {
            return StepAction::Abort;
        }

        let line = ctx.line0 as i64 + 1 - crate::source_wrapper::PRELUDE_LINES as i64;

        // Step 2: user-code gate.
        if ctx.script != self.canonical_script {
            if ctx.is_exception && !self.trace.is_empty() {
                let (prev_line, prev_col) = {
                    let prev = self.trace.last().unwrap();
                    (prev.line, prev.col)
                };
                ctx.col = prev_col as u32;
                let action = self.record_entry(&ctx, prev_line);
                return if action == StepAction::Abort { action } else { StepAction::StepOut };
            }
            return StepAction::StepOut;
        }

        // Step 3: the synthetic `debugger;` marker.
        if line == 0 {
            return StepAction::StepIn;
        }

        self.record_entry(&ctx, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::interpreter::Frame;
    use crate::stdout_capture::StdoutCapture;

    fn module_frame() -> Frame {
        Frame {
            raw_id: 0,
            func_name: "<module>".into(),
            env: Env::new_global(),
            receiver: None,
            is_constructor: false,
            at_return: false,
            return_value: None,
        }
    }

    #[test]
    fn step_line_emits_no_entry_at_debugger_marker() {
        let stdout = StdoutCapture::new();
        let mut engine = StepEngine::new("code", "userscript", stdout, None, None);
        let frames = vec![module_frame()];
        let action = engine.on_break(BreakContext {
            script: "userscript",
            line0: 1,
            col: 1,
            frames: &frames,
            is_return: false,
            is_exception: false,
            exception_msg: None,
        });
        assert_eq!(action, StepAction::StepIn);
        assert!(engine.trace.is_empty());
    }

    #[test]
    fn records_a_step_line_entry_with_globals() {
        let global = Env::new_global();
        global.declare_var("x", Some(Value::Number(1.0)));
        let stdout = StdoutCapture::new();
        let mut engine = StepEngine::new("code", "userscript", stdout, None, None);
        let frame = Frame {
            raw_id: 0,
            func_name: "<module>".into(),
            env: global,
            receiver: None,
            is_constructor: false,
            at_return: false,
            return_value: None,
        };
        let frames = vec![frame];
        engine.on_break(BreakContext {
            script: "userscript",
            line0: 3,
            col: 1,
            frames: &frames,
            is_return: false,
            is_exception: false,
            exception_msg: None,
        });
        assert_eq!(engine.trace.len(), 1);
        assert_eq!(engine.trace[0].ordered_globals, vec!["x"]);
    }

    #[test]
    fn instruction_limit_emits_terminal_entry() {
        let stdout = StdoutCapture::new();
        let mut engine = StepEngine::new("code", "userscript", stdout, Some(1), None);
        let frames = vec![module_frame()];
        engine.on_break(BreakContext {
            script: "userscript",
            line0: 3,
            col: 1,
            frames: &frames,
            is_return: false,
            is_exception: false,
            exception_msg: None,
        });
        assert_eq!(engine.trace.len(), 2);
        assert_eq!(engine.trace[1].event, EventKind::InstructionLimitReached);
    }
}
