//! Tree-walking evaluator for the traced language. Drives the program
//! statement by statement, raising a break through [`crate::engine::DebugHook`]
//! at each one so the stepping engine can observe it — this is the "runtime"
//! half of the system; `engine.rs` is the debugger-listener half.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprKind, FunctionDef, LogicalOp, Pos, Program, Stmt, StmtKind, UnaryOp};
use crate::engine::{BreakContext, DebugHook, StepAction};
use crate::env::Env;
use crate::stdout_capture::{Sink, StdoutCapture};
use crate::value::{format_number, FunctionValue, ObjectData, ObjectKind, Value};

/// One live call-stack entry. Index 0 is always the synthetic module frame
/// C1's wrapper introduces; the engine excludes it from `stack_to_render`
/// (spec §3).
pub struct Frame {
    pub raw_id: usize,
    pub func_name: String,
    pub env: Env,
    pub receiver: Option<Value>,
    pub is_constructor: bool,
    pub at_return: bool,
    pub return_value: Option<Value>,
}

/// Outcome of executing a statement or block.
pub enum Signal {
    Normal,
    Return(Value),
    Throw(Value),
    /// The step budget was exceeded; unwind past every `try`/`catch`.
    Abort,
}

pub struct Interpreter<'h> {
    pub global: Env,
    pub stack: Vec<Frame>,
    pub stdout: Rc<RefCell<StdoutCapture>>,
    pub script_name: String,
    hook: &'h mut dyn DebugHook,
}

impl<'h> Interpreter<'h> {
    pub fn new(script_name: impl Into<String>, stdout: Rc<RefCell<StdoutCapture>>, hook: &'h mut dyn DebugHook) -> Self {
        let global = Env::new_global();
        install_globals(&global, stdout.clone());
        Interpreter {
            global,
            stack: Vec::new(),
            stdout,
            script_name: script_name.into(),
            hook,
        }
    }

    fn step(&mut self, script: &str, pos: Pos, is_return: bool, is_exception: bool, exception_msg: Option<String>) -> Signal {
        let ctx = BreakContext {
            script,
            line0: pos.line.saturating_sub(1),
            col: pos.col,
            frames: &self.stack,
            is_return,
            is_exception,
            exception_msg,
        };
        match self.hook.on_break(ctx) {
            StepAction::StepIn | StepAction::StepOut => Signal::Normal,
            StepAction::Abort => Signal::Abort,
        }
    }

    /// Runs the whole (already-wrapped) program in a fresh module frame.
    pub fn run(&mut self, program: &Program) -> Signal {
        self.stack.push(Frame {
            raw_id: 0,
            func_name: "<module>".to_string(),
            env: self.global.clone(),
            receiver: None,
            is_constructor: false,
            at_return: false,
            return_value: None,
        });
        self.hoist_function_decls(&program.body);
        let sig = self.exec_block(&program.body);
        match sig {
            Signal::Normal => {
                if let Some(top) = self.stack.last_mut() {
                    top.at_return = true;
                    top.return_value = Some(Value::Undefined);
                }
                let pos = program
                    .body
                    .last()
                    .map(|s| s.pos)
                    .unwrap_or(Pos { line: 1, col: 1 });
                let script = self.script_name.clone();
                self.step(&script, pos, true, false, None)
            }
            other => other,
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Signal {
        for stmt in stmts {
            match self.exec_stmt(stmt) {
                Signal::Normal => continue,
                other => return other,
            }
        }
        Signal::Normal
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Signal {
        match &stmt.kind {
            StmtKind::Directive(_) | StmtKind::FunctionDecl(_) => Signal::Normal,
            StmtKind::Debugger => {
                let script = self.script_name.clone();
                self.step(&script, stmt.pos, false, false, None)
            }
            StmtKind::VarDecl(decls) => {
                for (name, init) in decls {
                    let value = match init {
                        Some(e) => match self.eval(e) {
                            Ok(v) => v,
                            Err(sig) => return sig,
                        },
                        None => Value::Undefined,
                    };
                    self.env_of_top().declare_var(name, Some(value));
                }
                // Break after the declaration takes effect, not before, so
                // the entry reports this line's own result (spec scenario 1).
                let script = self.script_name.clone();
                match self.step(&script, stmt.pos, false, false, None) {
                    Signal::Abort => Signal::Abort,
                    _ => Signal::Normal,
                }
            }
            StmtKind::Expr(expr) => {
                match self.eval(expr) {
                    Ok(_) => {}
                    Err(sig) => return sig,
                }
                let script = self.script_name.clone();
                match self.step(&script, stmt.pos, false, false, None) {
                    Signal::Abort => Signal::Abort,
                    _ => Signal::Normal,
                }
            }
            StmtKind::Return(expr_opt) => {
                let value = match expr_opt {
                    Some(e) => match self.eval(e) {
                        Ok(v) => v,
                        Err(sig) => return sig,
                    },
                    None => Value::Undefined,
                };
                if let Some(top) = self.stack.last_mut() {
                    top.at_return = true;
                    top.return_value = Some(value.clone());
                }
                let script = self.script_name.clone();
                match self.step(&script, stmt.pos, true, false, None) {
                    Signal::Abort => Signal::Abort,
                    _ => Signal::Return(value),
                }
            }
            StmtKind::Throw(expr) => {
                let value = match self.eval(expr) {
                    Ok(v) => v,
                    Err(sig) => return sig,
                };
                let msg = value.to_display_string();
                let script = self.script_name.clone();
                match self.step(&script, stmt.pos, false, true, Some(msg)) {
                    Signal::Abort => Signal::Abort,
                    _ => Signal::Throw(value),
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let script = self.script_name.clone();
                match self.step(&script, stmt.pos, false, false, None) {
                    Signal::Abort => return Signal::Abort,
                    _ => {}
                }
                let cond_value = match self.eval(cond) {
                    Ok(v) => v,
                    Err(sig) => return sig,
                };
                if cond_value.truthy() {
                    self.exec_block(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch)
                } else {
                    Signal::Normal
                }
            }
            StmtKind::While { cond, body } => loop {
                let script = self.script_name.clone();
                match self.step(&script, stmt.pos, false, false, None) {
                    Signal::Abort => return Signal::Abort,
                    _ => {}
                }
                let cond_value = match self.eval(cond) {
                    Ok(v) => v,
                    Err(sig) => return sig,
                };
                if !cond_value.truthy() {
                    return Signal::Normal;
                }
                match self.exec_block(body) {
                    Signal::Normal => continue,
                    other => return other,
                }
            },
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    match self.exec_stmt(init) {
                        Signal::Normal => {}
                        other => return other,
                    }
                }
                loop {
                    let script = self.script_name.clone();
                    match self.step(&script, stmt.pos, false, false, None) {
                        Signal::Abort => return Signal::Abort,
                        _ => {}
                    }
                    if let Some(cond) = cond {
                        let cond_value = match self.eval(cond) {
                            Ok(v) => v,
                            Err(sig) => return sig,
                        };
                        if !cond_value.truthy() {
                            return Signal::Normal;
                        }
                    }
                    match self.exec_block(body) {
                        Signal::Normal => {}
                        other => return other,
                    }
                    if let Some(step_expr) = step {
                        if let Err(sig) = self.eval(step_expr) {
                            return sig;
                        }
                    }
                }
            }
            StmtKind::TryCatch {
                try_block,
                catch_param,
                catch_block,
            } => {
                let sig = self.exec_block(try_block);
                if let Signal::Throw(thrown) = sig {
                    let saved_env = self.stack.last().unwrap().env.clone();
                    let catch_env = Env::child_catch_scope(&saved_env);
                    catch_env.declare_var(catch_param, Some(thrown));
                    self.stack.last_mut().unwrap().env = catch_env;
                    let catch_sig = self.exec_block(catch_block);
                    self.stack.last_mut().unwrap().env = saved_env;
                    catch_sig
                } else {
                    sig
                }
            }
            StmtKind::Block(body) => self.exec_block(body),
        }
    }

    fn env_of_top(&self) -> Env {
        self.stack.last().expect("stack never empty during exec").env.clone()
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, Signal> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Undefined => Ok(Value::Undefined),
            ExprKind::This => Ok(self.stack.last().and_then(|f| f.receiver.clone()).unwrap_or(Value::Undefined)),
            ExprKind::Identifier(name) => match self.env_of_top().get(name) {
                Some(v) => Ok(v),
                None => {
                    let msg = format!("{name} is not defined");
                    self.throw_native(expr.pos, msg)
                }
            },
            ExprKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::Object(props) => {
                let mut data = ObjectData::new_plain();
                for (key, value_expr) in props {
                    let v = self.eval(value_expr)?;
                    data.set_prop(key, v);
                }
                Ok(Value::object(data))
            }
            ExprKind::Function(def) => Ok(self.make_closure(def)),
            ExprKind::Unary { op, expr: inner } => self.eval_unary(*op, inner),
            ExprKind::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(eval_binary(*op, &l, &r))
            }
            ExprKind::Logical { op, left, right } => {
                let l = self.eval(left)?;
                match op {
                    LogicalOp::And => {
                        if !l.truthy() {
                            Ok(l)
                        } else {
                            self.eval(right)
                        }
                    }
                    LogicalOp::Or => {
                        if l.truthy() {
                            Ok(l)
                        } else {
                            self.eval(right)
                        }
                    }
                }
            }
            ExprKind::Assign { target, value } => {
                let v = self.eval(value)?;
                self.assign(target, v.clone())?;
                Ok(v)
            }
            ExprKind::Member { object, property, computed } => {
                let obj = self.eval(object)?;
                let key = self.member_key(property, *computed)?;
                self.get_member(&obj, &key, expr.pos)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, expr.pos, false),
            ExprKind::New { callee, args } => self.eval_call(callee, args, expr.pos, true),
        }
    }

    fn member_key(&mut self, property: &Expr, computed: bool) -> Result<String, Signal> {
        if computed {
            let v = self.eval(property)?;
            Ok(v.to_display_string())
        } else if let ExprKind::String(s) = &property.kind {
            Ok(s.clone())
        } else {
            unreachable!("non-computed member property must be a string literal")
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, inner: &Expr) -> Result<Value, Signal> {
        if op == UnaryOp::Typeof {
            let v = match &inner.kind {
                ExprKind::Identifier(name) => self.env_of_top().get(name).unwrap_or(Value::Undefined),
                _ => self.eval(inner)?,
            };
            return Ok(Value::String(v.type_of().to_string()));
        }
        let v = self.eval(inner)?;
        Ok(match op {
            UnaryOp::Neg => Value::Number(-to_number(&v)),
            UnaryOp::Not => Value::Bool(!v.truthy()),
            UnaryOp::Typeof => unreachable!(),
        })
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), Signal> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                if !self.env_of_top().set(name, value.clone()) {
                    self.env_of_top().declare_var(name, Some(value));
                }
                Ok(())
            }
            ExprKind::Member { object, property, computed } => {
                let obj = self.eval(object)?;
                let key = self.member_key(property, *computed)?;
                self.set_member(&obj, &key, value, target.pos)
            }
            _ => unreachable!("parser only produces identifier/member assignment targets"),
        }
    }

    fn get_member(&mut self, object: &Value, key: &str, pos: Pos) -> Result<Value, Signal> {
        match object {
            Value::Null | Value::Undefined => {
                let msg = format!("cannot read property '{key}' of {}", object.to_display_string());
                self.throw_native(pos, msg)
            }
            Value::String(s) if key == "length" => Ok(Value::Number(s.chars().count() as f64)),
            Value::Object(cell) => {
                let data = cell.borrow();
                match &data.kind {
                    ObjectKind::Array(items) => {
                        if key == "length" {
                            return Ok(Value::Number(items.len() as f64));
                        }
                        if key == "push" {
                            return Ok(builtin_fn("Array.prototype.push"));
                        }
                        if let Ok(idx) = key.parse::<usize>() {
                            return Ok(items.get(idx).cloned().unwrap_or(Value::Undefined));
                        }
                        Ok(Value::Undefined)
                    }
                    _ => {
                        if let Some(v) = data.props.get(key) {
                            return Ok(v.clone());
                        }
                        if let Some(proto) = data.props.get("__proto__").cloned() {
                            drop(data);
                            return self.get_member(&proto, key, pos);
                        }
                        Ok(Value::Undefined)
                    }
                }
            }
            _ => Ok(Value::Undefined),
        }
    }

    fn set_member(&mut self, object: &Value, key: &str, value: Value, pos: Pos) -> Result<(), Signal> {
        match object {
            Value::Null | Value::Undefined => {
                let msg = format!("cannot set property '{key}' of {}", object.to_display_string());
                self.throw_native(pos, msg).map(|_| ())
            }
            Value::Object(cell) => {
                match &mut cell.borrow_mut().kind {
                    ObjectKind::Array(items) => {
                        if let Ok(idx) = key.parse::<usize>() {
                            if idx >= items.len() {
                                items.resize(idx + 1, Value::Undefined);
                            }
                            items[idx] = value;
                            return Ok(());
                        }
                    }
                    _ => {}
                }
                cell.borrow_mut().set_prop(key, value);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Binds a closure for every `function` declaration reachable in `stmts`
    /// without crossing into a nested function body, before any statement in
    /// `stmts` runs — JS hoists declarations to the top of their enclosing
    /// function (or the top level), unlike `var`, which is why `f`/`C` must
    /// already be callable on the very first line of a block that declares
    /// them further down.
    fn hoist_function_decls(&mut self, stmts: &[Stmt]) {
        let mut defs = Vec::new();
        collect_function_decls(stmts, &mut defs);
        let closure_env = self.env_of_top();
        for def in defs {
            let name = def.name.clone();
            let func = FunctionValue {
                def: Rc::new(def),
                closure: closure_env.clone(),
                is_builtin: false,
                name: name.clone(),
                source_text: None,
            };
            closure_env.declare(&name, Value::function(func));
        }
    }

    fn make_closure(&mut self, def: &FunctionDef) -> Value {
        let closure_env = self.env_of_top();
        let func = FunctionValue {
            def: Rc::new(def.clone()),
            closure: closure_env,
            is_builtin: false,
            name: if def.name.is_empty() { "anonymous".to_string() } else { def.name.clone() },
            source_text: None,
        };
        let value = Value::function(func);
        if !def.name.is_empty() && !def.is_expression {
            self.env_of_top().declare(&def.name, value.clone());
        }
        value
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], pos: Pos, is_new: bool) -> Result<Value, Signal> {
        let (func_value, this_value) = if let ExprKind::Member { object, property, computed } = &callee.kind {
            let obj = self.eval(object)?;
            let key = self.member_key(property, *computed)?;
            let func = self.get_member(&obj, &key, callee.pos)?;
            (func, Some(obj))
        } else {
            (self.eval(callee)?, None)
        };

        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.eval(arg)?);
        }

        let func = match &func_value {
            Value::Object(cell) => match &cell.borrow().kind {
                ObjectKind::Function(f) => f.clone(),
                _ => {
                    let msg = "value is not a function".to_string();
                    return self.throw_native(pos, msg);
                }
            },
            _ => {
                let msg = "value is not a function".to_string();
                return self.throw_native(pos, msg);
            }
        };

        if is_new {
            let new_obj_data = {
                let mut data = ObjectData::new_plain();
                if let Value::Object(func_cell) = &func_value {
                    if let Some(proto) = func_cell.borrow().props.get("prototype").cloned() {
                        data.set_prop("__proto__", proto);
                    }
                }
                data
            };
            let receiver = Value::object(new_obj_data);
            let result = self.call_function(&func, Some(receiver.clone()), arg_values, pos, true)?;
            Ok(if func.is_builtin { result } else { receiver })
        } else {
            self.call_function(&func, this_value, arg_values, pos, false)
        }
    }

    fn call_function(
        &mut self,
        func: &FunctionValue,
        this: Option<Value>,
        args: Vec<Value>,
        call_pos: Pos,
        is_new: bool,
    ) -> Result<Value, Signal> {
        if func.is_builtin {
            return self.call_builtin(&func.name, this, args, call_pos);
        }

        let raw_id = self.stack.len();
        let activation_env = Env::child_function_scope(&func.closure);
        for (idx, param) in func.def.params.iter().enumerate() {
            activation_env.declare_var(param, args.get(idx).cloned());
        }

        self.stack.push(Frame {
            raw_id,
            func_name: func.name.clone(),
            env: activation_env,
            receiver: this,
            is_constructor: is_new,
            at_return: false,
            return_value: None,
        });

        let body = func.def.body.clone();
        self.hoist_function_decls(&body);

        // A faithful single-step debugger breaks once on entry, with the
        // frame's arguments already bound and before its first statement has
        // run, so the new frame always gets a `call` entry — even when that
        // first statement is itself a `return` (spec scenario 2).
        let entry_pos = body.first().map(|s| s.pos).unwrap_or(call_pos);
        let script = self.script_name.clone();
        match self.step(&script, entry_pos, false, false, None) {
            Signal::Abort => {
                self.stack.pop();
                return Err(Signal::Abort);
            }
            _ => {}
        }

        let result = self.exec_block(&body);
        let return_value = match result {
            Signal::Return(v) => v,
            Signal::Normal => {
                if let Some(top) = self.stack.last_mut() {
                    top.at_return = true;
                    top.return_value = Some(Value::Undefined);
                }
                let pos = body.last().map(|s| s.pos).unwrap_or(call_pos);
                let script = self.script_name.clone();
                match self.step(&script, pos, true, false, None) {
                    Signal::Abort => {
                        self.stack.pop();
                        return Err(Signal::Abort);
                    }
                    _ => Value::Undefined,
                }
            }
            Signal::Throw(v) => {
                self.stack.pop();
                return Err(Signal::Throw(v));
            }
            Signal::Abort => {
                self.stack.pop();
                return Err(Signal::Abort);
            }
        };
        self.stack.pop();
        Ok(return_value)
    }

    fn throw_native(&mut self, pos: Pos, message: String) -> Result<Value, Signal> {
        match self.step("<native>", pos, false, true, Some(message.clone())) {
            Signal::Abort => Err(Signal::Abort),
            _ => Err(Signal::Throw(Value::String(message))),
        }
    }

    fn call_builtin(&mut self, name: &str, this: Option<Value>, args: Vec<Value>, pos: Pos) -> Result<Value, Signal> {
        match name {
            "console.log" => {
                let parts: Vec<String> = args.iter().map(Value::to_display_string).collect();
                self.stdout.borrow_mut().write_line(&parts.join(" "));
                Ok(Value::Undefined)
            }
            "Math.abs" => Ok(Value::Number(to_number(args.first().unwrap_or(&Value::Undefined)).abs())),
            "Math.floor" => Ok(Value::Number(to_number(args.first().unwrap_or(&Value::Undefined)).floor())),
            "Math.max" => Ok(Value::Number(args.iter().map(to_number).fold(f64::NEG_INFINITY, f64::max))),
            "Math.min" => Ok(Value::Number(args.iter().map(to_number).fold(f64::INFINITY, f64::min))),
            "JSON.stringify" => {
                let v = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(Value::String(json_stringify(&v)))
            }
            "JSON.parse" => {
                let text = match args.first() {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_display_string(),
                    None => String::new(),
                };
                match json_parse(&text) {
                    Some(v) => Ok(v),
                    None => self.throw_native(pos, format!("Unexpected token in JSON: {text}")),
                }
            }
            "Array.prototype.push" => {
                if let Some(Value::Object(cell)) = &this {
                    for arg in args {
                        cell.borrow_mut().push_array_item(arg);
                    }
                    let len = match &cell.borrow().kind {
                        ObjectKind::Array(items) => items.len(),
                        _ => 0,
                    };
                    Ok(Value::Number(len as f64))
                } else {
                    Ok(Value::Undefined)
                }
            }
            "Error" => {
                let msg = args.first().map(Value::to_display_string).unwrap_or_default();
                if let Some(Value::Object(cell)) = &this {
                    let mut data = cell.borrow_mut();
                    data.set_prop("message", Value::String(msg.clone()));
                    data.set_prop("name", Value::String("Error".to_string()));
                    data.set_prop("__pprint__", Value::String(format!("Error: {msg}")));
                }
                Ok(this.unwrap_or(Value::Undefined))
            }
            other => self.throw_native(pos, format!("unknown builtin {other}")),
        }
    }
}

/// Walks `stmts` for `function` declarations, descending into nested blocks
/// and control-flow bodies but never into another function's body (that
/// function hoists its own declarations when it's called).
fn collect_function_decls(stmts: &[Stmt], out: &mut Vec<FunctionDef>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::FunctionDecl(def) => out.push(def.clone()),
            StmtKind::Block(body) => collect_function_decls(body, out),
            StmtKind::If { then_branch, else_branch, .. } => {
                collect_function_decls(then_branch, out);
                if let Some(else_branch) = else_branch {
                    collect_function_decls(else_branch, out);
                }
            }
            StmtKind::While { body, .. } => collect_function_decls(body, out),
            StmtKind::For { body, .. } => collect_function_decls(body, out),
            StmtKind::TryCatch { try_block, catch_block, .. } => {
                collect_function_decls(try_block, out);
                collect_function_decls(catch_block, out);
            }
            _ => {}
        }
    }
}

fn builtin_fn(name: &str) -> Value {
    Value::function(FunctionValue {
        def: Rc::new(FunctionDef {
            name: name.to_string(),
            params: vec![],
            body: vec![],
            source_range: (0, 0),
            is_expression: false,
        }),
        closure: Env::new_global(),
        is_builtin: true,
        name: name.to_string(),
        source_text: None,
    })
}

fn install_globals(global: &Env, stdout: Rc<RefCell<StdoutCapture>>) {
    let _ = &stdout;
    let mut console = ObjectData::new_plain();
    console.set_prop("log", builtin_fn("console.log"));
    global.declare_var("console", Some(Value::object(console)));

    let mut math = ObjectData::new_plain();
    math.set_prop("abs", builtin_fn("Math.abs"));
    math.set_prop("floor", builtin_fn("Math.floor"));
    math.set_prop("max", builtin_fn("Math.max"));
    math.set_prop("min", builtin_fn("Math.min"));
    global.declare_var("Math", Some(Value::object(math)));

    let mut json = ObjectData::new_plain();
    json.set_prop("parse", builtin_fn("JSON.parse"));
    json.set_prop("stringify", builtin_fn("JSON.stringify"));
    global.declare_var("JSON", Some(Value::object(json)));

    global.declare_var("Error", Some(builtin_fn("Error")));
}

/// Names the engine filters out of `globals` because they're runtime
/// intrinsics this interpreter installs, not user bindings (spec §6).
pub const INTRINSIC_GLOBALS: &[&str] = &["console", "Math", "JSON", "Error"];

pub fn to_number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => *n,
        Value::Bool(b) => if *b { 1.0 } else { 0.0 },
        Value::Null => 0.0,
        Value::Undefined => f64::NAN,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Object(_) => f64::NAN,
    }
}

fn eval_binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                Value::String(format!("{}{}", l.to_display_string(), r.to_display_string()))
            } else {
                Value::Number(to_number(l) + to_number(r))
            }
        }
        BinaryOp::Sub => Value::Number(to_number(l) - to_number(r)),
        BinaryOp::Mul => Value::Number(to_number(l) * to_number(r)),
        BinaryOp::Div => Value::Number(to_number(l) / to_number(r)),
        BinaryOp::Mod => Value::Number(to_number(l) % to_number(r)),
        BinaryOp::Eq => Value::Bool(l.loose_eq(r)),
        BinaryOp::NotEq => Value::Bool(!l.loose_eq(r)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(l, r)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_eq(l, r)),
        BinaryOp::Lt => Value::Bool(compare(l, r) == Some(std::cmp::Ordering::Less)),
        BinaryOp::Gt => Value::Bool(compare(l, r) == Some(std::cmp::Ordering::Greater)),
        BinaryOp::LtEq => Value::Bool(matches!(
            compare(l, r),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        )),
        BinaryOp::GtEq => Value::Bool(matches!(
            compare(l, r),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        )),
    }
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        (Value::Undefined, Value::Undefined) => true,
        (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

fn compare(l: &Value, r: &Value) -> Option<std::cmp::Ordering> {
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return a.partial_cmp(b);
    }
    to_number(l).partial_cmp(&to_number(r))
}

fn json_stringify(v: &Value) -> String {
    match v {
        Value::Number(n) => format_number(*n),
        Value::String(s) => format!("{s:?}"),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Undefined => "null".to_string(),
        Value::Object(cell) => match &cell.borrow().kind {
            ObjectKind::Array(items) => {
                let parts: Vec<String> = items.iter().map(json_stringify).collect();
                format!("[{}]", parts.join(","))
            }
            _ => {
                let data = cell.borrow();
                let parts: Vec<String> = data
                    .prop_order
                    .iter()
                    .map(|k| format!("{:?}:{}", k, json_stringify(data.props.get(k).unwrap())))
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
        },
    }
}

/// A minimal JSON reader covering exactly the literal shapes `json_stringify`
/// produces: numbers, strings, booleans, null, arrays, and flat objects.
fn json_parse(text: &str) -> Option<Value> {
    let tokens = serde_json::from_str::<serde_json::Value>(text).ok()?;
    Some(json_value_to_runtime(&tokens))
}

fn json_value_to_runtime(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(json_value_to_runtime).collect()),
        serde_json::Value::Object(map) => {
            let mut data = ObjectData::new_plain();
            for (k, val) in map {
                data.set_prop(k, json_value_to_runtime(val));
            }
            Value::object(data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BreakContext, DebugHook, StepAction};
    use crate::parser::parse;

    struct CountingHook {
        breaks: usize,
    }

    impl DebugHook for CountingHook {
        fn on_break(&mut self, _ctx: BreakContext) -> StepAction {
            self.breaks += 1;
            StepAction::StepIn
        }
    }

    #[test]
    fn runs_three_var_decls_and_updates_globals() {
        let program = parse("'use strict';\ndebugger;\nvar x=1; var y=2; var z=x+y;").unwrap();
        let mut hook = CountingHook { breaks: 0 };
        let stdout = StdoutCapture::new();
        let mut interp = Interpreter::new("userscript", stdout, &mut hook);
        interp.run(&program);
        assert_eq!(interp.global.get("z").unwrap().to_display_string(), "3");
    }

    #[test]
    fn constructor_sets_receiver_property() {
        let program = parse("'use strict';\ndebugger;\nfunction C(){this.x=1;} var o=new C();").unwrap();
        let mut hook = CountingHook { breaks: 0 };
        let stdout = StdoutCapture::new();
        let mut interp = Interpreter::new("userscript", stdout, &mut hook);
        interp.run(&program);
        let o = interp.global.get("o").unwrap();
        if let Value::Object(cell) = &o {
            assert_eq!(cell.borrow().props.get("x").unwrap().to_display_string(), "1");
        } else {
            panic!("expected object");
        }
    }

    #[test]
    fn console_log_writes_through_sink() {
        let program = parse("'use strict';\ndebugger;\nconsole.log(1, \"a\");").unwrap();
        let mut hook = CountingHook { breaks: 0 };
        let stdout = StdoutCapture::new();
        let mut interp = Interpreter::new("userscript", stdout.clone(), &mut hook);
        interp.run(&program);
        assert_eq!(stdout.borrow().snapshot(), "1 a\n");
    }

    #[test]
    fn cyclic_array_push_self() {
        let program = parse("'use strict';\ndebugger;\nvar a=[1,2]; a.push(a);").unwrap();
        let mut hook = CountingHook { breaks: 0 };
        let stdout = StdoutCapture::new();
        let mut interp = Interpreter::new("userscript", stdout, &mut hook);
        interp.run(&program);
        let a = interp.global.get("a").unwrap();
        if let Value::Object(cell) = &a {
            if let ObjectKind::Array(items) = &cell.borrow().kind {
                assert_eq!(items.len(), 3);
                assert!(items[2].same_object(&a));
            } else {
                panic!("expected array");
            }
        }
    }
}
