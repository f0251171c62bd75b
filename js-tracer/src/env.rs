//! Lexical environment. Each `Scope` is a flat variable table plus a link to
//! its parent; `Env` is a cheap cloneable handle to the chain's innermost
//! scope, matching the runtime's own sharing: closures capture `Env`, not a
//! copy of the variables.
//!
//! Scope *kind* (Local / Catch / Closure / Global) is not stored here — it is
//! contextual to whichever frame walks the chain (spec §4.5, §9's remark that
//! "scope chains are not tied to specific call frames"). `identity.rs` and
//! `encoder.rs` classify each scope relative to the frame currently being
//! rendered, not at creation time.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::value::Value;

#[derive(Clone)]
pub struct Env(pub Rc<RefCell<Scope>>);

pub struct Scope {
    pub vars: BTreeMap<String, Value>,
    /// Preserves declaration order, independent of `BTreeMap`'s key order,
    /// for the encoder's `ordered_varnames`/`ordered_globals`.
    pub order: Vec<String>,
    pub parent: Option<Env>,
    /// `true` for a function's own activation record, `false` for a block
    /// scope pushed by `try`/`catch`/`for`/`while` (the traced language is
    /// `var`-scoped, so only catch blocks actually introduce a new binding
    /// scope; `if`/`while`/`for` bodies share their enclosing function scope).
    pub is_function_scope: bool,
    pub is_catch_scope: bool,
}

impl Env {
    pub fn new_global() -> Env {
        Env(Rc::new(RefCell::new(Scope {
            vars: BTreeMap::new(),
            order: Vec::new(),
            parent: None,
            is_function_scope: true,
            is_catch_scope: false,
        })))
    }

    pub fn child_function_scope(parent: &Env) -> Env {
        Env(Rc::new(RefCell::new(Scope {
            vars: BTreeMap::new(),
            order: Vec::new(),
            parent: Some(parent.clone()),
            is_function_scope: true,
            is_catch_scope: false,
        })))
    }

    pub fn child_catch_scope(parent: &Env) -> Env {
        Env(Rc::new(RefCell::new(Scope {
            vars: BTreeMap::new(),
            order: Vec::new(),
            parent: Some(parent.clone()),
            is_function_scope: false,
            is_catch_scope: true,
        })))
    }

    pub fn declare(&self, name: &str, value: Value) {
        let mut scope = self.0.borrow_mut();
        if !scope.vars.contains_key(name) {
            scope.order.push(name.to_string());
        }
        scope.vars.insert(name.to_string(), value);
    }

    /// `var` declarations hoist to the nearest enclosing function scope,
    /// skipping any catch scopes in between.
    pub fn declare_var(&self, name: &str, value: Option<Value>) {
        let mut cur = self.clone();
        loop {
            let is_function_scope = cur.0.borrow().is_function_scope;
            if is_function_scope {
                break;
            }
            let parent = cur.0.borrow().parent.clone();
            cur = parent.expect("non-function scope must have a parent");
        }
        let mut scope = cur.0.borrow_mut();
        if !scope.vars.contains_key(name) {
            scope.order.push(name.to_string());
            scope.vars.insert(name.to_string(), value.unwrap_or(Value::Undefined));
        } else if let Some(v) = value {
            scope.vars.insert(name.to_string(), v);
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let scope = self.0.borrow();
        if let Some(v) = scope.vars.get(name) {
            return Some(v.clone());
        }
        scope.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn set(&self, name: &str, value: Value) -> bool {
        let mut scope = self.0.borrow_mut();
        if scope.vars.contains_key(name) {
            scope.vars.insert(name.to_string(), value);
            return true;
        }
        let parent = scope.parent.clone();
        drop(scope);
        match parent {
            Some(p) => p.set(name, value),
            None => false,
        }
    }

    /// Chain from this scope outward, innermost first. Used by `encoder.rs`
    /// to render every scope a frame can see, and by `identity.rs` to
    /// classify each as Local/Catch/Closure/Global relative to the frame's
    /// own boundary (the first function-scope encountered).
    pub fn chain(&self) -> Vec<Env> {
        let mut out = Vec::new();
        let mut cur = Some(self.clone());
        while let Some(env) = cur {
            let parent = env.0.borrow().parent.clone();
            out.push(env.clone());
            cur = parent;
        }
        out
    }

    pub fn same_scope(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_declaration_hoists_past_catch_scope() {
        let global = Env::new_global();
        let func = Env::child_function_scope(&global);
        let catch = Env::child_catch_scope(&func);
        catch.declare_var("x", Some(Value::Number(1.0)));
        assert!(func.0.borrow().vars.contains_key("x"));
        assert!(!catch.0.borrow().vars.contains_key("x"));
    }

    #[test]
    fn lookup_walks_the_chain() {
        let global = Env::new_global();
        global.declare_var("g", Some(Value::Number(9.0)));
        let func = Env::child_function_scope(&global);
        assert_eq!(func.get("g").unwrap().to_display_string(), "9");
        assert!(func.get("missing").is_none());
    }

    #[test]
    fn set_mutates_the_declaring_scope() {
        let global = Env::new_global();
        global.declare_var("g", Some(Value::Number(1.0)));
        let func = Env::child_function_scope(&global);
        assert!(func.set("g", Value::Number(2.0)));
        assert_eq!(global.get("g").unwrap().to_display_string(), "2");
    }
}
