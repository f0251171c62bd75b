//! Heap/Value Encoder (spec §4.4): turns a runtime [`Value`] into the
//! visualizer's tagged JSON form, populating a fresh Heap Table per trace
//! entry as it recurses.

use serde_json::json;

use trace_schema::schema::{encode_js_special, encode_ref, encode_special_float, HeapTable};

use crate::identity::IdentityRegistry;
use crate::value::{ObjectData, ObjectKind, Value};

pub struct Encoder<'a> {
    pub registry: &'a mut IdentityRegistry,
    pub heap: HeapTable,
}

impl<'a> Encoder<'a> {
    pub fn new(registry: &'a mut IdentityRegistry) -> Self {
        Encoder {
            registry,
            heap: HeapTable::new(),
        }
    }

    pub fn encode(&mut self, value: &Value) -> serde_json::Value {
        match value {
            Value::Number(n) if n.is_nan() => encode_special_float("NaN"),
            Value::Number(n) if n.is_infinite() => {
                encode_special_float(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Number(n) => json!(n),
            Value::String(s) => json!(s),
            Value::Bool(b) => encode_js_special(if *b { "true" } else { "false" }),
            Value::Null => encode_js_special("null"),
            Value::Undefined => encode_js_special("undefined"),
            Value::Object(cell) => {
                let id = self.registry.object_id(cell);
                if self.heap.contains_key(&id) {
                    return encode_ref(id);
                }
                // Placeholder before recursing so a self-reference closes
                // the cycle instead of looping (spec §4.4 rule 3).
                self.heap.insert(id, serde_json::Value::Null);
                let encoded = {
                    let data = cell.borrow();
                    match &data.kind {
                        ObjectKind::Function(func) => self.encode_function(&data, func),
                        ObjectKind::Array(items) => self.encode_array(items),
                        ObjectKind::Plain => self.encode_plain(&data),
                    }
                };
                self.heap.insert(id, encoded);
                encode_ref(id)
            }
        }
    }

    fn encode_function(&mut self, data: &ObjectData, func: &crate::value::FunctionValue) -> serde_json::Value {
        let mut properties: Vec<serde_json::Value> = Vec::new();

        if let Some(Value::Object(proto_cell)) = data.props.get("prototype") {
            let non_trivial = {
                let proto = proto_cell.borrow();
                !proto.props.is_empty() || !matches!(proto.kind, ObjectKind::Plain)
            };
            if non_trivial {
                let encoded_proto = self.encode(&Value::Object(proto_cell.clone()));
                properties.push(json!(["prototype", encoded_proto]));
            }
        }
        for key in &data.prop_order {
            if key == "prototype" {
                continue;
            }
            let value = data.props.get(key).cloned().unwrap_or(Value::Undefined);
            let encoded = self.encode(&value);
            properties.push(json!([key, encoded]));
        }

        let body_text = function_body_text(func);
        let properties_value = if properties.is_empty() {
            serde_json::Value::Null
        } else {
            json!(properties)
        };
        json!(["JS_FUNCTION", func.name, body_text, properties_value, null_value()])
    }

    fn encode_array(&mut self, items: &[Value]) -> serde_json::Value {
        let mut out = vec![json!("LIST")];
        for item in items {
            out.push(self.encode(item));
        }
        serde_json::Value::Array(out)
    }

    fn encode_plain(&mut self, data: &ObjectData) -> serde_json::Value {
        if let Some(s) = pretty_print_string(data) {
            return json!(["INSTANCE_PPRINT", "object", s]);
        }
        let mut out = vec![json!("INSTANCE"), json!("")];
        for key in &data.prop_order {
            let value = data.props.get(key).cloned().unwrap_or(Value::Undefined);
            out.push(json!([key, self.encode(&value)]));
        }
        if let Some(Value::Object(proto_cell)) = data.props.get("__proto__") {
            let non_empty = !proto_cell.borrow().props.is_empty();
            if non_empty {
                let encoded_proto = self.encode(&Value::Object(proto_cell.clone()));
                out.push(json!(["__proto__", encoded_proto]));
            }
        }
        serde_json::Value::Array(out)
    }
}

fn null_value() -> serde_json::Value {
    serde_json::Value::Null
}

/// A plain object only gets a custom pretty-print form via an explicit
/// `toString`-style `__pprint__` own property (the interpreter has no
/// `toString` protocol); anything else falls through to the structural
/// `INSTANCE` encoding.
fn pretty_print_string(data: &ObjectData) -> Option<String> {
    match data.props.get("__pprint__") {
        Some(Value::String(s)) if !s.is_empty() && s != "[object Object]" => Some(s.clone()),
        _ => None,
    }
}

/// Rule P1's "textual form of the function body" plus the indentation
/// fix-up: if the body's last line is a bare (possibly indented) `}`,
/// prepend that indentation to the whole string so the first line lines up
/// with the closing brace.
fn function_body_text(func: &crate::value::FunctionValue) -> String {
    if func.is_builtin {
        return format!("function {}() {{ [native code] }}", func.name);
    }
    let source = func.source_text.as_deref().unwrap_or("");
    let last_line = source.lines().last().unwrap_or("");
    let trimmed = last_line.trim_start();
    if trimmed == "}" {
        let indent = &last_line[..last_line.len() - trimmed.len()];
        if !indent.is_empty() {
            return format!("{indent}{source}");
        }
    }
    source.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FunctionValue;
    use std::rc::Rc;

    #[test]
    fn encodes_primitives() {
        let mut registry = IdentityRegistry::new();
        let mut encoder = Encoder::new(&mut registry);
        assert_eq!(encoder.encode(&Value::Number(3.0)), json!(3.0));
        assert_eq!(
            encoder.encode(&Value::Bool(true)),
            json!(["JS_SPECIAL_VAL", "true"])
        );
        assert_eq!(
            encoder.encode(&Value::Number(f64::NAN)),
            json!(["SPECIAL_FLOAT", "NaN"])
        );
    }

    #[test]
    fn cyclic_array_references_itself() {
        let mut registry = IdentityRegistry::new();
        let arr = Value::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        if let Value::Object(cell) = &arr {
            cell.borrow_mut().push_array_item(arr.clone());
        }
        let mut encoder = Encoder::new(&mut registry);
        let encoded = encoder.encode(&arr);
        let serde_json::Value::Array(outer) = &encoded else {
            panic!()
        };
        let id = outer[1].as_u64().unwrap();
        let heap_entry = encoder.heap.get(&id).unwrap();
        assert_eq!(heap_entry[0], json!("LIST"));
        assert_eq!(heap_entry[3], json!(["REF", id]));
    }

    #[test]
    fn plain_object_without_pprint_is_instance() {
        let mut registry = IdentityRegistry::new();
        let mut data = ObjectData::new_plain();
        data.set_prop("x", Value::Number(1.0));
        let obj = Value::object(data);
        let mut encoder = Encoder::new(&mut registry);
        let encoded = encoder.encode(&obj);
        let id = encoded[1].as_u64().unwrap();
        let heap_entry = encoder.heap.get(&id).unwrap();
        assert_eq!(heap_entry[0], json!("INSTANCE"));
        assert_eq!(heap_entry[2], json!(["x", 1.0]));
    }

    #[test]
    fn function_body_indentation_fixup_prepends_closing_brace_indent() {
        let func = FunctionValue {
            def: Rc::new(crate::ast::FunctionDef {
                name: "f".into(),
                params: vec![],
                body: vec![],
                source_range: (0, 0),
                is_expression: false,
            }),
            closure: crate::env::Env::new_global(),
            is_builtin: false,
            name: "f".into(),
            source_text: Some("function f() {\n  return 1;\n  }".to_string()),
        };
        let text = function_body_text(&func);
        assert!(text.starts_with("  function"));
    }
}
