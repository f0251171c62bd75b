//! End-to-end scenarios driving the full pipeline (wrap -> parse ->
//! interpret -> engine -> finalize) through the public `trace_source` entry
//! point, one per concrete scenario this tracer is expected to reproduce.

use js_tracer::{trace_source, TraceOptions};
use pretty_assertions_sorted::assert_eq_sorted;
use test_case::test_case;
use trace_schema::schema::EventKind;

#[test_case("var x=1;", vec!["x"] ; "single declaration")]
#[test_case("var x=1; var y=2;", vec!["x", "y"] ; "two declarations")]
#[test_case("var x=1; var y=2; var z=x+y;", vec!["x", "y", "z"] ; "three declarations")]
fn ordered_globals_match_declaration_order(code: &str, expected: Vec<&str>) {
    let trace = trace_source(code, TraceOptions::default()).unwrap();
    let last = trace.trace.last().unwrap();
    assert_eq_sorted!(last.ordered_globals, expected);
}

#[test]
fn three_var_decls_produce_three_step_lines_with_final_globals() {
    let trace = trace_source("var x=1; var y=2; var z=x+y;", TraceOptions::default()).unwrap();
    let step_lines: Vec<_> = trace
        .trace
        .iter()
        .filter(|e| e.event == EventKind::StepLine)
        .collect();
    assert_eq!(step_lines.len(), 3);
    let last = step_lines.last().unwrap();
    assert_eq!(last.globals["x"], serde_json::json!(1));
    assert_eq!(last.globals["y"], serde_json::json!(2));
    assert_eq!(last.globals["z"], serde_json::json!(3));
    assert!(last.heap.is_empty());
}

#[test]
fn call_and_return_expose_the_argument_then_the_return_value() {
    let trace = trace_source(
        "function f(n){return n+1;} var r=f(41);",
        TraceOptions::default(),
    )
    .unwrap();

    let call = trace
        .trace
        .iter()
        .find(|e| e.event == EventKind::Call)
        .expect("a call entry");
    let top = call.stack_to_render.last().unwrap();
    assert_eq!(top.func_name, "f");
    assert_eq!(top.encoded_locals["n"], serde_json::json!(41));

    let ret = trace
        .trace
        .iter()
        .find(|e| e.event == EventKind::Return && e.stack_to_render.last().unwrap().func_name == "f")
        .expect("a return entry for f");
    assert_eq!(
        ret.stack_to_render.last().unwrap().encoded_locals["__return__"],
        serde_json::json!(42)
    );

    let last = trace.trace.last().unwrap();
    assert_eq!(last.globals["r"], serde_json::json!(42));
}

#[test]
fn cyclic_array_self_reference_collapses_to_one_heap_entry() {
    let trace = trace_source("var a=[1,2]; a.push(a);", TraceOptions::default()).unwrap();
    let last = trace.trace.last().unwrap();
    assert_eq!(last.heap.len(), 1);
    let (&id, encoding) = last.heap.iter().next().unwrap();
    assert_eq!(encoding, &serde_json::json!(["LIST", 1, 2, ["REF", id]]));
}

#[test]
fn constructor_call_suffixes_frame_name_and_resolves_return_to_receiver() {
    let trace = trace_source(
        "function C(){this.x=1;} var o=new C();",
        TraceOptions::default(),
    )
    .unwrap();

    let call = trace
        .trace
        .iter()
        .find(|e| e.event == EventKind::Call)
        .unwrap();
    assert!(call.stack_to_render.last().unwrap().func_name.ends_with(" (constructor)"));

    let last = trace.trace.last().unwrap();
    let o_ref = &last.globals["o"];
    let id = o_ref[1].as_u64().unwrap();
    let encoded = &last.heap[&id];
    assert_eq!(encoded[0], "INSTANCE");
    assert!(encoded
        .as_array()
        .unwrap()
        .iter()
        .any(|pair| pair.as_array().map(|p| p[0] == "x" && p[1] == 1).unwrap_or(false)));
}

#[test]
fn function_declarations_are_callable_before_their_textual_position() {
    let trace = trace_source(
        "var r=f(41); function f(n){return n+1;}",
        TraceOptions::default(),
    )
    .unwrap();
    let last = trace.trace.last().unwrap();
    assert_eq!(last.globals["r"], serde_json::json!(42));
}

#[test]
fn uncaught_throw_ends_the_trace_on_an_exception_entry() {
    let trace = trace_source("throw new Error('boom');", TraceOptions::default()).unwrap();
    let last = trace.trace.last().unwrap();
    assert_eq!(last.event, EventKind::Exception);
    assert!(last.exception_msg.as_ref().unwrap().contains("boom"));
}

#[test]
fn syntax_error_yields_single_uncaught_exception_with_independent_location() {
    let trace = trace_source("var bad = (;", TraceOptions::default()).unwrap();
    assert_eq!(trace.trace.len(), 1);
    let entry = &trace.trace[0];
    assert_eq!(entry.event, EventKind::UncaughtException);
    assert_eq!(entry.line, 1);
}

#[test]
fn instruction_limit_emits_terminal_entry_and_stops() {
    let code = "var i=0; while(true){ i=i+1; }";
    let options = TraceOptions {
        max_executed_lines: Some(5),
        ..Default::default()
    };
    let trace = trace_source(code, options).unwrap();
    assert_eq!(trace.trace.len(), 6);
    assert_eq!(
        trace.trace.last().unwrap().event,
        EventKind::InstructionLimitReached
    );
}
