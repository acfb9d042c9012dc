use owlgraph::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn increment() -> Arc<NodePrototype> {
    Arc::new(NodePrototype::new(
        "increment",
        descriptor!("x: int"),
        descriptor!("y: int"),
        |inputs: &FieldMap| {
            let x = inputs["x"].as_i64().unwrap_or_default();
            Ok(fields! { "y" => x + 1 })
        },
    ))
}

fn add_one() -> Arc<NodePrototype> {
    Arc::new(NodePrototype::new(
        "add_one",
        descriptor!("y: int"),
        descriptor!("z: int"),
        |inputs: &FieldMap| {
            let y = inputs["y"].as_i64().unwrap_or_default();
            Ok(fields! { "z" => y + 1 })
        },
    ))
}

/// A node that counts how many times its body ran.
fn counted(
    name: &str,
    inputs: &str,
    output: &'static str,
    calls: Arc<AtomicUsize>,
) -> Arc<NodePrototype> {
    Arc::new(NodePrototype::new(
        name,
        inputs.parse().unwrap(),
        TypeDescriptor::requiring([(output, FieldType::Integer)]),
        move |_: &FieldMap| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(fields! { output => 1 })
        },
    ))
}

#[test]
fn test_round_trip() {
    let mut graph = Graph::new("arith");
    let first = graph.apply(&increment(), &[]).unwrap();
    graph.apply(&add_one(), &[first]).unwrap();
    graph.finalize().unwrap();

    let results = graph.run(&fields! { "x" => 1 }).unwrap();
    assert_eq!(results, fields! { "y" => 2, "z" => 3 });
    assert_eq!(graph.state(), GraphState::Completed);
}

#[test]
fn test_run_is_idempotent() {
    let mut graph = Graph::build("arith", |g| {
        let first = g.apply(&increment(), &[])?;
        g.apply(&add_one(), &[first])?;
        Ok(())
    })
    .unwrap();

    let inputs = fields! { "x" => 41 };
    let first = graph.run(&inputs).unwrap();
    let second = graph.run(&inputs).unwrap();
    assert_eq!(first, second);
    assert_eq!(first["z"], json!(43));
}

#[test]
fn test_type_mismatch_rejected_before_dispatch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut graph = Graph::new("strict");
    let strict = graph
        .apply(&counted("strict", "a: int", "b", calls.clone()), &[])
        .unwrap();
    graph
        .apply(&counted("sink", "b: int", "c", calls.clone()), &[strict])
        .unwrap();

    let err = graph.run(&fields! { "a" => "text" }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("strict"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(graph.state(), GraphState::Failed);
}

#[test]
fn test_cycle_fails_finalize_and_run_without_executing() {
    let calls = Arc::new(AtomicUsize::new(0));
    // relay feeds "b" back into right, closing right -> relay -> right.
    let relay = Arc::new(NodePrototype::new(
        "relay",
        descriptor!("a2: int"),
        descriptor!("b: int"),
        |_: &FieldMap| Ok(fields! { "b" => 0 }),
    ));
    let config = GraphConfig::default().collision_policy(CollisionPolicy::Overwrite);
    let mut graph = Graph::with_config("loop", config);
    let source = graph
        .apply(&counted("source", "", "a", calls.clone()), &[])
        .unwrap();
    let left = graph
        .apply(&counted("left", "a: int", "b", calls.clone()), &[source])
        .unwrap();
    let right = graph
        .apply(&counted("right", "b: int", "a2", calls.clone()), &[left])
        .unwrap();
    let relay = graph.apply(&relay, &[right]).unwrap();
    graph.connect(relay, right).unwrap();

    let err = graph.finalize().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("cycle detected"));
    assert_eq!(graph.state(), GraphState::Failed);

    let err = graph.run(&FieldMap::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(graph.pretty_print().contains("(cycle)"));
}

#[test]
fn test_connect_checks_the_new_edge() {
    let mut graph = Graph::new("edges");
    let first = graph.apply(&increment(), &[]).unwrap();
    let second = graph.apply(&add_one(), &[first]).unwrap();

    // add_one produces "z", increment needs "x".
    let err = graph.connect(second, first).unwrap_err();
    assert!(err.to_string().contains("missing keys [x]"));
    assert_eq!(graph.node(first).unwrap().inputs().len(), 0);
}

#[test]
fn test_orphans_are_listed_together() {
    let mut graph = Graph::new("lonely");
    let first = graph.apply(&increment(), &[]).unwrap();
    graph.apply(&add_one(), &[first]).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    graph
        .apply(&counted("stray", "", "s", calls.clone()), &[])
        .unwrap();
    graph
        .apply(&counted("lost", "", "l", calls.clone()), &[])
        .unwrap();

    let err = graph.finalize().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    let message = err.to_string();
    assert!(message.contains("stray") && message.contains("lost"));
    assert!(!message.contains("increment"));
}

#[test]
fn test_orphan_graph_never_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut graph = Graph::new("orphaned");
    graph
        .apply(&counted("inc", "x: int", "y", calls.clone()), &[])
        .unwrap();

    let err = graph.finalize().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(graph.state(), GraphState::Failed);

    let err = graph.run(&fields! { "x" => 1 }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_first_run_finalizes_the_graph() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut graph = Graph::new("unchecked");
    let first = graph.apply(&increment(), &[]).unwrap();
    graph.apply(&add_one(), &[first]).unwrap();
    graph
        .apply(&counted("stray", "", "s", calls.clone()), &[])
        .unwrap();

    let err = graph.run(&fields! { "x" => 1 }).unwrap_err();
    assert!(err.to_string().contains("orphan nodes detected"));
    assert_eq!(graph.state(), GraphState::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_aliases_keep_outputs_apart() {
    let load = Arc::new(NodePrototype::new(
        "load",
        descriptor!("source: str"),
        descriptor!("text: str"),
        |inputs: &FieldMap| Ok(fields! { "text" => inputs["source"].clone() }),
    ));
    let translate = Arc::new(NodePrototype::new(
        "translate",
        descriptor!("text: str"),
        descriptor!("translated: str"),
        |inputs: &FieldMap| {
            let text = inputs["text"].as_str().unwrap_or_default();
            Ok(fields! { "translated" => text.to_uppercase() })
        },
    ));
    let join = Arc::new(NodePrototype::new(
        "join",
        descriptor!("fr_translated: str, en_translated: str"),
        descriptor!("joined: str"),
        |inputs: &FieldMap| {
            let fr = inputs["fr_translated"].as_str().unwrap_or_default();
            let en = inputs["en_translated"].as_str().unwrap_or_default();
            Ok(fields! { "joined" => format!("{} / {}", fr, en) })
        },
    ));

    let mut graph = Graph::new("translations");
    let source = graph.apply(&load, &[]).unwrap();
    let fr = graph.apply_as(&translate, &[source], Some("fr")).unwrap();
    let en = graph.apply_as(&translate, &[source], Some("en")).unwrap();
    graph.apply(&join, &[fr, en]).unwrap();
    graph.finalize().unwrap();

    assert_eq!(graph.find("translate as fr"), Some(fr));
    let results = graph.run(&fields! { "source" => "owl" }).unwrap();
    assert_eq!(
        results,
        fields! {
            "text" => "owl",
            "fr_translated" => "OWL",
            "en_translated" => "OWL",
            "joined" => "OWL / OWL",
        }
    );
}

#[test]
fn test_visit_order_follows_dependencies() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut graph = Graph::new("diamond").with_telemetry(telemetry.clone());

    let top = graph.apply(&counted("top", "", "t", calls.clone()), &[]).unwrap();
    let left = graph
        .apply(&counted("left", "t: int", "l", calls.clone()), &[top])
        .unwrap();
    let right = graph
        .apply(&counted("right", "t: int", "r", calls.clone()), &[top])
        .unwrap();
    graph
        .apply(&counted("bottom", "l: int, r: int", "b", calls.clone()), &[left, right])
        .unwrap();
    graph.finalize().unwrap();

    let results = graph.run(&FieldMap::new()).unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(telemetry.visit_order(), vec!["top", "left", "right", "bottom"]);
    assert!(telemetry.get_traces().iter().all(|t| t.succeeded()));
}

#[test]
fn test_failure_aborts_the_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let telemetry = Arc::new(MemoryTelemetry::new());
    let boom = Arc::new(NodePrototype::new(
        "boom",
        descriptor!("y: int"),
        descriptor!("w: int"),
        |_: &FieldMap| Err("kaboom".into()),
    ));

    let mut graph = Graph::new("fragile").with_telemetry(telemetry.clone());
    let first = graph.apply(&increment(), &[]).unwrap();
    let failing = graph.apply(&boom, &[first]).unwrap();
    graph
        .apply(&counted("after", "w: int", "v", calls.clone()), &[failing])
        .unwrap();

    let err = graph.run(&fields! { "x" => 1 }).unwrap_err();
    match &err {
        OrchestratorError::Invocation { label, .. } => assert_eq!(label, "boom"),
        other => panic!("expected an invocation error, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert_eq!(
        err.to_string(),
        "invocation 'boom' failed: execution error in node 'boom': kaboom"
    );
    assert_eq!(err.root_cause().to_string(), "kaboom");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let traces = telemetry.get_traces();
    assert_eq!(traces.len(), 2);
    assert!(!traces[1].succeeded());
}

#[test]
fn test_connection_errors() {
    let mut graph = Graph::new("wiring");
    let first = graph.apply(&increment(), &[]).unwrap();

    // Duplicate label.
    let err = graph.apply(&increment(), &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    // Upstream does not provide "z".
    let needs_z = Arc::new(NodePrototype::passthrough(
        "needs_z",
        descriptor!("z: int"),
        descriptor!("q?: int"),
    ));
    let err = graph.apply(&needs_z, &[first]).unwrap_err();
    assert!(err.to_string().contains("missing keys [z]"));

    // Id from another graph.
    let mut other = Graph::new("other");
    let foreign = other.apply(&increment(), &[]).unwrap();
    let err = graph.apply(&add_one(), &[foreign]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(graph.connect(foreign, first).is_err());
}

#[test]
fn test_output_collision_policies() {
    let other_y = Arc::new(NodePrototype::new(
        "other_y",
        descriptor!("x: int"),
        descriptor!("y: int"),
        |_: &FieldMap| Ok(fields! { "y" => 100 }),
    ));

    let mut strict = Graph::new("strict");
    strict.apply(&increment(), &[]).unwrap();
    let err = strict.apply(&other_y, &[]).unwrap_err();
    assert!(matches!(err, OrchestratorError::Connection(msg) if msg.contains("[y]")));

    let config = GraphConfig::default().collision_policy(CollisionPolicy::Overwrite);
    let mut lenient = Graph::with_config("lenient", config);
    let first = lenient.apply(&increment(), &[]).unwrap();
    let second = lenient.apply(&other_y, &[]).unwrap();
    lenient.apply(&add_one(), &[first, second]).unwrap();

    let results = lenient.run(&fields! { "x" => 1 }).unwrap();
    assert_eq!(results["y"], json!(100));
    assert_eq!(results["z"], json!(101));
}

#[test]
fn test_initial_inputs_can_be_kept() {
    let config = GraphConfig::default().include_initial_inputs(true);
    let mut graph = Graph::with_config("keep", config);
    let first = graph.apply(&increment(), &[]).unwrap();
    graph.apply(&add_one(), &[first]).unwrap();

    let results = graph.run(&fields! { "x" => 1 }).unwrap();
    assert_eq!(results, fields! { "x" => 1, "y" => 2, "z" => 3 });
}

#[test]
fn test_place_from_registry() {
    let mut registry = NodeRegistry::new();
    registry.register(increment()).unwrap();
    registry.register(add_one()).unwrap();

    let mut graph = Graph::build("registered", |g| {
        let first = g.place(&registry, "increment", &[])?;
        g.place(&registry, "add_one", &[first])?;
        Ok(())
    })
    .unwrap();
    assert_eq!(graph.run(&fields! { "x" => 2 }).unwrap()["z"], json!(4));

    let err = Graph::build("unknown", |g| {
        g.place(&registry, "missing", &[])?;
        Ok(())
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[test]
fn test_static_check_reports_missing_initial_inputs() {
    let mut graph = Graph::new("checked");
    let first = graph.apply(&increment(), &[]).unwrap();
    graph.apply(&add_one(), &[first]).unwrap();

    assert!(graph.check(["x"]).is_safe());

    let report = graph.check(Vec::<String>::new());
    assert!(!report.is_safe());
    assert!(report.summary().contains("'x'"));
}

#[test]
fn test_clone_as_places_the_same_logic_twice() {
    let base = increment();
    let renamed = Arc::new(base.clone_as("increment_again"));
    let config = GraphConfig::default().collision_policy(CollisionPolicy::Overwrite);
    let mut graph = Graph::with_config("twice", config);
    let first = graph.apply(&base, &[]).unwrap();
    let second = graph.apply(&renamed, &[]).unwrap();
    graph.apply(&add_one(), &[first, second]).unwrap();
    graph.finalize().unwrap();

    assert_eq!(graph.len(), 3);
    let results = graph.run(&fields! { "x" => 1 }).unwrap();
    assert_eq!(results, fields! { "y" => 2, "z" => 3 });
}
