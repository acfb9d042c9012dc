use owlgraph::prelude::*;
use owlgraph::{BoxError, GenerationFailed};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers with the last user message reversed and counts its calls.
fn reverser(calls: Arc<AtomicUsize>) -> Arc<dyn GenerationCapability> {
    Arc::new(
        move |messages: &[Message], _options: &GenerationOptions| -> Result<String, BoxError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let last = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .ok_or("no user message")?;
            Ok(last.content.chars().rev().collect())
        },
    )
}

#[test]
fn test_two_outputs_fail_at_construction() {
    let calls = Arc::new(AtomicUsize::new(0));
    let err = NodePrototype::generation(
        "chat",
        descriptor!("messages: array"),
        descriptor!("answer: str, summary?: str"),
        reverser(calls.clone()),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let err = GenerationNodeBuilder::new("silent", reverser(calls))
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_missing_messages_never_reach_the_capability() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chat = NodePrototype::generation(
        "chat",
        TypeDescriptor::new(),
        descriptor!("answer: str"),
        reverser(calls.clone()),
    )
    .unwrap();

    let err = chat.run(&fields! { "question" => "hello" }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("messages"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_generation_node_inside_a_graph() {
    let calls = Arc::new(AtomicUsize::new(0));
    let prompt = Arc::new(NodePrototype::new(
        "prompt",
        descriptor!("question: str"),
        descriptor!("messages: array"),
        |inputs: &FieldMap| {
            Ok(fields! {
                "messages" => json!([
                    {"role": "system", "content": "answer backwards"},
                    {"role": "user", "content": inputs["question"]},
                ])
            })
        },
    ));
    let chat = Arc::new(
        GenerationNodeBuilder::new("chat", reverser(calls.clone()))
            .inputs(descriptor!("messages: array"))
            .outputs(descriptor!("answer: str"))
            .temperature(0.0)
            .build()
            .unwrap(),
    );

    let mut graph = Graph::new("qa");
    let first = graph.apply(&prompt, &[]).unwrap();
    graph.apply(&chat, &[first]).unwrap();
    graph.finalize().unwrap();

    let results = graph.run(&fields! { "question" => "owl" }).unwrap();
    assert_eq!(results["answer"], json!("lwo"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_capability_failure_is_an_execution_error() {
    let failing: Arc<dyn GenerationCapability> = Arc::new(
        |_: &[Message], _: &GenerationOptions| -> Result<String, BoxError> {
            Err("quota exceeded".into())
        },
    );
    let chat = Arc::new(
        NodePrototype::generation(
            "chat",
            descriptor!("messages: str"),
            descriptor!("answer: str"),
            failing,
        )
        .unwrap(),
    );
    let translated = Arc::new(chat.clone_as("chat_fr"));

    let report = Arc::new(NodePrototype::new(
        "report",
        descriptor!("fr_answer: str"),
        descriptor!("report: str"),
        |inputs: &FieldMap| Ok(fields! { "report" => inputs["fr_answer"].clone() }),
    ));

    let mut graph = Graph::new("failing");
    let fr = graph.apply_as(&translated, &[], Some("fr")).unwrap();
    graph.apply(&report, &[fr]).unwrap();

    let err = graph.run(&fields! { "messages" => "bonjour" }).unwrap_err();
    match &err {
        OrchestratorError::Invocation { label, source } => {
            assert_eq!(label, "chat_fr as fr");
            let inner = source
                .downcast_ref::<OrchestratorError>()
                .expect("node error");
            assert!(matches!(
                inner,
                OrchestratorError::Execution { node, .. } if node == "chat_fr"
            ));
        }
        other => panic!("expected an invocation error, got {other:?}"),
    }

    let top: &(dyn std::error::Error + 'static) = &err;
    let failure = std::iter::successors(Some(top), |e| e.source())
        .find_map(|e| e.downcast_ref::<GenerationFailed>());
    assert!(failure.is_some());
    assert_eq!(err.root_cause().to_string(), "quota exceeded");
}
