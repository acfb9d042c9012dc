//! A small graph with two aliased branches joined by a single node.
//!
//! This example demonstrates:
//! - Declaring typed prototypes with `descriptor!`
//! - Placing one prototype twice under different aliases
//! - Joining both branches in a downstream node
//! - Finalizing, printing and running the graph

use owlgraph::prelude::*;
use std::sync::Arc;

// ============================================================================
// Step 1: Source Node
// ============================================================================

/// Trims and lowercases the incoming text.
fn load() -> NodePrototype {
    NodePrototype::new(
        "load",
        descriptor!("raw: str"),
        descriptor!("text: str"),
        |inputs: &FieldMap| {
            let raw = inputs["raw"].as_str().unwrap_or_default();
            Ok(fields! { "text" => raw.trim().to_lowercase() })
        },
    )
}

// ============================================================================
// Step 2: Translation Node
// ============================================================================

/// Word-by-word lookup; unknown words are kept as they are.
fn translate(table: &'static [(&'static str, &'static str)]) -> NodePrototype {
    NodePrototype::new(
        "translate",
        descriptor!("text: str"),
        descriptor!("text: str"),
        move |inputs: &FieldMap| {
            let text = inputs["text"].as_str().unwrap_or_default();
            let words: Vec<&str> = text
                .split_whitespace()
                .map(|word| {
                    table
                        .iter()
                        .find(|(from, _)| *from == word)
                        .map_or(word, |(_, to)| *to)
                })
                .collect();
            Ok(fields! { "text" => words.join(" ") })
        },
    )
}

const FRENCH: &[(&str, &str)] = &[("hello", "bonjour"), ("owl", "hibou"), ("night", "nuit")];
const SPANISH: &[(&str, &str)] = &[("hello", "hola"), ("owl", "búho"), ("night", "noche")];

// ============================================================================
// Step 3: Join Node
// ============================================================================

fn join() -> NodePrototype {
    NodePrototype::new(
        "join",
        descriptor!("fr_text: str, es_text: str"),
        descriptor!("summary: str"),
        |inputs: &FieldMap| {
            let fr = inputs["fr_text"].as_str().unwrap_or_default();
            let es = inputs["es_text"].as_str().unwrap_or_default();
            Ok(fields! { "summary" => format!("fr: {fr} | es: {es}") })
        },
    )
}

// ============================================================================
// Main: Build, Print and Run the Graph
// ============================================================================

fn main() -> Result<(), OrchestratorError> {
    println!("=== Owlgraph Translate Flow Example ===\n");

    let load = Arc::new(load());
    let join = Arc::new(join());

    let mut graph = Graph::new("translate");
    let source = graph.apply(&load, &[])?;

    // The same logic twice; each alias gets its own output namespace
    let french = graph.apply_as(&Arc::new(translate(FRENCH)), &[source], Some("fr"))?;
    let spanish = graph.apply_as(&Arc::new(translate(SPANISH)), &[source], Some("es"))?;
    graph.apply(&join, &[french, spanish])?;
    graph.finalize()?;

    println!("{}", graph.pretty_print());

    let results = graph.run(&fields! { "raw" => "  Hello Owl Night " })?;
    println!("\nResults:");
    for (key, value) in &results {
        println!("  {}: {}", key, value);
    }

    println!("\n=== Graph completed successfully! ===");
    Ok(())
}
