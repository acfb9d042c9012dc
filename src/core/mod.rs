//! The graph construction and execution engine.
//!
//! - [`descriptor`]: typed field contracts
//! - [`prototype`]: reusable units of work
//! - [`invocation`]: placements of a prototype inside a graph
//! - [`graph`]: ordering, validation and execution
//! - [`generation`]: prototypes backed by a text generation capability

pub mod descriptor;
pub mod error;
pub mod generation;
pub mod graph;
pub mod invocation;
pub mod prototype;
pub mod registry;
pub mod telemetry;
pub mod validation;

use std::collections::HashMap;

/// The Alias for serde_json::Value since every field value is one
pub type NodeValue = serde_json::Value;

/// A mapping from field name to value: what nodes consume and produce.
pub type FieldMap = HashMap<String, NodeValue>;

/// Boxed error returned by node bodies and generation capabilities.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Builds a [`FieldMap`]: `fields! { "x" => 1, "name" => "owl" }`
#[macro_export]
macro_rules! fields {
    () => {
        $crate::FieldMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::FieldMap::new();
        $(
            map.insert(::std::string::String::from($key), $crate::NodeValue::from($value));
        )+
        map
    }};
}
