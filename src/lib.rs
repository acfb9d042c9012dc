//! # Owlgraph
//!
//! Typed node graphs: declare units of work with typed inputs and outputs,
//! wire them into a directed acyclic graph and run them in dependency order.
//!
//! ## Features
//!
//! - **Typed Contracts**: every node declares the fields it consumes and produces
//! - **Checked Wiring**: edges are refused when the upstream cannot feed the downstream
//! - **Structural Validation**: cycles and orphan nodes are reported before anything runs
//! - **Aliasing**: place one prototype several times, each with its own output namespace
//! - **Optional LLM Integration**: generation-backed nodes over Ollama, DeepSeek and Gemini
//!   (feature-gated)
//!
//! ## Quick Start
//!
//! ```rust
//! use owlgraph::prelude::*;
//! use std::sync::Arc;
//!
//! let increment = Arc::new(NodePrototype::new(
//!     "increment",
//!     descriptor!("x: int"),
//!     descriptor!("y: int"),
//!     |inputs: &FieldMap| {
//!         let x = inputs["x"].as_i64().unwrap_or_default();
//!         Ok(fields! { "y" => x + 1 })
//!     },
//! ));
//! let double = Arc::new(NodePrototype::new(
//!     "double",
//!     descriptor!("y: int"),
//!     descriptor!("z: int"),
//!     |inputs: &FieldMap| {
//!         let y = inputs["y"].as_i64().unwrap_or_default();
//!         Ok(fields! { "z" => y * 2 })
//!     },
//! ));
//!
//! let mut graph = Graph::new("arith");
//! let first = graph.apply(&increment, &[])?;
//! graph.apply(&double, &[first])?;
//! graph.finalize()?;
//!
//! let results = graph.run(&fields! { "x" => 1 })?;
//! assert_eq!(results, fields! { "y" => 2, "z" => 4 });
//! # Ok::<(), owlgraph::OrchestratorError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`prelude`]: Commonly used types and traits (import with `use owlgraph::prelude::*`)
//! - `llm`: HTTP generation clients (requires the `llm` feature)

// ============================================================================
// Core Module
// ============================================================================

mod core;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Values and errors
pub use crate::core::error::{ErrorKind, OrchestratorError, Result};
pub use crate::core::{BoxError, FieldMap, NodeValue};

// Contracts
pub use crate::core::descriptor::{FieldType, TypeDescriptor, value_kind};

// Nodes
pub use crate::core::invocation::{InvocationId, NodeInvocation};
pub use crate::core::prototype::{NodeLogic, NodePrototype, NodePrototypeBuilder};
pub use crate::core::registry::NodeRegistry;

// Graphs
pub use crate::core::graph::{CollisionPolicy, Graph, GraphConfig, GraphState};
pub use crate::core::validation::{ValidationIssue, ValidationResult};

// Generation
pub use crate::core::generation::{
    GenerationCapability, GenerationFailed, GenerationNodeBuilder, GenerationOptions,
    MESSAGES_FIELD, Message, Role,
};

// Telemetry
pub use crate::core::telemetry::{LogTelemetry, MemoryTelemetry, Telemetry, TraceEntry};

// ============================================================================
// Prelude Module - Convenient Bulk Imports
// ============================================================================

/// The main prelude: imports everything you need to declare and run graphs.
///
/// # Example
/// ```rust
/// use owlgraph::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        CollisionPolicy,
        ErrorKind,
        FieldMap,
        FieldType,
        // Generation
        GenerationCapability,
        GenerationNodeBuilder,
        GenerationOptions,
        // Graphs
        Graph,
        GraphConfig,
        GraphState,
        InvocationId,
        MemoryTelemetry,
        Message,
        // Nodes
        NodeLogic,
        NodePrototype,
        NodeRegistry,
        // Values
        NodeValue,
        OrchestratorError,
        Role,
        Telemetry,
        TypeDescriptor,
    };
    pub use crate::{descriptor, fields};
}

// ============================================================================
// LLM Feature
// ============================================================================

#[cfg(feature = "llm")]
pub mod llm;

#[cfg(feature = "llm")]
pub use llm::{LlmClient, Provider, error::LlmError};

// ============================================================================
// Re-export commonly used external types for convenience
// ============================================================================

pub use serde_json::Value as JsonValue;

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
