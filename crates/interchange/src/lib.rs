//! pricewise-interchange: persisted snapshot records and deserialization.
//!
//! Provides typed structs for everything the pricing engine reads from
//! storage (graph nodes and edges, fact definitions, decision trees,
//! expression nodes, variable bindings) and a single `from_bundle_json()`
//! entry point that deserializes a `serde_json::Value` bundle into an
//! `EstimateBundle`.
//!
//! Condition trees and pricing configuration payloads are kept as
//! `serde_json::Value` here. The evaluator parses them into closed
//! variant types when a graph is loaded, so an unrecognized shape is
//! reported once, at the boundary, with the offending JSON attached.

pub mod deserialize;
pub mod types;

pub use deserialize::{from_bundle_json, InterchangeError};
pub use types::*;
