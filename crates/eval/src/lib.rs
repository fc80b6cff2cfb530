//! pricewise evaluator: decision graphs and pricing graphs over typed facts.
//!
//! The evaluator reads immutable snapshots (a graph, fact definitions and
//! a decision-tree library), coerces raw answers into a [`FactMap`], and
//! produces:
//!
//! - the next page of questions to ask ([`compute_page`]),
//! - costed line items for a pricing run ([`execute_pricing_graph`]),
//! - a price-range report with a tier ([`build_report`]),
//! - a decision-tree result ([`evaluate_decision_tree`]),
//! - a structural report on a graph ([`validate_graph_structure`]).
//!
//! Every evaluation is synchronous and owns its [`RuntimeContext`].
//! [`EstimateService`] wires the evaluator to an
//! [`EstimateStorage`](pricewise_storage::EstimateStorage) backend.

pub mod condition;
pub mod config;
pub mod context;
pub mod cost;
pub mod error;
pub mod expr;
pub mod fact;
pub mod graph;
pub mod numeric;
pub mod page;
pub mod pemdas;
pub mod pricing;
pub mod provenance;
pub mod report;
pub mod service;
pub mod tree;
pub mod validate;
pub mod value_expr;

pub use condition::Condition;
pub use config::{ConfigError, EngineConfig};
pub use context::RuntimeContext;
pub use cost::{ArithOp, Bucket, CostBreakdown, EvalValue};
pub use error::{ErrorKind, EvalError};
pub use fact::{assemble_facts, FactCatalog, FactMap, FactType, FactValue};
pub use graph::{load_graph, EntryConvention, GraphEdge, GraphNode, LoadedGraph, NodeKind};
pub use page::{compute_page, PageResult, DEFAULT_PAGE_SIZE};
pub use pricing::{execute_pricing, execute_pricing_graph, Category, CostLineItem, PricingRun};
pub use report::{build_report, PricingReport, TierAssignment, TierBoundary, TierTable};
pub use service::{EstimateService, ServiceError};
pub use tree::{evaluate_decision_tree, TreeLibrary, TreeOutcome};
pub use validate::{validate_graph_structure, validate_trees, ValidationReport};
pub use value_expr::ValueExpr;
