#![forbid(unsafe_code)]

//! Customer journey markup: model, validation, stable ids and cross-graph merge (headless).
//!
//! Design goals:
//! - the markup JSON round-trips through [`Markup`] without loss
//! - every derived decision (block ownership, implicit ends, procedure arrangement edges) is
//!   made once, in [`GraphModel`]
//! - deterministic outputs: no clocks, no randomness, insertion-ordered maps

pub mod config;
pub mod error;
pub mod geom;
pub mod graph;
pub mod markup;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod service_graph;
pub mod stable_id;
pub mod validate;

pub use config::CjmConfig;
pub use error::{Error, Result};
pub use graph::{
    BlockEdge, BlockModel, EdgeKind, EndGroup, EndMember, GraphModel, ModelOptions,
    ProcedureEdge, ProcedureEdgeOrigin, ProcedureModel,
};
pub use markup::parse_markup;
pub use merge::{
    GraphLevel, MergeBuilder, MergeNode, MergeOptions, MergeOutcome, MergeSelection,
};
pub use metrics::MergeMetrics;
pub use model::{
    Adjacency, EndSpec, EndType, ExternalId, GraphStats, Markup, Procedure, ProcedureMeta,
};
pub use service_graph::service_graph;
pub use stable_id::StableId;
pub use validate::{ValidateOptions, validate_markup};

#[cfg(test)]
mod tests;
