//! Executable window aggregation plans and their persisted JSON form.
//!
//! A [`PlanGraph`] is a small DAG of typed nodes:
//!
//! ```text
//! SourceAdapter -> WindowAssigner -> WindowAggregate -> Sink
//! SourceAdapter -> WindowAssigner -> DistinctSplitLocal -> DistinctSplitGlobal -> Sink
//! ```
//!
//! [`codec`] encodes a graph as a versioned JSON document and decodes it
//! back.  Decoding either yields a graph that passes
//! [`PlanGraph::validate`] or fails as a whole.

pub mod codec;
pub mod error;
pub mod plan;

pub use codec::{deserialize, from_json_str, from_zip, serialize, to_json_string, to_zip};
pub use error::{DecodeError, GraphError};
pub use plan::{
    AggregateConfig, BucketConfig, EmitPolicy, ExecPlanNode, NodeId, NodeKind, NodeKindTag,
    PlanGraph, SinkConfig, BUCKET_COLUMN, WINDOW_END, WINDOW_START,
};
