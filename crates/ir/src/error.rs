use std::borrow::Cow;

use serde::Serialize;
use thiserror::Error;
use winplan_types::error::DetailedError;

use crate::plan::{NodeId, NodeKindTag};

/// A violation of the structural invariants of a [`PlanGraph`](crate::PlanGraph).
#[derive(Clone, Debug, Error, Serialize, PartialEq, Eq)]
pub enum GraphError {
    #[error("The plan has no nodes.")]
    Empty,

    #[error("Node id {0} is used more than once.")]
    DuplicateId(NodeId),

    /// Inputs must refer to nodes defined earlier in the plan.
    #[error("Node {node} reads from node {input}, which is not defined before it.")]
    UndefinedInput { node: NodeId, input: NodeId },

    #[error("{kind} node {node} expects {expected} input(s) but has {actual}.")]
    InputArity {
        node: NodeId,
        kind: NodeKindTag,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} node {node} cannot read from {input_kind} node {input}.")]
    UnexpectedInputKind {
        node: NodeId,
        kind: NodeKindTag,
        input: NodeId,
        input_kind: NodeKindTag,
    },

    #[error("Node {node} uses a different window than its input {input}.")]
    WindowMismatch { node: NodeId, input: NodeId },

    #[error("{kind} node {node} has a distinct split configuration that does not match its kind.")]
    InconsistentSplit { node: NodeId, kind: NodeKindTag },

    #[error("{kind} node {node} is not consumed by any node.")]
    DanglingNode { node: NodeId, kind: NodeKindTag },

    #[error("More than one sink writes to table '{table}'.")]
    DuplicateSink { table: String },

    #[error("Sink node {node} writes {actual} column(s) to a table with {expected}.")]
    ProjectionArity {
        node: NodeId,
        expected: usize,
        actual: usize,
    },

    #[error("Node {node} references column '{column}', which its input does not produce.")]
    UnknownColumn { node: NodeId, column: String },
}

impl DetailedError for GraphError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Empty => Cow::from("EmptyPlan"),
            Self::DuplicateId(_) => Cow::from("DuplicateNodeId"),
            Self::UndefinedInput { .. } => Cow::from("UndefinedInput"),
            Self::InputArity { .. } => Cow::from("InputArity"),
            Self::UnexpectedInputKind { .. } => Cow::from("UnexpectedInputKind"),
            Self::WindowMismatch { .. } => Cow::from("WindowMismatch"),
            Self::InconsistentSplit { .. } => Cow::from("InconsistentSplit"),
            Self::DanglingNode { .. } => Cow::from("DanglingNode"),
            Self::DuplicateSink { .. } => Cow::from("DuplicateSink"),
            Self::ProjectionArity { .. } => Cow::from("ProjectionArity"),
            Self::UnknownColumn { .. } => Cow::from("UnknownColumn"),
        }
    }
}

/// Failure to reconstruct a plan from its JSON form.
///
/// Decoding is all-or-nothing: any error rejects the whole document.
#[derive(Clone, Debug, Error, Serialize, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Plan is not valid JSON: {0}")]
    Json(String),

    #[error("Plan must be a JSON array of nodes.")]
    NotAnArray,

    #[error("Node at position {index} is malformed: {message}")]
    MalformedNode { index: usize, message: String },

    #[error("Node at position {index} has unknown kind '{kind}'.")]
    UnknownKind { index: usize, kind: String },

    #[error("{kind} node {node} has schema version {version}; this decoder supports versions 1 to {supported}.")]
    UnsupportedVersion {
        node: NodeId,
        kind: NodeKindTag,
        version: u32,
        supported: u32,
    },

    #[error("Node id {0} is used more than once.")]
    DuplicateId(NodeId),

    #[error("Node {node} reads from node {input}, which is not defined before it.")]
    DanglingInput { node: NodeId, input: NodeId },

    #[error("{kind} node {node} has an invalid configuration: {message}")]
    InvalidConfig {
        node: NodeId,
        kind: NodeKindTag,
        message: String,
    },

    #[error("Decoded plan is invalid: {0}")]
    InvalidGraph(#[from] GraphError),

    #[error("Unable to read plan archive: {0}")]
    Archive(String),
}

impl DetailedError for DecodeError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Json(_) => Cow::from("InvalidJson"),
            Self::NotAnArray => Cow::from("NotAnArray"),
            Self::MalformedNode { .. } => Cow::from("MalformedNode"),
            Self::UnknownKind { .. } => Cow::from("UnknownNodeKind"),
            Self::UnsupportedVersion { .. } => Cow::from("UnsupportedSchemaVersion"),
            Self::DuplicateId(_) => Cow::from("DuplicateNodeId"),
            Self::DanglingInput { .. } => Cow::from("DanglingInput"),
            Self::InvalidConfig { .. } => Cow::from("InvalidNodeConfig"),
            Self::InvalidGraph(e) => e.error_code(),
            Self::Archive(_) => Cow::from("InvalidArchive"),
        }
    }
}
