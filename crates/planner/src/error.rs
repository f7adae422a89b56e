use std::borrow::Cow;

use serde::Serialize;
use thiserror::Error;
use winplan_ir::GraphError;
use winplan_types::changelog::{ChangelogMode, RowKind};
use winplan_types::error::{ConfigError, DetailedError};
use winplan_types::window::TimeDomain;

/// Failure to compile a window aggregate query into a plan.
#[derive(Clone, Debug, Error, Serialize, PartialEq, Eq)]
pub enum PlanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Event-time window on '{table}.{column}' requires a watermark declared on '{column}'.")]
    WatermarkRequired { table: String, column: String },

    #[error("Sink '{sink}' accepts {accepted} records, but the window aggregate produces {produced}.")]
    ChangelogIncompatible {
        sink: String,
        produced: ChangelogMode,
        accepted: ChangelogMode,
    },

    #[error("Unknown aggregate function '{name}'.")]
    UnknownFunction { name: String },

    #[error("Aggregate function '{name}' is already registered.")]
    DuplicateFunction { name: String },

    #[error("Aggregate function '{function}' cannot be called with {arity} argument(s).")]
    InvalidArity { function: String, arity: usize },

    #[error("Table '{table}' has no column '{column}'.")]
    UnknownColumn { table: String, column: String },

    #[error("Column '{column}' of type {data_type} cannot be used as a {time_domain:?} attribute.")]
    InvalidTimeAttribute {
        column: String,
        data_type: String,
        time_domain: TimeDomain,
    },

    #[error("Output column '{name}' is defined more than once.")]
    DuplicateColumn { name: String },

    #[error("Invalid select list: {reason}")]
    InvalidSelect { reason: String },

    #[error("Generated plan is invalid: {0}")]
    Graph(#[from] GraphError),
}

impl DetailedError for PlanError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Config(e) => e.error_code(),
            Self::WatermarkRequired { .. } => Cow::from("WatermarkRequired"),
            Self::ChangelogIncompatible { .. } => Cow::from("ChangelogIncompatible"),
            Self::UnknownFunction { .. } => Cow::from("UnknownFunction"),
            Self::DuplicateFunction { .. } => Cow::from("DuplicateFunction"),
            Self::InvalidArity { .. } => Cow::from("InvalidArity"),
            Self::UnknownColumn { .. } => Cow::from("UnknownColumn"),
            Self::InvalidTimeAttribute { .. } => Cow::from("InvalidTimeAttribute"),
            Self::DuplicateColumn { .. } => Cow::from("DuplicateColumn"),
            Self::InvalidSelect { .. } => Cow::from("InvalidSelect"),
            Self::Graph(e) => e.error_code(),
        }
    }
}

/// Failure while evaluating a plan over concrete rows.
#[derive(Clone, Debug, Error, Serialize, PartialEq, Eq)]
pub enum EvalError {
    #[error("Plan cannot be evaluated: {0}")]
    UnsupportedPlan(String),

    #[error("Unknown aggregate function '{name}'.")]
    UnknownFunction { name: String },

    #[error("Row has {actual} column(s); the source has {expected}.")]
    RowArity { expected: usize, actual: usize },

    #[error("Source in {mode} mode cannot produce {kind} records.")]
    UnexpectedRowKind { kind: RowKind, mode: ChangelogMode },

    #[error("Value {value} does not fit column '{column}'.")]
    ColumnType { column: String, value: String },

    #[error("Time attribute '{column}' must be a non-null timestamp, found {value}.")]
    InvalidTimestamp { column: String, value: String },

    #[error("Aggregate function '{function}' cannot accumulate {value}.")]
    TypeMismatch { function: String, value: String },

    #[error("Aggregate function '{function}' overflowed.")]
    Overflow { function: String },
}

impl DetailedError for EvalError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::UnsupportedPlan(_) => Cow::from("UnsupportedPlan"),
            Self::UnknownFunction { .. } => Cow::from("UnknownFunction"),
            Self::RowArity { .. } => Cow::from("RowArity"),
            Self::UnexpectedRowKind { .. } => Cow::from("UnexpectedRowKind"),
            Self::ColumnType { .. } => Cow::from("ColumnType"),
            Self::InvalidTimestamp { .. } => Cow::from("InvalidTimestamp"),
            Self::TypeMismatch { .. } => Cow::from("TypeMismatch"),
            Self::Overflow { .. } => Cow::from("Overflow"),
        }
    }
}
