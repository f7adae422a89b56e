//! Descriptors of the tables a window query reads from and writes to.
//!
//! These are supplied by the catalog and binder; the planner only checks
//! them against the query.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::changelog::ChangelogMode;

/// SQL column type, as far as the planner needs to know it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Boolean,
    Int,
    BigInt,
    Varchar,
    /// `TIMESTAMP(precision)`; event-time attributes have this type.
    Timestamp(u8),
    /// Processing-time attribute declared with `PROCTIME()`.
    Proctime,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ColumnDescr {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnDescr {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// `WATERMARK FOR column AS column - INTERVAL delay`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WatermarkDecl {
    pub column: String,
    pub delay_millis: u64,
}

/// Input table of a window query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceDescr {
    pub table: String,
    pub columns: Vec<ColumnDescr>,
    /// Record kinds the connector produces.
    #[serde(default)]
    pub changelog_mode: ChangelogMode,
    #[serde(default)]
    pub watermarks: Vec<WatermarkDecl>,
}

impl SourceDescr {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDescr>) -> Self {
        Self {
            table: table.into(),
            columns,
            changelog_mode: ChangelogMode::InsertOnly,
            watermarks: Vec::new(),
        }
    }

    pub fn with_changelog_mode(mut self, mode: ChangelogMode) -> Self {
        self.changelog_mode = mode;
        self
    }

    pub fn with_watermark(mut self, column: impl Into<String>, delay_millis: u64) -> Self {
        self.watermarks.push(WatermarkDecl {
            column: column.into(),
            delay_millis,
        });
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescr> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn watermark_for(&self, column: &str) -> Option<&WatermarkDecl> {
        self.watermarks.iter().find(|w| w.column == column)
    }
}

/// Output table of a window query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SinkDescr {
    pub table: String,
    pub columns: Vec<ColumnDescr>,
    /// An insert-only sink rejects streams carrying corrections.
    #[serde(default = "default_insert_only")]
    pub insert_only: bool,
}

fn default_insert_only() -> bool {
    true
}

impl SinkDescr {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDescr>) -> Self {
        Self {
            table: table.into(),
            columns,
            insert_only: true,
        }
    }

    pub fn with_insert_only(mut self, insert_only: bool) -> Self {
        self.insert_only = insert_only;
        self
    }

    pub fn accepted_changelog_mode(&self) -> ChangelogMode {
        if self.insert_only {
            ChangelogMode::InsertOnly
        } else {
            ChangelogMode::WithUpdateBefore
        }
    }
}
