//! Changelog modes of streams flowing between plan nodes.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ConfigError;

/// Kind of a single change record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum RowKind {
    #[serde(rename = "+I")]
    Insert,
    #[serde(rename = "-U")]
    UpdateBefore,
    #[serde(rename = "+U")]
    UpdateAfter,
    #[serde(rename = "-D")]
    Delete,
}

impl RowKind {
    pub fn short_string(&self) -> &'static str {
        match self {
            Self::Insert => "+I",
            Self::UpdateBefore => "-U",
            Self::UpdateAfter => "+U",
            Self::Delete => "-D",
        }
    }

    /// `true` for records that add a row to the result.
    pub fn is_accumulate(&self) -> bool {
        matches!(self, Self::Insert | Self::UpdateAfter)
    }

    /// `true` for records that withdraw a previously added row.
    pub fn is_retract(&self) -> bool {
        !self.is_accumulate()
    }
}

impl Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_string())
    }
}

/// The set of record kinds a stream may carry.
///
/// Modes are ordered by the record kinds they admit:
///
/// | mode                  | record kinds         |
/// |-----------------------|----------------------|
/// | `InsertOnly`          | `+I`                 |
/// | `WithRetraction`      | `+I -D`              |
/// | `WithUpdateAfterOnly` | `+I +U -D`           |
/// | `WithUpdateBefore`    | `+I -U +U -D`        |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangelogMode {
    #[default]
    InsertOnly,
    WithRetraction,
    WithUpdateAfterOnly,
    WithUpdateBefore,
}

impl ChangelogMode {
    pub const ALL: [ChangelogMode; 4] = [
        Self::InsertOnly,
        Self::WithRetraction,
        Self::WithUpdateAfterOnly,
        Self::WithUpdateBefore,
    ];

    pub fn row_kinds(&self) -> &'static [RowKind] {
        match self {
            Self::InsertOnly => &[RowKind::Insert],
            Self::WithRetraction => &[RowKind::Insert, RowKind::Delete],
            Self::WithUpdateAfterOnly => &[RowKind::Insert, RowKind::UpdateAfter, RowKind::Delete],
            Self::WithUpdateBefore => &[
                RowKind::Insert,
                RowKind::UpdateBefore,
                RowKind::UpdateAfter,
                RowKind::Delete,
            ],
        }
    }

    pub fn contains(&self, kind: RowKind) -> bool {
        self.row_kinds().contains(&kind)
    }

    pub fn is_insert_only(&self) -> bool {
        *self == Self::InsertOnly
    }

    /// Returns `true` if every record a stream in this mode may carry is
    /// accepted by a consumer requiring `required`.
    pub fn satisfies(&self, required: ChangelogMode) -> bool {
        self.row_kinds().iter().all(|kind| required.contains(*kind))
    }

    /// Smallest mode that admits every kind in `kinds`.
    pub fn covering<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = RowKind>,
    {
        let kinds: Vec<RowKind> = kinds.into_iter().collect();
        Self::ALL
            .into_iter()
            .find(|mode| kinds.iter().all(|kind| mode.contains(*kind)))
            .unwrap_or(Self::WithUpdateBefore)
    }

    /// Parses a connector option such as `I,UA,UB,D`.
    pub fn from_short_string(s: &str) -> Result<Self, ConfigError> {
        let mut kinds = Vec::new();
        for token in s.split(',').map(str::trim) {
            let kind = match token {
                "I" => RowKind::Insert,
                "UB" => RowKind::UpdateBefore,
                "UA" => RowKind::UpdateAfter,
                "D" => RowKind::Delete,
                _ => return Err(ConfigError::InvalidChangelogMode(s.to_string())),
            };
            kinds.push(kind);
        }
        Ok(Self::covering(kinds))
    }
}

impl Display for ChangelogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&str> = self
            .row_kinds()
            .iter()
            .map(|kind| match kind {
                RowKind::Insert => "I",
                RowKind::UpdateBefore => "UB",
                RowKind::UpdateAfter => "UA",
                RowKind::Delete => "D",
            })
            .collect();
        write!(f, "[{}]", kinds.join(","))
    }
}
