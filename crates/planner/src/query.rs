use serde::{Deserialize, Serialize};
use winplan_ir::{WINDOW_END, WINDOW_START};
use winplan_types::aggregate::AggregateCall;
use winplan_types::schema::{SinkDescr, SourceDescr};
use winplan_types::window::WindowSpec;

use crate::error::PlanError;

/// One item of the select list of a window aggregate query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectItem {
    GroupKey(String),
    WindowStart,
    WindowEnd,
    /// Output of the aggregate call with this name.
    Aggregate(String),
}

/// A bound window aggregate query:
///
/// ```sql
/// INSERT INTO sink
/// SELECT <select>
/// FROM TABLE(<window>(TABLE source, DESCRIPTOR(time_attribute), ...))
/// GROUP BY <group_keys>, window_start, window_end
/// ```
///
/// Produced by the SQL binder; the planner checks it against the source and
/// sink descriptors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WindowAggregateQuery {
    pub source: SourceDescr,
    pub window: WindowSpec,
    #[serde(default)]
    pub group_keys: Vec<String>,
    pub calls: Vec<AggregateCall>,
    /// Sink columns in order.  An empty list selects the aggregate output
    /// schema as is.
    #[serde(default)]
    pub select: Vec<SelectItem>,
    pub sink: SinkDescr,
}

impl WindowAggregateQuery {
    pub fn new(source: SourceDescr, window: WindowSpec, sink: SinkDescr) -> Self {
        Self {
            source,
            window,
            group_keys: Vec::new(),
            calls: Vec::new(),
            select: Vec::new(),
            sink,
        }
    }

    pub fn group_by(mut self, keys: &[&str]) -> Self {
        self.group_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn call(mut self, call: AggregateCall) -> Self {
        self.calls.push(call);
        self
    }

    pub fn select(mut self, items: Vec<SelectItem>) -> Self {
        self.select = items;
        self
    }

    /// Resolves the select list against the aggregate output schema,
    /// returning the output column written to each sink column.
    pub fn projection(&self, output_schema: &[String]) -> Result<Vec<String>, PlanError> {
        let projection: Vec<String> = if self.select.is_empty() {
            output_schema.to_vec()
        } else {
            self.select
                .iter()
                .map(|item| match item {
                    SelectItem::GroupKey(key) if self.group_keys.contains(key) => Ok(key.clone()),
                    SelectItem::GroupKey(key) => Err(PlanError::InvalidSelect {
                        reason: format!("'{key}' is not a grouping column"),
                    }),
                    SelectItem::WindowStart => Ok(WINDOW_START.to_string()),
                    SelectItem::WindowEnd => Ok(WINDOW_END.to_string()),
                    SelectItem::Aggregate(name) if self.calls.iter().any(|c| &c.name == name) => {
                        Ok(name.clone())
                    }
                    SelectItem::Aggregate(name) => Err(PlanError::InvalidSelect {
                        reason: format!("no aggregate call is named '{name}'"),
                    }),
                })
                .collect::<Result<_, _>>()?
        };

        if projection.len() != self.sink.columns.len() {
            return Err(PlanError::InvalidSelect {
                reason: format!(
                    "query produces {} column(s) but sink '{}' has {}",
                    projection.len(),
                    self.sink.table,
                    self.sink.columns.len()
                ),
            });
        }
        Ok(projection)
    }
}
