//! Compilation of the aggregate calls of a window query.
//!
//! Without distinct splitting a query compiles to a single
//! [`WindowAggregate`](winplan_ir::NodeKind::WindowAggregate).  With splitting,
//! a query with distinct calls compiles to two stages:
//!
//! * a local stage grouped by `(group_keys, window, bucket)`, where
//!   `bucket = hash(distinct arguments) % bucket_count`, that evaluates every
//!   call as written and names its outputs `$partial_<i>`;
//! * a global stage grouped by `(group_keys, window)` that combines the
//!   partial results of call `i` with the call's merge function.
//!
//! Every distinct value of the distinct arguments lands in exactly one
//! bucket, so per-bucket distinct results combine into the exact overall
//! result.

use std::collections::BTreeSet;

use tracing::debug;
use winplan_ir::{AggregateConfig, BucketConfig, EmitPolicy, NodeKindTag};
use winplan_types::aggregate::AggregateCall;
use winplan_types::config::DistinctSplitConfig;
use winplan_types::schema::SourceDescr;
use winplan_types::window::WindowSpec;

use crate::error::PlanError;
use crate::functions::FunctionRegistry;

/// Prefix of the output columns of the local stage of a split aggregate.
pub const PARTIAL_PREFIX: &str = "$partial_";

/// Result of compiling the aggregate calls of a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledAggregate {
    /// Local stage of a split aggregate.
    pub local: Option<AggregateConfig>,

    /// The aggregate producing the final results: the global stage of a
    /// split aggregate, or the only aggregate otherwise.
    pub global: AggregateConfig,

    /// Output columns: group keys, call outputs in query order, then
    /// `window_start` and `window_end`.
    pub output_schema: Vec<String>,
}

impl CompiledAggregate {
    pub fn is_split(&self) -> bool {
        self.local.is_some()
    }

    /// Node kind of [`Self::global`].
    pub fn global_kind(&self) -> NodeKindTag {
        if self.is_split() {
            NodeKindTag::DistinctSplitGlobal
        } else {
            NodeKindTag::WindowAggregate
        }
    }
}

pub struct AggregateCompiler<'a> {
    registry: &'a FunctionRegistry,
    split: &'a DistinctSplitConfig,
}

impl<'a> AggregateCompiler<'a> {
    pub fn new(registry: &'a FunctionRegistry, split: &'a DistinctSplitConfig) -> Self {
        Self { registry, split }
    }

    /// Checks `group_keys` and `calls` against `source` and the registry and
    /// compiles them over `spec`.
    pub fn compile(
        &self,
        source: &SourceDescr,
        group_keys: &[String],
        calls: &[AggregateCall],
        spec: &WindowSpec,
    ) -> Result<CompiledAggregate, PlanError> {
        self.check(source, group_keys, calls)?;

        let global = AggregateConfig {
            window: spec.clone(),
            group_keys: group_keys.to_vec(),
            calls: calls.to_vec(),
            split_enabled: false,
            bucket: None,
            emit: EmitPolicy::default(),
        };

        let compiled = match self.split_columns(calls) {
            Some(columns) => self.split(global, columns),
            None => CompiledAggregate {
                output_schema: global.output_columns(NodeKindTag::WindowAggregate),
                local: None,
                global,
            },
        };
        Ok(compiled)
    }

    fn check(
        &self,
        source: &SourceDescr,
        group_keys: &[String],
        calls: &[AggregateCall],
    ) -> Result<(), PlanError> {
        let column_exists = |column: &String| {
            if source.column(column).is_some() {
                Ok(())
            } else {
                Err(PlanError::UnknownColumn {
                    table: source.table.clone(),
                    column: column.clone(),
                })
            }
        };

        group_keys.iter().try_for_each(column_exists)?;
        for call in calls {
            let function =
                self.registry
                    .get(&call.function)
                    .ok_or_else(|| PlanError::UnknownFunction {
                        name: call.function.clone(),
                    })?;
            if !function.accepts_arity(call.args.len()) || (call.distinct && call.args.is_empty())
            {
                return Err(PlanError::InvalidArity {
                    function: call.function.clone(),
                    arity: call.args.len(),
                });
            }
            call.args.iter().try_for_each(column_exists)?;
        }

        let mut names = BTreeSet::new();
        let outputs = group_keys
            .iter()
            .map(String::as_str)
            .chain(calls.iter().map(|call| call.name.as_str()))
            .chain([winplan_ir::WINDOW_START, winplan_ir::WINDOW_END]);
        for name in outputs {
            if !names.insert(name) {
                return Err(PlanError::DuplicateColumn {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns the distinct argument columns to bucket by if `calls` should
    /// be split, `None` if they compile to a single aggregate.
    fn split_columns(&self, calls: &[AggregateCall]) -> Option<Vec<String>> {
        let mut distinct = calls.iter().filter(|call| call.distinct);
        let first = distinct.next()?;
        if !self.split.enabled {
            return None;
        }
        if let Some(other) = distinct.find(|call| call.args != first.args) {
            debug!(
                "not splitting distinct aggregates: '{}' and '{}' use different arguments",
                first, other
            );
            return None;
        }
        for call in calls {
            let mergeable = self
                .registry
                .get(&call.function)
                .and_then(|function| function.merge_function())
                .is_some_and(|merge| self.registry.get(merge).is_some());
            if !mergeable {
                debug!(
                    "not splitting distinct aggregates: '{}' has no merge function",
                    call
                );
                return None;
            }
        }
        Some(first.args.clone())
    }

    fn split(&self, unsplit: AggregateConfig, columns: Vec<String>) -> CompiledAggregate {
        let bucket = BucketConfig {
            bucket_count: self.split.bucket_count,
            columns,
        };

        let local_calls: Vec<AggregateCall> = unsplit
            .calls
            .iter()
            .enumerate()
            .map(|(i, call)| AggregateCall {
                name: format!("{PARTIAL_PREFIX}{i}"),
                ..call.clone()
            })
            .collect();
        let global_calls: Vec<AggregateCall> = unsplit
            .calls
            .iter()
            .zip(&local_calls)
            .map(|(call, partial)| {
                let merge = self
                    .registry
                    .get(&call.function)
                    .and_then(|function| function.merge_function())
                    .unwrap_or(call.function.as_str());
                AggregateCall::new(merge, &[partial.name.as_str()], &call.name)
            })
            .collect();

        let local = AggregateConfig {
            calls: local_calls,
            split_enabled: true,
            bucket: Some(bucket),
            ..unsplit
        };
        let global = AggregateConfig {
            calls: global_calls,
            ..local.clone()
        };
        debug!(
            "split distinct aggregates into {} buckets over [{}]",
            self.split.bucket_count,
            local
                .bucket
                .as_ref()
                .map(|b| b.columns.join(", "))
                .unwrap_or_default()
        );

        CompiledAggregate {
            output_schema: global.output_columns(NodeKindTag::DistinctSplitGlobal),
            local: Some(local),
            global,
        }
    }
}
