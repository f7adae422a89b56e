//! Reference evaluator for window aggregate plans.
//!
//! [`PlanEvaluator`] interprets a [`PlanGraph`] over a finite changelog on a
//! single thread.  It is the executable definition of what a plan computes
//! and is used to check that plans which should be equivalent, such as a
//! split and an unsplit distinct aggregate, produce the same results.
//!
//! Window state is a multiset of input rows per window; inserts and
//! `+U` records add a row, `-U` and `-D` records remove one.  Aggregates are
//! computed from the multiset when the window closes:
//!
//! * event-time windows close once the watermark reaches their last
//!   millisecond (`end - 1`);
//! * processing-time windows close once the clock has passed their last
//!   millisecond.
//!
//! Records for windows that already closed are dropped.  Each window emits
//! its results exactly once, so plans with early firing or allowed lateness
//! are rejected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;
use winplan_ir::{AggregateConfig, NodeKind, NodeKindTag, PlanGraph, BUCKET_COLUMN};
use winplan_types::changelog::{ChangelogMode, RowKind};
use winplan_types::schema::SourceDescr;
use winplan_types::time::Timestamp;
use winplan_types::window::{TimeDomain, WindowSpec};

use crate::assigner::{assign, WindowInterval};
use crate::error::EvalError;
use crate::functions::{AggregateFunction, FunctionRegistry};
use crate::value::{bucket_of, Row, Value};

struct BoundCall {
    function: Arc<dyn AggregateFunction>,
    args: Vec<usize>,
    distinct: bool,
}

impl BoundCall {
    fn evaluate(&self, rows: &[(&Row, i64)]) -> Result<Value, EvalError> {
        let args_of = |row: &Row| -> Row { self.args.iter().map(|i| row[*i].clone()).collect() };

        let mut accumulator = self.function.create_accumulator();
        if self.distinct {
            let distinct: BTreeSet<Row> = rows.iter().map(|(row, _)| args_of(*row)).collect();
            for args in &distinct {
                accumulator.accumulate(args)?;
            }
        } else {
            for (row, weight) in rows {
                let args = args_of(*row);
                for _ in 0..*weight {
                    accumulator.accumulate(&args)?;
                }
            }
        }
        Ok(accumulator.value())
    }
}

/// An aggregate node bound to the column layout of its input.
struct BoundAggregate {
    group_keys: Vec<usize>,
    calls: Vec<BoundCall>,
}

impl BoundAggregate {
    fn bind(
        config: &AggregateConfig,
        input_columns: &[String],
        registry: &FunctionRegistry,
    ) -> Result<Self, EvalError> {
        let index_of = |column: &String| {
            input_columns
                .iter()
                .position(|c| c == column)
                .ok_or_else(|| EvalError::UnsupportedPlan(format!("unknown column '{column}'")))
        };

        let group_keys = config
            .group_keys
            .iter()
            .map(index_of)
            .collect::<Result<_, _>>()?;
        let calls = config
            .calls
            .iter()
            .map(|call| -> Result<BoundCall, EvalError> {
                let function =
                    registry
                        .get(&call.function)
                        .ok_or_else(|| EvalError::UnknownFunction {
                            name: call.function.clone(),
                        })?;
                Ok(BoundCall {
                    function: function.clone(),
                    args: call.args.iter().map(index_of).collect::<Result<_, _>>()?,
                    distinct: call.distinct,
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { group_keys, calls })
    }

    /// Groups rows with positive weight and evaluates every call per group.
    /// Returns one `group key ++ call results` row per group, ordered by
    /// group key.
    fn evaluate<'a, I>(&self, rows: I) -> Result<Vec<Row>, EvalError>
    where
        I: IntoIterator<Item = (&'a Row, i64)>,
    {
        let mut groups: BTreeMap<Row, Vec<(&Row, i64)>> = BTreeMap::new();
        for (row, weight) in rows {
            if weight > 0 {
                let key = self.group_keys.iter().map(|i| row[*i].clone()).collect();
                groups.entry(key).or_default().push((row, weight));
            }
        }

        groups
            .into_iter()
            .map(|(mut key, rows)| -> Result<Row, EvalError> {
                for call in &self.calls {
                    key.push(call.evaluate(&rows)?);
                }
                Ok(key)
            })
            .collect()
    }
}

enum Stages {
    Direct(BoundAggregate),
    Split {
        bucket_count: u32,
        bucket_columns: Vec<usize>,
        local: BoundAggregate,
        global: BoundAggregate,
    },
}

/// Single-threaded interpreter of a window aggregate plan.
pub struct PlanEvaluator {
    source: SourceDescr,
    source_mode: ChangelogMode,
    window: WindowSpec,
    time_index: Option<usize>,
    stages: Stages,
    projection: Vec<usize>,

    watermark: Timestamp,
    clock: Timestamp,
    windows: BTreeMap<WindowInterval, BTreeMap<Row, i64>>,
}

fn set_once<T: Clone>(slot: &mut Option<T>, value: &T, what: &str) -> Result<(), EvalError> {
    if slot.replace(value.clone()).is_some() {
        return Err(EvalError::UnsupportedPlan(format!(
            "plan has more than one {what}"
        )));
    }
    Ok(())
}

fn missing(what: &str) -> EvalError {
    EvalError::UnsupportedPlan(format!("plan has no {what}"))
}

impl PlanEvaluator {
    /// Prepares `graph` for evaluation, resolving aggregate functions in
    /// `registry`.
    ///
    /// Supports validated plans with a single source and sink whose
    /// aggregate uses the default emit policy.
    pub fn new(graph: &PlanGraph, registry: &FunctionRegistry) -> Result<Self, EvalError> {
        graph
            .validate()
            .map_err(|e| EvalError::UnsupportedPlan(e.to_string()))?;

        let mut source = None;
        let mut source_mode = ChangelogMode::InsertOnly;
        let mut window = None;
        let mut local = None;
        let mut aggregate = None;
        let mut sink = None;
        for node in graph.nodes() {
            match &node.kind {
                NodeKind::SourceAdapter(descr) => {
                    set_once(&mut source, descr, "source")?;
                    source_mode = node.changelog_mode;
                }
                NodeKind::WindowAssigner(spec) => set_once(&mut window, spec, "window assigner")?,
                NodeKind::DistinctSplitLocal(config) => set_once(&mut local, config, "local stage")?,
                NodeKind::WindowAggregate(config) | NodeKind::DistinctSplitGlobal(config) => {
                    set_once(&mut aggregate, config, "aggregate")?
                }
                NodeKind::Sink(config) => set_once(&mut sink, config, "sink")?,
            }
        }
        let source = source.ok_or_else(|| missing("source"))?;
        let window = window.ok_or_else(|| missing("window assigner"))?;
        let aggregate = aggregate.ok_or_else(|| missing("aggregate"))?;
        let sink = sink.ok_or_else(|| missing("sink"))?;
        if !aggregate.emit.is_default() {
            return Err(EvalError::UnsupportedPlan(format!(
                "emit policy {:?} is not supported",
                aggregate.emit
            )));
        }

        let source_columns: Vec<String> = source.columns.iter().map(|c| c.name.clone()).collect();
        let (stages, tag) = match local {
            None => (
                Stages::Direct(BoundAggregate::bind(&aggregate, &source_columns, registry)?),
                NodeKindTag::WindowAggregate,
            ),
            Some(local_config) => {
                let bucket = local_config
                    .bucket
                    .as_ref()
                    .ok_or_else(|| missing("bucket configuration"))?;
                let bucket_columns = bucket
                    .columns
                    .iter()
                    .map(|column| {
                        source
                            .column_index(column)
                            .ok_or_else(|| EvalError::UnsupportedPlan(format!(
                                "unknown bucket column '{column}'"
                            )))
                    })
                    .collect::<Result<_, _>>()?;

                // The local stage sees source rows extended with their bucket
                // and additionally groups by it.
                let mut local_input = source_columns.clone();
                local_input.push(BUCKET_COLUMN.to_string());
                let mut local = BoundAggregate::bind(&local_config, &local_input, registry)?;
                local.group_keys.push(source_columns.len());

                let global_input =
                    local_config.output_columns(NodeKindTag::DistinctSplitLocal);
                let global = BoundAggregate::bind(&aggregate, &global_input, registry)?;
                (
                    Stages::Split {
                        bucket_count: bucket.bucket_count,
                        bucket_columns,
                        local,
                        global,
                    },
                    NodeKindTag::DistinctSplitGlobal,
                )
            }
        };

        let output_columns = aggregate.output_columns(tag);
        let projection = sink
            .projection
            .iter()
            .map(|column| {
                output_columns
                    .iter()
                    .position(|c| c == column)
                    .ok_or_else(|| EvalError::UnsupportedPlan(format!("unknown column '{column}'")))
            })
            .collect::<Result<_, _>>()?;

        let time_index = match window.time_domain() {
            TimeDomain::EventTime => Some(
                source
                    .column_index(window.time_attribute())
                    .ok_or_else(|| missing("time attribute column"))?,
            ),
            TimeDomain::ProcessingTime => None,
        };

        Ok(Self {
            source,
            source_mode,
            window,
            time_index,
            stages,
            projection,
            watermark: Timestamp::MIN,
            clock: Timestamp::from_millis(0),
            windows: BTreeMap::new(),
        })
    }

    pub fn watermark(&self) -> Timestamp {
        self.watermark
    }

    pub fn processing_time(&self) -> Timestamp {
        self.clock
    }

    /// Number of windows with pending state.
    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    fn is_closed(&self, window: &WindowInterval) -> bool {
        match self.window.time_domain() {
            TimeDomain::EventTime => window.max_timestamp() <= self.watermark,
            TimeDomain::ProcessingTime => window.max_timestamp() < self.clock,
        }
    }

    /// Applies one change record of the source to the open windows.
    ///
    /// Processing-time plans assign the record to windows by the current
    /// [processing time](Self::processing_time); the value of the time
    /// attribute column is ignored.
    pub fn push(&mut self, kind: RowKind, row: Row) -> Result<(), EvalError> {
        if !self.source_mode.contains(kind) {
            return Err(EvalError::UnexpectedRowKind {
                kind,
                mode: self.source_mode,
            });
        }
        if row.len() != self.source.columns.len() {
            return Err(EvalError::RowArity {
                expected: self.source.columns.len(),
                actual: row.len(),
            });
        }
        if let Some((column, value)) = self
            .source
            .columns
            .iter()
            .zip(&row)
            .find(|(column, value)| !value.conforms_to(column.data_type))
        {
            return Err(EvalError::ColumnType {
                column: column.name.clone(),
                value: value.to_string(),
            });
        }

        let timestamp = match self.time_index {
            Some(index) => row[index]
                .as_timestamp()
                .ok_or_else(|| EvalError::InvalidTimestamp {
                    column: self.window.time_attribute().to_string(),
                    value: row[index].to_string(),
                })?,
            None => self.clock,
        };

        let weight = if kind.is_accumulate() { 1 } else { -1 };
        let windows: Vec<WindowInterval> = assign(timestamp, &self.window)
            .into_iter()
            .filter(|window| !self.is_closed(window))
            .collect();
        if windows.is_empty() {
            debug!("dropping late {kind} record at {timestamp}");
            return Ok(());
        }
        for window in windows {
            let rows = self.windows.entry(window).or_default();
            let count = rows.entry(row.clone()).or_insert(0);
            *count += weight;
            if *count == 0 {
                rows.remove(&row);
            }
        }
        Ok(())
    }

    /// Advances the watermark to `watermark` and returns the sink rows of
    /// the event-time windows that close.  A watermark that does not advance
    /// is ignored.
    pub fn advance_watermark(&mut self, watermark: Timestamp) -> Result<Vec<Row>, EvalError> {
        if watermark <= self.watermark {
            return Ok(Vec::new());
        }
        self.watermark = watermark;
        match self.window.time_domain() {
            TimeDomain::EventTime => self.fire(),
            TimeDomain::ProcessingTime => Ok(Vec::new()),
        }
    }

    /// Advances the clock to `now` and returns the sink rows of the
    /// processing-time windows that close.
    pub fn advance_processing_time(&mut self, now: Timestamp) -> Result<Vec<Row>, EvalError> {
        if now <= self.clock {
            return Ok(Vec::new());
        }
        self.clock = now;
        match self.window.time_domain() {
            TimeDomain::ProcessingTime => self.fire(),
            TimeDomain::EventTime => Ok(Vec::new()),
        }
    }

    fn fire(&mut self) -> Result<Vec<Row>, EvalError> {
        let closed: Vec<WindowInterval> = self
            .windows
            .keys()
            .filter(|window| self.is_closed(window))
            .copied()
            .collect();

        let mut output = Vec::new();
        for window in closed {
            let rows = self.windows.remove(&window).unwrap_or_default();
            for result in self.evaluate_window(&window, &rows)? {
                output.push(self.projection.iter().map(|i| result[*i].clone()).collect());
            }
        }
        Ok(output)
    }

    /// Computes the aggregate output rows of one window:
    /// group keys, call results, `window_start`, `window_end`.
    fn evaluate_window(
        &self,
        window: &WindowInterval,
        rows: &BTreeMap<Row, i64>,
    ) -> Result<Vec<Row>, EvalError> {
        let bounds = [Value::Timestamp(window.start), Value::Timestamp(window.end)];

        let mut results = match &self.stages {
            Stages::Direct(aggregate) => {
                aggregate.evaluate(rows.iter().map(|(row, weight)| (row, *weight)))?
            }
            Stages::Split {
                bucket_count,
                bucket_columns,
                local,
                global,
            } => {
                let bucketed: Vec<(Row, i64)> = rows
                    .iter()
                    .map(|(row, weight)| {
                        let values: Row = bucket_columns.iter().map(|i| row[*i].clone()).collect();
                        let bucket = bucket_of(&values, *bucket_count);
                        let mut row = row.clone();
                        row.push(Value::Int(i64::from(bucket)));
                        (row, *weight)
                    })
                    .collect();

                let partials: Vec<Row> = local
                    .evaluate(bucketed.iter().map(|(row, weight)| (row, *weight)))?
                    .into_iter()
                    .map(|mut partial| {
                        partial.extend(bounds.iter().cloned());
                        partial
                    })
                    .collect();
                global.evaluate(partials.iter().map(|row| (row, 1)))?
            }
        };

        for result in &mut results {
            result.extend(bounds.iter().cloned());
        }
        Ok(results)
    }
}
