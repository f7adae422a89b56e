//! Compiler from window aggregate queries to executable plans.
//!
//! ```text
//! WindowAggregateQuery
//!   -> AggregateCompiler   (functions, columns, distinct split)
//!   -> ChangelogResolver   (modes along the plan edges, sink check)
//!   -> builder::build      (PlanGraph with ids 0..n)
//! ```
//!
//! The resulting [`PlanGraph`] can be persisted with [`winplan_ir::codec`] and
//! interpreted with [`eval::PlanEvaluator`].

pub mod aggregate;
pub mod assigner;
pub mod builder;
pub mod changelog;
pub mod error;
pub mod eval;
pub mod functions;
pub mod query;
pub mod value;


use tracing::{debug, info};
use winplan_ir::PlanGraph;
use winplan_types::config::CompilerConfig;
use winplan_types::schema::{DataType, SourceDescr};
use winplan_types::window::{TimeDomain, WindowSpec};

pub use aggregate::{AggregateCompiler, CompiledAggregate};
pub use assigner::{assign, WindowInterval};
pub use changelog::{ChangelogResolver, ResolvedChangelog};
pub use error::{EvalError, PlanError};
pub use eval::PlanEvaluator;
pub use functions::{Accumulator, AggregateFunction, FunctionRegistry};
pub use query::{SelectItem, WindowAggregateQuery};
pub use value::{Row, Value};

/// Checks that the time attribute of `spec` is a column of `source` suitable
/// for the window's time domain.
fn check_time_attribute(source: &SourceDescr, spec: &WindowSpec) -> Result<(), PlanError> {
    let column = spec.time_attribute();
    let descr = source.column(column).ok_or_else(|| PlanError::UnknownColumn {
        table: source.table.clone(),
        column: column.to_string(),
    })?;

    let valid_type = match spec.time_domain() {
        TimeDomain::EventTime => matches!(descr.data_type, DataType::Timestamp(_)),
        TimeDomain::ProcessingTime => descr.data_type == DataType::Proctime,
    };
    if !valid_type {
        return Err(PlanError::InvalidTimeAttribute {
            column: column.to_string(),
            data_type: format!("{:?}", descr.data_type),
            time_domain: spec.time_domain(),
        });
    }

    if spec.is_event_time() && source.watermark_for(column).is_none() {
        return Err(PlanError::WatermarkRequired {
            table: source.table.clone(),
            column: column.to_string(),
        });
    }
    Ok(())
}

/// Compiles `query` into an executable plan.
///
/// Compilation has no side effects besides logging; compiling equal inputs
/// yields equal plans.
pub fn compile(
    query: &WindowAggregateQuery,
    config: &CompilerConfig,
    registry: &FunctionRegistry,
) -> Result<PlanGraph, PlanError> {
    config.validate()?;
    check_time_attribute(&query.source, &query.window)?;

    let compiled = AggregateCompiler::new(registry, &config.distinct_agg_split).compile(
        &query.source,
        &query.group_keys,
        &query.calls,
        &query.window,
    )?;

    let resolver = ChangelogResolver::new(&config.emit);
    let changelog = resolver.resolve(query.source.changelog_mode, &query.window);
    resolver.check_sink(changelog.output, &query.sink)?;

    let projection = query.projection(&compiled.output_schema)?;
    let graph = builder::build(
        &query.source,
        &query.window,
        &compiled,
        &changelog,
        &query.sink,
        projection,
    )?;

    info!(
        "compiled {} aggregate over '{}' into '{}' ({} nodes, {})",
        query.window.kind(),
        query.source.table,
        query.sink.table,
        graph.len(),
        if compiled.is_split() {
            "distinct split"
        } else {
            "unsplit"
        }
    );
    debug!("plan:\n{graph}");
    Ok(graph)
}
