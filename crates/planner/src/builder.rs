use winplan_ir::{AggregateConfig, NodeKind, PlanGraph, SinkConfig};
use winplan_types::schema::{SinkDescr, SourceDescr};
use winplan_types::window::WindowSpec;

use crate::aggregate::CompiledAggregate;
use crate::changelog::ResolvedChangelog;
use crate::error::PlanError;

/// Assembles the plan of a compiled window aggregate.
///
/// Node ids are assigned in topological order: the source is `0`, the window
/// assigner `1`, followed by the local stage of a split aggregate if there is
/// one, the aggregate producing the final results, and the sink.  Equal
/// inputs always produce equal graphs.
///
/// Edges up to and including the local stage carry the input changelog mode;
/// the final aggregate and the sink carry the output mode.  Only the final
/// aggregate records the emit policy.
pub fn build(
    source: &SourceDescr,
    spec: &WindowSpec,
    compiled: &CompiledAggregate,
    changelog: &ResolvedChangelog,
    sink: &SinkDescr,
    projection: Vec<String>,
) -> Result<PlanGraph, PlanError> {
    let mut graph = PlanGraph::new();

    let source = graph.add_node(
        vec![],
        changelog.input,
        NodeKind::SourceAdapter(source.clone()),
    );
    let mut input = graph.add_node(
        vec![source],
        changelog.input,
        NodeKind::WindowAssigner(spec.clone()),
    );

    let global = AggregateConfig {
        emit: changelog.emit,
        ..compiled.global.clone()
    };
    let aggregate = match &compiled.local {
        Some(local) => {
            input = graph.add_node(
                vec![input],
                changelog.input,
                NodeKind::DistinctSplitLocal(local.clone()),
            );
            NodeKind::DistinctSplitGlobal(global)
        }
        None => NodeKind::WindowAggregate(global),
    };
    let aggregate = graph.add_node(vec![input], changelog.output, aggregate);

    graph.add_node(
        vec![aggregate],
        changelog.output,
        NodeKind::Sink(SinkConfig::new(sink, projection)),
    );

    graph.validate()?;
    Ok(graph)
}
