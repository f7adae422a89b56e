use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use winplan_types::aggregate::AggregateCall;
use winplan_types::changelog::ChangelogMode;
use winplan_types::schema::{ColumnDescr, SinkDescr, SourceDescr};
use winplan_types::window::WindowSpec;

use crate::error::GraphError;

/// Output column holding the inclusive start of a window.
pub const WINDOW_START: &str = "window_start";

/// Output column holding the exclusive end of a window.
pub const WINDOW_END: &str = "window_end";

/// Output column of the local distinct stage holding the hash bucket.
pub const BUCKET_COLUMN: &str = "$bucket";

/// Identifier of a node, unique within its graph.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u32 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discriminant of [`NodeKind`], used for kind strings and structural checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum NodeKindTag {
    SourceAdapter,
    WindowAssigner,
    WindowAggregate,
    DistinctSplitLocal,
    DistinctSplitGlobal,
    Sink,
}

impl NodeKindTag {
    pub const ALL: [NodeKindTag; 6] = [
        Self::SourceAdapter,
        Self::WindowAssigner,
        Self::WindowAggregate,
        Self::DistinctSplitLocal,
        Self::DistinctSplitGlobal,
        Self::Sink,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceAdapter => "SourceAdapter",
            Self::WindowAssigner => "WindowAssigner",
            Self::WindowAggregate => "WindowAggregate",
            Self::DistinctSplitLocal => "DistinctSplitLocal",
            Self::DistinctSplitGlobal => "DistinctSplitGlobal",
            Self::Sink => "Sink",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.name() == name)
    }

    /// Node kinds that may feed a node of this kind.  Sources take no input,
    /// every other kind exactly one.
    pub fn accepted_inputs(&self) -> &'static [NodeKindTag] {
        match self {
            Self::SourceAdapter => &[],
            Self::WindowAssigner => &[Self::SourceAdapter],
            Self::WindowAggregate | Self::DistinctSplitLocal => &[Self::WindowAssigner],
            Self::DistinctSplitGlobal => &[Self::DistinctSplitLocal],
            Self::Sink => &[Self::WindowAggregate, Self::DistinctSplitGlobal],
        }
    }

    pub fn input_arity(&self) -> usize {
        match self {
            Self::SourceAdapter => 0,
            Self::WindowAssigner
            | Self::WindowAggregate
            | Self::DistinctSplitLocal
            | Self::DistinctSplitGlobal
            | Self::Sink => 1,
        }
    }
}

impl Display for NodeKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hash bucketing of a split distinct aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BucketConfig {
    pub bucket_count: u32,

    /// Distinct argument columns the bucket is computed from.
    pub columns: Vec<String>,
}

/// Emit behavior of the aggregate that produces the final results.
///
/// The default policy fires each window once, when the watermark (or the
/// processing-time clock) passes its end, and drops late rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmitPolicy {
    /// Interval of early firings before the window closes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_fire_delay_millis: Option<u64>,

    /// How long an event-time window keeps accepting late rows, and emitting
    /// corrections, after it first fires.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub allow_lateness_millis: u64,
}

fn is_zero(millis: &u64) -> bool {
    *millis == 0
}

impl EmitPolicy {
    pub fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

/// Configuration shared by the three aggregate node kinds.
///
/// A [`NodeKind::WindowAggregate`] computes `calls` directly over the
/// assigned windows.  A [`NodeKind::DistinctSplitLocal`] computes partial
/// results per `(group_keys, window, bucket)`, and the following
/// [`NodeKind::DistinctSplitGlobal`] merges them per `(group_keys, window)`;
/// the global calls take the local output columns as arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AggregateConfig {
    pub window: WindowSpec,
    pub group_keys: Vec<String>,
    pub calls: Vec<AggregateCall>,
    pub split_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketConfig>,

    /// Only set on the aggregate emitting to the sink.
    #[serde(default, skip_serializing_if = "EmitPolicy::is_default")]
    pub emit: EmitPolicy,
}

impl AggregateConfig {
    /// Columns produced by an aggregate node of kind `tag` with this
    /// configuration, in order.
    pub fn output_columns(&self, tag: NodeKindTag) -> Vec<String> {
        let mut columns = self.group_keys.clone();
        if tag == NodeKindTag::DistinctSplitLocal {
            columns.push(BUCKET_COLUMN.to_string());
        }
        columns.extend(self.calls.iter().map(|call| call.name.clone()));
        columns.push(WINDOW_START.to_string());
        columns.push(WINDOW_END.to_string());
        columns
    }
}

/// Sink node configuration: the target table and the input columns written
/// to it, in sink column order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SinkConfig {
    pub table: String,
    pub columns: Vec<ColumnDescr>,
    pub insert_only: bool,
    pub projection: Vec<String>,
}

impl SinkConfig {
    pub fn new(sink: &SinkDescr, projection: Vec<String>) -> Self {
        Self {
            table: sink.table.clone(),
            columns: sink.columns.clone(),
            insert_only: sink.insert_only,
            projection,
        }
    }
}

/// Kind-specific part of an [`ExecPlanNode`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    SourceAdapter(SourceDescr),
    WindowAssigner(WindowSpec),
    WindowAggregate(AggregateConfig),
    DistinctSplitLocal(AggregateConfig),
    DistinctSplitGlobal(AggregateConfig),
    Sink(SinkConfig),
}

impl NodeKind {
    pub fn tag(&self) -> NodeKindTag {
        match self {
            Self::SourceAdapter(_) => NodeKindTag::SourceAdapter,
            Self::WindowAssigner(_) => NodeKindTag::WindowAssigner,
            Self::WindowAggregate(_) => NodeKindTag::WindowAggregate,
            Self::DistinctSplitLocal(_) => NodeKindTag::DistinctSplitLocal,
            Self::DistinctSplitGlobal(_) => NodeKindTag::DistinctSplitGlobal,
            Self::Sink(_) => NodeKindTag::Sink,
        }
    }

    /// Window this node assigns or aggregates over.
    pub fn window(&self) -> Option<&WindowSpec> {
        match self {
            Self::WindowAssigner(spec) => Some(spec),
            Self::WindowAggregate(config)
            | Self::DistinctSplitLocal(config)
            | Self::DistinctSplitGlobal(config) => Some(&config.window),
            Self::SourceAdapter(_) | Self::Sink(_) => None,
        }
    }

    /// Columns this node produces, in order.  Window assigners pass their
    /// input through unchanged and report `None`, as do sinks.
    pub fn output_columns(&self) -> Option<Vec<String>> {
        match self {
            Self::SourceAdapter(source) => {
                Some(source.columns.iter().map(|c| c.name.clone()).collect())
            }
            Self::WindowAggregate(config)
            | Self::DistinctSplitLocal(config)
            | Self::DistinctSplitGlobal(config) => Some(config.output_columns(self.tag())),
            Self::WindowAssigner(_) | Self::Sink(_) => None,
        }
    }
}

/// A node of the executable window plan.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExecPlanNode {
    pub id: NodeId,
    pub inputs: Vec<NodeId>,

    /// Changelog mode of the stream this node produces.  For sinks, the
    /// mode of the stream written to the table.
    pub changelog_mode: ChangelogMode,

    pub kind: NodeKind,
}

/// An executable window plan: a DAG of [`ExecPlanNode`]s stored in
/// topological order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanGraph {
    nodes: Vec<ExecPlanNode>,
}

impl PlanGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from `nodes` and checks its structure.
    pub fn from_nodes(nodes: Vec<ExecPlanNode>) -> Result<Self, GraphError> {
        let graph = Self { nodes };
        graph.validate()?;
        Ok(graph)
    }

    /// Appends a node, assigning it the next id.
    ///
    /// The graph is only checked by [`PlanGraph::validate`]; builders call it
    /// once all nodes are in place.
    pub fn add_node(
        &mut self,
        inputs: Vec<NodeId>,
        changelog_mode: ChangelogMode,
        kind: NodeKind,
    ) -> NodeId {
        let id = self
            .nodes
            .iter()
            .map(|n| n.id.0 + 1)
            .max()
            .map(NodeId)
            .unwrap_or_default();
        self.nodes.push(ExecPlanNode {
            id,
            inputs,
            changelog_mode,
            kind,
        });
        id
    }

    pub fn nodes(&self) -> &[ExecPlanNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&ExecPlanNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn consumers(&self, id: NodeId) -> impl Iterator<Item = &ExecPlanNode> {
        self.nodes.iter().filter(move |n| n.inputs.contains(&id))
    }

    pub fn sinks(&self) -> impl Iterator<Item = &ExecPlanNode> {
        self.nodes
            .iter()
            .filter(|n| n.kind.tag() == NodeKindTag::Sink)
    }

    /// Checks the structural invariants of the plan:
    ///
    /// * ids are unique and every input refers to an earlier node, so the
    ///   node order is a topological order and the graph has no cycles;
    /// * each node has the number and kinds of inputs its kind requires;
    /// * every node except sinks is consumed, and sinks are never consumed;
    /// * no two sinks write to the same table;
    /// * aggregate nodes use the window of their assigner and are consistent
    ///   with their kind regarding distinct splitting;
    /// * sink projections only reference columns of their input.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut defined = BTreeSet::new();
        let mut sink_tables = BTreeSet::new();
        for node in &self.nodes {
            let tag = node.kind.tag();
            for input in &node.inputs {
                if !defined.contains(input) {
                    return Err(GraphError::UndefinedInput {
                        node: node.id,
                        input: *input,
                    });
                }
            }
            if !defined.insert(node.id) {
                return Err(GraphError::DuplicateId(node.id));
            }

            if node.inputs.len() != tag.input_arity() {
                return Err(GraphError::InputArity {
                    node: node.id,
                    kind: tag,
                    expected: tag.input_arity(),
                    actual: node.inputs.len(),
                });
            }
            for input in &node.inputs {
                // Inputs were checked to be defined above.
                let Some(input_node) = self.node(*input) else {
                    continue;
                };
                let input_tag = input_node.kind.tag();
                if !tag.accepted_inputs().contains(&input_tag) {
                    return Err(GraphError::UnexpectedInputKind {
                        node: node.id,
                        kind: tag,
                        input: *input,
                        input_kind: input_tag,
                    });
                }
                if let (Some(window), Some(input_window)) =
                    (node.kind.window(), input_node.kind.window())
                {
                    if window != input_window {
                        return Err(GraphError::WindowMismatch {
                            node: node.id,
                            input: *input,
                        });
                    }
                }
                if let NodeKind::Sink(sink) = &node.kind {
                    let available = input_node.kind.output_columns().unwrap_or_default();
                    if let Some(column) = sink.projection.iter().find(|c| !available.contains(c)) {
                        return Err(GraphError::UnknownColumn {
                            node: node.id,
                            column: column.clone(),
                        });
                    }
                }
            }

            match &node.kind {
                NodeKind::WindowAggregate(config) => {
                    if config.split_enabled || config.bucket.is_some() {
                        return Err(GraphError::InconsistentSplit {
                            node: node.id,
                            kind: tag,
                        });
                    }
                }
                NodeKind::DistinctSplitLocal(config) | NodeKind::DistinctSplitGlobal(config) => {
                    if !config.split_enabled || config.bucket.is_none() {
                        return Err(GraphError::InconsistentSplit {
                            node: node.id,
                            kind: tag,
                        });
                    }
                }
                NodeKind::Sink(sink) => {
                    if !sink_tables.insert(sink.table.clone()) {
                        return Err(GraphError::DuplicateSink {
                            table: sink.table.clone(),
                        });
                    }
                    if sink.projection.len() != sink.columns.len() {
                        return Err(GraphError::ProjectionArity {
                            node: node.id,
                            expected: sink.columns.len(),
                            actual: sink.projection.len(),
                        });
                    }
                }
                NodeKind::SourceAdapter(_) | NodeKind::WindowAssigner(_) => {}
            }
        }

        // Sinks are never accepted as inputs, so only the other direction
        // needs checking here.
        for node in &self.nodes {
            let tag = node.kind.tag();
            if tag != NodeKindTag::Sink && self.consumers(node.id).next().is_none() {
                return Err(GraphError::DanglingNode {
                    node: node.id,
                    kind: tag,
                });
            }
        }
        Ok(())
    }
}

impl Display for PlanGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            let inputs: Vec<String> = node.inputs.iter().map(|i| i.to_string()).collect();
            write!(
                f,
                "{}: {} [{}] {}",
                node.id,
                node.kind.tag(),
                inputs.join(", "),
                node.changelog_mode
            )?;
            match &node.kind {
                NodeKind::SourceAdapter(source) => write!(f, " table={}", source.table)?,
                NodeKind::WindowAssigner(spec) => write!(f, " {spec}")?,
                NodeKind::WindowAggregate(config)
                | NodeKind::DistinctSplitLocal(config)
                | NodeKind::DistinctSplitGlobal(config) => {
                    let calls: Vec<String> = config.calls.iter().map(|c| c.to_string()).collect();
                    write!(
                        f,
                        " groupBy=[{}] calls=[{}]",
                        config.group_keys.join(", "),
                        calls.join(", ")
                    )?;
                    if let Some(bucket) = &config.bucket {
                        write!(f, " buckets={}", bucket.bucket_count)?;
                    }
                }
                NodeKind::Sink(sink) => {
                    write!(f, " table={} columns=[{}]", sink.table, sink.projection.join(", "))?
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
