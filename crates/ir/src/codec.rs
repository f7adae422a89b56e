//! JSON form of a [`PlanGraph`].
//!
//! A plan is a JSON array of node objects in topological order:
//!
//! ```json
//! [
//!   {"id": 0, "kind": "SourceAdapter", "schemaVersion": 1, "inputs": [],
//!    "changelogMode": "INSERT_ONLY", "config": {"table": "MyTable", ...}},
//!   {"id": 1, "kind": "WindowAssigner", "schemaVersion": 1, "inputs": [0],
//!    "changelogMode": "INSERT_ONLY",
//!    "config": {"timeAttribute": "rowtime", "timeDomain": "EVENT_TIME",
//!               "windowKind": "TUMBLE", "sizeMillis": 5000}},
//!   ...
//! ]
//! ```
//!
//! All durations are in milliseconds.  Node ids are preserved by a round
//! trip.
//!
//! Aggregate nodes are at schema version 2, which added the optional `emit`
//! policy to their config.  Version 1 aggregate nodes still decode, with the
//! default policy.

use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use winplan_types::changelog::ChangelogMode;
use zip::{result::ZipResult, write::FileOptions, ZipArchive, ZipWriter};

use crate::error::DecodeError;
use crate::plan::{ExecPlanNode, NodeId, NodeKind, NodeKindTag, PlanGraph};

/// Name of the plan document inside a plan archive.
pub const PLAN_FILE_NAME: &str = "plan.json";

/// Schema version this encoder writes for `kind`.  The decoder accepts any
/// version from 1 up to this one.
pub const fn schema_version(kind: NodeKindTag) -> u32 {
    match kind {
        NodeKindTag::SourceAdapter | NodeKindTag::WindowAssigner | NodeKindTag::Sink => 1,
        NodeKindTag::WindowAggregate
        | NodeKindTag::DistinctSplitLocal
        | NodeKindTag::DistinctSplitGlobal => 2,
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawNode {
    id: NodeId,
    kind: String,
    schema_version: u32,
    inputs: Vec<NodeId>,
    changelog_mode: ChangelogMode,
    config: Value,
}

/// Encodes `graph` as a JSON document.
pub fn serialize(graph: &PlanGraph) -> Value {
    Value::Array(graph.nodes().iter().map(encode_node).collect())
}

fn encode_node(node: &ExecPlanNode) -> Value {
    let tag = node.kind.tag();
    let config = match &node.kind {
        NodeKind::SourceAdapter(source) => json!(source),
        NodeKind::WindowAssigner(spec) => json!(spec),
        NodeKind::WindowAggregate(config)
        | NodeKind::DistinctSplitLocal(config)
        | NodeKind::DistinctSplitGlobal(config) => json!(config),
        NodeKind::Sink(sink) => json!(sink),
    };
    json!(RawNode {
        id: node.id,
        kind: tag.name().to_string(),
        schema_version: schema_version(tag),
        inputs: node.inputs.clone(),
        changelog_mode: node.changelog_mode,
        config,
    })
}

/// Encodes `graph` as pretty-printed JSON text.
pub fn to_json_string(graph: &PlanGraph) -> String {
    format!("{:#}", serialize(graph))
}

/// Reconstructs a plan from its JSON document.
///
/// Fails on the first node with an unknown kind or schema version, a
/// malformed or invalid configuration, a duplicate id or an input that does
/// not refer to an earlier node.  The reconstructed graph is validated as a
/// whole before it is returned.
pub fn deserialize(document: &Value) -> Result<PlanGraph, DecodeError> {
    let Value::Array(items) = document else {
        return Err(DecodeError::NotAnArray);
    };

    let mut nodes = Vec::with_capacity(items.len());
    let mut defined = BTreeSet::new();
    for (index, item) in items.iter().enumerate() {
        let raw = RawNode::deserialize(item).map_err(|e| DecodeError::MalformedNode {
            index,
            message: e.to_string(),
        })?;
        let tag = NodeKindTag::from_name(&raw.kind).ok_or_else(|| DecodeError::UnknownKind {
            index,
            kind: raw.kind.clone(),
        })?;
        if !(1..=schema_version(tag)).contains(&raw.schema_version) {
            return Err(DecodeError::UnsupportedVersion {
                node: raw.id,
                kind: tag,
                version: raw.schema_version,
                supported: schema_version(tag),
            });
        }
        if let Some(input) = raw.inputs.iter().find(|input| !defined.contains(*input)) {
            return Err(DecodeError::DanglingInput {
                node: raw.id,
                input: *input,
            });
        }
        if !defined.insert(raw.id) {
            return Err(DecodeError::DuplicateId(raw.id));
        }

        let kind = decode_config(raw.id, tag, raw.config)?;
        nodes.push(ExecPlanNode {
            id: raw.id,
            inputs: raw.inputs,
            changelog_mode: raw.changelog_mode,
            kind,
        });
    }

    let graph = PlanGraph::from_nodes(nodes)?;
    debug!("decoded plan with {} nodes", graph.len());
    Ok(graph)
}

fn decode_config(id: NodeId, tag: NodeKindTag, config: Value) -> Result<NodeKind, DecodeError> {
    fn parse<T: DeserializeOwned>(
        id: NodeId,
        tag: NodeKindTag,
        config: Value,
    ) -> Result<T, DecodeError> {
        serde_json::from_value(config).map_err(|e| DecodeError::InvalidConfig {
            node: id,
            kind: tag,
            message: e.to_string(),
        })
    }

    Ok(match tag {
        NodeKindTag::SourceAdapter => NodeKind::SourceAdapter(parse(id, tag, config)?),
        NodeKindTag::WindowAssigner => NodeKind::WindowAssigner(parse(id, tag, config)?),
        NodeKindTag::WindowAggregate => NodeKind::WindowAggregate(parse(id, tag, config)?),
        NodeKindTag::DistinctSplitLocal => NodeKind::DistinctSplitLocal(parse(id, tag, config)?),
        NodeKindTag::DistinctSplitGlobal => {
            NodeKind::DistinctSplitGlobal(parse(id, tag, config)?)
        }
        NodeKindTag::Sink => NodeKind::Sink(parse(id, tag, config)?),
    })
}

/// Parses JSON text and reconstructs the plan it describes.
pub fn from_json_str(s: &str) -> Result<PlanGraph, DecodeError> {
    let document: Value = serde_json::from_str(s).map_err(|e| DecodeError::Json(e.to_string()))?;
    deserialize(&document)
}

/// Packages the JSON form of `graph` as a zip archive holding
/// [`PLAN_FILE_NAME`].
pub fn to_zip(graph: &PlanGraph) -> ZipResult<Vec<u8>> {
    let json = serialize(graph).to_string();

    let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(json.len())));
    zip.start_file(PLAN_FILE_NAME, FileOptions::default())?;
    zip.write_all(json.as_bytes())?;
    Ok(zip.finish()?.into_inner())
}

/// Reads a plan archive written by [`to_zip`].
pub fn from_zip(bytes: &[u8]) -> Result<PlanGraph, DecodeError> {
    fn archive_error(e: impl std::fmt::Display) -> DecodeError {
        DecodeError::Archive(e.to_string())
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(archive_error)?;
    let mut file = archive.by_name(PLAN_FILE_NAME).map_err(archive_error)?;
    let mut json = String::new();
    file.read_to_string(&mut json).map_err(archive_error)?;
    from_json_str(&json)
}

impl PlanGraph {
    /// See [`serialize`].
    pub fn to_json(&self) -> Value {
        serialize(self)
    }

    /// See [`deserialize`].
    pub fn from_json(document: &Value) -> Result<Self, DecodeError> {
        deserialize(document)
    }
}
