//! Changelog modes along the edges of a window aggregate plan.
//!
//! Window assignment only reads the time attribute, which a change record
//! never modifies, so updates and deletes from a CDC source adjust the
//! aggregate of the window the row was assigned to.  Window aggregation
//! therefore accepts inputs in every mode.
//!
//! A window emits its result once, when it closes.  Its output is insert-only
//! unless a result can be corrected after it was emitted: with early firing,
//! or with allowed lateness on event-time windows.  Corrected results are
//! emitted as a retraction followed by an insertion.  The emit settings that
//! apply to a window are recorded in the plan as an [`EmitPolicy`].

use tracing::debug;
use winplan_ir::EmitPolicy;
use winplan_types::changelog::ChangelogMode;
use winplan_types::config::EmitConfig;
use winplan_types::schema::SinkDescr;
use winplan_types::window::WindowSpec;

use crate::error::PlanError;

/// Modes of the streams entering and leaving a window aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedChangelog {
    pub input: ChangelogMode,
    pub output: ChangelogMode,

    /// Emit settings of the aggregate producing the final results.
    pub emit: EmitPolicy,
}

pub struct ChangelogResolver<'a> {
    emit: &'a EmitConfig,
}

impl<'a> ChangelogResolver<'a> {
    pub fn new(emit: &'a EmitConfig) -> Self {
        Self { emit }
    }

    /// Returns `true` if results of windows of `spec` may be corrected
    /// after they were first emitted.
    pub fn emits_corrections(&self, spec: &WindowSpec) -> bool {
        self.emit.early_fire_enabled || (spec.is_event_time() && self.emit.allow_lateness_millis > 0)
    }

    pub fn resolve(&self, input: ChangelogMode, spec: &WindowSpec) -> ResolvedChangelog {
        let output = if self.emits_corrections(spec) {
            ChangelogMode::WithRetraction
        } else {
            ChangelogMode::InsertOnly
        };
        debug!("window aggregate over {spec}: {input} -> {output}");
        ResolvedChangelog {
            input,
            output,
            emit: self.policy(spec),
        }
    }

    /// Emit settings that apply to windows of `spec`.  Allowed lateness has
    /// no effect on processing-time windows, which never receive late rows.
    pub fn policy(&self, spec: &WindowSpec) -> EmitPolicy {
        EmitPolicy {
            early_fire_delay_millis: self
                .emit
                .early_fire_enabled
                .then_some(self.emit.early_fire_delay_millis),
            allow_lateness_millis: if spec.is_event_time() {
                self.emit.allow_lateness_millis
            } else {
                0
            },
        }
    }

    /// Checks that `sink` accepts a stream in mode `produced`.
    pub fn check_sink(&self, produced: ChangelogMode, sink: &SinkDescr) -> Result<(), PlanError> {
        let accepted = sink.accepted_changelog_mode();
        if produced.satisfies(accepted) {
            Ok(())
        } else {
            Err(PlanError::ChangelogIncompatible {
                sink: sink.table.clone(),
                produced,
                accepted,
            })
        }
    }
}
