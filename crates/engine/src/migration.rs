//! Migration engine
//!
//! Upgrades a decoded document from the version it was written at to the
//! registry's current version. States are schema versions; each transition
//! applies exactly one step. The chain is walked strictly in order, even when
//! a step changes nothing for the data at hand, and after every step the
//! target descriptor's defaults are filled in for absent fields.
//!
//! A failing step aborts the whole migration. No partially migrated document
//! is ever returned.

use std::sync::Arc;

use savestate_core::{SaveDocument, SchemaRegistry, SchemaVersion};
use tracing::{debug, warn};

use crate::error::MigrationError;

/// Result of a successful migration
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    /// Document at the current version
    pub document: SaveDocument,
    /// Version the input document was at
    pub from_version: SchemaVersion,
    /// Number of steps applied
    pub steps_applied: usize,
}

/// Applies migration chains from a schema registry
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    registry: Arc<SchemaRegistry>,
}

impl MigrationEngine {
    /// Create an engine over `registry`
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        MigrationEngine { registry }
    }

    /// Registry in use
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Upgrade `document` to the current version
    ///
    /// A document already at the current version is returned unchanged.
    pub fn migrate(&self, document: SaveDocument) -> Result<MigrationOutcome, MigrationError> {
        let from_version = document.schema_version();
        let chain = self.registry.migration_chain(from_version)?;
        if chain.is_empty() {
            return Ok(MigrationOutcome {
                document,
                from_version,
                steps_applied: 0,
            });
        }

        let mut current = document;
        for step in &chain {
            let source = current.schema_version();
            let target = step.target_version();
            let next = step
                .apply(&current)
                .map_err(|diagnostic| {
                    warn!(
                        target: "savestate::migrate",
                        from = source,
                        to = target,
                        error = %diagnostic,
                        "Migration step failed"
                    );
                    MigrationError::StepFailed {
                        from_version: source,
                        to_version: target,
                        diagnostic,
                    }
                })?;

            let descriptor = self.registry.descriptor_for(target)?;
            current = descriptor.fill_defaults(next);
            debug!(
                target: "savestate::migrate",
                from = source,
                to = target,
                step = step.description(),
                "Applied migration step"
            );
        }

        debug!(
            target: "savestate::migrate",
            from = from_version,
            to = current.schema_version(),
            steps = chain.len(),
            "Migration complete"
        );
        Ok(MigrationOutcome {
            document: current,
            from_version,
            steps_applied: chain.len(),
        })
    }
}
