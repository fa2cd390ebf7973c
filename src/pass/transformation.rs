//! Pattern-driven transformation pass
//!
//! Running a pass builds its pattern graph, collects all disjoint matches,
//! reports a hit when at least one was found, and fuses them as one batch.
//! A hit line that cannot be written is logged and does not stop the fuse.

use crate::error::{FusionError, FusionResult};
use crate::graph::{Graph, OpId};
use crate::pattern::PatternGraph;
use crate::traits::GraphPass;
use crate::transform::{fuse, match_pattern};

use super::diagnostics::DiagnosticConfig;
use super::registry::{Pass, PatternFactory};

/// What one run of a pass changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutcome {
    /// Pass name
    pub pass: String,
    /// Number of matches fused
    pub matches: usize,
    /// Inserted fused ops
    pub fused_ops: Vec<OpId>,
    /// Ops replaced by fused ops
    pub removed_ops: Vec<OpId>,
}

impl PassOutcome {
    /// Empty outcome for a pass
    pub fn new(pass: impl Into<String>) -> Self {
        Self {
            pass: pass.into(),
            ..Self::default()
        }
    }

    /// Whether the pass matched anything
    pub fn is_hit(&self) -> bool {
        self.matches > 0
    }

    /// Add another outcome's counts to this one
    pub fn absorb(&mut self, other: PassOutcome) {
        self.matches += other.matches;
        self.fused_ops.extend(other.fused_ops);
        self.removed_ops.extend(other.removed_ops);
    }
}

/// A registered pass bound to its diagnostics
#[derive(Clone)]
pub struct TransformationPass {
    key: String,
    name: String,
    factory: PatternFactory,
    diagnostics: DiagnosticConfig,
}

impl TransformationPass {
    /// Bind a registered pass, reading diagnostics from the environment
    ///
    /// Fails if the pass does not own exactly one pattern factory.
    pub fn new(pass: &Pass) -> FusionResult<Self> {
        Ok(Self {
            key: pass.key(),
            name: pass.name().to_string(),
            factory: pass.factory()?.clone(),
            diagnostics: DiagnosticConfig::from_env(),
        })
    }

    /// Replace the diagnostic configuration
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Registry key of the pass
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Diagnostic configuration in use
    pub fn diagnostics(&self) -> &DiagnosticConfig {
        &self.diagnostics
    }

    fn failed(&self, source: FusionError) -> FusionError {
        FusionError::PassFailed {
            pass: self.key.clone(),
            source: Box::new(source),
        }
    }

    fn apply(&self, graph: &mut Graph) -> FusionResult<PassOutcome> {
        let mut pattern = PatternGraph::new(self.name.as_str());
        (self.factory)(&mut pattern);
        pattern.validate()?;

        let mut outcome = PassOutcome::new(self.name.as_str());
        let matches = match_pattern(graph, &pattern);
        if matches.is_empty() {
            log::trace!("pass {}: no match", self.key);
            return Ok(outcome);
        }

        if let Err(e) = self.diagnostics.emit_pattern_hit(&self.name) {
            log::warn!("pass {}: could not write pattern hit: {}", self.key, e);
        }

        let report = fuse(graph, &matches)?;
        outcome.matches = matches.len();
        outcome.fused_ops = report.fused;
        outcome.removed_ops = report.removed;
        log::debug!(
            "pass {}: fused {} matches, removed {} ops",
            self.key,
            outcome.matches,
            outcome.removed_ops.len()
        );
        Ok(outcome)
    }
}

impl GraphPass for TransformationPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, graph: &mut Graph) -> FusionResult<PassOutcome> {
        self.apply(graph).map_err(|e| self.failed(e))
    }
}
