//! Backend pass pipeline
//!
//! A pipeline binds every enabled pass of one backend, highest priority
//! first, and runs them over a graph for a number of rounds. A round that
//! fuses nothing ends the run early.

use crate::error::{FusionError, FusionResult};
use crate::graph::Graph;
use crate::traits::GraphPass;

use super::diagnostics::DiagnosticConfig;
use super::registry::PassRegistry;
use super::transformation::{PassOutcome, TransformationPass};

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Diagnostics shared by every pass
    pub diagnostics: DiagnosticConfig,
    /// Maximum number of rounds over the pass list
    pub rounds: usize,
    /// Continue with the next pass when one fails
    pub continue_on_error: bool,
    /// Validate the graph after every pass that fused something
    pub validate_graph: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            diagnostics: DiagnosticConfig::from_env(),
            rounds: 1,
            continue_on_error: false,
            validate_graph: false,
        }
    }
}

impl PipelineConfig {
    /// Set diagnostics
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Set the maximum number of rounds
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    /// Set continue on error
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Set graph validation after each fusing pass
    pub fn with_validation(mut self, validate_graph: bool) -> Self {
        self.validate_graph = validate_graph;
        self
    }
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Pass executions
    pub passes_run: usize,
    /// Pass executions that fused at least one match
    pub passes_hit: usize,
    /// Total matches fused
    pub matches: usize,
    /// Total fused ops inserted
    pub fused_ops: usize,
    /// Total ops removed
    pub removed_ops: usize,
    /// Rounds executed
    pub rounds: usize,
    /// Outcomes of every pass that hit, in execution order
    pub outcomes: Vec<PassOutcome>,
    /// Errors skipped under `continue_on_error`
    pub errors: Vec<String>,
}

impl PipelineStats {
    fn record(&mut self, outcome: PassOutcome) {
        self.passes_run += 1;
        if outcome.is_hit() {
            self.passes_hit += 1;
            self.matches += outcome.matches;
            self.fused_ops += outcome.fused_ops.len();
            self.removed_ops += outcome.removed_ops.len();
            self.outcomes.push(outcome);
        }
    }
}

/// Ordered passes of one backend
pub struct PassPipeline {
    backend: String,
    passes: Vec<TransformationPass>,
    config: PipelineConfig,
}

impl PassPipeline {
    /// Bind the enabled passes of `backend`
    ///
    /// Validates the whole registry first, so a misconfigured pass of any
    /// backend fails here rather than mid-run.
    pub fn new(registry: &PassRegistry, backend: &str, config: PipelineConfig) -> FusionResult<Self> {
        registry.validate()?;

        let passes = registry
            .get_passes_for(backend)
            .into_iter()
            .map(|pass| {
                TransformationPass::new(pass)
                    .map(|p| p.with_diagnostics(config.diagnostics.clone()))
            })
            .collect::<FusionResult<Vec<_>>>()?;

        if passes.is_empty() {
            return Err(FusionError::UnknownBackend(backend.to_string()));
        }

        log::debug!("pipeline for {}: {} passes", backend, passes.len());
        Ok(Self {
            backend: backend.to_string(),
            passes,
            config,
        })
    }

    /// Backend name
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Pass names in execution order
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run all passes until a round fuses nothing or the round limit is hit
    pub fn run(&self, graph: &mut Graph) -> FusionResult<PipelineStats> {
        let mut stats = PipelineStats::default();

        for round in 0..self.config.rounds {
            stats.rounds += 1;
            let mut progress = false;

            for pass in &self.passes {
                match pass.run(graph) {
                    Ok(outcome) => {
                        if outcome.is_hit() {
                            log::info!(
                                "round {}: {} fused {} matches",
                                round,
                                pass.key(),
                                outcome.matches
                            );
                            progress = true;
                            if self.config.validate_graph {
                                graph.validate()?;
                            }
                        }
                        stats.record(outcome);
                    }
                    Err(e) if self.config.continue_on_error => {
                        log::warn!("{}, continuing", e);
                        stats.passes_run += 1;
                        stats.errors.push(e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }

            if !progress {
                break;
            }
        }

        Ok(stats)
    }
}
