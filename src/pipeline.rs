use std::time::{Duration, Instant};

use glam::Vec3;
use tracing::info;

use crate::batching::{BatchReport, SimpleBatcher};
use crate::cache::{AssetStore, FileAssetStore, SimplifiedCache};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::simplify::{CancelToken, GroupSimplification, MeshoptSimplifier, Simplifier, Step};
use crate::types::BuildGroup;

/// Summary of a completed pipeline run.
#[derive(Debug)]
pub struct ProcessingResult {
    pub batch: BatchReport,
    /// Meshes replaced by a simplified version, cache hits included.
    pub simplified_meshes: usize,
    pub cache_hits: usize,
    pub duration: Duration,
}

/// How a pipeline run ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(ProcessingResult),
    /// Stopped through the cancel token; no group was modified.
    Cancelled,
}

impl PipelineOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineOutcome::Cancelled)
    }
}

/// Pipeline orchestrator -- simplifies, then batches, every build group.
pub struct Pipeline {
    config: PipelineConfig,
    simplifier: Box<dyn Simplifier>,
}

impl Pipeline {
    /// Validate `config` and set up the default meshopt engine.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let simplifier = Box::new(MeshoptSimplifier::from_config(&config.simplifier));
        Ok(Self { config, simplifier })
    }

    /// Replace the simplification engine.
    pub fn with_simplifier(mut self, simplifier: Box<dyn Simplifier>) -> Self {
        self.simplifier = simplifier;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// File-backed cache rooted at the configured directory, if caching is enabled.
    pub fn open_cache(&self) -> Option<SimplifiedCache<FileAssetStore>> {
        self.config
            .cache
            .enabled
            .then(|| SimplifiedCache::new(FileAssetStore::new(&self.config.cache.root)))
    }

    /// Run both stages over `groups`.
    ///
    /// Simplification reports progress 0.0..0.5 and batching 0.5..1.0.
    /// Simplified meshes are only swapped in once every group finished, so a
    /// cancelled run leaves `groups` untouched.
    pub fn run<S: AssetStore>(
        &self,
        root_position: Vec3,
        groups: &mut [BuildGroup],
        cache: Option<&mut SimplifiedCache<S>>,
        token: &CancelToken,
        mut on_progress: impl FnMut(f32),
    ) -> Result<PipelineOutcome> {
        let start = Instant::now();
        info!(groups = groups.len(), algorithm = self.simplifier.algorithm(), "Starting pipeline");
        on_progress(0.0);

        let mut cache = cache.filter(|_| self.config.cache.enabled);
        let mut simplified_meshes = 0;
        let mut cache_hits = 0;

        if self.config.simplifier.enabled {
            info!("Stage 1/2: Simplification");
            let count = groups.len();
            let mut results = Vec::with_capacity(count);

            for (g, group) in groups.iter().enumerate() {
                let job = GroupSimplification::new(
                    self.simplifier.as_ref(),
                    &self.config.simplifier,
                    cache.as_deref_mut(),
                    group,
                    token.clone(),
                );
                let Step::Done(result) = job.run(|p| on_progress(0.5 * (g as f32 + p) / count as f32))? else {
                    info!(group = %group.name, "Pipeline cancelled during simplification");
                    return Ok(PipelineOutcome::Cancelled);
                };
                results.push(result);
            }

            for (group, result) in groups.iter_mut().zip(results) {
                simplified_meshes += result.meshes.len();
                cache_hits += result.cache_hits;
                result.apply(group);
            }
        }
        on_progress(0.5);

        if token.is_cancelled() {
            info!("Pipeline cancelled before batching");
            return Ok(PipelineOutcome::Cancelled);
        }

        info!("Stage 2/2: Batching");
        let mut batcher = SimpleBatcher::new(self.config.batcher.clone())?;
        let batch = batcher.batch(root_position, groups, |p| on_progress(0.5 + 0.5 * p))?;

        let duration = start.elapsed();
        info!(
            groups = batch.groups,
            atlases = batch.atlases,
            simplified_meshes,
            cache_hits,
            elapsed = ?duration,
            "Pipeline complete"
        );

        Ok(PipelineOutcome::Completed(ProcessingResult {
            batch,
            simplified_meshes,
            cache_hits,
            duration,
        }))
    }
}
