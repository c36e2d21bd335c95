use tracing::{debug, info, warn};

use crate::cache::{AssetStore, SimplifiedCache};
use crate::config::SimplifierConfig;
use crate::error::Result;
use crate::types::{BuildGroup, WorkingMesh};

use super::{CancelToken, Simplifier, SimplifyOperation, Step};

/// Simplified meshes of one build group, ready to replace the originals.
#[derive(Debug, Clone, Default)]
pub struct SimplifiedGroup {
    /// `(object index, simplified mesh)` pairs.
    pub meshes: Vec<(usize, WorkingMesh)>,
    pub cache_hits: usize,
}

impl SimplifiedGroup {
    /// Swap the simplified meshes into `group`.
    pub fn apply(self, group: &mut BuildGroup) {
        for (index, mesh) in self.meshes {
            if let Some(object) = group.objects.get_mut(index) {
                object.set_mesh(mesh);
            }
        }
    }
}

/// Resumable simplification of every mesh of a build group.
///
/// Each [`advance`](Self::advance) does at most one engine step or cache
/// lookup. Results are written to the cache as each mesh completes; the
/// group itself is only touched through [`SimplifiedGroup::apply`].
pub struct GroupSimplification<'a, S> {
    simplifier: &'a dyn Simplifier,
    cache: Option<&'a mut SimplifiedCache<S>>,
    token: CancelToken,
    config: SimplifierConfig,
    jobs: Vec<(usize, WorkingMesh)>,
    next: usize,
    current: Option<(usize, Box<dyn SimplifyOperation>)>,
    current_progress: f32,
    result: SimplifiedGroup,
}

impl<'a, S: AssetStore> GroupSimplification<'a, S> {
    pub fn new(
        simplifier: &'a dyn Simplifier,
        config: &SimplifierConfig,
        cache: Option<&'a mut SimplifiedCache<S>>,
        group: &BuildGroup,
        token: CancelToken,
    ) -> Self {
        let jobs = group
            .objects
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.mesh.as_ref().filter(|m| !m.is_empty()).map(|m| (i, m.clone())))
            .collect();

        Self {
            simplifier,
            cache,
            token,
            config: config.clone(),
            jobs,
            next: 0,
            current: None,
            current_progress: 0.0,
            result: SimplifiedGroup::default(),
        }
    }

    /// Fraction of the group's meshes finished, including the one in flight.
    pub fn progress(&self) -> f32 {
        if self.jobs.is_empty() {
            return 1.0;
        }
        let finished = self.result.meshes.len() as f32;
        (finished + self.current_progress) / self.jobs.len() as f32
    }

    pub fn advance(&mut self) -> Result<Step<SimplifiedGroup>> {
        if self.token.is_cancelled() {
            return Ok(self.cancel());
        }

        if let Some((job, operation)) = self.current.as_mut() {
            let job = *job;
            let step = operation.advance()?;
            if self.token.is_cancelled() {
                return Ok(self.cancel());
            }
            match step {
                Step::Continue(p) => self.current_progress = p,
                Step::Done(mesh) => {
                    self.current = None;
                    self.current_progress = 0.0;
                    self.finish(job, mesh);
                }
                Step::Cancelled => return Ok(self.cancel()),
            }
            return Ok(Step::Continue(self.progress()));
        }

        if self.next >= self.jobs.len() {
            info!(
                meshes = self.result.meshes.len(),
                cache_hits = self.result.cache_hits,
                "Group simplification complete"
            );
            return Ok(Step::Done(std::mem::take(&mut self.result)));
        }

        let job = self.next;
        self.next += 1;
        let (object, source) = &self.jobs[job];

        let simplifier = self.simplifier;
        if let Some(cache) = self.cache.as_deref_mut() {
            match cache.get(simplifier.algorithm(), source, self.config.vertex_amount) {
                Ok(Some(hit)) => {
                    debug!(object, mesh = %source.name, "Simplification cache hit");
                    self.result.meshes.push((*object, hit));
                    self.result.cache_hits += 1;
                    return Ok(Step::Continue(self.progress()));
                }
                Ok(None) => {}
                // A broken cache only costs the lookup
                Err(e) => warn!(mesh = %source.name, error = %e, "Simplification cache lookup failed"),
            }
        }

        let target = self.config.target_vertex_count(source.unique_vertex_count());
        let operation = simplifier.start(source, target)?;
        self.current = Some((job, operation));
        Ok(Step::Continue(self.progress()))
    }

    /// Poll until the group finishes or is cancelled.
    pub fn run(mut self, mut on_progress: impl FnMut(f32)) -> Result<Step<SimplifiedGroup>> {
        loop {
            match self.advance()? {
                Step::Continue(p) => on_progress(p),
                other => return Ok(other),
            }
        }
    }

    fn finish(&mut self, job: usize, mesh: WorkingMesh) {
        let (object, source) = &self.jobs[job];
        if let Some(cache) = self.cache.as_deref_mut() {
            if let Err(e) = cache.update(self.simplifier.algorithm(), source, &mesh, self.config.vertex_amount) {
                warn!(mesh = %source.name, error = %e, "Failed to store simplified mesh");
            }
        }
        self.result.meshes.push((*object, mesh));
    }

    fn cancel(&mut self) -> Step<SimplifiedGroup> {
        if self.current.take().is_some() {
            debug!("Abandoning in-flight simplification");
        }
        Step::Cancelled
    }
}
