//! Output computation.
//!
//! Outputs are pulled: computing one first brings its inputs up to date.
//! Each output fails on its own; a missing stage turns into the "no stage"
//! value downstream instead of an error.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::lifecycle::Lifecycle;
use super::reentrancy::{self, ComputeGuard};
use super::{Attr, ProxyShape, ShareMode, StageData};
use crate::sdf::LayerHandle;
use crate::usd::{StageCache, StageCacheId};
use crate::util::{Error, Result};

impl ProxyShape {
    /// Bring `plug` up to date. Inputs and clean outputs are a no-op.
    ///
    /// Fails only when the node is already computing (a host bug); the
    /// outputs keep their last values in that case.
    pub fn compute(&self, plug: Attr) -> Result<()> {
        if !plug.is_output() {
            return Ok(());
        }
        let Some(_guard) = ComputeGuard::enter(&self.computing) else {
            let node = self.path_string();
            tracing::warn!(%node, plug = plug.name(), in_compute = reentrancy::in_compute(), "re-entrant compute");
            return Err(Error::ReentrantCompute(node));
        };
        let mut lc = self.lifecycle.lock();
        match plug {
            Attr::OutTime => self.compute_output_time(),
            Attr::InStageDataCached => self.compute_in_stage_data_cached(&mut lc),
            Attr::OutStageData => self.compute_out_stage_data(&mut lc),
            Attr::OutStageCacheId => self.compute_out_stage_cache_id(&mut lc),
            _ => {}
        }
        Ok(())
    }

    /// Clear the dirty flag of `plug`, returning whether it was set.
    ///
    /// Cleared before computing so a notice arriving mid-compute leaves
    /// the output dirty again.
    fn take_dirty(&self, plug: Attr) -> bool {
        self.dirty.lock().remove(&plug)
    }

    fn compute_output_time(&self) {
        if !self.take_dirty(Attr::OutTime) {
            return;
        }
        let inputs = self.inputs();
        let time = self.hooks.output_time(&inputs);
        self.outputs.write().out_time = time;
    }

    fn compute_in_stage_data_cached(&self, lc: &mut Lifecycle) {
        if !self.take_dirty(Attr::InStageDataCached) {
            return;
        }
        let inputs = self.inputs();
        let previous = lc.stage.clone();
        let stage = self.resolve_stage(lc, &inputs);

        let changed = match (&previous, &stage) {
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            (None, None) => false,
            _ => true,
        };
        if changed {
            let mut dirty = self.dirty.lock();
            dirty.insert(Attr::OutStageData);
            dirty.insert(Attr::OutStageCacheId);
        }
        self.outputs.write().in_stage_data_cached = stage;
    }

    fn compute_out_stage_data(&self, lc: &mut Lifecycle) {
        self.compute_in_stage_data_cached(lc);
        if !self.take_dirty(Attr::OutStageData) {
            return;
        }
        let inputs = self.inputs();
        let data = match (lc.stage.clone(), inputs.parsed_prim_path()) {
            (Some(stage), Ok(prim_path)) => {
                if !stage.has_prim(&prim_path) {
                    tracing::warn!(node = %self.path_string(), prim = %prim_path, "prim path does not name a prim");
                }
                let exclude_prim_paths = inputs.parsed_exclude_prim_paths(&prim_path);
                StageData {
                    stage: Some(stage),
                    prim_path,
                    exclude_prim_paths,
                    complexity: inputs.complexity,
                    purposes: inputs.purposes(),
                    time: inputs.time,
                    exclude_prim_paths_version: self.exclude_prim_paths_version.load(Ordering::SeqCst),
                    stage_version: self.stage_version.load(Ordering::SeqCst),
                }
            }
            (Some(_), Err(err)) => {
                tracing::warn!(node = %self.path_string(), error = %err, "invalid prim path");
                StageData::empty()
            }
            (None, _) => StageData::empty(),
        };
        self.outputs.write().out_stage_data = Arc::new(data);
    }

    fn compute_out_stage_cache_id(&self, lc: &mut Lifecycle) {
        self.compute_in_stage_data_cached(lc);
        if !self.take_dirty(Attr::OutStageCacheId) {
            return;
        }
        let id = match (&lc.stage, lc.mode) {
            (Some(stage), ShareMode::Shared) => StageCache::global().insert(stage),
            _ => StageCacheId::INVALID,
        };
        self.outputs.write().out_stage_cache_id = id;
    }

    /// Private root layer of the unshared stage, once one was created.
    pub fn unshared_root_layer(&self) -> Option<LayerHandle> {
        self.lifecycle.try_lock()?.unshared_root().cloned()
    }
}
