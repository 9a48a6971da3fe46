//! Stage notice subscription and its effect on the node.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use super::{Attr, ProxyShape};
use crate::config::BoundsInvalidation;
use crate::layer_muting;
use crate::sdf::Layer;
use crate::usd::{ChangeClass, Notice, NoticeKey, Stage, StageHandle};

/// Subscription of one node to one stage. Dropping it unsubscribes.
pub(crate) struct StageNoticeListener {
    stage: Weak<Stage>,
    stage_id: u64,
    key: NoticeKey,
}

impl StageNoticeListener {
    pub(crate) fn attach(stage: &StageHandle, shape: Weak<ProxyShape>) -> Self {
        let key = stage.register_listener(move |stage, notice| {
            if let Some(shape) = shape.upgrade() {
                shape.on_stage_notice(stage, notice);
            }
        });
        tracing::debug!(stage = stage.id(), "listener attached");
        Self { stage: Arc::downgrade(stage), stage_id: stage.id(), key }
    }

    pub(crate) fn stage_id(&self) -> u64 {
        self.stage_id
    }
}

impl Drop for StageNoticeListener {
    fn drop(&mut self) {
        if let Some(stage) = self.stage.upgrade() {
            stage.revoke_listener(self.key);
        }
        tracing::debug!(stage = self.stage_id, "listener detached");
    }
}

impl ProxyShape {
    /// Record the effect of a stage notice. Never computes.
    pub(crate) fn on_stage_notice(&self, stage: &Stage, notice: &Notice) {
        match notice {
            Notice::StageContentsChanged => {
                self.update_counter.fetch_add(1, Ordering::SeqCst);
                if self.config.bounds_invalidation == BoundsInvalidation::Conservative {
                    self.bbox_cache.clear();
                }
                self.propagate_dirty(&[Attr::OutStageData, Attr::UpdateCounter]);
            }
            Notice::ObjectsChanged(change) => match change.classify() {
                ChangeClass::Ignored => {}
                ChangeClass::Update => {
                    if change.affects_bounds() {
                        self.bbox_cache.clear();
                    }
                    self.propagate_dirty(&[Attr::OutStageData]);
                }
                ChangeClass::Resync => {
                    self.resync_counter.fetch_add(1, Ordering::SeqCst);
                    self.bbox_cache.clear();
                    self.propagate_dirty(&[Attr::OutStageData, Attr::ResyncCounter]);
                }
            },
            Notice::LayerMutingChanged { muted, unmuted } => {
                for layer in muted {
                    layer_muting::add_muted_layer(layer);
                }
                for id in unmuted {
                    if let Some(layer) = Layer::find(id) {
                        layer_muting::remove_muted_layer(&layer);
                    }
                }
                if let Err(err) = layer_muting::copy_layer_muting_to_attribute(Some(stage), self) {
                    tracing::warn!(node = %self.path_string(), error = %err, "could not persist layer muting");
                }
                self.stage_version.fetch_add(1, Ordering::SeqCst);
                self.propagate_dirty(&[Attr::OutStageData]);
            }
            Notice::StageEditTargetChanged => {
                *self.target_layer.lock() = Some(stage.edit_target());
            }
        }
    }
}
