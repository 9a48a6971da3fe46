//! Stage resolution and sharing.
//!
//! Each compute of the cached stage input resolves a *source* stage (an
//! incoming stage, the shared stage for the file, or a shared stage on the
//! node's anonymous root) and then the stage the node outputs: the source
//! itself when shared, or a private stage layered over it when unshared.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::listener::StageNoticeListener;
use super::share_mode::{ShareMode, Transition};
use super::{ProxyInputs, ProxyShape};
use crate::layer_muting;
use crate::sdf::{Layer, LayerHandle};
use crate::usd::{InitialLoadSet, Stage, StageCache, StageHandle, StageKey};

pub(crate) const UNSHARED_ROOT_TAG: &str = "unsharedStageRootLayer";
pub(crate) const UNSHARED_SESSION_TAG: &str = "unsharedStageSessionLayer";

/// Lifecycle state; only the compute pipeline touches it.
#[derive(Default)]
pub(crate) struct Lifecycle {
    pub(crate) mode: ShareMode,
    /// Stage the node outputs.
    pub(crate) stage: Option<StageHandle>,
    /// Stage the output is built from. Holds the shared stage alive.
    source: Option<StageHandle>,
    anonymous_root: Option<LayerHandle>,
    unshared_root: Option<LayerHandle>,
    unshared_session: Option<LayerHandle>,
    unshared_stage: Option<StageHandle>,
    /// Source root currently sublayered into the private root.
    unshared_source_root: Option<String>,
    /// Sublayers of the private root, held so they stay alive.
    unshared_sublayers: Vec<LayerHandle>,
    listener: Option<StageNoticeListener>,
    initialized: bool,
}

impl Lifecycle {
    pub(crate) fn anonymous_root(&self) -> Option<&LayerHandle> {
        self.anonymous_root.as_ref()
    }

    pub(crate) fn set_anonymous_root(&mut self, layer: LayerHandle) {
        self.anonymous_root = Some(layer);
    }

    pub(crate) fn unshared_root(&self) -> Option<&LayerHandle> {
        self.unshared_root.as_ref()
    }

    /// Forget the stages and the subscription. Layers and the private
    /// stage are kept.
    fn release_stage(&mut self) {
        self.listener = None;
        self.stage = None;
        self.source = None;
    }
}

/// Where the source stage came from.
struct Source {
    stage: StageHandle,
    incoming: bool,
}

impl ProxyShape {
    /// Resolve the output stage for `inputs`, switching share mode and
    /// moving the subscription as needed. `None` is the "no stage" result.
    pub(crate) fn resolve_stage(&self, lc: &mut Lifecycle, inputs: &ProxyInputs) -> Option<StageHandle> {
        let Some(source) = self.resolve_source(lc, inputs) else {
            lc.release_stage();
            self.publish_source(None);
            return None;
        };
        let next_mode = ShareMode::from_share_stage(inputs.share_stage);
        let out_stage = match next_mode {
            ShareMode::Unshared => self.unshared_stage(lc, &source.stage, inputs.load_set()),
            _ => source.stage.clone(),
        };

        let unchanged = lc.mode == next_mode
            && lc.stage.as_ref().is_some_and(|s| Arc::ptr_eq(s, &out_stage))
            && lc.listener.as_ref().is_some_and(|l| l.stage_id() == out_stage.id());
        if unchanged {
            lc.source = Some(source.stage.clone());
            self.publish_source(Some(&source));
            return Some(out_stage);
        }

        // Notices from the old stage must not reach this node once the
        // transfer starts.
        lc.listener = None;
        // After a failed resolution the private stage still carries the
        // node's unshared edits.
        let old_stage = lc.stage.take().or_else(|| match lc.mode {
            ShareMode::Unshared => lc.unshared_stage.clone(),
            _ => None,
        });
        let transition = lc.mode.transition(next_mode, old_stage.as_deref(), &out_stage);
        drop(old_stage);

        lc.listener = Some(StageNoticeListener::attach(&out_stage, self.weak_self.clone()));
        lc.stage = Some(out_stage.clone());
        lc.source = Some(source.stage.clone());

        if !lc.initialized {
            lc.initialized = true;
            self.restore_persisted_state(&out_stage, inputs);
        }
        match transition {
            Transition::Transferred { target } => *self.target_layer.lock() = Some(target),
            Transition::Initial | Transition::Unchanged => {
                *self.target_layer.lock() = Some(out_stage.edit_target());
            }
        }

        self.stage_version.fetch_add(1, Ordering::SeqCst);
        self.bbox_cache.clear();
        self.publish_source(Some(&source));
        {
            let mut outputs = self.outputs.write();
            outputs.share_mode = lc.mode;
        }
        tracing::debug!(
            node = %self.path_string(),
            stage = out_stage.id(),
            mode = ?lc.mode,
            "stage resolved"
        );
        Some(out_stage)
    }

    fn publish_source(&self, source: Option<&Source>) {
        let mut outputs = self.outputs.write();
        match source {
            Some(s) if s.incoming => {
                outputs.incoming = true;
                outputs.incoming_layers = s.stage.layer_identifiers().into_iter().collect();
            }
            _ => {
                outputs.incoming = false;
                outputs.incoming_layers = BTreeSet::new();
            }
        }
    }

    /// Apply the muted-layers and target-layer attributes on the first
    /// resolution.
    fn restore_persisted_state(&self, stage: &StageHandle, inputs: &ProxyInputs) {
        if !inputs.muted_layers.is_empty() {
            if let Err(err) = layer_muting::copy_layer_muting_from_attribute(self, Some(&**stage)) {
                tracing::warn!(error = %err, "could not restore layer muting");
            }
        }
        let target = inputs.target_layer.trim();
        if target.is_empty() {
            return;
        }
        match stage.find_layer(target) {
            Some(layer) => {
                if let Err(err) = stage.set_edit_target(&layer) {
                    tracing::warn!(layer = target, error = %err, "could not restore edit target");
                }
            }
            None => tracing::warn!(layer = target, "persisted edit target not found on stage"),
        }
    }

    fn resolve_source(&self, lc: &mut Lifecycle, inputs: &ProxyInputs) -> Option<Source> {
        if let Some(stage) = &inputs.in_stage_data {
            return Some(Source { stage: stage.clone(), incoming: true });
        }
        if inputs.stage_cache_id.is_valid() {
            match StageCache::global().find(inputs.stage_cache_id) {
                Some(stage) => return Some(Source { stage, incoming: true }),
                None => tracing::warn!(
                    id = inputs.stage_cache_id.to_i64(),
                    "stage cache id does not name a live stage, falling back to file"
                ),
            }
        }

        let load_set = inputs.load_set();
        let session = self.hooks.compute_session_layer(inputs).or_else(|| {
            let name = inputs.session_layer_name.trim();
            (!name.is_empty()).then(|| Layer::find(name)).flatten()
        });

        let file = inputs.file_path.trim();
        let root = if !file.is_empty() {
            match self.hooks.compute_root_layer(inputs, file) {
                Some(layer) => layer,
                None => {
                    let path = self.config.resolve_file_path(file, inputs.file_path_relative);
                    match Layer::find_or_open(&path) {
                        Ok(layer) => layer,
                        Err(err) => {
                            tracing::warn!(node = %self.path_string(), file = %path.display(), error = %err, "could not open stage");
                            return None;
                        }
                    }
                }
            }
        } else {
            self.anonymous_root_layer(lc, inputs)
        };

        let key = StageKey::new(root.identifier(), session.as_ref().map(|l| l.identifier().to_string()), load_set);
        let opened = StageCache::global().find_or_open(key, || Ok(Stage::open(root.clone(), session.clone(), load_set)));
        match opened {
            Ok((stage, _)) => Some(Source { stage, incoming: false }),
            Err(err) => {
                tracing::warn!(node = %self.path_string(), error = %err, "could not open stage");
                None
            }
        }
    }

    /// Named root layer, or the node's own anonymous root created on first use.
    fn anonymous_root_layer(&self, lc: &mut Lifecycle, inputs: &ProxyInputs) -> LayerHandle {
        let name = inputs.root_layer_name.trim();
        if !name.is_empty() {
            if let Some(layer) = Layer::find(name) {
                return layer;
            }
            if let Some(layer) = lc.anonymous_root.as_ref().filter(|l| l.identifier() == name) {
                return layer.clone();
            }
        }
        if let Some(layer) = &lc.anonymous_root {
            return layer.clone();
        }
        let layer = Layer::create_anonymous(&self.config.anonymous_root_tag);
        tracing::debug!(node = %self.path_string(), layer = layer.identifier(), "created anonymous root layer");
        // Remembered for save; not an edit, so nothing is dirtied.
        self.inputs.write().root_layer_name = layer.identifier().to_string();
        lc.anonymous_root = Some(layer.clone());
        layer
    }

    /// Private stage over `source`, created once and reused.
    fn unshared_stage(&self, lc: &mut Lifecycle, source: &StageHandle, load_set: InitialLoadSet) -> StageHandle {
        let root = lc.unshared_root.get_or_insert_with(|| Layer::create_anonymous(UNSHARED_ROOT_TAG)).clone();
        let session = lc
            .unshared_session
            .get_or_insert_with(|| Layer::create_anonymous(UNSHARED_SESSION_TAG))
            .clone();

        let source_root = source.root_layer().identifier().to_string();
        if lc.unshared_source_root.as_deref() != Some(source_root.as_str()) {
            let mut sublayers = root.sublayer_paths();
            if let Some(previous) = &lc.unshared_source_root {
                sublayers.retain(|s| s != previous);
            }
            if !sublayers.contains(&source_root) {
                sublayers.insert(0, source_root.clone());
            }
            root.set_sublayer_paths(sublayers);
            lc.unshared_source_root = Some(source_root);
        }

        lc.unshared_sublayers = root
            .sublayer_paths()
            .iter()
            .filter_map(|id| match crate::usd::resolve_layer(id, root.real_path()) {
                Ok(layer) => Some(layer),
                Err(err) => {
                    tracing::warn!(sublayer = %id, error = %err, "unshared sublayer could not be resolved");
                    None
                }
            })
            .collect();

        match &lc.unshared_stage {
            Some(stage) if stage.load_set() == load_set => stage.clone(),
            _ => {
                let stage = Stage::open(root, Some(session), load_set);
                lc.unshared_stage = Some(stage.clone());
                stage
            }
        }
    }
}
