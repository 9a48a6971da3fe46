//! Layer muting persistence and retention.
//!
//! Muting is stage state, not layer state, and stages are not saved with
//! the host scene. The node therefore stores its stage's muted layer
//! identifiers in its muted-layers attribute.
//!
//! A stage also lets go of muted layers. An anonymous layer nobody else
//! holds would vanish with its contents, so muted layers are retained in
//! a process-wide list until they are unmuted or the scene is torn down
//! ([`forget_muted_layers`]).

use parking_lot::{const_mutex, Mutex};
use std::sync::Arc;
use thiserror::Error;

use crate::proxy::{Attr, ProxyShape};
use crate::sdf::{Layer, LayerHandle};
use crate::usd::Stage;

/// Why a muting copy failed. Nothing was modified in either case.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutingError {
    #[error("stage is invalid")]
    StageInvalid,
    #[error("cannot write attribute '{0}'")]
    AttributeWriteFailed(&'static str),
}

static MUTED_LAYERS: Mutex<Vec<LayerHandle>> = const_mutex(Vec::new());

/// Keep `layer` alive while muted.
pub fn add_muted_layer(layer: &LayerHandle) {
    let mut held = MUTED_LAYERS.lock();
    if !held.iter().any(|l| Arc::ptr_eq(l, layer)) {
        tracing::trace!(layer = layer.identifier(), "retaining muted layer");
        held.push(layer.clone());
    }
}

/// Stop retaining `layer`.
pub fn remove_muted_layer(layer: &LayerHandle) {
    MUTED_LAYERS.lock().retain(|l| !Arc::ptr_eq(l, layer));
}

/// Release every retained layer (scene teardown).
pub fn forget_muted_layers() {
    let released: Vec<LayerHandle> = std::mem::take(&mut *MUTED_LAYERS.lock());
    tracing::debug!(count = released.len(), "forgetting muted layers");
}

/// True if `identifier` is currently retained.
pub fn is_muted_layer_retained(identifier: &str) -> bool {
    MUTED_LAYERS.lock().iter().any(|l| l.identifier() == identifier)
}

/// Write `stage`'s muted layer identifiers into `shape`'s attribute.
pub fn copy_layer_muting_to_attribute(stage: Option<&Stage>, shape: &ProxyShape) -> Result<(), MutingError> {
    let stage = stage.ok_or(MutingError::StageInvalid)?;
    let muted = stage.muted_layers();
    shape
        .write_attribute(Attr::MutedLayers, |inputs| inputs.muted_layers = muted)
        .map_err(|_| MutingError::AttributeWriteFailed(Attr::MutedLayers.name()))
}

/// Make `stage`'s muting match `shape`'s attribute: listed layers are
/// muted, every other muted layer is unmuted.
pub fn copy_layer_muting_from_attribute(shape: &ProxyShape, stage: Option<&Stage>) -> Result<(), MutingError> {
    let stage = stage.ok_or(MutingError::StageInvalid)?;
    let wanted = shape.get_muted_layers();

    for id in &wanted {
        if let Some(layer) = stage.find_layer(id).or_else(|| Layer::find(id)) {
            add_muted_layer(&layer);
        }
    }
    let unmute: Vec<String> = stage
        .muted_layers()
        .into_iter()
        .filter(|id| !wanted.contains(id))
        .collect();
    tracing::debug!(mute = wanted.len(), unmute = unmute.len(), "restoring layer muting");
    stage.mute_and_unmute_layers(&wanted, &unmute);
    Ok(())
}

#[cfg(test)]
pub(crate) fn retained_count() -> usize {
    MUTED_LAYERS.lock().len()
}
