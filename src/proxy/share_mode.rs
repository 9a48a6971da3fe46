//! Shared/unshared stage mode and the edit transfer between the two.
//!
//! [`ShareMode::transition`] is the only way the mode changes. Moving
//! between `Shared` and `Unshared` carries the session layer contents and
//! the edit target over to the new stage before the old one is dropped.
//! Leaving `Unknown` transfers nothing.

use std::sync::Arc;

use crate::sdf::{LayerData, LayerHandle};
use crate::usd::Stage;

/// How the node's stage relates to the shared stage cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShareMode {
    /// Not computed yet.
    #[default]
    Unknown,
    /// The node outputs the cached stage other nodes may also use.
    Shared,
    /// The node outputs a private stage layered over the cached one.
    Unshared,
}

impl ShareMode {
    pub fn from_share_stage(share: bool) -> Self {
        if share {
            Self::Shared
        } else {
            Self::Unshared
        }
    }

    /// Move to `next`, transferring edits from `old_stage` to `new_stage`
    /// when switching between shared and unshared.
    ///
    /// Returns the outcome so the caller can log or count it.
    pub(crate) fn transition(&mut self, next: ShareMode, old_stage: Option<&Stage>, new_stage: &Stage) -> Transition {
        if *self == next {
            return Transition::Unchanged;
        }
        let previous = std::mem::replace(self, next);
        match (previous, old_stage) {
            (ShareMode::Unknown, _) | (_, None) => Transition::Initial,
            (_, Some(old)) => {
                let target = transfer_edits(old, new_stage);
                tracing::info!(from = ?previous, to = ?next, target = target.identifier(), "share mode changed");
                Transition::Transferred { target }
            }
        }
    }
}

/// Result of [`ShareMode::transition`].
#[derive(Debug)]
pub(crate) enum Transition {
    Unchanged,
    /// First resolution; nothing to transfer.
    Initial,
    /// Edits moved over; `target` is the new stage's edit target.
    Transferred { target: LayerHandle },
}

/// Carry the session layer contents and the edit target from `old` to `new`.
fn transfer_edits(old: &Stage, new: &Stage) -> LayerHandle {
    let old_target = old.edit_target();

    if !Arc::ptr_eq(old.session_layer(), new.session_layer()) {
        new.session_layer().transfer_content(old.session_layer());
        old.session_layer().clear();
    }

    let new_target = if Arc::ptr_eq(&old_target, old.session_layer()) {
        new.session_layer().clone()
    } else if new.has_local_layer(&old_target) {
        // Shared root and sublayers are present on both stages.
        old_target
    } else if Arc::ptr_eq(&old_target, old.root_layer()) {
        // The private root goes away with the unshared stage. Keep its own
        // opinions by folding them into the new root.
        if !old_target.prim_paths().is_empty() {
            new.root_layer().merge_from(&old_target);
            old_target.replace_data(LayerData { sublayers: old_target.sublayer_paths(), ..Default::default() });
        }
        new.root_layer().clone()
    } else {
        tracing::warn!(
            target = old_target.identifier(),
            "edit target is not reachable from the new stage, using its root layer"
        );
        new.root_layer().clone()
    };

    if let Err(err) = new.set_edit_target(&new_target) {
        tracing::warn!(error = %err, "could not restore edit target after share mode change");
        return new.edit_target();
    }
    new_target
}
