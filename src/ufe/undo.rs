//! Undoable scene edits.
//!
//! Edits are recorded as whole-layer snapshots taken before and after the
//! edit runs. Undo and redo swap the recorded contents back in.

use crate::sdf::{LayerData, LayerHandle};
use crate::usd::Prim;
use crate::util::{Error, Result};

/// A command the host can execute, undo and redo.
pub trait UndoableCommand: Send {
    fn execute(&mut self) -> Result<()>;
    fn undo(&mut self) -> Result<()>;
    fn redo(&mut self) -> Result<()>;
}

struct LayerEdit {
    layer: LayerHandle,
    before: LayerData,
    after: LayerData,
}

/// Recorded contents of the layers touched by an edit.
#[derive(Default)]
pub struct UndoableItem {
    edits: Vec<LayerEdit>,
}

impl UndoableItem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `edit`, recording `layers` before and after. Layers the edit
    /// left untouched are not recorded.
    pub fn capture<R>(&mut self, layers: &[LayerHandle], edit: impl FnOnce() -> R) -> R {
        let before: Vec<LayerData> = layers.iter().map(|l| l.snapshot()).collect();
        let out = edit();
        for (layer, before) in layers.iter().zip(before) {
            let after = layer.snapshot();
            if after != before {
                self.edits.push(LayerEdit { layer: layer.clone(), before, after });
            }
        }
        out
    }

    pub fn undo(&self) {
        for edit in self.edits.iter().rev() {
            edit.layer.replace_data(edit.before.clone());
        }
    }

    pub fn redo(&self) {
        for edit in &self.edits {
            edit.layer.replace_data(edit.after.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Deletes a prim by removing its specs from the edit target.
pub struct UndoDeleteCommand {
    prim: Prim,
    item: UndoableItem,
}

impl UndoDeleteCommand {
    pub fn new(prim: Prim) -> Self {
        Self { prim, item: UndoableItem::new() }
    }

    /// Layers other than the edit target that hold opinions on the prim.
    fn other_opinions(&self, target: &LayerHandle) -> Vec<String> {
        let path = self.prim.path();
        self.prim
            .stage()
            .layer_stack()
            .into_iter()
            .filter(|l| !std::sync::Arc::ptr_eq(l, target) && l.has_prim_spec(path))
            .map(|l| l.identifier().to_string())
            .collect()
    }
}

impl UndoableCommand for UndoDeleteCommand {
    fn execute(&mut self) -> Result<()> {
        if !self.prim.is_valid() || self.prim.is_pseudo_root() {
            return Err(Error::PrimNotFound(self.prim.path().to_string()));
        }
        let stage = self.prim.stage().clone();
        let target = stage.edit_target();
        let others = self.other_opinions(&target);
        if !others.is_empty() {
            return Err(Error::other(format!(
                "cannot delete '{}': it has opinions on {}",
                self.prim.path(),
                others.join(", ")
            )));
        }
        let path = self.prim.path().clone();
        let removed = self.item.capture(std::slice::from_ref(&target), || stage.remove_prim(&path));
        if !removed {
            return Err(Error::PrimNotFound(path.to_string()));
        }
        tracing::debug!(prim = %path, layer = target.identifier(), "deleted prim");
        Ok(())
    }

    fn undo(&mut self) -> Result<()> {
        self.item.undo();
        Ok(())
    }

    fn redo(&mut self) -> Result<()> {
        self.item.redo();
        Ok(())
    }
}
