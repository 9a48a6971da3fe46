//! Dirty callbacks on the node and each of its ancestors.
//!
//! The host does not forward ancestor dirty events (transform changes,
//! visibility) to the node, so it listens on every node of its parent
//! chain itself. The registrations are keyed by the node's path string
//! and rebuilt only when that path changes.

use smallvec::SmallVec;
use std::iter;
use std::sync::Arc;

use crate::host::{CallbackId, DirtyCallback, HostGraph, NodeId};

#[derive(Debug, Default)]
pub(crate) struct AncestorCallbacks {
    path: Option<String>,
    ids: SmallVec<[CallbackId; 8]>,
}

impl AncestorCallbacks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `callback` on `node` and its ancestors unless the path is
    /// unchanged since the last registration. Returns true if rebuilt.
    pub(crate) fn update(&mut self, graph: &dyn HostGraph, node: NodeId, callback: &Arc<DirtyCallback>) -> bool {
        let Some(path) = graph.path_string(node) else {
            self.clear(graph);
            return false;
        };
        if self.path.as_deref() == Some(path.as_str()) {
            return false;
        }
        self.clear(graph);
        for target in iter::once(node).chain(graph.ancestors(node)) {
            match graph.add_dirty_callback(target, callback.clone()) {
                Ok(id) => self.ids.push(id),
                Err(err) => tracing::warn!(node = ?target, error = %err, "could not watch ancestor"),
            }
        }
        tracing::debug!(%path, callbacks = self.ids.len(), "ancestor callbacks rebuilt");
        self.path = Some(path);
        true
    }

    /// Remove every registration.
    pub(crate) fn clear(&mut self, graph: &dyn HostGraph) {
        for id in self.ids.drain(..) {
            graph.remove_callback(id);
        }
        self.path = None;
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}
