//! In-memory DAG host.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{CallbackId, DirtyCallback, HostGraph, MovedCallback, NodeId};
use crate::util::{Error, Result};

struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

enum Callback {
    Dirty(NodeId, Arc<DirtyCallback>),
    Moved(NodeId, Arc<MovedCallback>),
}

/// A parent/child node hierarchy with callback tables.
///
/// Every `set_dirty` call is also recorded so tests can count how often a
/// node was dirtied.
pub struct DagGraph {
    nodes: RwLock<HashMap<NodeId, Node>>,
    callbacks: Mutex<HashMap<CallbackId, Callback>>,
    dirty_log: Mutex<Vec<(NodeId, String)>>,
    next_node: AtomicU64,
    next_callback: AtomicU64,
}

impl DagGraph {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
            dirty_log: Mutex::new(Vec::new()),
            next_node: AtomicU64::new(1),
            next_callback: AtomicU64::new(1),
        }
    }

    /// Add a node under `parent` (or at the top level).
    pub fn create_node(&self, name: &str, parent: Option<NodeId>) -> Result<NodeId> {
        let id = NodeId(self.next_node.fetch_add(1, Ordering::Relaxed));
        let mut nodes = self.nodes.write();
        if let Some(p) = parent {
            nodes.get_mut(&p).ok_or(Error::NodeNotFound(p.0))?.children.push(id);
        }
        nodes.insert(id, Node { name: name.to_string(), parent, children: Vec::new() });
        Ok(id)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.read().get(&node)?.parent
    }

    pub fn name(&self, node: NodeId) -> Option<String> {
        self.nodes.read().get(&node).map(|n| n.name.clone())
    }

    /// Move `node` under `new_parent`. Moved callbacks run for the node and
    /// all of its descendants.
    pub fn reparent(&self, node: NodeId, new_parent: Option<NodeId>) -> Result<()> {
        let moved = {
            let mut nodes = self.nodes.write();
            if !nodes.contains_key(&node) {
                return Err(Error::NodeNotFound(node.0));
            }
            if let Some(p) = new_parent {
                if !nodes.contains_key(&p) {
                    return Err(Error::NodeNotFound(p.0));
                }
                let mut cursor = Some(p);
                while let Some(c) = cursor {
                    if c == node {
                        return Err(Error::CyclicParent { child: node.0, parent: p.0 });
                    }
                    cursor = nodes.get(&c).and_then(|n| n.parent);
                }
            }
            let old_parent = nodes.get(&node).and_then(|n| n.parent);
            if old_parent == new_parent {
                return Ok(());
            }
            if let Some(old) = old_parent.and_then(|p| nodes.get_mut(&p)) {
                old.children.retain(|c| *c != node);
            }
            if let Some(new) = new_parent.and_then(|p| nodes.get_mut(&p)) {
                new.children.push(node);
            }
            if let Some(n) = nodes.get_mut(&node) {
                n.parent = new_parent;
            }
            subtree(&nodes, node)
        };
        self.fire_moved(&moved);
        Ok(())
    }

    /// Rename `node`. Moved callbacks run for the node and its descendants.
    pub fn rename(&self, node: NodeId, name: &str) -> Result<()> {
        let moved = {
            let mut nodes = self.nodes.write();
            let n = nodes.get_mut(&node).ok_or(Error::NodeNotFound(node.0))?;
            if n.name == name {
                return Ok(());
            }
            n.name = name.to_string();
            subtree(&nodes, node)
        };
        self.fire_moved(&moved);
        Ok(())
    }

    /// Number of callbacks currently registered on `node`.
    pub fn callback_count(&self, node: NodeId) -> usize {
        self.callbacks
            .lock()
            .values()
            .filter(|cb| match cb {
                Callback::Dirty(n, _) | Callback::Moved(n, _) => *n == node,
            })
            .count()
    }

    /// Number of dirty callbacks across all nodes.
    pub fn dirty_callback_count(&self) -> usize {
        self.callbacks.lock().values().filter(|cb| matches!(cb, Callback::Dirty(..))).count()
    }

    /// How many times `node` has been dirtied (any plug).
    pub fn dirty_events(&self, node: NodeId) -> usize {
        self.dirty_log.lock().iter().filter(|(n, _)| *n == node).count()
    }

    /// How many times `plug` on `node` has been dirtied.
    pub fn dirty_plug_events(&self, node: NodeId, plug: &str) -> usize {
        self.dirty_log.lock().iter().filter(|(n, p)| *n == node && p == plug).count()
    }

    pub fn clear_dirty_log(&self) {
        self.dirty_log.lock().clear();
    }

    fn fire_moved(&self, moved: &[NodeId]) {
        let targets: Vec<(NodeId, Arc<MovedCallback>)> = self
            .callbacks
            .lock()
            .values()
            .filter_map(|cb| match cb {
                Callback::Moved(n, f) if moved.contains(n) => Some((*n, f.clone())),
                _ => None,
            })
            .collect();
        for (node, f) in targets {
            f(node);
        }
    }

    fn next_callback_id(&self) -> CallbackId {
        CallbackId(self.next_callback.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for DagGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl HostGraph for DagGraph {
    fn path_string(&self, node: NodeId) -> Option<String> {
        let nodes = self.nodes.read();
        let mut parts = Vec::new();
        let mut cursor = Some(node);
        while let Some(c) = cursor {
            let n = nodes.get(&c)?;
            parts.push(n.name.as_str());
            cursor = n.parent;
        }
        parts.reverse();
        Some(format!("|{}", parts.join("|")))
    }

    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let nodes = self.nodes.read();
        let mut out = Vec::new();
        let mut cursor = nodes.get(&node).and_then(|n| n.parent);
        while let Some(c) = cursor {
            out.push(c);
            cursor = nodes.get(&c).and_then(|n| n.parent);
        }
        out
    }

    fn add_dirty_callback(&self, node: NodeId, callback: Arc<DirtyCallback>) -> Result<CallbackId> {
        if !self.nodes.read().contains_key(&node) {
            return Err(Error::NodeNotFound(node.0));
        }
        let id = self.next_callback_id();
        self.callbacks.lock().insert(id, Callback::Dirty(node, callback));
        Ok(id)
    }

    fn add_moved_callback(&self, node: NodeId, callback: Arc<MovedCallback>) -> Result<CallbackId> {
        if !self.nodes.read().contains_key(&node) {
            return Err(Error::NodeNotFound(node.0));
        }
        let id = self.next_callback_id();
        self.callbacks.lock().insert(id, Callback::Moved(node, callback));
        Ok(id)
    }

    fn remove_callback(&self, id: CallbackId) -> bool {
        self.callbacks.lock().remove(&id).is_some()
    }

    fn set_dirty(&self, node: NodeId, plug: &str) {
        self.dirty_log.lock().push((node, plug.to_string()));
        let targets: Vec<Arc<DirtyCallback>> = self
            .callbacks
            .lock()
            .values()
            .filter_map(|cb| match cb {
                Callback::Dirty(n, f) if *n == node => Some(f.clone()),
                _ => None,
            })
            .collect();
        for f in targets {
            f(node, plug);
        }
    }
}

fn subtree(nodes: &HashMap<NodeId, Node>, root: NodeId) -> Vec<NodeId> {
    let mut out = vec![root];
    let mut i = 0;
    while i < out.len() {
        if let Some(n) = nodes.get(&out[i]) {
            out.extend(n.children.iter().copied());
        }
        i += 1;
    }
    out
}
