//! Host evaluation graph seam.
//!
//! The proxy node only needs a narrow slice of its host: node paths, the
//! ancestor chain, per-node dirty and moved callbacks, and a way to mark
//! a node dirty. [`HostGraph`] is that slice; [`DagGraph`] is an
//! in-memory host used by tests and the CLI.
//!
//! Dirty events do **not** propagate down the hierarchy by themselves.
//! A node that cares about its ancestors must register on each of them.

mod dag;

pub use dag::DagGraph;

use std::fmt;
use std::sync::Arc;

use crate::util::Result;

/// Host node identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Registration handle for a host callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(pub(crate) u64);

/// Called with the node that became dirty and the plug name.
pub type DirtyCallback = dyn Fn(NodeId, &str) + Send + Sync;

/// Called with the node whose path changed (reparent or rename).
pub type MovedCallback = dyn Fn(NodeId) + Send + Sync;

/// The part of the host graph the proxy node talks to.
pub trait HostGraph: Send + Sync {
    /// Full path of `node`, e.g. `|world|xform1|proxyShape1`.
    fn path_string(&self, node: NodeId) -> Option<String>;

    /// Ancestors of `node`, nearest first.
    fn ancestors(&self, node: NodeId) -> Vec<NodeId>;

    /// Call `callback` whenever a plug on `node` is dirtied.
    fn add_dirty_callback(&self, node: NodeId, callback: Arc<DirtyCallback>) -> Result<CallbackId>;

    /// Call `callback` whenever `node`'s path changes.
    fn add_moved_callback(&self, node: NodeId, callback: Arc<MovedCallback>) -> Result<CallbackId>;

    /// Remove a callback. Returns false if it was not registered.
    fn remove_callback(&self, id: CallbackId) -> bool;

    /// Mark `plug` on `node` dirty and run the node's dirty callbacks.
    fn set_dirty(&self, node: NodeId, plug: &str);
}
