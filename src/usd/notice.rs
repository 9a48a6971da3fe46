//! Change notices sent by a stage to its listeners.
//!
//! Notices are delivered synchronously, in edit order, on the thread that
//! made the edit. No stage lock is held while listeners run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::Stage;
use crate::sdf::{LayerHandle, ScenePath};

/// Structural versus value-only changes to composed objects.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectsChanged {
    /// Prims whose subtree must be re-read (added, removed, re-typed,
    /// attribute set changed, or the whole stage on layer-stack changes).
    pub resynced: Vec<ScenePath>,
    /// Prims whose attribute values changed.
    pub changed_info_only: Vec<ScenePath>,
    /// Names of the attributes behind `changed_info_only`.
    pub changed_attributes: Vec<String>,
}

/// Attributes read when composing bounds, besides `xformOp:*`.
const BOUNDS_ATTRIBUTES: [&str; 3] = ["extent", "visibility", "purpose"];

/// How a listener should treat an [`ObjectsChanged`] notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeClass {
    Ignored,
    Update,
    Resync,
}

impl ObjectsChanged {
    pub fn classify(&self) -> ChangeClass {
        if !self.resynced.is_empty() {
            ChangeClass::Resync
        } else if !self.changed_info_only.is_empty() {
            ChangeClass::Update
        } else {
            ChangeClass::Ignored
        }
    }

    /// True if the change can move or resize composed bounds.
    pub fn affects_bounds(&self) -> bool {
        !self.resynced.is_empty()
            || self
                .changed_attributes
                .iter()
                .any(|name| name.starts_with("xformOp") || BOUNDS_ATTRIBUTES.contains(&name.as_str()))
    }

    /// True if `path` or one of its ancestors was resynced.
    pub fn resyncs(&self, path: &ScenePath) -> bool {
        self.resynced.iter().any(|r| path.has_prefix(r))
    }
}

/// A stage notice.
#[derive(Clone, Debug)]
pub enum Notice {
    /// Composed objects changed.
    ObjectsChanged(ObjectsChanged),
    /// Something on the stage changed. Sent after every `ObjectsChanged`.
    StageContentsChanged,
    /// Layers were muted or unmuted. Muted layers are passed as handles so
    /// a listener can retain them before the stage lets them go.
    LayerMutingChanged {
        muted: Vec<LayerHandle>,
        unmuted: Vec<String>,
    },
    /// The edit target moved to another layer.
    StageEditTargetChanged,
}

/// Listener callback.
pub type NoticeCallback = dyn Fn(&Stage, &Notice) + Send + Sync;

/// Registration token returned by [`Stage::register_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NoticeKey(u64);

impl NoticeKey {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) type ListenerList = Vec<(NoticeKey, Arc<NoticeCallback>)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let p = ScenePath::new("/A").unwrap();
        assert_eq!(ObjectsChanged::default().classify(), ChangeClass::Ignored);
        let update = ObjectsChanged { changed_info_only: vec![p.clone()], ..Default::default() };
        assert_eq!(update.classify(), ChangeClass::Update);
        let resync = ObjectsChanged { resynced: vec![p.clone()], changed_info_only: vec![p], ..Default::default() };
        assert_eq!(resync.classify(), ChangeClass::Resync);
    }

    #[test]
    fn test_affects_bounds() {
        let p = ScenePath::new("/A").unwrap();
        let update = |name: &str| ObjectsChanged {
            changed_info_only: vec![p.clone()],
            changed_attributes: vec![name.to_string()],
            ..Default::default()
        };
        assert!(update("extent").affects_bounds());
        assert!(update("xformOp:translate").affects_bounds());
        assert!(update("visibility").affects_bounds());
        assert!(!update("size").affects_bounds());
        assert!(ObjectsChanged { resynced: vec![p.clone()], ..Default::default() }.affects_bounds());
    }

    #[test]
    fn test_resyncs_descendants() {
        let n = ObjectsChanged { resynced: vec![ScenePath::new("/A").unwrap()], ..Default::default() };
        assert!(n.resyncs(&ScenePath::new("/A/B").unwrap()));
        assert!(!n.resyncs(&ScenePath::new("/B").unwrap()));
    }
}
