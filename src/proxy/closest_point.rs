//! Process-wide closest-point delegate used by picking.

use parking_lot::{const_rwlock, RwLock};
use std::sync::Arc;

use super::ProxyShape;
use crate::util::{Ray, RayHit};

/// Closest point and normal on `shape` to a local-space ray, or `None`
/// on a miss.
pub type ClosestPointDelegate = dyn Fn(&ProxyShape, &Ray) -> Option<RayHit> + Send + Sync;

static DELEGATE: RwLock<Option<Arc<ClosestPointDelegate>>> = const_rwlock(None);

/// Install `delegate`, replacing any previous one. `None` uninstalls.
pub fn set_closest_point_delegate(delegate: Option<Arc<ClosestPointDelegate>>) {
    let installed = delegate.is_some();
    *DELEGATE.write() = delegate;
    tracing::debug!(installed, "closest point delegate changed");
}

pub fn closest_point_delegate() -> Option<Arc<ClosestPointDelegate>> {
    DELEGATE.read().clone()
}

pub fn has_closest_point_delegate() -> bool {
    DELEGATE.read().is_some()
}
