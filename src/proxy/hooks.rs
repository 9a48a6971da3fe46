//! Customization points for specialized proxy nodes.

use super::ProxyInputs;
use crate::sdf::LayerHandle;
use crate::util::{BBox3d, TimeCode};

/// Strategy object consulted by the proxy node at fixed points.
///
/// Every method has the base node's behavior as its default, so
/// implementors override only what they specialize.
pub trait ProxyShapeHooks: Send + Sync {
    /// Session layer for the shared stage. `None` lets the stage create one.
    fn compute_session_layer(&self, _inputs: &ProxyInputs) -> Option<LayerHandle> {
        None
    }

    /// Root layer for `file_path`. `None` opens the file normally.
    fn compute_root_layer(&self, _inputs: &ProxyInputs, _file_path: &str) -> Option<LayerHandle> {
        None
    }

    /// Value of the time output.
    fn output_time(&self, inputs: &ProxyInputs) -> TimeCode {
        inputs.time
    }

    /// Called with an empty computed bounding box before it is cached.
    fn cache_empty_bounding_box(&self, _bbox: &mut BBox3d) {}

    fn can_be_soft_selected(&self) -> bool {
        false
    }

    fn soft_select_enabled(&self) -> bool {
        false
    }
}

/// Base node behavior.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl ProxyShapeHooks for DefaultHooks {}
