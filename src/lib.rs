//! # Stage Proxy
//!
//! A host-graph node that owns, shares or receives a composed
//! scene-description stage and keeps it in step with the host's
//! dirty/compute cycle.
//!
//! ## Modules
//!
//! - [`util`] - Errors, math and time codes
//! - [`sdf`] - Scene paths, values and layers
//! - [`usd`] - Composed stages, notices and the stage cache
//! - [`host`] - Host evaluation graph seam
//! - [`proxy`] - The proxy node and its components
//! - [`ufe`] - Attribute holders and undoable commands
//! - [`layer_muting`] - Muting persistence and muted-layer retention
//! - [`config`] - Node configuration
//!
//! ## Example
//!
//! ```ignore
//! use stage_proxy::prelude::*;
//! use std::sync::Arc;
//!
//! let graph = Arc::new(DagGraph::new());
//! let node = graph.create_node("proxy", None)?;
//! let shape = ProxyShape::new(graph, node, ProxyConfig::default());
//! shape.set_file_path("scene.json")?;
//!
//! let data = shape.out_stage_data()?;
//! for prim in data.stage.iter().flat_map(|s| s.prim_paths()) {
//!     println!("{prim}");
//! }
//! ```

pub mod config;
pub mod host;
pub mod layer_muting;
pub mod logging;
pub mod proxy;
pub mod sdf;
pub mod ufe;
pub mod usd;
pub mod util;

pub use config::{BoundsInvalidation, ProxyConfig};
pub use logging::{init_tracing, init_tracing_with};
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{BoundsInvalidation, ProxyConfig};
    pub use crate::host::{DagGraph, HostGraph, NodeId};
    pub use crate::proxy::{Attr, ProxyShape, ProxyShapeHooks, ShareMode, StageData};
    pub use crate::sdf::{Layer, LayerHandle, ScenePath, Value, ValueType};
    pub use crate::usd::{InitialLoadSet, Prim, Stage, StageCache, StageCacheId, StageHandle};
    pub use crate::util::{BBox3d, Error, Result, TimeCode};
}
