//! Stage proxy node.
//!
//! A [`ProxyShape`] is a host graph node that owns (or shares) a composed
//! stage and keeps it in step with the host's dirty/compute cycle:
//!
//! - inputs are set through typed setters, which dirty the outputs listed
//!   in [`Attr::affects`];
//! - outputs (time, cached stage, stage data, stage cache id) are pulled
//!   and computed on demand;
//! - stage notices bump the node's counters, clear its bounding-box cache
//!   and mark it dirty, but never compute;
//! - dirty callbacks on the node's ancestors are kept in step with its
//!   position in the host hierarchy.

mod ancestors;
mod attrs;
mod bbox_cache;
mod closest_point;
mod compute;
mod hooks;
mod lifecycle;
mod listener;
mod reentrancy;
mod shape;
mod share_mode;
mod stage_data;

pub use attrs::{Attr, ProxyInputs};
pub use bbox_cache::BoundingBoxCache;
pub use closest_point::{
    closest_point_delegate, has_closest_point_delegate, set_closest_point_delegate, ClosestPointDelegate,
};
pub use hooks::{DefaultHooks, ProxyShapeHooks};
pub use reentrancy::in_compute;
pub use shape::{ProxyShape, RenderAttributes};
pub use share_mode::ShareMode;
pub use stage_data::StageData;
