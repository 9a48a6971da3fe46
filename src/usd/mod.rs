//! Composed stages and their change notices.
//!
//! - [`Stage`] / [`StageHandle`] - Composition of a layer stack
//! - [`Prim`] - View of a composed prim
//! - [`Notice`] - Synchronous change notices
//! - [`StageCache`] - Process-wide keyed cache of shared stages

mod notice;
mod prim;
mod purpose;
mod stage;
mod stage_cache;

pub use notice::{ChangeClass, Notice, NoticeCallback, NoticeKey, ObjectsChanged};
pub use prim::Prim;
pub use purpose::{Purpose, PurposeFilter};
pub use stage::{InitialLoadSet, Stage, StageHandle};
pub use stage_cache::{StageCache, StageCacheId, StageKey};

pub(crate) use stage::resolve_layer;
