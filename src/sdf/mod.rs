//! Scene-description data layer.
//!
//! - [`ScenePath`] - Absolute prim paths
//! - [`Value`] / [`ValueType`] - Attribute values
//! - [`Layer`] / [`LayerHandle`] - Containers of authored opinions

mod layer;
mod path;
mod value;

pub use layer::{
    AttributeSpec, Layer, LayerChange, LayerChangeSink, LayerData, LayerHandle, PrimSpec,
    Specifier, TimeSample, ANONYMOUS_PREFIX,
};
pub use path::ScenePath;
pub use value::{Value, ValueType};
