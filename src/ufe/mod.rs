//! Scene-editing collaborators used by host tools.
//!
//! - [`AttributeHolder`] - Get/set/metadata access to one attribute
//! - [`ShaderAttributeHolder`] - Registry-backed shader inputs and outputs
//! - [`UndoDeleteCommand`] - Undoable prim deletion

mod attribute_holder;
mod shader;
mod undo;

pub use attribute_holder::{
    AttributeHolder, EnumOptions, UsdAttributeHolder, ALLOWED_TOKENS, DOCUMENTATION, LOCK, UI_NAME,
};
pub use shader::{
    has_warned_missing_default, ShaderAttributeHolder, ShaderAttributeKind, ShaderDefinition, ShaderProperty,
    ShaderRegistry, INFO_ID,
};
pub use undo::{UndoDeleteCommand, UndoableCommand, UndoableItem};
