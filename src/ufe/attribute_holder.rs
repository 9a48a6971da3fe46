//! Editable view of one prim attribute.

use crate::sdf::{ScenePath, Value, ValueType};
use crate::usd::Prim;
use crate::util::{Error, Result, TimeCode};

/// `(value, label)` pairs offered for an attribute.
pub type EnumOptions = Vec<(String, String)>;

/// Metadata key of the display name.
pub const UI_NAME: &str = "uiname";
/// Metadata key of the documentation string.
pub const DOCUMENTATION: &str = "documentation";
/// Metadata key marking an attribute read-only.
pub const LOCK: &str = "lock";
/// Metadata key listing allowed token values, comma separated.
pub const ALLOWED_TOKENS: &str = "allowedTokens";

/// Get/set access to an attribute, with metadata and a fallback default.
pub trait AttributeHolder: Send + Sync {
    /// True if the attribute exists on the stage.
    fn is_valid(&self) -> bool;
    fn is_authored(&self) -> bool;
    fn has_value(&self) -> bool;
    fn name(&self) -> String;
    fn display_name(&self) -> String;
    fn documentation(&self) -> String;
    /// Type name as the property source spells it.
    fn native_type(&self) -> String;
    fn value_type(&self) -> Option<ValueType>;
    /// Textual default, empty if there is none.
    fn default_value(&self) -> String;

    fn get(&self, time: TimeCode) -> Option<Value>;
    fn set(&self, value: Value, time: Option<TimeCode>) -> Result<()>;

    fn get_metadata(&self, key: &str) -> Option<String>;
    fn set_metadata(&self, key: &str, value: &str) -> Result<()>;
    fn has_metadata(&self, key: &str) -> bool;

    fn enums(&self) -> EnumOptions;

    fn enum_values(&self) -> Vec<String> {
        self.enums().into_iter().map(|(value, _)| value).collect()
    }

    /// Why editing is refused; empty when it is allowed.
    fn is_edit_allowed_msg(&self) -> String;

    fn is_edit_allowed(&self) -> bool {
        self.is_edit_allowed_msg().is_empty()
    }
}

/// Holder over an attribute of a composed prim.
///
/// The attribute need not exist yet; the holder remembers the prim and
/// name so it can be created later.
#[derive(Clone, Debug)]
pub struct UsdAttributeHolder {
    prim: Prim,
    name: String,
}

impl UsdAttributeHolder {
    pub fn new(prim: Prim, name: impl Into<String>) -> Self {
        Self { prim, name: name.into() }
    }

    pub fn prim(&self) -> &Prim {
        &self.prim
    }

    fn path(&self) -> &ScenePath {
        self.prim.path()
    }

    /// Author an empty attribute spec of `value_type` on the edit target.
    pub(crate) fn create(&self, value_type: ValueType) -> Result<()> {
        if !self.prim.is_valid() {
            return Err(Error::PrimNotFound(self.path().to_string()));
        }
        self.prim.stage().create_attribute(self.path(), &self.name, value_type)
    }
}

impl AttributeHolder for UsdAttributeHolder {
    fn is_valid(&self) -> bool {
        self.prim.is_valid() && self.prim.stage().attribute_type(self.path(), &self.name).is_some()
    }

    fn is_authored(&self) -> bool {
        self.prim.is_valid() && self.prim.stage().has_authored_attribute(self.path(), &self.name)
    }

    fn has_value(&self) -> bool {
        self.get(TimeCode::default()).is_some()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn display_name(&self) -> String {
        self.get_metadata(UI_NAME).unwrap_or_else(|| self.name.clone())
    }

    fn documentation(&self) -> String {
        self.get_metadata(DOCUMENTATION).unwrap_or_default()
    }

    fn native_type(&self) -> String {
        self.value_type().map(|t| t.name().to_string()).unwrap_or_default()
    }

    fn value_type(&self) -> Option<ValueType> {
        self.prim.stage().attribute_type(self.path(), &self.name)
    }

    fn default_value(&self) -> String {
        String::new()
    }

    fn get(&self, time: TimeCode) -> Option<Value> {
        if !self.prim.is_valid() {
            return None;
        }
        self.prim.get(&self.name, time)
    }

    fn set(&self, value: Value, time: Option<TimeCode>) -> Result<()> {
        let msg = self.is_edit_allowed_msg();
        if !msg.is_empty() {
            return Err(Error::other(msg));
        }
        self.prim.stage().set_attribute(self.path(), &self.name, value, time)
    }

    fn get_metadata(&self, key: &str) -> Option<String> {
        self.prim.stage().attribute_metadata(self.path(), &self.name, key)
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let value_type = self
            .value_type()
            .ok_or_else(|| Error::other(format!("attribute '{}' does not exist", self.name)))?;
        let target = self.prim.stage().edit_target();
        if target.attribute_spec(self.path(), &self.name).is_none() {
            target.create_attribute(self.path(), &self.name, value_type)?;
        }
        target.set_attribute_metadata(self.path(), &self.name, key, value);
        Ok(())
    }

    fn has_metadata(&self, key: &str) -> bool {
        self.get_metadata(key).is_some()
    }

    fn enums(&self) -> EnumOptions {
        self.get_metadata(ALLOWED_TOKENS)
            .map(|tokens| {
                tokens
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|t| (t.to_string(), t.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_edit_allowed_msg(&self) -> String {
        if !self.prim.is_valid() {
            return "Editing is not allowed.".to_string();
        }
        if self.get_metadata(LOCK).is_some_and(|v| v == "on" || v == "true") {
            return format!("The attribute '{}' is locked.", self.name);
        }
        String::new()
    }
}
