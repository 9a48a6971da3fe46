//! Shader inputs and outputs backed by a property registry.
//!
//! A shader prim only authors the inputs a user changed. The rest still
//! exist as registry definitions with a textual default, so a
//! [`ShaderAttributeHolder`] reads through to the definition until the
//! first write materializes the attribute on the prim.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use super::attribute_holder::{AttributeHolder, EnumOptions, UsdAttributeHolder, UI_NAME};
use crate::sdf::{Value, ValueType};
use crate::usd::Prim;
use crate::util::{Error, Result, TimeCode};

/// Attribute holding a shader prim's registry identifier.
pub const INFO_ID: &str = "info:id";

/// Default text used for 3x3 matrices, which registries leave empty.
const MATRIX3D_ZERO: &str = "0,0,0,0,0,0,0,0,0";

/// Which side of the shader a property sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderAttributeKind {
    Input,
    Output,
}

impl ShaderAttributeKind {
    /// Namespace prefix of the authored attribute.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Input => "inputs:",
            Self::Output => "outputs:",
        }
    }
}

/// Registry definition of one shader property.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShaderProperty {
    pub name: String,
    /// Type name as the registry spells it (`float`, `color3f`, ...).
    pub type_name: String,
    /// Textual default; may be empty.
    pub default_value: String,
    pub help: String,
    pub ui_name: Option<String>,
    pub options: EnumOptions,
    pub metadata: BTreeMap<String, String>,
}

impl ShaderProperty {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, default_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            default_value: default_value.into(),
            ..Default::default()
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn with_ui_name(mut self, ui_name: impl Into<String>) -> Self {
        self.ui_name = Some(ui_name.into());
        self
    }

    pub fn with_option(mut self, value: impl Into<String>, label: impl Into<String>) -> Self {
        self.options.push((value.into(), label.into()));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn value_type(&self) -> Option<ValueType> {
        ValueType::from_name(&self.type_name)
    }
}

/// Properties of one shader definition.
#[derive(Clone, Debug, Default)]
pub struct ShaderDefinition {
    pub inputs: Vec<Arc<ShaderProperty>>,
    pub outputs: Vec<Arc<ShaderProperty>>,
}

impl ShaderDefinition {
    pub fn input(mut self, property: ShaderProperty) -> Self {
        self.inputs.push(Arc::new(property));
        self
    }

    pub fn output(mut self, property: ShaderProperty) -> Self {
        self.outputs.push(Arc::new(property));
        self
    }
}

/// Shader definitions keyed by identifier.
#[derive(Default)]
pub struct ShaderRegistry {
    shaders: RwLock<HashMap<String, ShaderDefinition>>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>, definition: ShaderDefinition) {
        self.shaders.write().insert(id.into(), definition);
    }

    pub fn property(&self, id: &str, name: &str, kind: ShaderAttributeKind) -> Option<Arc<ShaderProperty>> {
        let shaders = self.shaders.read();
        let def = shaders.get(id)?;
        let list = match kind {
            ShaderAttributeKind::Input => &def.inputs,
            ShaderAttributeKind::Output => &def.outputs,
        };
        list.iter().find(|p| p.name == name).cloned()
    }

    /// Holder for property `name` of the shader `prim` is an instance of.
    pub fn holder(&self, prim: Prim, name: &str, kind: ShaderAttributeKind) -> Result<ShaderAttributeHolder> {
        let id = shader_id(&prim);
        let property = self.property(&id, name, kind);
        ShaderAttributeHolder::new(prim, property, kind)
    }
}

/// Registry keys already warned about a missing default.
fn warned_no_default() -> &'static Mutex<HashSet<String>> {
    static WARNED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    WARNED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// True once a missing default was reported for `shader_id`/`property`.
pub fn has_warned_missing_default(shader_id: &str, property: &str) -> bool {
    warned_no_default().lock().contains(&format!("{shader_id}/{property}"))
}

fn shader_id(prim: &Prim) -> String {
    prim.get(INFO_ID, TimeCode::default())
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Attribute holder for a registry-defined shader input or output.
#[derive(Clone, Debug)]
pub struct ShaderAttributeHolder {
    base: UsdAttributeHolder,
    property: Arc<ShaderProperty>,
    value_type: ValueType,
    kind: ShaderAttributeKind,
}

impl ShaderAttributeHolder {
    /// Fails with [`Error::InvalidPropertyDescriptor`] when `property` is
    /// missing, unnamed or of an unknown type.
    pub fn new(prim: Prim, property: Option<Arc<ShaderProperty>>, kind: ShaderAttributeKind) -> Result<Self> {
        let property = property.ok_or_else(|| Error::InvalidPropertyDescriptor("no property".into()))?;
        if property.name.is_empty() {
            return Err(Error::InvalidPropertyDescriptor("unnamed property".into()));
        }
        let value_type = property.value_type().ok_or_else(|| {
            Error::InvalidPropertyDescriptor(format!("'{}' has unknown type '{}'", property.name, property.type_name))
        })?;
        let full_name = format!("{}{}", kind.prefix(), property.name);
        Ok(Self {
            base: UsdAttributeHolder::new(prim, full_name),
            property,
            value_type,
            kind,
        })
    }

    pub fn kind(&self) -> ShaderAttributeKind {
        self.kind
    }

    pub fn property(&self) -> &ShaderProperty {
        &self.property
    }

    fn ensure_created(&self) -> Result<()> {
        if self.base.is_valid() {
            return Ok(());
        }
        tracing::debug!(attr = %self.base.name(), "creating shader attribute on first write");
        self.base.create(self.value_type)
    }

    fn default_as_value(&self) -> Option<Value> {
        let text = self.default_value();
        if text.is_empty() {
            let key = format!("{}/{}", shader_id(self.base.prim()), self.property.name);
            if warned_no_default().lock().insert(key.clone()) {
                tracing::warn!(property = %key, "shader property has no default value");
            }
            return None;
        }
        match Value::from_string(self.value_type, &text) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(property = %self.property.name, error = %err, "bad shader default");
                None
            }
        }
    }
}

impl AttributeHolder for ShaderAttributeHolder {
    fn is_valid(&self) -> bool {
        self.base.is_valid()
    }

    fn is_authored(&self) -> bool {
        self.base.is_authored()
    }

    fn has_value(&self) -> bool {
        self.base.has_value() || !self.default_value().is_empty()
    }

    fn name(&self) -> String {
        self.base.name()
    }

    fn display_name(&self) -> String {
        if let Some(ui_name) = &self.property.ui_name {
            return ui_name.clone();
        }
        if let Some(ui_name) = self.property.metadata.get(UI_NAME) {
            return ui_name.clone();
        }
        self.base.display_name()
    }

    fn documentation(&self) -> String {
        self.property.help.clone()
    }

    fn native_type(&self) -> String {
        self.property.type_name.clone()
    }

    fn value_type(&self) -> Option<ValueType> {
        Some(self.value_type)
    }

    fn default_value(&self) -> String {
        if self.property.default_value.is_empty() && self.value_type == ValueType::Matrix3d {
            return MATRIX3D_ZERO.to_string();
        }
        self.property.default_value.clone()
    }

    fn get(&self, time: TimeCode) -> Option<Value> {
        if self.base.is_valid() {
            if let Some(value) = self.base.get(time) {
                return Some(value);
            }
        }
        self.default_as_value()
    }

    /// Writing the value the property already has is a no-op and does not
    /// create the attribute.
    fn set(&self, value: Value, time: Option<TimeCode>) -> Result<()> {
        if !self.base.is_valid() {
            if self.get(time.unwrap_or_default()).as_ref() == Some(&value) {
                return Ok(());
            }
            self.ensure_created()?;
        }
        self.base.set(value, time)
    }

    fn get_metadata(&self, key: &str) -> Option<String> {
        if key == UI_NAME {
            if let Some(ui_name) = &self.property.ui_name {
                return Some(ui_name.clone());
            }
        }
        if self.base.is_valid() {
            if let Some(value) = self.base.get_metadata(key) {
                return Some(value);
            }
        }
        self.property.metadata.get(key).cloned()
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_created()?;
        self.base.set_metadata(key, value)
    }

    fn has_metadata(&self, key: &str) -> bool {
        self.get_metadata(key).is_some()
    }

    fn enums(&self) -> EnumOptions {
        let mut options = if self.base.is_valid() { self.base.enums() } else { Vec::new() };
        for option in &self.property.options {
            if !options.iter().any(|(value, _)| value == &option.0) {
                options.push(option.clone());
            }
        }
        options
    }

    fn is_edit_allowed_msg(&self) -> String {
        if self.base.is_valid() {
            return self.base.is_edit_allowed_msg();
        }
        if self.base.prim().is_valid() {
            String::new()
        } else {
            "Editing is not allowed.".to_string()
        }
    }
}
