//! Lightweight view of a composed prim.

use std::fmt;

use super::{Purpose, StageHandle};
use crate::sdf::{ScenePath, Value};
use crate::util::TimeCode;

/// A prim on a stage. Holds the stage alive.
#[derive(Clone)]
pub struct Prim {
    stage: StageHandle,
    path: ScenePath,
}

impl Prim {
    pub(crate) fn new(stage: StageHandle, path: ScenePath) -> Self {
        Self { stage, path }
    }

    #[inline]
    pub fn path(&self) -> &ScenePath {
        &self.path
    }

    #[inline]
    pub fn stage(&self) -> &StageHandle {
        &self.stage
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// False once the prim has been removed from every layer.
    pub fn is_valid(&self) -> bool {
        self.stage.has_prim(&self.path)
    }

    pub fn is_pseudo_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn type_name(&self) -> String {
        self.stage.type_name(&self.path).unwrap_or_default()
    }

    pub fn children(&self) -> Vec<Prim> {
        self.stage
            .children(&self.path)
            .into_iter()
            .map(|p| Prim::new(self.stage.clone(), p))
            .collect()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.stage.attribute_names(&self.path)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.stage.has_authored_attribute(&self.path, name)
    }

    pub fn get(&self, name: &str, time: TimeCode) -> Option<Value> {
        self.stage.attribute_value(&self.path, name, time)
    }

    pub fn purpose(&self) -> Purpose {
        self.stage.computed_purpose(&self.path)
    }
}

impl PartialEq for Prim {
    fn eq(&self, other: &Self) -> bool {
        std::sync::Arc::ptr_eq(&self.stage, &other.stage) && self.path == other.path
    }
}

impl fmt::Debug for Prim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prim({} on stage {})", self.path, self.stage.id())
    }
}
