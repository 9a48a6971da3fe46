//! Absolute scene paths (`/World/Geo/mesh`).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::{Error, Result};

/// An absolute, `/`-separated path to a prim.
///
/// The pseudo-root is `/`. Element names are non-empty and contain only
/// ASCII alphanumerics and `_`, and do not start with a digit.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScenePath(String);

impl ScenePath {
    /// Parse and validate a path.
    pub fn new(text: impl AsRef<str>) -> Result<Self> {
        let text = text.as_ref();
        if text == "/" {
            return Ok(Self::root());
        }
        let Some(rest) = text.strip_prefix('/') else {
            return Err(Error::invalid_path(text));
        };
        if rest.split('/').all(is_valid_name) {
            Ok(Self(text.to_string()))
        } else {
            Err(Error::invalid_path(text))
        }
    }

    /// The pseudo-root path `/`.
    #[inline]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last element name; empty for the root.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(pos) => Some(Self(self.0[..pos].to_string())),
            None => None,
        }
    }

    /// Path of a child named `name`.
    pub fn append_child(&self, name: &str) -> Result<Self> {
        if !is_valid_name(name) {
            return Err(Error::invalid_path(format!("{}/{}", self.0, name)));
        }
        if self.is_root() {
            Ok(Self(format!("/{name}")))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Number of elements below the root.
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.matches('/').count()
        }
    }

    /// True if `prefix` is this path or one of its ancestors.
    pub fn has_prefix(&self, prefix: &ScenePath) -> bool {
        if prefix.is_root() || self.0 == prefix.0 {
            return true;
        }
        self.0.len() > prefix.0.len()
            && self.0.starts_with(&prefix.0)
            && self.0.as_bytes()[prefix.0.len()] == b'/'
    }

    /// Re-anchor this path from `old_prefix` to `new_prefix`.
    ///
    /// Returns `None` if this path is not under `old_prefix`.
    pub fn replace_prefix(&self, old_prefix: &ScenePath, new_prefix: &ScenePath) -> Option<Self> {
        if !self.has_prefix(old_prefix) {
            return None;
        }
        let suffix = if old_prefix.is_root() {
            &self.0[..]
        } else {
            &self.0[old_prefix.0.len()..]
        };
        if suffix.is_empty() || suffix == "/" {
            return Some(new_prefix.clone());
        }
        if new_prefix.is_root() {
            Some(Self(suffix.to_string()))
        } else {
            Some(Self(format!("{}{}", new_prefix.0, suffix)))
        }
    }

    /// All ancestors from the root down, excluding the pseudo-root and
    /// including this path.
    pub fn prefixes(&self) -> Vec<ScenePath> {
        let mut out = Vec::with_capacity(self.depth());
        let mut current = Some(self.clone());
        while let Some(path) = current {
            if path.is_root() {
                break;
            }
            current = path.parent();
            out.push(path);
        }
        out.reverse();
        out
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TryFrom<String> for ScenePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ScenePath> for String {
    fn from(path: ScenePath) -> Self {
        path.0
    }
}

impl fmt::Debug for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScenePath({})", self.0)
    }
}

impl fmt::Display for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert!(ScenePath::new("/").unwrap().is_root());
        assert!(ScenePath::new("/World/Geo_1").is_ok());
        assert!(ScenePath::new("World").is_err());
        assert!(ScenePath::new("/World//Geo").is_err());
        assert!(ScenePath::new("/1abc").is_err());
        assert!(ScenePath::new("/World/").is_err());
    }

    #[test]
    fn test_parent_and_name() {
        let p = ScenePath::new("/World/Geo/mesh").unwrap();
        assert_eq!(p.name(), "mesh");
        assert_eq!(p.parent().unwrap().as_str(), "/World/Geo");
        assert_eq!(ScenePath::new("/World").unwrap().parent().unwrap(), ScenePath::root());
        assert!(ScenePath::root().parent().is_none());
        assert_eq!(p.depth(), 3);
    }

    #[test]
    fn test_prefix_ops() {
        let world = ScenePath::new("/World").unwrap();
        let geo = ScenePath::new("/World/Geo").unwrap();
        let worldly = ScenePath::new("/Worldly").unwrap();
        assert!(geo.has_prefix(&world));
        assert!(!worldly.has_prefix(&world));
        assert!(geo.has_prefix(&ScenePath::root()));

        let asset = ScenePath::new("/Asset").unwrap();
        assert_eq!(geo.replace_prefix(&world, &asset).unwrap().as_str(), "/Asset/Geo");
        assert_eq!(geo.replace_prefix(&ScenePath::root(), &asset).unwrap().as_str(), "/Asset/World/Geo");
        assert_eq!(geo.replace_prefix(&world, &ScenePath::root()).unwrap().as_str(), "/Geo");
        assert!(worldly.replace_prefix(&world, &asset).is_none());
    }

    #[test]
    fn test_prefixes() {
        let p = ScenePath::new("/A/B/C").unwrap();
        let names: Vec<_> = p.prefixes().iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["/A", "/A/B", "/A/B/C"]);
    }
}
