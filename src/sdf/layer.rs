//! Layers: named or anonymous containers of authored scene edits.
//!
//! Layers are shared through [`LayerHandle`] (`Arc<Layer>`). A process-wide
//! registry maps identifiers to *weak* references, so a layer that nobody
//! holds is gone: looking it up again reopens it from disk (named layers)
//! or fails (anonymous layers). This is what makes the muted-layer
//! retention list necessary.
//!
//! Every edit notifies the layer's change sinks (stages) synchronously,
//! after the layer's own lock has been released.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use super::{ScenePath, Value, ValueType};
use crate::util::{Error, Result, TimeCode};

/// Shared handle to a layer.
pub type LayerHandle = Arc<Layer>;

/// Prefix of anonymous layer identifiers.
pub const ANONYMOUS_PREFIX: &str = "anon:";

/// How a prim spec contributes to composition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specifier {
    #[default]
    Def,
    Over,
}

/// A single time sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSample {
    pub time: TimeCode,
    pub value: Value,
}

/// Authored opinion for one attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Sorted by time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_samples: Vec<TimeSample>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl AttributeSpec {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            default: None,
            time_samples: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// True if the spec carries a default or any time sample.
    pub fn has_value(&self) -> bool {
        self.default.is_some() || !self.time_samples.is_empty()
    }

    /// Resolve the value at `time`.
    ///
    /// Samples are held: the nearest sample at or before `time` wins, and
    /// times before the first sample clamp to it. Without samples the
    /// default is used.
    pub fn value_at(&self, time: TimeCode) -> Option<&Value> {
        if self.time_samples.is_empty() {
            return self.default.as_ref();
        }
        let idx = self.time_samples.partition_point(|s| s.time <= time);
        let sample = if idx == 0 { &self.time_samples[0] } else { &self.time_samples[idx - 1] };
        Some(&sample.value)
    }

    fn set_sample(&mut self, time: TimeCode, value: Value) {
        match self.time_samples.binary_search_by(|s| s.time.cmp(&time)) {
            Ok(idx) => self.time_samples[idx].value = value,
            Err(idx) => self.time_samples.insert(idx, TimeSample { time, value }),
        }
    }
}

/// Authored opinion for one prim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimSpec {
    pub specifier: Specifier,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub type_name: String,
    /// Identifier of a layer grafted under this prim when payloads load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeSpec>,
}

/// Serializable layer contents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sublayers: Vec<String>,
    #[serde(default)]
    pub prims: BTreeMap<ScenePath, PrimSpec>,
}

/// Description of one layer edit, delivered to change sinks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerChange {
    pub layer: String,
    /// Prims whose existence, type or attribute set changed.
    pub resynced: Vec<ScenePath>,
    /// Prims whose attribute values changed.
    pub changed_info: Vec<ScenePath>,
    /// Names of the attributes whose values changed.
    pub changed_attributes: Vec<String>,
    /// The sublayer list changed.
    pub sublayers_changed: bool,
}

impl LayerChange {
    fn new(layer: &str) -> Self {
        Self { layer: layer.to_string(), ..Default::default() }
    }

    fn full_resync(layer: &str) -> Self {
        Self {
            layer: layer.to_string(),
            resynced: vec![ScenePath::root()],
            changed_info: Vec::new(),
            changed_attributes: Vec::new(),
            sublayers_changed: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resynced.is_empty() && self.changed_info.is_empty() && !self.sublayers_changed
    }
}

/// Receiver of layer edits (implemented by stages).
pub trait LayerChangeSink: Send + Sync {
    fn layer_changed(&self, change: &LayerChange);
}

/// A named or anonymous layer.
pub struct Layer {
    identifier: String,
    anonymous: bool,
    real_path: Option<PathBuf>,
    data: RwLock<LayerData>,
    dirty: AtomicBool,
    sinks: Mutex<Vec<(u64, Weak<dyn LayerChangeSink>)>>,
}

fn registry() -> &'static Mutex<HashMap<String, Weak<Layer>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Weak<Layer>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

static NEXT_ANONYMOUS: AtomicU64 = AtomicU64::new(1);

impl Layer {
    fn register(layer: Layer) -> LayerHandle {
        let handle = Arc::new(layer);
        registry().lock().insert(handle.identifier.clone(), Arc::downgrade(&handle));
        handle
    }

    /// Create a new empty anonymous layer. `tag` is kept in the identifier.
    pub fn create_anonymous(tag: &str) -> LayerHandle {
        let n = NEXT_ANONYMOUS.fetch_add(1, Ordering::Relaxed);
        let identifier = format!("{ANONYMOUS_PREFIX}{n:04}:{tag}");
        tracing::trace!(%identifier, "created anonymous layer");
        Self::register(Layer {
            identifier,
            anonymous: true,
            real_path: None,
            data: RwLock::new(LayerData::default()),
            dirty: AtomicBool::new(false),
            sinks: Mutex::new(Vec::new()),
        })
    }

    /// Create a new empty named layer backed by `path` (written on save).
    ///
    /// If a live layer already has this identifier, it is returned.
    pub fn create_new(path: impl AsRef<Path>) -> LayerHandle {
        let path = absolute(path.as_ref());
        let identifier = path.to_string_lossy().into_owned();
        let mut reg = registry().lock();
        if let Some(existing) = reg.get(&identifier).and_then(Weak::upgrade) {
            return existing;
        }
        let handle = Arc::new(Layer {
            identifier: identifier.clone(),
            anonymous: false,
            real_path: Some(path),
            data: RwLock::new(LayerData::default()),
            dirty: AtomicBool::new(true),
            sinks: Mutex::new(Vec::new()),
        });
        reg.insert(identifier, Arc::downgrade(&handle));
        handle
    }

    /// Find a live layer by identifier.
    pub fn find(identifier: &str) -> Option<LayerHandle> {
        let mut reg = registry().lock();
        match reg.get(identifier).map(Weak::upgrade) {
            Some(Some(layer)) => Some(layer),
            Some(None) => {
                reg.remove(identifier);
                None
            }
            None => None,
        }
    }

    /// Find a live layer, or open it from disk.
    ///
    /// Anonymous identifiers are never opened from disk.
    pub fn find_or_open(identifier: impl AsRef<Path>) -> Result<LayerHandle> {
        let raw = identifier.as_ref();
        let raw_str = raw.to_string_lossy();
        if raw_str.starts_with(ANONYMOUS_PREFIX) {
            return Self::find(&raw_str).ok_or_else(|| Error::LayerNotFound(raw.to_path_buf()));
        }
        let path = absolute(raw);
        let key = path.to_string_lossy().into_owned();
        if let Some(layer) = Self::find(&key) {
            return Ok(layer);
        }

        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::LayerNotFound(path.clone()),
            _ => Error::Io(e),
        })?;
        let data: LayerData = serde_json::from_str(&text)
            .map_err(|source| Error::LayerParse { identifier: key.clone(), source })?;
        tracing::debug!(identifier = %key, prims = data.prims.len(), "opened layer");

        let mut reg = registry().lock();
        // Another thread may have opened it while we were reading.
        if let Some(existing) = reg.get(&key).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        let handle = Arc::new(Layer {
            identifier: key.clone(),
            anonymous: false,
            real_path: Some(path),
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
            sinks: Mutex::new(Vec::new()),
        });
        reg.insert(key, Arc::downgrade(&handle));
        Ok(handle)
    }

    #[inline]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[inline]
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    pub fn real_path(&self) -> Option<&Path> {
        self.real_path.as_deref()
    }

    /// Tag for anonymous layers, file name otherwise.
    pub fn display_name(&self) -> &str {
        if self.anonymous {
            return self.identifier.rsplit(':').next().unwrap_or(&self.identifier);
        }
        self.real_path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .unwrap_or(&self.identifier)
    }

    /// True if edited since the last open or save.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    pub fn sublayer_paths(&self) -> Vec<String> {
        self.data.read().sublayers.clone()
    }

    pub fn prim_spec(&self, path: &ScenePath) -> Option<PrimSpec> {
        self.data.read().prims.get(path).cloned()
    }

    pub fn has_prim_spec(&self, path: &ScenePath) -> bool {
        self.data.read().prims.contains_key(path)
    }

    pub fn prim_paths(&self) -> Vec<ScenePath> {
        self.data.read().prims.keys().cloned().collect()
    }

    pub fn attribute_spec(&self, path: &ScenePath, name: &str) -> Option<AttributeSpec> {
        self.data.read().prims.get(path)?.attributes.get(name).cloned()
    }

    /// True if the layer has no prims and no sublayers.
    pub fn is_empty(&self) -> bool {
        let data = self.data.read();
        data.prims.is_empty() && data.sublayers.is_empty()
    }

    /// Run `f` against the contents under a read lock.
    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&LayerData) -> R) -> R {
        f(&self.data.read())
    }

    /// Copy of the full contents.
    pub fn snapshot(&self) -> LayerData {
        self.data.read().clone()
    }

    /// Deterministic text form of the contents.
    pub fn export_to_string(&self) -> Result<String> {
        serde_json::to_string_pretty(&*self.data.read())
            .map_err(|source| Error::LayerParse { identifier: self.identifier.clone(), source })
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Define (or re-type) a prim spec. Missing ancestors get `over` specs.
    pub fn define_prim(&self, path: &ScenePath, specifier: Specifier, type_name: &str) -> Result<()> {
        if path.is_root() {
            return Err(Error::invalid_path(path.as_str()));
        }
        let mut change = LayerChange::new(&self.identifier);
        self.edit(&mut change, |data, change| {
            for ancestor in path.prefixes() {
                if ancestor == *path {
                    break;
                }
                if !data.prims.contains_key(&ancestor) {
                    data.prims.insert(
                        ancestor.clone(),
                        PrimSpec { specifier: Specifier::Over, ..Default::default() },
                    );
                    change.resynced.push(ancestor);
                }
            }
            let existed = data.prims.contains_key(path);
            let spec = data.prims.entry(path.clone()).or_default();
            if !existed || spec.specifier != specifier || spec.type_name != type_name {
                spec.specifier = specifier;
                spec.type_name = type_name.to_string();
                change.resynced.push(path.clone());
            }
        });
        Ok(())
    }

    /// Remove a prim spec and every spec below it. Returns false if absent.
    pub fn remove_prim(&self, path: &ScenePath) -> bool {
        let mut change = LayerChange::new(&self.identifier);
        self.edit(&mut change, |data, change| {
            let doomed: Vec<ScenePath> =
                data.prims.keys().filter(|p| p.has_prefix(path)).cloned().collect();
            if doomed.is_empty() {
                return;
            }
            for p in &doomed {
                data.prims.remove(p);
            }
            change.resynced.push(path.clone());
        });
        !change.is_empty()
    }

    /// Create an attribute spec without a value. Creates an `over` prim
    /// spec if needed.
    pub fn create_attribute(&self, path: &ScenePath, name: &str, value_type: ValueType) -> Result<()> {
        if path.is_root() {
            return Err(Error::invalid_path(path.as_str()));
        }
        let mut change = LayerChange::new(&self.identifier);
        self.edit(&mut change, |data, change| {
            let prim = ensure_prim(data, path, change);
            if !prim.attributes.contains_key(name) {
                prim.attributes.insert(name.to_string(), AttributeSpec::new(value_type));
                change.resynced.push(path.clone());
            }
        });
        Ok(())
    }

    /// Author a value: the default when `time` is `None`, a time sample
    /// otherwise.
    pub fn set_attribute(
        &self,
        path: &ScenePath,
        name: &str,
        value: Value,
        time: Option<TimeCode>,
    ) -> Result<()> {
        if path.is_root() {
            return Err(Error::invalid_path(path.as_str()));
        }
        let mut change = LayerChange::new(&self.identifier);
        self.edit(&mut change, |data, change| {
            let prim = ensure_prim(data, path, change);
            let attr = match prim.attributes.get_mut(name) {
                Some(attr) => {
                    change.changed_info.push(path.clone());
                    change.changed_attributes.push(name.to_string());
                    attr
                }
                None => {
                    change.resynced.push(path.clone());
                    prim.attributes
                        .entry(name.to_string())
                        .or_insert_with(|| AttributeSpec::new(value.value_type()))
                }
            };
            match time {
                Some(t) => attr.set_sample(t, value),
                None => attr.default = Some(value),
            }
        });
        Ok(())
    }

    /// Set one metadata entry on an existing attribute spec.
    pub fn set_attribute_metadata(&self, path: &ScenePath, name: &str, key: &str, value: &str) -> bool {
        let mut change = LayerChange::new(&self.identifier);
        self.edit(&mut change, |data, change| {
            if let Some(attr) = data.prims.get_mut(path).and_then(|p| p.attributes.get_mut(name)) {
                attr.metadata.insert(key.to_string(), value.to_string());
                change.changed_info.push(path.clone());
            }
        });
        !change.is_empty()
    }

    /// Set or clear the payload asset of a prim.
    pub fn set_payload(&self, path: &ScenePath, payload: Option<String>) -> Result<()> {
        if path.is_root() {
            return Err(Error::invalid_path(path.as_str()));
        }
        let mut change = LayerChange::new(&self.identifier);
        self.edit(&mut change, |data, change| {
            let prim = ensure_prim(data, path, change);
            if prim.payload != payload {
                prim.payload = payload;
                change.resynced.push(path.clone());
            }
        });
        Ok(())
    }

    /// Replace the sublayer list.
    pub fn set_sublayer_paths(&self, sublayers: Vec<String>) {
        let mut change = LayerChange::new(&self.identifier);
        self.edit(&mut change, |data, change| {
            if data.sublayers != sublayers {
                data.sublayers = sublayers;
                change.sublayers_changed = true;
                change.resynced.push(ScenePath::root());
            }
        });
    }

    /// Insert a sublayer at `index` (clamped). Duplicates are ignored.
    pub fn insert_sublayer_path(&self, index: usize, identifier: &str) {
        let mut sublayers = self.sublayer_paths();
        if sublayers.iter().any(|s| s == identifier) {
            return;
        }
        sublayers.insert(index.min(sublayers.len()), identifier.to_string());
        self.set_sublayer_paths(sublayers);
    }

    /// Replace this layer's contents with a copy of `other`'s.
    pub fn transfer_content(&self, other: &Layer) {
        if std::ptr::eq(self, other) {
            return;
        }
        let data = other.snapshot();
        self.replace_data(data);
    }

    /// Overlay `other`'s prim specs onto this layer. Attribute opinions in
    /// `other` win; the sublayer list is left alone.
    pub fn merge_from(&self, other: &Layer) {
        if std::ptr::eq(self, other) {
            return;
        }
        let incoming = other.snapshot();
        let mut change = LayerChange::new(&self.identifier);
        self.edit(&mut change, |data, change| {
            for (path, spec) in incoming.prims {
                let target = data.prims.entry(path.clone()).or_default();
                if spec.specifier == Specifier::Def || target.type_name.is_empty() {
                    target.specifier = spec.specifier;
                }
                if !spec.type_name.is_empty() {
                    target.type_name = spec.type_name;
                }
                if spec.payload.is_some() {
                    target.payload = spec.payload;
                }
                target.attributes.extend(spec.attributes);
                change.resynced.push(path);
            }
        });
    }

    /// Remove all contents.
    pub fn clear(&self) {
        self.replace_data(LayerData::default());
    }

    /// Replace the contents wholesale (undo/redo, transfers).
    pub fn replace_data(&self, data: LayerData) {
        let mut change = LayerChange::full_resync(&self.identifier);
        self.edit(&mut change, |current, _| *current = data);
    }

    /// Write a named layer back to its file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.real_path else {
            return Err(Error::AnonymousLayerSave(self.identifier.clone()));
        };
        let text = self.export_to_string()?;
        std::fs::write(path, text)?;
        self.dirty.store(false, Ordering::Relaxed);
        tracing::debug!(identifier = %self.identifier, "saved layer");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Change sinks
    // ------------------------------------------------------------------

    /// Subscribe `sink` under `key`, replacing any previous sink with that key.
    pub fn add_sink(&self, key: u64, sink: Weak<dyn LayerChangeSink>) {
        let mut sinks = self.sinks.lock();
        sinks.retain(|(k, s)| *k != key && s.strong_count() > 0);
        sinks.push((key, sink));
    }

    pub fn remove_sink(&self, key: u64) {
        self.sinks.lock().retain(|(k, s)| *k != key && s.strong_count() > 0);
    }

    fn edit(&self, change: &mut LayerChange, f: impl FnOnce(&mut LayerData, &mut LayerChange)) {
        {
            let mut data = self.data.write();
            f(&mut data, change);
        }
        if change.is_empty() {
            return;
        }
        self.dirty.store(true, Ordering::Relaxed);
        let sinks: Vec<Arc<dyn LayerChangeSink>> =
            self.sinks.lock().iter().filter_map(|(_, s)| s.upgrade()).collect();
        for sink in sinks {
            sink.layer_changed(change);
        }
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("identifier", &self.identifier)
            .field("anonymous", &self.anonymous)
            .finish()
    }
}

impl Drop for Layer {
    fn drop(&mut self) {
        let mut reg = registry().lock();
        if reg.get(&self.identifier).is_some_and(|w| w.strong_count() == 0) {
            reg.remove(&self.identifier);
        }
    }
}

fn ensure_prim<'a>(data: &'a mut LayerData, path: &ScenePath, change: &mut LayerChange) -> &'a mut PrimSpec {
    if !data.prims.contains_key(path) {
        change.resynced.push(path.clone());
    }
    data.prims
        .entry(path.clone())
        .or_insert_with(|| PrimSpec { specifier: Specifier::Over, ..Default::default() })
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map(|d| d.join(path)).unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ScenePath {
        ScenePath::new(s).unwrap()
    }

    #[test]
    fn test_anonymous_layer_dies_with_last_handle() {
        let layer = Layer::create_anonymous("scratch");
        let id = layer.identifier().to_string();
        assert!(id.starts_with(ANONYMOUS_PREFIX));
        assert_eq!(layer.display_name(), "scratch");
        assert!(Layer::find(&id).is_some());
        drop(layer);
        assert!(Layer::find(&id).is_none());
        assert!(Layer::find_or_open(&id).is_err());
    }

    #[test]
    fn test_define_creates_over_ancestors() {
        let layer = Layer::create_anonymous("t");
        layer.define_prim(&path("/World/Geo"), Specifier::Def, "Xform").unwrap();
        assert_eq!(layer.prim_spec(&path("/World")).unwrap().specifier, Specifier::Over);
        assert_eq!(layer.prim_spec(&path("/World/Geo")).unwrap().type_name, "Xform");
        assert!(layer.define_prim(&ScenePath::root(), Specifier::Def, "").is_err());
    }

    #[test]
    fn test_time_samples_are_held() {
        let layer = Layer::create_anonymous("t");
        let p = path("/A");
        layer.set_attribute(&p, "size", Value::Double(1.0), Some(TimeCode(1.0))).unwrap();
        layer.set_attribute(&p, "size", Value::Double(5.0), Some(TimeCode(5.0))).unwrap();
        let attr = layer.attribute_spec(&p, "size").unwrap();
        assert_eq!(attr.value_at(TimeCode(0.0)), Some(&Value::Double(1.0)));
        assert_eq!(attr.value_at(TimeCode(3.0)), Some(&Value::Double(1.0)));
        assert_eq!(attr.value_at(TimeCode(5.0)), Some(&Value::Double(5.0)));
        assert_eq!(attr.value_at(TimeCode(9.0)), Some(&Value::Double(5.0)));
    }

    #[test]
    fn test_remove_prim_removes_subtree() {
        let layer = Layer::create_anonymous("t");
        layer.define_prim(&path("/A/B/C"), Specifier::Def, "Mesh").unwrap();
        layer.define_prim(&path("/AB"), Specifier::Def, "Mesh").unwrap();
        assert!(layer.remove_prim(&path("/A")));
        assert_eq!(layer.prim_paths(), vec![path("/AB")]);
        assert!(!layer.remove_prim(&path("/A")));
    }

    #[test]
    fn test_transfer_content_is_exact_copy() {
        let src = Layer::create_anonymous("src");
        src.define_prim(&path("/A"), Specifier::Def, "Cube").unwrap();
        src.set_attribute(&path("/A"), "size", Value::Double(2.0), None).unwrap();
        src.set_sublayer_paths(vec!["other.json".into()]);

        let dst = Layer::create_anonymous("dst");
        dst.define_prim(&path("/Junk"), Specifier::Def, "").unwrap();
        dst.transfer_content(&src);
        assert_eq!(dst.export_to_string().unwrap(), src.export_to_string().unwrap());
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("shot.json");
        {
            let layer = Layer::create_new(&file);
            layer.define_prim(&path("/Shot"), Specifier::Def, "Xform").unwrap();
            assert!(layer.is_dirty());
            layer.save().unwrap();
            assert!(!layer.is_dirty());
        }
        let reopened = Layer::find_or_open(&file).unwrap();
        assert!(reopened.has_prim_spec(&path("/Shot")));
        assert_eq!(reopened.display_name(), "shot.json");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Layer::find_or_open(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::LayerNotFound(_)));
    }

    #[test]
    fn test_anonymous_save_fails() {
        let layer = Layer::create_anonymous("t");
        assert!(matches!(layer.save(), Err(Error::AnonymousLayerSave(_))));
    }

    struct Recorder(Mutex<Vec<LayerChange>>);

    impl LayerChangeSink for Recorder {
        fn layer_changed(&self, change: &LayerChange) {
            self.0.lock().push(change.clone());
        }
    }

    #[test]
    fn test_changes_classified() {
        let layer = Layer::create_anonymous("t");
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let weak: Weak<dyn LayerChangeSink> = Arc::downgrade(&recorder) as Weak<dyn LayerChangeSink>;
        layer.add_sink(7, weak);

        let p = path("/A");
        layer.define_prim(&p, Specifier::Def, "Cube").unwrap();
        layer.set_attribute(&p, "size", Value::Double(1.0), None).unwrap();
        layer.set_attribute(&p, "size", Value::Double(2.0), None).unwrap();

        let changes = recorder.0.lock().clone();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].resynced, vec![p.clone()]);
        assert_eq!(changes[1].resynced, vec![p.clone()]);
        assert!(changes[2].resynced.is_empty());
        assert_eq!(changes[2].changed_info, vec![p]);
        assert_eq!(changes[2].changed_attributes, vec!["size".to_string()]);

        layer.remove_sink(7);
        layer.clear();
        assert_eq!(recorder.0.lock().len(), 3);
    }
}
