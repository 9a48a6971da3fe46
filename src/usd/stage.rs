//! Composed stages.
//!
//! A stage composes a session layer and a root layer (each with its
//! sublayers, depth first, strongest first) plus payload layers grafted
//! under the prims that reference them. Muted layers and their sublayers
//! are skipped and **not held**: once muted, a layer only survives if
//! someone else keeps a handle to it.

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::notice::{ListenerList, Notice, NoticeKey, ObjectsChanged};
use super::{Prim, Purpose, PurposeFilter};
use crate::sdf::{Layer, LayerChange, LayerChangeSink, LayerHandle, ScenePath, Specifier, Value, ValueType};
use crate::util::{BBox3d, DVec3, Error, Result, TimeCode};

/// Shared handle to a stage.
pub type StageHandle = Arc<Stage>;

/// Which payloads are loaded when the stage opens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InitialLoadSet {
    #[default]
    LoadAll,
    LoadNone,
}

impl InitialLoadSet {
    /// Map the node's load-payloads flag.
    pub fn from_load_payloads(load: bool) -> Self {
        if load {
            Self::LoadAll
        } else {
            Self::LoadNone
        }
    }
}

#[derive(Clone)]
struct StackEntry {
    layer: LayerHandle,
    /// Host prim for payload layers; layer `/` maps onto it.
    graft: Option<ScenePath>,
}

impl StackEntry {
    /// Stage path -> layer path.
    fn to_layer(&self, path: &ScenePath) -> Option<ScenePath> {
        match &self.graft {
            None => Some(path.clone()),
            Some(host) if path != host => path.replace_prefix(host, &ScenePath::root()),
            Some(_) => None,
        }
    }

    /// Layer path -> stage path.
    fn to_stage(&self, path: &ScenePath) -> Option<ScenePath> {
        match &self.graft {
            None => Some(path.clone()),
            Some(host) => path.replace_prefix(&ScenePath::root(), host),
        }
    }
}

struct StageState {
    muted: BTreeSet<String>,
    edit_target: LayerHandle,
    stack: Vec<StackEntry>,
}

/// A composed stage.
pub struct Stage {
    id: u64,
    root_layer: LayerHandle,
    session_layer: LayerHandle,
    load_set: InitialLoadSet,
    state: RwLock<StageState>,
    listeners: Mutex<ListenerList>,
    weak_self: Weak<Stage>,
}

static NEXT_STAGE_ID: AtomicU64 = AtomicU64::new(1);

impl Stage {
    /// Open a stage on `root_layer`. A fresh anonymous session layer is
    /// created when `session_layer` is `None`.
    pub fn open(
        root_layer: LayerHandle,
        session_layer: Option<LayerHandle>,
        load_set: InitialLoadSet,
    ) -> StageHandle {
        let session_layer = session_layer.unwrap_or_else(|| Layer::create_anonymous("session"));
        let id = NEXT_STAGE_ID.fetch_add(1, Ordering::Relaxed);
        let stack = build_stack(&session_layer, &root_layer, &BTreeSet::new(), load_set);
        tracing::debug!(
            stage = id,
            root = root_layer.identifier(),
            layers = stack.len(),
            "opened stage"
        );

        Arc::new_cyclic(|weak: &Weak<Stage>| {
            let sink: Weak<dyn LayerChangeSink> = weak.clone();
            for entry in &stack {
                entry.layer.add_sink(id, sink.clone());
            }
            Stage {
                id,
                root_layer: root_layer.clone(),
                session_layer,
                load_set,
                state: RwLock::new(StageState {
                    muted: BTreeSet::new(),
                    edit_target: root_layer,
                    stack,
                }),
                listeners: Mutex::new(Vec::new()),
                weak_self: weak.clone(),
            }
        })
    }

    /// Open the layer file at `path` as the root layer.
    pub fn open_file(path: impl AsRef<Path>, load_set: InitialLoadSet) -> Result<StageHandle> {
        let root = Layer::find_or_open(path)?;
        Ok(Self::open(root, None, load_set))
    }

    /// Process-unique stage id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn root_layer(&self) -> &LayerHandle {
        &self.root_layer
    }

    #[inline]
    pub fn session_layer(&self) -> &LayerHandle {
        &self.session_layer
    }

    #[inline]
    pub fn load_set(&self) -> InitialLoadSet {
        self.load_set
    }

    /// Strong handle to this stage.
    pub fn handle(&self) -> Option<StageHandle> {
        self.weak_self.upgrade()
    }

    // ------------------------------------------------------------------
    // Layer stack
    // ------------------------------------------------------------------

    /// Resolved layers, strongest first. Muted layers are absent.
    pub fn layer_stack(&self) -> Vec<LayerHandle> {
        self.state.read().stack.iter().map(|e| e.layer.clone()).collect()
    }

    /// Identifiers of the resolved layers, strongest first.
    pub fn layer_identifiers(&self) -> Vec<String> {
        self.state.read().stack.iter().map(|e| e.layer.identifier().to_string()).collect()
    }

    /// True if `layer` is in the resolved stack.
    pub fn has_local_layer(&self, layer: &Layer) -> bool {
        self.state.read().stack.iter().any(|e| std::ptr::eq(&*e.layer, layer))
    }

    /// Find a layer of the resolved stack by identifier.
    pub fn find_layer(&self, identifier: &str) -> Option<LayerHandle> {
        self.state
            .read()
            .stack
            .iter()
            .find(|e| e.layer.identifier() == identifier)
            .map(|e| e.layer.clone())
    }

    /// True if `layer` is the session layer or one of its sublayers.
    pub fn is_in_session_stack(&self, layer: &Layer) -> bool {
        let mut seen = HashSet::new();
        layer_tree_contains(&self.session_layer, layer, &mut seen)
    }

    // ------------------------------------------------------------------
    // Edit target
    // ------------------------------------------------------------------

    pub fn edit_target(&self) -> LayerHandle {
        self.state.read().edit_target.clone()
    }

    /// Direct new edits at `layer`, which must be in the resolved stack.
    pub fn set_edit_target(&self, layer: &LayerHandle) -> Result<()> {
        {
            let mut state = self.state.write();
            if !state.stack.iter().any(|e| Arc::ptr_eq(&e.layer, layer) && e.graft.is_none()) {
                return Err(Error::LayerNotInStack(layer.identifier().to_string()));
            }
            if Arc::ptr_eq(&state.edit_target, layer) {
                return Ok(());
            }
            state.edit_target = layer.clone();
        }
        tracing::debug!(stage = self.id, target = layer.identifier(), "edit target changed");
        self.send(&Notice::StageEditTargetChanged);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Muting
    // ------------------------------------------------------------------

    /// Sorted identifiers of muted layers.
    pub fn muted_layers(&self) -> Vec<String> {
        self.state.read().muted.iter().cloned().collect()
    }

    pub fn is_layer_muted(&self, identifier: &str) -> bool {
        self.state.read().muted.contains(identifier)
    }

    pub fn mute_layer(&self, identifier: &str) {
        self.mute_and_unmute_layers(&[identifier.to_string()], &[]);
    }

    pub fn unmute_layer(&self, identifier: &str) {
        self.mute_and_unmute_layers(&[], &[identifier.to_string()]);
    }

    /// Mute and unmute in one step. The root and session layers cannot be
    /// muted. The stage stops holding newly muted layers.
    pub fn mute_and_unmute_layers(&self, mute: &[String], unmute: &[String]) {
        let (muted_handles, unmuted_ids, target_moved) = {
            let mut state = self.state.write();
            let mut newly_muted = Vec::new();
            for id in mute {
                if id == self.root_layer.identifier() || id == self.session_layer.identifier() {
                    tracing::warn!(stage = self.id, layer = %id, "cannot mute root or session layer");
                    continue;
                }
                if state.muted.insert(id.clone()) {
                    newly_muted.push(id.clone());
                }
            }
            let mut unmuted_ids = Vec::new();
            for id in unmute {
                if state.muted.remove(id) {
                    unmuted_ids.push(id.clone());
                }
            }
            if newly_muted.is_empty() && unmuted_ids.is_empty() {
                return;
            }

            // Grab handles before the rebuild releases them.
            let mut muted_handles: Vec<LayerHandle> = Vec::new();
            for id in &newly_muted {
                let handle = state
                    .stack
                    .iter()
                    .find(|e| e.layer.identifier() == id)
                    .map(|e| e.layer.clone())
                    .or_else(|| Layer::find(id));
                if let Some(handle) = handle {
                    muted_handles.push(handle);
                }
            }

            let stack = build_stack(&self.session_layer, &self.root_layer, &state.muted, self.load_set);
            self.swap_stack(&mut state, stack);

            let target_alive = state.stack.iter().any(|e| Arc::ptr_eq(&e.layer, &state.edit_target));
            if !target_alive {
                state.edit_target = self.root_layer.clone();
            }
            (muted_handles, unmuted_ids, !target_alive)
        };

        tracing::debug!(
            stage = self.id,
            muted = muted_handles.len(),
            unmuted = unmuted_ids.len(),
            "layer muting changed"
        );
        self.send(&Notice::LayerMutingChanged { muted: muted_handles, unmuted: unmuted_ids });
        if target_moved {
            self.send(&Notice::StageEditTargetChanged);
        }
        self.send(&Notice::ObjectsChanged(ObjectsChanged {
            resynced: vec![ScenePath::root()],
            changed_info_only: Vec::new(),
            changed_attributes: Vec::new(),
        }));
        self.send(&Notice::StageContentsChanged);
    }

    fn swap_stack(&self, state: &mut StageState, stack: Vec<StackEntry>) {
        let sink: Weak<dyn LayerChangeSink> = self.weak_self.clone();
        for old in &state.stack {
            if !stack.iter().any(|e| Arc::ptr_eq(&e.layer, &old.layer)) {
                old.layer.remove_sink(self.id);
            }
        }
        for new in &stack {
            if !state.stack.iter().any(|e| Arc::ptr_eq(&e.layer, &new.layer)) {
                new.layer.add_sink(self.id, sink.clone());
            }
        }
        state.stack = stack;
    }

    // ------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------

    fn entries(&self) -> Vec<StackEntry> {
        self.state.read().stack.clone()
    }

    /// True if any unmuted layer has an opinion about `path`.
    pub fn has_prim(&self, path: &ScenePath) -> bool {
        if path.is_root() {
            return true;
        }
        self.entries().iter().any(|e| {
            e.to_layer(path).is_some_and(|lp| e.layer.has_prim_spec(&lp))
        })
    }

    /// All composed prim paths, sorted.
    pub fn prim_paths(&self) -> Vec<ScenePath> {
        let mut out = BTreeSet::new();
        for entry in self.entries() {
            entry.layer.with_data(|data| {
                for path in data.prims.keys() {
                    if let Some(sp) = entry.to_stage(path) {
                        out.insert(sp);
                    }
                }
            });
        }
        out.into_iter().collect()
    }

    /// Direct children of `path`, sorted.
    pub fn children(&self, path: &ScenePath) -> Vec<ScenePath> {
        self.prim_paths()
            .into_iter()
            .filter(|p| p.parent().as_ref() == Some(path))
            .collect()
    }

    /// Strongest authored type name.
    pub fn type_name(&self, path: &ScenePath) -> Option<String> {
        self.entries().iter().find_map(|e| {
            let lp = e.to_layer(path)?;
            e.layer.with_data(|d| {
                d.prims.get(&lp).map(|s| s.type_name.clone()).filter(|t| !t.is_empty())
            })
        })
    }

    /// True if some layer defines (not just overrides) the prim.
    pub fn is_defined(&self, path: &ScenePath) -> bool {
        self.entries().iter().any(|e| {
            e.to_layer(path).is_some_and(|lp| {
                e.layer.with_data(|d| d.prims.get(&lp).is_some_and(|s| s.specifier == Specifier::Def))
            })
        })
    }

    /// Names of attributes authored in any layer, sorted.
    pub fn attribute_names(&self, path: &ScenePath) -> Vec<String> {
        let mut names = BTreeSet::new();
        for e in self.entries() {
            if let Some(lp) = e.to_layer(path) {
                e.layer.with_data(|d| {
                    if let Some(spec) = d.prims.get(&lp) {
                        names.extend(spec.attributes.keys().cloned());
                    }
                });
            }
        }
        names.into_iter().collect()
    }

    /// True if any layer has a spec for the attribute.
    pub fn has_authored_attribute(&self, path: &ScenePath, name: &str) -> bool {
        self.entries().iter().any(|e| {
            e.to_layer(path).is_some_and(|lp| {
                e.layer.with_data(|d| d.prims.get(&lp).is_some_and(|s| s.attributes.contains_key(name)))
            })
        })
    }

    /// Type of the strongest attribute spec.
    pub fn attribute_type(&self, path: &ScenePath, name: &str) -> Option<ValueType> {
        self.entries().iter().find_map(|e| {
            let lp = e.to_layer(path)?;
            e.layer.with_data(|d| d.prims.get(&lp)?.attributes.get(name).map(|a| a.value_type))
        })
    }

    /// Strongest value opinion at `time`.
    pub fn attribute_value(&self, path: &ScenePath, name: &str, time: TimeCode) -> Option<Value> {
        self.entries().iter().find_map(|e| {
            let lp = e.to_layer(path)?;
            e.layer.with_data(|d| {
                let attr = d.prims.get(&lp)?.attributes.get(name)?;
                attr.value_at(time).cloned()
            })
        })
    }

    /// Strongest metadata opinion on an attribute.
    pub fn attribute_metadata(&self, path: &ScenePath, name: &str, key: &str) -> Option<String> {
        self.entries().iter().find_map(|e| {
            let lp = e.to_layer(path)?;
            e.layer.with_data(|d| d.prims.get(&lp)?.attributes.get(name)?.metadata.get(key).cloned())
        })
    }

    /// Composed prim at `path`.
    pub fn prim_at_path(&self, path: &ScenePath) -> Option<Prim> {
        if !self.has_prim(path) {
            return None;
        }
        Some(Prim::new(self.handle()?, path.clone()))
    }

    /// Purpose of `path`, inherited from the nearest ancestor that authors one.
    pub fn computed_purpose(&self, path: &ScenePath) -> Purpose {
        let mut current = Some(path.clone());
        while let Some(p) = current {
            if p.is_root() {
                break;
            }
            if let Some(purpose) = self
                .attribute_value(&p, "purpose", TimeCode::default())
                .and_then(|v| v.as_str().and_then(Purpose::from_token))
            {
                return purpose;
            }
            current = p.parent();
        }
        Purpose::Default
    }

    fn is_invisible(&self, path: &ScenePath, time: TimeCode) -> bool {
        path.prefixes().iter().any(|p| {
            self.attribute_value(p, "visibility", time)
                .is_some_and(|v| v.as_str() == Some("invisible"))
        })
    }

    /// Accumulated `xformOp:translate` of `path` and its ancestors.
    pub fn world_offset(&self, path: &ScenePath, time: TimeCode) -> DVec3 {
        path.prefixes()
            .iter()
            .filter_map(|p| self.attribute_value(p, "xformOp:translate", time)?.as_double3())
            .fold(DVec3::ZERO, |acc, t| acc + DVec3::from_array(t))
    }

    /// Union of authored `extent`s under `root`, placed by inherited
    /// translations. Excluded subtrees, invisible prims and prims whose
    /// purpose is filtered out do not contribute.
    pub fn compute_bounds(
        &self,
        root: &ScenePath,
        time: TimeCode,
        purposes: PurposeFilter,
        excluded: &[ScenePath],
    ) -> BBox3d {
        let paths: Vec<ScenePath> = self
            .prim_paths()
            .into_iter()
            .filter(|p| p.has_prefix(root) && !excluded.iter().any(|x| p.has_prefix(x)))
            .collect();

        paths
            .par_iter()
            .filter(|p| purposes.includes(self.computed_purpose(p)) && !self.is_invisible(p, time))
            .filter_map(|p| {
                let extent = self.attribute_value(p, "extent", time)?.as_extent()?;
                Some(extent.translated(self.world_offset(p, time)))
            })
            .reduce(
                || BBox3d::EMPTY,
                |mut acc, b| {
                    acc.expand_by_box(&b);
                    acc
                },
            )
    }

    // ------------------------------------------------------------------
    // Editing (authors to the edit target)
    // ------------------------------------------------------------------

    pub fn define_prim(&self, path: &ScenePath, type_name: &str) -> Result<()> {
        self.edit_target().define_prim(path, Specifier::Def, type_name)
    }

    pub fn override_prim(&self, path: &ScenePath) -> Result<()> {
        let target = self.edit_target();
        if target.has_prim_spec(path) {
            return Ok(());
        }
        target.define_prim(path, Specifier::Over, "")
    }

    /// Remove the edit target's opinions for the prim subtree.
    pub fn remove_prim(&self, path: &ScenePath) -> bool {
        self.edit_target().remove_prim(path)
    }

    pub fn set_attribute(&self, path: &ScenePath, name: &str, value: Value, time: Option<TimeCode>) -> Result<()> {
        if !self.has_prim(path) {
            return Err(Error::PrimNotFound(path.to_string()));
        }
        self.edit_target().set_attribute(path, name, value, time)
    }

    pub fn create_attribute(&self, path: &ScenePath, name: &str, value_type: ValueType) -> Result<()> {
        if !self.has_prim(path) {
            return Err(Error::PrimNotFound(path.to_string()));
        }
        self.edit_target().create_attribute(path, name, value_type)
    }

    // ------------------------------------------------------------------
    // Notices
    // ------------------------------------------------------------------

    /// Subscribe to this stage's notices.
    pub fn register_listener<F>(&self, callback: F) -> NoticeKey
    where
        F: Fn(&Stage, &Notice) + Send + Sync + 'static,
    {
        let key = NoticeKey::next();
        self.listeners.lock().push((key, Arc::new(callback)));
        key
    }

    /// Unsubscribe. Returns false if the key was not registered here.
    pub fn revoke_listener(&self, key: NoticeKey) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(k, _)| *k != key);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn send(&self, notice: &Notice) {
        let listeners: Vec<_> = self.listeners.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for cb in listeners {
            cb(self, notice);
        }
    }
}

impl LayerChangeSink for Stage {
    fn layer_changed(&self, change: &LayerChange) {
        let mapped = {
            let mut state = self.state.write();
            let entries: Vec<StackEntry> = state
                .stack
                .iter()
                .filter(|e| e.layer.identifier() == change.layer)
                .cloned()
                .collect();
            if entries.is_empty() {
                return;
            }

            if change.sublayers_changed || (!change.resynced.is_empty() && self.load_set == InitialLoadSet::LoadAll) {
                let stack = build_stack(&self.session_layer, &self.root_layer, &state.muted, self.load_set);
                let same = stack.len() == state.stack.len()
                    && stack.iter().zip(&state.stack).all(|(a, b)| Arc::ptr_eq(&a.layer, &b.layer));
                if !same {
                    self.swap_stack(&mut state, stack);
                }
            }

            let mut notice = ObjectsChanged {
                changed_attributes: change.changed_attributes.clone(),
                ..Default::default()
            };
            for entry in &entries {
                notice.resynced.extend(change.resynced.iter().filter_map(|p| entry.to_stage(p)));
                notice.changed_info_only.extend(change.changed_info.iter().filter_map(|p| entry.to_stage(p)));
            }
            notice
        };

        self.send(&Notice::ObjectsChanged(mapped));
        self.send(&Notice::StageContentsChanged);
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        for entry in &self.state.get_mut().stack {
            entry.layer.remove_sink(self.id);
        }
        tracing::trace!(stage = self.id, "stage released");
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("root", &self.root_layer.identifier())
            .field("load_set", &self.load_set)
            .finish()
    }
}

fn build_stack(
    session: &LayerHandle,
    root: &LayerHandle,
    muted: &BTreeSet<String>,
    load_set: InitialLoadSet,
) -> Vec<StackEntry> {
    let mut layers = Vec::new();
    let mut visited = HashSet::new();
    collect_layers(session, muted, &mut visited, &mut layers);
    collect_layers(root, muted, &mut visited, &mut layers);

    let mut stack: Vec<StackEntry> = layers.into_iter().map(|layer| StackEntry { layer, graft: None }).collect();
    if load_set == InitialLoadSet::LoadAll {
        let mut payloads = Vec::new();
        for entry in &stack {
            entry.layer.with_data(|d| {
                for (path, spec) in &d.prims {
                    if let Some(asset) = &spec.payload {
                        payloads.push((path.clone(), asset.clone(), entry.layer.real_path().map(Path::to_path_buf)));
                    }
                }
            });
        }
        for (host, asset, anchor) in payloads {
            if muted.contains(&asset) {
                continue;
            }
            match resolve_layer(&asset, anchor.as_deref()) {
                Ok(layer) => stack.push(StackEntry { layer, graft: Some(host) }),
                Err(err) => tracing::warn!(%asset, %host, error = %err, "payload could not be loaded"),
            }
        }
    }
    stack
}

fn collect_layers(
    layer: &LayerHandle,
    muted: &BTreeSet<String>,
    visited: &mut HashSet<String>,
    out: &mut Vec<LayerHandle>,
) {
    if muted.contains(layer.identifier()) || !visited.insert(layer.identifier().to_string()) {
        return;
    }
    out.push(layer.clone());
    for sub in layer.sublayer_paths() {
        match resolve_layer(&sub, layer.real_path()) {
            Ok(sublayer) => collect_layers(&sublayer, muted, visited, out),
            Err(err) => tracing::warn!(layer = layer.identifier(), sublayer = %sub, error = %err, "sublayer could not be resolved"),
        }
    }
}

/// Resolve a sublayer or payload asset path relative to the referencing
/// layer's file.
pub(crate) fn resolve_layer(asset: &str, anchor: Option<&Path>) -> Result<LayerHandle> {
    if let Some(layer) = Layer::find(asset) {
        return Ok(layer);
    }
    let path = Path::new(asset);
    if path.is_relative() {
        if let Some(dir) = anchor.and_then(Path::parent) {
            return Layer::find_or_open(dir.join(path));
        }
    }
    Layer::find_or_open(path)
}

fn layer_tree_contains(root: &LayerHandle, needle: &Layer, seen: &mut HashSet<String>) -> bool {
    if std::ptr::eq(&**root, needle) {
        return true;
    }
    if !seen.insert(root.identifier().to_string()) {
        return false;
    }
    root.sublayer_paths().iter().any(|sub| {
        resolve_layer(sub, root.real_path()).is_ok_and(|l| layer_tree_contains(&l, needle, seen))
    })
}
