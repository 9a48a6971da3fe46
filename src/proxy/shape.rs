//! The proxy shape node.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use super::ancestors::AncestorCallbacks;
use super::bbox_cache::BoundingBoxCache;
use super::closest_point;
use super::lifecycle::Lifecycle;
use super::reentrancy::FlagGuard;
use super::{Attr, DefaultHooks, ProxyInputs, ProxyShapeHooks, ShareMode, StageData};
use crate::config::ProxyConfig;
use crate::host::{CallbackId, DirtyCallback, HostGraph, MovedCallback, NodeId};
use crate::sdf::{LayerHandle, ScenePath};
use crate::usd::{Prim, PurposeFilter, StageCacheId, StageHandle};
use crate::util::{BBox3d, Error, Ray, RayHit, Result, TimeCode};

static INSTANCES: AtomicUsize = AtomicUsize::new(0);

/// Published results of the last compute of each output.
pub(crate) struct Outputs {
    pub(crate) out_time: TimeCode,
    pub(crate) in_stage_data_cached: Option<StageHandle>,
    pub(crate) out_stage_data: Arc<StageData>,
    pub(crate) out_stage_cache_id: StageCacheId,
    pub(crate) share_mode: ShareMode,
    pub(crate) incoming: bool,
    pub(crate) incoming_layers: BTreeSet<String>,
}

impl Default for Outputs {
    fn default() -> Self {
        Self {
            out_time: TimeCode::default(),
            in_stage_data_cached: None,
            out_stage_data: Arc::new(StageData::empty()),
            out_stage_cache_id: StageCacheId::INVALID,
            share_mode: ShareMode::Unknown,
            incoming: false,
            incoming_layers: BTreeSet::new(),
        }
    }
}

/// Host node embedding a composed stage.
///
/// Inputs are set through the typed setters; outputs are pulled through
/// [`ProxyShape::compute`] or the `out_*` accessors, which compute on
/// demand. Stage notices and host dirty callbacks only touch counters,
/// caches and dirty flags, never the compute state.
pub struct ProxyShape {
    pub(crate) node: NodeId,
    pub(crate) graph: Arc<dyn HostGraph>,
    pub(crate) hooks: Arc<dyn ProxyShapeHooks>,
    pub(crate) config: ProxyConfig,
    pub(crate) inputs: RwLock<ProxyInputs>,
    locked: Mutex<HashSet<Attr>>,
    pub(crate) dirty: Mutex<BTreeSet<Attr>>,
    pub(crate) lifecycle: Mutex<Lifecycle>,
    pub(crate) outputs: RwLock<Outputs>,
    pub(crate) bbox_cache: BoundingBoxCache,
    pub(crate) target_layer: Mutex<Option<LayerHandle>>,
    pub(crate) exclude_prim_paths_version: AtomicU64,
    pub(crate) stage_version: AtomicU64,
    pub(crate) update_counter: AtomicI64,
    pub(crate) resync_counter: AtomicI64,
    pub(crate) computing: AtomicBool,
    in_ancestor_callback: AtomicBool,
    ancestors: Mutex<AncestorCallbacks>,
    moved_callback: Mutex<Option<CallbackId>>,
    pub(crate) weak_self: Weak<ProxyShape>,
}

impl ProxyShape {
    /// Create the node for host node `node` with base behavior.
    pub fn new(graph: Arc<dyn HostGraph>, node: NodeId, config: ProxyConfig) -> Arc<Self> {
        Self::with_hooks(graph, node, Arc::new(DefaultHooks), config)
    }

    /// Create the node with custom hooks.
    pub fn with_hooks(
        graph: Arc<dyn HostGraph>,
        node: NodeId,
        hooks: Arc<dyn ProxyShapeHooks>,
        config: ProxyConfig,
    ) -> Arc<Self> {
        let inputs = ProxyInputs { share_stage: config.default_share_stage, ..Default::default() };
        let shape = Arc::new_cyclic(|weak| ProxyShape {
            node,
            graph,
            hooks,
            config,
            inputs: RwLock::new(inputs),
            locked: Mutex::new(HashSet::new()),
            dirty: Mutex::new(Attr::OUTPUTS.into_iter().collect()),
            lifecycle: Mutex::new(Lifecycle::default()),
            outputs: RwLock::new(Outputs::default()),
            bbox_cache: BoundingBoxCache::new(),
            target_layer: Mutex::new(None),
            exclude_prim_paths_version: AtomicU64::new(1),
            stage_version: AtomicU64::new(1),
            update_counter: AtomicI64::new(1),
            resync_counter: AtomicI64::new(1),
            computing: AtomicBool::new(false),
            in_ancestor_callback: AtomicBool::new(false),
            ancestors: Mutex::new(AncestorCallbacks::new()),
            moved_callback: Mutex::new(None),
            weak_self: weak.clone(),
        });
        shape.post_constructor();
        INSTANCES.fetch_add(1, Ordering::SeqCst);
        shape
    }

    fn post_constructor(&self) {
        let weak = self.weak_self.clone();
        let on_moved: Arc<MovedCallback> = Arc::new(move |_| {
            if let Some(shape) = weak.upgrade() {
                shape.update_ancestor_callbacks();
            }
        });
        match self.graph.add_moved_callback(self.node, on_moved) {
            Ok(id) => *self.moved_callback.lock() = Some(id),
            Err(err) => tracing::warn!(node = ?self.node, error = %err, "could not watch node moves"),
        }
        self.update_ancestor_callbacks();
    }

    /// Number of live proxy nodes in the process.
    pub fn count_instances() -> usize {
        INSTANCES.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn path_string(&self) -> String {
        self.graph.path_string(self.node).unwrap_or_default()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Snapshot of the current attribute values.
    pub fn inputs(&self) -> ProxyInputs {
        self.inputs.read().clone()
    }

    pub fn set_attribute_locked(&self, attr: Attr, locked: bool) {
        let mut set = self.locked.lock();
        if locked {
            set.insert(attr);
        } else {
            set.remove(&attr);
        }
    }

    pub fn is_attribute_locked(&self, attr: Attr) -> bool {
        self.locked.lock().contains(&attr)
    }

    /// Write an attribute and dirty what it affects.
    fn set_input(&self, attr: Attr, apply: impl FnOnce(&mut ProxyInputs)) -> Result<()> {
        self.write_attribute(attr, apply)?;
        let affected = attr.affects();
        if attr == Attr::ExcludePrimPaths {
            self.exclude_prim_paths_version.fetch_add(1, Ordering::SeqCst);
        }
        if affected.contains(&Attr::InStageDataCached) {
            self.stage_version.fetch_add(1, Ordering::SeqCst);
        }
        if affected.contains(&Attr::OutStageData) {
            self.bbox_cache.clear();
        }
        if !affected.is_empty() {
            self.propagate_dirty(affected);
        }
        Ok(())
    }

    /// Write an attribute without dirtying anything. Fails if locked.
    pub(crate) fn write_attribute(&self, attr: Attr, apply: impl FnOnce(&mut ProxyInputs)) -> Result<()> {
        if self.is_attribute_locked(attr) {
            return Err(Error::AttributeLocked(attr.name()));
        }
        apply(&mut self.inputs.write());
        Ok(())
    }

    pub fn set_file_path(&self, path: &str) -> Result<()> {
        self.set_input(Attr::FilePath, |i| i.file_path = path.to_string())
    }

    pub fn set_file_path_relative(&self, relative: bool) -> Result<()> {
        self.set_input(Attr::FilePathRelative, |i| i.file_path_relative = relative)
    }

    pub fn set_prim_path(&self, path: &str) -> Result<()> {
        self.set_input(Attr::PrimPath, |i| i.prim_path = path.to_string())
    }

    pub fn set_exclude_prim_paths(&self, paths: Vec<String>) -> Result<()> {
        self.set_input(Attr::ExcludePrimPaths, |i| i.exclude_prim_paths = paths)
    }

    pub fn set_load_payloads(&self, load: bool) -> Result<()> {
        self.set_input(Attr::LoadPayloads, |i| i.load_payloads = load)
    }

    pub fn set_share_stage(&self, share: bool) -> Result<()> {
        self.set_input(Attr::ShareStage, |i| i.share_stage = share)
    }

    pub fn set_time(&self, time: TimeCode) -> Result<()> {
        self.set_input(Attr::Time, |i| i.time = time)
    }

    pub fn set_complexity(&self, complexity: i32) -> Result<()> {
        self.set_input(Attr::Complexity, |i| i.complexity = complexity)
    }

    /// Connect (or disconnect) an incoming stage.
    pub fn set_in_stage_data(&self, stage: Option<StageHandle>) -> Result<()> {
        self.set_input(Attr::InStageData, |i| i.in_stage_data = stage)
    }

    pub fn set_stage_cache_id(&self, id: StageCacheId) -> Result<()> {
        self.set_input(Attr::StageCacheId, |i| i.stage_cache_id = id)
    }

    pub fn set_draw_render_purpose(&self, draw: bool) -> Result<()> {
        self.set_input(Attr::DrawRenderPurpose, |i| i.draw_render_purpose = draw)
    }

    pub fn set_draw_proxy_purpose(&self, draw: bool) -> Result<()> {
        self.set_input(Attr::DrawProxyPurpose, |i| i.draw_proxy_purpose = draw)
    }

    pub fn set_draw_guide_purpose(&self, draw: bool) -> Result<()> {
        self.set_input(Attr::DrawGuidePurpose, |i| i.draw_guide_purpose = draw)
    }

    pub fn set_session_layer_name(&self, name: &str) -> Result<()> {
        self.set_input(Attr::SessionLayerName, |i| i.session_layer_name = name.to_string())
    }

    pub fn set_root_layer_name(&self, name: &str) -> Result<()> {
        self.set_input(Attr::RootLayerName, |i| i.root_layer_name = name.to_string())
    }

    pub fn get_muted_layers(&self) -> Vec<String> {
        self.inputs.read().muted_layers.clone()
    }

    /// Store the muted layer list. Applied to the stage on the first compute.
    pub fn set_muted_layers(&self, muted: Vec<String>) -> Result<()> {
        self.set_input(Attr::MutedLayers, |i| i.muted_layers = muted)
    }

    /// Store the persisted edit target identifier.
    pub fn set_target_layer_name(&self, identifier: &str) -> Result<()> {
        self.set_input(Attr::TargetLayer, |i| i.target_layer = identifier.to_string())
    }

    // ------------------------------------------------------------------
    // Dirty propagation
    // ------------------------------------------------------------------

    /// True if `output` must be recomputed before it is read.
    pub fn is_dirty(&self, output: Attr) -> bool {
        self.dirty.lock().contains(&output)
    }

    /// Mark `attrs` (and the outputs they feed) dirty and tell the host.
    pub(crate) fn propagate_dirty(&self, attrs: &[Attr]) {
        {
            let mut dirty = self.dirty.lock();
            for attr in attrs {
                if attr.is_output() {
                    dirty.insert(*attr);
                }
                dirty.extend(attr.affects().iter().copied());
            }
        }
        // Our own host notification comes back through the callback we
        // registered on this node; the flag swallows it.
        let Some(_guard) = FlagGuard::set(&self.in_ancestor_callback) else {
            return;
        };
        for attr in attrs {
            self.graph.set_dirty(self.node, attr.name());
        }
    }

    /// Dirty callback registered on this node and each ancestor.
    pub(crate) fn on_ancestor_plug_dirty(&self, source: NodeId, plug: &str) {
        if self.in_ancestor_callback.load(Ordering::Acquire) {
            return;
        }
        tracing::trace!(node = ?self.node, ?source, plug, "ancestor dirty");
        self.propagate_dirty(&[Attr::OutStageData]);
    }

    /// Re-register ancestor callbacks if the node's path changed.
    pub fn update_ancestor_callbacks(&self) {
        let weak = self.weak_self.clone();
        let callback: Arc<DirtyCallback> = Arc::new(move |source, plug| {
            if let Some(shape) = weak.upgrade() {
                shape.on_ancestor_plug_dirty(source, plug);
            }
        });
        let rebuilt = self.ancestors.lock().update(self.graph.as_ref(), self.node, &callback);
        if rebuilt {
            self.bbox_cache.clear();
        }
    }

    /// Number of dirty callbacks this node holds on itself and its ancestors.
    pub fn ancestor_callback_count(&self) -> usize {
        self.ancestors.lock().len()
    }

    // ------------------------------------------------------------------
    // Outputs and accessors
    // ------------------------------------------------------------------

    pub fn out_time(&self) -> Result<TimeCode> {
        self.compute(Attr::OutTime)?;
        Ok(self.outputs.read().out_time)
    }

    /// The resolved stage before render overlays.
    pub fn in_stage_data_cached(&self) -> Result<Option<StageHandle>> {
        self.compute(Attr::InStageDataCached)?;
        Ok(self.outputs.read().in_stage_data_cached.clone())
    }

    pub fn out_stage_data(&self) -> Result<Arc<StageData>> {
        self.compute(Attr::OutStageData)?;
        Ok(self.outputs.read().out_stage_data.clone())
    }

    pub fn out_stage_cache_id(&self) -> Result<StageCacheId> {
        self.compute(Attr::OutStageCacheId)?;
        Ok(self.outputs.read().out_stage_cache_id)
    }

    /// Last stage output without computing.
    fn published_stage_data(&self) -> Arc<StageData> {
        self.outputs.read().out_stage_data.clone()
    }

    /// Stage output, falling back to the last published value when the
    /// node is already computing.
    fn stage_data(&self) -> Arc<StageData> {
        match self.out_stage_data() {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!(error = %err, "using last stage output");
                self.published_stage_data()
            }
        }
    }

    /// The prim the node points at.
    pub fn usd_prim(&self) -> Option<Prim> {
        self.stage_data().prim()
    }

    pub fn usd_stage(&self) -> Option<StageHandle> {
        self.stage_data().stage.clone()
    }

    pub fn usd_stage_version(&self) -> u64 {
        self.stage_version.load(Ordering::SeqCst)
    }

    pub fn exclude_prim_paths_version(&self) -> u64 {
        self.exclude_prim_paths_version.load(Ordering::SeqCst)
    }

    pub fn update_counter(&self) -> i64 {
        self.update_counter.load(Ordering::SeqCst)
    }

    pub fn resync_counter(&self) -> i64 {
        self.resync_counter.load(Ordering::SeqCst)
    }

    /// Exclude paths made absolute against the prim path.
    pub fn get_exclude_prim_paths(&self) -> Vec<ScenePath> {
        let inputs = self.inputs.read();
        let anchor = inputs.parsed_prim_path().unwrap_or_else(|_| ScenePath::root());
        inputs.parsed_exclude_prim_paths(&anchor)
    }

    pub fn get_complexity(&self) -> i32 {
        self.inputs.read().complexity
    }

    /// Evaluation time (the time output).
    pub fn get_time(&self) -> TimeCode {
        self.out_time().unwrap_or_else(|_| self.inputs.read().time)
    }

    pub fn draw_purpose_toggles(&self) -> PurposeFilter {
        self.inputs.read().purposes()
    }

    /// Everything a renderer needs, or `None` without a valid prim.
    pub fn get_all_render_attributes(&self) -> Option<RenderAttributes> {
        let data = self.stage_data();
        let prim = data.prim()?;
        Some(RenderAttributes {
            prim,
            exclude_prim_paths: data.exclude_prim_paths.clone(),
            complexity: data.complexity,
            time: self.get_time(),
            purposes: data.purposes,
        })
    }

    pub fn share_mode(&self) -> ShareMode {
        self.outputs.read().share_mode
    }

    pub fn is_shareable_stage(&self) -> bool {
        self.inputs.read().share_stage
    }

    /// True if the stage came from a connection or a stage cache id.
    pub fn is_stage_incoming(&self) -> bool {
        self.outputs.read().incoming
    }

    /// True if `identifier` was already in the incoming stage.
    pub fn is_incoming_layer(&self, identifier: &str) -> bool {
        self.outputs.read().incoming_layers.contains(identifier)
    }

    /// Edit target tracked since the first compute.
    pub fn target_layer(&self) -> Option<LayerHandle> {
        self.target_layer.lock().clone()
    }

    pub fn can_be_soft_selected(&self) -> bool {
        self.hooks.can_be_soft_selected()
    }

    pub fn soft_select_enabled(&self) -> bool {
        self.hooks.soft_select_enabled()
    }

    // ------------------------------------------------------------------
    // Bounds and picking
    // ------------------------------------------------------------------

    pub fn is_bounded(&self) -> bool {
        self.stage_data().is_valid()
    }

    /// Bounds of the node's prim at the current time, cached per time.
    pub fn bounding_box(&self) -> Arc<BBox3d> {
        let data = self.stage_data();
        let time = self.get_time();
        self.bbox_cache.get_or_compute(time, || {
            let mut bbox = match &data.stage {
                Some(stage) => stage.compute_bounds(&data.prim_path, time, data.purposes, &data.exclude_prim_paths),
                None => BBox3d::EMPTY,
            };
            if bbox.is_empty() {
                self.hooks.cache_empty_bounding_box(&mut bbox);
            }
            bbox
        })
    }

    pub fn clear_bounding_box_cache(&self) {
        self.bbox_cache.clear();
    }

    pub fn bounding_box_cache(&self) -> &BoundingBoxCache {
        &self.bbox_cache
    }

    /// Ask the installed delegate for the closest point to `ray`.
    pub fn closest_point(&self, ray: &Ray) -> Option<RayHit> {
        let delegate = closest_point::closest_point_delegate()?;
        delegate(self, ray)
    }

    pub fn can_make_live(&self) -> bool {
        closest_point::has_closest_point_delegate()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Store the edit target and layer muting in attributes before the
    /// host saves the scene.
    pub fn pre_save(&self) {
        if let Some(target) = self.target_layer() {
            let id = target.identifier().to_string();
            if let Err(err) = self.write_attribute(Attr::TargetLayer, |i| i.target_layer = id) {
                tracing::warn!(error = %err, "could not persist edit target");
            }
        }
        let stage = self.published_stage_data().stage.clone();
        if let Err(err) = crate::layer_muting::copy_layer_muting_to_attribute(stage.as_deref(), self) {
            tracing::debug!(error = %err, "layer muting not persisted");
        }
    }

    /// Copy `src`'s attributes and give this node its own copy of `src`'s
    /// anonymous root layer (node duplication).
    pub fn copy_internal_data(&self, src: &ProxyShape) {
        if std::ptr::eq(self, src) {
            return;
        }
        let mut inputs = src.inputs();
        let src_root = src.lifecycle.lock().anonymous_root().cloned();
        if let Some(src_root) = src_root {
            let root = crate::sdf::Layer::create_anonymous(&self.config.anonymous_root_tag);
            root.transfer_content(&src_root);
            inputs.root_layer_name = root.identifier().to_string();
            self.lifecycle.lock().set_anonymous_root(root);
        }
        *self.inputs.write() = inputs;
        self.stage_version.fetch_add(1, Ordering::SeqCst);
        self.bbox_cache.clear();
        self.propagate_dirty(&Attr::OUTPUTS);
    }
}

impl Drop for ProxyShape {
    fn drop(&mut self) {
        self.ancestors.get_mut().clear(self.graph.as_ref());
        if let Some(id) = self.moved_callback.get_mut().take() {
            self.graph.remove_callback(id);
        }
        INSTANCES.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(node = ?self.node, "proxy shape released");
    }
}

impl std::fmt::Debug for ProxyShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyShape")
            .field("node", &self.node)
            .field("share_mode", &self.share_mode())
            .finish()
    }
}

/// Render inputs gathered in one call.
#[derive(Clone, Debug)]
pub struct RenderAttributes {
    pub prim: Prim,
    pub exclude_prim_paths: Vec<ScenePath>,
    pub complexity: i32,
    pub time: TimeCode,
    pub purposes: PurposeFilter,
}
