//! Integration tests for stage resolution, sharing and share-mode transitions.

use parking_lot::Mutex;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};

use stage_proxy::prelude::*;
use stage_proxy::proxy::ProxyInputs;
use stage_proxy::sdf::Specifier;
use tempfile::TempDir;

fn path(text: &str) -> ScenePath {
    ScenePath::new(text).expect("valid path")
}

/// Write a small layer file with a cube under /World.
fn write_scene(dir: &Path, name: &str) -> PathBuf {
    let file = dir.join(name);
    let layer = Layer::create_new(&file);
    layer.define_prim(&path("/World"), Specifier::Def, "Xform").expect("define /World");
    layer.define_prim(&path("/World/Cube"), Specifier::Def, "Cube").expect("define cube");
    layer
        .set_attribute(&path("/World/Cube"), "extent", Value::Extent([[-1.0; 3], [1.0; 3]]), None)
        .expect("author extent");
    layer
        .set_attribute(&path("/World/Cube"), "size", Value::Double(1.0), None)
        .expect("author size");
    layer.save().expect("save layer");
    file
}

fn new_shape(graph: &Arc<DagGraph>, name: &str) -> Arc<ProxyShape> {
    let node = graph.create_node(name, None).expect("create node");
    ProxyShape::new(graph.clone(), node, ProxyConfig::default())
}

fn stage_of(shape: &ProxyShape) -> StageHandle {
    shape.out_stage_data().expect("compute").stage.clone().expect("stage resolved")
}

#[test]
fn test_repeated_compute_is_idempotent() {
    let dir = TempDir::new().expect("temp dir");
    let file = write_scene(dir.path(), "idempotent.json");
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");
    shape.set_file_path(file.to_str().unwrap()).unwrap();

    let first = stage_of(&shape);
    let id = shape.out_stage_cache_id().unwrap();
    let version = shape.usd_stage_version();

    // Inputs that do not touch the stage leave its identity alone.
    shape.set_time(TimeCode::new(12.0)).unwrap();
    shape.set_complexity(2).unwrap();
    let second = stage_of(&shape);
    assert!(Arc::ptr_eq(&first, &second), "stage should be reused");
    assert_eq!(shape.out_stage_cache_id().unwrap(), id);
    assert_eq!(shape.usd_stage_version(), version);

    // Same for a private stage.
    shape.set_share_stage(false).unwrap();
    let private = stage_of(&shape);
    shape.set_time(TimeCode::new(13.0)).unwrap();
    assert!(Arc::ptr_eq(&private, &stage_of(&shape)));
}

#[test]
fn test_cache_id_follows_share_mode() {
    let dir = TempDir::new().expect("temp dir");
    let file = write_scene(dir.path(), "end_to_end.json");
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");
    shape.set_file_path(file.to_str().unwrap()).unwrap();
    shape.set_prim_path("/").unwrap();

    let shared = stage_of(&shape);
    let id = shape.out_stage_cache_id().unwrap();
    assert!(id.is_valid(), "shared stage should have a cache id");
    assert_eq!(StageCache::global().id_of(&shared), id);
    assert!(Arc::ptr_eq(&StageCache::global().find(id).unwrap(), &shared));
    assert_eq!(shape.share_mode(), ShareMode::Shared);

    shared
        .set_attribute(&path("/World/Cube"), "size", Value::Double(2.0), None)
        .expect("edit shared stage");

    shape.set_share_stage(false).unwrap();
    assert!(!shape.out_stage_cache_id().unwrap().is_valid(), "unshared stage has no cache id");
    assert_eq!(shape.share_mode(), ShareMode::Unshared);

    let private = stage_of(&shape);
    assert!(!Arc::ptr_eq(&private, &shared));
    assert_eq!(
        private.attribute_value(&path("/World/Cube"), "size", TimeCode::default()),
        Some(Value::Double(2.0)),
        "edits made while shared must stay visible"
    );
}

#[test]
fn test_share_round_trip_keeps_target_content() {
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");

    let stage = stage_of(&shape);
    stage.define_prim(&path("/Authored"), "Xform").unwrap();
    stage
        .set_attribute(&path("/Authored"), "xformOp:translate", Value::Double3([1.0, 2.0, 3.0]), None)
        .unwrap();
    let target = shape.target_layer().expect("target tracked");
    let before = target.export_to_string().unwrap();

    shape.set_share_stage(false).unwrap();
    stage_of(&shape);
    shape.set_share_stage(true).unwrap();
    let back = stage_of(&shape);

    let after = shape.target_layer().expect("target tracked").export_to_string().unwrap();
    assert_eq!(before, after, "target layer content must survive on -> off -> on");
    assert!(back.has_prim(&path("/Authored")));
}

#[test]
fn test_share_round_trip_moves_session_edits() {
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");

    let stage = stage_of(&shape);
    let session = stage.session_layer().clone();
    stage.set_edit_target(&session).unwrap();
    stage.define_prim(&path("/Session"), "Scope").unwrap();
    let before = session.export_to_string().unwrap();

    shape.set_share_stage(false).unwrap();
    let private = stage_of(&shape);
    assert!(private.has_prim(&path("/Session")), "session edits follow the node");
    assert!(!session.has_prim_spec(&path("/Session")), "old session layer is cleared");
    assert!(Arc::ptr_eq(&shape.target_layer().unwrap(), private.session_layer()));

    shape.set_share_stage(true).unwrap();
    stage_of(&shape);
    assert_eq!(session.export_to_string().unwrap(), before);
}

#[test]
fn test_private_edits_merge_into_shared_root() {
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");
    shape.set_share_stage(false).unwrap();

    let private = stage_of(&shape);
    let private_root = shape.unshared_root_layer().expect("private root created");
    assert!(Arc::ptr_eq(&private.edit_target(), &private_root));
    private.define_prim(&path("/Private"), "Xform").unwrap();

    shape.set_share_stage(true).unwrap();
    let shared = stage_of(&shape);
    assert!(shared.has_prim(&path("/Private")));
    assert!(shared.root_layer().has_prim_spec(&path("/Private")));
    assert!(private_root.prim_paths().is_empty(), "private root prims are moved out");
    assert!(Arc::ptr_eq(&shape.target_layer().unwrap(), shared.root_layer()));
}

#[test]
fn test_private_edits_survive_failed_resolution() {
    let dir = TempDir::new().expect("temp dir");
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");
    shape.set_share_stage(false).unwrap();
    let private = stage_of(&shape);
    private.define_prim(&path("/Private"), "Xform").unwrap();
    drop(private);

    shape.set_file_path(dir.path().join("missing.json").to_str().unwrap()).unwrap();
    assert!(!shape.out_stage_data().unwrap().is_valid());

    shape.set_file_path("").unwrap();
    shape.set_share_stage(true).unwrap();
    let shared = stage_of(&shape);
    assert_eq!(shape.share_mode(), ShareMode::Shared);
    assert!(shared.root_layer().has_prim_spec(&path("/Private")), "private edits merged after the failure");
}

#[test]
fn test_one_subscription_per_live_stage() {
    let dir = TempDir::new().expect("temp dir");
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");

    let shared = stage_of(&shape);
    for _ in 0..3 {
        shape.set_complexity(2).unwrap();
        stage_of(&shape);
    }
    assert_eq!(shared.listener_count(), 1);

    shape.set_share_stage(false).unwrap();
    let private = stage_of(&shape);
    assert_eq!(private.listener_count(), 1);
    assert_eq!(shared.listener_count(), 0);

    shape.set_share_stage(true).unwrap();
    assert!(Arc::ptr_eq(&stage_of(&shape), &shared));
    assert_eq!(shared.listener_count(), 1);
    assert_eq!(private.listener_count(), 0);

    let file = write_scene(dir.path(), "switch.json");
    shape.set_file_path(file.to_str().unwrap()).unwrap();
    let from_file = stage_of(&shape);
    assert_eq!(from_file.listener_count(), 1);
    assert_eq!(shared.listener_count(), 0);
}

#[test]
fn test_missing_file_gives_empty_output() {
    let dir = TempDir::new().expect("temp dir");
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");
    shape.set_file_path(dir.path().join("missing.json").to_str().unwrap()).unwrap();

    let data = shape.out_stage_data().expect("resolution failure is not an error");
    assert!(!data.is_valid());
    assert!(!shape.out_stage_cache_id().unwrap().is_valid());
    assert!(shape.usd_prim().is_none());
    assert!(!shape.is_bounded());
    assert!(shape.bounding_box().is_empty());

    // A later valid path recovers.
    let file = write_scene(dir.path(), "present.json");
    shape.set_file_path(file.to_str().unwrap()).unwrap();
    assert!(shape.out_stage_data().unwrap().is_valid());
}

#[test]
fn test_invalid_prim_path_gives_empty_output() {
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");
    shape.set_prim_path("not a path").unwrap();
    let data = shape.out_stage_data().unwrap();
    assert!(!data.is_valid());
    assert!(shape.out_time().is_ok(), "other outputs still compute");
}

#[test]
fn test_relative_file_path_uses_scene_directory() {
    let dir = TempDir::new().expect("temp dir");
    write_scene(dir.path(), "relative.json");
    let graph = Arc::new(DagGraph::new());
    let node = graph.create_node("proxy", None).unwrap();
    let config = ProxyConfig { scene_directory: Some(dir.path().to_path_buf()), ..Default::default() };
    let shape = ProxyShape::new(graph.clone(), node, config);

    shape.set_file_path("relative.json").unwrap();
    shape.set_file_path_relative(true).unwrap();
    let stage = stage_of(&shape);
    assert!(stage.has_prim(&path("/World/Cube")));
}

#[test]
fn test_incoming_stage_from_cache_id() {
    let root = Layer::create_anonymous("incoming");
    root.define_prim(&path("/In"), Specifier::Def, "Xform").unwrap();
    let incoming = Stage::open(root.clone(), None, InitialLoadSet::LoadAll);
    let id = StageCache::global().insert(&incoming);

    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");
    shape.set_stage_cache_id(id).unwrap();

    assert!(Arc::ptr_eq(&stage_of(&shape), &incoming));
    assert!(shape.is_stage_incoming());
    assert!(shape.is_incoming_layer(root.identifier()));
    assert_eq!(shape.out_stage_cache_id().unwrap(), id);

    // An id naming no live stage falls back to the node's own root.
    shape.set_stage_cache_id(StageCacheId::from_i64(i64::MAX)).unwrap();
    assert!(!Arc::ptr_eq(&stage_of(&shape), &incoming));
    assert!(!shape.is_stage_incoming());
}

#[test]
fn test_incoming_stage_from_connection() {
    let incoming = Stage::open(Layer::create_anonymous("connected"), None, InitialLoadSet::LoadAll);
    let graph = Arc::new(DagGraph::new());
    let shape = new_shape(&graph, "proxy");
    shape.set_in_stage_data(Some(incoming.clone())).unwrap();
    assert!(Arc::ptr_eq(&stage_of(&shape), &incoming));
    assert!(shape.is_stage_incoming());

    shape.set_in_stage_data(None).unwrap();
    assert!(!Arc::ptr_eq(&stage_of(&shape), &incoming));
}

#[test]
fn test_concurrent_nodes_share_one_stage() {
    let dir = TempDir::new().expect("temp dir");
    let file = write_scene(dir.path(), "concurrent.json");
    let file = file.to_str().unwrap().to_string();
    let graph = Arc::new(DagGraph::new());

    let resolved: Vec<(Arc<ProxyShape>, StageHandle)> = (0..8)
        .into_par_iter()
        .map(|i| {
            let shape = new_shape(&graph, &format!("proxy{i}"));
            shape.set_file_path(&file).unwrap();
            let stage = stage_of(&shape);
            (shape, stage)
        })
        .collect();

    let first = &resolved[0].1;
    assert!(resolved.iter().all(|(_, s)| Arc::ptr_eq(s, first)), "one stage per key");
    let ids: Vec<_> = resolved.iter().map(|(s, _)| s.out_stage_cache_id().unwrap()).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
}

#[test]
fn test_copy_internal_data_duplicates_anonymous_root() {
    let graph = Arc::new(DagGraph::new());
    let src = new_shape(&graph, "src");
    let stage = stage_of(&src);
    stage.define_prim(&path("/Copied"), "Xform").unwrap();

    let dst = new_shape(&graph, "dst");
    dst.copy_internal_data(&src);
    let copy = stage_of(&dst);
    assert!(!Arc::ptr_eq(copy.root_layer(), stage.root_layer()));
    assert!(copy.has_prim(&path("/Copied")));

    copy.define_prim(&path("/OnlyInCopy"), "Xform").unwrap();
    assert!(!stage.has_prim(&path("/OnlyInCopy")));
}

struct ReentrantHooks {
    shape: OnceLock<Weak<ProxyShape>>,
    nested: Mutex<Option<bool>>,
}

impl ProxyShapeHooks for ReentrantHooks {
    fn output_time(&self, inputs: &ProxyInputs) -> TimeCode {
        if let Some(shape) = self.shape.get().and_then(Weak::upgrade) {
            let refused = matches!(shape.compute(Attr::OutStageData), Err(Error::ReentrantCompute(_)));
            *self.nested.lock() = Some(refused);
        }
        inputs.time
    }
}

#[test]
fn test_reentrant_compute_is_refused() {
    let graph = Arc::new(DagGraph::new());
    let node = graph.create_node("proxy", None).unwrap();
    let hooks = Arc::new(ReentrantHooks { shape: OnceLock::new(), nested: Mutex::new(None) });
    let shape = ProxyShape::with_hooks(graph.clone(), node, hooks.clone(), ProxyConfig::default());
    let _ = hooks.shape.set(Arc::downgrade(&shape));

    shape.set_time(TimeCode::new(4.0)).unwrap();
    assert_eq!(shape.out_time().unwrap(), TimeCode::new(4.0));
    assert_eq!(*hooks.nested.lock(), Some(true), "nested compute must fail");

    // The node still computes normally afterwards.
    assert!(shape.out_stage_data().unwrap().is_valid());
}
