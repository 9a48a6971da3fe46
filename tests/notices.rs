//! Integration tests for stage notices: counters, bounds cache, muting and
//! edit target tracking.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use stage_proxy::layer_muting;
use stage_proxy::prelude::*;
use stage_proxy::sdf::Specifier;
use stage_proxy::util::DVec3;

fn path(text: &str) -> ScenePath {
    ScenePath::new(text).expect("valid path")
}

fn shape_with(graph: &Arc<DagGraph>, config: ProxyConfig) -> Arc<ProxyShape> {
    let node = graph.create_node("proxy", None).expect("create node");
    ProxyShape::new(graph.clone(), node, config)
}

fn stage_of(shape: &ProxyShape) -> StageHandle {
    shape.out_stage_data().expect("compute").stage.clone().expect("stage resolved")
}

/// Stage with one cube of half-size 1 at the origin.
fn cube_stage(shape: &ProxyShape) -> StageHandle {
    let stage = stage_of(shape);
    stage.define_prim(&path("/Cube"), "Cube").unwrap();
    stage
        .set_attribute(&path("/Cube"), "extent", Value::Extent([[-1.0; 3], [1.0; 3]]), None)
        .unwrap();
    stage
        .set_attribute(&path("/Cube"), "size", Value::Double(1.0), None)
        .unwrap();
    stage
}

#[test]
fn test_counters_track_change_classes() {
    let graph = Arc::new(DagGraph::new());
    let shape = shape_with(&graph, ProxyConfig::default());
    let stage = cube_stage(&shape);

    let updates = shape.update_counter();
    let resyncs = shape.resync_counter();

    // Value edit: contents changed, no resync.
    stage.set_attribute(&path("/Cube"), "size", Value::Double(2.0), None).unwrap();
    assert!(shape.update_counter() > updates);
    assert_eq!(shape.resync_counter(), resyncs);

    // Structural edits: each one bumps the resync counter.
    let mut last_resync = shape.resync_counter();
    let mut last_update = shape.update_counter();
    for name in ["/A", "/B", "/C"] {
        stage.define_prim(&path(name), "Xform").unwrap();
        assert!(shape.resync_counter() > last_resync, "resync counter must grow for {name}");
        assert!(shape.update_counter() > last_update);
        last_resync = shape.resync_counter();
        last_update = shape.update_counter();
    }
    stage.remove_prim(&path("/B"));
    assert!(shape.resync_counter() > last_resync);

    assert!(shape.is_dirty(Attr::OutStageData), "notices mark the stage output dirty");
}

#[test]
fn test_notices_from_old_stage_are_ignored() {
    let graph = Arc::new(DagGraph::new());
    let shape = shape_with(&graph, ProxyConfig::default());
    let shared = stage_of(&shape);

    shape.set_share_stage(false).unwrap();
    stage_of(&shape);
    let resyncs = shape.resync_counter();

    // The shared root is a sublayer of the private stage, so author on a
    // layer only the shared stage sees.
    let session = shared.session_layer().clone();
    session.define_prim(&path("/Elsewhere"), Specifier::Def, "Xform").unwrap();
    assert_eq!(shape.resync_counter(), resyncs);
}

#[test]
fn test_bounding_box_cache_hit_and_resync() {
    let graph = Arc::new(DagGraph::new());
    let config = ProxyConfig { bounds_invalidation: BoundsInvalidation::StructuralOnly, ..Default::default() };
    let shape = shape_with(&graph, config);
    let stage = cube_stage(&shape);

    let first = shape.bounding_box();
    let second = shape.bounding_box();
    assert!(Arc::ptr_eq(&first, &second), "same time must hit the cache");
    assert_eq!(first.max.to_array(), [1.0, 1.0, 1.0]);

    // Value-only edits leave the cache alone under this policy.
    stage.set_attribute(&path("/Cube"), "size", Value::Double(3.0), None).unwrap();
    assert!(Arc::ptr_eq(&first, &shape.bounding_box()));

    stage.define_prim(&path("/Other"), "Cube").unwrap();
    assert!(shape.bounding_box_cache().is_empty());
    assert!(!Arc::ptr_eq(&first, &shape.bounding_box()), "resync invalidates every time");
}

#[test]
fn test_bounding_box_conservative_policy() {
    let graph = Arc::new(DagGraph::new());
    let shape = shape_with(&graph, ProxyConfig::default());
    let stage = cube_stage(&shape);

    let first = shape.bounding_box();
    stage
        .set_attribute(&path("/Cube"), "extent", Value::Extent([[-2.0; 3], [2.0; 3]]), None)
        .unwrap();
    let second = shape.bounding_box();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.max.to_array(), [2.0, 2.0, 2.0]);
}

#[test]
fn test_structural_only_clears_on_bounds_attributes() {
    let graph = Arc::new(DagGraph::new());
    let config = ProxyConfig { bounds_invalidation: BoundsInvalidation::StructuralOnly, ..Default::default() };
    let shape = shape_with(&graph, config);
    let stage = cube_stage(&shape);
    assert_eq!(shape.bounding_box().max, DVec3::ONE);

    stage
        .set_attribute(&path("/Cube"), "extent", Value::Extent([[-5.0; 3], [5.0; 3]]), None)
        .unwrap();
    assert_eq!(shape.bounding_box().max, DVec3::splat(5.0));

    stage
        .set_attribute(&path("/Cube"), "xformOp:translate", Value::Double3([1.0, 0.0, 0.0]), None)
        .unwrap();
    stage
        .set_attribute(&path("/Cube"), "xformOp:translate", Value::Double3([2.0, 0.0, 0.0]), None)
        .unwrap();
    assert_eq!(shape.bounding_box().max.x, 7.0);
}

/// Authors a prim with geometry the first time an empty box is reported.
struct LateGeometryHooks {
    stage: OnceLock<StageHandle>,
}

impl ProxyShapeHooks for LateGeometryHooks {
    fn cache_empty_bounding_box(&self, _bbox: &mut BBox3d) {
        let Some(stage) = self.stage.get() else { return };
        let late = path("/Late");
        if !stage.has_prim(&late) {
            stage.define_prim(&late, "Cube").unwrap();
            stage
                .set_attribute(&late, "extent", Value::Extent([[-1.0; 3], [1.0; 3]]), None)
                .unwrap();
        }
    }
}

#[test]
fn test_resync_during_bounds_compute_is_not_cached() {
    let graph = Arc::new(DagGraph::new());
    let node = graph.create_node("proxy", None).unwrap();
    let hooks = Arc::new(LateGeometryHooks { stage: OnceLock::new() });
    let shape = ProxyShape::with_hooks(graph.clone(), node, hooks.clone(), ProxyConfig::default());
    let _ = hooks.stage.set(stage_of(&shape));

    let resyncs = shape.resync_counter();
    let during = shape.bounding_box();
    assert!(during.is_empty());
    assert!(shape.resync_counter() > resyncs);
    assert!(shape.bounding_box_cache().is_empty(), "box computed before the resync is dropped");

    let after = shape.bounding_box();
    assert_eq!(after.max, DVec3::ONE);
    assert!(Arc::ptr_eq(&after, &shape.bounding_box()));
}

#[test]
fn test_bounding_box_per_time() {
    let graph = Arc::new(DagGraph::new());
    let shape = shape_with(&graph, ProxyConfig::default());
    let stage = cube_stage(&shape);
    stage
        .set_attribute(&path("/Cube"), "xformOp:translate", Value::Double3([0.0; 3]), Some(TimeCode::new(0.0)))
        .unwrap();
    stage
        .set_attribute(&path("/Cube"), "xformOp:translate", Value::Double3([10.0, 0.0, 0.0]), Some(TimeCode::new(10.0)))
        .unwrap();

    let at0 = shape.bounding_box();
    shape.set_time(TimeCode::new(10.0)).unwrap();
    let at10 = shape.bounding_box();
    assert_eq!(at10.max.x, 11.0);
    assert_eq!(at0.max.x, 1.0);
    assert!(shape.bounding_box_cache().get(TimeCode::new(10.0)).is_some());
}

#[test]
fn test_muting_round_trip_through_new_node() {
    let root = Layer::create_anonymous("mutingRoot");
    let l1 = Layer::create_anonymous("L1");
    let l2 = Layer::create_anonymous("L2");
    let l3 = Layer::create_anonymous("L3");
    for (layer, prim) in [(&l1, "/One"), (&l2, "/Two"), (&l3, "/Three")] {
        layer.define_prim(&path(prim), Specifier::Def, "Xform").unwrap();
    }
    root.set_sublayer_paths(vec![
        l1.identifier().to_string(),
        l2.identifier().to_string(),
        l3.identifier().to_string(),
    ]);
    let ids: BTreeSet<String> = [l1.identifier(), l2.identifier()].into_iter().map(String::from).collect();

    let graph = Arc::new(DagGraph::new());
    let saved = {
        let shape = shape_with(&graph, ProxyConfig::default());
        shape.set_root_layer_name(root.identifier()).unwrap();
        let stage = stage_of(&shape);
        stage.mute_layer(l1.identifier());
        stage.mute_layer(l2.identifier());
        assert!(!stage.has_prim(&path("/One")));
        shape.pre_save();
        shape.get_muted_layers()
    };
    assert_eq!(saved.iter().cloned().collect::<BTreeSet<_>>(), ids);

    // Muted anonymous layers outlive every other owner.
    let (id1, id2) = (l1.identifier().to_string(), l2.identifier().to_string());
    drop((l1, l2));
    assert!(Layer::find(&id1).is_some() && Layer::find(&id2).is_some());
    assert!(layer_muting::is_muted_layer_retained(&id1));

    let shape = shape_with(&graph, ProxyConfig::default());
    shape.set_root_layer_name(root.identifier()).unwrap();
    shape.set_muted_layers(saved).unwrap();
    let stage = stage_of(&shape);
    let muted: BTreeSet<String> = stage.muted_layers().into_iter().collect();
    assert_eq!(muted, ids, "exactly L1 and L2 are muted");
    assert!(stage.has_prim(&path("/Three")));
    assert!(!stage.has_prim(&path("/Two")));

    // Unmuting through the stage updates the attribute.
    stage.unmute_layer(&id1);
    assert_eq!(shape.get_muted_layers(), vec![id2]);
    assert!(stage.has_prim(&path("/One")));
}

#[test]
fn test_edit_target_is_tracked_and_persisted() {
    let root = Layer::create_anonymous("targetRoot");
    let sub = Layer::create_anonymous("targetSub");
    root.set_sublayer_paths(vec![sub.identifier().to_string()]);

    let graph = Arc::new(DagGraph::new());
    let shape = shape_with(&graph, ProxyConfig::default());
    shape.set_root_layer_name(root.identifier()).unwrap();
    let stage = stage_of(&shape);
    assert!(Arc::ptr_eq(&shape.target_layer().unwrap(), &root));

    stage.set_edit_target(&sub).unwrap();
    assert!(Arc::ptr_eq(&shape.target_layer().unwrap(), &sub));

    shape.pre_save();
    assert_eq!(shape.inputs().target_layer, sub.identifier());

    // A new node restores the persisted target on first compute.
    stage.set_edit_target(&root).unwrap();
    drop(stage);
    let restored = shape_with(&graph, ProxyConfig::default());
    restored.set_root_layer_name(root.identifier()).unwrap();
    restored.set_target_layer_name(sub.identifier()).unwrap();
    let stage = stage_of(&restored);
    assert!(Arc::ptr_eq(&stage.edit_target(), &sub));
}

#[test]
fn test_locked_muted_layers_attribute() {
    let root = Layer::create_anonymous("lockedRoot");
    let sub = Layer::create_anonymous("lockedSub");
    root.set_sublayer_paths(vec![sub.identifier().to_string()]);

    let graph = Arc::new(DagGraph::new());
    let shape = shape_with(&graph, ProxyConfig::default());
    shape.set_root_layer_name(root.identifier()).unwrap();
    let stage = stage_of(&shape);

    shape.set_attribute_locked(Attr::MutedLayers, true);
    assert!(shape.set_muted_layers(vec!["x".into()]).is_err());
    let version = shape.usd_stage_version();
    stage.mute_layer(sub.identifier());
    assert!(shape.get_muted_layers().is_empty(), "locked attribute is not written");
    assert!(shape.usd_stage_version() > version);
}
