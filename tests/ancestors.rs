//! Integration tests for ancestor dirty propagation.

use std::sync::Arc;

use stage_proxy::prelude::*;

#[test]
fn test_reparent_rebuilds_one_registration_set() {
    let graph = Arc::new(DagGraph::new());
    let a = graph.create_node("A", None).unwrap();
    let b = graph.create_node("B", None).unwrap();
    let b_child = graph.create_node("inner", Some(b)).unwrap();
    let node = graph.create_node("proxy", Some(a)).unwrap();
    let shape = ProxyShape::new(graph.clone(), node, ProxyConfig::default());

    // Self + A.
    assert_eq!(shape.ancestor_callback_count(), 2);
    assert_eq!(graph.callback_count(a), 1);

    graph.reparent(node, Some(b_child)).unwrap();
    assert_eq!(shape.ancestor_callback_count(), 3, "self + inner + B");
    assert_eq!(graph.callback_count(a), 0, "no callbacks left on the old parent");
    assert_eq!(graph.callback_count(b), 1);
    assert_eq!(graph.callback_count(b_child), 1);
    assert_eq!(graph.dirty_callback_count(), 3, "no duplicates anywhere");

    // Same path again: nothing is rebuilt.
    shape.update_ancestor_callbacks();
    assert_eq!(graph.dirty_callback_count(), 3);
}

#[test]
fn test_ancestor_dirty_marks_node_once() {
    let graph = Arc::new(DagGraph::new());
    let world = graph.create_node("world", None).unwrap();
    let xform = graph.create_node("xform", Some(world)).unwrap();
    let node = graph.create_node("proxy", Some(xform)).unwrap();
    let shape = ProxyShape::new(graph.clone(), node, ProxyConfig::default());
    shape.out_stage_data().unwrap();
    assert!(!shape.is_dirty(Attr::OutStageData));

    graph.clear_dirty_log();
    graph.set_dirty(world, "worldMatrix");
    assert_eq!(graph.dirty_events(node), 1, "one ancestor event, one node event");
    assert!(shape.is_dirty(Attr::OutStageData));

    graph.clear_dirty_log();
    graph.set_dirty(xform, "translate");
    graph.set_dirty(xform, "rotate");
    assert_eq!(graph.dirty_events(node), 2);
}

#[test]
fn test_own_input_dirties_once() {
    let graph = Arc::new(DagGraph::new());
    let node = graph.create_node("proxy", None).unwrap();
    let shape = ProxyShape::new(graph.clone(), node, ProxyConfig::default());

    graph.clear_dirty_log();
    shape.set_complexity(3).unwrap();
    assert_eq!(graph.dirty_events(node), 1);
    assert_eq!(graph.dirty_plug_events(node, "outStageData"), 1);
}

#[test]
fn test_drop_removes_callbacks() {
    let graph = Arc::new(DagGraph::new());
    let parent = graph.create_node("parent", None).unwrap();
    let node = graph.create_node("proxy", Some(parent)).unwrap();
    let before = ProxyShape::count_instances();
    let shape = ProxyShape::new(graph.clone(), node, ProxyConfig::default());
    assert!(ProxyShape::count_instances() >= before + 1);
    assert_eq!(graph.callback_count(node), 2, "self dirty + moved");

    drop(shape);
    assert_eq!(graph.callback_count(node), 0);
    assert_eq!(graph.callback_count(parent), 0);
    graph.set_dirty(parent, "visibility");
}
