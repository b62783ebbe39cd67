//! End-to-end relation discovery: agents negotiate proximity relations
//! over ticks, and re-negotiate when objects move.

mod common;

use spacegraph_rs::{Intent, NodeId, RelKey, RelKind, Vec3};

// ============================================================================
// 1. Initial near discovery (chair by the table, stove apart)
// ============================================================================

#[tokio::test]
async fn test_initial_near_discovery() {
    let scene = common::kitchen_scene().await;
    scene.run_ticks(2).await.unwrap();

    let snap = scene.store_snapshot();
    let near = snap
        .relations
        .get(&RelKey::new(RelKind::Near, "chair_12", "table_1"))
        .expect("chair near table");
    assert!(
        near.conf >= 0.65 && near.conf <= 0.75,
        "unexpected confidence {}",
        near.conf
    );
    let dist = near.props["dist"].as_float().unwrap();
    assert!((dist - 0.61).abs() < 0.01, "dist = {dist}");

    assert!(snap
        .relations
        .contains_key(&RelKey::new(RelKind::Near, "table_1", "chair_12")));

    // The stove is across the room: no near edge touches it.
    assert!(!snap.relations.keys().any(|k| {
        k.kind == RelKind::Near && (k.a.as_str() == "stove" || k.b.as_str() == "stove")
    }));
}

// ============================================================================
// 2. Moving the chair re-evaluates its relations
// ============================================================================

#[tokio::test]
async fn test_move_triggers_reevaluation() {
    let scene = common::kitchen_scene().await;
    scene.run_ticks(2).await.unwrap();

    scene
        .apply_intent(&Intent::MoveObject {
            id: NodeId::new("chair_12"),
            new_pos: Some(Vec3::new(2.9, 1.0, 0.45)),
            relative_to: None,
            offset: None,
        })
        .await
        .unwrap();
    scene.run_ticks(2).await.unwrap();

    let snap = scene.store_snapshot();
    let stove_near = snap
        .relations
        .get(&RelKey::new(RelKind::Near, "chair_12", "stove"))
        .expect("chair near stove after the move");
    assert!(stove_near.conf >= 0.7, "conf = {}", stove_near.conf);

    // The old table edge is gone or demoted to a confident far.
    let old_near = snap
        .relations
        .get(&RelKey::new(RelKind::Near, "chair_12", "table_1"));
    match old_near {
        None => {
            let far = snap
                .relations
                .get(&RelKey::new(RelKind::Far, "chair_12", "table_1"))
                .expect("far edge replaces near");
            assert!(far.conf >= 0.6);
        }
        Some(rel) => panic!("near(chair_12, table_1) survived the move: {rel:?}"),
    }
}

// ============================================================================
// 3. Boundary: a lonely object stays silent
// ============================================================================

#[tokio::test]
async fn test_isolated_object_emits_nothing() {
    let scene = common::kitchen_scene().await;
    scene
        .apply_intent(&Intent::AddObject {
            cls: "plant".into(),
            target: None,
            relation: None,
            quantity: None,
            pose: Some(Vec3::new(30.0, 30.0, 0.15)),
            size: None,
        })
        .await
        .unwrap();

    let before = scene.store_snapshot().relations.len();
    let report = scene.tick().await.unwrap();
    let after = scene.store_snapshot().relations.len();

    // The plant saw nobody; relation count only changes through the
    // existing kitchen trio.
    assert!(report.messages_sent > 0); // kitchen agents still talk
    assert!(!scene.store_snapshot().relations.keys().any(|k| {
        k.a.as_str().starts_with("plant") || k.b.as_str().starts_with("plant")
    }));
    assert!(after >= before);
}

// ============================================================================
// 4. Two objects at the same spot read as near with full confidence
// ============================================================================

#[tokio::test]
async fn test_coincident_objects_full_confidence_near() {
    let scene = common::kitchen_scene().await;
    for _ in 0..2 {
        scene
            .apply_intent(&Intent::AddObject {
                cls: "marker".into(),
                target: None,
                relation: None,
                quantity: None,
                pose: Some(Vec3::new(4.0, 3.0, 0.5)),
                size: None,
            })
            .await
            .unwrap();
    }
    scene.run_ticks(2).await.unwrap();

    let snap = scene.store_snapshot();
    let rel = snap
        .relations
        .get(&RelKey::new(RelKind::Near, "marker_1", "marker_2"))
        .expect("coincident markers are near");
    assert!((rel.conf - 1.0).abs() < 1e-9);
}
