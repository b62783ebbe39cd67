//! Bootstrap JSON — load a scene description, export one back.
//!
//! Input shape:
//!
//! ```json
//! { "scene": { "id": "...", "frame": "map",
//!   "rooms":   [{ "id": "kitchen", "pos": [2.5, 2.0, 1.25], "bbox": {"type": "OBB", "xyz": [5, 4, 2.5]} }],
//!   "objects": [{ "id": "table_1", "cls": "table", "pos": [1.5, 1.5, 0.75],
//!                 "ori": [0, 0, 0, 1], "bbox": {"type": "OBB", "xyz": [1.2, 0.8, 0.75]},
//!                 "aff": ["support"], "lom": "low" }],
//!   "relations": [{ "r": "in", "a": "table_1", "b": "kitchen" }] } }
//! ```
//!
//! Unknown fields are ignored. Missing optionals default to `aff = []`,
//! `lom = "medium"`, `conf = 1.0`, `state = {}`, `meta = {}`, identity
//! orientation.

use serde::Deserialize;
use serde_json::json;

use crate::model::{Mobility, Node, PropertyMap, RelKind, Relation, Value};
use crate::store::StoreSnapshot;
use crate::{Error, Result};

// ============================================================================
// Input schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct BootstrapDoc {
    scene: SceneSpec,
}

#[derive(Debug, Deserialize)]
struct SceneSpec {
    #[allow(dead_code)]
    id: Option<String>,
    #[allow(dead_code)]
    frame: Option<String>,
    #[serde(default)]
    rooms: Vec<ObjectSpec>,
    #[serde(default)]
    objects: Vec<ObjectSpec>,
    #[serde(default)]
    relations: Vec<RelationSpec>,
}

#[derive(Debug, Deserialize)]
struct ObjectSpec {
    id: String,
    name: Option<String>,
    cls: Option<String>,
    pos: [f64; 3],
    ori: Option<[f64; 4]>,
    bbox: BboxSpec,
    aff: Option<Vec<String>>,
    lom: Option<Mobility>,
    conf: Option<f64>,
    state: Option<serde_json::Value>,
    meta: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BboxSpec {
    #[allow(dead_code)]
    #[serde(rename = "type")]
    kind: Option<String>,
    xyz: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct RelationSpec {
    r: String,
    a: String,
    b: String,
    conf: Option<f64>,
    props: Option<serde_json::Value>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a bootstrap document into node and relation records, ready for
/// `SceneStore::load_bootstrap`.
pub fn parse(json: &str) -> Result<(Vec<Node>, Vec<Relation>)> {
    let doc: BootstrapDoc = serde_json::from_str(json)
        .map_err(|e| Error::BadBootstrap(format!("malformed bootstrap: {e}")))?;
    build(doc)
}

/// Same as [`parse`] for an already-decoded JSON value.
pub fn parse_value(json: serde_json::Value) -> Result<(Vec<Node>, Vec<Relation>)> {
    let doc: BootstrapDoc = serde_json::from_value(json)
        .map_err(|e| Error::BadBootstrap(format!("malformed bootstrap: {e}")))?;
    build(doc)
}

fn build(doc: BootstrapDoc) -> Result<(Vec<Node>, Vec<Relation>)> {
    let mut nodes = Vec::new();
    for spec in doc.scene.rooms {
        nodes.push(node_from(spec, "room")?);
    }
    for spec in doc.scene.objects {
        nodes.push(node_from(spec, "object")?);
    }

    let mut relations = Vec::new();
    for spec in doc.scene.relations {
        let mut rel = Relation::new(
            RelKind::from(spec.r),
            spec.a.as_str(),
            spec.b.as_str(),
            spec.conf.unwrap_or(1.0),
        );
        rel.props = props_from(spec.props);
        relations.push(rel);
    }
    Ok((nodes, relations))
}

fn node_from(spec: ObjectSpec, default_cls: &str) -> Result<Node> {
    let cls = spec.cls.unwrap_or_else(|| default_cls.to_owned());
    let mut node = Node::new(spec.id, cls);
    if let Some(name) = spec.name {
        node.name = name;
    }
    node.pos = spec.pos.into();
    node.ori = spec.ori.map(Into::into).unwrap_or_default();
    node.size = spec.bbox.xyz.into();
    node.affordances = spec.aff.unwrap_or_default().into_iter().collect();
    node.lom = spec.lom.unwrap_or_default();
    node.conf = spec.conf.unwrap_or(1.0);
    node.state = props_from(spec.state);
    node.meta = props_from(spec.meta);
    node.validate().map_err(Error::BadBootstrap)?;
    Ok(node)
}

fn props_from(value: Option<serde_json::Value>) -> PropertyMap {
    match value.as_ref().map(Value::from) {
        Some(Value::Map(map)) => map,
        _ => PropertyMap::new(),
    }
}

// ============================================================================
// Export
// ============================================================================

/// Serializes a store snapshot back into the bootstrap shape, so that
/// `parse ∘ export` is the identity on the node/relation subset.
pub fn export(snap: &StoreSnapshot, scene_id: &str) -> serde_json::Value {
    let mut rooms = Vec::new();
    let mut objects = Vec::new();
    for node in snap.nodes.values() {
        let entry = json!({
            "id": node.id.as_str(),
            "name": node.name,
            "cls": node.cls,
            "pos": [node.pos.x, node.pos.y, node.pos.z],
            "ori": [node.ori.x, node.ori.y, node.ori.z, node.ori.w],
            "bbox": { "type": "OBB", "xyz": [node.size.x, node.size.y, node.size.z] },
            "aff": node.affordances.iter().collect::<Vec<_>>(),
            "lom": node.lom,
            "conf": node.conf,
            "state": node.state,
            "meta": node.meta,
        });
        if node.is_room() {
            rooms.push(entry);
        } else {
            objects.push(entry);
        }
    }
    let relations: Vec<serde_json::Value> = snap
        .relations
        .values()
        .map(|rel| {
            json!({
                "r": rel.kind.as_str(),
                "a": rel.a.as_str(),
                "b": rel.b.as_str(),
                "conf": rel.conf,
                "props": rel.props,
            })
        })
        .collect();

    json!({
        "scene": {
            "id": scene_id,
            "frame": "map",
            "rooms": rooms,
            "objects": objects,
            "relations": relations,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vec3;

    const KITCHEN: &str = r#"{
        "scene": {
            "id": "kitchen_demo",
            "frame": "map",
            "rooms": [
                { "id": "kitchen", "pos": [2.5, 2.0, 1.25],
                  "bbox": { "type": "OBB", "xyz": [5.0, 4.0, 2.5] } }
            ],
            "objects": [
                { "id": "table_1", "cls": "table", "pos": [1.5, 1.5, 0.75],
                  "ori": [0, 0, 0, 1], "bbox": { "type": "OBB", "xyz": [1.2, 0.8, 0.75] },
                  "aff": ["support"], "lom": "low",
                  "meta": { "material": "wood" } },
                { "id": "chair_12", "cls": "chair", "pos": [0.9, 1.6, 0.45],
                  "bbox": { "type": "OBB", "xyz": [0.5, 0.5, 0.9] } }
            ],
            "relations": [
                { "r": "in", "a": "table_1", "b": "kitchen" },
                { "r": "in", "a": "chair_12", "b": "kitchen", "conf": 1.0 }
            ]
        }
    }"#;

    #[test]
    fn test_parse_kitchen() {
        let (nodes, relations) = parse(KITCHEN).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(relations.len(), 2);

        let room = &nodes[0];
        assert_eq!(room.cls, "room");
        assert_eq!(room.lom, Mobility::Medium);

        let table = nodes.iter().find(|n| n.id.as_str() == "table_1").unwrap();
        assert_eq!(table.pos, Vec3::new(1.5, 1.5, 0.75));
        assert!(table.has_affordance("support"));
        assert_eq!(table.meta.get("material"), Some(&Value::String("wood".into())));

        let chair = nodes.iter().find(|n| n.id.as_str() == "chair_12").unwrap();
        assert_eq!(chair.conf, 1.0);
        assert!(chair.affordances.is_empty());
        assert_eq!(chair.lom, Mobility::Medium);
    }

    #[test]
    fn test_missing_required_field_is_bad_bootstrap() {
        let err = parse(r#"{"scene": {"objects": [{"id": "x"}]}}"#).unwrap_err();
        assert!(matches!(err, Error::BadBootstrap(_)));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let doc = r#"{
            "scene": {
                "objects": [
                    { "id": "a", "cls": "box", "pos": [0, 0, 0.1], "wobble": 3,
                      "bbox": { "type": "OBB", "xyz": [0.2, 0.2, 0.2], "padding": true } }
                ],
                "extra": "ignored"
            }
        }"#;
        let (nodes, _) = parse(doc).unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_round_trip_through_export() {
        let (nodes, relations) = parse(KITCHEN).unwrap();
        let store = crate::store::SceneStore::new();
        store.load_bootstrap(nodes, relations).unwrap();
        let exported = export(&store.snapshot(), "kitchen_demo");

        let (nodes2, relations2) = parse_value(exported).unwrap();
        let store2 = crate::store::SceneStore::new();
        store2.load_bootstrap(nodes2, relations2).unwrap();
        assert_eq!(store.snapshot(), store2.snapshot());
    }
}
