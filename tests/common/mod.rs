//! Shared fixtures for the end-to-end suites.

use spacegraph_rs::Scene;

/// The kitchen scene: a table, a chair near it, a stove across the room,
/// all inside one room.
pub const KITCHEN: &str = r#"{
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
              "aff": ["support"], "lom": "low" },
            { "id": "chair_12", "cls": "chair", "pos": [0.9, 1.6, 0.45],
              "bbox": { "type": "OBB", "xyz": [0.5, 0.5, 0.9] } },
            { "id": "stove", "cls": "stove", "pos": [3.5, 1.0, 0.45],
              "bbox": { "type": "OBB", "xyz": [0.6, 0.6, 0.9] },
              "aff": ["support"], "lom": "fixed" }
        ],
        "relations": [
            { "r": "in", "a": "table_1", "b": "kitchen" },
            { "r": "in", "a": "chair_12", "b": "kitchen" },
            { "r": "in", "a": "stove", "b": "kitchen" }
        ]
    }
}"#;

pub async fn kitchen_scene() -> Scene {
    Scene::bootstrap(KITCHEN).await.expect("kitchen bootstrap")
}
