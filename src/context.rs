//! # Spatial Context Assembler
//!
//! Builds the one structured snapshot consumed by the Q&A dispatcher and
//! external renderers. The snapshot is a pure function of the store plus
//! the support indices — same inputs, byte-identical output. Field names
//! are part of the export contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::SceneConfig;
use crate::model::{Aabb, Mobility, NodeId, PropertyMap, RelKind, Vec3};
use crate::store::StoreSnapshot;
use crate::support::{AccessReport, StabilityReport, SupportSystem};

// ============================================================================
// Snapshot schema
// ============================================================================

/// The full derived picture of the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialSnapshot {
    pub scene_summary: SceneSummary,
    pub objects: Vec<ObjectRecord>,
    pub relationships: Vec<RelationRecord>,
    pub support_dependencies: SupportDependencies,
    pub spatial_clusters: Vec<Cluster>,
    pub accessibility: BTreeMap<NodeId, AccessReport>,
    pub stability: BTreeMap<NodeId, StabilityReport>,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub node_count: usize,
    pub relation_count: usize,
    /// Counts by class tag, class-sorted.
    pub class_counts: BTreeMap<String, usize>,
    /// Relation-type histogram, type-sorted.
    pub relation_counts: BTreeMap<String, usize>,
    /// Overall AABB of all nodes; `None` for an empty scene.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Aabb>,
}

/// Compact per-node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: NodeId,
    pub name: String,
    pub cls: String,
    pub pos: Vec3,
    pub size: Vec3,
    pub affordances: Vec<String>,
    pub lom: Mobility,
    pub conf: f64,
}

/// Relation as exported: wire type name plus provenance of the type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub r: String,
    pub a: NodeId,
    pub b: NodeId,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub props: PropertyMap,
    pub conf: f64,
    pub type_source: TypeSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSource {
    Reserved,
    Custom,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportDependencies {
    pub supported_by: BTreeMap<NodeId, NodeId>,
    pub dependents: BTreeMap<NodeId, Vec<NodeId>>,
    pub recursive_dependents: BTreeMap<NodeId, Vec<NodeId>>,
}

/// Connected component under `near ∨ on_top_of ∨ beside`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub cluster_type: String,
    pub members: Vec<NodeId>,
}

// ============================================================================
// Assembly
// ============================================================================

/// Assembles the snapshot. Deterministic: every list is sorted.
pub fn assemble(
    snap: &StoreSnapshot,
    support: &SupportSystem,
    config: &SceneConfig,
) -> SpatialSnapshot {
    let scene_summary = summarize(snap);
    let objects = object_records(snap);
    let relationships = relation_records(snap);
    let support_dependencies = support_dependencies(snap, support);
    let spatial_clusters = clusters(snap, config);
    let accessibility = support.accessibility(snap);
    let stability: BTreeMap<NodeId, StabilityReport> = snap
        .nodes
        .values()
        .filter(|n| !n.is_room())
        .map(|n| (n.id.clone(), support.stability_report(&n.id, snap)))
        .collect();
    let insights = insights(
        &scene_summary,
        &support_dependencies,
        &spatial_clusters,
        &accessibility,
        &stability,
    );

    SpatialSnapshot {
        scene_summary,
        objects,
        relationships,
        support_dependencies,
        spatial_clusters,
        accessibility,
        stability,
        insights,
    }
}

fn summarize(snap: &StoreSnapshot) -> SceneSummary {
    let mut class_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut bounds: Option<Aabb> = None;
    for node in snap.nodes.values() {
        *class_counts.entry(node.cls.clone()).or_default() += 1;
        let aabb = node.aabb();
        bounds = Some(match bounds {
            Some(b) => b.union(&aabb),
            None => aabb,
        });
    }
    let mut relation_counts: BTreeMap<String, usize> = BTreeMap::new();
    for key in snap.relations.keys() {
        *relation_counts.entry(key.kind.as_str().to_owned()).or_default() += 1;
    }
    SceneSummary {
        node_count: snap.nodes.len(),
        relation_count: snap.relations.len(),
        class_counts,
        relation_counts,
        bounds,
    }
}

fn object_records(snap: &StoreSnapshot) -> Vec<ObjectRecord> {
    snap.nodes
        .values()
        .map(|n| ObjectRecord {
            id: n.id.clone(),
            name: n.name.clone(),
            cls: n.cls.clone(),
            pos: n.pos,
            size: n.size,
            affordances: n.affordances.iter().cloned().collect(),
            lom: n.lom,
            conf: n.conf,
        })
        .collect()
}

fn relation_records(snap: &StoreSnapshot) -> Vec<RelationRecord> {
    snap.relations
        .values()
        .map(|rel| RelationRecord {
            r: rel.kind.as_str().to_owned(),
            a: rel.a.clone(),
            b: rel.b.clone(),
            props: rel.props.clone(),
            conf: rel.conf,
            type_source: if rel.kind.is_reserved() {
                TypeSource::Reserved
            } else {
                TypeSource::Custom
            },
        })
        .collect()
}

fn support_dependencies(snap: &StoreSnapshot, support: &SupportSystem) -> SupportDependencies {
    let dependents = support
        .dependents()
        .iter()
        .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
        .collect();
    let recursive_dependents = snap
        .nodes
        .keys()
        .filter_map(|id| {
            let all = support.recursive_dependents(id);
            if all.is_empty() {
                None
            } else {
                Some((id.clone(), all.into_iter().collect()))
            }
        })
        .collect();
    SupportDependencies {
        supported_by: support.supported_by().clone(),
        dependents,
        recursive_dependents,
    }
}

/// Union-find over the proximity/resting relations, rooms excluded.
fn clusters(snap: &StoreSnapshot, config: &SceneConfig) -> Vec<Cluster> {
    let ids: Vec<&NodeId> = snap
        .nodes
        .values()
        .filter(|n| !n.is_room())
        .map(|n| &n.id)
        .collect();
    let index: BTreeMap<&NodeId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut parent: Vec<usize> = (0..ids.len()).collect();

    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        if parent[i] != i {
            let root = find(parent, parent[i]);
            parent[i] = root;
        }
        parent[i]
    }

    for key in snap.relations.keys() {
        let joins = matches!(
            key.kind,
            RelKind::Near | RelKind::OnTopOf | RelKind::Supports | RelKind::Beside
        );
        if !joins {
            continue;
        }
        if let (Some(&ia), Some(&ib)) = (index.get(&key.a), index.get(&key.b)) {
            let (ra, rb) = (find(&mut parent, ia), find(&mut parent, ib));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }
    }

    let mut members: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for (i, id) in ids.iter().enumerate() {
        members.entry(find(&mut parent, i)).or_default().push((*id).clone());
    }

    members
        .into_values()
        .filter(|m| m.len() > 1)
        .enumerate()
        .map(|(id, members)| {
            let classes = members
                .iter()
                .filter_map(|m| snap.node(m))
                .map(|n| n.cls.clone())
                .collect::<Vec<_>>();
            Cluster {
                id,
                cluster_type: config.cluster_label(classes.iter().map(String::as_str)),
                members,
            }
        })
        .collect()
}

fn insights(
    summary: &SceneSummary,
    deps: &SupportDependencies,
    clusters: &[Cluster],
    accessibility: &BTreeMap<NodeId, AccessReport>,
    stability: &BTreeMap<NodeId, StabilityReport>,
) -> Vec<String> {
    let mut out = Vec::new();
    out.push(format!(
        "scene holds {} nodes and {} relations",
        summary.node_count, summary.relation_count
    ));
    for (supporter, dependents) in &deps.recursive_dependents {
        if dependents.len() >= 2 {
            out.push(format!("{} objects depend on {supporter}", dependents.len()));
        }
    }
    for cluster in clusters {
        out.push(format!(
            "{} groups {}",
            cluster.cluster_type,
            join_ids(&cluster.members)
        ));
    }
    let risky: Vec<&NodeId> = stability
        .iter()
        .filter(|(_, r)| r.risk != crate::support::StabilityRisk::Low)
        .map(|(id, _)| id)
        .collect();
    if !risky.is_empty() {
        out.push(format!(
            "stability worth watching: {}",
            risky.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
    let blocked: Vec<&NodeId> = accessibility
        .iter()
        .filter(|(_, r)| r.category == crate::support::AccessCategory::Blocked)
        .map(|(id, _)| id)
        .collect();
    if !blocked.is_empty() {
        out.push(format!(
            "hard to reach: {}",
            blocked.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
    out
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Compact context (prompt-builder input)
// ============================================================================

/// Trimmed view around a viewer pose, for external prompt builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactContext {
    /// Objects inside the region of interest, nearest first.
    pub objects: Vec<ObjectRecord>,
    /// Ids of the `k` nearest objects.
    pub nearest: Vec<NodeId>,
    /// Relations among the included objects.
    pub relations: Vec<RelationRecord>,
    /// One-line scene description.
    pub summary: String,
}

/// Builds the compact context: objects within `roi` of `viewer`, the
/// top-`k` nearest, and the relations among them.
pub fn compact_context(
    snap: &StoreSnapshot,
    viewer: &Vec3,
    roi: f64,
    k: usize,
) -> CompactContext {
    let mut in_range: Vec<(&crate::model::Node, f64)> = snap
        .nodes
        .values()
        .filter(|n| !n.is_room())
        .map(|n| (n, n.pos.dist(viewer)))
        .filter(|(_, d)| *d <= roi)
        .collect();
    in_range.sort_by(|(a, da), (b, db)| {
        da.partial_cmp(db).unwrap_or(std::cmp::Ordering::Equal).then(a.id.cmp(&b.id))
    });

    let objects: Vec<ObjectRecord> = in_range
        .iter()
        .map(|(n, _)| ObjectRecord {
            id: n.id.clone(),
            name: n.name.clone(),
            cls: n.cls.clone(),
            pos: n.pos,
            size: n.size,
            affordances: n.affordances.iter().cloned().collect(),
            lom: n.lom,
            conf: n.conf,
        })
        .collect();
    let nearest: Vec<NodeId> = objects.iter().take(k).map(|o| o.id.clone()).collect();
    let included: std::collections::BTreeSet<&NodeId> = objects.iter().map(|o| &o.id).collect();
    let relations: Vec<RelationRecord> = snap
        .relations
        .values()
        .filter(|r| included.contains(&r.a) && included.contains(&r.b))
        .map(|rel| RelationRecord {
            r: rel.kind.as_str().to_owned(),
            a: rel.a.clone(),
            b: rel.b.clone(),
            props: rel.props.clone(),
            conf: rel.conf,
            type_source: if rel.kind.is_reserved() {
                TypeSource::Reserved
            } else {
                TypeSource::Custom
            },
        })
        .collect();
    let summary = format!(
        "{} objects within {roi:.1} of the viewer, {} relations among them",
        objects.len(),
        relations.len()
    );
    CompactContext { objects, nearest, relations, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, Relation};
    use crate::store::SceneStore;

    fn fixture() -> (StoreSnapshot, SupportSystem, SceneConfig) {
        let store = SceneStore::new();
        store
            .load_bootstrap(
                vec![
                    Node::new("kitchen", "room").at(2.5, 2.0, 1.25).sized(5.0, 4.0, 2.5),
                    Node::new("table_1", "table")
                        .at(1.5, 1.5, 0.75)
                        .sized(1.2, 0.8, 0.75)
                        .with_affordance("support")
                        .with_lom(Mobility::Low),
                    Node::new("chair_12", "chair").at(0.9, 1.6, 0.45).sized(0.5, 0.5, 0.9),
                    Node::new("stove", "stove")
                        .at(3.5, 1.0, 0.45)
                        .sized(0.6, 0.6, 0.9)
                        .with_lom(Mobility::Fixed),
                    Node::new("cup_1", "cup").at(1.5, 1.5, 1.2).sized(0.08, 0.08, 0.1),
                ],
                vec![
                    Relation::new(RelKind::Near, "chair_12", "table_1", 0.73),
                    Relation::new(RelKind::Near, "table_1", "chair_12", 0.73),
                    Relation::new(RelKind::OnTopOf, "cup_1", "table_1", 0.95),
                    Relation::new(RelKind::Supports, "table_1", "cup_1", 0.95),
                ],
            )
            .unwrap();
        let mut support = SupportSystem::new();
        let snap = store.snapshot();
        support.rebuild(&snap);
        (snap, support, SceneConfig::default())
    }

    #[test]
    fn test_summary_counts() {
        let (snap, support, config) = fixture();
        let s = assemble(&snap, &support, &config);
        assert_eq!(s.scene_summary.node_count, 5);
        assert_eq!(s.scene_summary.class_counts["room"], 1);
        assert_eq!(s.scene_summary.relation_counts["near"], 2);
        assert_eq!(s.objects.len(), 5);
    }

    #[test]
    fn test_clusters_join_table_group() {
        let (snap, support, config) = fixture();
        let s = assemble(&snap, &support, &config);
        assert_eq!(s.spatial_clusters.len(), 1);
        let cluster = &s.spatial_clusters[0];
        assert_eq!(cluster.cluster_type, "table_group");
        assert_eq!(cluster.members.len(), 3); // chair, cup, table; stove apart
    }

    #[test]
    fn test_snapshot_is_reproducible() {
        let (snap, support, config) = fixture();
        let a = serde_json::to_string(&assemble(&snap, &support, &config)).unwrap();
        let b = serde_json::to_string(&assemble(&snap, &support, &config)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_relationship_records_carry_confidence() {
        let (snap, support, config) = fixture();
        let s = assemble(&snap, &support, &config);
        assert!(s.relationships.iter().all(|r| r.conf > 0.0));
        assert!(s.relationships.iter().all(|r| r.type_source == TypeSource::Reserved));
    }

    #[test]
    fn test_compact_context() {
        let (snap, _, _) = fixture();
        let ctx = compact_context(&snap, &Vec3::new(1.5, 1.5, 0.75), 1.0, 2);
        assert_eq!(ctx.nearest.first().map(|id| id.as_str()), Some("table_1"));
        assert!(ctx.objects.iter().all(|o| o.cls != "room"));
        assert!(ctx.relations.iter().any(|r| r.r == "on_top_of"));
    }
}
