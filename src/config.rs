//! Runtime configuration.
//!
//! Per-class agent variation lives here as data (a profile table keyed by
//! class tag), not in a type hierarchy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::topo::TopoParams;

/// Recognized tuning options and their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Radius within which an agent considers neighbors.
    pub perception_radius: f64,
    /// `near` cutoff; `far` saturates at twice this.
    pub tau_near: f64,
    /// Maximum face gap for a resting contact.
    pub tau_contact: f64,
    /// Minimum confidence before an agent proposes a relation.
    pub tau_propose: f64,
    /// Minimum confidence for the receiving agent to accept.
    pub tau_accept: f64,
    /// Minimum confidence of a contradicting candidate before the old
    /// relation is removed.
    pub tau_supersede: f64,
    /// Wall-time budget per tick; overruns commit anyway and log an event.
    pub tick_budget_ms: u64,
    /// Propagate rotations to dependents (translations always cascade).
    /// Currently surfaces a `CascadeUnresolved` warning instead.
    pub cascade_rotation: bool,
    /// Cluster labeling heuristics, first match wins.
    pub cluster_rules: Vec<ClusterRule>,
    /// Per-class agent overrides.
    pub profiles: BTreeMap<String, AgentProfile>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            perception_radius: 1.5,
            tau_near: 0.75,
            tau_contact: 0.05,
            tau_propose: 0.5,
            tau_accept: 0.6,
            tau_supersede: 0.55,
            tick_budget_ms: 100,
            cascade_rotation: false,
            cluster_rules: ClusterRule::defaults(),
            profiles: default_profiles(),
        }
    }
}

impl SceneConfig {
    pub fn topo_params(&self) -> TopoParams {
        TopoParams {
            tau_near: self.tau_near,
            tau_contact: self.tau_contact,
        }
    }

    /// Whether nodes of `cls` run an agent at all.
    pub fn negotiates(&self, cls: &str) -> bool {
        self.profiles.get(cls).map_or(true, |p| p.negotiates)
    }

    /// Effective perception radius for `cls`.
    pub fn perception_radius_for(&self, cls: &str) -> f64 {
        self.profiles
            .get(cls)
            .and_then(|p| p.perception_radius)
            .unwrap_or(self.perception_radius)
    }

    /// Cluster label for a set of member classes, first matching rule wins.
    pub fn cluster_label<'a>(&self, classes: impl Iterator<Item = &'a str> + Clone) -> String {
        for rule in &self.cluster_rules {
            if classes.clone().any(|c| rule.classes.iter().any(|rc| rc == c)) {
                return rule.label.clone();
            }
        }
        "object_group".to_owned()
    }
}

/// Per-class agent behavior overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub negotiates: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perception_radius: Option<f64>,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self { negotiates: true, perception_radius: None }
    }
}

fn default_profiles() -> BTreeMap<String, AgentProfile> {
    // Rooms hold geometry but do not negotiate relations.
    let mut profiles = BTreeMap::new();
    profiles.insert(
        "room".to_owned(),
        AgentProfile { negotiates: false, perception_radius: None },
    );
    profiles
}

/// One cluster labeling heuristic: if any member's class is listed, the
/// cluster gets `label`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRule {
    pub classes: Vec<String>,
    pub label: String,
}

impl ClusterRule {
    pub fn defaults() -> Vec<ClusterRule> {
        vec![
            ClusterRule {
                classes: vec!["table".into()],
                label: "table_group".into(),
            },
            ClusterRule {
                classes: vec!["stove".into(), "oven".into()],
                label: "cooking_area".into(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SceneConfig::default();
        assert_eq!(cfg.perception_radius, 1.5);
        assert_eq!(cfg.tau_accept, 0.6);
        assert!(!cfg.negotiates("room"));
        assert!(cfg.negotiates("cup"));
    }

    #[test]
    fn test_cluster_rules_first_match_wins() {
        let cfg = SceneConfig::default();
        assert_eq!(cfg.cluster_label(["cup", "table"].into_iter()), "table_group");
        assert_eq!(cfg.cluster_label(["pan", "stove"].into_iter()), "cooking_area");
        assert_eq!(cfg.cluster_label(["cup", "book"].into_iter()), "object_group");
    }

    #[test]
    fn test_profile_radius_override() {
        let mut cfg = SceneConfig::default();
        cfg.profiles.insert(
            "robot".into(),
            AgentProfile { negotiates: true, perception_radius: Some(4.0) },
        );
        assert_eq!(cfg.perception_radius_for("robot"), 4.0);
        assert_eq!(cfg.perception_radius_for("cup"), 1.5);
    }

    #[test]
    fn test_config_from_json() {
        let cfg: SceneConfig = serde_json::from_str(r#"{"tau_near": 1.0}"#).unwrap();
        assert_eq!(cfg.tau_near, 1.0);
        assert_eq!(cfg.tick_budget_ms, 100);
    }
}
