//! # Question Dispatcher
//!
//! Rule-based classification plus per-category handlers over the spatial
//! snapshot. Every category except `complex` is answered locally; the
//! `complex` catch-all is what an external language layer may take over,
//! given the snapshot.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SceneConfig;
use crate::context::{self, SpatialSnapshot};
use crate::model::{NodeId, RelKind};
use crate::store::{Stamp, StoreSnapshot};
use crate::support::{AccessCategory, SupportSystem};

/// A structured answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_type: QuestionType,
    pub answer_text: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    WhatIf,
    Stability,
    Accessibility,
    Relationship,
    Location,
    General,
    Complex,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::WhatIf => "what_if",
            QuestionType::Stability => "stability",
            QuestionType::Accessibility => "accessibility",
            QuestionType::Relationship => "relationship",
            QuestionType::Location => "location",
            QuestionType::General => "general",
            QuestionType::Complex => "complex",
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

const WHAT_IF: &[&str] = &["what if", "happens if", "if i remove", "if we remove", "if you remove"];
const STABILITY: &[&str] = &["stable", "stability", "fall", "tip", "collapse", "depend", "support"];
const ACCESSIBILITY: &[&str] = &["reach", "access", "grab", "get to", "easily", "easy to"];
const RELATIONSHIP: &[&str] =
    &["relation", "related", "next to", "near", "on top", "beside", "close to", "touching"];
const LOCATION: &[&str] = &["where", "location", "position", "locate", "find"];
const GENERAL: &[&str] =
    &["describe", "summary", "summarize", "overview", "how many", "what is in", "what's in", "scene"];

/// Keyword classification; when several sets match, the earlier category
/// in the priority order wins.
pub fn classify(question: &str) -> QuestionType {
    let q = question.to_lowercase();
    let matches = |set: &[&str]| set.iter().any(|kw| q.contains(kw));
    if matches(WHAT_IF) {
        QuestionType::WhatIf
    } else if matches(STABILITY) {
        QuestionType::Stability
    } else if matches(ACCESSIBILITY) {
        QuestionType::Accessibility
    } else if matches(RELATIONSHIP) {
        QuestionType::Relationship
    } else if matches(LOCATION) {
        QuestionType::Location
    } else if matches(GENERAL) {
        QuestionType::General
    } else {
        QuestionType::Complex
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct QuestionDispatcher {
    config: SceneConfig,
}

impl QuestionDispatcher {
    pub fn new(config: SceneConfig) -> Self {
        Self { config }
    }

    /// Classifies and answers a question against the current scene.
    pub fn answer(
        &self,
        question: &str,
        snap: &StoreSnapshot,
        support: &SupportSystem,
    ) -> Answer {
        let question_type = classify(question);
        debug!(?question_type, question, "dispatching question");
        let spatial = context::assemble(snap, support, &self.config);
        let mentioned = mentioned_objects(question, snap);

        match question_type {
            QuestionType::WhatIf => self.answer_what_if(&mentioned, snap, support),
            QuestionType::Stability => answer_stability(&mentioned, &spatial, support),
            QuestionType::Accessibility => answer_accessibility(&spatial),
            QuestionType::Relationship => answer_relationship(&mentioned, &spatial),
            QuestionType::Location => answer_location(&mentioned, &spatial),
            QuestionType::General => answer_general(&spatial),
            QuestionType::Complex => answer_complex(&spatial),
        }
    }

    /// Simulates the removal cascade on the snapshot without mutating the
    /// live store.
    fn answer_what_if(
        &self,
        mentioned: &[NodeId],
        snap: &StoreSnapshot,
        support: &SupportSystem,
    ) -> Answer {
        let Some(target) = mentioned.iter().find(|id| {
            snap.node(id).is_some_and(|n| !n.is_room())
        }) else {
            return Answer {
                question_type: QuestionType::WhatIf,
                answer_text: "I could not tell which object the question is about.".into(),
                confidence: 0.3,
                evidence: vec![],
            };
        };

        let plan = support.plan_removal(
            snap,
            target,
            &self.config.topo_params(),
            &Stamp::new(0, "what-if"),
        );

        let mut lines = vec![format!("Removing {target} would have these consequences:")];
        let mut evidence = Vec::new();
        if plan.lost_support.is_empty() && plan.fallen.is_empty() {
            lines.push("no other object depends on it.".into());
        }
        for (node, supporter) in &plan.lost_support {
            lines.push(format!("{node} loses its support from {supporter} but stays in place (fixed)."));
            evidence.push(format!("lost_support: {node}"));
        }
        for (node, new_z) in &plan.fallen {
            if plan.to_floor.contains(node) {
                lines.push(format!("{node} loses support and falls to the floor (z = 0)."));
            } else {
                lines.push(format!("{node} drops to z = {new_z:.2}."));
            }
            evidence.push(format!("falls: {node} -> z {new_z:.2}"));
        }
        for (node, reason) in &plan.unresolved {
            lines.push(format!("{node} could not be re-settled automatically ({reason})."));
            evidence.push(format!("unresolved: {node}"));
        }
        if !plan.vanished.is_empty() {
            let gone: Vec<String> = plan.vanished.iter().map(|k| k.to_string()).collect();
            lines.push(format!("These relations vanish: {}.", gone.join(", ")));
            evidence.extend(gone.into_iter().map(|k| format!("vanishes: {k}")));
        }

        // 0.9 when every affected node is movable, 0.7 otherwise.
        let confidence = if plan.lost_support.is_empty() { 0.9 } else { 0.7 };
        Answer {
            question_type: QuestionType::WhatIf,
            answer_text: lines.join("\n"),
            confidence,
            evidence,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn answer_relationship(mentioned: &[NodeId], spatial: &SpatialSnapshot) -> Answer {
    let relevant: Vec<_> = spatial
        .relationships
        .iter()
        .filter(|r| {
            mentioned.is_empty() || mentioned.contains(&r.a) || mentioned.contains(&r.b)
        })
        .collect();

    if relevant.is_empty() {
        return Answer {
            question_type: QuestionType::Relationship,
            answer_text: "No matching spatial relations are currently known.".into(),
            confidence: 1.0,
            evidence: vec![],
        };
    }

    let mut lines = Vec::new();
    let mut evidence = Vec::new();
    let mut confidence: f64 = 1.0;
    for rel in &relevant {
        let mut line = format!("{} is {} {}", rel.a, describe_kind(&rel.r), rel.b);
        if let Some(dist) = rel.props.get("dist").and_then(|v| v.as_float()) {
            line.push_str(&format!(" (distance {dist:.2})"));
        }
        line.push_str(&format!(" [confidence {:.2}]", rel.conf));
        lines.push(line);
        evidence.push(format!("{}({}, {}) conf {:.2}", rel.r, rel.a, rel.b, rel.conf));
        confidence = confidence.min(rel.conf);
    }
    Answer {
        question_type: QuestionType::Relationship,
        answer_text: lines.join("\n"),
        confidence,
        evidence,
    }
}

fn answer_location(mentioned: &[NodeId], spatial: &SpatialSnapshot) -> Answer {
    let objects: Vec<_> = spatial
        .objects
        .iter()
        .filter(|o| o.cls != "room" && (mentioned.is_empty() || mentioned.contains(&o.id)))
        .collect();

    if objects.is_empty() {
        return Answer {
            question_type: QuestionType::Location,
            answer_text: "No matching object found in the scene.".into(),
            confidence: 0.5,
            evidence: vec![],
        };
    }

    let mut lines = Vec::new();
    let mut evidence = Vec::new();
    let mut confidence: f64 = 1.0;
    for obj in &objects {
        let cluster = spatial
            .spatial_clusters
            .iter()
            .find(|c| c.members.contains(&obj.id))
            .map(|c| format!(", part of the {}", c.cluster_type))
            .unwrap_or_default();
        lines.push(format!(
            "{} is at ({:.2}, {:.2}, {:.2}){cluster}",
            obj.id, obj.pos.x, obj.pos.y, obj.pos.z
        ));
        evidence.push(format!("{} @ ({}, {}, {})", obj.id, obj.pos.x, obj.pos.y, obj.pos.z));
        confidence = confidence.min(obj.conf);
    }
    Answer {
        question_type: QuestionType::Location,
        answer_text: lines.join("\n"),
        confidence,
        evidence,
    }
}

fn answer_accessibility(spatial: &SpatialSnapshot) -> Answer {
    let mut reachable = Vec::new();
    let mut limited = Vec::new();
    let mut blocked = Vec::new();
    for (id, report) in &spatial.accessibility {
        match report.category {
            AccessCategory::Reachable => reachable.push(id.as_str()),
            AccessCategory::Limited => limited.push(id.as_str()),
            AccessCategory::Blocked => blocked.push(id.as_str()),
        }
    }
    let mut lines = Vec::new();
    if reachable.is_empty() {
        lines.push("Nothing is easily reachable right now.".to_owned());
    } else {
        lines.push(format!("Easily reachable: {}.", reachable.join(", ")));
    }
    if !limited.is_empty() {
        lines.push(format!("Reachable with effort: {}.", limited.join(", ")));
    }
    if !blocked.is_empty() {
        lines.push(format!("Blocked: {}.", blocked.join(", ")));
    }
    let evidence = spatial
        .accessibility
        .iter()
        .map(|(id, r)| format!("{id}: score {:.2} ({})", r.score, r.category.as_str()))
        .collect();
    Answer {
        question_type: QuestionType::Accessibility,
        answer_text: lines.join("\n"),
        confidence: 1.0,
        evidence,
    }
}

fn answer_stability(
    mentioned: &[NodeId],
    spatial: &SpatialSnapshot,
    support: &SupportSystem,
) -> Answer {
    let mut lines = Vec::new();
    let mut evidence = Vec::new();

    for (id, report) in &spatial.stability {
        if report.risk != crate::support::StabilityRisk::Low {
            lines.push(format!(
                "{id} sits on a support chain of depth {} ({} risk)",
                report.chain_depth,
                report.risk.as_str()
            ));
        }
        evidence.push(format!(
            "{id}: depth {}, {} risk",
            report.chain_depth,
            report.risk.as_str()
        ));
    }
    if lines.is_empty() {
        lines.push("All support chains are shallow; nothing looks precarious.".into());
    }

    for id in mentioned {
        let dependents = support.recursive_dependents(id);
        if dependents.is_empty() {
            lines.push(format!("Nothing rests on {id}."));
        } else {
            let names: Vec<&str> = dependents.iter().map(NodeId::as_str).collect();
            lines.push(format!("Resting on {id}: {}.", names.join(", ")));
        }
    }

    Answer {
        question_type: QuestionType::Stability,
        answer_text: lines.join("\n"),
        confidence: 1.0,
        evidence,
    }
}

fn answer_general(spatial: &SpatialSnapshot) -> Answer {
    let summary = &spatial.scene_summary;
    let classes: Vec<String> = summary
        .class_counts
        .iter()
        .map(|(cls, n)| format!("{n} {cls}"))
        .collect();
    let mut lines = vec![format!(
        "The scene contains {} nodes ({}) linked by {} relations.",
        summary.node_count,
        classes.join(", "),
        summary.relation_count
    )];
    lines.extend(spatial.insights.iter().take(4).cloned());
    Answer {
        question_type: QuestionType::General,
        answer_text: lines.join("\n"),
        confidence: 1.0,
        evidence: spatial.insights.clone(),
    }
}

fn answer_complex(spatial: &SpatialSnapshot) -> Answer {
    Answer {
        question_type: QuestionType::Complex,
        answer_text: format!(
            "This question needs external reasoning. Scene context: {} nodes, {} relations.",
            spatial.scene_summary.node_count, spatial.scene_summary.relation_count
        ),
        confidence: 0.2,
        evidence: spatial.insights.clone(),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn describe_kind(kind: &str) -> &str {
    match RelKind::from(kind.to_owned()) {
        RelKind::Near => "near",
        RelKind::Far => "far from",
        RelKind::OnTopOf => "on top of",
        RelKind::Supports => "supporting",
        RelKind::Beside => "beside",
        RelKind::Above => "above",
        RelKind::Below => "below",
        RelKind::In => "in",
        RelKind::Custom(_) => "related to",
    }
}

/// Nodes whose id, name or class appears in the question, id-ordered.
fn mentioned_objects(question: &str, snap: &StoreSnapshot) -> Vec<NodeId> {
    let q = question.to_lowercase();
    snap.nodes
        .values()
        .filter(|n| {
            q.contains(&n.id.as_str().to_lowercase())
                || q.contains(&n.name.to_lowercase())
                || q.contains(&n.cls.to_lowercase())
        })
        .map(|n| n.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classification_priority() {
        assert_eq!(classify("What if I remove the table?"), QuestionType::WhatIf);
        assert_eq!(classify("Is the stack stable?"), QuestionType::Stability);
        assert_eq!(classify("Which objects can I easily reach?"), QuestionType::Accessibility);
        assert_eq!(classify("What is near the table?"), QuestionType::Relationship);
        assert_eq!(classify("Where is the cup?"), QuestionType::Location);
        assert_eq!(classify("Describe the scene"), QuestionType::General);
        assert_eq!(classify("Why is the kitchen cozy?"), QuestionType::Complex);
    }

    #[test]
    fn test_what_if_beats_stability_keywords() {
        // Contains "support" too, but the what-if phrasing wins.
        assert_eq!(
            classify("What if I remove the shelf that supports the vase?"),
            QuestionType::WhatIf
        );
    }
}
