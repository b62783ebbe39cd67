//! Relation (typed directed edge) in the scene graph.

use serde::{Deserialize, Serialize};

use super::{NodeId, PropertyMap, Value};
use crate::store::Stamp;

/// Relation type tag.
///
/// The reserved set is closed; everything else travels through `Custom`
/// so external layers can annotate the graph without touching the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelKind {
    Near,
    Far,
    OnTopOf,
    Supports,
    Beside,
    Above,
    Below,
    In,
    Custom(String),
}

impl RelKind {
    pub fn as_str(&self) -> &str {
        match self {
            RelKind::Near => "near",
            RelKind::Far => "far",
            RelKind::OnTopOf => "on_top_of",
            RelKind::Supports => "supports",
            RelKind::Beside => "beside",
            RelKind::Above => "above",
            RelKind::Below => "below",
            RelKind::In => "in",
            RelKind::Custom(s) => s,
        }
    }

    pub fn is_reserved(&self) -> bool {
        !matches!(self, RelKind::Custom(_))
    }

    /// Resting relations drive the support indices.
    pub fn is_resting(&self) -> bool {
        matches!(self, RelKind::OnTopOf | RelKind::Supports)
    }
}

impl From<String> for RelKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "near" => RelKind::Near,
            "far" => RelKind::Far,
            "on_top_of" => RelKind::OnTopOf,
            "supports" => RelKind::Supports,
            "beside" => RelKind::Beside,
            "above" => RelKind::Above,
            "below" => RelKind::Below,
            "in" => RelKind::In,
            _ => RelKind::Custom(s),
        }
    }
}

impl From<RelKind> for String {
    fn from(k: RelKind) -> Self {
        k.as_str().to_owned()
    }
}

impl std::fmt::Display for RelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity key of a relation: the `(type, a, b)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelKey {
    pub kind: RelKind,
    pub a: NodeId,
    pub b: NodeId,
}

impl RelKey {
    pub fn new(kind: RelKind, a: impl Into<NodeId>, b: impl Into<NodeId>) -> Self {
        Self { kind, a: a.into(), b: b.into() }
    }

    /// The key of the directed twin, for the resting pair
    /// `on_top_of(a,b) ↔ supports(b,a)`. `None` for everything else.
    pub fn twin(&self) -> Option<RelKey> {
        match self.kind {
            RelKind::OnTopOf => Some(RelKey {
                kind: RelKind::Supports,
                a: self.b.clone(),
                b: self.a.clone(),
            }),
            RelKind::Supports => Some(RelKey {
                kind: RelKind::OnTopOf,
                a: self.b.clone(),
                b: self.a.clone(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}, {})", self.kind, self.a, self.b)
    }
}

/// A committed relation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelKind,
    pub a: NodeId,
    pub b: NodeId,
    /// Extra geometry facts (`dist`, `height_diff`, …).
    pub props: PropertyMap,
    /// Confidence in [0, 1].
    pub conf: f64,
    /// Commit stamp of the writing patch.
    pub stamp: Stamp,
}

impl Relation {
    pub fn new(kind: RelKind, a: impl Into<NodeId>, b: impl Into<NodeId>, conf: f64) -> Self {
        Self {
            kind,
            a: a.into(),
            b: b.into(),
            props: PropertyMap::new(),
            conf,
            stamp: Stamp::zero(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> RelKey {
        RelKey {
            kind: self.kind.clone(),
            a: self.a.clone(),
            b: self.b.clone(),
        }
    }

    /// The inverse record of a resting relation, sharing confidence and
    /// props. `None` for non-resting kinds.
    pub fn twin(&self) -> Option<Relation> {
        let twin_kind = match self.kind {
            RelKind::OnTopOf => RelKind::Supports,
            RelKind::Supports => RelKind::OnTopOf,
            _ => return None,
        };
        Some(Relation {
            kind: twin_kind,
            a: self.b.clone(),
            b: self.a.clone(),
            props: self.props.clone(),
            conf: self.conf,
            stamp: self.stamp.clone(),
        })
    }
}
