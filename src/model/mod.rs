//! # Scene Graph Model
//!
//! Clean DTOs shared by every layer: store ↔ agents ↔ analyzer ↔ answers.
//!
//! Design rule: this module is pure data — no I/O, no locks, no async.

pub mod geom;
pub mod node;
pub mod property_map;
pub mod relation;
pub mod value;

pub use geom::{Aabb, Quat, Vec3};
pub use node::{Mobility, Node, NodeId};
pub use property_map::PropertyMap;
pub use relation::{RelKey, RelKind, Relation};
pub use value::Value;
