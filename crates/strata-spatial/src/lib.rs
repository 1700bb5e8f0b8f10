//! Spatial hierarchy model: Morton-keyed node identities, bounding volumes,
//! camera/frustum, and the flat-arena tree the streaming scheduler walks.

mod bounds;
mod camera;
mod key;
mod node;
mod tree;

pub use bounds::BoundingVolume;
pub use camera::{Camera, Frustum};
pub use key::{Arity, GridAddress, NodeKey};
pub use node::{ContentDescriptor, Refine, SpatialNode};
pub use tree::{Tree, TreeError, TreeKind};
