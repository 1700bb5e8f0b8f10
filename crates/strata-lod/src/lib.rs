//! Adaptive level-of-detail streaming: per-frame traversal of a spatial
//! hierarchy and the tile lifecycle state machine that turns traversal output
//! into load, cancel and evict actions.

mod manager;
mod priority_queue;
mod status;
mod traverser;

pub use manager::{FrameStats, ManagerConfig, Renderer, TileManager};
pub use priority_queue::PriorityQueue;
pub use status::{Residency, TileFlags, TileStatus};
pub use traverser::{StopRule, TraversalBudget, Traverser, Visit};
