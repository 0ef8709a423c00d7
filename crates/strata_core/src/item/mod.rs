//! Items of the content graph: nodes and properties.

mod id;
mod state;
mod value;

pub use id::{ItemId, NodeId, PropertyId, ROOT_NODE_ID};
pub use state::{ChildNodeEntry, ItemState, NodeState, PropertyState};
pub use value::{PropertyType, Value};
