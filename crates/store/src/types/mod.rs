mod ids;
mod object_type;
mod timestamp;
mod tree_path;

pub use ids::{BlobId, NodeId, OwnerId};
pub use object_type::{ObjectType, UnknownObjectType};
pub use timestamp::Timestamp;
pub use tree_path::{PathError, TreePath};
