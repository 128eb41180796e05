pub mod avl_tree;
pub mod list;
pub mod set;

pub use avl_tree::AvlTree;
pub use avl_tree::NodeSnapshot;
pub use list::List;
pub use set::Set;
