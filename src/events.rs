//! Change notifications emitted by [`TreeArena`](crate::arena::TreeArena).
//!
//! Events carry node ids rather than handles: listeners run while the arena is
//! mutably borrowed and cannot look nodes up anyway.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// Nodes were appended to `parent`, in this order.
    ChildrenAdded { parent: String, ids: Vec<String> },
    /// A single node was spliced into `parent` at `index`.
    ChildInserted {
        parent: String,
        id: String,
        index: usize,
    },
    /// Direct children were detached from `parent`, in removal order.
    ChildrenRemoved { parent: String, ids: Vec<String> },
    /// `key` is `None` when the whole mapping was replaced.
    MetaChanged { id: String, key: Option<String> },
    NodesDisposed { ids: Vec<String> },
}
