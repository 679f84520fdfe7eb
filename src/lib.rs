//! Mutable, observable tree of identified nodes.
//!
//! Nodes live in a [`TreeArena`] and are addressed by [`Index`] handles. Every
//! structural edit goes through the arena, which keeps parent and child links
//! consistent, keeps ids unique, and notifies listeners registered with
//! [`TreeArena::on_change`]. [`TreeBuilder`] turns plain nested JSON into a
//! tree and [`TreeArena::tree_json`] turns it back.
//!
//! ```
//! use serde_json::json;
//! use treemodel::TreeArena;
//!
//! let mut tree = TreeArena::from_json(&json!({
//!     "id": "A",
//!     "children": [{ "id": "B" }, { "id": "C" }]
//! }))?;
//! let root = tree.root().unwrap();
//! tree.remove_children(root, &["B"]);
//! assert_eq!(tree.tree_json(root), json!({
//!     "id": "A",
//!     "children": [{ "id": "C", "children": [] }]
//! }));
//! # Ok::<(), treemodel::TreeError>(())
//! ```

pub mod arena;
pub mod builder;
pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod exitcode;
pub mod traverse;
pub mod tree_traits;
pub mod util;

pub use arena::{Meta, TreeArena, TreeNode};
pub use builder::TreeBuilder;
pub use errors::{TreeError, TreeResult};
pub use events::TreeEvent;
pub use generational_arena::Index;
pub use traverse::TraverseOrder;
