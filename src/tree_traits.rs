use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::arena::{TreeArena, TreeNode};

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

/// Display label: the id, followed by the meta as compact JSON when present.
fn label(node: &TreeNode) -> String {
    if node.meta().is_empty() {
        node.id().to_string()
    } else {
        format!(
            "{} {}",
            node.id(),
            serde_json::Value::Object(node.meta().clone())
        )
    }
}

impl TreeArena {
    /// Text rendering of the subtree at `idx`.
    #[instrument(level = "debug", skip(self))]
    pub fn subtree_to_tree_string(&self, idx: Index) -> Tree<String> {
        fn build_tree(arena: &TreeArena, node_idx: Index, parent_tree: &mut Tree<String>) {
            if let Some(node) = arena.node(node_idx) {
                for &child_idx in node.children() {
                    if let Some(child) = arena.node(child_idx) {
                        let mut child_tree = Tree::new(label(child));
                        build_tree(arena, child_idx, &mut child_tree);
                        parent_tree.push(child_tree);
                    }
                }
            }
        }

        match self.node(idx) {
            Some(node) => {
                let mut tree = Tree::new(label(node));
                build_tree(self, idx, &mut tree);
                tree
            }
            None => Tree::new("Empty tree".to_string()),
        }
    }
}

impl TreeNodeConvert for TreeArena {
    fn to_tree_string(&self) -> Tree<String> {
        match self.root() {
            Some(root) => self.subtree_to_tree_string(root),
            None => Tree::new("Empty tree".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_ids_and_meta_in_child_order() {
        let arena = TreeArena::from_json(&json!({
            "id": "A",
            "children": [{ "id": "B", "name": "b" }, { "id": "C" }]
        }))
        .unwrap();

        let rendered = arena.to_tree_string().to_string();

        assert_eq!(
            rendered.lines().collect::<Vec<_>>(),
            vec!["A", "├── B {\"name\":\"b\"}", "└── C"]
        );
    }

    #[test]
    fn empty_arena_renders_placeholder() {
        assert_eq!(
            TreeArena::new().to_tree_string().to_string().trim_end(),
            "Empty tree"
        );
    }
}
