//! Generic traversal primitives shared by the arena and the builder.
//!
//! Two shapes of walk are needed:
//! - [`map_tree`]: depth-first pre-order transform where every node is mapped
//!   before its children, and the mapped children are handed back to the
//!   parent in child order once they are complete.
//! - [`Traverse`]: a lazy iterator over arena nodes in depth-first pre-order or
//!   breadth-first order. Stopping early is just dropping the iterator.
use std::collections::VecDeque;

use generational_arena::Index;
use tracing::instrument;

use crate::arena::{TreeArena, TreeNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraverseOrder {
    /// Self, then each child's subtree in child order.
    #[default]
    DepthFirst,
    /// Level by level, siblings in child order.
    BreadthFirst,
}

/// Callbacks driving [`map_tree`].
pub trait TreeMap {
    type Node;
    type Output;
    type Error;

    /// Direct children of `node`, in order.
    fn children(&self, node: &Self::Node) -> Result<Vec<Self::Node>, Self::Error>;

    /// Transform a single node. Called before any of its children are visited.
    fn visit(&mut self, node: &Self::Node) -> Result<Self::Output, Self::Error>;

    /// Hand the fully mapped children to their mapped parent.
    fn attach(
        &mut self,
        parent: &mut Self::Output,
        children: Vec<Self::Output>,
    ) -> Result<(), Self::Error>;
}

/// Depth-first pre-order map with child aggregation.
///
/// `attach` is called for every node, also for leaves (with an empty list).
pub fn map_tree<M: TreeMap>(mapper: &mut M, node: &M::Node) -> Result<M::Output, M::Error> {
    let mut output = mapper.visit(node)?;
    let children = mapper.children(node)?;
    let mut mapped = Vec::with_capacity(children.len());
    for child in &children {
        mapped.push(map_tree(mapper, child)?);
    }
    mapper.attach(&mut output, mapped)?;
    Ok(output)
}

pub struct Traverse<'a> {
    arena: &'a TreeArena,
    order: TraverseOrder,
    pending: VecDeque<Index>,
}

impl<'a> Traverse<'a> {
    #[instrument(level = "trace", skip(arena))]
    pub(crate) fn new(arena: &'a TreeArena, start: Index, order: TraverseOrder) -> Self {
        let mut pending = VecDeque::new();
        if arena.node(start).is_some() {
            pending.push_back(start);
        }
        Self {
            arena,
            order,
            pending,
        }
    }
}

impl<'a> Traverse<'a> {
    pub(crate) fn empty(arena: &'a TreeArena) -> Self {
        Self {
            arena,
            order: TraverseOrder::default(),
            pending: VecDeque::new(),
        }
    }
}

impl<'a> Iterator for Traverse<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.pending.pop_front() {
            if let Some(node) = self.arena.node(current_idx) {
                match self.order {
                    TraverseOrder::DepthFirst => {
                        // Push children in reverse order for left-to-right traversal
                        for &child in node.children().iter().rev() {
                            self.pending.push_front(child);
                        }
                    }
                    TraverseOrder::BreadthFirst => {
                        self.pending.extend(node.children().iter().copied());
                    }
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    struct Nested {
        label: &'static str,
        children: Vec<Nested>,
    }

    fn leaf(label: &'static str) -> Nested {
        Nested {
            label,
            children: vec![],
        }
    }

    /// Records visit order and renders `label(child,child)`.
    struct Render {
        visited: Vec<&'static str>,
    }

    impl TreeMap for Render {
        type Node = &'static Nested;
        type Output = String;
        type Error = Infallible;

        fn children(&self, node: &Self::Node) -> Result<Vec<Self::Node>, Infallible> {
            let node: &'static Nested = *node;
            Ok(node.children.iter().collect())
        }

        fn visit(&mut self, node: &Self::Node) -> Result<String, Infallible> {
            self.visited.push(node.label);
            Ok(node.label.to_string())
        }

        fn attach(&mut self, parent: &mut String, children: Vec<String>) -> Result<(), Infallible> {
            if !children.is_empty() {
                parent.push('(');
                parent.push_str(&children.join(","));
                parent.push(')');
            }
            Ok(())
        }
    }

    #[test]
    fn map_tree_visits_parents_first_and_aggregates_children_in_order() {
        let tree: &'static Nested = Box::leak(Box::new(Nested {
            label: "a",
            children: vec![
                Nested {
                    label: "b",
                    children: vec![leaf("d")],
                },
                leaf("c"),
            ],
        }));
        let mut render = Render { visited: vec![] };

        let out = map_tree(&mut render, &tree).unwrap();

        assert_eq!(out, "a(b(d),c)");
        assert_eq!(render.visited, vec!["a", "b", "d", "c"]);
    }
}
