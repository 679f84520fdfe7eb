use std::collections::{BTreeMap, HashMap, HashSet};
use std::convert::Infallible;
use std::fmt;
use std::iter;

use generational_arena::{Arena, Index};
use itertools::Itertools;
use serde_json::{Map, Value};
use tracing::{debug, instrument, trace};

use crate::errors::{TreeError, TreeResult};
use crate::events::TreeEvent;
use crate::traverse::{map_tree, Traverse, TraverseOrder, TreeMap};

/// Arbitrary JSON payload attached to a node. Key order is insertion order.
pub type Meta = Map<String, Value>;

/// Keys understood by [`TreeArena::find_node_projection`].
pub const PROJECTION_KEYS: [&str; 4] = ["id", "meta", "parent", "children"];

/// Tree node in the arena-based hierarchy structure.
///
/// Structural fields are private: `parent` and `children` only change through
/// [`TreeArena`] operations, which keep both sides of every link in sync.
#[derive(Debug, Clone)]
pub struct TreeNode {
    id: String,
    meta: Meta,
    /// Index of parent node in the arena, None for root nodes
    parent: Option<Index>,
    /// Indices of child nodes in the arena
    children: Vec<Index>,
}

impl TreeNode {
    fn new(id: String, meta: Meta) -> Self {
        Self {
            id,
            meta,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn parent(&self) -> Option<Index> {
        self.parent
    }

    pub fn children(&self) -> &[Index] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

type Listener = Box<dyn FnMut(&TreeEvent)>;

/// Arena-based tree structure holding one or more node hierarchies.
///
/// Every node lives in a generational arena and is addressed by its [`Index`].
/// Ids are unique across the whole arena, so a subtree built or detached here
/// can always be attached to any other node of the same arena without
/// clashing. Detached subtrees stay in the arena until re-attached or
/// released with [`TreeArena::dispose`].
pub struct TreeArena {
    /// Arena storage for all tree nodes
    arena: Arena<TreeNode>,
    /// Node id registry
    ids: HashMap<String, Index>,
    /// First node created in this arena; `root()` reports its topmost ancestor
    root: Option<Index>,
    next_listener_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

impl fmt::Debug for TreeArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeArena")
            .field("arena", &self.arena)
            .field("root", &self.root)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for TreeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeArena {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            ids: HashMap::new(),
            root: None,
            next_listener_id: 1,
            listeners: BTreeMap::new(),
        }
    }

    /// Creates a detached node. The first node of an empty arena becomes its root.
    #[instrument(level = "trace", skip(self, id, meta))]
    pub fn create_node(&mut self, id: impl Into<String>, meta: Meta) -> TreeResult<Index> {
        let id = id.into();
        if self.ids.contains_key(&id) {
            return Err(TreeError::DuplicateId(id));
        }
        let node_idx = self.arena.insert(TreeNode::new(id.clone(), meta));
        trace!(%id, ?node_idx, "created node");
        self.ids.insert(id, node_idx);
        if self.root.is_none() {
            self.root = Some(node_idx);
        }
        Ok(node_idx)
    }

    pub fn node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    /// Looks an id up anywhere in the arena, attached or not.
    pub fn get_by_id(&self, id: &str) -> Option<Index> {
        self.ids.get(id).copied()
    }

    pub fn parent(&self, idx: Index) -> Option<Index> {
        self.arena.get(idx).and_then(|node| node.parent)
    }

    /// Topmost ancestor of the arena's first node.
    ///
    /// When that tree is disposed, a surviving parentless node takes over.
    /// Which one is unspecified when several detached trees remain.
    pub fn root(&self) -> Option<Index> {
        self.root
            .map(|root| self.ancestors_and_self(root).last().unwrap_or(root))
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> Traverse<'_> {
        match self.root() {
            Some(root) => self.iter_from(root, TraverseOrder::DepthFirst),
            None => Traverse::empty(self),
        }
    }

    pub fn iter_from(&self, start: Index, order: TraverseOrder) -> Traverse<'_> {
        Traverse::new(self, start, order)
    }

    pub fn iter_postorder(&self, start: Index) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self, start)
    }

    // ---------------------------------------------------------------------
    // Derived views
    // ---------------------------------------------------------------------

    pub fn children_ids(&self, node: Index) -> Vec<String> {
        self.arena
            .get(node)
            .map(|n| {
                n.children
                    .iter()
                    .filter_map(|&child| self.arena.get(child))
                    .map(|child| child.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_root(&self, node: Index) -> bool {
        self.arena.get(node).is_some_and(TreeNode::is_root)
    }

    /// Every node of the subtree at `node`, in pre-order.
    #[instrument(level = "trace", skip(self))]
    pub fn all_nodes(&self, node: Index) -> Vec<Index> {
        self.iter_from(node, TraverseOrder::DepthFirst)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// `{ id, ...meta, children: [...] }` for the subtree at `node`.
    ///
    /// `children` is always present. Meta keys named `id` or `children` are
    /// shadowed by the structural fields. A stale handle yields `null`.
    #[instrument(level = "trace", skip(self))]
    pub fn tree_json(&self, node: Index) -> Value {
        if self.arena.get(node).is_none() {
            return Value::Null;
        }
        match map_tree(&mut JsonProjection { arena: self }, &node) {
            Ok(json) => Value::Object(json),
            Err(never) => match never {},
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Breadth-first search of the subtree at `from`, `from` included.
    #[instrument(level = "debug", skip(self))]
    pub fn find_node_by_id(&self, from: Index, id: &str) -> Option<Index> {
        if id.is_empty() {
            return None;
        }
        let found = self
            .iter_from(from, TraverseOrder::BreadthFirst)
            .find(|(_, node)| node.id == id)
            .map(|(idx, _)| idx);
        debug!(found = found.is_some(), "find_node_by_id");
        found
    }

    /// Like [`find_node_by_id`](Self::find_node_by_id) but returns a plain
    /// projection limited to `keys` (see [`PROJECTION_KEYS`]).
    ///
    /// Unknown keys are skipped; an empty key list selects every key.
    #[instrument(level = "debug", skip(self, keys))]
    pub fn find_node_projection<S: AsRef<str>>(
        &self,
        from: Index,
        id: &str,
        keys: &[S],
    ) -> Option<Meta> {
        let idx = self.find_node_by_id(from, id)?;
        self.projection(idx, keys)
    }

    fn projection<S: AsRef<str>>(&self, idx: Index, keys: &[S]) -> Option<Meta> {
        let node = self.arena.get(idx)?;
        let field = |key: &str| -> Option<Value> {
            match key {
                "id" => Some(Value::String(node.id.clone())),
                "meta" => Some(Value::Object(node.meta.clone())),
                "parent" => Some(
                    node.parent
                        .and_then(|p| self.arena.get(p))
                        .map_or(Value::Null, |p| Value::String(p.id.clone())),
                ),
                "children" => Some(Value::Array(
                    self.children_ids(idx).into_iter().map(Value::String).collect(),
                )),
                _ => None,
            }
        };
        let wanted: Vec<&str> = if keys.is_empty() {
            PROJECTION_KEYS.to_vec()
        } else {
            keys.iter().map(|key| key.as_ref()).collect()
        };
        Some(
            wanted
                .into_iter()
                .filter_map(|key| field(key).map(|value| (key.to_string(), value)))
                .collect(),
        )
    }

    /// Position of the direct child `id` under `parent`.
    pub fn index_of_child(&self, parent: Index, id: &str) -> Option<usize> {
        if id.is_empty() {
            return None;
        }
        self.arena.get(parent)?.children.iter().position(|&child| {
            self.arena
                .get(child)
                .is_some_and(|node| node.id == id)
        })
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Merges a single key into the node's meta, keeping all other keys.
    #[instrument(level = "debug", skip(self, value))]
    pub fn upsert_meta(&mut self, node: Index, key: &str, value: Value) -> TreeResult<()> {
        let target = self.require_mut(node)?;
        target.meta.insert(key.to_string(), value);
        let id = target.id.clone();
        self.emit(TreeEvent::MetaChanged {
            id,
            key: Some(key.to_string()),
        });
        Ok(())
    }

    /// Replaces the node's meta wholesale.
    #[instrument(level = "debug", skip(self, meta))]
    pub fn set_meta(&mut self, node: Index, meta: Meta) -> TreeResult<()> {
        let target = self.require_mut(node)?;
        target.meta = meta;
        let id = target.id.clone();
        self.emit(TreeEvent::MetaChanged { id, key: None });
        Ok(())
    }

    pub fn add_child(&mut self, parent: Index, node: Index) -> TreeResult<()> {
        self.add_children(parent, &[node])
    }

    /// Appends `nodes` to `parent` in order.
    ///
    /// A node that already has a parent is moved: it is detached from its
    /// previous parent first. Attaching `parent` or one of its ancestors fails
    /// with [`TreeError::CycleDetected`] and leaves the tree untouched.
    #[instrument(level = "debug", skip(self))]
    pub fn add_children(&mut self, parent: Index, nodes: &[Index]) -> TreeResult<()> {
        self.require(parent)?;
        for &child in nodes {
            self.check_attach(parent, child)?;
        }
        if nodes.is_empty() {
            return Ok(());
        }

        // a handle listed twice lands at its last position
        let mut seen = HashSet::with_capacity(nodes.len());
        let mut unique: Vec<Index> = nodes
            .iter()
            .rev()
            .copied()
            .filter(|&child| seen.insert(child))
            .collect();
        unique.reverse();

        let mut events = Vec::new();
        let mut added = Vec::with_capacity(unique.len());
        for child in unique {
            if let Some(event) = self.unlink(child) {
                events.push(event);
            }
            if let Some(node) = self.arena.get_mut(child) {
                node.parent = Some(parent);
                added.push(node.id.clone());
            }
            if let Some(p) = self.arena.get_mut(parent) {
                p.children.push(child);
            }
        }
        events.push(TreeEvent::ChildrenAdded {
            parent: self.id_of(parent),
            ids: added,
        });
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    /// Splices `node` into the children of `parent` before `target_index`.
    ///
    /// `None` appends. Negative indices count from the end, indices past the
    /// end append. With no current children the index is ignored. A node that
    /// already sits under `parent` is taken out first, so the index refers to
    /// the remaining children.
    #[instrument(level = "debug", skip(self))]
    pub fn add_child_by_index(
        &mut self,
        parent: Index,
        node: Index,
        target_index: Option<i64>,
    ) -> TreeResult<()> {
        self.check_attach(parent, node)?;

        let mut events = Vec::new();
        if let Some(event) = self.unlink(node) {
            events.push(event);
        }
        let current_len = self.require(parent)?.children.len();
        if current_len == 0 {
            for event in events {
                self.emit(event);
            }
            return self.add_children(parent, &[node]);
        }

        let position = splice_position(target_index, current_len);
        let id = {
            let inserted = self.require_mut(node)?;
            inserted.parent = Some(parent);
            inserted.id.clone()
        };
        self.require_mut(parent)?.children.insert(position, node);
        events.push(TreeEvent::ChildInserted {
            parent: self.id_of(parent),
            id,
            index: position,
        });
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    pub fn remove_child(&mut self, parent: Index, id: &str) -> Option<Index> {
        self.remove_children(parent, &[id]).pop()
    }

    /// Detaches the direct children named by `ids` and returns their handles.
    ///
    /// Removal runs in descending index order; ids that are not direct
    /// children are ignored. Removed nodes keep their own subtrees.
    #[instrument(level = "debug", skip(self, ids))]
    pub fn remove_children<S: AsRef<str>>(&mut self, parent: Index, ids: &[S]) -> Vec<Index> {
        let origin_ids = self.children_ids(parent);
        debug!(
            "children before removal: {}, ids to remove: {}",
            origin_ids.len(),
            ids.iter().map(|id| id.as_ref()).join(", ")
        );

        let mut target_indexes: Vec<usize> = ids
            .iter()
            .filter_map(|id| origin_ids.iter().position(|c| c == id.as_ref()))
            .collect();
        target_indexes.sort_unstable_by(|a, b| b.cmp(a));
        target_indexes.dedup();

        let mut removed = Vec::with_capacity(target_indexes.len());
        if let Some(p) = self.arena.get_mut(parent) {
            for index in target_indexes {
                removed.push(p.children.remove(index));
            }
        }
        let mut removed_ids = Vec::with_capacity(removed.len());
        for &child in &removed {
            if let Some(node) = self.arena.get_mut(child) {
                node.parent = None;
                removed_ids.push(node.id.clone());
            }
        }

        debug!(
            "children after removal: {}",
            self.children_ids(parent).join(", ")
        );
        if !removed_ids.is_empty() {
            self.emit(TreeEvent::ChildrenRemoved {
                parent: self.id_of(parent),
                ids: removed_ids,
            });
        }
        removed
    }

    /// Replaces all children of `parent`. Previous children become detached roots.
    #[instrument(level = "debug", skip(self))]
    pub fn set_children(&mut self, parent: Index, nodes: &[Index]) -> TreeResult<()> {
        self.require(parent)?;
        for &child in nodes {
            self.check_attach(parent, child)?;
        }
        let current = self.children_ids(parent);
        self.remove_children(parent, current.as_slice());
        self.add_children(parent, nodes)
    }

    /// Detaches `node` from its parent. Returns false if it had none.
    #[instrument(level = "debug", skip(self))]
    pub fn detach(&mut self, node: Index) -> bool {
        match self.unlink(node) {
            Some(event) => {
                self.emit(event);
                true
            }
            None => false,
        }
    }

    /// Detaches `node` and frees it together with its whole subtree.
    ///
    /// Returns the number of released nodes. Their ids become available again.
    #[instrument(level = "debug", skip(self))]
    pub fn dispose(&mut self, node: Index) -> TreeResult<usize> {
        self.require(node)?;
        self.detach(node);
        let doomed: Vec<Index> = self.iter_postorder(node).map(|(idx, _)| idx).collect();

        let mut ids = Vec::with_capacity(doomed.len());
        for idx in doomed {
            if let Some(removed) = self.arena.remove(idx) {
                self.ids.remove(&removed.id);
                ids.push(removed.id);
            }
        }
        if self.root.is_some_and(|root| !self.arena.contains(root)) {
            self.root = self
                .arena
                .iter()
                .find(|(_, n)| n.parent.is_none())
                .map(|(idx, _)| idx);
            debug!(root = ?self.root, "first tree released, promoted surviving root");
        }

        let released = ids.len();
        debug!(released, "disposed subtree");
        self.emit(TreeEvent::NodesDisposed { ids });
        Ok(released)
    }

    // ---------------------------------------------------------------------
    // Change notification
    // ---------------------------------------------------------------------

    pub fn on_change<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(&TreeEvent) + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_change(&mut self, listener_id: u64) -> bool {
        self.listeners.remove(&listener_id).is_some()
    }

    fn emit(&mut self, event: TreeEvent) {
        trace!(?event, "emit");
        for listener in self.listeners.values_mut() {
            listener(&event);
        }
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn require(&self, idx: Index) -> TreeResult<&TreeNode> {
        self.arena
            .get(idx)
            .ok_or_else(|| TreeError::InvalidHandle(format!("{idx:?}")))
    }

    fn require_mut(&mut self, idx: Index) -> TreeResult<&mut TreeNode> {
        self.arena
            .get_mut(idx)
            .ok_or_else(|| TreeError::InvalidHandle(format!("{idx:?}")))
    }

    fn id_of(&self, idx: Index) -> String {
        self.arena
            .get(idx)
            .map(|node| node.id.clone())
            .unwrap_or_default()
    }

    fn ancestors_and_self(&self, idx: Index) -> impl Iterator<Item = Index> + '_ {
        iter::successors(Some(idx), move |&current| {
            self.arena.get(current).and_then(|node| node.parent)
        })
    }

    fn check_attach(&self, parent: Index, child: Index) -> TreeResult<()> {
        let parent_node = self.require(parent)?;
        let child_node = self.require(child)?;
        if self.ancestors_and_self(parent).any(|idx| idx == child) {
            return Err(TreeError::CycleDetected {
                parent: parent_node.id.clone(),
                child: child_node.id.clone(),
            });
        }
        Ok(())
    }

    /// Clears both sides of the link between `child` and its parent.
    fn unlink(&mut self, child: Index) -> Option<TreeEvent> {
        let child_node = self.arena.get_mut(child)?;
        let parent_idx = child_node.parent.take()?;
        let child_id = child_node.id.clone();
        let parent = self.arena.get_mut(parent_idx)?;
        parent.children.retain(|&c| c != child);
        Some(TreeEvent::ChildrenRemoved {
            parent: parent.id.clone(),
            ids: vec![child_id],
        })
    }
}

/// List-splice insert position for `target_index` among `len` elements.
fn splice_position(target_index: Option<i64>, len: usize) -> usize {
    match target_index {
        None => len,
        Some(index) if index < 0 => {
            let from_end = len as i64 + index;
            from_end.max(0) as usize
        }
        Some(index) => (index as u64).min(len as u64) as usize,
    }
}

struct JsonProjection<'a> {
    arena: &'a TreeArena,
}

impl TreeMap for JsonProjection<'_> {
    type Node = Index;
    type Output = Meta;
    type Error = Infallible;

    fn children(&self, node: &Index) -> Result<Vec<Index>, Infallible> {
        Ok(self
            .arena
            .node(*node)
            .map(|n| n.children.clone())
            .unwrap_or_default())
    }

    fn visit(&mut self, node: &Index) -> Result<Meta, Infallible> {
        let mut json = Meta::new();
        if let Some(n) = self.arena.node(*node) {
            json.insert("id".to_string(), Value::String(n.id.clone()));
            for (key, value) in &n.meta {
                if key != "id" && key != "children" {
                    json.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(json)
    }

    fn attach(&mut self, parent: &mut Meta, children: Vec<Meta>) -> Result<(), Infallible> {
        parent.insert(
            "children".to_string(),
            Value::Array(children.into_iter().map(Value::Object).collect()),
        );
        Ok(())
    }
}

pub struct PostOrderIterator<'a> {
    arena: &'a TreeArena,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    #[instrument(level = "trace", skip(arena))]
    fn new(arena: &'a TreeArena, start: Index) -> Self {
        let mut stack = Vec::new();
        if arena.node(start).is_some() {
            stack.push((start, false));
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testing;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[ctor::ctor]
    fn init() {
        testing::init_test_setup();
    }

    fn node(arena: &mut TreeArena, id: &str) -> Index {
        arena.create_node(id, Meta::new()).unwrap()
    }

    #[test]
    fn splice_position_follows_list_splice_rules() {
        assert_eq!(splice_position(None, 3), 3);
        assert_eq!(splice_position(Some(0), 3), 0);
        assert_eq!(splice_position(Some(2), 3), 2);
        assert_eq!(splice_position(Some(3), 3), 3);
        assert_eq!(splice_position(Some(99), 3), 3);
        assert_eq!(splice_position(Some(-1), 3), 2);
        assert_eq!(splice_position(Some(-10), 3), 0);
    }

    #[test]
    fn create_node_rejects_duplicate_id() {
        let mut arena = TreeArena::new();
        node(&mut arena, "a");
        let err = arena.create_node("a", Meta::new()).unwrap_err();
        assert!(matches!(err, TreeError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn re_adding_an_attached_node_moves_it() {
        let mut arena = TreeArena::new();
        let a = node(&mut arena, "a");
        let b = node(&mut arena, "b");
        let c = node(&mut arena, "c");
        arena.add_children(a, &[b, c]).unwrap();

        arena.add_child(b, c).unwrap();

        assert_eq!(arena.children_ids(a), vec!["b"]);
        assert_eq!(arena.children_ids(b), vec!["c"]);
        assert_eq!(arena.parent(c), Some(b));
    }

    #[test]
    fn attaching_an_ancestor_is_rejected_without_changes() {
        let mut arena = TreeArena::new();
        let a = node(&mut arena, "a");
        let b = node(&mut arena, "b");
        arena.add_child(a, b).unwrap();

        let err = arena.add_child(b, a).unwrap_err();
        assert!(matches!(err, TreeError::CycleDetected { .. }));
        let err = arena.add_child(a, a).unwrap_err();
        assert!(matches!(err, TreeError::CycleDetected { .. }));

        assert!(arena.is_root(a));
        assert_eq!(arena.children_ids(a), vec!["b"]);
    }

    #[test]
    fn dispose_frees_subtree_and_ids() {
        let mut arena = TreeArena::new();
        let a = node(&mut arena, "a");
        let b = node(&mut arena, "b");
        let c = node(&mut arena, "c");
        arena.add_child(a, b).unwrap();
        arena.add_child(b, c).unwrap();

        assert_eq!(arena.dispose(b).unwrap(), 2);

        assert_eq!(arena.len(), 1);
        assert!(arena.children_ids(a).is_empty());
        assert!(arena.get_by_id("c").is_none());
        assert!(arena.node(c).is_none());
        // freed ids can be reused
        node(&mut arena, "c");
    }

    #[test]
    fn stale_handles_are_reported() {
        let mut arena = TreeArena::new();
        let a = node(&mut arena, "a");
        let b = node(&mut arena, "b");
        arena.dispose(b).unwrap();

        assert!(matches!(
            arena.add_child(a, b),
            Err(TreeError::InvalidHandle(_))
        ));
        assert!(matches!(
            arena.upsert_meta(b, "k", json!(1)),
            Err(TreeError::InvalidHandle(_))
        ));
        assert_eq!(arena.tree_json(b), Value::Null);
        assert!(arena.all_nodes(b).is_empty());
    }

    #[test]
    fn root_follows_reattachment() {
        let mut arena = TreeArena::new();
        let a = node(&mut arena, "a");
        let top = node(&mut arena, "top");
        assert_eq!(arena.root(), Some(a));

        arena.add_child(top, a).unwrap();

        assert_eq!(arena.root(), Some(top));
    }

    #[test]
    fn listeners_receive_events_until_removed() {
        let mut arena = TreeArena::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let listener = arena.on_change(move |event| sink.borrow_mut().push(event.clone()));

        let a = node(&mut arena, "a");
        let b = node(&mut arena, "b");
        let c = node(&mut arena, "c");
        arena.add_child(a, b).unwrap();
        arena.add_child_by_index(a, c, Some(0)).unwrap();
        arena.upsert_meta(c, "name", json!("C")).unwrap();
        arena.remove_children(a, &["b", "missing"]);

        assert!(arena.off_change(listener));
        arena.detach(c);

        assert_eq!(
            *seen.borrow(),
            vec![
                TreeEvent::ChildrenAdded {
                    parent: "a".into(),
                    ids: vec!["b".into()]
                },
                TreeEvent::ChildInserted {
                    parent: "a".into(),
                    id: "c".into(),
                    index: 0
                },
                TreeEvent::MetaChanged {
                    id: "c".into(),
                    key: Some("name".into())
                },
                TreeEvent::ChildrenRemoved {
                    parent: "a".into(),
                    ids: vec!["b".into()]
                },
            ]
        );
    }

    #[test]
    fn add_children_with_repeated_handle_attaches_once() {
        let mut arena = TreeArena::new();
        let a = node(&mut arena, "a");
        let b = node(&mut arena, "b");
        let c = node(&mut arena, "c");
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        arena.on_change(move |event| sink.borrow_mut().push(event.clone()));

        arena.add_children(a, &[b, c, b]).unwrap();

        assert_eq!(arena.children_ids(a), vec!["c", "b"]);
        assert_eq!(
            *events.borrow(),
            vec![TreeEvent::ChildrenAdded {
                parent: "a".into(),
                ids: vec!["c".into(), "b".into()]
            }]
        );
    }

    #[test]
    fn disposing_first_tree_promotes_surviving_root() {
        let mut arena = TreeArena::new();
        let a = node(&mut arena, "a");
        let b = node(&mut arena, "b");
        let x = node(&mut arena, "x");
        let y = node(&mut arena, "y");
        arena.add_child(a, b).unwrap();
        arena.add_child(x, y).unwrap();

        arena.dispose(a).unwrap();

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.root(), Some(x));
        assert_eq!(arena.iter().count(), 2);

        arena.dispose(x).unwrap();
        assert_eq!(arena.root(), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn remove_children_ignores_repeated_ids() {
        let mut arena = TreeArena::new();
        let a = node(&mut arena, "a");
        let b = node(&mut arena, "b");
        let c = node(&mut arena, "c");
        arena.add_children(a, &[b, c]).unwrap();

        let removed = arena.remove_children(a, &["b", "b"]);

        assert_eq!(removed, vec![b]);
        assert_eq!(arena.children_ids(a), vec!["c"]);
    }

    #[test]
    fn tree_json_keeps_structural_fields_authoritative() {
        let mut arena = TreeArena::new();
        let a = node(&mut arena, "a");
        arena.upsert_meta(a, "id", json!("spoofed")).unwrap();
        arena.upsert_meta(a, "children", json!(42)).unwrap();

        assert_eq!(arena.tree_json(a), json!({ "id": "a", "children": [] }));
    }
}
