//! Builds node hierarchies from plain nested JSON.
//!
//! Input shape: `{ id?: string, children?: [same shape], ...meta }`.
use std::fmt;
use std::marker::PhantomData;

use generational_arena::Index;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::arena::{Meta, TreeArena};
use crate::config::{IdStrategy, Settings};
use crate::errors::{TreeError, TreeResult};
use crate::traverse::{map_tree, TreeMap};

/// Receives the raw input node (including `id` and `children`) and returns an id.
pub type IdGenerator = Box<dyn FnMut(&Map<String, Value>) -> String>;

/// Receives a node's metadata and returns the mapping to store.
pub type MetaHandler = Box<dyn FnMut(Meta) -> Meta>;

/// Random decimal string: the digits of a v4 UUID's 128-bit value.
pub fn numeric_id(_node: &Map<String, Value>) -> String {
    Uuid::new_v4().as_u128().to_string()
}

pub fn uuid_id(_node: &Map<String, Value>) -> String {
    Uuid::new_v4().to_string()
}

/// Constructs node hierarchies from JSON values.
///
/// The id generator and the meta handler are invoked exactly once per input
/// node, in pre-order: a node is created before any of its children, and its
/// children are attached only after each of them is complete.
pub struct TreeBuilder {
    id_generator: IdGenerator,
    meta_handler: MetaHandler,
}

impl fmt::Debug for TreeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeBuilder").finish_non_exhaustive()
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            id_generator: Box::new(numeric_id),
            meta_handler: Box::new(|meta| meta),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let builder = Self::new();
        match settings.id_strategy {
            IdStrategy::Numeric => builder,
            IdStrategy::Uuid => builder.id_generator(uuid_id),
        }
    }

    pub fn id_generator<F>(mut self, generator: F) -> Self
    where
        F: FnMut(&Map<String, Value>) -> String + 'static,
    {
        self.id_generator = Box::new(generator);
        self
    }

    pub fn meta_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(Meta) -> Meta + 'static,
    {
        self.meta_handler = Box::new(handler);
        self
    }

    /// Builds a fresh arena whose root is the top-level input node.
    #[instrument(level = "debug", skip(self, json))]
    pub fn build(&mut self, json: &Value) -> TreeResult<TreeArena> {
        let mut arena = TreeArena::new();
        self.build_into(&mut arena, json)?;
        Ok(arena)
    }

    /// Builds a detached subtree inside an existing arena and returns its root.
    ///
    /// On error every node created by this call is released again, so the
    /// arena is left as it was.
    #[instrument(level = "debug", skip(self, arena, json))]
    pub fn build_into(&mut self, arena: &mut TreeArena, json: &Value) -> TreeResult<Index> {
        let root = InputNode::new("$".to_string(), json)?;
        let mut mapper = JsonToTree {
            arena,
            builder: self,
            created: Vec::new(),
            input: PhantomData,
        };
        match map_tree(&mut mapper, &root) {
            Ok(root_idx) => {
                debug!(nodes = mapper.created.len(), "built tree");
                Ok(root_idx)
            }
            Err(e) => {
                warn!("tree build failed, releasing partial nodes: {}", e);
                for idx in mapper.created.into_iter().rev() {
                    if mapper.arena.node(idx).is_some() {
                        mapper.arena.dispose(idx)?;
                    }
                }
                Err(e)
            }
        }
    }
}

impl TreeArena {
    /// Builds an arena with the default id generator and meta handler.
    pub fn from_json(json: &Value) -> TreeResult<Self> {
        TreeBuilder::new().build(json)
    }
}

/// An input object together with its JSON path, for error messages.
struct InputNode<'a> {
    path: String,
    fields: &'a Map<String, Value>,
}

impl<'a> InputNode<'a> {
    fn new(path: String, value: &'a Value) -> TreeResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { path, fields }),
            other => Err(TreeError::InvalidInput {
                path,
                reason: format!("expected an object, found {}", kind_of(other)),
            }),
        }
    }
}

struct JsonToTree<'a, 'b, 'n> {
    arena: &'a mut TreeArena,
    builder: &'b mut TreeBuilder,
    /// Every node created so far, in creation order
    created: Vec<Index>,
    input: PhantomData<&'n Value>,
}

impl<'n> TreeMap for JsonToTree<'_, '_, 'n> {
    type Node = InputNode<'n>;
    type Output = Index;
    type Error = TreeError;

    fn children(&self, node: &InputNode<'n>) -> TreeResult<Vec<InputNode<'n>>> {
        let fields: &'n Map<String, Value> = node.fields;
        match fields.get("children") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| InputNode::new(format!("{}.children[{}]", node.path, i), item))
                .collect(),
            Some(other) => Err(TreeError::InvalidInput {
                path: node.path.clone(),
                reason: format!("`children` must be an array, found {}", kind_of(other)),
            }),
        }
    }

    fn visit(&mut self, node: &InputNode<'n>) -> TreeResult<Index> {
        let id = match node.fields.get("id") {
            None | Some(Value::Null) => (self.builder.id_generator)(node.fields),
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(TreeError::InvalidInput {
                    path: node.path.clone(),
                    reason: format!("`id` must be a string, found {}", kind_of(other)),
                })
            }
        };
        let meta: Meta = node
            .fields
            .iter()
            .filter(|(key, _)| key.as_str() != "id" && key.as_str() != "children")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let meta = (self.builder.meta_handler)(meta);
        let idx = self.arena.create_node(id, meta)?;
        self.created.push(idx);
        Ok(idx)
    }

    fn attach(&mut self, parent: &mut Index, children: Vec<Index>) -> TreeResult<()> {
        self.arena.add_children(*parent, &children)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testing;
    use serde_json::json;

    #[ctor::ctor]
    fn init() {
        testing::init_test_setup();
    }

    #[test]
    fn numeric_ids_are_decimal_and_distinct() {
        let a = numeric_id(&Map::new());
        let b = numeric_id(&Map::new());
        assert!(!a.is_empty());
        assert!(a.chars().all(|c| c.is_ascii_digit()));
        assert_ne!(a, b);
    }

    #[test]
    fn failed_build_into_leaves_arena_untouched() {
        let mut arena = TreeArena::from_json(&json!({ "id": "A" })).unwrap();
        let input = json!({
            "id": "X",
            "children": [{ "id": "Y" }, { "id": "A" }]
        });

        let err = TreeBuilder::new().build_into(&mut arena, &input).unwrap_err();

        assert!(matches!(err, TreeError::DuplicateId(id) if id == "A"));
        assert_eq!(arena.len(), 1);
        assert!(arena.get_by_id("X").is_none());
        assert!(arena.get_by_id("Y").is_none());
    }

    #[test]
    fn invalid_children_reports_path() {
        let input = json!({ "id": "A", "children": [{ "id": "B", "children": 3 }] });

        let err = TreeArena::from_json(&input).unwrap_err();

        match err {
            TreeError::InvalidInput { path, .. } => assert_eq!(path, "$.children[0]"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
