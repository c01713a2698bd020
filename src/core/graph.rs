// src/core/graph.rs

//! The item graph the view engine reads from.
//!
//! Only the read surface is part of the engine contract ([`ItemGraph`]). The
//! [`InMemoryGraph`] arena is the reference implementation used by the CLI and
//! the tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Edge, Item, ItemId, Value};

/// Failures of graph writes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// No item has this id.
    #[error("Item {0} does not exist")]
    UnknownItem(ItemId),
    /// The type already has an item with this uid.
    #[error("An item of type '{item_type}' with uid '{uid}' already exists")]
    DuplicateUid { item_type: String, uid: String },
}

/// Result alias for graph writes.
pub type GraphResult<T> = Result<T, GraphError>;

/// Sort order applied to query results.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    /// Property to sort by.
    pub property: String,
    /// Sort direction.
    pub ascending: bool,
}

/// Read access to typed items and their edges.
pub trait ItemGraph: Send + Sync {
    fn item(&self, id: ItemId) -> Option<Item>;

    /// Looks an item up by type and uid.
    fn get(&self, item_type: &str, uid: &str) -> Option<Item>;

    /// All items of `item_type` that satisfy `predicate`, optionally sorted.
    fn query(
        &self,
        item_type: &str,
        predicate: &dyn Fn(&Item) -> bool,
        sort: Option<&SortSpec>,
    ) -> Vec<Item>;

    /// Outgoing edges of `source` with the given edge type.
    fn edges(&self, source: ItemId, edge_type: &str) -> Vec<Edge>;

    fn edge_target(&self, edge: &Edge) -> Option<Item> {
        self.item(edge.target)
    }
}

/// Sorts items by a property. Items missing the property sort last in either
/// direction.
pub fn sort_items(items: &mut [Item], sort: &SortSpec) {
    items.sort_by(|a, b| {
        let left = a.property(&sort.property).cloned().unwrap_or(Value::Null);
        let right = b.property(&sort.property).cloned().unwrap_or(Value::Null);
        match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if sort.ascending => left.compare_for_sort(&right),
            (false, false) => right.compare_for_sort(&left),
        }
    });
}

#[derive(Default)]
struct GraphData {
    items: Vec<Item>,
    by_uid: HashMap<(String, String), ItemId>,
    edges: Vec<Edge>,
    by_source: HashMap<ItemId, Vec<usize>>,
    by_target: HashMap<ItemId, Vec<usize>>,
}

impl GraphData {
    fn slot(id: ItemId) -> Option<usize> {
        usize::try_from(id.0).ok()
    }

    fn item(&self, id: ItemId) -> Option<&Item> {
        Self::slot(id).and_then(|slot| self.items.get(slot))
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        Self::slot(id).and_then(|slot| self.items.get_mut(slot))
    }

    /// Edges at `indices` whose type matches.
    fn edges_of_type(&self, indices: Option<&Vec<usize>>, edge_type: &str) -> Vec<Edge> {
        indices
            .into_iter()
            .flatten()
            .filter_map(|&i| self.edges.get(i))
            .filter(|e| e.edge_type == edge_type)
            .cloned()
            .collect()
    }
}

/// Arena-backed graph. Item ids are indices into the arena.
#[derive(Default)]
pub struct InMemoryGraph {
    data: RwLock<GraphData>,
}

impl InMemoryGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphData> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphData> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates an item with a freshly generated uid.
    pub fn create_item(&self, item_type: &str, properties: BTreeMap<String, Value>) -> ItemId {
        let mut data = self.write();
        let mut uid = Uuid::new_v4().to_string();
        while data.by_uid.contains_key(&(item_type.to_string(), uid.clone())) {
            uid = Uuid::new_v4().to_string();
        }
        Self::insert_item(&mut data, item_type, &uid, properties)
    }

    fn insert_item(
        data: &mut GraphData,
        item_type: &str,
        uid: &str,
        properties: BTreeMap<String, Value>,
    ) -> ItemId {
        let id = ItemId(data.items.len() as u64);
        data.items.push(Item {
            id,
            item_type: item_type.to_string(),
            uid: uid.to_string(),
            properties,
        });
        data.by_uid.insert((item_type.to_string(), uid.to_string()), id);
        log::debug!("Created {} item {} ({})", item_type, id, uid);
        id
    }

    /// Creates an item with a caller-chosen uid, unique per type.
    pub fn create_item_with_uid(
        &self,
        item_type: &str,
        uid: &str,
        properties: BTreeMap<String, Value>,
    ) -> GraphResult<ItemId> {
        let mut data = self.write();
        if data.by_uid.contains_key(&(item_type.to_string(), uid.to_string())) {
            return Err(GraphError::DuplicateUid {
                item_type: item_type.to_string(),
                uid: uid.to_string(),
            });
        }
        Ok(Self::insert_item(&mut data, item_type, uid, properties))
    }

    /// Sets one property of an existing item.
    pub fn set_property(&self, id: ItemId, name: &str, value: Value) -> GraphResult<()> {
        let mut data = self.write();
        let item = data.item_mut(id).ok_or(GraphError::UnknownItem(id))?;
        item.properties.insert(name.to_string(), value);
        Ok(())
    }

    /// Adds a typed edge from `source` to `target`.
    pub fn link(&self, source: ItemId, target: ItemId, edge_type: &str) -> GraphResult<()> {
        let mut data = self.write();
        for id in [source, target] {
            if data.item(id).is_none() {
                return Err(GraphError::UnknownItem(id));
            }
        }
        let index = data.edges.len();
        data.edges.push(Edge {
            edge_type: edge_type.to_string(),
            source,
            target,
        });
        data.by_source.entry(source).or_default().push(index);
        data.by_target.entry(target).or_default().push(index);
        Ok(())
    }

    /// Incoming edges of `target` with the given edge type.
    pub fn incoming(&self, target: ItemId, edge_type: &str) -> Vec<Edge> {
        let data = self.read();
        data.edges_of_type(data.by_target.get(&target), edge_type)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    /// True when the graph has no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ItemGraph for InMemoryGraph {
    fn item(&self, id: ItemId) -> Option<Item> {
        self.read().item(id).cloned()
    }

    fn get(&self, item_type: &str, uid: &str) -> Option<Item> {
        let data = self.read();
        let id = data.by_uid.get(&(item_type.to_string(), uid.to_string()))?;
        data.item(*id).cloned()
    }

    fn query(
        &self,
        item_type: &str,
        predicate: &dyn Fn(&Item) -> bool,
        sort: Option<&SortSpec>,
    ) -> Vec<Item> {
        // The predicate may read the graph again, so the lock is released
        // before it runs.
        let candidates: Vec<Item> = {
            let data = self.read();
            data.items
                .iter()
                .filter(|item| item.item_type == item_type)
                .cloned()
                .collect()
        };
        let mut items: Vec<Item> = candidates.into_iter().filter(|item| predicate(item)).collect();
        if let Some(sort) = sort {
            sort_items(&mut items, sort);
        }
        items
    }

    fn edges(&self, source: ItemId, edge_type: &str) -> Vec<Edge> {
        let data = self.read();
        data.edges_of_type(data.by_source.get(&source), edge_type)
    }
}
