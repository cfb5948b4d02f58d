// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Layered document cache.
//!
//! Each document is the merge of up to three kinds of layers:
//!
//! 1. query overlays, in insertion order
//! 2. live snapshots, one per connection
//! 3. method overlays, in insertion order
//!
//! Later layers win on conflicting fields. Mutations land in a pending
//! view; [`CollectionStore::flush`] publishes the touched collections to
//! the stable read view.

use indexmap::{IndexMap, IndexSet};

use ddp_core::{Object, Value};

/// Fields of one document.
pub type Document = Object;

/// Documents grouped by collection, then by id.
pub type Entities = IndexMap<String, IndexMap<String, Document>>;

/// Reads `{collection: {id: fields}}` out of a method or query result.
///
/// Anything that does not have that shape contributes nothing.
pub fn entities_from_value(value: &Value) -> Entities {
    let mut entities = Entities::new();
    let Some(collections) = value.as_object() else {
        return entities;
    };
    for (collection, documents) in collections {
        let Some(documents) = documents.as_object() else {
            continue;
        };
        let docs: IndexMap<String, Document> = documents
            .iter()
            .filter_map(|(id, fields)| Some((id.clone(), fields.as_object()?.clone())))
            .collect();
        if !docs.is_empty() {
            entities.insert(collection.clone(), docs);
        }
    }
    entities
}

/// Merges `patch` into `target`, recursing into nested objects.
pub fn deep_merge(target: &mut Document, patch: &Document) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Every layer contributing to one document.
#[derive(Debug, Default, Clone)]
pub struct CollectionEntry {
    /// Live snapshots keyed by connection id.
    pub current: IndexMap<String, Document>,
    /// Query overlays; map order is the overlay order.
    pub queries: IndexMap<String, Document>,
    /// Method overlays; map order is the overlay order.
    pub methods: IndexMap<String, Document>,
}

impl CollectionEntry {
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.queries.is_empty() && self.methods.is_empty()
    }

    /// The externally visible document.
    pub fn merged(&self, id: &str) -> Document {
        let mut doc = Document::new();
        doc.insert("_id".to_string(), Value::from(id));
        let layers = self.queries.values().chain(self.current.values()).chain(self.methods.values());
        for layer in layers {
            for (key, value) in layer {
                doc.insert(key.clone(), value.clone());
            }
        }
        doc
    }
}

#[derive(Debug, Default)]
pub struct CollectionStore {
    entries: IndexMap<String, IndexMap<String, CollectionEntry>>,
    next: IndexMap<String, IndexMap<String, Document>>,
    current: IndexMap<String, IndexMap<String, Document>>,
    dirty: IndexSet<String>,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a connection's snapshot of a document.
    pub fn add(&mut self, collection: &str, id: &str, connection: &str, fields: Document) {
        self.entry_mut(collection, id).current.insert(connection.to_string(), fields);
        self.refresh(collection, id);
    }

    /// Merges `fields` into a connection's snapshot and drops `cleared`.
    pub fn change(
        &mut self,
        collection: &str,
        id: &str,
        connection: &str,
        fields: &Document,
        cleared: &[String],
    ) {
        let entry = self.entry_mut(collection, id);
        let snapshot = entry.current.entry(connection.to_string()).or_default();
        deep_merge(snapshot, fields);
        for key in cleared {
            snapshot.shift_remove(key);
        }
        self.refresh(collection, id);
    }

    /// Drops a connection's snapshot of a document.
    pub fn remove(&mut self, collection: &str, id: &str, connection: &str) {
        let removed = self
            .entries
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .and_then(|entry| entry.current.shift_remove(connection));
        if removed.is_some() {
            self.refresh(collection, id);
        }
    }

    /// Drops every snapshot that came from `connection`.
    pub fn remove_connection(&mut self, connection: &str) {
        let touched = self.layers_with(|entry| entry.current.contains_key(connection));
        for (collection, id) in touched {
            if let Some(entry) = self.entry_existing(&collection, &id) {
                entry.current.shift_remove(connection);
            }
            self.refresh(&collection, &id);
        }
    }

    /// Inserts a query overlay, replacing any previous one from `query`.
    pub fn insert_query(&mut self, query: &str, entities: &Entities) {
        self.remove_query(query);
        for (collection, docs) in entities {
            for (id, fields) in docs {
                self.entry_mut(collection, id).queries.insert(query.to_string(), fields.clone());
                self.refresh(collection, id);
            }
        }
    }

    pub fn remove_query(&mut self, query: &str) {
        let touched = self.layers_with(|entry| entry.queries.contains_key(query));
        for (collection, id) in touched {
            if let Some(entry) = self.entry_existing(&collection, &id) {
                entry.queries.shift_remove(query);
            }
            self.refresh(&collection, &id);
        }
    }

    /// Inserts a method overlay, replacing any previous one from `method`.
    pub fn insert_method(&mut self, method: &str, entities: &Entities) {
        self.remove_method(method);
        for (collection, docs) in entities {
            for (id, fields) in docs {
                self.entry_mut(collection, id).methods.insert(method.to_string(), fields.clone());
                self.refresh(collection, id);
            }
        }
    }

    pub fn remove_method(&mut self, method: &str) {
        let touched = self.layers_with(|entry| entry.methods.contains_key(method));
        for (collection, id) in touched {
            if let Some(entry) = self.entry_existing(&collection, &id) {
                entry.methods.shift_remove(method);
            }
            self.refresh(&collection, &id);
        }
    }

    /// Publishes every touched collection. Returns their names.
    pub fn flush(&mut self) -> Vec<String> {
        let dirty: Vec<String> = self.dirty.drain(..).collect();
        for collection in &dirty {
            match self.next.get(collection) {
                Some(docs) => {
                    self.current.insert(collection.clone(), docs.clone());
                }
                None => {
                    self.current.shift_remove(collection);
                }
            }
        }
        if !dirty.is_empty() {
            tracing::debug!(collections = ?dirty, "flushed collections");
        }
        dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Flushed document.
    pub fn get(&self, collection: &str, id: &str) -> Option<&Document> {
        self.current.get(collection)?.get(id)
    }

    /// Flushed documents of a collection, in first-seen order.
    pub fn find(&self, collection: &str) -> impl Iterator<Item = &Document> {
        self.current.get(collection).into_iter().flat_map(|docs| docs.values())
    }

    /// Document including changes not yet flushed.
    pub fn pending(&self, collection: &str, id: &str) -> Option<&Document> {
        self.next.get(collection)?.get(id)
    }

    /// The stable read view.
    pub fn snapshot(&self) -> &IndexMap<String, IndexMap<String, Document>> {
        &self.current
    }

    /// Raw layers of a document.
    pub fn entry(&self, collection: &str, id: &str) -> Option<&CollectionEntry> {
        self.entries.get(collection)?.get(id)
    }

    fn entry_mut(&mut self, collection: &str, id: &str) -> &mut CollectionEntry {
        self.entries
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
    }

    fn entry_existing(&mut self, collection: &str, id: &str) -> Option<&mut CollectionEntry> {
        self.entries.get_mut(collection)?.get_mut(id)
    }

    fn layers_with<F>(&self, predicate: F) -> Vec<(String, String)>
    where
        F: Fn(&CollectionEntry) -> bool,
    {
        self.entries
            .iter()
            .flat_map(|(collection, docs)| {
                docs.iter()
                    .filter(|(_, entry)| predicate(entry))
                    .map(move |(id, _)| (collection.clone(), id.clone()))
            })
            .collect()
    }

    /// Recomputes the pending view of one document after a layer changed.
    fn refresh(&mut self, collection: &str, id: &str) {
        self.dirty.insert(collection.to_string());
        let merged = match self.entry(collection, id) {
            Some(entry) if !entry.is_empty() => Some(entry.merged(id)),
            _ => None,
        };
        if merged.is_none() {
            if let Some(docs) = self.entries.get_mut(collection) {
                docs.shift_remove(id);
                if docs.is_empty() {
                    self.entries.shift_remove(collection);
                }
            }
        }

        match merged {
            Some(doc) => {
                self.next.entry(collection.to_string()).or_default().insert(id.to_string(), doc);
            }
            None => {
                if let Some(docs) = self.next.get_mut(collection) {
                    docs.shift_remove(id);
                    if docs.is_empty() {
                        self.next.shift_remove(collection);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "collection_tests.rs"]
mod tests;
