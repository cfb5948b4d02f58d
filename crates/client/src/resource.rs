// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reference-counted resource lifecycle.
//!
//! One state machine serves both live subscriptions (`sub`/`unsub`) and
//! query resources (fetched through a method call). Only the engine's
//! wiring differs between the two.
//!
//! ```text
//! initial ─► queued ─► pending ─► ready ◄─► restoring
//!                         │         │           │
//!                         ▼         └─────┬─────┘
//!                      canceled        obsolete     (on disconnect)
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use ddp_core::ejson::{equals, EqualsOptions};
use ddp_core::{MethodError, Value};

use crate::collection::Entities;
use crate::queue::Priority;
use crate::timer::TimerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Subscription,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Initial,
    /// Fetch is held by flow control.
    Queued,
    /// Fetch sent, no answer yet.
    Pending,
    Ready,
    /// Stale data kept while a re-fetch is in flight.
    Restoring,
    /// Failed, or lost its connection before the first answer.
    Canceled,
    /// Had data when its connection dropped.
    Obsolete,
}

/// Inputs to [`ResourceState::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    Held,
    Sent,
    Refetch,
    Loaded,
    Failed,
    ConnectionLost,
}

impl ResourceState {
    pub fn transition(self, event: ResourceEvent) -> Self {
        use ResourceEvent as E;
        use ResourceState::*;
        match (self, event) {
            (Initial, E::Held) => Queued,
            (Initial | Queued, E::Sent) => Pending,
            (Canceled, E::Refetch) => Initial,
            (Obsolete, E::Refetch) => Restoring,
            (Pending | Restoring | Ready, E::Loaded) => Ready,
            (Initial | Queued | Pending | Restoring | Ready, E::Failed) => Canceled,
            (Pending, E::ConnectionLost) => Canceled,
            (Ready | Restoring, E::ConnectionLost) => Obsolete,
            (state, _) => state,
        }
    }

    /// Whether the server currently knows about this resource.
    pub fn is_live(self) -> bool {
        matches!(self, ResourceState::Pending | ResourceState::Ready | ResourceState::Restoring)
    }

    pub fn needs_refetch(self) -> bool {
        matches!(self, ResourceState::Canceled | ResourceState::Obsolete)
    }
}

/// A subscription or a cached query result.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub params: Vec<Value>,
    /// Extra identity beyond name and params.
    pub properties: Value,
    pub connection_id: String,
    pub priority: Priority,
    pub state: ResourceState,
    pub users: u32,
    pub result: Option<Value>,
    pub error: Option<MethodError>,
    /// Entities this resource contributed to the collection store.
    pub entities: Option<Entities>,
    pub(crate) cleanup_timer: Option<TimerId>,
    /// Method id of the in-flight fetch, for queries.
    pub(crate) fetch_method: Option<String>,
}

impl Resource {
    fn matches(&self, connection: &str, name: &str, params: &[Value], properties: &Value) -> bool {
        let options = EqualsOptions::default();
        self.connection_id == connection
            && self.name == name
            && self.params.len() == params.len()
            && self.params.iter().zip(params).all(|(a, b)| equals(a, b, options))
            && equals(&self.properties, properties, options)
    }
}

/// Identity and scheduling of a new resource.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub connection_id: String,
    pub name: String,
    pub params: Vec<Value>,
    pub properties: Value,
    pub priority: Priority,
}

#[derive(Debug)]
pub struct ResourceTable {
    kind: ResourceKind,
    resources: IndexMap<String, Resource>,
}

impl ResourceTable {
    pub fn new(kind: ResourceKind) -> Self {
        ResourceTable { kind, resources: IndexMap::new() }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Finds a resource with codec-equal identity.
    pub fn find(&self, spec: &ResourceSpec) -> Option<&str> {
        self.resources
            .values()
            .find(|r| r.matches(&spec.connection_id, &spec.name, &spec.params, &spec.properties))
            .map(|r| r.id.as_str())
    }

    /// Creates a resource with one user.
    pub fn create(&mut self, id: String, spec: ResourceSpec) -> &mut Resource {
        let resource = Resource {
            id: id.clone(),
            kind: self.kind,
            name: spec.name,
            params: spec.params,
            properties: spec.properties,
            connection_id: spec.connection_id,
            priority: spec.priority,
            state: ResourceState::Initial,
            users: 1,
            result: None,
            error: None,
            entities: None,
            cleanup_timer: None,
            fetch_method: None,
        };
        self.resources.entry(id).or_insert(resource)
    }

    /// Adds a user. Returns the cleanup timer to cancel, if any.
    pub fn retain(&mut self, id: &str) -> Option<TimerId> {
        let resource = self.resources.get_mut(id)?;
        resource.users += 1;
        resource.cleanup_timer.take()
    }

    /// Drops a user. Returns the remaining count.
    pub fn release(&mut self, id: &str) -> Option<u32> {
        let resource = self.resources.get_mut(id)?;
        resource.users = resource.users.saturating_sub(1);
        Some(resource.users)
    }

    /// Applies an event; returns the new state.
    pub fn apply(&mut self, id: &str, event: ResourceEvent) -> Option<ResourceState> {
        let resource = self.resources.get_mut(id)?;
        let next = resource.state.transition(event);
        if next != resource.state {
            tracing::debug!(
                resource = %id,
                kind = ?self.kind,
                from = ?resource.state,
                to = ?next,
                "resource state"
            );
            resource.state = next;
        }
        Some(next)
    }

    /// Marks every resource on `connection` as having lost it.
    pub fn connection_lost(&mut self, connection: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .resources
            .values()
            .filter(|r| r.connection_id == connection && r.state.is_live())
            .map(|r| r.id.clone())
            .collect();
        for id in &ids {
            self.apply(id, ResourceEvent::ConnectionLost);
        }
        ids
    }

    /// Resources on `connection` to re-fetch after it reconnects.
    ///
    /// Only resources that had data are restored; ones canceled before their
    /// first answer wait for the next request.
    pub fn restorable(&self, connection: &str) -> Vec<String> {
        self.resources
            .values()
            .filter(|r| {
                r.connection_id == connection && r.state == ResourceState::Obsolete && r.users > 0
            })
            .map(|r| r.id.clone())
            .collect()
    }

    /// Resource whose in-flight fetch is `method_id`.
    pub fn by_fetch_method(&self, method_id: &str) -> Option<&str> {
        self.resources
            .values()
            .find(|r| r.fetch_method.as_deref() == Some(method_id))
            .map(|r| r.id.as_str())
    }

    pub fn on_connection(&self, connection: &str) -> Vec<String> {
        self.resources
            .values()
            .filter(|r| r.connection_id == connection)
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Resource> {
        self.resources.shift_remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
