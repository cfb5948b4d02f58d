// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The protocol engine.
//!
//! [`Engine`] owns every state table and runs single-threaded: each call
//! (API command, transport event, or timer) runs to completion before the
//! next. It performs no I/O and never sleeps. A driver opens transports
//! through the [`TransportFactory`], reports what they do through
//! [`Engine::handle_transport_event`], and calls [`Engine::run_timers`]
//! once [`Engine::next_deadline`] has passed.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value as Json;
use tracing::{debug, info, warn};

use ddp_core::{ClientMessage, Codec, MethodError, Object, ServerMessage, TypeRegistry, Value};

use crate::clock::{ClockSource, SystemClock};
use crate::collection::{entities_from_value, CollectionStore, Entities};
use crate::config::EngineConfig;
use crate::connection::{Connection, ConnectionEvent, ConnectionState, ConnectionTable};
use crate::event::{classify, Event, Inbound, Interceptor, Notification};
use crate::id::IdGenerator;
use crate::method::{
    MethodEvent, MethodHandle, MethodRecord, MethodResult, MethodState, MethodTable, Reply,
};
use crate::queue::{Priority, QueuedCommand};
use crate::resource::{
    Resource, ResourceEvent, ResourceKind, ResourceSpec, ResourceState, ResourceTable,
};
use crate::session::{resume_key, LoginResult, LoginState, MemoryTokenStorage, Sessions, TokenStorage};
use crate::timer::{TimerId, TimerTask, Timers};
use crate::transport::{TransportEvent, TransportFactory};

/// Turns a method or query result into the entities it carries.
pub type Extractor = Box<dyn Fn(&Value) -> Entities + Send>;

/// Per-request options for subscriptions and query resources.
#[derive(Debug, Clone)]
pub struct ResourceOptions {
    /// Extra identity: equal name and params with different properties
    /// are different resources.
    pub properties: Value,
    pub priority: Option<Priority>,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        ResourceOptions { properties: Value::Null, priority: None }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Caller-chosen method id; must not be in use.
    pub id: Option<String>,
    /// Re-issue the call after a reconnect instead of failing it.
    pub retry: bool,
    pub priority: Option<Priority>,
    /// Overlay entities extracted from the result until the call settles.
    pub overlay_result: bool,
}

pub struct EngineBuilder {
    factory: Box<dyn TransportFactory>,
    config: EngineConfig,
    clock: Arc<dyn ClockSource>,
    registry: TypeRegistry,
    extractor: Extractor,
    tokens: Box<dyn TokenStorage>,
    interceptors: Vec<Box<dyn Interceptor>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: impl ClockSource + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Custom EJSON types known to this engine's codec.
    pub fn registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&Value) -> Entities + Send + 'static,
    {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn token_storage(mut self, storage: impl TokenStorage + 'static) -> Self {
        self.tokens = Box::new(storage);
        self
    }

    /// Appends an interceptor; interceptors run in the order added.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            config: self.config,
            clock: self.clock,
            codec: Codec::new(self.registry),
            factory: self.factory,
            extractor: self.extractor,
            tokens: self.tokens,
            interceptors: self.interceptors,
            ids: IdGenerator::new(),
            timers: Timers::new(),
            flush_timer: None,
            connections: ConnectionTable::new(),
            subscriptions: ResourceTable::new(ResourceKind::Subscription),
            resources: ResourceTable::new(ResourceKind::Query),
            methods: MethodTable::new(),
            collections: CollectionStore::new(),
            sessions: Sessions::new(),
            notifications: VecDeque::new(),
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn ClockSource>,
    codec: Codec,
    factory: Box<dyn TransportFactory>,
    extractor: Extractor,
    tokens: Box<dyn TokenStorage>,
    interceptors: Vec<Box<dyn Interceptor>>,
    ids: IdGenerator,
    timers: Timers,
    flush_timer: Option<TimerId>,
    connections: ConnectionTable,
    subscriptions: ResourceTable,
    resources: ResourceTable,
    methods: MethodTable,
    collections: CollectionStore,
    sessions: Sessions,
    notifications: VecDeque<Notification>,
}

impl Engine {
    pub fn builder(factory: impl TransportFactory + 'static) -> EngineBuilder {
        EngineBuilder {
            factory: Box::new(factory),
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            registry: TypeRegistry::new(),
            extractor: Box::new(entities_from_value),
            tokens: Box::new(MemoryTokenStorage::new()),
            interceptors: Vec::new(),
        }
    }

    // Connections

    /// Opens a connection, or adds a user to an equal one.
    pub fn open(&mut self, endpoint: &str, params: Value) -> String {
        if let Some(id) = self.connections.find(endpoint, &params).map(str::to_string) {
            if let Some(conn) = self.connections.get_mut(&id) {
                conn.users += 1;
                if let Some(timer) = conn.close_timer.take() {
                    self.timers.cancel(timer);
                }
                debug!(connection = %id, users = conn.users, "connection reused");
                // A rejected handshake stops reconnects; a new user starts over.
                let reopen = std::mem::take(&mut conn.handshake_failed)
                    && conn.transport.is_none()
                    && conn.reconnect_timer.is_none();
                if reopen {
                    info!(connection = %id, "reopening after rejected handshake");
                    self.open_transport(&id);
                }
            }
            return id;
        }

        let id = self.ids.next_unused("c", |id| self.connections.contains(id));
        info!(connection = %id, endpoint, "opening connection");
        self.connections.insert(Connection::new(id.clone(), endpoint, params));
        self.open_transport(&id);
        id
    }

    /// Drops a user. The transport closes once the grace delay passes
    /// with no users.
    pub fn close(&mut self, id: &str) {
        let now = self.clock.now_ms();
        let delay = self.config.connection_close_delay();
        let Some(conn) = self.connections.get_mut(id) else {
            warn!(connection = %id, "close of unknown connection");
            return;
        };
        conn.users = conn.users.saturating_sub(1);
        if conn.users > 0 || conn.close_timer.is_some() {
            return;
        }
        debug!(connection = %id, "connection idle, scheduling close");
        let timer = self.timers.schedule(now, delay, TimerTask::CloseConnection(id.to_string()));
        conn.close_timer = Some(timer);
    }

    /// Reports transport activity for `connection`.
    pub fn handle_transport_event(&mut self, connection: &str, event: TransportEvent) {
        self.dispatch(Event::Transport { connection: connection.to_string(), event });
    }

    /// Runs `event` through the interceptors and applies it.
    pub fn dispatch(&mut self, event: Event) {
        let mut next = Some(event);
        for interceptor in &mut self.interceptors {
            next = match next {
                Some(event) => interceptor.intercept(event),
                None => break,
            };
        }
        match next {
            Some(event) => self.reduce(event),
            None => debug!("event dropped by interceptor"),
        }
    }

    // Subscriptions

    pub fn subscribe(&mut self, connection: &str, name: &str, params: Vec<Value>) -> String {
        self.subscribe_with(connection, name, params, ResourceOptions::default())
    }

    /// Requests a subscription. Equal requests share one id.
    pub fn subscribe_with(
        &mut self,
        connection: &str,
        name: &str,
        params: Vec<Value>,
        options: ResourceOptions,
    ) -> String {
        let spec = ResourceSpec {
            connection_id: connection.to_string(),
            name: name.to_string(),
            params,
            properties: options.properties,
            priority: options.priority.unwrap_or(self.config.priorities.subscribe),
        };
        if let Some(id) = self.subscriptions.find(&spec).map(str::to_string) {
            if let Some(timer) = self.subscriptions.retain(&id) {
                self.timers.cancel(timer);
            }
            debug!(subscription = %id, "subscription reused");
            if self.subscriptions.get(&id).is_some_and(|s| s.state.needs_refetch()) {
                self.subscriptions.apply(&id, ResourceEvent::Refetch);
                self.send_subscription(&id);
            }
            return id;
        }

        let id = self.ids.next_unused("s", |id| self.subscriptions.contains(id));
        debug!(subscription = %id, name, connection, "new subscription");
        self.subscriptions.create(id.clone(), spec);
        self.send_subscription(&id);
        id
    }

    /// Drops a user; an unused subscription is deleted after the cleanup delay.
    pub fn unsubscribe(&mut self, id: &str) {
        let delay = self.config.subscription_cleanup_delay();
        self.release_in(ResourceKind::Subscription, id, delay);
    }

    // Query resources

    pub fn request(&mut self, connection: &str, name: &str, params: Vec<Value>) -> String {
        self.request_with(connection, name, params, ResourceOptions::default())
    }

    /// Requests a query resource fetched by calling method `name`.
    pub fn request_with(
        &mut self,
        connection: &str,
        name: &str,
        params: Vec<Value>,
        options: ResourceOptions,
    ) -> String {
        let spec = ResourceSpec {
            connection_id: connection.to_string(),
            name: name.to_string(),
            params,
            properties: options.properties,
            priority: options.priority.unwrap_or(self.config.priorities.query),
        };
        if let Some(id) = self.resources.find(&spec).map(str::to_string) {
            if let Some(timer) = self.resources.retain(&id) {
                self.timers.cancel(timer);
            }
            debug!(resource = %id, "resource reused");
            if self.resources.get(&id).is_some_and(|r| r.state.needs_refetch()) {
                self.resources.apply(&id, ResourceEvent::Refetch);
                self.fetch_resource(&id);
            }
            return id;
        }

        let id = self.ids.next_unused("q", |id| self.resources.contains(id));
        debug!(resource = %id, name, connection, "new resource");
        self.resources.create(id.clone(), spec);
        self.fetch_resource(&id);
        id
    }

    /// Drops a user; an unused resource is deleted after the cleanup delay.
    pub fn release(&mut self, id: &str) {
        let delay = self.config.resource_cleanup_delay();
        self.release_in(ResourceKind::Query, id, delay);
    }

    // Methods

    /// Calls a remote method.
    pub fn call(
        &mut self,
        connection: &str,
        name: &str,
        params: Vec<Value>,
        options: CallOptions,
    ) -> MethodHandle {
        let id = match options.id {
            Some(id) if self.methods.contains(&id) => {
                warn!(method = %id, "method id already in use");
                let error = MethodError::new("DuplicateMethodId", format!("method id {id} is in use"));
                return MethodHandle::settled(id, Err(error));
            }
            Some(id) => id,
            None => self.next_method_id(),
        };
        if !self.connections.contains(connection) {
            return MethodHandle::settled(id, Err(unknown_connection(connection)));
        }

        let (sender, handle) = MethodHandle::channel(&id);
        let priority = options.priority.unwrap_or(self.config.priorities.method);
        let record = MethodRecord::new(&id, name, params, connection, priority, Reply::Caller(sender))
            .with_retry(options.retry)
            .with_overlay(options.overlay_result);
        debug!(method = %id, name, connection, "calling method");
        self.methods.insert(record);
        self.send_method(&id);
        handle
    }

    /// Cancels a call. Its caller gets the canceled error.
    pub fn cancel_method(&mut self, id: &str) -> bool {
        let Some(record) = self.methods.remove(id) else {
            return false;
        };
        let connection = record.connection_id.clone();
        if let Some(conn) = self.connections.get_mut(&connection) {
            conn.queue.remove_where(|command| command.ack.as_deref() == Some(id));
            conn.queue.acknowledge(id);
        }
        if let Reply::Resource(resource) = &record.reply {
            self.fail_resource(resource, id, MethodError::canceled());
        }
        info!(method = %id, "method canceled");
        self.finish_method(record, Err(MethodError::canceled()));
        self.drain(&connection);
        true
    }

    // Session

    /// Logs in with `params` (for example `{user, password}`).
    pub fn login(&mut self, connection: &str, params: Value) -> MethodHandle {
        let id = self.next_method_id();
        if !self.connections.contains(connection) {
            return MethodHandle::settled(id, Err(unknown_connection(connection)));
        }
        let (sender, handle) = MethodHandle::channel(&id);
        self.set_login_state(connection, LoginState::LoggingIn);
        let reply = Reply::Login { resume: false, caller: Some(sender) };
        let priority = self.config.priorities.login;
        self.methods.insert(MethodRecord::new(&id, "login", vec![params], connection, priority, reply));
        self.send_method(&id);
        handle
    }

    /// Logs out and forgets the stored resume token.
    pub fn logout(&mut self, connection: &str) -> MethodHandle {
        let id = self.next_method_id();
        if !self.connections.contains(connection) {
            return MethodHandle::settled(id, Err(unknown_connection(connection)));
        }
        let (sender, handle) = MethodHandle::channel(&id);
        let priority = self.config.priorities.login;
        let reply = Reply::Logout { caller: sender };
        self.methods.insert(MethodRecord::new(&id, "logout", Vec::new(), connection, priority, reply));
        self.send_method(&id);
        handle
    }

    pub fn login_state(&self, connection: &str) -> LoginState {
        self.sessions.get(connection)
    }

    // Timers and flushing

    /// Fires every task that is due, in deadline order.
    pub fn run_timers(&mut self) {
        loop {
            let now = self.clock.now_ms();
            let Some((_, task)) = self.timers.pop_due(now) else {
                break;
            };
            self.dispatch(Event::Timer(task));
        }
    }

    /// When [`Engine::run_timers`] next has work, in clock milliseconds.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Publishes pending collection changes now.
    pub fn flush(&mut self) {
        if let Some(timer) = self.flush_timer.take() {
            self.timers.cancel(timer);
        }
        let collections = self.collections.flush();
        if !collections.is_empty() {
            self.notify(Notification::CollectionsFlushed { collections });
        }
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    // Accessors

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn collections(&self) -> &CollectionStore {
        &self.collections
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn subscription(&self, id: &str) -> Option<&Resource> {
        self.subscriptions.get(id)
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn method(&self, id: &str) -> Option<&MethodRecord> {
        self.methods.get(id)
    }

    pub fn token_storage(&self) -> &dyn TokenStorage {
        self.tokens.as_ref()
    }

    // Reducers

    fn reduce(&mut self, event: Event) {
        match event {
            Event::Send { connection, command } => self.enqueue(&connection, command),
            Event::Transport { connection, event } => match event {
                TransportEvent::Open => self.on_transport_open(&connection),
                TransportEvent::Message(text) => self.on_frame(&connection, &text),
                TransportEvent::Close => self.on_transport_close(&connection),
            },
            Event::Inbound { connection, message } => self.on_inbound(&connection, message),
            Event::Timer(task) => self.on_timer(task),
        }
    }

    fn on_inbound(&mut self, connection: &str, message: Inbound) {
        match message {
            Inbound::Connected { session } => self.on_connected(connection, session),
            Inbound::Failed { version } => self.on_handshake_failed(connection, &version),
            Inbound::Ping { id } => {
                let command = QueuedCommand::new(ClientMessage::pong(id), self.config.priorities.keepalive);
                self.dispatch(Event::Send { connection: connection.to_string(), command });
            }
            Inbound::Pong { id } => debug!(connection, id = ?id, "pong"),
            Inbound::Result { id, outcome } => self.on_result(connection, &id, outcome),
            Inbound::Updated { methods } => self.on_updated(&methods),
            Inbound::Ready { subs } => self.on_ready(&subs),
            Inbound::NoSub { id, error } => self.on_nosub(&id, error),
            Inbound::Added { collection, id, fields } => {
                self.collections.add(&collection, &id, connection, fields);
                self.schedule_flush();
            }
            Inbound::Changed { collection, id, fields, cleared } => {
                self.collections.change(&collection, &id, connection, &fields, &cleared);
                self.schedule_flush();
            }
            Inbound::Removed { collection, id } => {
                self.collections.remove(&collection, &id, connection);
                self.schedule_flush();
            }
            Inbound::Ignored { kind } => debug!(connection, kind, "ignored message"),
            Inbound::ProtocolError { reason } => self.protocol_error(connection, reason),
        }
    }

    fn on_timer(&mut self, task: TimerTask) {
        match task {
            TimerTask::CloseConnection(id) => {
                let idle = match self.connections.get_mut(&id) {
                    Some(conn) => {
                        conn.close_timer = None;
                        conn.users == 0
                    }
                    None => false,
                };
                if idle {
                    self.shutdown_connection(&id);
                }
            }
            TimerTask::Reconnect(id) => {
                let reopen = match self.connections.get_mut(&id) {
                    Some(conn) => {
                        conn.reconnect_timer = None;
                        conn.transport.is_none()
                    }
                    None => false,
                };
                if reopen {
                    info!(connection = %id, "reconnecting");
                    self.open_transport(&id);
                }
            }
            TimerTask::CleanupSubscription(id) => {
                if let Some(sub) = self.subscriptions.get_mut(&id) {
                    sub.cleanup_timer = None;
                }
                self.delete_subscription(&id);
            }
            TimerTask::CleanupResource(id) => {
                if let Some(resource) = self.resources.get_mut(&id) {
                    resource.cleanup_timer = None;
                }
                self.delete_resource(&id);
            }
            TimerTask::Flush => {
                self.flush_timer = None;
                self.flush();
            }
        }
    }

    // Connection lifecycle

    fn open_transport(&mut self, id: &str) {
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };
        match self.factory.open(id, &conn.endpoint) {
            Ok(transport) => conn.transport = Some(transport),
            Err(e) => {
                warn!(connection = %id, error = %e, "failed to open transport");
                self.schedule_reconnect(id);
            }
        }
    }

    fn schedule_reconnect(&mut self, id: &str) {
        let now = self.clock.now_ms();
        let delay = self.config.reconnect_delay();
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };
        if conn.reconnect_timer.is_some() {
            return;
        }
        info!(connection = %id, delay_ms = self.config.reconnect_delay_ms, "scheduling reconnect");
        conn.reconnect_timer = Some(self.timers.schedule(now, delay, TimerTask::Reconnect(id.to_string())));
    }

    fn on_transport_open(&mut self, id: &str) {
        let Some(conn) = self.connections.get_mut(id) else {
            debug!(connection = %id, "open for unknown connection");
            return;
        };
        if conn.transport.is_none() {
            debug!(connection = %id, "open for a discarded transport");
            return;
        }
        let changed = conn.apply(ConnectionEvent::TransportOpened);
        let connect = ClientMessage::connect(
            self.config.protocol_version.clone(),
            &self.config.supported_versions,
            conn.session.clone(),
        );
        self.write(id, &connect);
        if let Some(state) = changed {
            self.notify_state(id, state);
        }
    }

    fn on_connected(&mut self, id: &str, session: String) {
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };
        if conn.apply(ConnectionEvent::HandshakeAccepted).is_none() {
            debug!(connection = %id, state = ?conn.state, "unexpected connected");
            return;
        }
        info!(connection = %id, session = %session, "connected");
        conn.session = Some(session);
        let endpoint = conn.endpoint.clone();
        self.notify_state(id, ConnectionState::Connected);

        if let Some(token) = self.tokens.get(&resume_key(&endpoint)) {
            self.resume_login(id, token);
        }
        for method in self.methods.awaiting_retry(id) {
            self.retry_method(&method);
        }
        for sub in self.subscriptions.restorable(id) {
            self.subscriptions.apply(&sub, ResourceEvent::Refetch);
            self.send_subscription(&sub);
        }
        for resource in self.resources.restorable(id) {
            self.resources.apply(&resource, ResourceEvent::Refetch);
            self.fetch_resource(&resource);
        }
        self.drain(id);
    }

    fn on_handshake_failed(&mut self, id: &str, version: &str) {
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };
        warn!(connection = %id, suggested = %version, "server rejected protocol version");
        conn.handshake_failed = true;
        let changed = conn.apply(ConnectionEvent::HandshakeRejected);
        if let Some(mut transport) = conn.transport.take() {
            transport.close();
        }
        conn.queue.clear_pending();
        conn.queue.clear();
        if let Some(state) = changed {
            self.notify_state(id, state);
        }
        self.notify(Notification::HandshakeFailed {
            connection: id.to_string(),
            suggested: version.to_string(),
        });

        let error = MethodError::handshake_failed(version);
        for method in self.methods.on_connection(id) {
            if let Some(record) = self.methods.remove(&method) {
                self.finish_method(record, Err(error.clone()));
            }
        }
        self.subscriptions.connection_lost(id);
        self.resources.connection_lost(id);
    }

    fn on_transport_close(&mut self, id: &str) {
        let Some(conn) = self.connections.get_mut(id) else {
            debug!(connection = %id, "close for unknown connection");
            return;
        };
        conn.transport = None;
        conn.queue.clear_pending();
        let changed = conn.apply(ConnectionEvent::TransportClosed);
        let idle = conn.users == 0;
        let handshake_failed = conn.handshake_failed;
        info!(connection = %id, "transport closed");
        if let Some(state) = changed {
            self.notify_state(id, state);
        }

        self.connection_lost(id);
        if idle {
            self.shutdown_connection(id);
        } else if !handshake_failed {
            self.schedule_reconnect(id);
        }
    }

    /// Invalidates everything bound to a connection that just dropped.
    fn connection_lost(&mut self, id: &str) {
        for method in self.methods.on_connection(id) {
            self.method_connection_lost(&method);
        }
        let subs = self.subscriptions.connection_lost(id);
        let resources = self.resources.connection_lost(id);
        debug!(connection = %id, subscriptions = subs.len(), resources = resources.len(), "invalidated");
    }

    /// Removes a connection for good.
    fn shutdown_connection(&mut self, id: &str) {
        let Some(mut conn) = self.connections.remove(id) else {
            return;
        };
        info!(connection = %id, "closing connection");
        for timer in [conn.close_timer.take(), conn.reconnect_timer.take()].into_iter().flatten() {
            self.timers.cancel(timer);
        }
        if let Some(mut transport) = conn.transport.take() {
            transport.close();
        }

        for method in self.methods.on_connection(id) {
            let Some(record) = self.methods.remove(&method) else {
                continue;
            };
            let outcome = match (record.state, &record.outcome) {
                (MethodState::Returned, Some(outcome)) => outcome.clone(),
                (state, _) => Err(MethodError::connection_lost(state.as_str())),
            };
            self.finish_method(record, outcome);
        }
        self.subscriptions.connection_lost(id);
        self.resources.connection_lost(id);
        self.collections.remove_connection(id);
        self.schedule_flush();
        self.sessions.remove(id);
        if conn.state != ConnectionState::Disconnected {
            self.notify_state(id, ConnectionState::Disconnected);
        }
    }

    // Outbound queue

    fn enqueue(&mut self, connection: &str, command: QueuedCommand) {
        let Some(conn) = self.connections.get(connection) else {
            warn!(connection, kind = command.message.kind(), "command for unknown connection dropped");
            return;
        };
        if conn.can_send() && conn.queue.admits(command.priority) {
            self.transmit(connection, command);
            return;
        }
        debug!(
            connection,
            kind = command.message.kind(),
            priority = command.priority,
            threshold = ?conn.queue.threshold(),
            "command held"
        );
        self.on_held(&command.message);
        if let Some(conn) = self.connections.get_mut(connection) {
            conn.queue.push(command);
        }
    }

    fn transmit(&mut self, connection: &str, command: QueuedCommand) {
        self.write(connection, &command.message);
        if let Some(ack) = &command.ack {
            if let Some(conn) = self.connections.get_mut(connection) {
                conn.queue.mark_pending(ack.clone(), command.priority);
            }
        }
        self.on_sent(&command.message);
    }

    /// Sends held commands while the threshold admits them.
    fn drain(&mut self, connection: &str) {
        loop {
            let Some(conn) = self.connections.get_mut(connection) else {
                return;
            };
            if !conn.can_send() {
                return;
            }
            let Some(command) = conn.queue.pop_ready() else {
                return;
            };
            self.transmit(connection, command);
        }
    }

    /// Hands one message to the transport. Send failures are only logged;
    /// the driver reports the close that follows.
    fn write(&mut self, connection: &str, message: &ClientMessage) {
        let Some(transport) = self.connections.get_mut(connection).and_then(|c| c.transport.as_mut())
        else {
            return;
        };
        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection, error = %e, "failed to serialize message");
                return;
            }
        };
        debug!(connection, kind = message.kind(), "send");
        if let Err(e) = transport.send(frame) {
            warn!(connection, error = %e, "send failed");
        }
    }

    fn on_held(&mut self, message: &ClientMessage) {
        match message {
            ClientMessage::Sub { id, .. } => {
                self.subscriptions.apply(id, ResourceEvent::Held);
            }
            ClientMessage::Method { id, .. } => {
                if let Some(resource) = self.resources.by_fetch_method(id).map(str::to_string) {
                    self.resources.apply(&resource, ResourceEvent::Held);
                }
            }
            _ => {}
        }
    }

    fn on_sent(&mut self, message: &ClientMessage) {
        match message {
            ClientMessage::Sub { id, .. } => {
                self.subscriptions.apply(id, ResourceEvent::Sent);
            }
            ClientMessage::Method { id, .. } => {
                self.methods.apply(id, MethodEvent::Sent);
                if let Some(resource) = self.resources.by_fetch_method(id).map(str::to_string) {
                    self.resources.apply(&resource, ResourceEvent::Sent);
                }
            }
            _ => {}
        }
    }

    fn on_frame(&mut self, connection: &str, text: &str) {
        match ServerMessage::parse_frame(text) {
            Ok(Some(message)) => {
                let message = classify(message, &self.codec);
                self.dispatch(Event::Inbound { connection: connection.to_string(), message });
            }
            Ok(None) => debug!(connection, "ignoring frame without msg"),
            Err(e) => self.protocol_error(connection, e.to_string()),
        }
    }

    fn protocol_error(&mut self, connection: &str, reason: String) {
        warn!(connection, reason = %reason, "protocol error");
        self.notify(Notification::ProtocolError { connection: connection.to_string(), reason });
    }

    // Resources

    fn release_in(&mut self, kind: ResourceKind, id: &str, delay: std::time::Duration) {
        let now = self.clock.now_ms();
        let (table, task) = match kind {
            ResourceKind::Subscription => {
                (&mut self.subscriptions, TimerTask::CleanupSubscription(id.to_string()))
            }
            ResourceKind::Query => (&mut self.resources, TimerTask::CleanupResource(id.to_string())),
        };
        match table.release(id) {
            Some(0) => {
                debug!(id, kind = ?kind, "no users left, scheduling cleanup");
                let timer = self.timers.schedule(now, delay, task);
                if let Some(old) = table.get_mut(id).and_then(|r| r.cleanup_timer.replace(timer)) {
                    self.timers.cancel(old);
                }
            }
            Some(users) => debug!(id, kind = ?kind, users, "released"),
            None => warn!(id, kind = ?kind, "release of unknown resource"),
        }
    }

    fn send_subscription(&mut self, id: &str) {
        let Some(sub) = self.subscriptions.get(id) else {
            return;
        };
        let params: Vec<Json> = sub.params.iter().map(|p| self.codec.encode(p)).collect();
        let command = QueuedCommand::new(ClientMessage::sub(id, sub.name.clone(), params), sub.priority);
        let connection = sub.connection_id.clone();
        self.dispatch(Event::Send { connection, command });
    }

    fn delete_subscription(&mut self, id: &str) {
        if self.subscriptions.get(id).is_none_or(|s| s.users > 0) {
            return;
        }
        let Some(sub) = self.subscriptions.remove(id) else {
            return;
        };
        let mut withdrawn = false;
        let mut connected = false;
        if let Some(conn) = self.connections.get_mut(&sub.connection_id) {
            let removed = conn.queue.remove_where(
                |command| matches!(&command.message, ClientMessage::Sub { id: queued, .. } if queued == id),
            );
            withdrawn = !removed.is_empty();
            connected = conn.is_connected();
        }
        if !withdrawn && connected && sub.state.is_live() {
            let command = QueuedCommand::new(ClientMessage::unsub(id), self.config.priorities.unsubscribe);
            self.dispatch(Event::Send { connection: sub.connection_id.clone(), command });
        }
        info!(subscription = %id, withdrawn, "subscription deleted");
        self.notify(Notification::ResourceDeleted {
            kind: ResourceKind::Subscription,
            id: id.to_string(),
            entities: None,
        });
    }

    fn fetch_resource(&mut self, id: &str) {
        let Some(resource) = self.resources.get(id) else {
            return;
        };
        let name = resource.name.clone();
        let params = resource.params.clone();
        let connection = resource.connection_id.clone();
        let priority = resource.priority;

        let method = self.next_method_id();
        let reply = Reply::Resource(id.to_string());
        self.methods.insert(MethodRecord::new(&method, name, params, connection, priority, reply));
        if let Some(resource) = self.resources.get_mut(id) {
            resource.fetch_method = Some(method.clone());
        }
        self.send_method(&method);
    }

    /// Applies the result of a resource's fetch.
    fn resource_result(&mut self, id: &str, method: &str, outcome: MethodResult) {
        let Some(resource) = self.resources.get_mut(id) else {
            debug!(resource = %id, "result for deleted resource");
            return;
        };
        if resource.fetch_method.as_deref() != Some(method) {
            debug!(resource = %id, method, "stale fetch result");
            return;
        }
        match outcome {
            Ok(value) => {
                let entities = match value {
                    Value::Object(_) => (self.extractor)(&value),
                    _ => Entities::new(),
                };
                resource.fetch_method = None;
                resource.result = Some(value);
                resource.error = None;
                resource.entities = Some(entities.clone());
                self.collections.insert_query(id, &entities);
                self.resources.apply(id, ResourceEvent::Loaded);
                self.flush();
                self.notify(Notification::ResourceReady { kind: ResourceKind::Query, id: id.to_string() });
            }
            Err(error) => self.fail_resource(id, method, error),
        }
    }

    fn fail_resource(&mut self, id: &str, method: &str, error: MethodError) {
        let Some(resource) = self.resources.get_mut(id) else {
            return;
        };
        if resource.fetch_method.as_deref() != Some(method) {
            return;
        }
        warn!(resource = %id, error = %error, "resource fetch failed");
        resource.fetch_method = None;
        resource.error = Some(error.clone());
        self.resources.apply(id, ResourceEvent::Failed);
        self.notify(Notification::ResourceFailed {
            kind: ResourceKind::Query,
            id: id.to_string(),
            error: Some(error),
        });
    }

    fn delete_resource(&mut self, id: &str) {
        if self.resources.get(id).is_none_or(|r| r.users > 0) {
            return;
        }
        let Some(resource) = self.resources.remove(id) else {
            return;
        };
        if let Some(method) = &resource.fetch_method {
            let withdrawn = self
                .connections
                .get_mut(&resource.connection_id)
                .map(|conn| conn.queue.remove_where(|c| c.ack.as_deref() == Some(method.as_str())))
                .is_some_and(|removed| !removed.is_empty());
            if withdrawn {
                self.methods.remove(method);
            }
        }
        self.collections.remove_query(id);
        self.schedule_flush();
        info!(resource = %id, "resource deleted");
        self.notify(Notification::ResourceDeleted {
            kind: ResourceKind::Query,
            id: id.to_string(),
            entities: resource.entities,
        });
    }

    fn on_ready(&mut self, subs: &[String]) {
        self.flush();
        for id in subs {
            match self.subscriptions.apply(id, ResourceEvent::Loaded) {
                Some(ResourceState::Ready) => {
                    if let Some(sub) = self.subscriptions.get_mut(id) {
                        sub.error = None;
                    }
                    self.notify(Notification::ResourceReady {
                        kind: ResourceKind::Subscription,
                        id: id.clone(),
                    });
                }
                Some(state) => debug!(subscription = %id, state = ?state, "ready ignored"),
                None => debug!(subscription = %id, "ready for unknown subscription"),
            }
        }
    }

    fn on_nosub(&mut self, id: &str, error: Option<MethodError>) {
        let Some(sub) = self.subscriptions.get_mut(id) else {
            debug!(subscription = %id, "nosub for unknown subscription");
            return;
        };
        sub.error = error.clone();
        match &error {
            Some(e) => warn!(subscription = %id, error = %e, "subscription failed"),
            None => debug!(subscription = %id, "subscription stopped by server"),
        }
        self.subscriptions.apply(id, ResourceEvent::Failed);
        self.notify(Notification::ResourceFailed {
            kind: ResourceKind::Subscription,
            id: id.to_string(),
            error,
        });
    }

    // Methods

    fn next_method_id(&mut self) -> String {
        self.ids.next_unused("", |id| self.methods.contains(id))
    }

    fn send_method(&mut self, id: &str) {
        let Some(record) = self.methods.get(id) else {
            return;
        };
        let params: Vec<Json> = record.params.iter().map(|p| self.codec.encode(p)).collect();
        let message = ClientMessage::method(id, record.name.clone(), params);
        let command = QueuedCommand::method(message, record.priority);
        let connection = record.connection_id.clone();
        self.dispatch(Event::Send { connection, command });
    }

    fn on_result(&mut self, connection: &str, id: &str, outcome: MethodResult) {
        if let Some(conn) = self.connections.get_mut(connection) {
            conn.queue.acknowledge(id);
        }
        let Some(record) = self.methods.get_mut(id) else {
            warn!(connection, method = %id, "result for unknown method");
            self.drain(connection);
            return;
        };
        record.outcome = Some(outcome.clone());
        let overlay = record.overlay;
        let resource = match &record.reply {
            Reply::Resource(resource) => Some(resource.clone()),
            _ => None,
        };
        let state = self.methods.apply(id, MethodEvent::Returned);

        if let (true, Ok(value)) = (overlay, &outcome) {
            let entities = (self.extractor)(value);
            self.collections.insert_method(id, &entities);
            if let Some(record) = self.methods.get_mut(id) {
                record.overlay_entities = Some(entities);
            }
            self.schedule_flush();
        }
        if let Some(resource) = resource {
            self.resource_result(&resource, id, outcome);
        }
        if state == Some(MethodState::Completed) {
            self.complete_method(id);
        }
        self.drain(connection);
    }

    fn on_updated(&mut self, methods: &[String]) {
        self.flush();
        for id in methods {
            let before = self.methods.get(id).map(|m| m.state);
            let Some(state) = self.methods.apply(id, MethodEvent::Updated) else {
                debug!(method = %id, "updated for unknown method");
                continue;
            };
            if before == Some(state) {
                debug!(method = %id, ?state, "updated without effect");
                continue;
            }
            self.notify(Notification::MethodUpdated { id: id.clone() });
            if state == MethodState::Completed {
                self.complete_method(id);
            }
        }
    }

    fn complete_method(&mut self, id: &str) {
        if let Some(record) = self.methods.remove(id) {
            let outcome = record.outcome.clone().unwrap_or(Ok(Value::Null));
            self.finish_method(record, outcome);
        }
    }

    /// Decides the fate of a call whose connection dropped.
    fn method_connection_lost(&mut self, id: &str) {
        let Some(record) = self.methods.get_mut(id) else {
            return;
        };
        match record.state {
            MethodState::Queued | MethodState::Completed => {}
            MethodState::Returned => self.complete_method(id),
            MethodState::Pending | MethodState::Updated if record.reply.is_internal() => {
                debug!(method = %id, "dropping internal call");
                self.methods.remove(id);
            }
            MethodState::Pending | MethodState::Updated if record.retry => {
                debug!(method = %id, "call will be retried after reconnect");
                record.awaiting_retry = true;
                record.state = MethodState::Queued;
            }
            state @ (MethodState::Pending | MethodState::Updated) => {
                if let Some(record) = self.methods.remove(id) {
                    self.finish_method(record, Err(MethodError::connection_lost(state.as_str())));
                }
            }
        }
    }

    /// Re-issues a call under a fresh id.
    fn retry_method(&mut self, old: &str) {
        let Some(mut record) = self.methods.remove(old) else {
            return;
        };
        if record.overlay_entities.take().is_some() {
            self.collections.remove_method(old);
            self.schedule_flush();
        }
        let id = self.next_method_id();
        info!(method = %old, retry = %id, "retrying method");
        record.id = id.clone();
        record.awaiting_retry = false;
        record.state = MethodState::Queued;
        record.outcome = None;
        self.methods.insert(record);
        self.send_method(&id);
    }

    /// Delivers the outcome of a removed call.
    fn finish_method(&mut self, record: MethodRecord, outcome: MethodResult) {
        let MethodRecord { id, connection_id, overlay_entities, reply, .. } = record;
        if overlay_entities.is_some() {
            self.collections.remove_method(&id);
            self.schedule_flush();
        }
        debug!(method = %id, ok = outcome.is_ok(), "method settled");
        match reply {
            Reply::Caller(sender) => {
                let _ = sender.send(outcome);
            }
            Reply::Resource(_) => {}
            Reply::Login { resume, caller } => {
                self.login_settled(&connection_id, resume, &outcome);
                if let Some(caller) = caller {
                    let _ = caller.send(outcome);
                }
            }
            Reply::Logout { caller } => {
                if let Some(endpoint) = self.connections.get(&connection_id).map(|c| c.endpoint.clone()) {
                    self.tokens.del(&resume_key(&endpoint));
                }
                self.set_login_state(&connection_id, LoginState::LoggedOut);
                let _ = caller.send(outcome);
            }
        }
    }

    // Session

    fn resume_login(&mut self, connection: &str, token: String) {
        let id = self.next_method_id();
        debug!(connection, method = %id, "resuming login");
        let mut params = Object::new();
        params.insert("resume".to_string(), Value::from(token));
        self.set_login_state(connection, LoginState::LoggingIn);
        let reply = Reply::Login { resume: true, caller: None };
        let priority = self.config.priorities.login;
        let record =
            MethodRecord::new(&id, "login", vec![Value::Object(params)], connection, priority, reply);
        self.methods.insert(record);
        self.send_method(&id);
    }

    fn login_settled(&mut self, connection: &str, resume: bool, outcome: &MethodResult) {
        let endpoint = self.connections.get(connection).map(|c| c.endpoint.clone());
        let login = match outcome {
            Ok(value) => LoginResult::from_value(value),
            Err(error) => {
                warn!(connection, resume, error = %error, "login failed");
                if let (true, Some(endpoint)) = (resume, &endpoint) {
                    self.tokens.del(&resume_key(endpoint));
                }
                None
            }
        };
        match login {
            Some(login) => {
                if let Some(endpoint) = &endpoint {
                    self.tokens.set(&resume_key(endpoint), &login.token);
                }
                info!(connection, user = %login.user_id, "logged in");
                self.set_login_state(connection, LoginState::LoggedIn { user_id: login.user_id });
            }
            None => self.set_login_state(connection, LoginState::LoggedOut),
        }
    }

    fn set_login_state(&mut self, connection: &str, state: LoginState) {
        if self.sessions.set(connection, state.clone()) {
            self.notify(Notification::LoginStateChanged { connection: connection.to_string(), state });
        }
    }

    // Notifications and flushing

    fn schedule_flush(&mut self) {
        if self.flush_timer.is_some() || !self.collections.is_dirty() {
            return;
        }
        let now = self.clock.now_ms();
        let delay = self.config.flush_debounce();
        self.flush_timer = Some(self.timers.schedule(now, delay, TimerTask::Flush));
    }

    fn notify_state(&mut self, connection: &str, state: ConnectionState) {
        self.notify(Notification::ConnectionStateChanged { connection: connection.to_string(), state });
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("connections", &self.connections)
            .field("subscriptions", &self.subscriptions.len())
            .field("resources", &self.resources.len())
            .field("methods", &self.methods.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

fn unknown_connection(connection: &str) -> MethodError {
    MethodError::new("UnknownConnection", format!("no connection {connection}"))
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
