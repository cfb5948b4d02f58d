// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! ddp-client: sans-IO client engine for the DDP protocol.
//!
//! The [`Engine`] multiplexes subscriptions, query resources, and method
//! calls over refcounted connections, gates outbound traffic by priority,
//! and merges server documents with local overlays in a [`CollectionStore`].
//! Sockets and sleeping are left to a driver; see `ddp-cli` for one built
//! on tokio.

pub mod clock;
pub mod collection;
pub mod config;
pub mod connection;
pub mod engine;
pub mod event;
pub mod id;
pub mod method;
pub mod mock;
pub mod queue;
pub mod resource;
pub mod session;
pub mod timer;
pub mod transport;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use collection::{entities_from_value, CollectionStore, Document, Entities};
pub use config::{EngineConfig, Priorities};
pub use connection::{Connection, ConnectionState};
pub use engine::{CallOptions, Engine, EngineBuilder, Extractor, ResourceOptions};
pub use event::{Event, Inbound, Interceptor, Notification};
pub use method::{MethodHandle, MethodResult, MethodState};
pub use queue::{Priority, QueuedCommand};
pub use resource::{Resource, ResourceKind, ResourceState};
pub use session::{LoginState, MemoryTokenStorage, TokenStorage};
pub use timer::TimerTask;
pub use transport::{Transport, TransportError, TransportEvent, TransportFactory};

pub use ddp_core::{Codec, MethodError, TypeRegistry, Value};
