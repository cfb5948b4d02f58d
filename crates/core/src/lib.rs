// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! ddp-core: Shared library for the ddp client runtime
//!
//! This crate provides the extended JSON (EJSON) value model and codec, the
//! wire protocol message types, and the core error type. It performs no I/O;
//! the protocol engine lives in `ddp-client`.

pub mod ejson;
pub mod error;
pub mod protocol;

pub use ejson::{Codec, CustomType, EqualsOptions, Object, StringifyOptions, TypeRegistry, Value};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, MethodError, ServerMessage};
