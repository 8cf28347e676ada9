// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod message;
pub mod store;

pub use message::{Message, Role, Session};
pub use store::{SessionError, SessionLimits, SessionStore};
