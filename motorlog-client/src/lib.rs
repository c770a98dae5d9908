//! Client SDK for the motorlog vehicle-maintenance API
//!
//! This SDK provides the authenticated request layer the app is built on:
//! - Issue requests to the backend with bearer credentials attached
//! - Transparently recover from expired access tokens (one refresh
//!   exchange, one replay of the original request)
//! - Keep the in-memory session consistent with durable "remember me"
//!   storage across process restarts

pub mod bridge;
pub mod client;
pub mod errors;
pub mod models;
pub mod session;
pub mod storage;

pub use bridge::SessionBridge;
pub use client::ApiClient;
pub use errors::*;
pub use models::*;
pub use session::{Session, SessionState, SessionStore};
pub use storage::{memory::MemoryStorage, DurableStore};
