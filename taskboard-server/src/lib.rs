//! Task board server library.
//!
//! Exposes the board server for use in tests and embedding. Clients connect
//! over a WebSocket, authenticate, and then create and edit tasks under
//! optimistic concurrency control while seeing each other's changes,
//! presence, typing and edit locks live.

pub mod assign;
pub mod audit;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod conflict;
pub mod error;
pub mod locks;
pub mod registry;
pub mod server;
pub mod store;
pub mod versioning;
