//! Parlor — realtime chat synchronization client library.

pub mod config;
pub mod effects;
pub mod service;
pub mod store;
pub mod stream;
pub mod sync;
pub mod transport;
