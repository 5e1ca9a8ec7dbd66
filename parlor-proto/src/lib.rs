//! Shared protocol definitions for the Parlor server contract.

pub mod codec;
pub mod event;
pub mod message;
pub mod snapshot;
