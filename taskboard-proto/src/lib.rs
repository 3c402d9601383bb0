//! Shared protocol definitions for the task board wire format.

pub mod activity;
pub mod board;
pub mod codec;
pub mod conflict;
pub mod presence;
pub mod task;
pub mod typing;
