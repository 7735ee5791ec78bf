//! Lock-free block queue between the planner and the step generator.
//!
//! The planner (producer) appends blocks at `head` and keeps rewriting the
//! speeds of blocks it has not settled yet; the step generator (consumer)
//! claims blocks at `nonbusy` and retires them at `tail`. Ownership of each
//! field is encoded in its [`cell::Cell`] type.

pub mod cell;
mod block;
mod consumer;
mod ring;

pub use block::{Block, BlockAction, BlockKind, BlockSnapshot, BlockSpeeds};
pub use consumer::Consumer;
pub use ring::{BlockQueue, Producer, QuickStop};

pub(crate) use ring::FreeSlot;
