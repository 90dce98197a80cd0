//! # Tank Server Library
//!
//! This library provides the session server behind the shared fish tank. It
//! keeps one authoritative world in memory, serves every connected client a
//! menu-driven view of it, and lets the economy evolve on a fixed tick.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Handles the complete lifecycle of client connections including:
//! - Connection admission and unique display names
//! - Menu state per session, including the organism it is looking at
//! - Disconnection handling and departure notices
//!
//! ### Input Processing
//! Key presses are queued as they arrive and dispatched on the next tick in
//! arrival order. A key that does not name a choice is answered with an
//! invalid-choice message and otherwise ignored.
//!
//! ### World Economy
//! Food appears, organisms get hungry, claim food and eat it. Total mass
//! never exceeds the tank ceiling and is conserved by every transfer.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! Connection tasks only translate between sockets and channels. All state
//! lives in the [`coordinator::Coordinator`], which is driven from one loop
//! that handles inbound messages and tick events one at a time. There are
//! no locks around sessions or the world.
//!
//! ### WebSocket Communication
//! Clients speak JSON over WebSocket text frames. The message types are
//! defined in the `shared` crate so that Rust peers and the server agree.
//!
//! ## Module Organization
//!
//! ### Identity (`identity`)
//! Allocates random display names that no live session holds.
//!
//! ### Registry (`registry`)
//! Tracks live sessions and delivers direct and broadcast output.
//!
//! ### Menus (`menu`, `menus`)
//! The menu catalog and state machine, plus the default menus served to
//! every session.
//!
//! ### Queue and Scheduler (`queue`, `scheduler`)
//! The FIFO of pending key presses and the fixed-period tick bookkeeping.
//!
//! ### World and Store (`world`, `store`)
//! Organisms, food and the economy rules, with best-effort snapshot
//! persistence.
//!
//! ### Network (`network`)
//! The listener, per-connection tasks and the main server loop.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod menu;
pub mod menus;
pub mod network;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod world;

pub use config::ServerConfig;
pub use coordinator::{Coordinator, TickReport};
pub use error::ServerError;
pub use network::Server;
pub use store::{ConfiguredStore, FileStore, MemoryStore, WorldStore};
