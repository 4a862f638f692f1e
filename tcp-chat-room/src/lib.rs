//! Line-oriented TCP chat room.
//!
//! Clients connect, answer the username prompt, and every line they send is
//! relayed as `<name>: <line>` to everyone in the room, the sender included.
//!
//! - [`coordinator`] owns the set of active participants and serializes
//!   joins, leaves, and broadcasts through a single task.
//! - [`connection`] runs the per-client protocol: login, relaying in both
//!   directions, and teardown.
//! - [`participant`] holds the bounded, drop-on-full inbox each client is
//!   delivered through.
//! - [`message`] defines chat messages and the line codec.
//! - [`server`] accepts TCP connections and hands them to handlers.
//! - [`cli`] parses the command-line interface of the binary.

pub mod cli;
pub mod connection;
pub mod coordinator;
pub mod message;
pub mod participant;
pub mod server;
