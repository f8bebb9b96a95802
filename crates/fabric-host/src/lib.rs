//! `fabrichostd`'s activation supervisor (spec §1): one entry FSM per
//! managed service, a restart/backoff scheduler, a two-level registry, an
//! IPC dispatcher, a settings watcher, and the top-level host lifecycle
//! that sequences them all.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod entry;
pub mod host;
pub mod launcher;
pub mod notify;
pub mod registry;
pub mod requester;
pub mod restart;
pub mod settings;
pub mod stats;
pub mod supervisor;
pub mod transport;

pub use host::Host;
