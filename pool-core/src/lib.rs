//! # Device-pool orchestrator — in-process element engine
//!
//! This crate is the core of a long-lived process that manages a set of
//! laboratory devices (motors, counters, I/O registers, and the pseudo
//! elements computed from them) through pluggable controller code loaded
//! at runtime. It is the in-process engine only: registry, plug-in
//! loader, property binder, controller sessions, event bus, pseudo
//! transforms, scheduler, temporary composites, and the hot-reload
//! orchestrator. No transport, no GUI, no scripting front-end — those are
//! the caller's concern (see `poold` for the process that hosts this
//! crate).
//!
//! A single [`registry::Registry`] instance is expected to exist for the
//! lifetime of the process; every other component resolves an
//! [`ids::ElementId`] through it rather than holding a direct reference.
//! Lock order is: registry monitor, then an element's own serialization
//! monitor, then a controller session's monitor, then the loader's
//! reentrant class lock (see `controller` and `loader` module docs).

pub mod binder;
pub mod config_store;
pub mod controller;
pub mod elements;
pub mod error;
pub mod event_bus;
pub mod hotreload;
pub mod ids;
pub mod loader;
pub mod naming;
pub mod property;
pub mod pseudo;
pub mod registry;
pub mod scheduler;
pub mod temporary;

pub use error::{PoolError, PoolResult};
pub use ids::{ElementId, IdAllocator, IdSpace};
pub use registry::Registry;
