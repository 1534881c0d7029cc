//! In-process component messaging bus.
//!
//! This crate hosts a dynamic population of typed *objects* that communicate
//! exclusively by asynchronous *messages* routed through *proxies*. The bus
//! owns object lifecycle (lazy creation on first message, mark-unused
//! deletion, cascading destruction along the creator chain), message dispatch
//! through per-interface dispatch tables, error propagation along the creator
//! chain, and the translation of process signals into messages.
//!
//! The bus is single-threaded and cooperative: all dispatch, construction,
//! destruction and error handling happen on the loop thread. Exactly one
//! operation is safe from other threads: enqueueing a message through a
//! [`BusSender`]. Handlers must not block; anything that needs to wait should
//! arm a timer or fd watch through the [`Multiplexer`] installed on the bus
//! and return.
//!
//! A minimal embedding registers a root factory implementing the [`app`]
//! interface and runs the loop:
//!
//! ```ignore
//! let mut bus = framework_init(&ROOT_FACTORY, std::env::args().collect());
//! std::process::exit(bus.run());
//! ```

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate downcast_rs;
#[macro_use]
extern crate log;

pub mod app;
mod bus;
mod debug;
mod event_loop;
mod factory;
mod iface;
mod map;
mod proxy;
pub mod signals;
mod wire;

pub use crate::bus::{framework_init, Bus, BusSender};
pub use crate::event_loop::Multiplexer;
pub use crate::factory::{BusObject, Factory};
pub use crate::iface::{same_interface, DTable, DispatchFn, Interface, MethodDesc};
pub use crate::proxy::Proxy;
pub use crate::wire::{ArgType, BodyParseError, Msg, MsgReader, MsgWriter, METHOD_CREATE_OBJECT};

/// Set (or append to) the pending error on a bus, `format!`-style.
///
/// Shorthand for [`Bus::error`] with `format_args!`.
#[macro_export]
macro_rules! bus_error {
    ($bus:expr, $($arg:tt)*) => {
        $bus.error(format_args!($($arg)*))
    };
}

/// An object id. Ids address objects in the link table; they are allocated by
/// [`Bus::create_proxy`] and recycled once every link to the object is gone.
pub type Oid = u16;

/// The null id: "no specific source or destination".
pub const BROADCAST: Oid = 0;

/// The first id handed out by the allocator.
pub const FIRST_OID: Oid = 1;

/// Well-known id of the root application object created by
/// [`framework_init`].
pub const OID_APP: Oid = 1;
