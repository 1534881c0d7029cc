//! The `App` interface implemented by the root application object.
//!
//! [`framework_init`](crate::framework_init) creates a proxy to
//! [`OID_APP`](crate::OID_APP) through this interface and queues an `Init`
//! message carrying the process arguments; captured signals are delivered to
//! the same proxy as `Signal` messages.

use crate::bus::Bus;
use crate::factory::BusObject;
use crate::iface::{DTable, Interface, MethodDesc};
use crate::proxy::Proxy;
use crate::wire::{ArgType, Msg};

pub const METHOD_INIT: u32 = 0;
pub const METHOD_SIGNAL: u32 = 1;

pub static APP: Interface = Interface {
    name: "App",
    methods: &[
        MethodDesc { name: "init", signature: &[ArgType::Array] },
        MethodDesc { name: "signal", signature: &[ArgType::Uint, ArgType::Int, ArgType::Int] },
    ],
    dispatch: dispatch_app,
};

/// Implementation table for the `App` interface.
pub struct AppDTable {
    /// `init(args)`: delivered once at startup with the process arguments
    pub init: fn(&mut dyn BusObject, &mut Bus, Vec<String>),
    /// `signal(signo, child_pid, child_status)`: a captured process signal
    pub signal: fn(&mut dyn BusObject, &mut Bus, i32, i32, i32),
}

fn dispatch_app(dt: &'static DTable, o: &mut dyn BusObject, bus: &mut Bus, msg: &Msg) {
    let table = dt.table.downcast_ref::<AppDTable>().expect("App dtable of the wrong type");
    let mut r = msg.reader();
    match msg.method() {
        METHOD_INIT => {
            let raw = r.read_bytes().expect("malformed App::init message");
            let args = raw
                .split(|b| *b == 0)
                .filter(|s| !s.is_empty())
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect();
            (table.init)(o, bus, args);
        }
        METHOD_SIGNAL => {
            let signo = r.read_u32().expect("malformed App::signal message") as i32;
            let pid = r.read_i32().expect("malformed App::signal message");
            let status = r.read_i32().expect("malformed App::signal message");
            (table.signal)(o, bus, signo, pid, status);
        }
        other => unreachable!("invalid App method index {}", other),
    }
}

/// Queue an `Init` message through `proxy`.
pub fn init(bus: &Bus, proxy: &Proxy, args: &[String]) {
    let mut joined = Vec::new();
    for a in args {
        joined.extend_from_slice(a.as_bytes());
        joined.push(0);
    }
    let mut w = Msg::begin(proxy, METHOD_INIT);
    w.write_bytes(&joined);
    bus.queue(w.finish());
}

/// Queue a `Signal` message through `proxy`.
pub fn signal(bus: &Bus, proxy: &Proxy, signo: i32, child_pid: i32, child_status: i32) {
    bus.queue(signal_msg(proxy, signo, child_pid, child_status));
}

pub(crate) fn signal_msg(proxy: &Proxy, signo: i32, child_pid: i32, child_status: i32) -> Msg {
    let mut w = Msg::begin(proxy, METHOD_SIGNAL);
    w.write_u32(signo as u32).write_i32(child_pid).write_i32(child_status);
    w.finish()
}
