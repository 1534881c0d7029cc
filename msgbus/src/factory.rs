//! Object factories: the metadata describing how an object class is created,
//! notified, and which interfaces it implements.

use downcast_rs::Downcast;

use crate::bus::Bus;
use crate::iface::{same_interface, DTable, Interface};
use crate::wire::Msg;
use crate::Oid;

/// An object hosted by the bus.
///
/// Destruction is the object's `Drop` impl. `Downcast` lets dispatch tables
/// recover the concrete type.
pub trait BusObject: Downcast {}
impl_downcast!(BusObject);

/// Metadata for an object class.
///
/// Factories are `static` values compared by identity. A factory must declare
/// at least one dtable; [`Bus::register`] checks this.
pub struct Factory {
    /// Constructor, invoked on the first message addressed to a new object.
    /// `msg` is the message that triggered creation; the constructor may
    /// itself create proxies.
    pub create: fn(&mut Bus, &Msg) -> Box<dyn BusObject>,
    /// Invoked on each live caller of an object after that object has been
    /// destroyed.
    pub object_destroyed: Option<fn(&mut dyn BusObject, &mut Bus, Oid)>,
    /// Error hook; return `true` to consume the error, `false` to let it
    /// travel further up the creator chain.
    pub error: Option<fn(&mut dyn BusObject, &mut Bus, Oid, &str) -> bool>,
    /// Dispatch tables, one per implemented interface.
    pub dtables: &'static [&'static DTable],
}

impl Factory {
    /// The dtable this factory declares for `iface`, if any.
    pub fn dtable_for(&self, iface: &'static Interface) -> Option<&'static DTable> {
        self.dtables.iter().copied().find(|dt| same_interface(dt.interface, iface))
    }
}
