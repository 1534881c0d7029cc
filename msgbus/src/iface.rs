//! Interface descriptors and dispatch tables.

use std::any::Any;
use std::ptr;

use crate::bus::Bus;
use crate::factory::BusObject;
use crate::wire::{ArgType, Msg, METHOD_CREATE_OBJECT};

/// Entry point invoked by the bus to deliver a message to an object.
///
/// The function is declared by the interface and is opaque to the bus; it
/// downcasts the dtable to the interface's concrete method table, decodes the
/// body, and calls the implementation.
pub type DispatchFn = fn(&'static DTable, &mut dyn BusObject, &mut Bus, &Msg);

/// Description of one method of an interface.
pub struct MethodDesc {
    /// Name of this method
    pub name: &'static str,
    /// Signature of the method body
    pub signature: &'static [ArgType],
}

/// An interface: a named, ordered set of method signatures with a dispatch
/// entry point.
///
/// Interfaces are `static` values referenced by identity; see
/// [`same_interface`].
pub struct Interface {
    /// Name of this interface
    pub name: &'static str,
    /// Description of the methods of this interface
    pub methods: &'static [MethodDesc],
    /// Dispatch entry point for this interface
    pub dispatch: DispatchFn,
}

impl Interface {
    /// Number of methods declared by this interface.
    pub fn method_count(&self) -> u32 {
        self.methods.len() as u32
    }

    /// Method name for diagnostics; tolerates out-of-range indices.
    pub fn method_name(&self, method: u32) -> &'static str {
        if method == METHOD_CREATE_OBJECT {
            return "create_object";
        }
        self.methods.get(method as usize).map(|m| m.name).unwrap_or("?")
    }
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        f.debug_struct("Interface").field("name", &self.name).finish()
    }
}

/// Compare two interfaces for identity.
pub fn same_interface(a: &'static Interface, b: &'static Interface) -> bool {
    ptr::eq(a, b) || a.name == b.name
}

/// Pairs an interface with the implementation table of one object class.
///
/// The `table` is the interface's concrete method-table struct (a set of
/// function pointers); the interface's [`DispatchFn`] downcasts it back.
pub struct DTable {
    /// The implemented interface
    pub interface: &'static Interface,
    /// The implementation, downcast by `interface.dispatch`
    pub table: &'static (dyn Any + Send + Sync),
}
