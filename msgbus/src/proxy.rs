//! Proxy handles.

use crate::iface::{same_interface, Interface};
use crate::wire::{Msg, MsgWriter};
use crate::Oid;

/// A handle to one directed link: messages sent through a proxy travel from
/// `src` to `dest` over `interface`.
///
/// Two proxies to the same destination from different sources are distinct
/// links. Proxies are created by [`Bus::create_proxy`](crate::Bus::create_proxy)
/// and consumed by [`Bus::destroy_proxy`](crate::Bus::destroy_proxy).
#[derive(Copy, Clone)]
pub struct Proxy {
    /// The interface messages through this proxy are addressed with
    pub interface: &'static Interface,
    /// Id of the owning (sending) object
    pub src: Oid,
    /// Id of the destination object
    pub dest: Oid,
}

impl Proxy {
    /// Start building a message to send through this proxy.
    pub fn message(&self, method: u32) -> MsgWriter {
        Msg::begin(self, method)
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Proxy) -> bool {
        same_interface(self.interface, other.interface)
            && self.src == other.src
            && self.dest == other.dest
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{} -> {}.{}", self.src, self.dest, self.interface.name)
    }
}
