//! The link table: the routing map from proxies to objects.
//!
//! The table is a flat sequence sorted in ascending order of destination id.
//! All links to one destination are contiguous; the first link of a run is
//! the *creator* link, the one whose proxy caused the object to be created.
//! It alone holds the object, and its `src` is the parent for error
//! propagation and cascading destruction. The other links of the run are pure
//! routing rows, ordered by proxy creation time.

use crate::factory::{BusObject, Factory};
use crate::iface::Interface;
use crate::proxy::Proxy;
use crate::{Oid, FIRST_OID};

bitflags! {
    pub(crate) struct LinkFlags: u32 {
        /// Destroy the object during the next idle sweep
        const UNUSED = 0x1;
    }
}

/// One row of the routing table.
pub(crate) struct Link {
    pub(crate) interface: &'static Interface,
    pub(crate) src: Oid,
    pub(crate) dest: Oid,
    pub(crate) factory: &'static Factory,
    /// Populated only on the creator link of a live object
    pub(crate) object: Option<Box<dyn BusObject>>,
    pub(crate) flags: LinkFlags,
}

impl Link {
    pub(crate) fn proxy(&self) -> Proxy {
        Proxy { interface: self.interface, src: self.src, dest: self.dest }
    }
}

/// The routing table itself, kept sorted by destination id.
#[derive(Default)]
pub(crate) struct LinkTable {
    pub(crate) links: Vec<Link>,
}

impl LinkTable {
    pub(crate) fn new() -> LinkTable {
        LinkTable { links: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Index of the first link whose destination is not below `dest`.
    pub(crate) fn lower_bound(&self, dest: Oid) -> usize {
        self.links.partition_point(|l| l.dest < dest)
    }

    /// Index of the creator link for `dest`, if the destination is known.
    pub(crate) fn creator_index(&self, dest: Oid) -> Option<usize> {
        let i = self.lower_bound(dest);
        match self.links.get(i) {
            Some(l) if l.dest == dest => Some(i),
            _ => None,
        }
    }

    /// Index of the link a proxy addresses, matching `src` within the run of
    /// its destination.
    pub(crate) fn index_of_proxy(&self, proxy: &Proxy) -> Option<usize> {
        let mut i = self.lower_bound(proxy.dest);
        while let Some(l) = self.links.get(i) {
            if l.dest != proxy.dest {
                break;
            }
            if l.src == proxy.src {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Smallest unused destination id, found by walking the sorted table.
    pub(crate) fn alloc_oid(&self) -> Oid {
        let mut nid = FIRST_OID;
        for l in &self.links {
            if nid < l.dest {
                break;
            }
            if nid == l.dest {
                nid += 1;
            }
        }
        nid
    }

    /// Insert a link at the end of the run for `dest`, so an existing creator
    /// link stays first. Returns the insertion index.
    pub(crate) fn insert(
        &mut self,
        interface: &'static Interface,
        src: Oid,
        dest: Oid,
        factory: &'static Factory,
    ) -> usize {
        let mut i = self.lower_bound(dest);
        while i < self.links.len() && self.links[i].dest == dest {
            i += 1;
        }
        self.links.insert(
            i,
            Link { interface, src, dest, factory, object: None, flags: LinkFlags::empty() },
        );
        i
    }

    pub(crate) fn remove(&mut self, index: usize) -> Link {
        self.links.remove(index)
    }
}
