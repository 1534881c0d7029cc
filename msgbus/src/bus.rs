//! The bus: routing table, factory registry, object lifecycle, message
//! queues and the error-propagation chain.

use std::fmt;
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::app;
use crate::event_loop::Multiplexer;
use crate::factory::{BusObject, Factory};
use crate::iface::{DTable, Interface};
use crate::map::{LinkFlags, LinkTable};
use crate::proxy::Proxy;
use crate::signals;
use crate::wire::{Msg, METHOD_CREATE_OBJECT};
use crate::{Oid, BROADCAST, OID_APP};

/// Double-buffered queue half shared with [`BusSender`] handles.
pub(crate) type QueueBuffer = Arc<Mutex<Vec<Msg>>>;

/// An object checked out of its link for the duration of a user-code
/// invocation. `dead` is set when the creator link is erased while the object
/// is out; restore then drops the object instead of putting it back.
pub(crate) struct ActiveObject {
    oid: Oid,
    ptr: *const (),
    dead: bool,
}

/// The message bus.
///
/// All operations except [`Bus::queue`] (and the [`BusSender`] handles it
/// hands out) must be called on the loop thread.
pub struct Bus {
    pub(crate) links: LinkTable,
    pub(crate) factories: Vec<&'static Factory>,
    pub(crate) default_factory: Option<&'static Factory>,
    /// Read by the current loop iteration
    pub(crate) input: Vec<Msg>,
    /// Written by `queue`; swapped into `input` at the end of each drain
    pub(crate) output: QueueBuffer,
    pub(crate) error: Option<String>,
    pub(crate) quitting: bool,
    pub(crate) exit_code: i32,
    pub(crate) app_proxy: Option<Proxy>,
    pub(crate) multiplexer: Option<Box<dyn Multiplexer>>,
    pub(crate) active: SmallVec<[ActiveObject; 4]>,
}

impl Default for Bus {
    fn default() -> Bus {
        Bus::new()
    }
}

impl Bus {
    /// Create an empty bus.
    pub fn new() -> Bus {
        Bus {
            links: LinkTable::new(),
            factories: Vec::new(),
            default_factory: None,
            input: Vec::new(),
            output: Arc::new(Mutex::new(Vec::new())),
            error: None,
            quitting: false,
            exit_code: 0,
            app_proxy: None,
            multiplexer: None,
            active: SmallVec::new(),
        }
    }

    /// Tear everything down: links (running destructors and destruction
    /// notifications), queued messages, registrations and the error slot.
    ///
    /// Calling `reset` on a fresh or already-reset bus is a no-op.
    pub fn reset(&mut self) {
        debug!("resetting bus");
        while !self.links.is_empty() {
            let last = self.links.len() - 1;
            self.destroy_link_at(last);
        }
        self.output.lock().unwrap().clear();
        self.input.clear();
        self.factories.clear();
        self.default_factory = None;
        self.error = None;
        self.app_proxy = None;
    }

    //------------------------------------------------------------------
    // Factory registry

    /// Register an object class.
    ///
    /// Duplicate registration is permitted; earlier entries win on lookup.
    pub fn register(&mut self, factory: &'static Factory) {
        assert!(!factory.dtables.is_empty(), "a factory must implement at least one interface");
        if log_enabled!(log::Level::Trace) {
            let names: Vec<&str> = factory.dtables.iter().map(|dt| dt.interface.name).collect();
            trace!("registered class {}", names.join(","));
        }
        self.factories.push(factory);
    }

    /// Register (or with `None`, unregister) the fallback class consulted for
    /// interfaces no registered factory implements.
    pub fn register_default(&mut self, factory: Option<&'static Factory>) {
        if let Some(f) = factory {
            assert!(!f.dtables.is_empty(), "a factory must implement at least one interface");
        }
        self.default_factory = factory;
    }

    /// First registered factory implementing `iface`, else the default.
    pub fn find_factory(&self, iface: &'static Interface) -> Option<&'static Factory> {
        self.factories
            .iter()
            .copied()
            .find(|f| f.dtable_for(iface).is_some())
            .or(self.default_factory)
    }

    /// The dtable `factory` dispatches `iface` with. The default factory
    /// falls back to its first dtable, acting as an interface-promiscuous
    /// forwarder.
    pub fn find_dtable(
        &self,
        factory: &'static Factory,
        iface: &'static Interface,
    ) -> Option<&'static DTable> {
        factory.dtable_for(iface).or_else(|| {
            match self.default_factory {
                Some(d) if std::ptr::eq(d, factory) => d.dtables.first().copied(),
                _ => None,
            }
        })
    }

    /// Look an interface up by name across all registered factories and the
    /// default.
    pub fn interface_by_name(&self, name: &str) -> Option<&'static Interface> {
        for f in &self.factories {
            for dt in f.dtables {
                if dt.interface.name == name {
                    return Some(dt.interface);
                }
            }
        }
        match self.default_factory.and_then(|d| d.dtables.first()) {
            Some(dt) if dt.interface.name == name => Some(dt.interface),
            _ => None,
        }
    }

    //------------------------------------------------------------------
    // Proxies and the link table

    /// Create a proxy to a new object from `src`, using `iface`. The
    /// destination id is the smallest unused one.
    pub fn create_proxy(&mut self, iface: &'static Interface, src: Oid) -> Proxy {
        let dest = self.links.alloc_oid();
        self.create_proxy_to(iface, src, dest)
    }

    /// Create a proxy to the existing object `dest` from `src`, using
    /// `iface`. The new link lands at the end of the run for `dest`, so an
    /// existing creator link stays first.
    pub fn create_proxy_to(&mut self, iface: &'static Interface, src: Oid, dest: Oid) -> Proxy {
        let factory = self
            .find_factory(iface)
            .unwrap_or_else(|| panic!("no factory registered for interface {}", iface.name));
        let i = self.links.insert(iface, src, dest, factory);
        trace!("created proxy link {:?}", self.links.links[i].proxy());
        self.links.links[i].proxy()
    }

    /// Destroy the link a proxy addresses. If it was the creator link, the
    /// object is destroyed and destruction cascades to everything it created.
    pub fn destroy_proxy(&mut self, proxy: Proxy) {
        if let Some(i) = self.links.index_of_proxy(&proxy) {
            self.destroy_link_at(i);
        }
    }

    /// Find the id of an object, [`BROADCAST`] if the bus does not host it.
    ///
    /// Works from inside the object's own handlers.
    pub fn oid_of(&self, object: &dyn BusObject) -> Oid {
        let p = object as *const dyn BusObject as *const ();
        for l in &self.links.links {
            if let Some(o) = &l.object {
                if std::ptr::eq(&**o as *const dyn BusObject as *const (), p) {
                    return l.dest;
                }
            }
        }
        for frame in &self.active {
            if frame.ptr == p && !frame.dead {
                return frame.oid;
            }
        }
        BROADCAST
    }

    /// Schedule an object for destruction during the next idle.
    pub fn mark_unused(&mut self, object: &dyn BusObject) {
        let oid = self.oid_of(object);
        if oid == BROADCAST {
            return;
        }
        if let Some(i) = self.links.creator_index(oid) {
            self.links.links[i].flags |= LinkFlags::UNUSED;
        }
    }

    /// Number of links currently in the routing table.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Whether the object addressed by `oid` has been constructed.
    pub fn is_object_created(&self, oid: Oid) -> bool {
        match self.links.creator_index(oid) {
            Some(i) => {
                self.links.links[i].object.is_some()
                    || self.active.iter().any(|f| f.oid == oid && !f.dead)
            }
            None => false,
        }
    }

    /// The proxy to the root application object, once
    /// [`framework_init`] has created it.
    pub fn app_proxy(&self) -> Option<Proxy> {
        self.app_proxy
    }

    /// Log the routing table at trace severity.
    pub fn dump_link_table(&self) {
        trace!("current link table:");
        for l in &self.links.links {
            trace!(
                "\t{:?}\t({}){:x}",
                l.proxy(),
                if l.object.is_some() { "live" } else { "-" },
                l.flags.bits()
            );
        }
    }

    //------------------------------------------------------------------
    // Object lifecycle

    /// Resolve the destination of a message, constructing the object if its
    /// creator link does not hold one yet. The object is checked out; the
    /// caller must hand it back through `restore_object`.
    ///
    /// Returns `None` when the destination was destroyed after the message
    /// was sent.
    pub(crate) fn find_or_create_destination(
        &mut self,
        msg: &Msg,
    ) -> Option<(Box<dyn BusObject>, &'static Factory)> {
        let dest = msg.dest();
        let mut created: Option<Box<dyn BusObject>> = None;
        loop {
            // the constructor may create proxies, moving the link, so the
            // run is located afresh on every pass
            let i = match self.links.creator_index(dest) {
                Some(i) => i,
                None => return None,
            };
            let factory = self.links.links[i].factory;
            if self.links.links[i].object.is_some() {
                return Some((self.checkout(i), factory));
            }
            if let Some(o) = created.take() {
                self.links.links[i].object = Some(o);
                return Some((self.checkout(i), factory));
            }
            debug!("creating object {}.{}", dest, msg.interface().name);
            created = Some((factory.create)(self, msg));
        }
    }

    /// Convenience: create a broadcast-sourced proxy and force construction
    /// of its object. The new object is addressed by the returned proxy.
    pub fn create_object(&mut self, iface: &'static Interface) -> Proxy {
        let proxy = self.create_proxy(iface, BROADCAST);
        let msg = Msg::begin(&proxy, METHOD_CREATE_OBJECT).finish();
        if let Some((obj, _)) = self.find_or_create_destination(&msg) {
            self.restore_object(obj);
        }
        proxy
    }

    /// Move the object out of the creator link at `i` for a user-code
    /// invocation.
    pub(crate) fn checkout(&mut self, i: usize) -> Box<dyn BusObject> {
        let link = &mut self.links.links[i];
        let obj = link.object.take().expect("checkout of an absent object");
        self.active.push(ActiveObject {
            oid: link.dest,
            ptr: &*obj as *const dyn BusObject as *const (),
            dead: false,
        });
        obj
    }

    /// Hand a checked-out object back. The creator link is re-resolved
    /// because the invocation may have moved or erased it; a dead frame means
    /// the link was erased and the object is dropped here.
    pub(crate) fn restore_object(&mut self, obj: Box<dyn BusObject>) {
        let frame = self.active.pop().expect("restore without checkout");
        debug_assert!(std::ptr::eq(frame.ptr, &*obj as *const dyn BusObject as *const ()));
        if frame.dead {
            return;
        }
        if let Some(i) = self.links.creator_index(frame.oid) {
            let link = &mut self.links.links[i];
            if link.object.is_none() {
                link.object = Some(obj);
            }
        }
    }

    /// Erase the link at `i`; if it was the creator link of a live object,
    /// destroy the object.
    pub(crate) fn destroy_link_at(&mut self, i: usize) {
        if i >= self.links.len() {
            return;
        }
        let first_of_run = self.links.lower_bound(self.links.links[i].dest) == i;
        let link = self.links.remove(i);
        trace!("destroyed proxy link {:?}", link.proxy());
        if let Some(obj) = link.object {
            self.destroy_object(link.dest, Some(obj));
        } else if first_of_run {
            // creator link of an object currently checked out for dispatch:
            // run the cascade now, drop the object when it is handed back
            let mut out = false;
            for frame in self.active.iter_mut().rev() {
                if frame.oid == link.dest && !frame.dead {
                    frame.dead = true;
                    out = true;
                    break;
                }
            }
            if out {
                self.destroy_object(link.dest, None);
            }
        }
    }

    /// Destroy an object: run its destructor, notify its callers, and erase
    /// every link it owns, transitively destroying everything it created.
    fn destroy_object(&mut self, oid: Oid, obj: Option<Box<dyn BusObject>>) {
        debug!("destroying object {}", oid);
        drop(obj);
        // snapshot the callers; ObjectDestroyed handlers mutate the table
        let callers: SmallVec<[Oid; 16]> = self
            .links
            .links
            .iter()
            .filter(|l| l.dest == oid && l.src != BROADCAST)
            .map(|l| l.src)
            .collect();
        for caller in callers {
            // the caller's creator link may have moved or vanished
            let i = match self.links.creator_index(caller) {
                Some(i) => i,
                None => continue,
            };
            let factory = self.links.links[i].factory;
            let hook = match factory.object_destroyed {
                Some(h) => h,
                None => continue,
            };
            if self.links.links[i].object.is_none() {
                continue;
            }
            trace!("notifying object {} of the destruction of {}", caller, oid);
            let mut o = self.checkout(i);
            hook(o.as_mut(), self, oid);
            self.restore_object(o);
        }
        // erase all links from the destroyed object; cascaded destructions
        // and handlers can reorder the table, so restart after every erase
        let mut i = 0;
        while i < self.links.len() {
            if self.links.links[i].src == oid {
                self.destroy_link_at(i);
                i = 0;
            } else {
                i += 1;
            }
        }
    }

    /// Destroy every object flagged unused. Runs during idle.
    pub(crate) fn destroy_unused_objects(&mut self) {
        let mut i = 0;
        while i < self.links.len() {
            if self.links.links[i].flags.contains(LinkFlags::UNUSED) {
                let link = &mut self.links.links[i];
                link.flags = LinkFlags::empty();
                let oid = link.dest;
                let obj = link.object.take();
                if obj.is_some() {
                    debug!("destroying unused object {}", oid);
                    self.destroy_object(oid, obj);
                }
                i = 0;
            } else {
                i += 1;
            }
        }
    }

    //------------------------------------------------------------------
    // Queueing

    /// Queue a message for delivery in the next loop iteration.
    ///
    /// The destination must be a valid link; debug builds assert the full
    /// enqueue contract.
    pub fn queue(&self, msg: Msg) {
        #[cfg(debug_assertions)]
        self.validate_enqueue(&msg);
        self.output.lock().unwrap().push(msg);
    }

    /// A cloneable handle for queueing messages from other threads.
    pub fn sender(&self) -> BusSender {
        BusSender { output: self.output.clone() }
    }

    #[cfg(debug_assertions)]
    fn validate_enqueue(&self, msg: &Msg) {
        let iface = msg.interface();
        let factory = self.find_factory(iface);
        assert!(
            factory.is_some(),
            "message addressed to unregistered interface {}",
            iface.name
        );
        let dest = self
            .links
            .creator_index(msg.dest())
            .unwrap_or_else(|| panic!("message addressed to unknown destination {}", msg.dest()));
        assert!(
            self.find_dtable(self.links.links[dest].factory, iface).is_some(),
            "message forwarded to an object that does not support interface {}",
            iface.name
        );
        let through = Proxy { interface: iface, src: msg.src(), dest: msg.dest() };
        assert!(
            self.links.index_of_proxy(&through).is_some(),
            "message sent through a deleted proxy; do not destroy proxies in \
             destructors or object-destroyed hooks"
        );
        if msg.method() == METHOD_CREATE_OBJECT {
            assert!(
                msg.body().is_empty() && msg.fdoffset().is_none(),
                "invalid create-object message"
            );
            return;
        }
        assert!(
            msg.method() < iface.method_count(),
            "invalid destination method index {} for interface {}",
            msg.method(),
            iface.name
        );
        match msg.validate_signature() {
            Ok(n) => assert_eq!(
                n,
                msg.body().len(),
                "message body does not match the signature of {}.{}",
                iface.name,
                iface.method_name(msg.method())
            ),
            Err(e) => panic!("invalid body for {}.{}: {}", iface.name, iface.method_name(msg.method()), e),
        }
    }

    //------------------------------------------------------------------
    // Error chain

    /// Set (or append to) the pending error. It is examined after the current
    /// delivery and forwarded along the creator chain.
    pub fn error(&mut self, args: fmt::Arguments<'_>) {
        let text = args.to_string();
        match &mut self.error {
            Some(cur) => {
                cur.push_str("\n\t");
                cur.push_str(&text);
            }
            None => self.error = Some(text),
        }
        debug!("error set: {}", self.error.as_deref().unwrap_or(""));
    }

    /// The pending error text, if a handler has raised one.
    pub fn pending_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Offer the pending error to object `to`, reporting `failing` as the
    /// object that failed. An object that does not consume it passes it to
    /// its creator, one hop per recursion. Returns whether some object along
    /// the chain consumed the error.
    pub fn forward_error(&mut self, to: Oid, failing: Oid) -> bool {
        debug_assert!(self.error.is_some(), "forward_error requires a pending error");
        let i = match self.links.creator_index(to) {
            Some(i) => i,
            None => return false,
        };
        let factory = self.links.links[i].factory;
        let parent = self.links.links[i].src;
        if self.links.links[i].object.is_none() {
            // never constructed: the chain ends here. The object currently
            // executing counts as unable to handle its own failure.
            if !self.active.iter().any(|f| f.oid == to && !f.dead) {
                return false;
            }
            return self.forward_error(parent, to);
        }
        debug!("handling error in object {}", to);
        if let Some(hook) = factory.error {
            let text = match &self.error {
                Some(t) => t.clone(),
                None => return false,
            };
            let mut o = self.checkout(i);
            let handled = hook(o.as_mut(), self, failing, &text);
            self.restore_object(o);
            if handled {
                debug!("error handled by object {}", to);
                self.error = None;
                return true;
            }
        }
        self.forward_error(parent, to)
    }

    //------------------------------------------------------------------
    // Loop control

    /// Request an orderly quit. The first request pins the exit code; the
    /// loop finishes its current iteration and exits.
    pub fn quit(&mut self, exit_code: i32) {
        if !self.quitting {
            debug!("quit requested, exit code {}", exit_code);
            self.quitting = true;
            self.exit_code = exit_code;
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Cross-thread enqueue handle.
///
/// This is the only bus operation reachable from outside the loop thread.
/// Senders cannot see the routing table, so the enqueue contract is checked
/// when the loop picks the message up rather than here.
#[derive(Clone)]
pub struct BusSender {
    output: QueueBuffer,
}

impl BusSender {
    pub fn queue(&self, msg: Msg) {
        self.output.lock().unwrap().push(msg);
    }
}

/// Process-level setup for applications whose outermost loop is the bus:
/// installs the signal handlers, registers the root factory, creates the
/// proxy to [`OID_APP`] and queues the `Init(args)` message. Follow with
/// [`Bus::run`].
pub fn framework_init(root_factory: &'static Factory, args: Vec<String>) -> Bus {
    signals::install_handlers();
    let mut bus = Bus::new();
    bus.register(root_factory);
    let proxy = bus.create_proxy_to(&app::APP, BROADCAST, OID_APP);
    bus.app_proxy = Some(proxy);
    app::init(&bus, &proxy, &args);
    bus
}
