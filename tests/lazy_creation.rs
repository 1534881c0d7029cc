use std::sync::atomic::{AtomicUsize, Ordering};

use msgbus::{Bus, BusObject, DTable, Factory, Interface, MethodDesc, Msg, BROADCAST};

static CREATED: AtomicUsize = AtomicUsize::new(0);
static POKED: AtomicUsize = AtomicUsize::new(0);

struct Node;
impl BusObject for Node {}

fn create_node(_: &mut Bus, _: &Msg) -> Box<dyn BusObject> {
    CREATED.fetch_add(1, Ordering::SeqCst);
    Box::new(Node)
}

fn poke_impl(_: &mut dyn BusObject, _: &mut Bus) {
    POKED.fetch_add(1, Ordering::SeqCst);
}

struct NodeDTable {
    poke: fn(&mut dyn BusObject, &mut Bus),
}

fn dispatch_node(dt: &'static DTable, o: &mut dyn BusObject, bus: &mut Bus, msg: &Msg) {
    let table = dt.table.downcast_ref::<NodeDTable>().unwrap();
    match msg.method() {
        0 => (table.poke)(o, bus),
        _ => unreachable!(),
    }
}

static I_NODE: Interface = Interface {
    name: "Node",
    methods: &[MethodDesc { name: "poke", signature: &[] }],
    dispatch: dispatch_node,
};

static NODE_IMPL: NodeDTable = NodeDTable { poke: poke_impl };
static NODE_DTABLE: DTable = DTable { interface: &I_NODE, table: &NODE_IMPL };
static NODE_FACTORY: Factory =
    Factory { create: create_node, object_destroyed: None, error: None, dtables: &[&NODE_DTABLE] };

#[test]
fn object_is_constructed_on_first_message_only() {
    let mut bus = Bus::new();
    bus.register(&NODE_FACTORY);

    // a proxy makes a link, not an object
    let proxy = bus.create_proxy(&I_NODE, BROADCAST);
    assert_eq!(proxy.dest, 1);
    assert_eq!(bus.link_count(), 1);
    assert!(!bus.is_object_created(proxy.dest));
    assert_eq!(CREATED.load(Ordering::SeqCst), 0);

    bus.queue(proxy.message(0).finish());
    assert!(bus.loop_once()); // moves the message into the input queue
    bus.loop_once(); // delivers it

    assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    assert_eq!(POKED.load(Ordering::SeqCst), 1);
    assert!(bus.is_object_created(proxy.dest));

    // further messages reuse the constructed object
    bus.queue(proxy.message(0).finish());
    while bus.loop_once() {}
    assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    assert_eq!(POKED.load(Ordering::SeqCst), 2);
}
