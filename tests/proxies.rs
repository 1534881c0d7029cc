use msgbus::{Bus, BusObject, DTable, Factory, Interface, MethodDesc, Msg, BROADCAST};

struct Node;
impl BusObject for Node {}

fn create_node(_: &mut Bus, _: &Msg) -> Box<dyn BusObject> {
    Box::new(Node)
}

fn poke_impl(_: &mut dyn BusObject, _: &mut Bus) {}

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
    name: "ProxyNode",
    methods: &[MethodDesc { name: "poke", signature: &[] }],
    dispatch: dispatch_node,
};

static NODE_IMPL: NodeDTable = NodeDTable { poke: poke_impl };
static NODE_DTABLE: DTable = DTable { interface: &I_NODE, table: &NODE_IMPL };
static NODE_FACTORY: Factory =
    Factory { create: create_node, object_destroyed: None, error: None, dtables: &[&NODE_DTABLE] };

#[test]
fn destroying_a_routing_link_leaves_the_object_alone() {
    let mut bus = Bus::new();
    bus.register(&NODE_FACTORY);

    let node = bus.create_object(&I_NODE);
    let links = bus.link_count();

    let extra = bus.create_proxy_to(&I_NODE, 9, node.dest);
    assert_eq!(bus.link_count(), links + 1);
    bus.destroy_proxy(extra);
    assert_eq!(bus.link_count(), links);
    assert!(bus.is_object_created(node.dest));
}

#[test]
fn id_allocation_fills_the_smallest_gap() {
    let mut bus = Bus::new();
    bus.register(&NODE_FACTORY);

    let p1 = bus.create_proxy(&I_NODE, BROADCAST);
    let p2 = bus.create_proxy(&I_NODE, BROADCAST);
    let p3 = bus.create_proxy(&I_NODE, BROADCAST);
    assert_eq!((p1.dest, p2.dest, p3.dest), (1, 2, 3));

    bus.destroy_proxy(p2);
    let p4 = bus.create_proxy(&I_NODE, BROADCAST);
    assert_eq!(p4.dest, 2);

    let p5 = bus.create_proxy(&I_NODE, BROADCAST);
    assert_eq!(p5.dest, 4);
}
