use msgbus::{bus_error, ArgType, Bus, BusObject, DTable, Factory, Interface, MethodDesc, Msg};

struct Ping;
impl BusObject for Ping {}

fn create_ping(_: &mut Bus, _: &Msg) -> Box<dyn BusObject> {
    Box::new(Ping)
}

fn ping_impl(_: &mut dyn BusObject, bus: &mut Bus, n: u32) {
    bus_error!(bus, "ping {}", n);
}

struct PingDTable {
    ping: fn(&mut dyn BusObject, &mut Bus, u32),
}

fn dispatch_ping(dt: &'static DTable, o: &mut dyn BusObject, bus: &mut Bus, msg: &Msg) {
    let table = dt.table.downcast_ref::<PingDTable>().unwrap();
    match msg.method() {
        0 => {
            let n = msg.reader().read_u32().unwrap();
            (table.ping)(o, bus, n);
        }
        _ => unreachable!(),
    }
}

static I_PING: Interface = Interface {
    name: "Ping",
    methods: &[MethodDesc { name: "ping", signature: &[ArgType::Uint] }],
    dispatch: dispatch_ping,
};

static PING_IMPL: PingDTable = PingDTable { ping: ping_impl };
static PING_DTABLE: DTable = DTable { interface: &I_PING, table: &PING_IMPL };
static PING_FACTORY: Factory =
    Factory { create: create_ping, object_destroyed: None, error: None, dtables: &[&PING_DTABLE] };

#[test]
fn unhandled_error_ends_the_loop_with_failure() {
    let mut bus = Bus::new();
    bus.register(&PING_FACTORY);

    let ping = bus.create_object(&I_PING);
    let mut msg = ping.message(0);
    msg.write_u32(42);
    bus.queue(msg.finish());

    assert_eq!(bus.run(), 1);
    assert!(bus.is_quitting());
    // the error was logged and released
    assert!(bus.pending_error().is_none());
}
