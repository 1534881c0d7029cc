use std::sync::Mutex;

use msgbus::{Bus, BusObject, DTable, Factory, Interface, MethodDesc, Msg};

static EVENTS: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

struct Worker;

impl BusObject for Worker {}

impl Drop for Worker {
    fn drop(&mut self) {
        EVENTS.lock().unwrap().push("drop");
    }
}

fn create_worker(_: &mut Bus, _: &Msg) -> Box<dyn BusObject> {
    Box::new(Worker)
}

fn retire_impl(o: &mut dyn BusObject, bus: &mut Bus) {
    EVENTS.lock().unwrap().push("retire");
    bus.mark_unused(o);
}

fn poke_impl(_: &mut dyn BusObject, _: &mut Bus) {
    EVENTS.lock().unwrap().push("poke");
}

struct WorkerDTable {
    retire: fn(&mut dyn BusObject, &mut Bus),
    poke: fn(&mut dyn BusObject, &mut Bus),
}

fn dispatch_worker(dt: &'static DTable, o: &mut dyn BusObject, bus: &mut Bus, msg: &Msg) {
    let table = dt.table.downcast_ref::<WorkerDTable>().unwrap();
    match msg.method() {
        0 => (table.retire)(o, bus),
        1 => (table.poke)(o, bus),
        _ => unreachable!(),
    }
}

static I_WORKER: Interface = Interface {
    name: "Worker",
    methods: &[
        MethodDesc { name: "retire", signature: &[] },
        MethodDesc { name: "poke", signature: &[] },
    ],
    dispatch: dispatch_worker,
};

static WORKER_IMPL: WorkerDTable = WorkerDTable { retire: retire_impl, poke: poke_impl };
static WORKER_DTABLE: DTable = DTable { interface: &I_WORKER, table: &WORKER_IMPL };
static WORKER_FACTORY: Factory = Factory {
    create: create_worker,
    object_destroyed: None,
    error: None,
    dtables: &[&WORKER_DTABLE],
};

#[test]
fn marked_object_survives_the_drain_and_dies_at_idle() {
    let mut bus = Bus::new();
    bus.register(&WORKER_FACTORY);

    let worker = bus.create_object(&I_WORKER);
    bus.queue(worker.message(0).finish()); // retire
    bus.queue(worker.message(1).finish()); // poke, same iteration

    assert!(bus.loop_once());
    bus.loop_once();

    // both messages were dispatched before the idle sweep ran
    assert_eq!(*EVENTS.lock().unwrap(), vec!["retire", "poke", "drop"]);
    // the creator link survives; the object can be constructed again
    assert_eq!(bus.link_count(), 1);
    assert!(!bus.is_object_created(worker.dest));
}
