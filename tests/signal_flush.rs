extern crate msgbus;
extern crate nix;

use std::sync::Mutex;

use msgbus::app::{self, AppDTable};
use msgbus::{framework_init, Bus, BusObject, DTable, Factory, Msg};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

static EVENTS: Mutex<Vec<(i32, i32, i32)>> = Mutex::new(Vec::new());

struct Root {
    raise: Signal,
}

impl BusObject for Root {}

fn create_root_usr1(_: &mut Bus, _: &Msg) -> Box<dyn BusObject> {
    Box::new(Root { raise: Signal::SIGUSR1 })
}

fn create_root_term(_: &mut Bus, _: &Msg) -> Box<dyn BusObject> {
    Box::new(Root { raise: Signal::SIGTERM })
}

fn on_init(o: &mut dyn BusObject, _: &mut Bus, args: Vec<String>) {
    assert_eq!(args, vec!["selftest".to_owned()]);
    let root = o.downcast_ref::<Root>().unwrap();
    kill(Pid::this(), root.raise).unwrap();
}

fn on_signal(_: &mut dyn BusObject, bus: &mut Bus, signo: i32, pid: i32, status: i32) {
    EVENTS.lock().unwrap().push((signo, pid, status));
    bus.quit(7);
}

static ROOT_IMPL: AppDTable = AppDTable { init: on_init, signal: on_signal };
static ROOT_DTABLE: DTable = DTable { interface: &app::APP, table: &ROOT_IMPL };

static ROOT_USR1: Factory = Factory {
    create: create_root_usr1,
    object_destroyed: None,
    error: None,
    dtables: &[&ROOT_DTABLE],
};

static ROOT_TERM: Factory = Factory {
    create: create_root_term,
    object_destroyed: None,
    error: None,
    dtables: &[&ROOT_DTABLE],
};

// This test cannot run under the default harness because cargo would run it
// on a helper thread, and the signals must hit the loop thread's process
// state deterministically.
fn main() {
    // a captured signal becomes the first message of the next iteration
    let mut bus = framework_init(&ROOT_USR1, vec!["selftest".to_owned()]);
    assert_eq!(bus.run(), 7);
    {
        let events = EVENTS.lock().unwrap();
        assert_eq!(*events, vec![(Signal::SIGUSR1 as i32, 0, 0)]);
    }
    drop(bus);
    EVENTS.lock().unwrap().clear();

    // a quit-class signal ends the loop with 128+signo before the message
    // can be delivered
    let mut bus = framework_init(&ROOT_TERM, vec!["selftest".to_owned()]);
    assert_eq!(bus.run(), 128 + Signal::SIGTERM as i32);
    assert!(EVENTS.lock().unwrap().is_empty());
}
