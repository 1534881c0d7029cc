//! Debugging helpers to handle the `MSGBUS_DEBUG` env variable.

use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

use crate::wire::Msg;

static DEBUG_ENABLED: Lazy<bool> =
    Lazy::new(|| std::env::var_os("MSGBUS_DEBUG").map_or(false, |v| v != "0"));

/// Whether per-message tracing was requested through the environment.
pub(crate) fn trace_enabled() -> bool {
    *DEBUG_ENABLED
}

/// Print a message about to be dispatched to stderr in the following format:
///
/// [timestamp] src -> dest.interface.method(len)
pub(crate) fn print_dispatched_message(msg: &Msg) {
    print_timestamp();
    eprintln!(
        " {} -> {}.{}.{}({})",
        msg.src(),
        msg.dest(),
        msg.interface().name,
        msg.interface().method_name(msg.method()),
        msg.body().len()
    );
}

/// Print timestamp in seconds.microseconds format.
fn print_timestamp() {
    if let Ok(timestamp) = SystemTime::now().duration_since(UNIX_EPOCH) {
        let sc = timestamp.as_secs();
        let ms = timestamp.subsec_micros();
        eprint!("[{}.{:06}]", sc, ms);
    }
}
