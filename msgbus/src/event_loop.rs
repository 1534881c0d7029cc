//! The dispatch loop: per-iteration drain of the double-buffered queues and
//! the idle phase between iterations.

use std::mem;

use crate::app;
use crate::bus::Bus;
use crate::debug;
use crate::signals;
use crate::wire::METHOD_CREATE_OBJECT;

/// Seam to the external timer and file-descriptor multiplexer.
///
/// `timeout` is a millisecond budget; `None` means block until something
/// fires. The bus blocks only when both queues are empty. Implementations
/// queue resulting messages through a [`BusSender`](crate::BusSender) and
/// return whether any timer or watch remains armed; once nothing is armed and
/// the queues are empty, the loop quits.
pub trait Multiplexer {
    fn run(&mut self, timeout: Option<u32>) -> bool;
}

impl Bus {
    /// Install the timer/fd multiplexer serviced during idle.
    pub fn set_multiplexer(&mut self, mux: Box<dyn Multiplexer>) {
        self.multiplexer = Some(mux);
    }

    /// Run the loop until a quit is requested or the bus runs out of work.
    /// Returns the exit code.
    pub fn run(&mut self) -> i32 {
        self.quitting = false;
        self.exit_code = 0;
        while !self.quitting {
            self.do_message_queues();
            self.idle();
        }
        self.exit_code
    }

    /// Do one loop iteration; for embedding the bus inside another loop.
    /// Returns whether any work remains queued.
    pub fn loop_once(&mut self) -> bool {
        if let Some(mux) = self.multiplexer.as_mut() {
            mux.run(Some(0));
        }
        self.do_message_queues();
        self.destroy_unused_objects();
        !self.input.is_empty() || !self.output.lock().unwrap().is_empty()
    }

    /// Deliver every message in the input queue, then swap in the output
    /// queue for the next iteration.
    pub(crate) fn do_message_queues(&mut self) {
        let input = mem::take(&mut self.input);
        for msg in &input {
            if debug::trace_enabled() {
                debug::print_dispatched_message(msg);
            }
            let (mut obj, factory) = match self.find_or_create_destination(msg) {
                Some(found) => found,
                // addressed to an object deleted after sending
                None => continue,
            };
            if msg.method() != METHOD_CREATE_OBJECT {
                let dtable = self
                    .find_dtable(factory, msg.interface())
                    .expect("destination does not support the message interface");
                // the dtable's own dispatch entry point runs the delivery; for
                // the default factory it is not the message interface's one
                (dtable.interface.dispatch)(dtable, obj.as_mut(), self, msg);
            }
            self.restore_object(obj);
            // a delivery that raised an error surfaces it along the sender's
            // creator chain; an unhandled error ends the program
            if self.error.is_some() && !self.forward_error(msg.src(), msg.dest()) {
                let text = self.error.take().unwrap_or_default();
                error!("Error: {}", text);
                self.quit(1);
                break;
            }
        }
        drop(input);
        let mut output = self.output.lock().unwrap();
        self.input = mem::take(&mut *output);
    }

    /// The phase between iterations: flush a captured signal, sweep unused
    /// objects, service timers, and quit once no work remains.
    pub(crate) fn idle(&mut self) {
        self.flush_signal();
        self.destroy_unused_objects();
        let queued = !self.input.is_empty() || !self.output.lock().unwrap().is_empty();
        let timeout = if queued || self.quitting { Some(0) } else { None };
        let armed = match self.multiplexer.as_mut() {
            Some(mux) => mux.run(timeout),
            None => false,
        };
        // the multiplexer may have queued messages of its own
        let queued = !self.input.is_empty() || !self.output.lock().unwrap().is_empty();
        if !armed && !queued {
            debug!("ran out of messages, quitting");
            self.quit(0);
        }
    }

    /// Turn the pending signal slot into a `Signal` message to the root
    /// object. The message goes directly onto the input queue, so it leads
    /// the next iteration when the loop was woken out of an empty-queue wait.
    fn flush_signal(&mut self) {
        let (signo, pid, status) = match signals::take_pending() {
            Some(pending) => pending,
            None => return,
        };
        if let Some(proxy) = self.app_proxy {
            if self.links.index_of_proxy(&proxy).is_some() {
                self.input.push(app::signal_msg(&proxy, signo, pid, status));
            }
        }
        if signals::is_quit_signal(signo) {
            self.quit(signals::SIGNAL_EXIT_OFFSET + signo);
        }
    }
}
