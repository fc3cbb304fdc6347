//! Process-wide teardown registry.
//!
//! Components that create host-visible resources (bound UNIX sockets, pid files) register a
//! cleanup callback here. The handlers run exactly once, in registration order, either on normal
//! shutdown or when a termination signal arrives.

use std::sync::{Mutex, Once, OnceLock};
use std::thread;

use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tracing::{debug, error};

use crate::VmkitResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

type ExitHandler = Box<dyn FnOnce() + Send + 'static>;

static HANDLERS: OnceLock<Mutex<Vec<ExitHandler>>> = OnceLock::new();
static RUN_HANDLERS: Once = Once::new();

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Registers a teardown callback.
///
/// Handlers registered after [`run_exit_handlers`] has fired are never invoked.
pub fn register_exit_handler(handler: impl FnOnce() + Send + 'static) {
    let handlers = HANDLERS.get_or_init(|| Mutex::new(Vec::new()));
    if let Result::Ok(mut handlers) = handlers.lock() {
        handlers.push(Box::new(handler));
    }
}

/// Runs all registered teardown callbacks in registration order.
///
/// Subsequent calls, from any thread, are no-ops.
pub fn run_exit_handlers() {
    RUN_HANDLERS.call_once(|| {
        let Some(handlers) = HANDLERS.get() else {
            return;
        };
        let drained = match handlers.lock() {
            Result::Ok(mut handlers) => std::mem::take(&mut *handlers),
            Err(_) => return,
        };
        debug!("running {} exit handlers", drained.len());
        for handler in drained {
            handler();
        }
    });
}

/// Installs a SIGINT/SIGTERM listener that runs the exit handlers and terminates the process.
pub fn setup_exit_signal_handling() -> VmkitResult<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            error!("received signal {signal}, shutting down");
            run_exit_handlers();
            std::process::exit(1);
        }
    });
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn test_exit_handlers_run_once_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let runs = Arc::new(AtomicUsize::new(0));

        for label in ["first", "second", "third"] {
            let order = order.clone();
            let runs = runs.clone();
            register_exit_handler(move || {
                order.lock().unwrap().push(label);
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }

        run_exit_handlers();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        // The registry is process-wide and fires only once.
        run_exit_handlers();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
