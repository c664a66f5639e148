use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::Result;

/// One-shot delayed callback on its own thread. Cancelling (or dropping) the
/// timer before the delay elapses prevents the callback from running.
///
/// A callback that has already started is not interrupted, so callers that
/// need exactness must re-check their own state inside the callback.
pub struct LongPressTimer {
    cancel_tx: Sender<()>,
}

impl LongPressTimer {
    pub fn start<F>(name: &str, delay: Duration, on_fire: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(1);
        thread::Builder::new()
            .name(format!("longpress-{name}"))
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(delay) {
                    on_fire();
                }
            })?;
        Ok(Self { cancel_tx })
    }

    pub fn cancel(self) {
        let _ = self.cancel_tx.try_send(());
    }
}
