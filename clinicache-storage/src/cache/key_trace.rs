//! Per-call record of the cache keys the engine sent to the backend.
//!
//! Wrap a call in [`trace_keys`] to learn which keys and patterns it read,
//! wrote or deleted. Detached population tasks run outside the scope, but
//! their key was already recorded by the read that spawned them.

use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static TRACE: RefCell<Vec<String>>;
}

/// Run `fut` and return its output with every key and pattern the engine
/// touched while it ran, in order.
pub async fn trace_keys<F: Future>(fut: F) -> (F::Output, Vec<String>) {
    TRACE
        .scope(RefCell::new(Vec::new()), async move {
            let output = fut.await;
            let keys = TRACE.with(RefCell::take);
            (output, keys)
        })
        .await
}

pub(crate) fn record(key: &str) {
    // Outside a trace scope there is nothing to record.
    let _ = TRACE.try_with(|trace| trace.borrow_mut().push(key.to_string()));
}
