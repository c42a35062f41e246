//! One host store, two mirrors, all in one process.
//!
//! Run with:
//!   cargo run --example counter
//!
//! The same store over a socket:
//!   cargo run --features cli -- host /tmp/storesync-counter.sock
//!   cargo run --features cli -- dispatch /tmp/storesync-counter.sock \
//!     --action '{"type":"INCREMENT"}'

use std::sync::Arc;

use serde_json::json;
use storesync::channel::memory_hub;
use storesync::counter::{counter_store, Counter};
use storesync::peer::{connect, connect_narrowed, expose};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(counter_store());
    let (connector, acceptor) = memory_hub();
    let host = tokio::spawn(expose(store.clone(), acceptor, None));

    let (popup, popup_driver) = connect::<Counter, _>("popup", &connector).await?;
    let popup_task = tokio::spawn(popup_driver.run());

    // This mirror only keeps whether the counter is positive.
    let (badge, badge_driver) =
        connect_narrowed("badge", &connector, |state: Counter| state.counter > 0).await?;
    let badge_task = tokio::spawn(badge_driver.run());

    eprintln!(
        "connected: popup={:?} badge={:?}",
        popup.get_state()?,
        badge.get_state()?
    );

    for _ in 0..3 {
        popup.dispatch(&json!({ "type": "INCREMENT" }))?.await?;
    }
    eprintln!("popup after 3 increments: {:?}", popup.get_state()?);

    badge.dispatch(&json!({ "type": "DECREMENT" }))?.await?;
    eprintln!(
        "host={:?} popup={:?} badge={:?}",
        store.get_state(),
        popup.get_state()?,
        badge.get_state()?
    );

    if let Err(err) = popup.replace_reducer(()) {
        eprintln!("replace_reducer on a mirror: {err}");
    }

    popup_task.abort();
    badge_task.abort();
    drop((popup, badge, connector));
    let _ = host.await;
    Ok(())
}
