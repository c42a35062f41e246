#![cfg(all(unix, feature = "stream"))]

//! Mirrors and a host talking over a real Unix socket.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use storesync::counter::{counter_store, Counter};
use storesync::frame::{UnixChannelListener, UnixConnector};
use storesync::peer::{connect, expose, Mirror, MirrorDriver};
use tokio::time::timeout;

fn make_sock_path(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "ssunix-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir.join("store.sock")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn thousands_of_dispatches_in_flight_all_settle() {
    const DISPATCHES: i64 = 5_000;

    let sock_path = make_sock_path("flood");
    let store = Arc::new(counter_store());
    let listener = UnixChannelListener::bind(&sock_path).expect("listener should bind");
    let host = tokio::spawn(expose(store.clone(), listener, None));

    let (mirror, driver): (Mirror<Value>, MirrorDriver<Value>) = timeout(
        Duration::from_secs(5),
        connect("flood", &UnixConnector::new(&sock_path)),
    )
    .await
    .expect("connect should not time out")
    .expect("mirror should connect");
    tokio::spawn(driver.run());

    let pad = "x".repeat(64);
    let pending: Vec<_> = (0..DISPATCHES)
        .map(|_| {
            mirror
                .dispatch(&json!({ "type": "INCREMENT", "pad": pad }))
                .expect("dispatch should be sent")
        })
        .collect();

    timeout(Duration::from_secs(30), async {
        for dispatch in pending {
            dispatch.await.expect("dispatch should resolve");
        }
    })
    .await
    .expect("every dispatch should settle");

    assert_eq!(mirror.pending_dispatches(), 0);
    assert_eq!(store.get_state(), Counter { counter: DISPATCHES });
    assert_eq!(
        mirror.get_state().expect("mirror should be connected"),
        json!({ "counter": DISPATCHES })
    );

    host.abort();
    let _ = std::fs::remove_dir_all(sock_path.parent().expect("socket has a parent"));
}
