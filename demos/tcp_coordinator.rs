//! Minimal host-coordinator wiring: connect to a Tigo gateway over TCP,
//! persist state to a JSON document, and print every parsed event.

use std::path::PathBuf;
use tigotap::coordinator::{CoordinatorBuilder, HostCoordinator, load_document, run_persistence_task};
use tigotap::source::TcpSource;
use tokio::sync::{Notify, mpsc};

#[tokio::main]
async fn main() {
    let host = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1".into());
    let port: u16 = std::env::args().nth(2).and_then(|p| p.parse().ok()).unwrap_or(4000);
    let persist_path = PathBuf::from("tigotap-state.json");

    let config = CoordinatorBuilder::new()
        .with_persist_path(persist_path.clone())
        .build();

    let doc = load_document(&persist_path).await;
    let mut coordinator = HostCoordinator::from_persisted(config, doc);

    let mut source = TcpSource::new(host.clone(), port);
    source.connect().await.expect("initial connection to gateway failed");

    let (persist_tx, persist_rx) = mpsc::channel(8);
    let persist_task = tokio::spawn(run_persistence_task(persist_path, std::time::Duration::from_secs(30), persist_rx));

    let cancel = Notify::new();
    println!("listening on {host}:{port}");
    coordinator.run(Box::new(source), persist_tx, &cancel).await;

    drop(coordinator);
    let _ = persist_task.await;
}
