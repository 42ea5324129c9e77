use std::sync::Arc;
use std::time::Duration;

use rmonitor_collector::{Collector, CollectorConfig, ReconnectPolicy};
use rmonitor_hub::{Cache, Dispatcher, KindFilter};
use rmonitor_protocol::{Report, ReportBody};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn watch(dispatcher: &Dispatcher) -> (rmonitor_hub::Subscription, mpsc::UnboundedReceiver<Arc<Report>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = dispatcher.subscribe(KindFilter::All, move |report| {
        let _ = tx.send(report);
        std::future::ready(())
    });
    (subscription, rx)
}

async fn next_report(rx: &mut mpsc::UnboundedReceiver<Arc<Report>>) -> Arc<Report> {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for report")
        .expect("dispatcher dropped")
}

#[tokio::test]
async fn test_pull_reconnects_after_upstream_closes() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = upstream.local_addr().unwrap().port();

    let dispatcher = Dispatcher::new();
    let cache = Arc::new(Cache::new());
    let _attached = cache.attach(&dispatcher);
    let (_watch, mut rx) = watch(&dispatcher);

    let config = CollectorConfig::pull("127.0.0.1", port)
        .with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(20)));
    let collector = Collector::new(config, dispatcher);
    let cancel = CancellationToken::new();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { collector.run(cancel).await })
    };

    // First session, then the timing system drops the connection
    let (mut feed, _) = upstream.accept().await.unwrap();
    feed.write_all(b"$I,14:00:00,01 Jan 24\r\n$B,5,Practice\r\n").await.unwrap();
    drop(feed);

    assert_eq!(next_report(&mut rx).await.kind(), "$I");
    assert_eq!(next_report(&mut rx).await.fields()[2], "Practice");

    // Collector comes back on its own and the upstream resends its state
    let (mut feed, _) = tokio::time::timeout(WAIT, upstream.accept()).await.unwrap().unwrap();
    feed.write_all(b"$I,15:00:00,01 Jan 24\r\n$B,6,Race\r\n").await.unwrap();

    assert_eq!(next_report(&mut rx).await.kind(), "$I");
    assert_eq!(next_report(&mut rx).await.fields()[2], "Race");

    match cache.lookup("$B", None).unwrap().body() {
        ReportBody::RunInfo(run) => assert_eq!(run.id, 6),
        other => panic!("expected run info, got {:?}", other),
    }
    assert_eq!(cache.len(), 2);

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_pull_cancel_while_upstream_unreachable() {
    // Reserve a port, then close it so connects are refused
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = CollectorConfig::pull("127.0.0.1", port)
        .with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(10)));
    let collector = Collector::new(config, Dispatcher::new());
    let cancel = CancellationToken::new();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { collector.run(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_push_accepts_independent_feeds() {
    let dispatcher = Dispatcher::new();
    let (_watch, mut rx) = watch(&dispatcher);

    let collector = Collector::new(CollectorConfig::push(0).with_host("127.0.0.1"), dispatcher);
    let listener = collector.bind().await.unwrap();
    let address = listener.local_addr().unwrap();

    let cancel = CancellationToken::new();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { collector.serve(listener, cancel).await })
    };

    let mut first = TcpStream::connect(address).await.unwrap();
    let mut second = TcpStream::connect(address).await.unwrap();

    first.write_all(b"$E,TRACKNAME,Sebring\r\n").await.unwrap();
    second.write_all(b"garbage line without tag\r\n$C,1,GTP\r\n").await.unwrap();
    drop(second);
    first.write_all(b"$F,10,00:10:00,14:00:00,00:20:00,Green\r\n").await.unwrap();

    let mut kinds = Vec::new();
    for _ in 0..4 {
        kinds.push(next_report(&mut rx).await.kind().to_string());
    }
    kinds.sort();
    assert_eq!(kinds, vec!["$C", "$E", "$F", "garbage line without tag"]);

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_push_bind_conflict() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let collector = Collector::new(CollectorConfig::push(port).with_host("127.0.0.1"), Dispatcher::new());
    let err = collector.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, rmonitor_collector::CollectorError::Bind { .. }));
}
