use std::sync::Arc;

use rmonitor_hub::{Cache, Dispatcher, KindFilter};
use rmonitor_protocol::{Charset, Report};

fn publishable(line: &[u8]) -> Arc<Report> {
    Arc::new(Report::from_csv(line, Charset::default(), false).unwrap())
}

#[tokio::test]
async fn test_reset_line_clears_populated_cache() {
    let cache = Arc::new(Cache::new());
    let dispatcher = Dispatcher::new();
    let _attached = cache.attach(&dispatcher);

    for line in [
        &b"$B,5,Friday practice"[..],
        b"$C,1,GTP",
        b"$A,12,12,5512,Ann,Lee,,1",
        b"$G,1,12,3,00:10:00.000",
        b"$F,10,00:10:00,14:00:00,00:20:00,Green",
    ] {
        dispatcher.publish(publishable(line)).await;
    }
    assert_eq!(cache.len(), 5);

    dispatcher.publish(publishable(b"$I,14:00:00,01 Jan 24")).await;

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].fields(), ["$I", "14:00:00", "01 Jan 24"]);
}

#[tokio::test]
async fn test_reset_then_n_records() {
    let cache = Arc::new(Cache::new());
    let dispatcher = Dispatcher::new();
    let _attached = cache.attach(&dispatcher);

    dispatcher.publish(publishable(b"$I,14:00:00,01 Jan 24")).await;
    let lines: Vec<String> = (1..=7).map(|n| format!("$COMP,{},{},1,F,L,,", n, n)).collect();
    for line in &lines {
        dispatcher.publish(publishable(line.as_bytes())).await;
    }

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.len(), lines.len() + 1);
    assert!(snapshot[0].is_reset());
}

#[tokio::test]
async fn test_unknown_sentences_reach_subscribers_but_not_cache() {
    let cache = Arc::new(Cache::new());
    let dispatcher = Dispatcher::new();
    let _attached = cache.attach(&dispatcher);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _listener = dispatcher.subscribe(KindFilter::All, move |report| {
        let _ = tx.send(report);
        futures::future::ready(())
    });

    assert_eq!(dispatcher.publish(publishable(b"$X,vendor,specific")).await, 2);

    assert_eq!(rx.recv().await.unwrap().kind(), "$X");
    assert!(cache.is_empty());
}
