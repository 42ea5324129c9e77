//! Upstream feed ingestion
//!
//! A `Collector` reads newline-terminated CSV sentences from a timing system
//! and publishes each parsed report on a [`Dispatcher`]. It keeps no record
//! of what it delivered: after a reconnect the upstream resends its `$I`
//! initialization and full state.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};
use tokio_util::sync::CancellationToken;

use rmonitor_hub::Dispatcher;
use rmonitor_protocol::Report;

use crate::config::{CollectorConfig, CollectorMode};
use crate::error::{CollectorError, Result};

/// Per-connection counters, logged when the connection ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Lines read, including blank ones
    pub lines: u64,
    pub published: u64,
    /// Lines that could not be decoded
    pub skipped: u64,
}

/// Reads an upstream RMONITOR feed into a dispatcher
#[derive(Clone)]
pub struct Collector {
    config: CollectorConfig,
    dispatcher: Dispatcher,
}

impl Collector {
    pub fn new(config: CollectorConfig, dispatcher: Dispatcher) -> Self {
        Self { config, dispatcher }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Run in the configured mode until `cancel` fires
    ///
    /// Pull mode only returns on cancellation. Push mode returns early if the
    /// listening socket cannot be bound.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        match self.config.mode {
            CollectorMode::Pull => {
                self.run_pull(cancel).await;
                Ok(())
            }
            CollectorMode::Push => {
                let listener = self.bind().await?;
                self.serve(listener, cancel).await;
                Ok(())
            }
        }
    }

    /// Connect to the upstream once
    pub async fn connect(&self) -> Result<TcpStream> {
        let address = self.config.address();
        TcpStream::connect(&address)
            .await
            .map_err(|source| CollectorError::Connect { address, source })
    }

    /// Pull mode: connect, read until the feed ends, wait, reconnect
    pub async fn run_pull(&self, cancel: CancellationToken) {
        let address = self.config.address();
        let mut attempt: u32 = 0;

        tracing::info!(upstream = %address, "collector pulling from timing feed");

        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connect() => result,
            };

            match connected {
                Ok(stream) => {
                    attempt = 0;
                    tracing::info!(upstream = %address, "connected to timing feed");

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.run_worker(stream, &address) => match result {
                            Ok(stats) => tracing::info!(upstream = %address, ?stats, "timing feed closed connection"),
                            Err(e) => tracing::warn!(upstream = %address, error = %e, "timing feed connection failed"),
                        },
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "could not reach timing feed");
                }
            }

            let delay = self.config.reconnect.delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!(upstream = %address, delay_ms = delay.as_millis() as u64, "reconnecting");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(upstream = %address, "collector stopped");
    }

    /// Push mode: bind the listening socket
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self.config.address();
        TcpListener::bind(&address)
            .await
            .map_err(|source| CollectorError::Bind { address, source })
    }

    /// Push mode: accept upstream connections, one worker each
    ///
    /// Cancelling stops the accept loop and every worker it started.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "collector accepting timing feeds"),
            Err(e) => tracing::warn!(error = %e, "collector listening on unknown address"),
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = listener.accept() => match result {
                    Ok((stream, peer_addr)) => {
                        let collector = self.clone();
                        let cancel = cancel.child_token();
                        tokio::spawn(async move {
                            let peer = peer_addr.to_string();
                            tracing::info!(peer = %peer, "timing feed connected");
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    tracing::debug!(peer = %peer, "timing feed worker cancelled");
                                }
                                result = collector.run_worker(stream, &peer) => match result {
                                    Ok(stats) => tracing::info!(peer = %peer, ?stats, "timing feed disconnected"),
                                    Err(e) => tracing::warn!(peer = %peer, error = %e, "timing feed connection failed"),
                                },
                            }
                        });
                    }
                    Err(e) => {
                        // Transient accept errors - log and continue
                        tracing::warn!(error = %e, "accept error");
                    }
                },
            }
        }

        tracing::info!("collector stopped accepting timing feeds");
    }

    /// Read sentences from `reader` until end of stream, publishing each one
    ///
    /// Blank lines are ignored. Lines that fail to decode, or run past
    /// `max_line_length` without a newline, are logged and skipped; they never
    /// end the connection. Unknown or malformed sentences are still published
    /// as generic reports.
    pub async fn run_worker<R>(&self, mut reader: R, peer: &str) -> Result<WorkerStats>
    where
        R: AsyncRead + Unpin,
    {
        let mut codec = AnyDelimiterCodec::new_with_max_length(vec![b'\n'], Vec::new(), self.config.max_line_length);
        let mut buf = BytesMut::with_capacity(4096);
        let mut stats = WorkerStats::default();
        let mut eof = false;

        loop {
            let frame = if eof {
                codec.decode_eof(&mut buf)
            } else {
                codec.decode(&mut buf)
            };

            let line = match frame {
                Ok(Some(line)) => line,
                Ok(None) if eof => return Ok(stats),
                Ok(None) => {
                    if reader.read_buf(&mut buf).await? == 0 {
                        eof = true;
                    }
                    continue;
                }
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    // Codec drops the rest of the line up to the next newline
                    stats.lines += 1;
                    stats.skipped += 1;
                    tracing::debug!(peer, max = self.config.max_line_length, "skipping over-long line");
                    continue;
                }
                Err(e) => return Err(std::io::Error::other(e).into()),
            };
            stats.lines += 1;

            let sentence = trim_line_end(&line);
            if sentence.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match Report::from_csv(sentence, self.config.charset, false) {
                Ok(report) => {
                    self.dispatcher.publish(Arc::new(report)).await;
                    stats.published += 1;
                }
                Err(e) => {
                    stats.skipped += 1;
                    tracing::debug!(peer, error = %e, "skipping undecodable line");
                }
            }
        }
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmonitor_hub::KindFilter;
    use tokio::sync::mpsc;

    fn collecting_dispatcher() -> (Dispatcher, rmonitor_hub::Subscription, mpsc::UnboundedReceiver<Arc<Report>>) {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = dispatcher.subscribe(KindFilter::All, move |report| {
            let _ = tx.send(report);
            std::future::ready(())
        });
        (dispatcher, subscription, rx)
    }

    #[test]
    fn test_trim_line_end() {
        assert_eq!(trim_line_end(b"$B,5,Race\r\n"), b"$B,5,Race");
        assert_eq!(trim_line_end(b"$B,5,Race"), b"$B,5,Race");
        assert_eq!(trim_line_end(b"\r\n"), b"");
    }

    #[tokio::test]
    async fn test_worker_publishes_in_order() {
        let (dispatcher, _sub, mut rx) = collecting_dispatcher();
        let collector = Collector::new(CollectorConfig::default(), dispatcher);

        let feed = tokio_test::io::Builder::new()
            .read(b"$I,14:00:00,01 Jan 24\r\n$B,5,Ra")
            .read(b"ce\r\n\r\n$F,10,00:10:00,14:00:00,00:20:00,Green\r\n")
            .build();

        let stats = collector.run_worker(feed, "test").await.unwrap();
        assert_eq!(stats, WorkerStats { lines: 4, published: 3, skipped: 0 });

        let kinds: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|r| r.kind().to_string())
            .collect();
        assert_eq!(kinds, vec!["$I", "$B", "$F"]);
    }

    #[tokio::test]
    async fn test_worker_forwards_malformed_as_generic() {
        let (dispatcher, _sub, mut rx) = collecting_dispatcher();
        let collector = Collector::new(CollectorConfig::default(), dispatcher);

        let feed = tokio_test::io::Builder::new()
            .read(b"$G,first,12\n")
            .read(b"$Q,vendor\n")
            .read(b"$B,5,Race")
            .build();

        let stats = collector.run_worker(feed, "test").await.unwrap();
        assert_eq!(stats, WorkerStats { lines: 3, published: 3, skipped: 0 });

        let reports: Vec<Arc<Report>> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(reports[0].is_generic());
        assert!(reports[1].is_generic());
        assert!(!reports[2].is_generic());
    }

    #[tokio::test]
    async fn test_worker_decodes_charset() {
        let (dispatcher, _sub, mut rx) = collecting_dispatcher();
        let collector = Collector::new(CollectorConfig::default(), dispatcher);

        let feed = tokio_test::io::Builder::new().read(b"$E,TRACKNAME,Autodromo Jos\xe9 Carlos Pace\n").build();
        collector.run_worker(feed, "test").await.unwrap();

        let report = rx.try_recv().unwrap();
        assert_eq!(report.fields()[2], "Autodromo José Carlos Pace");
    }

    #[tokio::test]
    async fn test_worker_skips_over_long_line() {
        let (dispatcher, _sub, mut rx) = collecting_dispatcher();
        let config = CollectorConfig::default().with_max_line_length(32);
        let collector = Collector::new(config, dispatcher);

        let flood = vec![b'x'; 100];
        let feed = tokio_test::io::Builder::new()
            .read(b"$B,5,Race\n")
            .read(&flood)
            .read(&flood)
            .read(b"tail\n$E,TRACKNAME,Sebring\n")
            .build();

        let stats = collector.run_worker(feed, "test").await.unwrap();
        assert_eq!(stats, WorkerStats { lines: 3, published: 2, skipped: 1 });

        let kinds: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|r| r.kind().to_string())
            .collect();
        assert_eq!(kinds, vec!["$B", "$E"]);
    }

    #[tokio::test]
    async fn test_worker_skips_line_with_bare_carriage_return() {
        let (dispatcher, _sub, mut rx) = collecting_dispatcher();
        let collector = Collector::new(CollectorConfig::default(), dispatcher);

        let feed = tokio_test::io::Builder::new()
            .read(b"$E,NOTE,a\rb\r\n$B,5,Race\r\n")
            .build();

        let stats = collector.run_worker(feed, "test").await.unwrap();
        assert_eq!(stats, WorkerStats { lines: 2, published: 1, skipped: 1 });
        assert_eq!(rx.try_recv().unwrap().kind(), "$B");
    }

    #[tokio::test]
    async fn test_worker_surfaces_read_errors() {
        let (dispatcher, _sub, _rx) = collecting_dispatcher();
        let collector = Collector::new(CollectorConfig::default(), dispatcher);

        let feed = tokio_test::io::Builder::new()
            .read(b"$B,5,Race\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let err = collector.run_worker(feed, "test").await.unwrap_err();
        assert!(matches!(err, CollectorError::Io(_)));
    }
}
