//! Downstream client sessions
//!
//! A session subscribes to the dispatcher before it reads the cache, then
//! writes the snapshot followed by every live report in arrival order. A
//! report published between the two steps may be sent twice; none is
//! skipped.
//!
//! Live reports queue without bound while a write is in progress, so every
//! write has a deadline: a client that stops reading is disconnected once
//! one record has waited `write_timeout`, and its queue goes with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rmonitor_hub::{Cache, Dispatcher, KindFilter};
use rmonitor_protocol::{Charset, Report};

use crate::config::DEFAULT_WRITE_TIMEOUT;
use crate::error::{RelayError, Result};

/// Identifier of one accepted client
pub type SessionId = u64;

/// Cancellation handles for every live session
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, CancellationToken>>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new session until the returned guard is dropped
    pub fn register(self: &Arc<Self>) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let mut sessions = self.sessions.lock();
        sessions.insert(id, cancel.clone());
        tracing::debug!(session_id = id, total = sessions.len(), "session registered");

        Registration {
            id,
            cancel,
            manager: Arc::clone(self),
        }
    }

    /// Cancel one session; false if it already ended
    pub fn close(&self, id: SessionId) -> bool {
        match self.sessions.lock().get(&id) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every session, returning how many were live
    pub fn close_all(&self) -> usize {
        let sessions = self.sessions.lock();
        for cancel in sessions.values() {
            cancel.cancel();
        }
        sessions.len()
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn remove(&self, id: SessionId) {
        let mut sessions = self.sessions.lock();
        if sessions.remove(&id).is_some() {
            tracing::debug!(session_id = id, remaining = sessions.len(), "session removed");
        }
    }
}

/// Membership of one session in a [`SessionManager`]
pub struct Registration {
    id: SessionId,
    cancel: CancellationToken,
    manager: Arc<SessionManager>,
}

impl Registration {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.manager.remove(self.id);
    }
}

/// How a session ended without an I/O error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Cancelled,
    ClientClosed,
    DispatcherClosed,
}

/// One downstream client
pub struct Session {
    id: SessionId,
    peer: String,
    charset: Charset,
    terminator: Vec<u8>,
    write_timeout: Duration,
    sent: u64,
}

impl Session {
    pub fn new(id: SessionId, peer: impl Into<String>, charset: Charset, terminator: &str) -> Self {
        Self {
            id,
            peer: peer.into(),
            charset,
            terminator: terminator.as_bytes().to_vec(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            sent: 0,
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Records written so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Serve the client until it disconnects, a write fails, or `cancel` fires
    ///
    /// Anything the client sends is read and discarded; end of stream on
    /// `reader` ends the session.
    pub async fn run<R, W>(
        &mut self,
        reader: R,
        mut writer: W,
        cache: &Cache,
        dispatcher: &Dispatcher,
        cancel: CancellationToken,
    ) -> Result<SessionEnd>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (queue, mut pending) = mpsc::unbounded_channel::<Arc<Report>>();
        let _subscription = dispatcher.subscribe(KindFilter::All, move |report| {
            // Only fails once the session is gone
            let _ = queue.send(report);
            futures::future::ready(())
        });
        let snapshot = cache.snapshot();

        tracing::debug!(session_id = self.id, peer = %self.peer, records = snapshot.len(), "sending snapshot");

        let end = tokio::select! {
            _ = cancel.cancelled() => SessionEnd::Cancelled,
            _ = discard_until_closed(reader) => SessionEnd::ClientClosed,
            result = self.forward(&mut writer, snapshot, &mut pending) => {
                result?;
                SessionEnd::DispatcherClosed
            }
        };

        if end != SessionEnd::ClientClosed {
            // Best effort: the client may already be gone
            let _ = writer.shutdown().await;
        }
        Ok(end)
    }

    async fn forward<W>(
        &mut self,
        writer: &mut W,
        snapshot: Vec<Arc<Report>>,
        pending: &mut mpsc::UnboundedReceiver<Arc<Report>>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        for report in snapshot {
            self.send(writer, &report).await?;
        }
        while let Some(report) = pending.recv().await {
            self.send(writer, &report).await?;
        }
        Ok(())
    }

    async fn send<W>(&mut self, writer: &mut W, report: &Report) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut frame = report.encode_csv(self.charset);
        frame.extend_from_slice(&self.terminator);
        let write = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };
        tokio::time::timeout(self.write_timeout, write)
            .await
            .map_err(|_| RelayError::WriteTimeout(self.write_timeout))??;
        self.sent += 1;
        Ok(())
    }
}

async fn discard_until_closed<R>(mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 512];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "client read failed");
                return;
            }
        }
    }
}
