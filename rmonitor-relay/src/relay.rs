use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rmonitor_hub::{Cache, Dispatcher};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::session::{Session, SessionEnd, SessionId, SessionManager};

/// State shared by the accept loop and every session task
struct Shared {
    config: RelayConfig,
    cache: Arc<Cache>,
    dispatcher: Dispatcher,
    sessions: Arc<SessionManager>,
}

impl Shared {
    fn spawn_session(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let registration = self.sessions.register();
        let shared = Arc::clone(self);

        tokio::spawn(async move {
            let peer = peer_addr.to_string();
            let (reader, writer) = stream.into_split();
            let mut session = Session::new(
                registration.id(),
                peer.as_str(),
                shared.config.charset,
                &shared.config.line_terminator,
            )
            .with_write_timeout(shared.config.write_timeout);
            tracing::info!(session_id = session.id(), peer = %peer, "client connected");

            let result = session
                .run(reader, writer, &shared.cache, &shared.dispatcher, registration.token())
                .await;
            match result {
                Ok(SessionEnd::ClientClosed) => {
                    tracing::info!(session_id = session.id(), peer = %peer, sent = session.sent(), "client disconnected")
                }
                Ok(end) => {
                    tracing::info!(session_id = session.id(), peer = %peer, sent = session.sent(), ?end, "session closed")
                }
                Err(e) => {
                    tracing::warn!(session_id = session.id(), peer = %peer, sent = session.sent(), error = %e, "client dropped")
                }
            }
            drop(registration);
        });
    }
}

struct Listening {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
}

/// Serves the cache snapshot and live reports to downstream clients
///
/// Each accepted client gets its own session: the current snapshot, then
/// every report published on the dispatcher. A slow or broken client only
/// affects itself.
pub struct Relay {
    shared: Arc<Shared>,
    listening: Mutex<Option<Listening>>,
}

impl Relay {
    pub fn new(config: RelayConfig, cache: Arc<Cache>, dispatcher: Dispatcher) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                cache,
                dispatcher,
                sessions: Arc::new(SessionManager::new()),
            }),
            listening: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }

    /// Bind the listening socket and start accepting clients
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.is_running() {
            return Err(RelayError::AlreadyRunning);
        }

        let address = self.shared.config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| RelayError::Bind { address, source })?;
        let local_addr = listener.local_addr()?;

        let mut listening = self.listening.lock();
        if listening.is_some() {
            return Err(RelayError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&self.shared), cancel.clone()));
        *listening = Some(Listening {
            local_addr,
            cancel,
            accept_task,
        });

        tracing::info!(address = %local_addr, "relay listening");
        Ok(local_addr)
    }

    /// Stop accepting clients
    ///
    /// Accepted sessions keep running unless `close_sessions_on_stop` is set.
    pub async fn stop(&self) -> Result<()> {
        let listening = self.listening.lock().take().ok_or(RelayError::NotStarted)?;

        listening.cancel.cancel();
        if let Err(e) = listening.accept_task.await {
            tracing::warn!(error = %e, "relay accept task ended abnormally");
        }

        if self.shared.config.close_sessions_on_stop {
            let closed = self.shared.sessions.close_all();
            tracing::info!(closed, "relay closed client sessions");
        }

        tracing::info!(address = %listening.local_addr, "relay stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.listening.lock().is_some()
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.lock().as_ref().map(|l| l.local_addr)
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.count()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.shared.sessions.ids()
    }

    /// Disconnect one client; false if no such session is live
    pub fn close_session(&self, id: SessionId) -> bool {
        self.shared.sessions.close(id)
    }

    /// Disconnect every client without stopping the listener
    pub fn close_all_sessions(&self) -> usize {
        self.shared.sessions.close_all()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if let Some(listening) = self.listening.get_mut().take() {
            listening.cancel.cancel();
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, peer_addr)) => shared.spawn_session(stream, peer_addr),
                Err(e) => {
                    // Transient accept errors - log and continue
                    tracing::warn!(error = %e, "accept error");
                }
            },
        }
    }
    tracing::debug!("relay accept loop stopped");
}
