//! Mirror host: one process running the broker, capture agents and the
//! HTTP receiver.
//!
//! The host owns the in-process bus. The controller runs in the broker
//! context with the [`ReceiverBridge`] as its window manager, so opening a
//! mirror binds a receiver slot that `GET /api/frame` serves from.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mirror_core::bus::{LocalBus, Mailbox, MessageBus};
use mirror_core::capture::{CaptureAgent, CaptureHost, CaptureSource};
use mirror_core::controller::MirrorController;
use mirror_core::error::MirrorError;
use mirror_core::message::{ContextId, Message, StreamStats};

use crate::bridge::ReceiverBridge;
use crate::config::ServerConfig;
use crate::routes::{self, AppState};

/// Context the controller and broker run in.
pub const BROKER_CONTEXT: ContextId = ContextId(0);
/// Context the host issues control requests from.
pub const HOST_CONTEXT: ContextId = ContextId(1);

/// How long a control request waits for the broker's reply.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MirrorHost {
    config: ServerConfig,
    bus: Arc<LocalBus>,
    bridge: Arc<ReceiverBridge>,
    replies: Mutex<Mailbox>,
    token: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl MirrorHost {
    /// Build the bus and start the controller.
    pub fn start(config: ServerConfig) -> Self {
        let bus = Arc::new(LocalBus::new());
        let bridge = Arc::new(ReceiverBridge::new(Arc::clone(&bus), BROKER_CONTEXT));
        let token = CancellationToken::new();

        let controller = MirrorController::new(
            BROKER_CONTEXT,
            bus.clone(),
            bridge.clone(),
            config.to_controller_config(),
        );
        let task = tokio::spawn(controller.run(bus.register(BROKER_CONTEXT), token.child_token()));
        let replies = Mutex::new(bus.register(HOST_CONTEXT));

        info!("mirror host started");
        Self {
            config,
            bus,
            bridge,
            replies,
            token,
            tasks: std::sync::Mutex::new(vec![task]),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<LocalBus> {
        &self.bus
    }

    pub fn bridge(&self) -> &Arc<ReceiverBridge> {
        &self.bridge
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register a page context that can be mirrored and start its agent.
    pub fn attach_source(
        &self,
        id: ContextId,
        url: impl Into<String>,
        host: Arc<dyn CaptureHost>,
    ) -> Result<(), MirrorError> {
        if self.bus.is_registered(id) {
            return Err(MirrorError::Other(format!("context {id} already attached")));
        }
        let url = url.into();
        let source = CaptureSource::new(
            id,
            BROKER_CONTEXT,
            self.bus.clone(),
            host,
            self.config.to_capture_config(),
        );
        let agent = CaptureAgent::new(source, self.bus.clone());
        let task = tokio::spawn(agent.run(self.bus.register(id), self.token.child_token()));
        self.track(task);
        info!(%id, %url, "capture source attached");
        self.bridge.register_source(id, url);
        Ok(())
    }

    /// The page is gone: unregister it and let the broker end its session.
    pub fn detach_source(&self, id: ContextId) -> Result<(), MirrorError> {
        self.bridge.unregister_source(id);
        self.bus.unregister(id);
        self.bus
            .send(HOST_CONTEXT, BROKER_CONTEXT, Message::TabRemoved { tab_id: id })
    }

    /// Open a mirror of `source`; returns the receiver slot it is bound to.
    pub async fn open_mirror(&self, source: ContextId) -> Result<ContextId, MirrorError> {
        match self.request(Message::OpenMirror { source_id: source }).await? {
            Message::MirrorOpened { target_id, .. } => Ok(target_id),
            Message::MirrorFailed { error } => Err(MirrorError::Other(error)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn close_mirror(&self) -> Result<(), MirrorError> {
        match self.request(Message::CloseMirror).await? {
            Message::MirrorClosed => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn stats(&self) -> Result<StreamStats, MirrorError> {
        match self.request(Message::GetStats).await? {
            Message::Stats(stats) => Ok(stats),
            other => Err(unexpected(&other)),
        }
    }

    pub fn router(&self) -> Router {
        routes::router(self.app_state())
    }

    /// Serve the receiver until the host is shut down.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let state = self.app_state();
        if let Ok(addr) = listener.local_addr() {
            info!("receiver listening at http://{}:{}", state.ip, addr.port());
        }
        axum::serve(listener, routes::router(state))
            .with_graceful_shutdown(self.token.clone().cancelled_owned())
            .await
    }

    /// Cancel every task and wait up to `timeout` for them to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        self.token.cancel();
        let handles: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        info!(task_count = handles.len(), "waiting for tasks to complete");

        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("shutdown timed out after {timeout:?}");
        }
        self.bridge.close_all();
    }

    fn app_state(&self) -> AppState {
        AppState::new(&self.config, self.bridge.clone())
    }

    async fn request(&self, message: Message) -> Result<Message, MirrorError> {
        let mut replies = self.replies.lock().await;
        // Replies left over from a request that timed out.
        while replies.try_recv().is_ok() {}

        self.bus.send(HOST_CONTEXT, BROKER_CONTEXT, message)?;
        match tokio::time::timeout(REQUEST_TIMEOUT, replies.recv()).await {
            Ok(Some(envelope)) => Ok(envelope.message),
            Ok(None) => Err(MirrorError::ChannelClosed),
            Err(_) => Err(MirrorError::Other("broker did not reply".into())),
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task);
    }
}

fn unexpected(message: &Message) -> MirrorError {
    MirrorError::Other(format!("unexpected reply: {}", message.action()))
}

// ── Tests ────────────────────────────────────────────────────────
