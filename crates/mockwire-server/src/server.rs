//! `MockServer`: the HTTP listener and the gRPC streaming-call listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use mockwire_core::{Clock, SystemClock};
use mockwire_rpc::MockService;
use mockwire_rpc::pb::FILE_DESCRIPTOR_SET;
use mockwire_rpc::pb::mock_service_server::MockServiceServer;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::http::handlers;
use crate::rpc::GrpcMockService;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::{broadcast_ws, echo_ws, missing_room, room_ws};
use crate::websocket::registry::ConnectionRegistry;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Resolved configuration.
    pub config: Arc<ServerConfig>,
    /// Timestamp source for every outgoing message.
    pub clock: Arc<dyn Clock>,
    /// Members of `/ws/broadcast`.
    pub broadcast: Arc<ConnectionRegistry>,
    /// Members of `/ws/chat/{room}`.
    pub rooms: Arc<ConnectionRegistry>,
    /// Streaming-call service.
    pub service: MockService,
    /// Shutdown coordinator.
    pub shutdown: ShutdownCoordinator,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Bound listeners and the tasks serving them.
#[derive(Debug)]
pub struct Listening {
    /// Actual HTTP listener address.
    pub http_addr: SocketAddr,
    /// Actual streaming-call listener address.
    pub stream_addr: SocketAddr,
    /// Serve tasks; each ends after shutdown is triggered.
    pub handles: Vec<JoinHandle<()>>,
}

/// The mock server.
pub struct MockServer {
    state: AppState,
}

impl MockServer {
    /// Server on the system clock without metrics.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Server stamping with `clock`.
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        let service = MockService::new(Arc::clone(&clock))
            .with_server_stream(config.server_stream_count, config.server_stream_interval);
        Self {
            state: AppState {
                config: Arc::new(config),
                clock,
                broadcast: Arc::new(ConnectionRegistry::new("broadcast")),
                rooms: Arc::new(ConnectionRegistry::new("rooms")),
                service,
                shutdown: ShutdownCoordinator::new(),
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Shutdown coordinator shared by every listener, session and call.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.state.shutdown
    }

    /// Routes of the HTTP listener.
    pub fn http_router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(handlers::health))
            .route("/echo", get(handlers::echo_get).post(handlers::echo_post))
            .route("/delay/{seconds}", get(handlers::delay))
            .route("/status/{code}", get(handlers::status))
            .route("/metrics", get(handlers::metrics))
            .route("/ws/echo", get(echo_ws))
            .route("/ws/broadcast", get(broadcast_ws))
            .route("/ws/chat", get(missing_room))
            .route("/ws/chat/", get(missing_room))
            .route("/ws/chat/{room}", get(room_ws))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());
        if self.state.config.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// `mock.MockService` as served on the streaming-call listener.
    pub fn grpc_service(&self) -> MockServiceServer<GrpcMockService> {
        GrpcMockService::new(
            self.state.service.clone(),
            self.state.shutdown.token(),
            self.state.config.call_timeout,
        )
        .into_server(self.state.config.max_message_size)
    }

    /// Bind both listeners and start serving.
    pub async fn listen(&self) -> Result<Listening, ServerError> {
        let (http_addr, http) = self.spawn_http().await?;
        let (stream_addr, stream) = self.spawn_grpc().await?;
        Ok(Listening {
            http_addr,
            stream_addr,
            handles: vec![http, stream],
        })
    }

    async fn bind(name: &'static str, addr: SocketAddr) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(listener = name, local_addr = %listener.local_addr()?, "listening");
        Ok(listener)
    }

    async fn spawn_http(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener = Self::bind("http", self.state.config.http_addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.http_router();

        let shutdown = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if let Err(e) = result {
                error!(listener = "http", error = %e, "listener failed");
            }
            info!(listener = "http", "listener stopped");
        });
        Ok((local_addr, handle))
    }

    /// gRPC listener: `mock.MockService` plus server reflection.
    async fn spawn_grpc(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()?;
        let listener = Self::bind("stream", self.state.config.stream_addr).await?;
        let local_addr = listener.local_addr()?;
        let router = Server::builder()
            .trace_fn(|req| info_span!("grpc", path = %req.uri().path()))
            .add_service(self.grpc_service())
            .add_service(reflection);

        let shutdown = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = router
                .serve_with_incoming_shutdown(
                    TcpListenerStream::new(listener),
                    shutdown.cancelled_owned(),
                )
                .await;
            if let Err(e) = result {
                error!(listener = "stream", error = %e, "listener failed");
            }
            info!(listener = "stream", "listener stopped");
        });
        Ok((local_addr, handle))
    }
}
