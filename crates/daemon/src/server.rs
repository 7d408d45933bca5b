//! The JSON-RPC-over-newlines server loop (spec.md §6): stdio is the
//! primary transport, with a minimal `tokio::net::TcpListener` loop as a
//! secondary surface over the same framing. Grounded in
//! `rewrite/crates/daemon/src/server.rs`'s accept-loop/shutdown/
//! `BufReader::read_line` pattern, substituting `TcpListener`/`TcpStream`
//! for the teacher's `UnixListener`/`UnixStream` per spec.md §6 — this
//! system has no multi-session Unix-socket concept to preserve.

use std::sync::Arc;

use serde_json::Value;
use sourcelens_core::config::EmbeddingConfig;
use sourcelens_core::model::AnnKey;
use sourcelens_db::ChunkStore;
use sourcelens_ipc::{
  GetStatsResult, HealthCheckResult, HealthStatus, Method, Request, Response, RpcError, RpcErrorKind,
  SearchRegexParams, SearchSemanticParams, TaskQueueStats,
};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::coordinator::TaskCoordinator;
use crate::error::DaemonError;
use crate::search::SearchService;

#[derive(Debug, Error)]
pub enum ServerError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// The shared, cloneable state every connection (stdio or TCP) dispatches
/// requests against.
pub struct RequestHandler {
  store: Arc<ChunkStore>,
  search: SearchService,
  embedding: EmbeddingConfig,
  coordinator: Arc<TaskCoordinator>,
}

impl RequestHandler {
  pub fn new(store: Arc<ChunkStore>, search: SearchService, embedding: EmbeddingConfig, coordinator: Arc<TaskCoordinator>) -> Self {
    Self {
      store,
      search,
      embedding,
      coordinator,
    }
  }

  /// Dispatches one already-parsed request to its handler, collapsing
  /// every failure mode to `Response<Value>`'s `error` field so a
  /// malformed single request never kills the connection it arrived on.
  pub async fn handle(&self, request: Request<Value>) -> Response<Value> {
    let id = request.id;
    let outcome = match request.method {
      Method::SearchRegex => self.handle_search_regex(request.params).await,
      Method::SearchSemantic => self.handle_search_semantic(request.params).await,
      Method::GetStats => self.handle_get_stats().await,
      Method::HealthCheck => self.handle_health_check().await,
    };

    match outcome {
      Ok(result) => Response {
        id,
        result: Some(result),
        error: None,
      },
      Err(err) => Response {
        id,
        result: None,
        error: Some(err.to_rpc_error()),
      },
    }
  }

  async fn handle_search_regex(&self, params: Value) -> Result<Value, DaemonError> {
    let params: SearchRegexParams = serde_json::from_value(params).map_err(|e| DaemonError::InvalidParams(e.to_string()))?;
    let result = self
      .search
      .search_regex(
        &params.pattern,
        params.page_size,
        params.offset,
        params.max_response_bytes,
        params.language.as_deref(),
        params.path_prefix.as_deref(),
      )
      .await?;
    Ok(serde_json::to_value(result).expect("SearchRegexResult always serializes"))
  }

  /// Resolves `params.provider`/`params.model` against the configured
  /// providers on every call, so a client can swap provider or model per
  /// request (spec.md §8 scenario 5) rather than being pinned to whichever
  /// provider was the default when the daemon started.
  async fn handle_search_semantic(&self, params: Value) -> Result<Value, DaemonError> {
    let params: SearchSemanticParams =
      serde_json::from_value(params).map_err(|e| DaemonError::InvalidParams(e.to_string()))?;

    let provider_name = params.provider.clone().unwrap_or_else(|| self.embedding.default_provider.clone());
    let mut provider_config = self
      .embedding
      .providers
      .get(&provider_name)
      .ok_or_else(|| DaemonError::InvalidParams(format!("no embedding provider configured under the name '{provider_name}'")))?
      .clone();
    if let Some(model) = &params.model {
      provider_config.model = model.clone();
    }
    let provider = sourcelens_embedding::from_config(&provider_name, &provider_config)?;
    let key = AnnKey {
      provider: provider_name,
      model: provider_config.model.clone(),
      dimension: provider_config.dim,
      distance: provider_config.distance,
    };

    let result = self
      .search
      .search_semantic(
        provider.as_ref(),
        &key,
        &params.query,
        params.page_size,
        params.offset,
        params.max_response_bytes,
        params.language.as_deref(),
        params.path_prefix.as_deref(),
      )
      .await?;
    Ok(serde_json::to_value(result).expect("SearchSemanticResult always serializes"))
  }

  async fn handle_get_stats(&self) -> Result<Value, DaemonError> {
    let stats = self.store.stats().await?;
    let coordinator_stats = self.coordinator.stats().await;
    let result = GetStatsResult {
      total_files: stats.total_files,
      total_chunks: stats.total_chunks,
      chunks_by_language: stats.chunks_by_language,
      embeddings_by_tuple: stats.embeddings_by_tuple,
      pending_by_tuple: stats.pending_by_tuple,
      queue: TaskQueueStats {
        queued: coordinator_stats.queued,
        in_flight: coordinator_stats.in_flight,
        completed: coordinator_stats.completed,
        failed: coordinator_stats.failed,
        last_error: coordinator_stats.last_error,
        running: coordinator_stats.running,
      },
    };
    Ok(serde_json::to_value(result).expect("GetStatsResult always serializes"))
  }

  async fn handle_health_check(&self) -> Result<Value, DaemonError> {
    let coordinator_stats = self.coordinator.stats().await;
    let db_ok = self.store.stats().await.is_ok();

    let status = if !db_ok {
      HealthStatus::Down
    } else if !coordinator_stats.running {
      HealthStatus::Degraded
    } else {
      HealthStatus::Ok
    };

    let result = HealthCheckResult {
      status,
      details: serde_json::json!({
        "database_reachable": db_ok,
        "watcher_running": coordinator_stats.running,
        "queue_depth": coordinator_stats.queued,
      }),
    };
    Ok(serde_json::to_value(result).expect("HealthCheckResult always serializes"))
  }
}

/// Wraps the broadcast sender every transport's shutdown path holds a
/// receiver from, the way `rewrite/server.rs::ShutdownHandle` does.
#[derive(Clone)]
pub struct ShutdownHandle {
  tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
  pub fn shutdown(&self) {
    let _ = self.tx.send(());
  }
}

pub struct Server {
  handler: Arc<RequestHandler>,
  tcp_port: Option<u16>,
  shutdown_tx: broadcast::Sender<()>,
}

impl Server {
  pub fn new(handler: Arc<RequestHandler>, tcp_port: Option<u16>) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    Self {
      handler,
      tcp_port,
      shutdown_tx,
    }
  }

  pub fn shutdown_handle(&self) -> ShutdownHandle {
    ShutdownHandle {
      tx: self.shutdown_tx.clone(),
    }
  }

  /// Runs the stdio loop on the current task and, if `tcp_port` is
  /// configured, the TCP accept loop concurrently. Returns once both have
  /// stopped (stdin closed, and/or a shutdown broadcast received).
  pub async fn run(&self) -> Result<(), ServerError> {
    let stdio = run_stdio_loop(self.handler.clone(), self.shutdown_tx.subscribe());

    match self.tcp_port {
      Some(port) => {
        let tcp = run_tcp_loop(self.handler.clone(), port, self.shutdown_tx.clone());
        let (stdio_result, tcp_result) = tokio::join!(stdio, tcp);
        stdio_result?;
        tcp_result?;
      }
      None => stdio.await?,
    }
    Ok(())
  }
}

/// Reads newline-delimited JSON requests from stdin, writes newline-
/// delimited JSON responses to stdout. This is the primary transport per
/// spec.md §6 — an editor or CLI subcommand spawning the daemon as a child
/// process talks to it this way.
async fn run_stdio_loop(handler: Arc<RequestHandler>, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), ServerError> {
  let stdin = tokio::io::stdin();
  let mut stdout = tokio::io::stdout();
  let mut reader = BufReader::new(stdin);
  let mut line = String::new();

  loop {
    line.clear();
    tokio::select! {
      read = reader.read_line(&mut line) => {
        let bytes_read = read?;
        if bytes_read == 0 {
          debug!("stdin closed, stopping stdio loop");
          break;
        }
        if let Some(response_line) = dispatch_line(&handler, &line).await {
          stdout.write_all(response_line.as_bytes()).await?;
          stdout.write_all(b"\n").await?;
          stdout.flush().await?;
        }
      }
      _ = shutdown_rx.recv() => {
        debug!("stdio loop received shutdown signal");
        break;
      }
    }
  }
  Ok(())
}

/// The secondary TCP surface spec.md §6 mentions: same framing as stdio,
/// one task per connection, closed on shutdown broadcast.
async fn run_tcp_loop(handler: Arc<RequestHandler>, port: u16, shutdown_tx: broadcast::Sender<()>) -> Result<(), ServerError> {
  let listener = TcpListener::bind(("127.0.0.1", port)).await?;
  let mut shutdown_rx = shutdown_tx.subscribe();

  loop {
    tokio::select! {
      accepted = listener.accept() => {
        let (stream, peer) = accepted?;
        debug!(%peer, "accepted tcp connection");
        let connection_handler = handler.clone();
        let connection_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
          if let Err(err) = handle_tcp_connection(stream, connection_handler, connection_shutdown).await {
            warn!(%err, "tcp connection ended with an error");
          }
        });
      }
      _ = shutdown_rx.recv() => {
        debug!("tcp accept loop received shutdown signal");
        break;
      }
    }
  }
  Ok(())
}

async fn handle_tcp_connection(
  stream: TcpStream,
  handler: Arc<RequestHandler>,
  mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
  let (read_half, mut write_half) = stream.into_split();
  let mut reader = BufReader::new(read_half);
  let mut line = String::new();

  loop {
    line.clear();
    tokio::select! {
      read = reader.read_line(&mut line) => {
        let bytes_read = read?;
        if bytes_read == 0 {
          break;
        }
        if let Some(response_line) = dispatch_line(&handler, &line).await {
          write_half.write_all(response_line.as_bytes()).await?;
          write_half.write_all(b"\n").await?;
          write_half.flush().await?;
        }
      }
      _ = shutdown_rx.recv() => break,
    }
  }
  Ok(())
}

/// Parses one line as a `Request<Value>`, dispatches it, and serializes
/// the response. A blank line (trailing newline at EOF) produces no
/// response at all rather than an empty-parse error.
async fn dispatch_line(handler: &Arc<RequestHandler>, line: &str) -> Option<String> {
  let trimmed = line.trim();
  if trimmed.is_empty() {
    return None;
  }

  let response = match serde_json::from_str::<Request<Value>>(trimmed) {
    Ok(request) => handler.handle(request).await,
    Err(err) => {
      warn!(%err, "received malformed JSON-RPC request");
      Response {
        id: None,
        result: None,
        error: Some(RpcError::new(RpcErrorKind::InvalidArgument, format!("parse error: {err}"))),
      }
    }
  };

  match serde_json::to_string(&response) {
    Ok(serialized) => Some(serialized),
    Err(err) => {
      error!(%err, "failed to serialize response");
      None
    }
  }
}
