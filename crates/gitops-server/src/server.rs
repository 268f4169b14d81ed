//! Stdio JSON-RPC server
//!
//! Reads one JSON-RPC request per line from stdin and writes one response
//! per line to stdout. Requests without an `id` are notifications and get no
//! response. Logs go to stderr only; stdout is reserved for the protocol.

use std::io::{BufRead, Write};
use std::sync::Arc;

use gitops_core::Reconciler;

use crate::handlers::handle_request;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::Result;

/// JSON-RPC operator surface over a running reconciler.
pub struct GitopsServer {
    engine: Arc<Reconciler>,
}

impl GitopsServer {
    pub fn new(engine: Arc<Reconciler>) -> Self {
        Self { engine }
    }

    /// Serve requests until stdin closes.
    pub async fn run(&self) -> Result<()> {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();

        tracing::info!("operator surface ready, listening on stdio");

        for line in stdin.lock().lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            tracing::debug!(request = %line, "received message");

            match self.handle_message(&line).await {
                Ok(Some(response)) => {
                    writeln!(stdout, "{response}")?;
                    stdout.flush()?;
                }
                Ok(None) => {}
                Err(e) => {
                    let response =
                        JsonRpcResponse::error(None, -32603, format!("internal error: {e}"));
                    writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
                    stdout.flush()?;
                }
            }
        }

        Ok(())
    }

    /// Handle a single raw message.
    ///
    /// Returns `None` for notifications, which get no response.
    pub async fn handle_message(&self, message: &str) -> Result<Option<String>> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(request) => request,
            Err(e) => {
                let response = JsonRpcResponse::error(None, -32700, format!("parse error: {e}"));
                return Ok(Some(serde_json::to_string(&response)?));
            }
        };

        let is_notification = request.id.is_none();
        let response = match handle_request(&self.engine, &request.method, request.params).await {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(e) => {
                tracing::warn!(method = %request.method, error = %e, "request failed");
                JsonRpcResponse::error(request.id, e.code(), e.to_string())
            }
        };

        if is_notification {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&response)?))
    }
}
