//! Administrative control socket
//!
//! One JSON request per line:
//!
//! ```text
//! {"id": 1, "method": "exit", "params": []}
//! {"id": 1, "result": null, "error": null}
//! ```
//!
//! The only command is `exit`, which asks the daemon to shut down.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{BufmondError, Result};

/// Default control socket path
pub const DEFAULT_CONTROL_SOCKET: &str = "/var/run/bufmond.ctl";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlReply {
    pub id: Value,
    pub result: Value,
    pub error: Option<String>,
}

impl ControlReply {
    fn ok(id: Value) -> Self {
        Self {
            id,
            result: Value::Null,
            error: None,
        }
    }

    fn err(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Commands accepted on the control socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Exit,
}

/// Maps a request to a command and its reply
pub fn dispatch(request: ControlRequest) -> (Option<ControlCommand>, ControlReply) {
    match request.method.as_str() {
        "exit" if request.params.is_empty() => {
            (Some(ControlCommand::Exit), ControlReply::ok(request.id))
        }
        "exit" => (
            None,
            ControlReply::err(request.id, "\"exit\" command takes no arguments"),
        ),
        other => {
            let message = format!("\"{}\" is not a valid command", other);
            (None, ControlReply::err(request.id, message))
        }
    }
}

/// Parses one request line and dispatches it
pub fn handle_line(line: &str) -> (Option<ControlCommand>, ControlReply) {
    match serde_json::from_str::<ControlRequest>(line.trim()) {
        Ok(request) => dispatch(request),
        Err(e) => (
            None,
            ControlReply::err(Value::Null, format!("invalid request: {}", e)),
        ),
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if !metadata.file_type().is_socket() {
        return Err(BufmondError::Control(format!(
            "{} exists and is not a socket",
            path.display()
        )));
    }
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Err(BufmondError::Control(format!(
            "{} is in use by another process",
            path.display()
        )));
    }

    debug!("Removing stale control socket {}", path.display());
    std::fs::remove_file(path)?;
    Ok(())
}

/// Listening control socket; the socket file is removed on drop
pub struct UnixctlServer {
    path: PathBuf,
    listener: UnixListener,
}

impl UnixctlServer {
    /// Binds the socket, replacing a stale socket file.
    ///
    /// Fails when the path holds anything other than a socket, or a socket
    /// another process still accepts connections on.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        remove_stale_socket(&path)?;

        let listener = UnixListener::bind(&path).map_err(|e| {
            BufmondError::Control(format!("failed to bind {}: {}", path.display(), e))
        })?;

        info!("Control socket listening on {}", path.display());
        Ok(Self { path, listener })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(|e| BufmondError::Control(format!("accept failed: {}", e)))?;
        Ok(stream)
    }

    /// Serves one request on an accepted connection
    pub async fn handle(&self, stream: UnixStream) -> Result<Option<ControlCommand>> {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        let mut line = String::new();

        let read = timeout(REQUEST_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| BufmondError::Control("request timed out".to_string()))??;
        if read == 0 {
            return Ok(None);
        }

        let (command, reply) = handle_line(&line);
        if let Some(error) = &reply.error {
            warn!("Control request rejected: {}", error);
        } else {
            debug!("Control command {:?}", command);
        }

        let mut out = serde_json::to_string(&reply)
            .map_err(|e| BufmondError::Control(e.to_string()))?;
        out.push('\n');
        write.write_all(out.as_bytes()).await?;
        write.flush().await?;

        Ok(command)
    }
}

impl Drop for UnixctlServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

/// Sends one request and waits for the reply
pub async fn request(path: &Path, method: &str, params: Vec<Value>) -> Result<ControlReply> {
    let mut stream = UnixStream::connect(path).await?;

    let request = ControlRequest {
        id: Value::from(0),
        method: method.to_string(),
        params,
    };
    let mut msg =
        serde_json::to_string(&request).map_err(|e| BufmondError::Control(e.to_string()))?;
    msg.push('\n');
    stream.write_all(msg.as_bytes()).await?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    reader.read_line(&mut response).await?;

    serde_json::from_str(&response)
        .map_err(|e| BufmondError::Control(format!("invalid reply: {}", e)))
}
