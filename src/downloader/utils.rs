// Helper functions shared by the downloader and the UI-facing commands

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

/// Run command with timeout, buffering both pipes
pub async fn run_output_with_timeout<I, S>(
    program: &Path,
    args: I,
    limit: Duration,
) -> io::Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdout not captured"))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stderr not captured"))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(limit, child.wait()).await {
        Ok(status) => {
            let status = status?;
            let stdout = stdout_task.await.map_err(join_error)??;
            let stderr = stderr_task.await.map_err(join_error)??;
            Ok(Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timed out after {limit:?}"),
            ))
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Splits a byte stream into text segments on `\n` or `\r`.
///
/// yt-dlp redraws its progress line with carriage returns, so a plain line
/// reader would only see the last redraw.
#[derive(Debug, Default)]
pub struct SegmentSplitter {
    pending: Vec<u8>,
}

impl SegmentSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, get back every segment it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut segments = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    segments.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
            }
        }
        segments
    }

    /// Whatever is left once the stream ends without a trailing newline
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }
}

/// Whether something exists at `path`. Errors (permissions, bad path) count as "no".
pub fn path_exists(path: &Path) -> bool {
    std::fs::metadata(path).is_ok()
}

/// Folder to open for a history entry.
///
/// Entries normally store a file path, but old ones stored the folder. A dot
/// anywhere in the path means "file" and the parent is used, so a legacy
/// folder entry under a dotted directory opens one level up. An extensionless
/// file in an undotted tree resolves to itself.
pub fn containing_folder(path: &Path) -> PathBuf {
    if path.to_string_lossy().contains('.') {
        if let Some(parent) = path.parent() {
            return parent.to_path_buf();
        }
    }
    path.to_path_buf()
}

/// Ask the desktop to show a folder in its file manager
pub fn open_folder(path: &Path) -> io::Result<()> {
    tracing::info!(path = %path.display(), exists = path_exists(path), "opening folder");
    open::that_detached(path).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "failed to open folder");
        e
    })
}
