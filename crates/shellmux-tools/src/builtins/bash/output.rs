//! Command output capture
//!
//! Pipes are always drained to EOF, but only the first `max_output_bytes`
//! are retained. [`OutputBuffer`] counts what it drops so the rendered
//! result can say the output was cut.

use super::constants::{EXIT_CODE_LABEL, READ_CHUNK_BYTES, TRUNCATION_NOTICE};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Output and status of one completed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout/stderr text
    pub output: String,
    /// Exit status (`-1` when the OS reported none, e.g. killed by signal)
    pub exit_code: i32,
    /// Wall-clock duration
    pub duration_ms: u64,
    /// Whether output was cut at the configured cap
    pub truncated: bool,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Output followed by a trailing `Exit Code: <n>` line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = self.output.trim_end().to_string();
        if self.truncated {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(TRUNCATION_NOTICE);
        }
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&format!("{} {}", EXIT_CODE_LABEL, self.exit_code));
        text
    }
}

/// Byte sink that keeps a bounded prefix of everything pushed into it.
#[derive(Debug)]
pub(crate) struct OutputBuffer {
    kept: Vec<u8>,
    cap: usize,
    total: usize,
    /// Last two bytes seen, oldest first
    recent: [u8; 2],
}

impl OutputBuffer {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            kept: Vec::new(),
            cap,
            total: 0,
            recent: [0; 2],
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let room = self.cap.saturating_sub(self.kept.len());
        self.kept
            .extend_from_slice(&bytes[..room.min(bytes.len())]);
        self.total += bytes.len();

        match bytes {
            [.., a, b] => self.recent = [*a, *b],
            [b] => self.recent = [self.recent[1], *b],
            [] => {}
        }
    }

    /// Forget one trailing `\n` or `\r\n`, even if it fell past the cap.
    pub(crate) fn trim_line_end(&mut self) {
        if self.total == 0 || self.recent[1] != b'\n' {
            return;
        }
        let n = if self.total >= 2 && self.recent[0] == b'\r' {
            2
        } else {
            1
        };
        self.total -= n;
        self.kept.truncate(self.total.min(self.kept.len()));
        self.recent = [0; 2];
    }

    pub(crate) fn truncated(&self) -> bool {
        self.total > self.cap
    }

    pub(crate) fn finish(self, exit_code: i32, duration_ms: u64) -> CommandOutput {
        let truncated = self.truncated();
        CommandOutput {
            output: String::from_utf8_lossy(&self.kept).into_owned(),
            exit_code,
            duration_ms,
            truncated,
        }
    }
}

/// Forward everything read from `reader` into `tx` until EOF.
pub(crate) fn pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}
