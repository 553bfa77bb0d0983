//! Completion markers for persistent shells
//!
//! A persistent shell never exits between commands, so completion is
//! signalled in-band: after the user's command the shell prints a line
//! `<token>:<status>` where the token is fresh for every command. The
//! reader buffers output until that line arrives, then splits the buffer
//! into command output and exit status.

use super::output::{CommandOutput, OutputBuffer};
use super::shell::ShellKind;
use uuid::Uuid;

/// Marker for one command.
#[derive(Debug, Clone)]
pub struct Sentinel {
    token: String,
}

impl Default for Sentinel {
    fn default() -> Self {
        Self::new()
    }
}

impl Sentinel {
    /// Fresh marker with a random token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: format!("__SHELLMUX_{}__", Uuid::new_v4().simple()),
        }
    }

    /// The marker token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Script to write to the shell's stdin for `command`.
    ///
    /// The marker line is always preceded by a newline so it starts a line
    /// even when the command's output does not end with one.
    #[must_use]
    pub fn wrap(&self, kind: ShellKind, command: &str) -> String {
        let token = &self.token;
        match kind {
            // stdin is detached so commands that read input cannot eat the marker
            ShellKind::Posix => format!(
                "{{ {command}\n}} 2>&1 </dev/null\nprintf '\\n{token}:%s\\n' \"$?\"\n"
            ),
            ShellKind::PowerShell => format!(
                "{command}\n\
                 $__smOk = $?; \
                 $__smCode = if ($__smOk) {{ 0 }} elseif ($LASTEXITCODE) {{ $LASTEXITCODE }} else {{ 1 }}; \
                 [Console]::Out.Write(\"`n{token}:$__smCode`n\"); [Console]::Out.Flush()\n"
            ),
            ShellKind::Cmd => format!("{command}\r\necho.\r\necho {token}:%errorlevel%\r\n"),
        }
    }
}

/// Incremental marker detection over a stream of output chunks.
///
/// Each byte is examined once: complete lines that cannot be the marker go
/// straight into the capped output, and only a line that starts like the
/// marker is held back until it is resolved.
pub(crate) struct FrameScanner {
    needle: Vec<u8>,
    pending: Vec<u8>,
    at_line_start: bool,
    output: OutputBuffer,
}

impl FrameScanner {
    pub(crate) fn new(sentinel: &Sentinel, max_output_bytes: usize) -> Self {
        Self {
            needle: format!("{}:", sentinel.token).into_bytes(),
            pending: Vec::new(),
            at_line_start: true,
            output: OutputBuffer::new(max_output_bytes),
        }
    }

    /// Consume `chunk`, returning the exit status once the marker line is
    /// complete. Anything after the marker is dropped.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Option<i32> {
        self.pending.extend_from_slice(chunk);

        let mut pos = 0;
        let status = loop {
            let rest = &self.pending[pos..];
            if rest.is_empty() {
                break None;
            }

            if !self.at_line_start {
                match rest.iter().position(|&b| b == b'\n') {
                    Some(i) => {
                        self.output.push(&rest[..=i]);
                        pos += i + 1;
                        self.at_line_start = true;
                    }
                    None => {
                        self.output.push(rest);
                        pos = self.pending.len();
                    }
                }
                continue;
            }

            let n = rest.len().min(self.needle.len());
            if rest[..n] != self.needle[..n] {
                self.at_line_start = false;
                continue;
            }
            if rest.len() < self.needle.len() {
                break None;
            }

            let tail = &rest[self.needle.len()..];
            let Some(end) = tail.iter().position(|&b| b == b'\n') else {
                break None;
            };
            let code = String::from_utf8_lossy(&tail[..end]);
            break Some(code.trim().parse::<i32>().unwrap_or(-1));
        };

        if status.is_some() {
            self.pending.clear();
            // The newline printed ahead of the marker is not command output.
            self.output.trim_line_end();
        } else {
            self.pending.drain(..pos);
        }
        status
    }

    /// Everything captured so far, including any held-back partial line.
    pub(crate) fn finish(mut self, exit_code: i32, duration_ms: u64) -> CommandOutput {
        let held = std::mem::take(&mut self.pending);
        self.output.push(&held);
        self.output.finish(exit_code, duration_ms)
    }
}
