//! `shellmux shell` - a line loop over one persistent session

use super::Toolkit;
use anyhow::Context;
use serde_json::json;
use shellmux_tools::ToolContext;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

pub async fn run(toolkit: &Toolkit, session_id: &str, timeout: Option<u64>) -> anyhow::Result<i32> {
    let ctx = ToolContext::with_session(session_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_failed = false;

    info!(session_id = %session_id, shell = %toolkit.sessions.shell(), "Interactive session ready");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let mut input = json!({
            "command": line,
            "persistent": true,
        });
        if let Some(timeout) = timeout {
            input["timeout"] = json!(timeout);
        }

        let result = toolkit
            .runner
            .execute("bash", input, &ctx)
            .await
            .context("Failed to dispatch bash tool")?;
        println!("{}", result.content);
        last_failed = result.is_error;
    }

    toolkit.sessions.close_all_sessions().await;
    Ok(if last_failed { 1 } else { 0 })
}
