//! `shellmux run`

use super::Toolkit;
use anyhow::Context;
use serde_json::{json, Map, Value};
use shellmux_tools::ToolContext;
use std::path::PathBuf;

pub struct RunArgs {
    pub command: String,
    pub timeout: Option<u64>,
    pub cwd: Option<PathBuf>,
    pub persistent: bool,
    pub session_id: Option<String>,
}

impl RunArgs {
    fn into_input(self) -> Value {
        let mut input = Map::new();
        input.insert("command".into(), json!(self.command));
        if let Some(timeout) = self.timeout {
            input.insert("timeout".into(), json!(timeout));
        }
        if let Some(cwd) = self.cwd {
            input.insert("workingDir".into(), json!(cwd.to_string_lossy()));
        }
        if self.persistent {
            input.insert("persistent".into(), json!(true));
        }
        if let Some(id) = self.session_id {
            input.insert("sessionId".into(), json!(id));
        }
        Value::Object(input)
    }
}

pub async fn run(toolkit: &Toolkit, args: RunArgs) -> anyhow::Result<i32> {
    let result = toolkit
        .runner
        .execute("bash", args.into_input(), &ToolContext::default())
        .await
        .context("Failed to dispatch bash tool")?;

    toolkit.sessions.close_all_sessions().await;

    println!("{}", result.content);
    Ok(if result.is_error { 1 } else { 0 })
}
