//! Tests for bash tool

use super::config::BashConfig;
use super::executor::{CommandExecutor, ExecOptions};
use super::manager::SessionManager;
use super::shell::{Platform, ShellSpec};
use super::tool::{BashRequest, BashTool};
use crate::registry::{Tool, ToolCategory, ToolContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> BashConfig {
    BashConfig {
        close_grace_ms: 200,
        ..BashConfig::default()
    }
}

/// A tool whose shell cannot be spawned; any spawn attempt shows up as an
/// execution error instead of a validation error.
fn unspawnable_tool() -> BashTool {
    let shell = ShellSpec::new("/nonexistent/shellmux/sh", Platform::Posix);
    BashTool::new(Arc::new(SessionManager::new(shell, test_config())))
}

#[test]
fn test_bash_definition() {
    let tool = unspawnable_tool();
    let def = tool.definition();
    assert_eq!(def.name, "bash");
    assert_eq!(def.category, ToolCategory::System);
    assert!(def.internal);
    assert!(def.agent_accessible);
    assert!(def.description.contains("bash commands"));
    assert_eq!(def.parameters["type"], "object");
    assert_eq!(def.parameters["required"], json!(["command"]));
}

#[test]
fn test_request_parsing() {
    let req = BashRequest::from_value(&json!({
        "command": "ls",
        "timeout": 1500,
        "workingDir": "/tmp",
        "persistent": true,
        "sessionId": "abc"
    }))
    .unwrap();
    assert_eq!(req.command, "ls");
    assert_eq!(req.timeout_ms, Some(1500));
    assert_eq!(req.working_dir.as_deref(), Some(std::path::Path::new("/tmp")));
    assert!(req.persistent);
    assert_eq!(req.session_id.as_deref(), Some("abc"));

    let req = BashRequest::from_value(&json!({"command": "ls"})).unwrap();
    assert!(!req.persistent);
    assert_eq!(req.timeout_ms, None);
}

#[test]
fn test_persistent_truthiness() {
    for (value, expected) in [
        (json!(true), true),
        (json!(1), true),
        (json!("yes"), true),
        (json!(false), false),
        (json!(0), false),
        (json!(""), false),
        (json!(null), false),
    ] {
        let req = BashRequest::from_value(&json!({"command": "x", "persistent": value})).unwrap();
        assert_eq!(req.persistent, expected, "persistent = {}", value);
    }
}

#[test]
fn test_request_rejects_bad_optional_fields() {
    assert!(BashRequest::from_value(&json!({"command": "x", "timeout": "soon"})).is_err());
    assert!(BashRequest::from_value(&json!({"command": "x", "timeout": -5})).is_err());
    assert!(BashRequest::from_value(&json!({"command": "x", "workingDir": 3})).is_err());
    assert!(BashRequest::from_value(&json!({"command": "x", "sessionId": []})).is_err());
}

#[tokio::test]
async fn test_missing_command() {
    let tool = unspawnable_tool();
    let result = tool.handle(&json!({}), &ToolContext::default()).await;
    assert!(result.is_error);
    assert!(result.content.contains("Command is required"));
    assert!(!result.content.contains("spawn"));
}

#[tokio::test]
async fn test_non_string_command() {
    let tool = unspawnable_tool();
    let result = tool
        .handle(&json!({"command": 123}), &ToolContext::default())
        .await;
    assert!(result.is_error);
    assert!(result.content.contains("must be a string"));
    assert!(!result.content.contains("spawn"));
}

#[tokio::test]
async fn test_validation_spawns_no_session() {
    let tool = unspawnable_tool();
    let ctx = ToolContext::with_session("validation");
    let result = tool
        .handle(&json!({"command": false, "persistent": true}), &ctx)
        .await;
    assert!(result.is_error);
    assert!(tool.sessions().is_empty().await);
}

#[tokio::test]
async fn test_spawn_failure_is_reported_not_raised() {
    let tool = unspawnable_tool();
    let ctx = ToolContext::with_session("spawn");

    let result = tool
        .execute(json!({"command": "echo hi", "persistent": true}), &ctx)
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("failed to spawn"));

    let result = tool.execute(json!({"command": "echo hi"}), &ctx).await.unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("failed to spawn"));
}

#[test]
fn test_effective_timeout() {
    let config = BashConfig {
        default_timeout_ms: 1_000,
        max_timeout_ms: 5_000,
        ..BashConfig::default()
    };
    assert_eq!(config.effective_timeout(None), Duration::from_millis(1_000));
    assert_eq!(config.effective_timeout(Some(2_500)), Duration::from_millis(2_500));
    assert_eq!(config.effective_timeout(Some(60_000)), Duration::from_millis(5_000));
}

#[cfg(unix)]
mod posix {
    use super::*;
    use crate::error::Error;

    fn sh() -> ShellSpec {
        ShellSpec::new("/bin/sh", Platform::Posix)
    }

    fn manager() -> Arc<SessionManager> {
        Arc::new(SessionManager::new(sh(), test_config()))
    }

    fn tool() -> BashTool {
        BashTool::new(manager())
    }

    fn ctx(session: &str) -> ToolContext {
        ToolContext::with_session(session).with_user("test-user")
    }

    const SHORT: Duration = Duration::from_secs(10);

    // ── One-off ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_simple_command() {
        let tool = tool();
        let result = tool
            .handle(&json!({"command": "echo \"Hello World\""}), &ctx("test-session"))
            .await;
        assert!(!result.is_error, "{}", result.content);
        assert!(result.content.contains("Hello World"));
        assert!(result.content.contains("Exit Code: 0"));
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let tool = tool();
        let result = tool
            .handle(&json!({"command": "exit 1"}), &ctx("test-session"))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Exit Code: 1"));
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let tool = tool();
        let result = tool
            .handle(&json!({"command": "echo oops >&2; exit 4"}), &ctx("test-session"))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("oops"));
        assert!(result.content.contains("Exit Code: 4"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let tool = tool();
        let started = std::time::Instant::now();
        let result = tool
            .handle(&json!({"command": "sleep 5", "timeout": 300}), &ctx("test-session"))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("timeout"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().canonicalize().unwrap();
        let tool = tool();
        let result = tool
            .handle(
                &json!({"command": "pwd -P", "workingDir": dir.path()}),
                &ctx("test-session"),
            )
            .await;
        assert!(!result.is_error, "{}", result.content);
        assert!(result.content.contains(expected.to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_error() {
        let tool = tool();
        let result = tool
            .handle(
                &json!({"command": "pwd", "workingDir": "/nonexistent/shellmux/dir"}),
                &ctx("test-session"),
            )
            .await;
        assert!(result.is_error);
        assert!(!result.content.contains("Exit Code: 0"));
    }

    // ── Persistent ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_persistent_state_between_commands() {
        let tool = tool();
        let ctx = ctx("persistent-test");

        let first = tool
            .handle(&json!({"command": "export TEST_VAR=\"hello\"", "persistent": true}), &ctx)
            .await;
        assert!(!first.is_error, "{}", first.content);

        let second = tool
            .handle(&json!({"command": "echo $TEST_VAR", "persistent": true}), &ctx)
            .await;
        assert!(!second.is_error, "{}", second.content);
        assert!(second.content.contains("hello"));

        tool.sessions().close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let tool = tool();
        let ctx = ctx("default-session");

        tool.handle(
            &json!({"command": "export ISOLATED=leak", "persistent": true, "sessionId": "a"}),
            &ctx,
        )
        .await;
        let other = tool
            .handle(
                &json!({"command": "echo \"[${ISOLATED}]\"", "persistent": true, "sessionId": "b"}),
                &ctx,
            )
            .await;
        assert!(!other.is_error);
        assert!(other.content.contains("[]"));
        assert!(!other.content.contains("leak"));

        tool.sessions().close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_custom_session_id_overrides_context() {
        let tool = tool();
        let result = tool
            .handle(
                &json!({"command": "echo \"custom session\"", "persistent": true, "sessionId": "custom-session"}),
                &ctx("default-session"),
            )
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("custom session"));
        assert_eq!(tool.sessions().list_sessions().await, vec!["custom-session"]);

        tool.sessions().close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_default_session_without_context() {
        let tool = tool();
        tool.handle(
            &json!({"command": "true", "persistent": true}),
            &ToolContext::default(),
        )
        .await;
        assert_eq!(tool.sessions().list_sessions().await, vec!["default"]);
        tool.sessions().close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_persistent_working_dir_sticks() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().canonicalize().unwrap();
        let tool = tool();
        let ctx = ctx("cd-test");

        let first = tool
            .handle(
                &json!({"command": "true", "persistent": true, "workingDir": dir.path()}),
                &ctx,
            )
            .await;
        assert!(!first.is_error, "{}", first.content);

        let second = tool
            .handle(&json!({"command": "pwd -P", "persistent": true}), &ctx)
            .await;
        assert!(second.content.contains(expected.to_str().unwrap()));

        tool.sessions().close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_persistent_non_zero_keeps_session() {
        let tool = tool();
        let ctx = ctx("false-test");

        let result = tool
            .handle(&json!({"command": "false", "persistent": true}), &ctx)
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Exit Code: 1"));

        let session = tool.sessions().get_session("false-test").await.unwrap();
        assert!(session.is_active());
        tool.sessions().close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_persistent_timeout_replaces_session() {
        let tool = tool();
        let ctx = ctx("timeout-test");

        tool.handle(&json!({"command": "export MARK=1", "persistent": true}), &ctx)
            .await;
        let before = tool.sessions().get_session("timeout-test").await.unwrap();

        let result = tool
            .handle(
                &json!({"command": "sleep 5", "persistent": true, "timeout": 300}),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("timeout"));
        assert!(!before.is_active());

        let after = tool
            .handle(&json!({"command": "echo \"[${MARK}]\"", "persistent": true}), &ctx)
            .await;
        assert!(!after.is_error, "{}", after.content);
        assert!(after.content.contains("[]"));

        let replacement = tool.sessions().get_session("timeout-test").await.unwrap();
        assert!(!Arc::ptr_eq(&before, &replacement));
        tool.sessions().close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_shell_exit_ends_session() {
        let manager = manager();
        let session = manager.get_session("exit-test").await.unwrap();

        let output = session.run("echo bye; exit 3", SHORT).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(output.output.contains("bye"));
        assert!(!session.is_active());

        let next = manager.get_session("exit-test").await.unwrap();
        assert!(next.is_active());
        manager.close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_commands_reading_stdin_do_not_eat_sentinel() {
        let manager = manager();
        let session = manager.get_session("stdin-test").await.unwrap();

        let output = session.run("cat; echo done", SHORT).await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.output.contains("done"));
        manager.close_all_sessions().await;
    }

    // ── Session manager ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_and_manage_sessions() {
        let manager = manager();
        let s1 = manager.get_session("session1").await.unwrap();
        let s2 = manager.get_session("session2").await.unwrap();

        assert!(!Arc::ptr_eq(&s1, &s2));
        assert!(s1.is_active());
        assert!(s2.is_active());
        assert_eq!(manager.len().await, 2);
        manager.close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_reuse_existing_session() {
        let manager = manager();
        let s1 = manager.get_session("reuse-test").await.unwrap();
        let s2 = manager.get_session("reuse-test").await.unwrap();
        assert!(Arc::ptr_eq(&s1, &s2));
        manager.close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_concurrent_first_access_yields_one_session() {
        let manager = manager();
        let (a, b) = tokio::join!(manager.get_session("race"), manager.get_session("race"));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        manager.close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_close_specific_session() {
        let manager = manager();
        let session = manager.get_session("close-test").await.unwrap();
        let other = manager.get_session("keep-test").await.unwrap();
        assert!(session.is_active());

        manager.close_session("close-test").await;
        assert!(!session.is_active());
        assert!(other.is_active());

        manager.close_session("never-existed").await;
        manager.close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_close_all_sessions() {
        let manager = manager();
        let s1 = manager.get_session("close-all-1").await.unwrap();
        let s2 = manager.get_session("close-all-2").await.unwrap();

        manager.close_all_sessions().await;
        assert!(!s1.is_active());
        assert!(!s2.is_active());
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let manager = manager();
        let session = manager.get_session("idempotent").await.unwrap();

        session.close().await;
        assert!(!session.is_active());
        session.close().await;
        assert!(!session.is_active());

        let err = session.run("echo hi", SHORT).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed(_)));
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_command() {
        let manager = manager();
        let session = manager.get_session("cancel-test").await.unwrap();

        let running = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.run("sleep 30", Duration::from_secs(60)).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        manager.close_session("cancel-test").await;
        let outcome = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("in-flight command should resolve after close")
            .unwrap();
        assert!(matches!(outcome, Err(Error::SessionClosed(_))));
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_commands_are_serialized() {
        let manager = manager();
        let session = manager.get_session("serial").await.unwrap();

        let (a, b) = tokio::join!(
            session.run("sleep 0.2; echo first", SHORT),
            session.run("echo second", SHORT)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.output.trim(), "first");
        assert_eq!(b.output.trim(), "second");
        assert_eq!(session.command_count(), 2);
        assert!(session.last_activity() >= session.created_at());
        manager.close_all_sessions().await;
    }

    // ── Output handling ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_persistent_large_output_finishes_quickly() {
        let manager = manager();
        let session = manager.get_session("bulk").await.unwrap();

        // No newlines at all, then many short lines.
        let blob = session
            .run("head -c 8000000 /dev/zero | tr '\\0' a", Duration::from_secs(15))
            .await
            .unwrap();
        assert_eq!(blob.exit_code, 0);
        assert!(blob.truncated);
        assert_eq!(blob.output.len(), test_config().max_output_bytes);

        let lines = session
            .run("i=0; while [ $i -lt 200000 ]; do echo line$i; i=$((i+1)); done", Duration::from_secs(15))
            .await
            .unwrap();
        assert_eq!(lines.exit_code, 0);
        assert!(lines.output.starts_with("line0\nline1\n"));

        assert!(session.is_active());
        let after = session.run("echo still here", SHORT).await.unwrap();
        assert_eq!(after.output.trim(), "still here");
        manager.close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_late_background_output_is_not_attributed_to_next_command() {
        let manager = manager();
        let session = manager.get_session("late").await.unwrap();

        let first = session
            .run("(sleep 0.3; echo LATE_FROM_PREVIOUS) &", SHORT)
            .await
            .unwrap();
        assert_eq!(first.exit_code, 0);
        tokio::time::sleep(Duration::from_millis(800)).await;

        let next = session.run("echo next", SHORT).await.unwrap();
        assert_eq!(next.output, "next\n");
        manager.close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_one_off_output_is_capped_while_streaming() {
        let executor = CommandExecutor::new(sh(), 1024);
        let options = ExecOptions::with_timeout(Duration::from_secs(30));

        let output = executor
            .execute("head -c 20000000 /dev/zero | tr '\\0' b", &options)
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.truncated);
        assert_eq!(output.output.len(), 1024);
    }

    #[tokio::test]
    async fn test_one_off_and_persistent_share_output_cap() {
        let config = BashConfig {
            max_output_bytes: 32,
            ..test_config()
        };
        let tool = BashTool::new(Arc::new(SessionManager::new(sh(), config)));
        let command = "i=0; while [ $i -lt 50 ]; do echo row$i; i=$((i+1)); done";

        let one_off = tool
            .handle(&json!({"command": command}), &ctx("cap"))
            .await;
        let persistent = tool
            .handle(&json!({"command": command, "persistent": true}), &ctx("cap"))
            .await;
        assert!(one_off.content.contains("[output truncated]"));
        assert_eq!(one_off.content, persistent.content);

        tool.sessions().close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_persistent_working_dir_shares_timeout_budget() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool();
        let started = std::time::Instant::now();

        let result = tool
            .handle(
                &json!({
                    "command": "sleep 5",
                    "persistent": true,
                    "workingDir": dir.path(),
                    "timeout": 400
                }),
                &ctx("budget"),
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("timeout after 400ms"));
        assert!(started.elapsed() < Duration::from_secs(4));

        tool.sessions().close_all_sessions().await;
    }

    #[tokio::test]
    async fn test_queued_command_does_not_run_after_close() {
        let manager = manager();
        let session = manager.get_session("queued").await.unwrap();
        let marker = tempfile::tempdir().unwrap();
        let touched = marker.path().join("ran");

        let running = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.run("sleep 30", Duration::from_secs(60)).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        let queued = {
            let session = Arc::clone(&session);
            let command = format!("touch '{}'", touched.display());
            tokio::spawn(async move { session.run(&command, Duration::from_secs(60)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        manager.close_session("queued").await;
        let first = running.await.unwrap();
        let second = queued.await.unwrap();
        assert!(matches!(first, Err(Error::SessionClosed(_))));
        assert!(matches!(second, Err(Error::SessionClosed(_))));
        assert!(!touched.exists());
    }
}
