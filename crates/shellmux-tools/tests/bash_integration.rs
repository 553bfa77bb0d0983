use serde_json::json;
use shellmux_tools::registry::ToolCategory;
use shellmux_tools::{
    register_builtins, BashConfig, Error, Platform, SessionManager, ShellSpec, ToolContext,
    ToolRegistry, ToolRunner,
};
use std::sync::Arc;

fn config() -> BashConfig {
    BashConfig {
        close_grace_ms: 200,
        ..BashConfig::default()
    }
}

fn setup(shell: ShellSpec) -> (ToolRunner, Arc<SessionManager>) {
    let sessions = Arc::new(SessionManager::new(shell, config()));
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, Arc::clone(&sessions));
    (ToolRunner::new(Arc::new(registry)), sessions)
}

#[test]
fn test_bash_registered_as_system_tool() {
    let (runner, _) = setup(ShellSpec::new("/bin/sh", Platform::Posix));
    let registry = runner.registry();

    let system = registry.list_by_category(ToolCategory::System);
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].name, "bash");
    assert!(system[0].internal);
    assert!(registry
        .list_agent_accessible()
        .iter()
        .any(|d| d.name == "bash"));
}

#[tokio::test]
async fn test_unknown_tool_is_dispatch_error() {
    let (runner, _) = setup(ShellSpec::new("/bin/sh", Platform::Posix));
    let err = runner
        .execute("powershell", json!({"command": "ls"}), &ToolContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_invalid_input_is_reported_and_counted() {
    let (runner, _) = setup(ShellSpec::new("/bin/sh", Platform::Posix));
    let result = runner
        .execute("bash", json!({}), &ToolContext::default())
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("Command is required"));

    let stats = runner.stats("bash").await.unwrap();
    assert_eq!(stats.total_executions, 1);
    assert_eq!(stats.failed_executions, 1);
}

#[test]
fn test_result_serializes_with_is_error() {
    let result = shellmux_tools::ToolResult::failure("Error: boom", 3);
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["content"], "Error: boom");
    assert_eq!(value["isError"], true);
}

#[cfg(unix)]
mod posix {
    use super::*;

    fn runner() -> (ToolRunner, Arc<SessionManager>) {
        setup(ShellSpec::new("/bin/sh", Platform::Posix))
    }

    #[tokio::test]
    async fn test_one_off_through_runner() {
        let (runner, _) = runner();
        let ctx = ToolContext::with_session("integration");

        let ok = runner
            .execute("bash", json!({"command": "echo integration"}), &ctx)
            .await
            .unwrap();
        assert!(!ok.is_error, "{}", ok.content);
        assert!(ok.content.contains("integration"));
        assert!(ok.content.ends_with("Exit Code: 0"));

        let failed = runner
            .execute("bash", json!({"command": "exit 2"}), &ctx)
            .await
            .unwrap();
        assert!(failed.is_error);
        assert!(failed.content.contains("Exit Code: 2"));

        let stats = runner.stats("bash").await.unwrap();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.failed_executions, 1);
    }

    #[tokio::test]
    async fn test_persistent_session_shared_with_caller() {
        let (runner, sessions) = runner();
        let ctx = ToolContext::with_session("shared");

        runner
            .execute(
                "bash",
                json!({"command": "cd / && export SHARED=yes", "persistent": true}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(sessions.list_sessions().await, vec!["shared"]);

        let result = runner
            .execute(
                "bash",
                json!({"command": "echo \"$SHARED $(pwd)\"", "persistent": true}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(!result.is_error, "{}", result.content);
        assert!(result.content.contains("yes /"));

        sessions.close_all_sessions().await;
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_large_output_is_truncated() {
        let small = BashConfig {
            max_output_bytes: 64,
            ..config()
        };
        let shell = ShellSpec::new("/bin/sh", Platform::Posix);
        let sessions = Arc::new(SessionManager::new(shell, small));
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry, sessions);
        let runner = ToolRunner::new(Arc::new(registry));

        let result = runner
            .execute(
                "bash",
                json!({"command": "i=0; while [ $i -lt 100 ]; do echo line$i; i=$((i+1)); done"}),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.content.contains("[output truncated]"));
        assert!(!result.content.contains("line99"));
        assert!(result.content.ends_with("Exit Code: 0"));
    }
}
