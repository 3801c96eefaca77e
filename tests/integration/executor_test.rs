//! Integration tests for process supervision: timeouts and process trees.

#![cfg(unix)]

mod helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use helpers::write_script;
use pvs_translator::executor::UNOBSERVED_EXIT_CODE;
use pvs_translator::metrics::ConversionMetrics;
use pvs_translator::{ToolExecutor, ToolInvocation};

fn invocation(program: std::path::PathBuf, timeout: Duration) -> ToolInvocation {
    ToolInvocation {
        tool: "sleeper".to_string(),
        program,
        args: Vec::new(),
        timeout,
        expected_output: None,
        job_log: None,
        pid_file: None,
    }
}

#[tokio::test]
async fn test_timeout_kills_process() {
    let temp = tempfile::tempdir().expect("tempdir");
    let program = write_script(&temp.path().join("sleeper.sh"), "exec sleep 30");
    let metrics = Arc::new(ConversionMetrics::new());
    let executor = ToolExecutor::new(9998, Arc::clone(&metrics));

    let started = Instant::now();
    let result = executor
        .run(&invocation(program, Duration::from_secs(1)))
        .await
        .expect("run");

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(result.timed_out);
    assert!(!result.success);
    assert_eq!(result.exit_code, UNOBSERVED_EXIT_CODE);
    assert!(result.stderr.contains("Timeout reached, killing process"));
    assert_eq!(metrics.snapshot().tools_timed_out, 1);
}

#[tokio::test]
async fn test_timeout_kills_grandchildren_holding_pipes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let program = write_script(&temp.path().join("forker.sh"), "sleep 30 &\nsleep 30");
    let executor = ToolExecutor::new(9998, Arc::new(ConversionMetrics::new()));

    let started = Instant::now();
    let result = executor
        .run(&invocation(program, Duration::from_secs(1)))
        .await
        .expect("run");

    assert!(result.timed_out);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_tolerated_timeout_exit_code_counts_as_success() {
    let temp = tempfile::tempdir().expect("tempdir");
    let program = write_script(&temp.path().join("sleeper.sh"), "exec sleep 30");
    let executor = ToolExecutor::new(UNOBSERVED_EXIT_CODE, Arc::new(ConversionMetrics::new()));

    let result = executor
        .run(&invocation(program, Duration::from_secs(1)))
        .await
        .expect("run");

    assert!(result.timed_out);
    assert!(result.success);
}

#[tokio::test]
async fn test_fast_tool_is_not_timed_out() {
    let temp = tempfile::tempdir().expect("tempdir");
    let program = write_script(&temp.path().join("quick.sh"), "echo done");
    let executor = ToolExecutor::new(9998, Arc::new(ConversionMetrics::new()));

    let result = executor
        .run(&invocation(program, Duration::from_secs(30)))
        .await
        .expect("run");

    assert!(!result.timed_out);
    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), "done");
}
