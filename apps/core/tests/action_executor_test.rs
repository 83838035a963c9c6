mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{MemoryBackend, RecordingProvider};
use wlaunch_core::action_executor::{ActionError, ActionExecutor};
use wlaunch_core::clipboard::ClipContent;
use wlaunch_core::model::{Action, Candidate, ProviderId};
use wlaunch_core::providers::RecentFilesLog;
use wlaunch_core::registry::{Registration, Registry};
use wlaunch_core::usage::UsageLog;

struct Fixture {
    executor: ActionExecutor,
    usage: Arc<UsageLog>,
    backend: Arc<MemoryBackend>,
    windows: Arc<RecordingProvider>,
}

fn fixture() -> Fixture {
    let windows = Arc::new(RecordingProvider::default());
    let registry = Arc::new(
        Registry::new(vec![Registration::new(Some("w"), 100, windows.clone())]).unwrap(),
    );
    let usage = Arc::new(UsageLog::in_memory());
    let backend = Arc::new(MemoryBackend::default());
    let executor = ActionExecutor::new(
        registry,
        Arc::clone(&usage),
        Arc::new(RecentFilesLog::in_memory()),
    )
    .with_clipboard(backend.clone());
    Fixture {
        executor,
        usage,
        backend,
        windows,
    }
}

fn script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    path
}

fn run_script(path: PathBuf, argument: &str) -> Candidate {
    Candidate::new(
        format!("script:{}", path.display()),
        "script",
        Action::RunScript {
            path,
            argument: argument.to_string(),
        },
    )
}

#[test]
fn copy_text_goes_to_the_clipboard() {
    let fx = fixture();
    let candidate = Candidate::new(
        "calc:42",
        "= 42",
        Action::CopyText {
            text: "42".to_string(),
        },
    );
    assert!(fx.executor.execute(&candidate).unwrap().is_none());
    assert_eq!(
        fx.backend.writes.lock().as_slice(),
        &[ClipContent::text("42")]
    );
}

#[test]
fn informational_rows_are_not_actionable() {
    let fx = fixture();
    match fx.executor.execute(&Candidate::info("x", "Nothing", "")) {
        Err(ActionError::NotActionable) => {}
        _ => panic!("expected not actionable"),
    }
}

#[test]
fn launch_records_usage() {
    let fx = fixture();
    let candidate = Candidate::new(
        "app:true",
        "True",
        Action::Launch {
            command: "true".to_string(),
        },
    );
    fx.executor.execute(&candidate).unwrap();
    assert_eq!(fx.usage.get("app:true").map(|r| r.count), Some(1));
}

#[test]
fn empty_command_is_rejected() {
    let fx = fixture();
    let candidate = Candidate::new(
        "sys:none",
        "Nothing",
        Action::SystemAction {
            command: "   ".to_string(),
        },
    );
    match fx.executor.execute(&candidate) {
        Err(ActionError::EmptyCommand) => {}
        _ => panic!("expected empty command error"),
    }
}

#[test]
fn script_receives_residual_as_first_argument() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let path = script(
        dir.path(),
        "echo.sh",
        &format!("printf '%s' \"$1\" > '{}'", out.display()),
        0o755,
    );

    let fx = fixture();
    let candidate = run_script(path, "hello world");
    let pending = fx.executor.execute(&candidate).unwrap().unwrap();
    pending.wait().unwrap();

    assert_eq!(std::fs::read_to_string(out).unwrap(), "hello world");
    assert!(fx.usage.get(&candidate.id).is_some());
}

#[test]
fn nonzero_exit_is_an_action_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = script(dir.path(), "fail.sh", "exit 3", 0o755);

    let fx = fixture();
    let pending = fx.executor.execute(&run_script(path.clone(), "")).unwrap().unwrap();
    match pending.wait() {
        Err(ActionError::NonZeroExit { path: failed, status }) => {
            assert_eq!(failed, path);
            assert_eq!(status.code(), Some(3));
        }
        _ => panic!("expected nonzero exit"),
    }
}

#[test]
fn unusable_scripts_fail_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let plain = script(dir.path(), "plain.sh", "true", 0o644);

    let fx = fixture();
    match fx.executor.execute(&run_script(plain, "")) {
        Err(ActionError::NotExecutable(_)) => {}
        _ => panic!("expected not executable"),
    }
    match fx.executor.execute(&run_script(dir.path().join("missing.sh"), "")) {
        Err(ActionError::MissingScript(_)) => {}
        _ => panic!("expected missing script"),
    }
}

#[test]
fn custom_actions_route_to_their_provider() {
    let fx = fixture();
    let candidate = Candidate::new(
        "window:7",
        "Terminal",
        Action::Custom {
            provider: ProviderId::Windows,
            payload: "7".to_string(),
        },
    );
    fx.executor.execute(&candidate).unwrap();
    assert_eq!(fx.windows.executed.lock().as_slice(), &["7".to_string()]);

    let orphan = Candidate::new(
        "proc:1",
        "init",
        Action::Custom {
            provider: ProviderId::Processes,
            payload: "1".to_string(),
        },
    );
    match fx.executor.execute(&orphan) {
        Err(ActionError::UnknownProvider(ProviderId::Processes)) => {}
        _ => panic!("expected unknown provider"),
    }
}
