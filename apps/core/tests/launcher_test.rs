mod common;

use std::io::Cursor;
use std::sync::Arc;

use common::{MemoryBackend, StaticProvider};
use wlaunch_core::action_executor::ActionExecutor;
use wlaunch_core::clipboard::ClipContent;
use wlaunch_core::model::{Action, Candidate, ProviderId};
use wlaunch_core::providers::RecentFilesLog;
use wlaunch_core::registry::Registration;
use wlaunch_core::runtime::{render_resolution, Launcher, RuntimeError};
use wlaunch_core::usage::UsageLog;

fn copy_row(id: &str, title: &str, text: &str) -> Candidate {
    Candidate::new(
        id,
        title,
        Action::CopyText {
            text: text.to_string(),
        },
    )
}

fn launcher(backend: Arc<MemoryBackend>) -> Launcher {
    let registry = common::registry(vec![Registration::new(
        None,
        100,
        Arc::new(StaticProvider::new(
            ProviderId::Emoji,
            vec![
                copy_row("emoji:fire", "fire", "🔥"),
                copy_row("emoji:rocket", "rocket", "🚀"),
            ],
        )),
    )]);
    let usage = Arc::new(UsageLog::in_memory());
    let executor = ActionExecutor::new(
        Arc::clone(&registry),
        Arc::clone(&usage),
        Arc::new(RecentFilesLog::in_memory()),
    )
    .with_clipboard(backend);
    let dispatcher = common::dispatcher_with(registry, &Default::default(), usage);
    Launcher::new(Arc::new(dispatcher), executor)
}

#[test]
fn run_executes_the_picked_candidate() {
    let backend = Arc::new(MemoryBackend::default());
    let launcher = launcher(backend.clone());

    let ran = launcher.run("rock", 0).unwrap();
    assert_eq!(ran.title, "rocket");
    assert_eq!(backend.writes.lock().as_slice(), &[ClipContent::text("🚀")]);
}

#[test]
fn run_rejects_out_of_range_pick() {
    let launcher = launcher(Arc::new(MemoryBackend::default()));
    match launcher.run("rock", 4) {
        Err(RuntimeError::Selection(message)) => {
            assert_eq!(message, "selected index out of range: 4 (len=1)")
        }
        _ => panic!("expected selection error"),
    }
}

#[test]
fn interactive_session_queries_and_runs() {
    let backend = Arc::new(MemoryBackend::default());
    let launcher = launcher(backend.clone());
    let input = Cursor::new(b"fi\n:n\n:\n:q\n".to_vec());
    let mut output = Vec::new();

    launcher.interactive(input, &mut output).unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains(">  0  fire"));
    assert!(text.contains("ok: fire"));
    assert_eq!(backend.writes.lock().as_slice(), &[ClipContent::text("🔥")]);
}

#[test]
fn json_output_lists_candidates() {
    let launcher = launcher(Arc::new(MemoryBackend::default()));
    let resolution = launcher.query("fire");
    let json: serde_json::Value =
        serde_json::from_str(&render_resolution("fire", &resolution, true)).unwrap();
    assert_eq!(json["query"], "fire");
    assert_eq!(json["candidates"][0]["title"], "fire");
    assert_eq!(json["candidates"][0]["action"]["kind"], "copy_text");
    assert!(json["failures"].as_array().unwrap().is_empty());
}
