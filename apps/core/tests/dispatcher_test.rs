mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{launch, FailingProvider, PanickingProvider, SlowProvider, StaticProvider};
use wlaunch_core::config::Config;
use wlaunch_core::model::ProviderId;
use wlaunch_core::registry::{ProviderError, Registration};
use wlaunch_core::usage::UsageLog;

fn apps() -> Arc<StaticProvider> {
    Arc::new(StaticProvider::new(
        ProviderId::Apps,
        vec![launch("app:firefox", "Firefox"), launch("app:files", "Files")],
    ))
}

#[test]
fn failing_provider_does_not_hide_other_results() {
    let registry = common::registry(vec![
        Registration::new(None, 100, apps()),
        Registration::new(None, 100, Arc::new(FailingProvider(ProviderId::Emoji))),
    ]);
    let resolution = common::dispatcher(registry).resolve("fire");

    assert_eq!(resolution.candidates.len(), 1);
    assert_eq!(resolution.candidates[0].title, "Firefox");
    assert_eq!(resolution.candidates[0].provider, Some(ProviderId::Apps));
    assert_eq!(resolution.failures.len(), 1);
    assert_eq!(resolution.failures[0].provider, ProviderId::Emoji);
}

#[test]
fn panicking_provider_is_reported_as_failure() {
    let registry = common::registry(vec![
        Registration::new(None, 100, apps()),
        Registration::new(None, 100, Arc::new(PanickingProvider(ProviderId::Ai))),
    ]);
    let resolution = common::dispatcher(registry).resolve("fi");

    assert_eq!(resolution.candidates.len(), 2);
    match &resolution.failures[..] {
        [failure] => assert_eq!(failure.error, ProviderError::Panicked),
        _ => panic!("expected one failure"),
    }
}

#[test]
fn slow_local_provider_times_out_without_delaying_others() {
    let registry = common::registry(vec![
        Registration::new(None, 100, apps()),
        Registration::new(
            None,
            100,
            Arc::new(SlowProvider::local(ProviderId::Files, Duration::from_millis(800))),
        ),
    ]);
    let started = std::time::Instant::now();
    let resolution = common::dispatcher(registry).resolve("fi");

    assert!(started.elapsed() < Duration::from_millis(700));
    assert_eq!(resolution.candidates.len(), 2);
    match &resolution.failures[..] {
        [failure] => {
            assert_eq!(failure.provider, ProviderId::Files);
            assert!(matches!(failure.error, ProviderError::TimedOut(_)));
        }
        _ => panic!("expected a timeout failure"),
    }
}

#[test]
fn prefix_dispatches_to_its_provider_only() {
    let registry = common::registry(vec![
        Registration::new(None, 100, apps()),
        Registration::new(
            Some("e"),
            100,
            Arc::new(StaticProvider::new(
                ProviderId::Emoji,
                vec![launch("emoji:fire", "fire")],
            )),
        ),
    ]);
    let resolution = common::dispatcher(registry).resolve("e fire");
    assert_eq!(resolution.candidates.len(), 1);
    assert_eq!(resolution.candidates[0].provider, Some(ProviderId::Emoji));
}

#[test]
fn results_are_truncated_to_max_results() {
    let rows = (0..30).map(|i| launch(&format!("app:{i}"), &format!("Tool {i}"))).collect();
    let registry = common::registry(vec![Registration::new(
        None,
        100,
        Arc::new(StaticProvider::new(ProviderId::Apps, rows)),
    )]);
    let config = Config {
        max_results: 5,
        ..Config::default()
    };
    let dispatcher = common::dispatcher_with(registry, &config, Arc::new(UsageLog::in_memory()));

    let resolution = dispatcher.resolve("tool");
    assert_eq!(resolution.candidates.len(), 5);
    assert_eq!(resolution.candidates[0].title, "Tool 0");
}

#[test]
fn usage_history_feeds_recency() {
    let provider = StaticProvider::new(
        ProviderId::Apps,
        vec![launch("app:code", "Code"), launch("app:code-insiders", "Code")],
    )
    .tracking_usage();
    let registry = common::registry(vec![Registration::new(None, 100, Arc::new(provider))]);
    let usage = Arc::new(UsageLog::in_memory());
    usage.record("app:code-insiders");
    let dispatcher = common::dispatcher_with(registry, &Config::default(), Arc::clone(&usage));

    let resolution = dispatcher.resolve("code");
    assert_eq!(resolution.candidates[0].id, "app:code-insiders");
    assert!(resolution.candidates[0].recency.is_some());
    assert_eq!(resolution.candidates[1].recency, None);
}

#[test]
fn repeated_resolution_is_identical() {
    let rows = (0..40).map(|i| launch(&format!("app:{i}"), &format!("Editor {}", i % 3))).collect();
    let registry = common::registry(vec![
        Registration::new(None, 100, Arc::new(StaticProvider::new(ProviderId::Apps, rows))),
        Registration::new(
            None,
            80,
            Arc::new(StaticProvider::new(
                ProviderId::Scripts,
                vec![launch("script:edit", "edit notes")],
            )),
        ),
    ]);
    let dispatcher = common::dispatcher(registry);
    assert_eq!(dispatcher.resolve("ed"), dispatcher.resolve("ed"));
}
