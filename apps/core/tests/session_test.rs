mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{launch, SlowProvider, StaticProvider};
use wlaunch_core::model::ProviderId;
use wlaunch_core::registry::Registration;
use wlaunch_core::session::QuerySession;

fn session(delay: Duration) -> QuerySession {
    let registry = common::registry(vec![
        Registration::new(
            None,
            100,
            Arc::new(StaticProvider::new(
                ProviderId::Apps,
                vec![launch("app:report", "Report Viewer")],
            )),
        ),
        Registration::new(
            None,
            100,
            Arc::new(SlowProvider::blocking(ProviderId::Files, delay)),
        ),
    ]);
    QuerySession::new(Arc::new(common::dispatcher(registry)))
}

#[test]
fn submit_returns_local_rows_and_a_placeholder() {
    let mut session = session(Duration::from_millis(150));
    let snapshot = session.submit("report").to_vec();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].title, "Report Viewer");
    assert!(snapshot[1].pending);
    assert_eq!(snapshot[1].provider, Some(ProviderId::Files));
    assert!(!session.is_settled());

    let settled = session.settle().to_vec();
    assert!(session.is_settled());
    assert!(settled.iter().all(|c| !c.pending));
    assert!(settled.iter().any(|c| c.title == "report result"));
}

#[test]
fn newer_query_discards_stale_batches() {
    let mut session = session(Duration::from_millis(120));
    session.submit("first");
    std::thread::sleep(Duration::from_millis(20));
    session.submit("second");
    assert_eq!(session.generation(), 2);

    let settled = session.settle().to_vec();
    assert!(settled.iter().any(|c| c.title == "second result"));
    assert!(settled.iter().all(|c| c.title != "first result"));
    assert_eq!(session.stale_discarded(), 1);
}

#[test]
fn poll_reports_when_the_list_changes() {
    let mut session = session(Duration::from_millis(50));
    session.submit("report");
    let mut changed = false;
    for _ in 0..40 {
        if session.poll(Duration::from_millis(50)) {
            changed = true;
            break;
        }
    }
    assert!(changed);
    assert!(session.is_settled());
    assert!(!session.poll(Duration::from_millis(10)));
}
