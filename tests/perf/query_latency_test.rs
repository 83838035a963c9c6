use std::time::Instant;

use crate::model::{Action, Candidate};
use crate::ranker::{RankEntry, Ranker};

fn p95_ms(samples: &mut [f64]) -> f64 {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let last = samples.len().saturating_sub(1);
    let idx = ((last as f64) * 0.95).round() as usize;
    samples[idx.min(last)]
}

fn app(i: usize, title: String) -> RankEntry {
    RankEntry::new(
        Candidate::new(
            format!("app:{i}"),
            title,
            Action::Launch {
                command: format!("app-{i}"),
            },
        ),
        100,
    )
}

#[test]
fn warm_rank_p95_under_25ms() {
    let mut entries: Vec<RankEntry> = (0..10_000)
        .map(|i| app(i, format!("Application {i:05}")))
        .collect();
    entries.push(app(10_000, "Firefox Web Browser".to_string()));

    let ranker = Ranker::default();
    for _ in 0..10 {
        let _ = ranker.rank(entries.clone(), "firefx");
    }

    let mut batch_p95 = Vec::with_capacity(5);
    for _ in 0..5 {
        let mut samples = Vec::with_capacity(40);
        for _ in 0..40 {
            let input = entries.clone();
            let start = Instant::now();
            let ranked = ranker.rank(input, "firefx");
            samples.push(start.elapsed().as_secs_f64() * 1000.0);
            assert_eq!(ranked[0].title, "Firefox Web Browser");
        }
        batch_p95.push(p95_ms(&mut samples));
    }

    batch_p95.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_p95 = batch_p95[batch_p95.len() / 2];

    assert!(
        median_p95 <= 25.0,
        "median batch p95 too high: {median_p95:.3}ms (budget 25.0ms); batches={batch_p95:?}",
    );
}
