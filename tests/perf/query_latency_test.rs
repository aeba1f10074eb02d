use std::sync::Arc;
use std::time::Instant;

use crate::matcher::{score, FuzzyMatcher, FUZZY_MAX};
use crate::transliteration::TransliterationCache;

fn p95_ms(samples: &mut [f64]) -> f64 {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let last = samples.len().saturating_sub(1);
    let idx = ((last as f64) * 0.95).round() as usize;
    samples[idx.min(last)]
}

#[test]
fn pathological_segment_input_stays_fast() {
    // Passes the subsequence prefilter but is no substring, so both the
    // segment search and the alignment run on every call.
    let content = format!("{}_x", "Ab".repeat(200));
    let query = format!("{}x", "ab".repeat(60));

    let start = Instant::now();
    for _ in 0..20 {
        let raw = score(&content, &query);
        assert!((1..=FUZZY_MAX).contains(&raw), "raw={raw}");
    }
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    assert!(
        elapsed_ms <= 500.0,
        "20 pathological matches took {elapsed_ms:.3}ms (budget 500.0ms)"
    );
}

#[test]
fn warm_query_p95_under_50ms() {
    let matcher = FuzzyMatcher::new(Arc::new(TransliterationCache::pinyin()));
    let mut titles: Vec<String> = (0..10_000)
        .map(|i| format!("Document_{i:05}.txt"))
        .collect();
    titles.push("Q4_Report.xlsx".to_string());
    titles.push("季度报告.xlsx".to_string());

    let run = |query: &str| {
        titles
            .iter()
            .filter(|title| matcher.score(title, query) > 0)
            .count()
    };

    for _ in 0..10 {
        let _ = run("q4rep");
    }

    let mut batch_p95 = Vec::with_capacity(5);
    for _ in 0..5 {
        let mut samples = Vec::with_capacity(40);
        for _ in 0..40 {
            let start = Instant::now();
            let _ = run("q4rep");
            samples.push(start.elapsed().as_secs_f64() * 1000.0);
        }
        batch_p95.push(p95_ms(&mut samples));
    }

    batch_p95.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_p95 = batch_p95[batch_p95.len() / 2];

    assert!(
        median_p95 <= 50.0,
        "median batch p95 too high: {median_p95:.3}ms (budget 50.0ms); batches={batch_p95:?}",
    );
}
