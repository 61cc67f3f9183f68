use keyharvest_core::{KeywordRecord, ScoringWeights};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// `w_sim * similarity + w_trend * trend + w_vol * (volume / max_volume)`, never below 0.
pub fn score(
    weights: &ScoringWeights,
    similarity: f64,
    trend: f64,
    volume: u64,
    max_volume: u64,
) -> f64 {
    let volume_ratio = if max_volume == 0 {
        0.0
    } else {
        volume as f64 / max_volume as f64
    };
    let raw = weights.similarity * similarity + weights.trend * trend + weights.volume * volume_ratio;
    raw.max(0.0)
}

/// Fill in `similarity` and `score`. `max_volume` is taken over `records`
/// themselves, so scores are relative to this run's candidates.
pub fn apply_scores(records: &mut [KeywordRecord], similarities: &[f64], weights: &ScoringWeights) {
    let max_volume = records.iter().map(|r| r.volume).max().unwrap_or(0);
    for (record, similarity) in records.iter_mut().zip(similarities) {
        record.similarity = similarity.clamp(0.0, 1.0);
        record.score = score(
            weights,
            record.similarity,
            record.trend,
            record.volume,
            max_volume,
        );
    }
}

/// Subtract `penalty * (n - 1)` from every record whose text occurs `n > 1` times.
pub fn apply_repetition_penalty(records: &mut [KeywordRecord], penalty: f64) {
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for record in records.iter() {
        *occurrences.entry(record.normalized_text()).or_insert(0) += 1;
    }

    for record in records.iter_mut() {
        let count = occurrences
            .get(&record.normalized_text())
            .copied()
            .unwrap_or(1);
        if count > 1 {
            let adjusted = (record.score - penalty * (count - 1) as f64).max(0.0);
            debug!(
                "'{}' appears {} times, score {:.3} -> {:.3}",
                record.text, count, record.score, adjusted
            );
            record.score = adjusted;
        }
    }
}

/// Indices of the best-scoring occurrence of each text, best first.
///
/// Equal scores keep their original order.
pub fn rank_unique(records: &[KeywordRecord]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| records[b].score.total_cmp(&records[a].score));

    let mut seen = HashSet::new();
    order
        .into_iter()
        .filter(|&index| seen.insert(records[index].normalized_text()))
        .collect()
}
