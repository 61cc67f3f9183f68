use embedding_engine::ward_clusters;
use keyharvest_core::{normalize_term, KeywordRecord, SelectionConfig};
use std::collections::HashSet;
use tracing::{debug, info};

/// Fill slots category by category, then top up from the global pool.
///
/// `ranked` must be sorted best first. Texts are compared trimmed and
/// case-insensitively; no text is picked twice. The per-category cap counts
/// only new picks, so a duplicate hands its slot to the category's next candidate.
pub fn select_category_balanced(
    ranked: &[KeywordRecord],
    config: &SelectionConfig,
) -> Vec<KeywordRecord> {
    let mut chosen: Vec<KeywordRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for category in &config.categories {
        let mut taken = 0;
        for record in ranked.iter().filter(|r| &r.category == category) {
            if taken >= config.per_category_limit || chosen.len() >= config.total_limit {
                break;
            }
            if seen.insert(normalize_term(&record.text)) {
                chosen.push(record.clone());
                taken += 1;
            }
        }
        debug!("Category '{}' contributed {} picks", category, taken);
    }

    let balanced = chosen.len();
    for record in ranked {
        if chosen.len() >= config.total_limit {
            break;
        }
        if seen.insert(normalize_term(&record.text)) {
            chosen.push(record.clone());
        }
    }

    info!(
        "Category-balanced selection: {} from categories, {} from the global pool",
        balanced,
        chosen.len() - balanced
    );
    chosen
}

/// Cluster the candidates and keep the best-scoring member of each cluster.
///
/// `embeddings[i]` belongs to `candidates[i]`. The result is sorted by score
/// and capped at `total_limit`.
pub fn select_by_cluster(
    candidates: &[KeywordRecord],
    embeddings: &[Vec<f32>],
    config: &SelectionConfig,
) -> Vec<KeywordRecord> {
    let clusters = ward_clusters(embeddings, config.num_clusters);
    debug!(
        "Clustered {} candidates into {} groups",
        candidates.len(),
        clusters.len()
    );

    let mut picks: Vec<KeywordRecord> = clusters
        .iter()
        .filter_map(|members| {
            members
                .iter()
                .copied()
                .filter(|&index| index < candidates.len())
                .reduce(|best, index| {
                    if candidates[index].score > candidates[best].score {
                        index
                    } else {
                        best
                    }
                })
        })
        .map(|index| candidates[index].clone())
        .collect();

    picks.sort_by(|a, b| b.score.total_cmp(&a.score));
    picks.truncate(config.total_limit);
    info!("Cluster selection picked {} representatives", picks.len());
    picks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(items: &[(&str, &str, f64)]) -> Vec<KeywordRecord> {
        let mut records: Vec<KeywordRecord> = items
            .iter()
            .map(|(text, category, score)| {
                let mut record = KeywordRecord::new(*text);
                record.category = category.to_string();
                record.score = *score;
                record
            })
            .collect();
        records.sort_by(|a, b| b.score.total_cmp(&a.score));
        records
    }

    fn config(categories: &[&str], per_category_limit: usize, total_limit: usize) -> SelectionConfig {
        SelectionConfig {
            categories: categories.iter().map(|c| c.to_string()).collect(),
            per_category_limit,
            total_limit,
            ..Default::default()
        }
    }

    fn texts(records: &[KeywordRecord]) -> Vec<&str> {
        records.iter().map(|r| r.text.as_str()).collect()
    }

    #[test]
    fn test_per_category_limit_in_first_pass() {
        let pool = ranked(&[
            ("g1", "gaming", 0.99),
            ("g2", "gaming", 0.98),
            ("g3", "gaming", 0.97),
            ("g4", "gaming", 0.96),
            ("e1", "ai_ethics", 0.50),
            ("l1", "lifestyle", 0.40),
        ]);
        let picks = select_category_balanced(&pool, &config(&["gaming", "ai_ethics", "lifestyle"], 2, 4));
        assert_eq!(texts(&picks), vec!["g1", "g2", "e1", "l1"]);
    }

    #[test]
    fn test_fills_from_global_pool_when_categories_are_sparse() {
        let pool = ranked(&[
            ("g1", "gaming", 0.9),
            ("g2", "gaming", 0.8),
            ("g3", "gaming", 0.7),
            ("x1", "uncategorized", 0.85),
            ("e1", "ai_ethics", 0.2),
        ]);
        let picks = select_category_balanced(&pool, &config(&["gaming", "ai_ethics", "engineering"], 2, 5));
        assert_eq!(texts(&picks), vec!["g1", "g2", "e1", "x1", "g3"]);
    }

    #[test]
    fn test_duplicates_are_skipped_case_insensitively() {
        let pool = ranked(&[
            ("Cloud Gaming PC", "gaming", 0.9),
            ("cloud gaming pc ", "crossover", 0.8),
            ("ai ethics jobs", "crossover", 0.7),
        ]);
        let picks = select_category_balanced(&pool, &config(&["gaming", "crossover"], 2, 10));
        assert_eq!(texts(&picks), vec!["Cloud Gaming PC", "ai ethics jobs"]);
    }

    #[test]
    fn test_duplicate_does_not_use_category_slot() {
        let pool = ranked(&[
            ("Cloud Gaming PC", "gaming", 0.9),
            ("cloud gaming pc", "crossover", 0.8),
            ("ai ethics jobs", "crossover", 0.7),
            ("g2", "gaming", 0.6),
        ]);
        let picks = select_category_balanced(&pool, &config(&["gaming", "crossover"], 1, 2));
        assert_eq!(texts(&picks), vec!["Cloud Gaming PC", "ai ethics jobs"]);
    }

    #[test]
    fn test_total_limit_caps_first_pass() {
        let pool = ranked(&[
            ("g1", "gaming", 0.9),
            ("g2", "gaming", 0.8),
            ("e1", "ai_ethics", 0.7),
        ]);
        let picks = select_category_balanced(&pool, &config(&["gaming", "ai_ethics"], 2, 1));
        assert_eq!(texts(&picks), vec!["g1"]);
    }

    #[test]
    fn test_cluster_selection_takes_best_of_each_group() {
        let candidates = ranked(&[
            ("a1", "gaming", 0.9),
            ("a2", "gaming", 0.95),
            ("b1", "ai_ethics", 0.3),
            ("b2", "ai_ethics", 0.6),
        ]);
        // sorted order: a2, a1, b2, b1
        let embeddings = vec![
            vec![0.0, 0.1],
            vec![0.0, 0.0],
            vec![10.0, 10.1],
            vec![10.0, 10.0],
        ];
        let picks = select_by_cluster(
            &candidates,
            &embeddings,
            &SelectionConfig {
                num_clusters: 2,
                ..Default::default()
            },
        );
        assert_eq!(texts(&picks), vec!["a2", "b2"]);
    }

    #[test]
    fn test_cluster_selection_with_scarce_candidates() {
        let candidates = ranked(&[("a1", "gaming", 0.9), ("b1", "gaming", 0.4)]);
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let picks = select_by_cluster(&candidates, &embeddings, &SelectionConfig::default());
        assert_eq!(texts(&picks), vec!["a1", "b1"]);
    }
}
