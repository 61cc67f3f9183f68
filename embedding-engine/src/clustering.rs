//! Agglomerative clustering with the Ward criterion.
//!
//! Distances are squared Euclidean and updated with the Lance-Williams
//! recurrence. Candidate pools are small (a few dozen points), so the plain
//! cubic algorithm is used.

fn squared_euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum()
}

/// Partition `points` into `k` clusters, or one cluster per point when there
/// are fewer than `k` points.
///
/// Each cluster holds point indices in ascending order; clusters are ordered
/// by their smallest index. Ties between equal merge costs go to the pair
/// with the smallest indices, so the result is deterministic.
pub fn ward_clusters(points: &[Vec<f32>], k: usize) -> Vec<Vec<usize>> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }
    let target = k.clamp(1, n);

    let mut clusters: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();
    let mut distance = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = squared_euclidean(&points[i], &points[j]);
            distance[i][j] = d;
            distance[j][i] = d;
        }
    }

    let mut remaining = n;
    while remaining > target {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if clusters[i].is_none() {
                continue;
            }
            for j in (i + 1)..n {
                if clusters[j].is_none() {
                    continue;
                }
                let d = distance[i][j];
                if best.map_or(true, |(_, _, current)| d < current) {
                    best = Some((i, j, d));
                }
            }
        }

        let Some((i, j, d_ij)) = best else { break };
        let (Some(left), Some(right)) = (clusters[i].take(), clusters[j].take()) else {
            break;
        };
        let n_i = left.len() as f64;
        let n_j = right.len() as f64;

        for other in 0..n {
            if other == i || other == j {
                continue;
            }
            let Some(members) = &clusters[other] else {
                continue;
            };
            let n_k = members.len() as f64;
            let updated = ((n_i + n_k) * distance[other][i] + (n_j + n_k) * distance[other][j]
                - n_k * d_ij)
                / (n_i + n_j + n_k);
            distance[other][i] = updated;
            distance[i][other] = updated;
        }

        let mut merged = left;
        merged.extend(right);
        merged.sort_unstable();
        clusters[i] = Some(merged);
        remaining -= 1;
    }

    let mut result: Vec<Vec<usize>> = clusters.into_iter().flatten().collect();
    result.sort_by_key(|members| members[0]);
    result
}
