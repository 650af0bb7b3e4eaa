//! Deterministic one-dimensional k-means, used to group arenas into columns.

/// Assign each of `values` to one of `k` clusters. Cluster indices are
/// ordered by cluster mean, so index 0 is the cluster with the smallest
/// values. The same input always yields the same labels.
pub fn kmeans_1d(values: &[f64], k: usize, max_iterations: usize) -> Vec<usize> {
    if values.is_empty() || k == 0 {
        return vec![0; values.len()];
    }
    let k = k.min(values.len());

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut centers: Vec<f64> = if k == 1 {
        vec![sorted.iter().sum::<f64>() / sorted.len() as f64]
    } else {
        (0..k)
            .map(|i| sorted[i * (sorted.len() - 1) / (k - 1)])
            .collect()
    };

    let nearest = |centers: &[f64], v: f64| {
        centers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (v - **a).abs().total_cmp(&(v - **b).abs()))
            .map(|(i, _)| i)
            .unwrap_or(0)
    };

    let mut labels: Vec<usize> = values.iter().map(|&v| nearest(&centers, v)).collect();
    for _ in 0..max_iterations {
        let mut sums = vec![(0.0, 0usize); k];
        for (&v, &label) in values.iter().zip(&labels) {
            sums[label].0 += v;
            sums[label].1 += 1;
        }
        for (center, (sum, n)) in centers.iter_mut().zip(sums) {
            if n > 0 {
                *center = sum / n as f64;
            }
        }

        let next: Vec<usize> = values.iter().map(|&v| nearest(&centers, v)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| centers[a].total_cmp(&centers[b]));
    let mut rank = vec![0; k];
    for (r, &cluster) in order.iter().enumerate() {
        rank[cluster] = r;
    }
    labels.into_iter().map(|l| rank[l]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_numbered_left_to_right() {
        let xs = [410.0, 20.0, 215.0, 25.0, 405.0, 210.0];
        assert_eq!(kmeans_1d(&xs, 3, 20), vec![2, 0, 1, 0, 2, 1]);
    }

    #[test]
    fn more_clusters_than_values() {
        assert_eq!(kmeans_1d(&[5.0, 1.0], 4, 20), vec![1, 0]);
        assert!(kmeans_1d(&[], 2, 20).is_empty());
    }

    #[test]
    fn single_cluster() {
        assert_eq!(kmeans_1d(&[3.0, 9.0, 1.0], 1, 20), vec![0, 0, 0]);
    }
}
