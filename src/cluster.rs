//! Behavioral clustering
//!
//! Seeded k-means over the unscaled (lifespan_days, revenue) plane. Revenue
//! and lifespan keep their raw ranges, so whichever spans more dominates the
//! distance. Initialisation is k-means++ driven by a PCG stream, which makes
//! labels reproducible for a given seed and input order.

use crate::config::PipelineConfig;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::types::{ClusterAssignment, ClusterProfile, ClusterResult, UserRecord};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

type Point = [f64; 2];

fn squared_distance(a: &Point, b: &Point) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Index of the nearest centroid; ties go to the lower index
fn nearest(point: &Point, centroids: &[Point]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best
}

/// K-means clusterer with a fixed seed
pub struct BehaviorClusterer {
    k: usize,
    seed: u64,
    max_iterations: usize,
    tolerance: f64,
}

impl BehaviorClusterer {
    pub fn new(k: usize, seed: u64) -> Self {
        Self {
            k,
            seed,
            max_iterations: crate::config::DEFAULT_MAX_ITERATIONS,
            tolerance: crate::config::DEFAULT_TOLERANCE,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            k: config.cluster_count,
            seed: config.cluster_seed,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Cluster every record that carries revenue
    pub fn cluster(&self, records: &[UserRecord]) -> AnalyticsResult<ClusterResult> {
        let members: Vec<(&UserRecord, Point)> = records
            .iter()
            .filter_map(|r| r.revenue.map(|rev| (r, [r.lifespan_days as f64, rev])))
            .collect();

        if self.k == 0 || members.len() < self.k {
            return Err(AnalyticsError::InsufficientData {
                stage: "clustering".to_string(),
                required: self.k.max(1),
                available: members.len(),
            });
        }

        let points: Vec<Point> = members.iter().map(|(_, p)| *p).collect();
        let mut rng = Pcg64Mcg::seed_from_u64(self.seed);
        let mut centroids = self.init_centroids(&points, &mut rng);

        let mut labels = vec![0usize; points.len()];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;

            for (label, point) in labels.iter_mut().zip(&points) {
                *label = nearest(point, &centroids).0;
            }

            let updated = recompute_centroids(&points, &labels, &centroids);
            let shift: f64 = centroids
                .iter()
                .zip(&updated)
                .map(|(old, new)| squared_distance(old, new))
                .sum();
            centroids = updated;

            if shift <= self.tolerance * self.tolerance {
                converged = true;
                break;
            }
        }

        let mut inertia = 0.0;
        for (label, point) in labels.iter_mut().zip(&points) {
            let (idx, d) = nearest(point, &centroids);
            *label = idx;
            inertia += d;
        }

        let profiles = centroids
            .iter()
            .enumerate()
            .map(|(cluster, centroid)| ClusterProfile {
                cluster,
                size: labels.iter().filter(|&&l| l == cluster).count(),
                centroid_lifespan_days: centroid[0],
                centroid_revenue: centroid[1],
            })
            .collect();

        let assignments = members
            .iter()
            .zip(&labels)
            .map(|((record, point), &cluster)| ClusterAssignment {
                row_index: record.row_index,
                user_id: record.user_id.clone(),
                lifespan_days: record.lifespan_days,
                revenue: point[1],
                cluster,
            })
            .collect();

        log::info!(
            "clustering: k={} over {} points, {} iterations (converged: {}), inertia {:.3}",
            self.k,
            points.len(),
            iterations,
            converged,
            inertia
        );

        Ok(ClusterResult {
            k: self.k,
            seed: self.seed,
            iterations,
            converged,
            inertia,
            assignments,
            profiles,
        })
    }

    /// k-means++ seeding
    fn init_centroids(&self, points: &[Point], rng: &mut Pcg64Mcg) -> Vec<Point> {
        let mut centroids = Vec::with_capacity(self.k);
        centroids.push(points[rng.gen_range(0..points.len())]);

        let mut distances: Vec<f64> = points
            .iter()
            .map(|p| squared_distance(p, &centroids[0]))
            .collect();

        while centroids.len() < self.k {
            let total: f64 = distances.iter().sum();
            let next = if total > 0.0 {
                let target = rng.gen::<f64>() * total;
                let mut cumulative = 0.0;
                distances
                    .iter()
                    .position(|&d| {
                        cumulative += d;
                        cumulative > target
                    })
                    .unwrap_or_else(|| {
                        distances.iter().rposition(|&d| d > 0.0).unwrap_or(0)
                    })
            } else {
                // every point coincides with a chosen centroid
                rng.gen_range(0..points.len())
            };

            let chosen = points[next];
            for (d, p) in distances.iter_mut().zip(points) {
                *d = d.min(squared_distance(p, &chosen));
            }
            centroids.push(chosen);
        }
        centroids
    }
}

/// Mean of each cluster's points; an empty cluster keeps its previous centroid
fn recompute_centroids(points: &[Point], labels: &[usize], previous: &[Point]) -> Vec<Point> {
    let mut sums = vec![[0.0f64; 2]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (point, &label) in points.iter().zip(labels) {
        sums[label][0] += point[0];
        sums[label][1] += point[1];
        counts[label] += 1;
    }

    sums.iter()
        .zip(&counts)
        .zip(previous)
        .map(|((sum, &count), prev)| {
            if count == 0 {
                *prev
            } else {
                [sum[0] / count as f64, sum[1] / count as f64]
            }
        })
        .collect()
}
