//! Versioned, explicit-array model artifact schema (spec.md §9: "a rewrite
//! must use a versioned schema ... to avoid unsafe loading" — no pickle, no
//! arbitrary-type deserialization).

use serde::{Deserialize, Serialize};

use crate::features::FEATURE_DIM;

/// Bumped whenever the artifact layout changes; checked on load.
pub const MODEL_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl StandardScaler {
    pub fn transform(&self, features: &[f32; FEATURE_DIM]) -> Vec<f32> {
        features
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
                (x - self.mean[i]) / scale
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pca {
    pub components: Vec<Vec<f32>>,
    pub mean: Vec<f32>,
}

impl Pca {
    pub fn project(&self, scaled: &[f32]) -> Vec<f32> {
        self.components
            .iter()
            .map(|component| {
                component
                    .iter()
                    .zip(scaled.iter())
                    .zip(self.mean.iter())
                    .map(|((&c, &x), &m)| c * (x - m))
                    .sum()
            })
            .collect()
    }
}

/// One node of an isolation tree. Leaves have `feature == None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationNode {
    pub feature: Option<usize>,
    pub threshold: f32,
    pub left: Option<usize>,
    pub right: Option<usize>,
    /// Leaf sample count, used for the isolation-forest path-length correction.
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    pub nodes: Vec<IsolationNode>,
}

impl IsolationTree {
    /// Path length from root to the leaf reached by `x`, with the standard
    /// average-path-length-of-unsuccessful-search correction at the leaf.
    fn path_length(&self, x: &[f32]) -> f64 {
        let mut depth = 0usize;
        let mut node = &self.nodes[0];
        loop {
            let Some(feature) = node.feature else {
                return depth as f64 + unsuccessful_search_correction(node.size);
            };
            let value = x.get(feature).copied().unwrap_or(0.0);
            let next = if value < node.threshold {
                node.left
            } else {
                node.right
            };
            match next {
                Some(idx) => {
                    node = &self.nodes[idx];
                    depth += 1;
                }
                None => return depth as f64,
            }
        }
    }
}

fn unsuccessful_search_correction(size: usize) -> f64 {
    if size <= 1 {
        return 0.0;
    }
    let n = size as f64;
    2.0 * ((n - 1.0).ln() + 0.5772156649) - (2.0 * (n - 1.0) / n)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForestModel {
    pub trees: Vec<IsolationTree>,
    pub score_min: f64,
    pub score_max: f64,
}

impl IsolationForestModel {
    /// Raw margin: shorter average path length -> higher (more anomalous).
    pub fn raw_margin(&self, x: &[f32]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let avg_path: f64 =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        -avg_path
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneClassSvmModel {
    pub support_vectors: Vec<Vec<f32>>,
    pub dual_coef: Vec<f32>,
    pub rho: f32,
    pub gamma: f32,
    pub score_min: f64,
    pub score_max: f64,
}

impl OneClassSvmModel {
    /// Raw decision-function margin (RBF kernel). Negative values are on
    /// the outlier side of the hyperplane.
    pub fn raw_margin(&self, x: &[f32]) -> f64 {
        let mut decision = 0.0f64;
        for (sv, &coef) in self.support_vectors.iter().zip(self.dual_coef.iter()) {
            let sq_dist: f32 = sv
                .iter()
                .zip(x.iter())
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum();
            let kernel = (-self.gamma * sq_dist).exp();
            decision += (coef * kernel) as f64;
        }
        decision - self.rho as f64
    }
}

/// The full, versioned inference artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub scaler: StandardScaler,
    pub pca: Pca,
    pub isolation_forest: IsolationForestModel,
    pub one_class_svm: OneClassSvmModel,
    pub anomaly_threshold: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_scaler() -> StandardScaler {
        StandardScaler {
            mean: vec![0.0; FEATURE_DIM],
            scale: vec![1.0; FEATURE_DIM],
        }
    }

    #[test]
    fn scaler_identity_is_a_no_op() {
        let scaler = identity_scaler();
        let features = [1.0f32; FEATURE_DIM];
        let scaled = scaler.transform(&features);
        assert_eq!(scaled, vec![1.0f32; FEATURE_DIM]);
    }

    #[test]
    fn isolation_tree_path_length_increases_with_depth() {
        let tree = IsolationTree {
            nodes: vec![
                IsolationNode {
                    feature: Some(0),
                    threshold: 0.5,
                    left: Some(1),
                    right: Some(2),
                    size: 0,
                },
                IsolationNode {
                    feature: None,
                    threshold: 0.0,
                    left: None,
                    right: None,
                    size: 1,
                },
                IsolationNode {
                    feature: None,
                    threshold: 0.0,
                    left: None,
                    right: None,
                    size: 1,
                },
            ],
        };
        assert_eq!(tree.path_length(&[0.1]), 1.0);
        assert_eq!(tree.path_length(&[0.9]), 1.0);
    }
}
