use obliquetree::criterion::CriterionKind;
use obliquetree::data::Matrix;
use obliquetree::estimator::config::{MaxFeatures, TreeConfig, TreeIO};
use obliquetree::estimator::core::ObliqueDecisionTree;
use obliquetree::projection::{PatchConfig, ProjectionPolicy};
use obliquetree::prune::{honest_prune, HonestConfig, HonestPrior};
use obliquetree::tree::Tree;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

/// Column major data with a label depending on an oblique boundary. Every
/// tenth value of the first column is missing when `with_missing` is set.
fn make_data(rows: usize, cols: usize, seed: u64, with_missing: bool) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x: Vec<f64> = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let y = (0..rows)
        .map(|i| {
            let s = x[i] + 0.5 * x[rows + i] - x[2 * rows + i];
            if s > 0.2 {
                2.0
            } else if s > -0.3 {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    if with_missing {
        for i in (0..rows).step_by(10) {
            x[i] = f64::NAN;
        }
    }
    (x, y)
}

fn fit(cfg: TreeConfig, data: &Matrix<f64>, y: &[f64], w: Option<&[f64]>) -> Tree {
    let mut model = ObliqueDecisionTree::new(cfg);
    model.fit(data, y, w).unwrap();
    model.fitted_tree().unwrap().clone()
}

fn leaf_mass(tree: &Tree) -> f64 {
    tree.nodes()
        .iter()
        .filter(|n| n.is_leaf())
        .map(|n| n.weighted_n_node_samples)
        .sum()
}

#[test]
fn test_fit_is_bit_identical_for_fixed_seed() {
    let (x, y) = make_data(300, 6, 0, true);
    let data = Matrix::new(&x, 300, 6);
    for policy in [
        ProjectionPolicy::AxisAligned,
        ProjectionPolicy::SparseRandom {
            feature_combinations: Some(2.5),
        },
        ProjectionPolicy::Patch(PatchConfig::two_dimensional(2, 3, 1, 2, 1, 2)),
    ] {
        let cfg = TreeConfig {
            projection: policy,
            seed: 11,
            ..Default::default()
        };
        let a = fit(cfg.clone(), &data, &y, None);
        let b = fit(cfg, &data, &y, None);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }
}

#[test]
fn test_training_rows_follow_committed_partitions() {
    let rows = 400;
    let (x, y) = make_data(rows, 5, 1, true);
    let data = Matrix::new(&x, rows, 5);
    let tree = fit(
        TreeConfig {
            projection: ProjectionPolicy::SparseRandom {
                feature_combinations: Some(2.0),
            },
            max_features: MaxFeatures::Count(10),
            ..Default::default()
        },
        &data,
        &y,
        None,
    );

    let paths = tree.decision_path(&data, true).unwrap();
    let mut counts = vec![0usize; tree.node_count()];
    for (row, path) in paths.iter().enumerate() {
        for step in path.windows(2) {
            let node = tree.node(step[0]);
            let v = tree.projection(step[0]).unwrap().dot(&data, row);
            let went_left = step[1] == node.left_child;
            if v.is_nan() {
                assert_eq!(went_left, node.missing_go_to_left);
            } else {
                assert_eq!(went_left, v <= node.threshold);
            }
        }
        path.iter().for_each(|n| counts[*n] += 1);
    }
    for (node_id, node) in tree.nodes().iter().enumerate() {
        assert_eq!(counts[node_id], node.n_node_samples, "node {}", node_id);
    }
}

#[test]
fn test_capacity_and_projection_bounds() {
    let (x, y) = make_data(500, 12, 2, false);
    let data = Matrix::new(&x, 500, 12);
    for policy in [
        ProjectionPolicy::SparseRandom {
            feature_combinations: Some(3.5),
        },
        ProjectionPolicy::Patch(PatchConfig::two_dimensional(3, 4, 1, 3, 1, 2)),
    ] {
        let tree = fit(
            TreeConfig {
                projection: policy,
                ..Default::default()
            },
            &data,
            &y,
            None,
        );
        assert!(tree.node_count() <= tree.capacity());
        assert!(tree.node_count() > 3);
        for node_id in 0..tree.node_count() {
            match tree.projection(node_id) {
                Some(p) => {
                    assert!(!p.is_empty());
                    assert!(p.indices.iter().all(|i| *i < 12));
                }
                None => assert!(tree.node(node_id).is_leaf()),
            }
        }
        assert!(tree.validate().is_ok());
    }
}

#[test]
fn test_minimum_density_reproduces_axis_aligned_tree() {
    let rows = 250;
    let (x, y) = make_data(rows, 4, 3, true);
    let data = Matrix::new(&x, rows, 4);
    let base = TreeConfig {
        max_depth: Some(6),
        min_samples_leaf: 3,
        seed: 5,
        ..Default::default()
    };
    let axis = fit(
        TreeConfig {
            projection: ProjectionPolicy::AxisAligned,
            ..base.clone()
        },
        &data,
        &y,
        None,
    );
    let sparse = fit(
        TreeConfig {
            projection: ProjectionPolicy::SparseRandom {
                feature_combinations: Some(1.0),
            },
            ..base
        },
        &data,
        &y,
        None,
    );
    assert_eq!(axis, sparse);
    assert_eq!(axis.predict(&data, false).unwrap(), sparse.predict(&data, false).unwrap());
}

#[test]
fn test_children_respect_leaf_limits() {
    let rows = 300;
    let (x, y) = make_data(rows, 4, 4, false);
    let data = Matrix::new(&x, rows, 4);
    let mut rng = StdRng::seed_from_u64(40);
    let w: Vec<f64> = (0..rows).map(|_| rng.gen_range(0.5..2.0)).collect();
    for max_leaf_nodes in [None, Some(12)] {
        let tree = fit(
            TreeConfig {
                min_samples_leaf: 7,
                min_weight_leaf: 9.0,
                max_leaf_nodes,
                ..Default::default()
            },
            &data,
            &y,
            Some(&w),
        );
        for node in tree.nodes().iter().filter(|n| !n.is_leaf()) {
            for child in [node.left_child, node.right_child] {
                let child = tree.node(child);
                assert!(child.n_node_samples >= 7);
                assert!(child.weighted_n_node_samples >= 9.0);
            }
        }
        if let Some(m) = max_leaf_nodes {
            assert!(tree.n_leaves() <= m);
        }
    }
}

#[test]
fn test_honest_prune_conserves_mass_and_is_idempotent() {
    let (x, y) = make_data(300, 4, 6, true);
    let data = Matrix::new(&x, 300, 4);
    let (hx, hy) = make_data(90, 4, 7, true);
    let held_out = Matrix::new(&hx, 90, 4);
    let mut rng = StdRng::seed_from_u64(70);
    let hw: Vec<f64> = (0..90).map(|_| rng.gen_range(0.0..3.0)).collect();
    let total: f64 = hw.iter().sum();

    let tree = fit(TreeConfig::default(), &data, &y, None);
    for prior in [HonestPrior::Empirical, HonestPrior::Uniform, HonestPrior::Ignore] {
        let cfg = HonestConfig {
            min_samples_split: 4,
            prior,
        };
        let pruned = honest_prune(&tree, &held_out, &hy, Some(&hw), CriterionKind::Gini, &cfg).unwrap();
        assert!((leaf_mass(&pruned) - total).abs() < 1e-9);
        assert!(pruned.node_count() <= tree.node_count());
        assert!(pruned.validate().is_ok());

        let again = honest_prune(&pruned, &held_out, &hy, Some(&hw), CriterionKind::Gini, &cfg).unwrap();
        assert_eq!(again.nodes(), pruned.nodes());
        assert_eq!(again.to_string(), pruned.to_string());
    }
}

#[test]
fn test_regression_tree_round_trips_through_json() {
    let rows = 200;
    let (x, _) = make_data(rows, 3, 8, true);
    let y: Vec<f64> = (0..rows).map(|i| 3.0 * x[rows + i] - x[2 * rows + i]).collect();
    let data = Matrix::new(&x, rows, 3);
    let mut model = ObliqueDecisionTree::new(TreeConfig {
        criterion: CriterionKind::SquaredError,
        max_depth: Some(8),
        ..Default::default()
    });
    model.fit(&data, &y, None).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    model.save(&path).unwrap();
    let loaded = ObliqueDecisionTree::load(&path).unwrap();
    assert_eq!(loaded.fitted_tree().unwrap(), model.fitted_tree().unwrap());
    assert_eq!(loaded.predict(&data, true).unwrap(), model.predict(&data, true).unwrap());

    let tree_path = dir.path().join("tree.json");
    model.fitted_tree().unwrap().save(&tree_path).unwrap();
    let tree = Tree::load(&tree_path).unwrap();
    assert_eq!(tree.capacity(), tree.node_count());
}
