use super::*;

use std::sync::Arc;

use crate::task::{DIM_FILES_TRAINING, DIM_FILES_VALIDATION, DIM_NUM_TRAINING_FOLDS, LEAVE_ONE_OUT};

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("doc{i:03}")).collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn same_prefix() -> CogroupFn {
    Arc::new(|a: &str, b: &str| a.split('_').next() == b.split('_').next())
}

#[test]
fn test_partition_assigns_remainder_to_leading_folds() {
    let buckets = partition(&ids(10), 3, None).unwrap();
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[0], strings(&["doc000", "doc003", "doc006", "doc009"]));
    assert_eq!(buckets[1], strings(&["doc001", "doc004", "doc007"]));
    assert_eq!(buckets[2], strings(&["doc002", "doc005", "doc008"]));
}

#[test]
fn test_partition_ignores_input_order() {
    let forward = ids(9);
    let mut backward = forward.clone();
    backward.reverse();
    assert_eq!(partition(&forward, 3, None).unwrap(), partition(&backward, 3, None).unwrap());
}

#[test]
fn test_partition_leave_one_out() {
    let buckets = partition(&ids(5), LEAVE_ONE_OUT, None).unwrap();
    assert_eq!(buckets.len(), 5);
    assert!(buckets.iter().all(|b| b.len() == 1));
}

#[test]
fn test_partition_rejects_more_folds_than_ids() {
    let err = partition(&ids(4), 5, None).unwrap_err();
    match err {
        Error::InsufficientData { requested, available } => {
            assert_eq!(requested, 5);
            assert_eq!(available, 4);
        }
        other => panic!("expected InsufficientData, got {other}"),
    }
}

#[test]
fn test_partition_rejects_zero_folds() {
    assert!(matches!(partition(&ids(4), 0, None), Err(Error::InsufficientData { .. })));
    assert!(matches!(partition(&ids(4), -3, None), Err(Error::InsufficientData { .. })));
}

#[test]
fn test_cogroup_keeps_members_in_one_fold() {
    let ids = strings(&["b_2", "a_1", "a_2", "b_1", "c_1"]);
    let cmp = same_prefix();
    let buckets = partition(&ids, 2, Some(&cmp)).unwrap();

    for prefix in ["a", "b", "c"] {
        let homes: Vec<usize> = buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.iter().any(|id| id.starts_with(prefix)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(homes.len(), 1, "prefix {prefix} spread over folds {homes:?}");
    }
    assert_eq!(buckets.iter().map(Vec::len).sum::<usize>(), 5);
}

#[test]
fn test_cogroup_collapse_reports_empty_fold() {
    let ids = strings(&["a_1", "a_2", "b_1", "b_2"]);
    let cmp = same_prefix();
    let err = partition(&ids, 3, Some(&cmp)).unwrap_err();

    let msg = format!("{err}");
    assert!(msg.contains("empty fold: 2"), "unexpected message: {msg}");
    assert!(msg.contains("fold 0: size 2"), "histogram missing: {msg}");
    assert!(msg.contains("fold 1: size 2"), "histogram missing: {msg}");
}

#[test]
fn test_fold_dimension_binds_training_and_validation() {
    let mut dim = FoldDimension::new("files", 3);
    dim.set_instances(ids(6)).unwrap();

    dim.rewind();
    dim.advance().unwrap();
    let first = dim.current().unwrap();
    assert_eq!(
        first.list_value(DIM_FILES_VALIDATION),
        Some(strings(&["doc000", "doc003"]).as_slice())
    );
    assert_eq!(
        first.list_value(DIM_FILES_TRAINING),
        Some(strings(&["doc001", "doc004", "doc002", "doc005"]).as_slice())
    );

    // every id is held out exactly once over the three folds
    let mut validated = first.list_value(DIM_FILES_VALIDATION).unwrap().to_vec();
    while dim.has_next() {
        dim.advance().unwrap();
        validated.extend(dim.current().unwrap().list_value(DIM_FILES_VALIDATION).unwrap().to_vec());
    }
    validated.sort();
    assert_eq!(validated, ids(6));
}

#[test]
fn test_fold_dimension_requires_instances() {
    let mut dim = FoldDimension::new("files", 3);
    assert!(!dim.has_next());
    assert!(matches!(dim.advance(), Err(Error::NotConfigured(_))));

    let msg = format!("{}", dim.current().unwrap_err());
    assert!(msg.contains("dimension [files] has no current value"));
}

#[test]
fn test_fold_dimension_leave_one_out() {
    let mut dim = FoldDimension::new("files", LEAVE_ONE_OUT);
    dim.set_instances(ids(4)).unwrap();
    assert_eq!(dim.buckets().unwrap().len(), 4);

    dim.rewind();
    let mut points = 0;
    while dim.has_next() {
        dim.advance().unwrap();
        assert_eq!(dim.current().unwrap().list_value(DIM_FILES_VALIDATION).unwrap().len(), 1);
        points += 1;
    }
    assert_eq!(points, 4);
}

#[test]
fn test_curve_schedules_four_fold_runs() {
    let mut dim = LearningCurveDimension::new("files", 4);
    dim.set_instances(ids(4)).unwrap();

    let runs = dim.runs().unwrap();
    assert_eq!(runs.len(), 28);
    assert_eq!(runs[0].to_string(), "[Train: (1), Test: (0)]");
    // the full-size stage keeps a single rotation per held-out bucket
    assert_eq!(runs.iter().filter(|r| r.train().len() == 3).count(), 4);
}

#[test]
fn test_curve_stage_limit_caps_variations() {
    let mut dim = LearningCurveDimension::new("files", 4).with_stage_limit(1);
    dim.set_instances(ids(4)).unwrap();
    assert_eq!(dim.runs().unwrap().len(), 12);
}

#[test]
fn test_curve_rejects_single_fold() {
    let mut dim = LearningCurveDimension::new("files", 1);
    let msg = format!("{}", dim.set_instances(ids(3)).unwrap_err());
    assert!(msg.contains("requires at least 2 folds, got [1]"));
}

#[test]
fn test_curve_rejects_zero_stage_limit() {
    let mut dim = LearningCurveDimension::new("files", 3).with_stage_limit(0);
    let msg = format!("{}", dim.set_instances(ids(3)).unwrap_err());
    assert!(msg.contains("stage limit must be at least 1"));
}

#[test]
fn test_curve_binds_bucket_labels() {
    let mut dim = LearningCurveDimension::new("files", 3);
    dim.set_instances(ids(3)).unwrap();
    assert_eq!(dim.runs().unwrap().len(), 9);

    dim.rewind();
    dim.advance().unwrap();
    let first = dim.current().unwrap();
    assert_eq!(first.list_value(DIM_FILES_TRAINING), Some(strings(&["doc001"]).as_slice()));
    assert_eq!(first.list_value(DIM_FILES_VALIDATION), Some(strings(&["doc000"]).as_slice()));
    assert_eq!(first.list_value(DIM_NUM_TRAINING_FOLDS), Some(strings(&["bucket_1"]).as_slice()));
}

#[test]
fn test_fixed_curve_covers_all_sizes_without_validation() {
    let mut dim = FixedTestSetCurveDimension::new("files", 4);
    dim.set_instances(ids(4)).unwrap();

    let runs = dim.runs().unwrap();
    assert_eq!(runs.len(), 13);
    assert_eq!(runs[runs.len() - 1], vec![0, 1, 2, 3]);

    dim.rewind();
    while dim.has_next() {
        dim.advance().unwrap();
        let point = dim.current().unwrap();
        assert!(point.list_value(DIM_FILES_TRAINING).is_some());
        assert!(point.get(DIM_FILES_VALIDATION).is_none());
    }
}

#[test]
fn test_dynamic_function_dimension_lifecycle() {
    let mut dim = DynamicFunctionDimension::new(
        "derived",
        Box::new(|config: &Discriminators| {
            let base = match config.get("base") {
                Some(DiscriminatorValue::Int(i)) => *i,
                _ => 0,
            };
            Ok(vec![DiscriminatorValue::Int(base + 1), DiscriminatorValue::Int(base + 2)])
        }),
    );
    assert!(!dim.is_configured());
    assert!(matches!(dim.advance(), Err(Error::NotConfigured(_))));

    dim.configure(&Discriminators::new().with("base", DiscriminatorValue::Int(3))).unwrap();
    assert!(dim.is_configured());
    dim.advance().unwrap();
    assert!(matches!(dim.current().unwrap().get("derived"), Some(DiscriminatorValue::Int(4))));
    dim.advance().unwrap();
    assert!(matches!(dim.current().unwrap().get("derived"), Some(DiscriminatorValue::Int(5))));
    assert!(dim.advance().is_err());

    dim.rewind();
    dim.advance().unwrap();
    assert!(matches!(dim.current().unwrap().get("derived"), Some(DiscriminatorValue::Int(4))));

    // reconfiguring recomputes the values
    dim.configure(&Discriminators::new().with("base", DiscriminatorValue::Int(10))).unwrap();
    dim.advance().unwrap();
    assert!(matches!(dim.current().unwrap().get("derived"), Some(DiscriminatorValue::Int(11))));
}

#[test]
fn test_parameter_space_rejects_empty_dimension() {
    let mut space = ParameterSpace::new();
    space.add_static("learners", vec![]);
    let msg = format!("{}", space.points(&Discriminators::new()).unwrap_err());
    assert!(msg.contains("dimension [learners] yields no values"));
}

#[test]
fn test_parameter_space_without_dimensions_yields_base() {
    let base = Discriminators::new().with("learningMode", DiscriminatorValue::str("regression"));
    let points = ParameterSpace::new().points(&base).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].str_value("learningMode"), Some("regression"));
}

#[test]
fn test_parameter_space_configures_dynamic_dimensions_with_base() {
    let mut space = ParameterSpace::new();
    space.add(Box::new(DynamicFunctionDimension::new(
        "derived",
        Box::new(|config: &Discriminators| {
            let suffix = config.str_value("flavor").unwrap_or("none");
            Ok(vec![DiscriminatorValue::str(format!("value-{suffix}"))])
        }),
    )));

    let base = Discriminators::new().with("flavor", DiscriminatorValue::str("salt"));
    let points = space.points(&base).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].str_value("derived"), Some("value-salt"));
    assert_eq!(points[0].str_value("flavor"), Some("salt"));
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_partition_is_disjoint_and_covers(n in 2usize..40, k in 2i64..6) {
            prop_assume!((k as usize) <= n);
            let buckets = partition(&ids(n), k, None).unwrap();
            prop_assert_eq!(buckets.len(), k as usize);

            let mut seen = std::collections::BTreeSet::new();
            for bucket in &buckets {
                prop_assert!(!bucket.is_empty());
                for id in bucket {
                    prop_assert!(seen.insert(id.clone()), "duplicate id {}", id);
                }
            }
            prop_assert_eq!(seen.len(), n);
        }

        #[test]
        fn prop_partition_sizes_differ_by_at_most_one(n in 2usize..40, k in 2i64..6) {
            prop_assume!((k as usize) <= n);
            let buckets = partition(&ids(n), k, None).unwrap();
            let sizes: Vec<usize> = buckets.iter().map(Vec::len).collect();
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            prop_assert!(max - min <= 1, "unbalanced folds: {:?}", sizes);
        }

        #[test]
        fn prop_partition_is_input_order_independent(n in 2usize..30) {
            let forward = ids(n);
            let mut backward = forward.clone();
            backward.reverse();
            prop_assert_eq!(
                partition(&forward, 2, None).unwrap(),
                partition(&backward, 2, None).unwrap()
            );
        }

        #[test]
        fn prop_leave_one_out_uses_singleton_buckets(n in 1usize..30) {
            let buckets = partition(&ids(n), LEAVE_ONE_OUT, None).unwrap();
            prop_assert_eq!(buckets.len(), n);
            prop_assert!(buckets.iter().all(|b| b.len() == 1));
        }

        #[test]
        fn prop_curve_run_count_matches_schedule(k in 2usize..7) {
            let mut dim = LearningCurveDimension::new("files", k as i64);
            dim.set_instances(ids(k)).unwrap();
            let expected = k * ((k - 2) * (k - 1) + 1);
            prop_assert_eq!(dim.runs().unwrap().len(), expected);
        }

        #[test]
        fn prop_curve_runs_are_unique(k in 2usize..7) {
            let mut dim = LearningCurveDimension::new("files", k as i64);
            dim.set_instances(ids(k)).unwrap();
            let runs = dim.runs().unwrap();
            for (i, a) in runs.iter().enumerate() {
                for b in &runs[i + 1..] {
                    prop_assert!(a != b, "duplicate run {}", a);
                }
            }
        }

        #[test]
        fn prop_fixed_curve_run_count_matches_schedule(k in 2usize..7) {
            let mut dim = FixedTestSetCurveDimension::new("files", k as i64);
            dim.set_instances(ids(k)).unwrap();
            prop_assert_eq!(dim.runs().unwrap().len(), k * (k - 1) + 1);
        }

        #[test]
        fn prop_fold_points_hold_out_each_id_once(n in 3usize..25, k in 2i64..6) {
            prop_assume!((k as usize) <= n);
            let mut dim = FoldDimension::new("files", k);
            dim.set_instances(ids(n)).unwrap();

            dim.rewind();
            let mut validated = Vec::new();
            while dim.has_next() {
                dim.advance().unwrap();
                let point = dim.current().unwrap();
                let validation = point.list_value("files_validation").unwrap().to_vec();
                let training = point.list_value("files_training").unwrap().to_vec();
                prop_assert_eq!(validation.len() + training.len(), n);
                for held_out in &validation {
                    prop_assert!(!training.contains(held_out));
                }
                validated.extend(validation);
            }
            validated.sort();
            prop_assert_eq!(validated, ids(n));
        }
    }
}
