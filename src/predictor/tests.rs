use super::*;
use crate::algorithm::{KnnClassifier, KnnRegressor};
use crate::data::Record;
use crate::ncm::{ClassificationNcm, ClassificationNcmKind, RegressionNcm, RegressionNcmKind};
use crate::predictor::result::prediction_set;
use crate::testing::{make_blobs, make_classification, make_multiclass, make_regression};

fn margin_ncm() -> Ncm {
    let model = Box::new(KnnClassifier::new(7, true));
    Ncm::Classification(ClassificationNcm::new(ClassificationNcmKind::Margin, model).unwrap())
}

fn absolute_ncm() -> Ncm {
    let model = Box::new(KnnRegressor::new(5, true));
    Ncm::Regression(RegressionNcm::new(RegressionNcmKind::AbsoluteDifference, model, None).unwrap())
}

fn normalized_ncm() -> Ncm {
    Ncm::Regression(
        RegressionNcm::new(
            RegressionNcmKind::Normalized { beta: 0.1 },
            Box::new(KnnRegressor::new(5, true)),
            Some(Box::new(KnnRegressor::new(15, false))),
        )
        .unwrap(),
    )
}

fn train_test(data: &Dataset, n_train: usize) -> (Dataset, Vec<Record>) {
    let records = data.records();
    (Dataset::new(records[..n_train].to_vec()), records[n_train..].to_vec())
}

fn coverage(predictor: &Predictor, test: &[Record], confidence: f64) -> f64 {
    let covered = test
        .iter()
        .filter(|r| {
            predictor
                .predict(&r.features, &[confidence])
                .unwrap()
                .covers(r.label, confidence)
                .unwrap()
                .unwrap()
        })
        .count();
    covered as f64 / test.len() as f64
}

#[test]
fn test_icp_classification_is_valid_over_repeated_splits() {
    let mut total = 0.0;
    for seed in 0..5 {
        let (train, test) = train_test(&make_multiclass(300, 3, seed), 200);
        let mut icp = Predictor::icp(margin_ncm(), 0.2, seed).unwrap();
        icp.train(&train).unwrap();
        total += coverage(&icp, &test, 0.8);
    }
    let mean = total / 5.0;
    // 40 calibration records per split, 500 test records in total.
    let bound = 0.8 - 1.0 / 41.0 - 0.05;
    assert!(mean >= bound, "mean coverage {} below {}", mean, bound);
}

#[test]
fn test_icp_classification_fixture_is_deterministic() {
    // 100 training records with 20 held out for calibration, 20 test records.
    let data = make_blobs(120, 2, 10.0, 31);
    let (train, test) = train_test(&data, 100);
    let run = || {
        let mut icp = Predictor::icp(margin_ncm(), 0.2, 31).unwrap();
        icp.train(&train).unwrap();
        test.iter()
            .map(|r| match icp.predict(&r.features, &[]).unwrap() {
                Prediction::PValues(p) => prediction_set(&p, 0.8),
                other => panic!("unexpected prediction {:?}", other),
            })
            .collect::<Vec<_>>()
    };
    let sets = run();
    assert_eq!(sets, run());
    assert_eq!(test.len(), 20);
    let excluded = test
        .iter()
        .zip(&sets)
        .filter(|(r, set)| !set.contains(&(r.label as i64)))
        .count();
    assert!(excluded <= 4, "{} true labels excluded", excluded);
}

#[test]
fn test_p_values_in_unit_interval() {
    let (train, test) = train_test(&make_multiclass(150, 3, 4), 120);
    let mut acp = Predictor::Acp(Acp::new(margin_ncm(), SamplingStrategy::default(), 4).unwrap());
    acp.train(&train).unwrap();
    for r in &test {
        match acp.predict(&r.features, &[]).unwrap() {
            Prediction::PValues(p) => {
                assert_eq!(p.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
                assert!(p.values().all(|v| *v > 0.0 && *v <= 1.0), "{:?}", p);
            }
            other => panic!("unexpected prediction {:?}", other),
        }
    }
}

#[test]
fn test_regression_intervals_grow_with_confidence() {
    let (train, test) = train_test(&make_regression(200, 9), 150);
    let strategy = SamplingStrategy::Random {
        num_samples: 5,
        calibration_ratio: 0.25,
        stratified: false,
    };
    let mut acp = Predictor::Acp(Acp::new(normalized_ncm(), strategy, 9).unwrap());
    acp.train(&train).unwrap();
    for r in &test {
        let prediction = match acp.predict(&r.features, &[0.5, 0.8, 0.9]).unwrap() {
            Prediction::Interval(p) => p,
            other => panic!("unexpected prediction {:?}", other),
        };
        let widths: Vec<f64> = prediction.intervals.iter().map(|ci| ci.interval.width()).collect();
        assert!(widths.windows(2).all(|w| w[0] <= w[1]), "{:?}", widths);
        assert!(prediction.intervals[0].interval.contains(prediction.point));
    }
    assert!(coverage(&acp, &test, 0.8) >= 0.65);
}

#[test]
fn test_twenty_percent_calibration_bounds() {
    // 100 records, 20 calibration scores: rank ceil(0.8 * 21) = 17 exists, ceil(0.99 * 21) = 21 does not.
    let data = make_regression(100, 21);
    let mut icp = Predictor::icp(absolute_ncm(), 0.2, 21).unwrap();
    icp.train(&data).unwrap();
    let acp = match &icp {
        Predictor::Acp(acp) => acp,
        _ => unreachable!(),
    };
    let scores = match acp.members()[&0].calibration() {
        Some(IcpCalibration::Regression(scores)) => scores.clone(),
        other => panic!("unexpected calibration {:?}", other),
    };
    assert_eq!(scores.len(), 20);

    let x = &data.records()[0].features;
    let prediction = match icp.predict(x, &[0.8, 0.99]).unwrap() {
        Prediction::Interval(p) => p,
        other => panic!("unexpected prediction {:?}", other),
    };
    let at_80 = prediction.at(0.8).unwrap();
    assert!((at_80.interval.width() - 2.0 * scores.as_slice()[16]).abs() < 1e-9);
    let at_99 = prediction.at(0.99).unwrap();
    assert_eq!(at_99.interval, Interval::unbounded());
    let (lo, hi) = data.label_range().unwrap();
    assert_eq!(at_99.capped, Interval::new(lo, hi));

    let confidence = icp.predict_confidence(x, scores.as_slice()[16]).unwrap();
    assert!((0.8..1.0).contains(&confidence), "{}", confidence);
}

#[test]
fn test_acp_merge_is_order_independent() {
    let (train, test) = train_test(&make_classification(120, 13), 100);
    let strategy = SamplingStrategy::Random {
        num_samples: 4,
        calibration_ratio: 0.3,
        stratified: true,
    };
    let part = |indices: &[usize]| {
        let mut acp = Acp::new(margin_ncm(), strategy.clone(), 13).unwrap();
        acp.train_members(&train, indices).unwrap();
        acp
    };
    let mut full = Acp::new(margin_ncm(), strategy.clone(), 13).unwrap();
    full.train(&train).unwrap();

    let mut ab = part(&[0, 1]);
    ab.merge(part(&[2, 3])).unwrap();
    let mut ba = part(&[3, 2]);
    ba.merge(part(&[1, 0])).unwrap();
    assert!(ab.is_fully_trained() && ba.is_fully_trained());

    for r in &test {
        let expected = full.predict_p_values(&r.features).unwrap();
        assert_eq!(ab.predict_p_values(&r.features).unwrap(), expected);
        assert_eq!(ba.predict_p_values(&r.features).unwrap(), expected);
    }
}

#[test]
fn test_acp_merge_mismatch() {
    let data = make_classification(60, 2);
    let strategy = SamplingStrategy::Folded {
        folds: 3,
        stratified: true,
    };
    let mut a = Acp::new(margin_ncm(), strategy.clone(), 1).unwrap();
    a.train_members(&data, &[0]).unwrap();

    let mut other_seed = Acp::new(margin_ncm(), strategy.clone(), 2).unwrap();
    other_seed.train_members(&data, &[1]).unwrap();
    assert!(matches!(a.merge(other_seed), Err(ConformalError::AggregationMismatch(_))));

    let mut overlap = Acp::new(margin_ncm(), strategy.clone(), 1).unwrap();
    overlap.train_members(&data, &[0, 2]).unwrap();
    assert!(matches!(a.merge(overlap), Err(ConformalError::AggregationMismatch(_))));

    let mut other_ncm = Acp::new(
        Ncm::Classification(
            ClassificationNcm::new(
                ClassificationNcmKind::NegativeLabelScore,
                Box::new(KnnClassifier::new(7, true)),
            )
            .unwrap(),
        ),
        strategy,
        1,
    )
    .unwrap();
    other_ncm.train_members(&data, &[2]).unwrap();
    assert!(matches!(a.merge(other_ncm), Err(ConformalError::AggregationMismatch(_))));
    assert_eq!(a.trained_members(), vec![0]);
}

#[test]
fn test_lifecycle_errors() {
    let data = make_regression(50, 3);
    let mut icp = Predictor::icp(absolute_ncm(), 0.2, 3).unwrap();
    let x = &data.records()[0].features;
    assert!(matches!(icp.predict(x, &[0.9]), Err(ConformalError::UntrainedPredictor(_))));
    icp.set_param("k", "3").unwrap();
    icp.train(&data).unwrap();
    assert!(matches!(icp.train(&data), Err(ConformalError::AlreadyTrained(_))));
    assert!(matches!(icp.set_param("k", "4"), Err(ConformalError::AlreadyTrained(_))));
    assert_eq!(icp.params()["k"], "3");
    assert!(icp.predict(x, &[1.5]).is_err());

    let mut single = Icp::new(absolute_ncm());
    let split = SamplingStrategy::default().split(&data, 0, 0, Task::Regression).unwrap();
    single.train(&split).unwrap();
    assert!(matches!(single.train(&split), Err(ConformalError::AlreadyTrained(_))));
}

#[test]
fn test_tcp_p_values() {
    let (train, test) = train_test(&make_classification(90, 6), 70);
    let mut tcp = Tcp::new(margin_ncm()).unwrap();
    assert_eq!(tcp.retrains_per_prediction(), 0);
    tcp.train(&train).unwrap();
    assert_eq!(tcp.retrains_per_prediction(), 2);
    let tcp = Predictor::Tcp(tcp);
    for r in &test {
        match tcp.predict(&r.features, &[]).unwrap() {
            Prediction::PValues(p) => {
                assert_eq!(p.len(), 2);
                assert!(p.values().all(|v| *v > 0.0 && *v <= 1.0));
            }
            other => panic!("unexpected prediction {:?}", other),
        }
    }
    assert!(coverage(&tcp, &test, 0.8) >= 0.6);

    let mut plain = Tcp::new(margin_ncm()).unwrap().with_mondrian(false);
    plain.train(&train).unwrap();
    let p = plain.predict_p_values(&test[0].features).unwrap();
    assert!(p.values().all(|v| *v >= 1.0 / 72.0 && *v <= 1.0));
}

#[test]
fn test_tcp_rejects_regression_and_single_class() {
    assert!(matches!(Tcp::new(absolute_ncm()), Err(ConformalError::Unsupported(_))));
    let one_class: Vec<Record> = make_classification(20, 1)
        .records()
        .iter()
        .filter(|r| r.label == 0.0)
        .cloned()
        .collect();
    let mut tcp = Tcp::new(margin_ncm()).unwrap();
    assert!(matches!(tcp.train(&Dataset::new(one_class)), Err(ConformalError::InvalidInput(_))));
}

#[test]
fn test_vap_probabilities() {
    let (train, test) = train_test(&make_classification(160, 17), 120);
    let strategy = SamplingStrategy::Random {
        num_samples: 3,
        calibration_ratio: 0.3,
        stratified: true,
    };
    let mut vap = Predictor::Vap(Vap::new(Box::new(KnnClassifier::new(9, true)), strategy, 17).unwrap());
    vap.train(&train).unwrap();
    let mut log_loss = 0.0;
    for r in &test {
        let prediction = match vap.predict(&r.features, &[]).unwrap() {
            Prediction::Probabilities(p) => p,
            other => panic!("unexpected prediction {:?}", other),
        };
        assert!(prediction.lower <= prediction.upper);
        assert!(prediction.lower >= 0.0 && prediction.upper <= 1.0);
        let total: f64 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
        let p_true = prediction.probabilities[&r.class().unwrap()];
        log_loss -= p_true.max(1e-15).ln();
    }
    // Better than a coin flip
    assert!(log_loss / (test.len() as f64) < std::f64::consts::LN_2);
}

#[test]
fn test_vap_needs_two_classes_and_merges() {
    let mut vap = Vap::new(Box::new(KnnClassifier::default()), SamplingStrategy::default(), 5).unwrap();
    assert!(matches!(
        vap.train(&make_multiclass(60, 3, 5)),
        Err(ConformalError::InvalidInput(_))
    ));

    let data = make_classification(80, 5);
    let strategy = SamplingStrategy::Folded {
        folds: 4,
        stratified: true,
    };
    let mut full = Vap::new(Box::new(KnnClassifier::default()), strategy.clone(), 5).unwrap();
    full.train(&data).unwrap();
    let mut left = Vap::new(Box::new(KnnClassifier::default()), strategy.clone(), 5).unwrap();
    left.train_members(&data, &[1, 3]).unwrap();
    let mut right = Vap::new(Box::new(KnnClassifier::default()), strategy, 5).unwrap();
    right.train_members(&data, &[0, 2]).unwrap();
    right.merge(left).unwrap();
    let x = &data.records()[0].features;
    assert_eq!(right.predict_probabilities(x).unwrap(), full.predict_probabilities(x).unwrap());

    let mut acp = Predictor::icp(margin_ncm(), 0.2, 5).unwrap();
    assert!(matches!(
        acp.merge(Predictor::Vap(full)),
        Err(ConformalError::AggregationMismatch(_))
    ));
}
