use super::*;
use crate::algorithm::{KnnClassifier, KnnRegressor};
use crate::data::Dataset;
use crate::ncm::{ClassificationNcm, ClassificationNcmKind, RegressionNcm, RegressionNcmKind};
use crate::predictor::{Prediction, PredictorKind};
use crate::sampler::SamplingStrategy;
use crate::testing::{make_classification, make_multiclass, make_regression};
use tempfile::tempdir;

/// Repeating-key XOR, a wrong key decrypts to garbage.
struct XorCipher;

impl Cipher for XorCipher {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, ConformalError> {
        if key.is_empty() {
            return Err(ConformalError::InvalidInput("empty key".to_string()));
        }
        Ok(plaintext.iter().zip(key.iter().cycle()).map(|(b, k)| b ^ k).collect())
    }

    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, ConformalError> {
        self.encrypt(ciphertext, key)
    }
}

fn margin_ncm() -> Ncm {
    Ncm::Classification(
        ClassificationNcm::new(ClassificationNcmKind::Margin, Box::new(KnnClassifier::new(5, true))).unwrap(),
    )
}

fn normalized_ncm() -> Ncm {
    Ncm::Regression(
        RegressionNcm::new(
            RegressionNcmKind::Normalized { beta: 0.1 },
            Box::new(KnnRegressor::new(5, true)),
            Some(Box::new(KnnRegressor::new(10, false))),
        )
        .unwrap(),
    )
}

fn strategy(num_samples: usize) -> SamplingStrategy {
    SamplingStrategy::Random {
        num_samples,
        calibration_ratio: 0.25,
        stratified: false,
    }
}

fn assert_same_predictions(a: &Predictor, b: &Predictor, data: &Dataset) {
    for r in data.records().iter().take(10) {
        let pa = a.predict(&r.features, &[0.8, 0.9]).unwrap();
        let pb = b.predict(&r.features, &[0.8, 0.9]).unwrap();
        assert_eq!(pa, pb);
    }
}

fn assert_same_acp_members(a: &Predictor, b: &Predictor) {
    match (a, b) {
        (Predictor::Acp(a), Predictor::Acp(b)) => {
            assert_eq!(a.seed(), b.seed());
            assert_eq!(a.strategy(), b.strategy());
            assert_eq!(a.num_members(), b.num_members());
            assert_eq!(a.trained_members(), b.trained_members());
            assert_eq!(a.label_range(), b.label_range());
            for ((i, x), (j, y)) in a.members().iter().zip(b.members()) {
                assert_eq!(i, j);
                assert!(x.calibration().is_some());
                assert_eq!(x.calibration(), y.calibration());
            }
        }
        _ => panic!("expected aggregated predictors"),
    }
}

fn trained_acp_regression() -> (Predictor, Dataset) {
    let data = make_regression(120, 3);
    let mut acp = Predictor::Acp(Acp::new(normalized_ncm(), strategy(3), 3).unwrap());
    acp.train(&data).unwrap();
    (acp, data)
}

#[test]
fn test_icp_round_trip() {
    let data = make_multiclass(90, 3, 1);
    let mut icp = Predictor::icp(margin_ncm(), 0.2, 1).unwrap();
    icp.train(&data).unwrap();

    let bundle = save(&icp, None).unwrap();
    assert_eq!(bundle.manifest().kind, PredictorKind::Acp);
    assert!(bundle.entry("members/0/model.bin").is_some());
    assert!(bundle.entry("members/0/calibration.json").is_some());

    let loaded = load(&bundle, &Registry::with_defaults(), None).unwrap();
    assert_same_acp_members(&icp, &loaded);
    assert_same_predictions(&icp, &loaded, &data);
}

#[test]
fn test_acp_round_trip_through_file() {
    let (acp, data) = trained_acp_regression();
    let bundle = save(&acp, None).unwrap();
    assert!(bundle.entry("members/2/error_model.bin").is_some());

    let dir = tempdir().unwrap();
    let path = dir.path().join("acp.zip");
    bundle.write_to_path(&path).unwrap();
    let read = ModelBundle::read_from_path(&path).unwrap();
    assert_eq!(read, bundle);

    let loaded = load(&read, &Registry::with_defaults(), None).unwrap();
    assert_same_acp_members(&acp, &loaded);
    assert_same_predictions(&acp, &loaded, &data);
}

#[test]
fn test_tcp_round_trip() {
    let data = make_classification(40, 2);
    let mut tcp = Predictor::Tcp(Tcp::new(margin_ncm()).unwrap().with_mondrian(false));
    tcp.train(&data).unwrap();

    let loaded = load(&save(&tcp, None).unwrap(), &Registry::with_defaults(), None).unwrap();
    match (&tcp, &loaded) {
        (Predictor::Tcp(a), Predictor::Tcp(b)) => {
            assert!(!b.is_mondrian());
            assert_eq!(a.records(), b.records());
        }
        _ => panic!("expected transductive predictors"),
    }
    assert_same_predictions(&tcp, &loaded, &data);
}

#[test]
fn test_vap_round_trip() {
    let data = make_classification(100, 6);
    let mut vap = Predictor::Vap(Vap::new(Box::new(KnnClassifier::new(7, true)), strategy(2), 6).unwrap());
    vap.train(&data).unwrap();

    let loaded = load(&save(&vap, None).unwrap(), &Registry::with_defaults(), None).unwrap();
    match (&vap, &loaded) {
        (Predictor::Vap(a), Predictor::Vap(b)) => {
            assert_eq!(a.seed(), b.seed());
            assert_eq!(a.num_members(), b.num_members());
            assert_eq!(a.labels(), b.labels());
            assert_eq!(a.model().params(), b.model().params());
            assert_eq!(a.members().len(), 2);
            for ((i, x), (j, y)) in a.members().iter().zip(b.members()) {
                assert_eq!(i, j);
                assert_eq!(x.calibration, y.calibration);
            }
        }
        _ => panic!("expected Venn-ABERS predictors"),
    }
    assert_same_predictions(&vap, &loaded, &data);
    assert!(matches!(
        loaded.predict(&data.records()[0].features, &[]).unwrap(),
        Prediction::Probabilities(_)
    ));
}

#[test]
fn test_untrained_predictor_cannot_be_saved() {
    let icp = Predictor::icp(margin_ncm(), 0.2, 1).unwrap();
    assert!(matches!(save(&icp, None), Err(ConformalError::UntrainedPredictor(_))));
}

#[test]
fn test_encrypted_round_trip() {
    let (acp, data) = trained_acp_regression();
    let cipher = XorCipher;
    let key = b"secret key".to_vec();
    let enc = Encryption::new(&cipher, &key);

    let bundle = save(&acp, Some(enc)).unwrap();
    assert!(bundle.manifest().encrypted);
    let plain = save(&acp, None).unwrap();
    assert_ne!(bundle.entry("members/0/model.bin"), plain.entry("members/0/model.bin"));
    assert_eq!(bundle.manifest().entries, plain.manifest().entries);

    let bytes = bundle.to_bytes().unwrap();
    let read = ModelBundle::from_bytes(&bytes).unwrap();
    let loaded = load(&read, &Registry::with_defaults(), Some(enc)).unwrap();
    assert_same_predictions(&acp, &loaded, &data);
}

#[test]
fn test_wrong_or_missing_key() {
    let (acp, _) = trained_acp_regression();
    let cipher = XorCipher;
    let key = b"right".to_vec();
    let wrong = b"wrong".to_vec();
    let bundle = save(&acp, Some(Encryption::new(&cipher, &key))).unwrap();
    let registry = Registry::with_defaults();

    assert!(matches!(
        load(&bundle, &registry, Some(Encryption::new(&cipher, &wrong))),
        Err(ConformalError::KeyMismatch)
    ));
    assert!(matches!(load(&bundle, &registry, None), Err(ConformalError::KeyMismatch)));
}

#[test]
fn test_key_ignored_for_plain_bundle() {
    let (acp, data) = trained_acp_regression();
    let cipher = XorCipher;
    let key = b"unused".to_vec();
    let bundle = save(&acp, None).unwrap();
    let loaded = load(&bundle, &Registry::with_defaults(), Some(Encryption::new(&cipher, &key))).unwrap();
    assert_same_predictions(&acp, &loaded, &data);
}

#[test]
fn test_tampered_entry() {
    let (acp, _) = trained_acp_regression();
    let mut bundle = save(&acp, None).unwrap();
    let registry = Registry::with_defaults();

    let (name, data) = bundle
        .entries
        .iter_mut()
        .find(|(name, _)| name.ends_with("calibration.json"))
        .unwrap();
    data.push(b' ');
    let name = name.clone();
    match load(&bundle, &registry, None) {
        Err(ConformalError::ChecksumMismatch { entry, .. }) => assert_eq!(entry, name),
        other => panic!("unexpected result {:?}", other.map(|p| p.kind())),
    }

    let mut missing_entry = save(&acp, None).unwrap();
    missing_entry.entries.retain(|(n, _)| n != "members/1/model.bin");
    assert!(matches!(load(&missing_entry, &registry, None), Err(ConformalError::UnableToRead(_))));

    let mut extra = save(&acp, None).unwrap();
    extra.entries.push(("members/9/model.bin".to_string(), vec![1, 2, 3]));
    assert!(matches!(load(&extra, &registry, None), Err(ConformalError::UnableToRead(_))));
}

#[test]
fn test_unknown_algorithm_on_load() {
    let (acp, _) = trained_acp_regression();
    let bundle = save(&acp, None).unwrap();
    assert!(matches!(
        load(&bundle, &Registry::new(), None),
        Err(ConformalError::ParseString(..))
    ));
}

#[test]
fn test_merge_bundles() {
    let data = make_regression(120, 8);
    let registry = Registry::with_defaults();
    let mut full = Predictor::Acp(Acp::new(normalized_ncm(), strategy(4), 8).unwrap());
    full.train(&data).unwrap();

    let splits: [&[usize]; 3] = [&[0, 3], &[1], &[2]];
    let bundles: Vec<ModelBundle> = splits
        .iter()
        .map(|indices| {
            let mut acp = Acp::new(normalized_ncm(), strategy(4), 8).unwrap();
            acp.train_members(&data, indices).unwrap();
            save(&Predictor::Acp(acp), None).unwrap()
        })
        .collect();

    let merged = merge(&bundles, &registry, None).unwrap();
    assert_same_predictions(&full, &merged, &data);

    let overlapping = vec![bundles[0].clone(), bundles[0].clone()];
    assert!(matches!(
        merge(&overlapping, &registry, None),
        Err(ConformalError::AggregationMismatch(_))
    ));
    assert!(matches!(merge(&[], &registry, None), Err(ConformalError::InvalidInput(_))));
}

#[test]
fn test_merge_rejects_other_seed_or_member_count() {
    let data = make_regression(120, 8);
    let registry = Registry::with_defaults();
    let bundle = |num_samples: usize, seed: u64, indices: &[usize]| {
        let mut acp = Acp::new(normalized_ncm(), strategy(num_samples), seed).unwrap();
        acp.train_members(&data, indices).unwrap();
        save(&Predictor::Acp(acp), None).unwrap()
    };
    let base = bundle(4, 8, &[0]);

    let other_seed = vec![base.clone(), bundle(4, 9, &[1])];
    assert!(matches!(
        merge(&other_seed, &registry, None),
        Err(ConformalError::AggregationMismatch(_))
    ));
    let other_count = vec![base.clone(), bundle(3, 8, &[1])];
    assert!(matches!(
        merge(&other_count, &registry, None),
        Err(ConformalError::AggregationMismatch(_))
    ));
    assert!(merge(&[base, bundle(4, 8, &[1])], &registry, None).is_ok());
}

#[test]
fn test_manifest_members_must_match_strategy() {
    let (acp, _) = trained_acp_regression();
    let registry = Registry::with_defaults();

    let mut wrong_count = save(&acp, None).unwrap();
    wrong_count.manifest.num_members = 5;
    assert!(matches!(load(&wrong_count, &registry, None), Err(ConformalError::UnableToRead(_))));

    let mut out_of_range = save(&acp, None).unwrap();
    out_of_range.manifest.trained_members.push(3);
    assert!(matches!(load(&out_of_range, &registry, None), Err(ConformalError::UnableToRead(_))));

    let data = make_classification(100, 6);
    let mut vap = Predictor::Vap(Vap::new(Box::new(KnnClassifier::new(7, true)), strategy(2), 6).unwrap());
    vap.train(&data).unwrap();
    let mut vap_bundle = save(&vap, None).unwrap();
    vap_bundle.manifest.num_members = 1;
    assert!(matches!(load(&vap_bundle, &registry, None), Err(ConformalError::UnableToRead(_))));
}
