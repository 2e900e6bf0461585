use detector_core::checkpoint::{load_boosted, save_boosted};
use detector_core::lexical::extract_matrix;
use detector_core::{
    fit, BoostConfig, CharVocabulary, DetectorArgs, DetectorError, GradientBoostedTrees, ModelKind,
    TrainConfig, UrlClassifier, UrlDetector,
};

fn urls() -> Vec<String> {
    vec![
        "google.com".to_string(),
        "github.com/rust-lang/rust".to_string(),
        "secure-paypa1.com.login.ru/verify?acct=1".to_string(),
        "198.51.100.7/~admin/bank.php".to_string(),
        "en.wikipedia.org/wiki/URL".to_string(),
        "free-prizes.xyz/claim#now".to_string(),
    ]
}

#[test]
fn test_trained_conv_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let args = DetectorArgs {
        max_length: 24,
        embed_dim: 4,
        filters: 3,
        kernel_sizes: vec![2, 3, 5],
        hidden_dim: 6,
        hidden_layers: 2,
        ..DetectorArgs::default()
    };
    let labels = [0, 0, 1, 1, 0, 1];
    let docs = CharVocabulary::new().encode_all(&urls());

    let mut detector = UrlDetector::new(ModelKind::BigConvNn, args.clone());
    let config = TrainConfig {
        epochs: 2,
        batch_size: 2,
        validation_split: 0.25,
        log_dir: dir.path().join("logs").to_string_lossy().into_owned(),
        ..TrainConfig::default()
    };
    fit(&mut detector, &docs, &labels, &config).unwrap();

    let path = dir.path().join("conv.bin");
    detector.save(&path).unwrap();
    let expected = detector.predict_urls(&urls()).unwrap();

    let loaded = UrlDetector::load(&path).unwrap();
    assert_eq!(loaded.kind(), ModelKind::BigConvNn);
    assert_eq!(loaded.args(), &args);
    assert_eq!(loaded.tensors(), detector.tensors());
    assert_eq!(loaded.predict_urls(&urls()).unwrap(), expected);

    let mapped = UrlDetector::load_mmap(&path).unwrap();
    assert_eq!(mapped.predict_urls(&urls()).unwrap(), expected);
}

#[test]
fn test_garbled_checkpoint_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    UrlDetector::new(ModelKind::SimpleNn, DetectorArgs::default())
        .save(&path)
        .unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    // model kind byte
    bytes[8] = 7;
    assert!(matches!(
        UrlDetector::from_bytes(&bytes),
        Err(DetectorError::Checkpoint { .. })
    ));

    bytes[8] = 0;
    // max_length: header no longer matches the stored tensors
    bytes[13] = 99;
    assert!(UrlDetector::from_bytes(&bytes).is_err());
}

#[test]
fn test_boosted_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let labels = [0, 0, 1, 1, 0, 1];
    let features = extract_matrix(&urls());
    let config = BoostConfig {
        n_estimators: 10,
        min_samples_leaf: 1,
        ..BoostConfig::default()
    };
    let model = GradientBoostedTrees::fit(&features, &labels, &config).unwrap();

    let path = dir.path().join("boosted.json");
    save_boosted(&model, &path).unwrap();
    let loaded = load_boosted(&path).unwrap();
    assert_eq!(loaded.n_trees(), 10);
    assert_eq!(
        loaded.predict_urls(&urls()).unwrap(),
        model.predict_urls(&urls()).unwrap()
    );
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = UrlDetector::load(dir.path().join("absent.bin")).unwrap_err();
    assert!(matches!(err, DetectorError::Io(_)));
}
