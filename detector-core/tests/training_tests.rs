use detector_core::{evaluate, fit, CharVocabulary, DetectorArgs, ModelKind, TrainConfig, UrlDetector};

fn separable_urls() -> (Vec<String>, Vec<u8>) {
    let mut urls = Vec::new();
    let mut labels = Vec::new();
    for i in 0..40 {
        urls.push(format!("www.example{}.com/index", i % 10));
        labels.push(0);
        urls.push(format!("zq7-verify{}.ru/@@login?id=%%{}", i % 10, i));
        labels.push(1);
    }
    (urls, labels)
}

fn tiny_args(seed: u64) -> DetectorArgs {
    DetectorArgs {
        max_length: 32,
        embed_dim: 8,
        filters: 8,
        kernel_sizes: vec![2, 3],
        hidden_dim: 16,
        hidden_layers: 1,
        dropout: 0.0,
        seed,
        ..DetectorArgs::default()
    }
}

#[test]
fn test_simple_nn_loss_decreases() {
    let dir = tempfile::tempdir().unwrap();
    let (urls, labels) = separable_urls();
    let docs = CharVocabulary::new().encode_all(&urls);

    let mut detector = UrlDetector::new(ModelKind::SimpleNn, tiny_args(3));
    let config = TrainConfig {
        epochs: 8,
        batch_size: 8,
        learning_rate: 1e-2,
        log_dir: dir.path().to_string_lossy().into_owned(),
        ..TrainConfig::default()
    };
    let history = fit(&mut detector, &docs, &labels, &config).unwrap();
    assert_eq!(history.len(), 8);
    assert!(history.last().unwrap().loss < history[0].loss);

    let evaluation = evaluate(&detector, &docs, &labels).unwrap();
    assert!(evaluation.metrics.accuracy > 0.8, "accuracy {}", evaluation.metrics.accuracy);
}

#[test]
fn test_conv_training_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let (urls, labels) = separable_urls();
    let docs = CharVocabulary::new().encode_all(&urls);
    let config = TrainConfig {
        epochs: 1,
        batch_size: 16,
        log_dir: dir.path().to_string_lossy().into_owned(),
        ..TrainConfig::default()
    };

    let mut a = UrlDetector::new(ModelKind::BigConvNn, tiny_args(11));
    let mut b = UrlDetector::new(ModelKind::BigConvNn, tiny_args(11));
    let ha = fit(&mut a, &docs, &labels, &config).unwrap();
    let hb = fit(&mut b, &docs, &labels, &config).unwrap();
    assert_eq!(ha[0].loss, hb[0].loss);
    assert_eq!(a.predict_proba(&docs).unwrap(), b.predict_proba(&docs).unwrap());
}
