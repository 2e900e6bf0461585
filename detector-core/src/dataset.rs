//! Dataset ingestion and character-level encoding.
//!
//! Datasets are CSV files with a header row, one column holding the URL and
//! another holding its label. Labels are either already binary (`0`/`1`,
//! `true`/`false`) or categorical strings that get binarized against a
//! configured positive label (e.g. `bad`/`good`).

use crate::error::{DetectorError, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Index used for padding positions.
pub const PAD_INDEX: usize = 0;
/// Index used for characters outside the alphabet.
pub const UNKNOWN_INDEX: usize = 1;

const ALPHABET: &str = concat!(
    "abcdefghijklmnopqrstuvwxyz",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "0123456789",
    "-._~:/?#[]@!$&'()*+,;=%",
);

/// Where a dataset lives and how its columns are interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    pub path: String,
    #[serde(default = "default_url_column")]
    pub url_column: String,
    #[serde(default = "default_label_column")]
    pub label_column: String,
    #[serde(default)]
    pub binarize: bool,
    #[serde(default = "default_positive_label")]
    pub positive_label: String,
}

fn default_url_column() -> String {
    "url".to_string()
}

fn default_label_column() -> String {
    "label".to_string()
}

fn default_positive_label() -> String {
    "bad".to_string()
}

impl DatasetSpec {
    pub fn load(&self) -> Result<LabeledUrls> {
        load_data(
            &self.path,
            &self.url_column,
            &self.label_column,
            self.binarize,
            &self.positive_label,
        )
    }
}

/// URLs paired with binary labels (0 = benign, 1 = malicious).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledUrls {
    pub urls: Vec<String>,
    pub labels: Vec<u8>,
}

impl LabeledUrls {
    pub fn new(urls: Vec<String>, labels: Vec<u8>) -> Result<Self> {
        if urls.len() != labels.len() {
            return Err(DetectorError::LengthMismatch {
                inputs: urls.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { urls, labels })
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Shuffle URLs and labels together. The same seed always yields the
    /// same order.
    pub fn shuffle(&mut self, seed: u64) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
        self.urls = order.iter().map(|&i| self.urls[i].clone()).collect();
        self.labels = order.iter().map(|&i| self.labels[i]).collect();
    }

    /// The last `n` samples (all of them if there are fewer).
    pub fn tail(&self, n: usize) -> LabeledUrls {
        let start = self.len().saturating_sub(n);
        LabeledUrls {
            urls: self.urls[start..].to_vec(),
            labels: self.labels[start..].to_vec(),
        }
    }

    /// Split into a head holding `fraction` of the samples and the rest.
    pub fn split_at(&self, fraction: f64) -> (LabeledUrls, LabeledUrls) {
        let at = ((self.len() as f64) * fraction.clamp(0.0, 1.0)).floor() as usize;
        let head = LabeledUrls {
            urls: self.urls[..at].to_vec(),
            labels: self.labels[..at].to_vec(),
        };
        let rest = LabeledUrls {
            urls: self.urls[at..].to_vec(),
            labels: self.labels[at..].to_vec(),
        };
        (head, rest)
    }

    pub fn class_balance(&self) -> (usize, usize) {
        class_balance(&self.labels)
    }
}

/// Count of (benign, malicious) labels.
pub fn class_balance(labels: &[u8]) -> (usize, usize) {
    let malicious = labels.iter().filter(|&&l| l == 1).count();
    (labels.len() - malicious, malicious)
}

/// Load a labelled URL dataset from a CSV file.
pub fn load_data<P: AsRef<Path>>(
    path: P,
    url_column: &str,
    label_column: &str,
    binarize: bool,
    positive_label: &str,
) -> Result<LabeledUrls> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let column_index = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DetectorError::MissingColumn {
                column: name.to_string(),
                path: path.display().to_string(),
            })
    };
    let url_idx = column_index(url_column)?;
    let label_idx = column_index(label_column)?;

    let positive = positive_label.trim().to_lowercase();
    let mut data = LabeledUrls::default();
    let mut skipped = 0usize;

    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let url = record.get(url_idx).unwrap_or("").trim();
        if url.is_empty() {
            skipped += 1;
            continue;
        }
        let raw_label = record.get(label_idx).unwrap_or("");
        let label = if binarize {
            u8::from(raw_label.trim().to_lowercase() == positive)
        } else {
            parse_binary_label(raw_label).ok_or_else(|| DetectorError::InvalidLabel {
                line,
                value: raw_label.to_string(),
            })?
        };

        data.urls.push(url.to_string());
        data.labels.push(label);
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} rows with an empty URL in {}", skipped, path.display());
    }
    let (benign, malicious) = data.class_balance();
    tracing::info!(
        "Loaded {} URLs from {} ({} benign, {} malicious)",
        data.len(),
        path.display(),
        benign,
        malicious
    );

    Ok(data)
}

fn parse_binary_label(raw: &str) -> Option<u8> {
    match raw.trim().to_lowercase().as_str() {
        "0" | "false" => Some(0),
        "1" | "true" => Some(1),
        other => match other.parse::<f64>() {
            Ok(v) if v == 0.0 => Some(0),
            Ok(v) if v == 1.0 => Some(1),
            _ => None,
        },
    }
}

/// Maps URL characters to embedding indices.
#[derive(Debug, Clone)]
pub struct CharVocabulary {
    index: HashMap<char, usize>,
}

impl Default for CharVocabulary {
    fn default() -> Self {
        let index = ALPHABET
            .chars()
            .enumerate()
            .map(|(i, c)| (c, i + 2))
            .collect();
        Self { index }
    }
}

impl CharVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct indices, padding and unknown included.
    pub fn size(&self) -> usize {
        self.index.len() + 2
    }

    pub fn encode(&self, url: &str) -> Vec<usize> {
        url.chars()
            .map(|c| self.index.get(&c).copied().unwrap_or(UNKNOWN_INDEX))
            .collect()
    }

    pub fn encode_all<S: AsRef<str>>(&self, urls: &[S]) -> Vec<Vec<usize>> {
        urls.iter().map(|u| self.encode(u.as_ref())).collect()
    }
}

/// Pad (post) or crop every document to exactly `max_length` indices.
pub fn pad_sequences(docs: &[Vec<usize>], max_length: usize) -> Array2<usize> {
    let mut out = Array2::from_elem((docs.len(), max_length), PAD_INDEX);
    for (i, doc) in docs.iter().enumerate() {
        for (j, &tok) in doc.iter().take(max_length).enumerate() {
            out[[i, j]] = tok;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_vocabulary_matches_default_size() {
        let vocab = CharVocabulary::new();
        assert_eq!(vocab.size(), 87);
    }

    #[test]
    fn test_encode_maps_unknown_characters() {
        let vocab = CharVocabulary::new();
        let ids = vocab.encode("a é");
        assert_eq!(ids, vec![2, UNKNOWN_INDEX, UNKNOWN_INDEX]);
        assert!(vocab.encode("http://x.com/?q=1").iter().all(|&i| i >= 2 && i < 87));
    }

    #[test]
    fn test_pad_sequences_pads_and_crops() {
        let docs = vec![vec![5, 6], vec![1, 2, 3, 4, 5]];
        let padded = pad_sequences(&docs, 3);
        assert_eq!(padded.row(0).to_vec(), vec![5, 6, 0]);
        assert_eq!(padded.row(1).to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_load_numeric_labels() {
        let file = write_csv("url,isMalicious\nhttp://a.com,0\nhttp://b.ru/x,1\n ,1\nc.com,true\n");
        let data = load_data(file.path(), "url", "isMalicious", false, "bad").unwrap();
        assert_eq!(data.urls, vec!["http://a.com", "http://b.ru/x", "c.com"]);
        assert_eq!(data.labels, vec![0, 1, 1]);
    }

    #[test]
    fn test_load_binarized_labels() {
        let file = write_csv("URL,Label\nfoo.com,good\nbar.xyz, BAD\n");
        let data = load_data(file.path(), "URL", "Label", true, "bad").unwrap();
        assert_eq!(data.labels, vec![0, 1]);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let file = write_csv("url,label\na.com,0\n");
        let err = load_data(file.path(), "url", "isMalicious", false, "bad").unwrap_err();
        assert!(matches!(err, DetectorError::MissingColumn { ref column, .. } if column == "isMalicious"));
    }

    #[test]
    fn test_invalid_label_reports_line() {
        let file = write_csv("url,label\na.com,0\nb.com,maybe\n");
        let err = load_data(file.path(), "url", "label", false, "bad").unwrap_err();
        match err {
            DetectorError::InvalidLabel { line, value } => {
                assert_eq!(line, 3);
                assert_eq!(value, "maybe");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shuffle_is_deterministic_and_keeps_pairs() {
        let urls: Vec<String> = (0..20).map(|i| format!("u{i}")).collect();
        let labels: Vec<u8> = (0..20).map(|i| (i % 2) as u8).collect();
        let mut a = LabeledUrls::new(urls.clone(), labels.clone()).unwrap();
        let mut b = LabeledUrls::new(urls, labels).unwrap();
        a.shuffle(7);
        b.shuffle(7);
        assert_eq!(a, b);
        for (url, label) in a.urls.iter().zip(&a.labels) {
            let i: usize = url[1..].parse().unwrap();
            assert_eq!(*label as usize, i % 2);
        }
    }

    #[test]
    fn test_split_and_tail() {
        let data = LabeledUrls::new(
            (0..10).map(|i| i.to_string()).collect(),
            vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1],
        )
        .unwrap();
        let (head, rest) = data.split_at(0.8);
        assert_eq!(head.len(), 8);
        assert_eq!(rest.urls, vec!["8", "9"]);
        assert_eq!(data.tail(3).urls, vec!["7", "8", "9"]);
        assert_eq!(data.tail(100).len(), 10);
        assert_eq!(data.class_balance(), (6, 4));
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        assert!(LabeledUrls::new(vec!["a".into()], vec![]).is_err());
    }
}
