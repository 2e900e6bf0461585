//! Hand-crafted lexical URL features for the gradient-boosted baseline.
//!
//! # Feature Vector Layout (24 dimensions)
//!
//! | Index | Feature                         | Type    |
//! |-------|---------------------------------|---------|
//! | 0     | URL length                      | Numeric |
//! | 1     | Host length                     | Numeric |
//! | 2     | Path length                     | Numeric |
//! | 3     | Query length                    | Numeric |
//! | 4     | `.` count                       | Numeric |
//! | 5     | `-` count                       | Numeric |
//! | 6     | `@` count                       | Numeric |
//! | 7     | `?` count                       | Numeric |
//! | 8     | `&` count                       | Numeric |
//! | 9     | `=` count                       | Numeric |
//! | 10    | `_` count                       | Numeric |
//! | 11    | `%` count                       | Numeric |
//! | 12    | `/` count                       | Numeric |
//! | 13    | Digit count                     | Numeric |
//! | 14    | Digit ratio                     | Numeric |
//! | 15    | Letter ratio                    | Numeric |
//! | 16    | Host is an IP address           | Binary  |
//! | 17    | Explicit `https` scheme         | Binary  |
//! | 18    | Subdomain count                 | Numeric |
//! | 19    | Query parameter count           | Numeric |
//! | 20    | Character Shannon entropy       | Numeric |
//! | 21    | Suspicious keyword count        | Numeric |
//! | 22    | `//` present after scheme       | Binary  |
//! | 23    | Top-level domain length         | Numeric |

use ndarray::Array2;
use std::collections::HashMap;
use url::{Host, Url};

/// Total number of lexical features per URL.
pub const LEXICAL_FEATURE_DIM: usize = 24;

const COUNTED_CHARS: [char; 9] = ['.', '-', '@', '?', '&', '=', '_', '%', '/'];

const SUSPICIOUS_KEYWORDS: [&str; 15] = [
    "login",
    "signin",
    "secure",
    "account",
    "update",
    "verify",
    "bank",
    "confirm",
    "password",
    "ebayisapi",
    "webscr",
    "paypal",
    "free",
    "lucky",
    "bonus",
];

pub struct LexicalFeatures;

impl LexicalFeatures {
    pub fn extract(url: &str) -> [f32; LEXICAL_FEATURE_DIM] {
        let mut f = [0.0f32; LEXICAL_FEATURE_DIM];
        let total = url.chars().count();
        f[0] = total as f32;

        let parsed = parse_lenient(url);
        if let Some(parsed) = &parsed {
            let host = parsed.host_str().unwrap_or("");
            f[1] = host.len() as f32;
            f[2] = parsed.path().len() as f32;
            f[3] = parsed.query().map(str::len).unwrap_or(0) as f32;
            let is_ip = matches!(parsed.host(), Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)));
            f[16] = if is_ip { 1.0 } else { 0.0 };
            if !is_ip && !host.is_empty() {
                let labels = host.split('.').filter(|l| !l.is_empty()).count();
                f[18] = labels.saturating_sub(2) as f32;
                f[23] = host.rsplit('.').next().map(str::len).unwrap_or(0) as f32;
            }
            f[19] = parsed.query_pairs().count() as f32;
        }

        for (i, c) in COUNTED_CHARS.iter().enumerate() {
            f[4 + i] = url.chars().filter(|ch| ch == c).count() as f32;
        }

        let digits = url.chars().filter(|c| c.is_ascii_digit()).count();
        let letters = url.chars().filter(|c| c.is_alphabetic()).count();
        f[13] = digits as f32;
        if total > 0 {
            f[14] = digits as f32 / total as f32;
            f[15] = letters as f32 / total as f32;
        }

        f[17] = if url.trim_start().to_lowercase().starts_with("https://") { 1.0 } else { 0.0 };
        f[20] = shannon_entropy(url);

        let lower = url.to_lowercase();
        f[21] = SUSPICIOUS_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .count() as f32;

        let after_scheme = lower.find("://").map(|i| &lower[i + 3..]).unwrap_or(&lower);
        f[22] = if after_scheme.contains("//") { 1.0 } else { 0.0 };

        f
    }
}

/// Parse with an implied `http://` scheme when none is given.
fn parse_lenient(url: &str) -> Option<Url> {
    let trimmed = url.trim();
    if trimmed.contains("://") {
        Url::parse(trimmed).ok()
    } else {
        Url::parse(&format!("http://{trimmed}")).ok()
    }
}

fn shannon_entropy(s: &str) -> f32 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&n| {
            let p = n as f32 / total as f32;
            -p * p.log2()
        })
        .sum()
}

/// One row of lexical features per URL.
pub fn extract_matrix<S: AsRef<str>>(urls: &[S]) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((urls.len(), LEXICAL_FEATURE_DIM));
    for (i, url) in urls.iter().enumerate() {
        let features = LexicalFeatures::extract(url.as_ref());
        for (j, v) in features.iter().enumerate() {
            out[[i, j]] = *v;
        }
    }
    out
}
