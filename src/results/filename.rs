//! Configuration metadata encoded in result file names.
//!
//! Two shapes are recognized, matched from the end of the file stem:
//!
//! ```text
//! <dataset>_R<r>_L<l>_min<alpha_min>_max<alpha_max>.txt
//! <dataset>_R<r>_min<alpha_min>_max<alpha_max>.txt
//! ```
//!
//! Anything before the dataset token is ignored, so `run3_gist_R32_min1.0_max1.1.txt`
//! still yields dataset `gist`.

use serde::Serialize;

use crate::sweep::AlphaBounds;

/// Metadata recovered from a result file name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileNameMeta {
    pub dataset: String,
    pub r: u32,
    /// Present when the file holds a single search L
    pub search_l: Option<u32>,
    pub alpha: AlphaBounds,
}

/// Outcome of matching a file name against the grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum FileName {
    Meta(FileNameMeta),
    Unrecognized,
}

/// Matches `name` (a bare file name, not a path) against the grammar.
pub fn parse_file_name(name: &str) -> FileName {
    match try_parse(name) {
        Some(meta) => FileName::Meta(meta),
        None => FileName::Unrecognized,
    }
}

fn try_parse(name: &str) -> Option<FileNameMeta> {
    let stem = name.strip_suffix(".txt")?;
    let mut tokens = stem.rsplit('_');

    let alpha_max = alpha_value(tokens.next()?.strip_prefix("max")?)?;
    let alpha_min = alpha_value(tokens.next()?.strip_prefix("min")?)?;

    let mut token = tokens.next()?;
    let search_l = match tagged_number(token, 'L') {
        Some(l) => {
            token = tokens.next()?;
            Some(l)
        }
        None => None,
    };
    let r = tagged_number(token, 'R')?;

    let dataset = tokens.next()?;
    if dataset.is_empty() || !dataset.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    Some(FileNameMeta {
        dataset: dataset.to_string(),
        r,
        search_l,
        alpha: AlphaBounds::new(alpha_min, alpha_max),
    })
}

/// `R32` -> 32 for tag `R`.
fn tagged_number(token: &str, tag: char) -> Option<u32> {
    let digits = token.strip_prefix(tag)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Digits and dots only, parsed as a decimal.
fn alpha_value(text: &str) -> Option<f64> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> FileNameMeta {
        match parse_file_name(name) {
            FileName::Meta(meta) => meta,
            FileName::Unrecognized => panic!("{name} should parse"),
        }
    }

    #[test]
    fn test_name_without_l() {
        let m = meta("gist_R32_min1.0_max1.1.txt");
        assert_eq!(m.dataset, "gist");
        assert_eq!(m.r, 32);
        assert_eq!(m.search_l, None);
        assert_eq!(m.alpha, AlphaBounds::new(1.0, 1.1));
    }

    #[test]
    fn test_name_with_l() {
        let m = meta("sift_R48_L40_min1.1_max2.0.txt");
        assert_eq!(m.dataset, "sift");
        assert_eq!(m.r, 48);
        assert_eq!(m.search_l, Some(40));
        assert_eq!(m.alpha, AlphaBounds::new(1.1, 2.0));
    }

    #[test]
    fn test_leading_tokens_ignored() {
        assert_eq!(meta("scan_v2_glove_R80_min1.0_max1.5.txt").dataset, "glove");
    }

    #[test]
    fn test_unrecognized_names() {
        for name in [
            "gist_R32_min1.0_max1.1.csv",
            "gist_R32_min1.0.txt",
            "gist_Rxx_min1.0_max1.1.txt",
            "gist_R32_min1.0_maxabc.txt",
            "R32_min1.0_max1.1.txt",
            "gi-st_R32_min1.0_max1.1.txt",
            "notes.txt",
        ] {
            assert_eq!(parse_file_name(name), FileName::Unrecognized, "{name}");
        }
    }
}
