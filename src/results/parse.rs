//! Parsing of free-form benchmark text.
//!
//! Run logs are divided into sections by marker lines such as
//! `--- Baseline ---`. Inside a section every line whose first token is an
//! unsigned integer is a candidate measurement row:
//!
//! ```text
//! L    QPS      Latency   ...   Recall
//! 50   1234.5   123.4           95.10
//! ```
//!
//! QPS and latency are the second and third tokens, recall is the last.
//! Candidate rows whose numbers do not parse are reported and skipped.

use serde::Serialize;
use tracing::debug;

use crate::error::PipelineError;
use crate::sweep::Algorithm;

/// One measured search setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    pub search_l: u32,
    pub qps: f64,
    pub latency: f64,
    pub recall: f64,
}

/// Rows found under one marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Marker text without the dashes
    pub label: String,
    /// Algorithm named by the marker, when it names one
    pub algorithm: Option<Algorithm>,
    pub rows: Vec<Measurement>,
}

/// Everything recovered from one text.
#[derive(Debug, Default)]
pub struct ParsedRun {
    pub sections: Vec<Section>,
    /// Candidate rows that were skipped, as `ParseError`s
    pub skipped: Vec<PipelineError>,
}

impl ParsedRun {
    /// All rows across sections, in text order.
    pub fn rows(&self) -> impl Iterator<Item = &Measurement> {
        self.sections.iter().flat_map(|s| s.rows.iter())
    }

    /// The row measured at `search_l`, falling back to the last row.
    #[must_use]
    pub fn select(&self, search_l: u32) -> Option<Measurement> {
        let mut last = None;
        for row in self.rows() {
            if row.search_l == search_l {
                return Some(*row);
            }
            last = Some(*row);
        }
        last
    }
}

/// Label of the implicit section used for unmarked searcher output.
pub const SEARCH_SECTION: &str = "search";

/// Parses a marked run log. Rows before the first marker are ignored.
pub fn parse_sections(text: &str, origin: &str) -> ParsedRun {
    parse_text(text, origin, None)
}

/// Parses raw searcher output, where rows may appear without any marker.
pub fn parse_search_output(text: &str, origin: &str) -> ParsedRun {
    parse_text(
        text,
        origin,
        Some(Section {
            label: SEARCH_SECTION.to_string(),
            algorithm: None,
            rows: Vec::new(),
        }),
    )
}

fn parse_text(text: &str, origin: &str, initial: Option<Section>) -> ParsedRun {
    let mut run = ParsedRun::default();
    let mut current = initial;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();

        if let Some(label) = marker_label(line) {
            if let Some(section) = current.take() {
                run.sections.push(section);
            }
            current = Some(Section {
                label: label.to_string(),
                algorithm: Algorithm::from_label(label),
                rows: Vec::new(),
            });
            continue;
        }

        let Some(section) = current.as_mut() else {
            continue;
        };
        match parse_row(line) {
            RowParse::NotARow => {}
            RowParse::Row(row) => section.rows.push(row),
            RowParse::Bad(reason) => {
                debug!("{origin}:{}: skipped row: {reason}", line_no + 1);
                run.skipped.push(PipelineError::ParseError {
                    origin: format!("{origin}:{}", line_no + 1),
                    reason,
                });
            }
        }
    }

    if let Some(section) = current {
        run.sections.push(section);
    }
    // Implicit section that never received rows is noise
    run.sections
        .retain(|s| !(s.label == SEARCH_SECTION && s.algorithm.is_none() && s.rows.is_empty()));
    run
}

/// `--- Name ---` -> `Name`.
fn marker_label(line: &str) -> Option<&str> {
    let inner = line.strip_prefix("---")?.strip_suffix("---")?.trim();
    (!inner.is_empty() && !inner.starts_with('-')).then_some(inner)
}

enum RowParse {
    NotARow,
    Row(Measurement),
    Bad(String),
}

fn parse_row(line: &str) -> RowParse {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(search_l) = tokens.first().and_then(|t| t.parse::<u32>().ok()) else {
        return RowParse::NotARow;
    };
    if tokens.len() < 4 {
        return RowParse::Bad(format!(
            "expected at least 4 fields, found {}",
            tokens.len()
        ));
    }

    let number = |name: &str, token: &str| {
        token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("{name} field '{token}' is not a number"))
    };
    let fields = number("QPS", tokens[1]).and_then(|qps| {
        let latency = number("latency", tokens[2])?;
        let recall = number("recall", tokens[tokens.len() - 1])?;
        Ok((qps, latency, recall))
    });

    match fields {
        Ok((qps, latency, recall)) => RowParse::Row(Measurement {
            search_l,
            qps,
            latency,
            recall,
        }),
        Err(reason) => RowParse::Bad(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_good_one_bad_row() {
        let text = "\
--- Baseline ---
L   QPS   Lat   Recall
50  1200.5  80.1  0.95
60  FAIL  FAIL  FAIL
";
        let run = parse_sections(text, "gist_R32_min1.0_max1.1.txt");
        assert_eq!(run.rows().count(), 1);
        assert_eq!(run.skipped.len(), 1);
        assert!(matches!(run.skipped[0], PipelineError::ParseError { .. }));

        let row = run.rows().next().unwrap();
        assert_eq!(row.search_l, 50);
        assert_eq!(row.qps, 1200.5);
        assert_eq!(row.recall, 0.95);
    }

    #[test]
    fn test_sections_are_labeled() {
        let text = "\
preamble 10 ignored
10 1 2 3
--- Baseline ---
10 100.0 5.0 0.90
20 80.0 6.0 0.94
--- MCGI ---
10 110.0 4.5 0.91
";
        let run = parse_sections(text, "log");
        assert_eq!(run.sections.len(), 2);
        assert_eq!(run.sections[0].algorithm, Some(Algorithm::Baseline));
        assert_eq!(run.sections[0].rows.len(), 2);
        assert_eq!(run.sections[1].algorithm, Some(Algorithm::Adaptive));
        assert_eq!(run.sections[1].rows[0].qps, 110.0);
        assert!(run.skipped.is_empty());
    }

    #[test]
    fn test_search_output_without_marker() {
        let text = "\
Loading index...
  L     QPS  Mean Latency  99.9 Latency  Mean IOs  CPU (s)  Recall@10
=====================================================================
 10  5321.2  1502.3  4000.1  12.0  300.0  88.7
 20  4100.0  1900.8  5000.2  19.5  410.0  93.4
Done searching. Now saving results
";
        let run = parse_search_output(text, "search");
        assert_eq!(run.sections.len(), 1);
        assert_eq!(run.sections[0].label, SEARCH_SECTION);

        let picked = run.select(20).unwrap();
        assert_eq!(picked.search_l, 20);
        assert_eq!(picked.qps, 4100.0);
        assert_eq!(picked.latency, 1900.8);
        assert_eq!(picked.recall, 93.4);

        // Unknown L falls back to the last row
        assert_eq!(run.select(99).unwrap().search_l, 20);
    }

    #[test]
    fn test_short_numeric_line_is_skipped() {
        let run = parse_search_output("100 points loaded\n", "search");
        assert_eq!(run.rows().count(), 0);
        assert_eq!(run.skipped.len(), 1);
        assert!(run.select(10).is_none());
    }

    #[test]
    fn test_marker_label() {
        assert_eq!(marker_label("--- Adaptive ---"), Some("Adaptive"));
        assert_eq!(marker_label("-------------"), None);
        assert_eq!(marker_label("--- Baseline"), None);
    }
}
