//! Statistical delimiter detection for delimited text files.
//!
//! Reads a bounded sample of leading lines (detection cost never scales with
//! file size) and scores a fixed candidate set by how consistently each
//! candidate splits the sample. Detection never fails: inconclusive input
//! falls back to the comma default.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::normalize::split_delimited;

/// Candidate delimiters in tie-break priority order (comma first).
pub const CANDIDATES: [char; 5] = [',', ';', '\t', '|', ':'];

/// Fallback when detection is inconclusive.
pub const DEFAULT_DELIMITER: char = ',';

/// Number of leading lines sampled per file.
const SAMPLE_LINES: usize = 20;

/// Detect the field delimiter of a delimited text file.
///
/// Fails open: unreadable files and inconclusive samples return
/// [`DEFAULT_DELIMITER`] rather than an error.
pub fn detect_delimiter(path: &Path) -> char {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!("Delimiter detection could not open {}: {}", path.display(), e);
            return DEFAULT_DELIMITER;
        }
    };

    let sample: Vec<String> = BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .filter(|line| !line.trim().is_empty())
        .take(SAMPLE_LINES)
        .collect();

    let delimiter = detect_from_sample(&sample);
    debug!(
        "Detected delimiter '{}' for {}",
        printable(delimiter),
        path.display()
    );
    delimiter
}

/// Detect the delimiter that best explains a line sample.
///
/// A candidate is scored by the variance of its per-line field counts; the
/// candidate with the lowest variance and a mean field count above one wins.
/// Ties keep the earlier entry of [`CANDIDATES`]. Fewer than two sample
/// lines, or no candidate splitting any line, yields the default.
pub fn detect_from_sample(lines: &[String]) -> char {
    if lines.len() < 2 {
        return DEFAULT_DELIMITER;
    }

    let mut best: Option<(char, f64)> = None;
    for candidate in CANDIDATES {
        let counts: Vec<f64> = lines
            .iter()
            .map(|line| split_delimited(line, candidate).len() as f64)
            .collect();

        let mean = counts.iter().sum::<f64>() / counts.len() as f64;
        if mean <= 1.0 {
            // Splitting produced a single field everywhere; candidate absent.
            continue;
        }

        let variance =
            counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / counts.len() as f64;

        if best.map_or(true, |(_, best_var)| variance < best_var) {
            best = Some((candidate, variance));
        }
    }

    best.map_or(DEFAULT_DELIMITER, |(delimiter, _)| delimiter)
}

/// Printable rendering of a delimiter for log and CLI output.
pub fn printable(delimiter: char) -> String {
    match delimiter {
        '\t' => "tab".to_string(),
        ' ' => "space".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detects_semicolon() {
        let sample = lines(&["id;name;amt", "1;Alice;10", "2;Bob;20"]);
        assert_eq!(detect_from_sample(&sample), ';');
    }

    #[test]
    fn test_detects_tab() {
        let sample = lines(&["id\tname", "1\tAlice", "2\tBob"]);
        assert_eq!(detect_from_sample(&sample), '\t');
    }

    #[test]
    fn test_detects_pipe_with_quoted_commas() {
        // Commas inside quotes must not count as comma fields.
        let sample = lines(&["id|name", "1|\"Smith, Alice\"", "2|\"Jones, Bob\""]);
        assert_eq!(detect_from_sample(&sample), '|');
    }

    #[test]
    fn test_single_column_file_defaults_to_comma() {
        let sample = lines(&["id", "1", "2"]);
        assert_eq!(detect_from_sample(&sample), DEFAULT_DELIMITER);
    }

    #[test]
    fn test_short_sample_defaults_to_comma() {
        assert_eq!(detect_from_sample(&lines(&["id;name"])), DEFAULT_DELIMITER);
        assert_eq!(detect_from_sample(&[]), DEFAULT_DELIMITER);
    }

    #[test]
    fn test_tie_prefers_comma() {
        // Both comma and semicolon split every line into exactly two fields.
        let sample = lines(&["a,b;c", "d,e;f"]);
        assert_eq!(detect_from_sample(&sample), ',');
    }

    #[test]
    fn test_consistent_candidate_beats_noisy_one() {
        // Comma counts vary per line; colon is constant.
        let sample = lines(&["a:b,c", "d:e", "f:g,h,i"]);
        assert_eq!(detect_from_sample(&sample), ':');
    }

    #[test]
    fn test_missing_file_falls_back_to_comma() {
        let path = Path::new("definitely_not_here.csv");
        assert_eq!(detect_delimiter(path), DEFAULT_DELIMITER);
    }
}
