// Text scraping of yt-dlp stdout.
//
// yt-dlp has no machine-readable progress channel in the mode we run it in,
// so everything here is pattern matching over free text. Keep all of it in
// this file so the rules can change without touching the orchestrator.

use regex::Regex;

lazy_static::lazy_static! {
    static ref PERCENT_RE: Regex = Regex::new(r"(\d+\.\d+)%").unwrap();
}

/// First `<digits>.<digits>%` in the segment, e.g. 12.5 for
/// `[download]  12.5% of 10.00MiB at 1.00MiB/s ETA 00:09`
pub fn parse_progress_percent(segment: &str) -> Option<f64> {
    let caps = PERCENT_RE.captures(segment)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Segment treated as the final file path when it mentions the destination.
/// The last such segment printed wins (`--print after_move:filepath` comes last).
pub fn final_path_candidate<'a>(segment: &'a str, destination: &str) -> Option<&'a str> {
    if destination.is_empty() || !segment.contains(destination) {
        return None;
    }
    let trimmed = segment.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_from_bare_value() {
        assert_eq!(parse_progress_percent("12.5%"), Some(12.5));
    }

    #[test]
    fn test_percent_from_download_line() {
        let line = "[download]  45.0% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)";
        assert_eq!(parse_progress_percent(line), Some(45.0));
    }

    #[test]
    fn test_integer_percent_is_ignored() {
        // Only the decimal form counts, yt-dlp always prints one decimal
        assert_eq!(parse_progress_percent("[download] 100% of 3.00MiB"), None);
        assert_eq!(parse_progress_percent("[info] Downloading webpage"), None);
    }

    #[test]
    fn test_first_match_wins() {
        assert_eq!(parse_progress_percent("3.1% then 9.9%"), Some(3.1));
    }

    #[test]
    fn test_final_path_requires_destination() {
        assert_eq!(
            final_path_candidate("/d/My Video.mp4\n", "/d"),
            Some("/d/My Video.mp4")
        );
        assert_eq!(final_path_candidate("12.5%", "/d"), None);
        assert_eq!(final_path_candidate("anything", ""), None);
    }
}
