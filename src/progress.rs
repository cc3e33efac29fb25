//! Parsing of yt-dlp's machine-readable progress output.
//!
//! The worker starts yt-dlp with [`PROGRESS_TEMPLATE`], so every download
//! progress line arrives as
//! `dl|<downloaded>|<total>|<total_estimate>|<speed>|<eta>|<filename>`.
//! Percent is always derived from the byte counts; yt-dlp's formatted
//! percent string is a display concern and never consumed.

/// Template handed to `--progress-template`. Fields yt-dlp cannot fill
/// come through as the literal `NA`.
pub const PROGRESS_TEMPLATE: &str = "download:dl|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress.filename)s";

/// One parsed download-phase progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProgress {
    pub downloaded: u64,
    /// Exact total if the server reported one, else yt-dlp's estimate
    pub total: Option<u64>,
    pub speed: Option<f64>,
    pub eta_secs: Option<u64>,
    pub filename: Option<String>,
}

impl RawProgress {
    /// Percent from the byte-count ratio, clamped to [0, 100].
    /// None while the total is still unknown (indeterminate).
    pub fn percent(&self) -> Option<f32> {
        let total = self.total.filter(|t| *t > 0)?;
        Some(((self.downloaded as f64 / total as f64) * 100.0).clamp(0.0, 100.0) as f32)
    }
}

pub fn parse_progress_line(line: &str) -> Option<RawProgress> {
    let rest = line.trim().strip_prefix("dl|")?;
    // Filename comes last so embedded '|' can't shift the numeric fields
    let mut fields = rest.splitn(6, '|');
    let downloaded = num_u64(fields.next()?)?;
    let total = num_u64(fields.next()?);
    let estimate = num_u64(fields.next()?);
    let speed = num_f64(fields.next()?);
    let eta_secs = num_u64(fields.next()?);
    let filename = fields
        .next()
        .map(str::trim)
        .filter(|f| !f.is_empty() && *f != "NA")
        .map(str::to_owned);
    Some(RawProgress {
        downloaded,
        total: total.or(estimate),
        speed,
        eta_secs,
        filename,
    })
}

/// Lines the postprocessor prints once the fetch is done and the
/// MP3 extraction begins.
pub fn is_convert_line(line: &str) -> bool {
    line.trim_start().starts_with("[ExtractAudio]")
}

// yt-dlp prints some numeric fields as floats (e.g. byte estimates),
// so everything is parsed through f64 first.
fn num_f64(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn num_u64(field: &str) -> Option<u64> {
    num_f64(field).map(|v| v as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_line() {
        let line = "dl|512000|1024000|NA|204800.5|12|/tmp/out/My Song.webm";
        let p = parse_progress_line(line).unwrap();
        assert_eq!(p.downloaded, 512_000);
        assert_eq!(p.total, Some(1_024_000));
        assert_eq!(p.speed, Some(204_800.5));
        assert_eq!(p.eta_secs, Some(12));
        assert_eq!(p.filename.as_deref(), Some("/tmp/out/My Song.webm"));
        assert_eq!(p.percent(), Some(50.0));
    }

    #[test]
    fn falls_back_to_estimate_when_total_unknown() {
        let p = parse_progress_line("dl|250|NA|1000.7|NA|NA|clip.m4a").unwrap();
        assert_eq!(p.total, Some(1000));
        assert_eq!(p.percent(), Some(25.0));
        assert_eq!(p.speed, None);
        assert_eq!(p.eta_secs, None);
    }

    #[test]
    fn no_total_means_indeterminate() {
        let p = parse_progress_line("dl|4096|NA|NA|NA|NA|NA").unwrap();
        assert_eq!(p.total, None);
        assert_eq!(p.percent(), None);
        assert_eq!(p.filename, None);
    }

    #[test]
    fn percent_never_exceeds_hundred() {
        // Estimates can undershoot the real size
        let p = parse_progress_line("dl|2048|NA|1000|NA|NA|x").unwrap();
        assert_eq!(p.percent(), Some(100.0));
    }

    #[test]
    fn filename_may_contain_separator() {
        let p = parse_progress_line("dl|1|2|NA|NA|NA|odd|name.webm").unwrap();
        assert_eq!(p.filename.as_deref(), Some("odd|name.webm"));
    }

    #[test]
    fn rejects_unrelated_lines() {
        assert_eq!(parse_progress_line("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_progress_line("dl|not-a-number|2|NA|NA|NA|x"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn detects_convert_phase() {
        assert!(is_convert_line("[ExtractAudio] Destination: /tmp/out/My Song.mp3"));
        assert!(!is_convert_line("[download] Destination: /tmp/out/My Song.webm"));
    }
}
