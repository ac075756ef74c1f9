//! Archive qualification and extracted-file cleanup classification.

use std::collections::HashSet;

use crate::archive::ArchiveExtractor;
use crate::store::{Download, DownloadStatus};

/// Kept regardless of extraction - the payload users actually want.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "divx", "xvid",
    "asf", "rm", "rmvb", "ts", "mts", "m2ts", "ogv", "ogg",
];

/// Deleted after extraction - subtitles, NFOs, sample images, checksums.
const AUXILIARY_EXTENSIONS: &[&str] = &[
    "txt", "nfo", "jpg", "jpeg", "png", "gif", "bmp", "srt", "sub", "idx", "vtt", "ass", "ssa",
    "smi", "rt", "sbv", "dfxp", "ttml", "xml", "log", "diz", "sfv",
];

/// Verdict for one extracted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Keep,
    Delete,
}

/// Classifies a produced file by extension. Known video extensions and
/// anything unrecognized are kept; only the named auxiliary extensions are
/// deleted - the design is conservative about deleting anything it doesn't
/// recognize.
#[must_use]
pub fn classify_extension(filename: &str) -> Classification {
    let Some(ext) = filename.rsplit('.').next().map(str::to_ascii_lowercase) else {
        return Classification::Keep;
    };

    if AUXILIARY_EXTENSIONS.contains(&ext.as_str()) {
        Classification::Delete
    } else {
        if !VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            tracing::trace!(ext, "unrecognized extension, keeping conservatively");
        }
        Classification::Keep
    }
}

/// Extracts `(base_name, part_number)` from a `*.partN.rar` filename,
/// case-insensitively. `N` may be `1`, `01`, or `001`; all parse to the
/// same numeric value. Returns `None` for non-multi-part `.rar` names and
/// for anything that isn't `.rar` at all.
#[must_use]
pub fn parse_rar_part_number(filename: &str) -> Option<(String, u32)> {
    let lower = filename.to_ascii_lowercase();
    let without_rar = lower.strip_suffix(".rar")?;
    let part_idx = without_rar.rfind(".part")?;
    let base = without_rar[..part_idx].to_string();
    let part_number: u32 = without_rar[part_idx + ".part".len()..].parse().ok()?;
    Some((base, part_number))
}

/// Partitions a group's completed members into the archives that qualify
/// for extraction: `is_archive` at submit time, the extension collaborator
/// agrees, and - for multi-part rar naming - only the first volume
/// (`N ∈ {1, 01, 001}`), deduped by base name so a stray duplicate part1
/// alias is not processed twice.
#[must_use]
pub fn select_qualifying_archives<'a>(
    members: &'a [Download],
    extractor: &dyn ArchiveExtractor,
) -> Vec<&'a Download> {
    let mut seen_bases: HashSet<String> = HashSet::new();
    let mut qualifying = Vec::new();

    for member in members {
        if member.status() != DownloadStatus::Completed {
            continue;
        }
        if !member.is_archive || !extractor.is_archive(&member.filename) {
            continue;
        }

        if let Some((base, part_number)) = parse_rar_part_number(&member.filename) {
            if part_number != 1 || !seen_bases.insert(base) {
                continue;
            }
        }

        qualifying.push(member);
    }

    qualifying
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::DefaultArchiveExtractor;
    use chrono::Utc;

    #[test]
    fn test_classify_extension_keeps_video() {
        assert_eq!(classify_extension("movie.mkv"), Classification::Keep);
        assert_eq!(classify_extension("movie.MP4"), Classification::Keep);
    }

    #[test]
    fn test_classify_extension_deletes_auxiliary() {
        assert_eq!(classify_extension("movie.nfo"), Classification::Delete);
        assert_eq!(classify_extension("movie.SRT"), Classification::Delete);
    }

    #[test]
    fn test_classify_extension_keeps_unknown() {
        assert_eq!(classify_extension("movie.xyz123"), Classification::Keep);
        assert_eq!(classify_extension("no_extension"), Classification::Keep);
    }

    #[test]
    fn test_parse_rar_part_number_variants() {
        assert_eq!(parse_rar_part_number("a.part1.rar"), Some(("a".to_string(), 1)));
        assert_eq!(parse_rar_part_number("a.part01.rar"), Some(("a".to_string(), 1)));
        assert_eq!(parse_rar_part_number("a.part001.rar"), Some(("a".to_string(), 1)));
        assert_eq!(parse_rar_part_number("a.part2.rar"), Some(("a".to_string(), 2)));
    }

    #[test]
    fn test_parse_rar_part_number_rejects_non_multipart() {
        assert_eq!(parse_rar_part_number("a.rar"), None);
        assert_eq!(parse_rar_part_number("a.zip"), None);
    }

    fn sample_member(id: i64, filename: &str, is_archive: bool, status: &str) -> Download {
        Download {
            id,
            original_url: "https://host/x".to_string(),
            direct_url: "https://cdn/x".to_string(),
            filename: filename.to_string(),
            directory: "/downloads/g1".to_string(),
            file_size: 0,
            downloaded_bytes: 0,
            progress_percent: 0.0,
            speed: 0.0,
            retry_count: 0,
            error_message: None,
            group_id: Some("g1".to_string()),
            is_archive,
            extracted_files_json: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
            paused_at: None,
            total_paused_seconds: 0.0,
            status_str: status.to_string(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_select_qualifying_archives_keeps_only_first_rar_volume() {
        let members = vec![
            sample_member(1, "a.part1.rar", true, "completed"),
            sample_member(2, "a.part2.rar", true, "completed"),
            sample_member(3, "a.part3.rar", true, "completed"),
        ];
        let extractor = DefaultArchiveExtractor;

        let qualifying = select_qualifying_archives(&members, &extractor);
        assert_eq!(qualifying.len(), 1);
        assert_eq!(qualifying[0].id, 1);
    }

    #[test]
    fn test_select_qualifying_archives_skips_non_archive_and_non_terminal() {
        let members = vec![
            sample_member(1, "movie.mkv", false, "completed"),
            sample_member(2, "b.zip", true, "failed"),
            sample_member(3, "c.zip", true, "completed"),
        ];
        let extractor = DefaultArchiveExtractor;

        let qualifying = select_qualifying_archives(&members, &extractor);
        assert_eq!(qualifying.len(), 1);
        assert_eq!(qualifying[0].id, 3);
    }
}
