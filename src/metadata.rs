//! Metadata collector (C4): normalizes stat data and content tags into a
//! single string-keyed map consumed by template rendering and AI prompts.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::SystemTime;

const AUDIO_SUFFIXES: &[&str] = &[
    "mp3", "flac", "m4a", "m4b", "aac", "wav", "oga", "ogg", "opus", "wma", "aiff", "aif", "aifc",
    "ac3",
];
const VIDEO_SUFFIXES: &[&str] = &["mp4", "mkv", "mov", "avi", "wmv", "m4v", "flv", "webm", "mpeg", "mpg"];

/// A normalized `key -> value` map. Every value is trimmed, non-empty, and
/// UTF-8; inserting `None`/empty/whitespace-only values is a no-op, matching
/// the Python original's "skip empties rather than store them" behavior so
/// templates never see a key bound to an empty string.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FileMetadata {
    data: BTreeMap<String, String>,
}

impl FileMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = normalize_value(&value.into());
        if let Some(value) = value {
            self.data.insert(key.into(), value);
        }
    }

    pub fn add_missing(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !self.data.contains_key(&key) {
            self.add(key, value);
        }
    }

    pub fn merge(&mut self, other: &FileMetadata) {
        for (k, v) in &other.data {
            self.data.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn get_first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.data.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.data.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Stat-derived metadata every file gets regardless of MIME.
pub fn collect_stat_metadata(path: &Path, size: u64) -> FileMetadata {
    let mut meta = FileMetadata::new();
    meta.add("size_bytes", size.to_string());
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        meta.add("file_stem", stem);
    }
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        meta.add("extension", ext.to_lowercase());
        if AUDIO_SUFFIXES.contains(&ext.to_lowercase().as_str()) {
            meta.add("media_kind", "audio");
        } else if VIDEO_SUFFIXES.contains(&ext.to_lowercase().as_str()) {
            meta.add("media_kind", "video");
        }
    }
    if let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) {
        if let Ok(secs) = modified.duration_since(SystemTime::UNIX_EPOCH) {
            let dt = chrono::DateTime::<chrono::Utc>::from_timestamp(secs.as_secs() as i64, 0);
            if let Some(dt) = dt {
                meta.add("mtime", dt.to_rfc3339());
                meta.add("year", dt.format("%Y").to_string());
                meta.add("month", dt.format("%m").to_string());
            }
        }
    }
    meta
}

/// Parses a `"N/M"` track-number-style string into `(primary, total)`.
pub fn parse_index_pair(value: &str) -> Option<(u32, Option<u32>)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let mut parts = value.splitn(2, '/');
    let primary: u32 = parts.next()?.trim().parse().ok()?;
    let total = parts
        .next()
        .and_then(|s| s.trim().parse::<u32>().ok());
    Some((primary, total))
}

/// Extracts a 4-digit year from an integer or a free-form string.
pub fn parse_year_value(value: &str) -> Option<u32> {
    let value = value.trim();
    if let Ok(year) = value.parse::<u32>() {
        if (1000..=9999).contains(&year) {
            return Some(year);
        }
    }
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).take(4).collect();
    digits.parse().ok().filter(|y: &u32| (1000..=9999).contains(y))
}

/// Reads embedded tags from audio/video files (ID3, Vorbis comments, MP4
/// atoms, ...) via `lofty`'s format-sniffing reader. Returns an empty map
/// for anything that isn't a recognized media container or that lofty
/// can't parse — a bad tag block degrades to "no hint", not a failure.
pub fn collect_media_tags(path: &Path, mime: &str) -> FileMetadata {
    let mut meta = FileMetadata::new();
    if !(mime.starts_with("audio/") || mime.starts_with("video/")) {
        return meta;
    }

    let probe = match lofty::probe::Probe::open(path) {
        Ok(probe) => probe,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "lofty could not open file for tag probing");
            return meta;
        }
    };
    let tagged_file = match probe.read() {
        Ok(tagged_file) => tagged_file,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "lofty could not read tagged file");
            return meta;
        }
    };

    let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
        return meta;
    };

    use lofty::tag::Accessor;
    if let Some(title) = tag.title() {
        meta.add("title", title.to_string());
    }
    if let Some(artist) = tag.artist() {
        meta.add("artist", artist.to_string());
    }
    if let Some(album) = tag.album() {
        meta.add("album", album.to_string());
    }
    if let Some(genre) = tag.genre() {
        meta.add("genre", genre.to_string());
    }
    if let Some(year) = tag.year() {
        meta.add("year", year.to_string());
    }
    if let Some(track) = tag.track() {
        meta.add("track", track.to_string());
    }
    if let Some(comment) = tag.comment() {
        meta.add("comment", comment.to_string());
    }

    let properties = tagged_file.properties();
    let duration_secs = properties.duration().as_secs();
    if duration_secs > 0 {
        meta.add("duration_seconds", duration_secs.to_string());
    }

    meta
}

const DOCX_CORE_PROPS_PATH: &str = "docProps/core.xml";

/// Reads `docProps/core.xml` out of a zipped Office document (docx/xlsx/pptx
/// all share this container layout) and pulls the handful of Dublin Core
/// fields Office populates on every save. Anything that isn't a zip, or a
/// zip without that entry, degrades to an empty map.
pub fn collect_document_properties(path: &Path, mime: &str) -> FileMetadata {
    let mut meta = FileMetadata::new();
    if !is_office_container_mime(mime) {
        return meta;
    }

    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(_) => return meta,
    };
    let mut archive = match zip::ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(_) => return meta,
    };
    let mut core_xml = match archive.by_name(DOCX_CORE_PROPS_PATH) {
        Ok(entry) => entry,
        Err(_) => return meta,
    };

    let mut xml = String::new();
    use std::io::Read;
    if core_xml.read_to_string(&mut xml).is_err() {
        return meta;
    }
    drop(core_xml);

    for (tag, key) in [
        ("dc:title", "doc_title"),
        ("dc:creator", "doc_author"),
        ("dc:subject", "doc_subject"),
        ("dc:description", "doc_description"),
        ("cp:keywords", "doc_keywords"),
        ("cp:category", "doc_category"),
        ("dcterms:created", "doc_created"),
        ("dcterms:modified", "doc_modified"),
    ] {
        if let Some(value) = extract_xml_tag_text(&xml, tag) {
            meta.add(key, value);
        }
    }

    meta
}

fn is_office_container_mime(mime: &str) -> bool {
    matches!(
        mime,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation"
    )
}

/// Pulls the text content of the first `<tag>...</tag>` (optionally
/// self-closed, in which case there is no text to return) from a small XML
/// document. Good enough for `core.xml`'s flat property list; not a general
/// XML parser.
fn extract_xml_tag_text(xml: &str, tag: &str) -> Option<String> {
    let open_needle = format!("<{tag}");
    let start = xml.find(&open_needle)?;
    let after_open = xml[start..].find('>')? + start + 1;
    if xml.as_bytes().get(after_open.checked_sub(2)?).copied() == Some(b'/') {
        return None;
    }
    let close_needle = format!("</{tag}>");
    let end = xml[after_open..].find(&close_needle)? + after_open;
    let text = xml[after_open..end].trim();
    if text.is_empty() {
        None
    } else {
        Some(
            text.replace("&amp;", "&")
                .replace("&lt;", "<")
                .replace("&gt;", ">")
                .replace("&quot;", "\"")
                .replace("&apos;", "'"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_skips_empty_values() {
        let mut meta = FileMetadata::new();
        meta.add("artist", "   ");
        assert!(meta.get("artist").is_none());
    }

    #[test]
    fn merge_does_not_override_existing_keys() {
        let mut a = FileMetadata::new();
        a.add("artist", "A");
        let mut b = FileMetadata::new();
        b.add("artist", "B");
        b.add("album", "Album");
        a.merge(&b);
        assert_eq!(a.get("artist"), Some("A"));
        assert_eq!(a.get("album"), Some("Album"));
    }

    #[test]
    fn parse_index_pair_handles_total() {
        assert_eq!(parse_index_pair("3/12"), Some((3, Some(12))));
        assert_eq!(parse_index_pair("7"), Some((7, None)));
        assert_eq!(parse_index_pair(""), None);
    }

    #[test]
    fn parse_year_value_extracts_four_digits() {
        assert_eq!(parse_year_value("2023"), Some(2023));
        assert_eq!(parse_year_value("Released 2019 remaster"), Some(2019));
        assert_eq!(parse_year_value("n/a"), None);
    }

    #[test]
    fn collect_media_tags_skips_non_media_mime() {
        let meta = collect_media_tags(Path::new("/nonexistent.txt"), "text/plain");
        assert!(meta.is_empty());
    }

    #[test]
    fn collect_media_tags_degrades_to_empty_on_unreadable_file() {
        let meta = collect_media_tags(Path::new("/nonexistent.mp3"), "audio/mpeg");
        assert!(meta.is_empty());
    }

    #[test]
    fn collect_document_properties_skips_non_office_mime() {
        let meta = collect_document_properties(Path::new("/nonexistent.docx"), "text/plain");
        assert!(meta.is_empty());
    }

    #[test]
    fn extract_xml_tag_text_pulls_simple_element() {
        let xml = r#"<cp:coreProperties><dc:title>Quarterly Report</dc:title><dc:creator>A. Author</dc:creator></cp:coreProperties>"#;
        assert_eq!(extract_xml_tag_text(xml, "dc:title"), Some("Quarterly Report".to_string()));
        assert_eq!(extract_xml_tag_text(xml, "dc:creator"), Some("A. Author".to_string()));
        assert_eq!(extract_xml_tag_text(xml, "dc:subject"), None);
    }

    #[test]
    fn extract_xml_tag_text_unescapes_entities() {
        let xml = r#"<dc:title>Tom &amp; Jerry</dc:title>"#;
        assert_eq!(extract_xml_tag_text(xml, "dc:title"), Some("Tom & Jerry".to_string()));
    }

    #[test]
    fn extract_xml_tag_text_treats_self_closed_as_absent() {
        let xml = r#"<dc:title/>"#;
        assert_eq!(extract_xml_tag_text(xml, "dc:title"), None);
    }

    #[test]
    fn collect_document_properties_reads_core_xml_from_real_docx_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.docx");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file(DOCX_CORE_PROPS_PATH, options).unwrap();
        use std::io::Write;
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">
<dc:title>Sample Title</dc:title>
<dc:creator>Jane Doe</dc:creator>
</cp:coreProperties>"#,
        )
        .unwrap();
        zip.finish().unwrap();

        let meta = collect_document_properties(
            &path,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        );
        assert_eq!(meta.get("doc_title"), Some("Sample Title"));
        assert_eq!(meta.get("doc_author"), Some("Jane Doe"));
    }
}
