//! Metadata derived from the document file name.
//!
//! Files follow the `<title>_<date>.<ext>` convention, e.g.
//! `Physics_2020.txt` or `History_04 March 2022.txt`. The first `_` segment
//! becomes the title, the second is run through [`normalize_date`].

use chrono::NaiveDate;

use crate::models::{Metadata, RawDocument};

/// File extensions stripped before the name is split.
pub const KNOWN_EXTENSIONS: &[&str] = &["txt", "md", "text"];

/// Fields recoverable from a file name alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameMetadata {
    pub title: Option<String>,
    pub date: Option<String>,
}

/// Extract title and date from a file name.
///
/// ```rust
/// use passage_retrieval::metadata::extract;
///
/// let meta = extract("Physics_2020.txt");
/// assert_eq!(meta.title.as_deref(), Some("Physics"));
/// assert_eq!(meta.date.as_deref(), Some("2020"));
/// ```
pub fn extract(filename: &str) -> FilenameMetadata {
    let stem = strip_known_extension(filename);
    let mut parts = stem.split('_');

    let title = parts
        .next()
        .filter(|t| !t.is_empty())
        .map(ToString::to_string);
    let date = parts.next().and_then(normalize_date);

    FilenameMetadata { title, date }
}

/// Normalize a raw date string, first match wins:
///
/// 1. `"04 March 2022"` → `"2022-03-04"`
/// 2. `"1990s"` → `"1990"`
/// 3. `"2020"` → `"2020"`
///
/// Anything else yields `None`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();

    if let Some(date) = parse_full_month_date(raw) {
        return Some(date.format("%Y-%m-%d").to_string());
    }

    let bytes = raw.as_bytes();
    let leading_year = bytes.len() >= 4 && bytes[..4].iter().all(u8::is_ascii_digit);

    if leading_year && bytes.get(4) == Some(&b's') {
        return Some(raw[..4].to_string());
    }

    if leading_year && bytes.len() == 4 {
        return Some(raw.to_string());
    }

    None
}

/// `%B` also accepts abbreviations when parsing; only full month names count.
fn parse_full_month_date(raw: &str) -> Option<NaiveDate> {
    let date = NaiveDate::parse_from_str(raw, "%d %B %Y").ok()?;
    let month = raw.split_whitespace().nth(1)?;
    date.format("%B")
        .to_string()
        .eq_ignore_ascii_case(month)
        .then_some(date)
}

/// Build the full passage metadata for a document.
///
/// `category` comes from the document's parent directory, which only exists
/// when the documents directory is scanned recursively.
pub fn for_document(doc: &RawDocument) -> Metadata {
    let FilenameMetadata { title, date } = extract(doc.file_name());
    Metadata {
        title,
        date,
        category: doc.parent_dir().map(ToString::to_string),
    }
}

fn strip_known_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if KNOWN_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)) =>
        {
            stem
        }
        _ => filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_title_and_bare_year() {
        let meta = extract("Physics_2020.txt");
        assert_eq!(meta.title.as_deref(), Some("Physics"));
        assert_eq!(meta.date.as_deref(), Some("2020"));
    }

    #[test]
    fn test_full_date() {
        let meta = extract("History_04 March 2022.txt");
        assert_eq!(meta.title.as_deref(), Some("History"));
        assert_eq!(meta.date.as_deref(), Some("2022-03-04"));
    }

    #[test]
    fn test_title_only() {
        let meta = extract("Notes.txt");
        assert_eq!(meta.title.as_deref(), Some("Notes"));
        assert_eq!(meta.date, None);
    }

    #[test]
    fn test_unparseable_date_is_absent() {
        let meta = extract("Biology_sometime.txt");
        assert_eq!(meta.title.as_deref(), Some("Biology"));
        assert_eq!(meta.date, None);
    }

    #[test]
    fn test_unknown_extension_kept() {
        let meta = extract("archive_2020.tar");
        assert_eq!(meta.title.as_deref(), Some("archive"));
        assert_eq!(meta.date, None, "'2020.tar' is not a bare year");
    }

    #[test]
    fn test_empty_title_segment() {
        let meta = extract("_2020.txt");
        assert_eq!(meta.title, None);
        assert_eq!(meta.date.as_deref(), Some("2020"));
    }

    #[test]
    fn test_normalize_date_rules() {
        assert_eq!(normalize_date("04 March 2022").as_deref(), Some("2022-03-04"));
        assert_eq!(normalize_date(" 1 January 1999 ").as_deref(), Some("1999-01-01"));
        assert_eq!(normalize_date("1990s").as_deref(), Some("1990"));
        assert_eq!(normalize_date("1990s era").as_deref(), Some("1990"));
        assert_eq!(normalize_date("2020").as_deref(), Some("2020"));
        assert_eq!(normalize_date("20201"), None);
        assert_eq!(normalize_date("March 2022"), None);
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("31 February 2022"), None);
    }

    #[test]
    fn test_abbreviated_month_rejected() {
        assert_eq!(normalize_date("04 Mar 2022"), None);
        assert_eq!(normalize_date("15 Sept 1944"), None);
        assert_eq!(normalize_date("04 march 2022").as_deref(), Some("2022-03-04"));
        assert_eq!(normalize_date("09 May 2001").as_deref(), Some("2001-05-09"));
        assert_eq!(extract("Rome_15 Mar 1944.txt").date, None);
    }

    #[test]
    fn test_for_document_category() {
        let doc = RawDocument {
            path: PathBuf::from("/corpus/science/Physics_2020.txt"),
            relative_path: "science/Physics_2020.txt".into(),
            raw_text: String::new(),
        };
        let meta = for_document(&doc);
        assert_eq!(meta.title.as_deref(), Some("Physics"));
        assert_eq!(meta.date.as_deref(), Some("2020"));
        assert_eq!(meta.category.as_deref(), Some("science"));
    }
}
