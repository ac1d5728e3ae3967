//! Description builder: turns a source record and its authors into the
//! derived text stored on a cached record.
//!
//! The bibliographic description itself comes from a pluggable
//! [`DescriptionRenderer`]; everything else (author lists, slug, sort title,
//! search tokens) is derived here so all renderers agree on it.

use std::collections::BTreeSet;

use crate::catalog::{LinkedAuthor, RecordDetail, SourceRecord};
use crate::Error;

const SLUG_BUDGET: usize = 350;
const SLUG_TITLE_MAX: usize = 200;
const SLUG_SOURCE_MAX: usize = 100;
const SLUG_AUTHORS_MAX: usize = 50;

/// Renders the human-readable bibliographic description of a record.
///
/// Implementations must be deterministic: the same record and authors must
/// always produce the same text, or idempotent refreshes stop being free.
pub trait DescriptionRenderer: Send + Sync {
    fn render(&self, record: &SourceRecord, authors: &[LinkedAuthor]) -> Result<String, Error>;
}

/// Default renderer: authors, title, venue and year separated by periods.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderer;

impl DescriptionRenderer for PlainRenderer {
    fn render(&self, record: &SourceRecord, authors: &[LinkedAuthor]) -> Result<String, Error> {
        let names: Vec<&str> = authors.iter().map(|a| a.recorded_as.as_str()).collect();
        let venue = match &record.detail {
            RecordDetail::ContinuousPublication { .. } => record.source_name.clone(),
            RecordDetail::Patent { patent_number } => patent_number.as_ref().map(|n| format!("Patent {n}")),
            other => other.publisher().map(str::to_string),
        };

        let parts = [
            names.join(", "),
            record.fields.original_title.trim().to_string(),
            venue.unwrap_or_default(),
            record.fields.year.map(|y| y.to_string()).unwrap_or_default(),
        ];

        let mut text = String::new();
        for part in parts.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            if !text.is_empty() {
                text.push_str(if text.ends_with('.') { " " } else { ". " });
            }
            text.push_str(part);
        }
        if !text.is_empty() && !text.ends_with('.') {
            text.push('.');
        }
        Ok(tidy(&text))
    }
}

/// Text derived from a record and its authors.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub description: String,
    /// Canonical author names in list order.
    pub author_list: Vec<String>,
    /// Names as recorded on the links, comma separated.
    pub recorded_authors: String,
    pub author_count: i64,
    pub slug: String,
    pub search_index: String,
}

/// Build every derived text field of a cached record.
pub fn describe(
    renderer: &dyn DescriptionRenderer, record: &SourceRecord, authors: &[LinkedAuthor],
) -> Result<Description, Error> {
    let description = tidy(&renderer.render(record, authors)?);
    let author_list: Vec<String> = authors.iter().map(|a| a.canonical_name.clone()).collect();
    let recorded_authors = authors
        .iter()
        .map(|a| a.recorded_as.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Ok(Description {
        description,
        author_count: authors.len() as i64,
        slug: slug(record, authors),
        search_index: search_index(record, authors),
        author_list,
        recorded_authors,
    })
}

/// Clean up renderer output: single line, single spaces, no orphaned punctuation.
pub fn tidy(text: &str) -> String {
    let mut out = text.replace("\r\n", "").replace('\n', "");
    while out.contains("  ") {
        out = out.replace("  ", " ");
    }
    out.replace(" , ", ", ")
        .replace(" . ", ". ")
        .replace(". . ", ". ")
        .replace(". , ", ". ")
        .replace(" .", ".")
        .trim()
        .to_string()
}

/// Key used to order records by title.
pub fn sort_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = lowered.trim_start_matches(|c: char| !c.is_alphanumeric());
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, alphanumeric runs joined by single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// "Surname I" for the slug.
fn short_name(canonical: &str) -> String {
    match canonical.split_once(' ') {
        Some((surname, first_names)) => match first_names.trim().chars().next() {
            Some(initial) => format!("{surname} {initial}"),
            None => surname.to_string(),
        },
        None => canonical.to_string(),
    }
}

fn slug(record: &SourceRecord, authors: &[LinkedAuthor]) -> String {
    let title = slugify(&record.fields.original_title);
    let source = record.source_name.as_deref().map(slugify).unwrap_or_default();
    let first_three = authors
        .iter()
        .take(3)
        .map(|a| short_name(&a.canonical_name))
        .collect::<Vec<_>>()
        .join(" ");

    let (mut lt, mut la, mut ls) = (title.chars().count(), first_three.chars().count(), source.chars().count());
    if lt + la + ls >= SLUG_BUDGET {
        lt = lt.min(SLUG_TITLE_MAX);
        if lt + la + ls >= SLUG_BUDGET {
            ls = ls.min(SLUG_SOURCE_MAX);
            if lt + la + ls >= SLUG_BUDGET {
                la = la.min(SLUG_AUTHORS_MAX);
            }
        }
    }

    let id = record.key.id.to_string();
    let joined = [
        truncate(&title, lt),
        truncate(&source, ls),
        truncate(&first_three, la),
        record.key.kind.as_str(),
        id.as_str(),
    ]
    .join("-");
    slugify(&joined)
}

fn search_index(record: &SourceRecord, authors: &[LinkedAuthor]) -> String {
    let mut text = vec![record.fields.original_title.as_str()];
    text.extend(record.fields.title.as_deref());
    text.extend(record.source_name.as_deref());
    for author in authors {
        text.push(&author.canonical_name);
        text.push(&author.recorded_as);
    }

    let tokens: BTreeSet<String> = text
        .iter()
        .flat_map(|t| t.split(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    tokens.into_iter().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RecordFields;
    use crate::key::RecordKey;

    fn record(title: &str, detail: RecordDetail, source_name: Option<&str>) -> SourceRecord {
        SourceRecord {
            key: RecordKey::new(detail.kind(), 7),
            fields: RecordFields { year: Some(2020), ..RecordFields::titled(title) },
            detail,
            modified_at: "2020-01-01T00:00:00+00:00".into(),
            formal_type: None,
            language: None,
            source_name: source_name.map(str::to_string),
        }
    }

    fn author(canonical: &str, recorded: &str, ordinal: i64) -> LinkedAuthor {
        LinkedAuthor {
            author_id: ordinal + 1,
            canonical_name: canonical.into(),
            recorded_as: recorded.into(),
            unit_id: Some(1),
            responsibility: Some("aut.".into()),
            ordinal,
            affiliated: true,
        }
    }

    #[test]
    fn test_plain_description() {
        let rec = record("Foo", RecordDetail::ContinuousPublication { source_id: Some(1) }, Some("Journal X"));
        let authors = vec![author("Kowalski Jan", "Kowalski J.", 0), author("Nowak Anna", "Nowak A.", 1)];
        let description = describe(&PlainRenderer, &rec, &authors).unwrap();

        assert_eq!(description.description, "Kowalski J., Nowak A. Foo. Journal X. 2020.");
        assert_eq!(description.author_list, vec!["Kowalski Jan", "Nowak Anna"]);
        assert_eq!(description.recorded_authors, "Kowalski J., Nowak A.");
        assert_eq!(description.author_count, 2);
    }

    #[test]
    fn test_patent_venue() {
        let rec = record("Gadget", RecordDetail::Patent { patent_number: Some("PL-1".into()) }, None);
        let description = describe(&PlainRenderer, &rec, &[]).unwrap();
        assert_eq!(description.description, "Gadget. Patent PL-1. 2020.");
        assert!(description.author_list.is_empty());
    }

    #[test]
    fn test_tidy() {
        assert_eq!(tidy("A  , B\n. C"), "A, B. C");
        assert_eq!(tidy("X . . Y"), "X. Y");
        assert_eq!(tidy("end ."), "end.");
    }

    #[test]
    fn test_sort_title() {
        assert_eq!(sort_title("  \"The  Big\tBook\""), "the big book\"");
        assert_eq!(sort_title("Zebra"), "zebra");
    }

    #[test]
    fn test_slug_contains_title_source_and_authors() {
        let rec = record("Über Dinge!", RecordDetail::ContinuousPublication { source_id: Some(1) }, Some("Journal X"));
        let slug = describe(&PlainRenderer, &rec, &[author("Kowalski Jan", "Kowalski J.", 0)]).unwrap().slug;
        assert_eq!(slug, "über-dinge-journal-x-kowalski-j-continuous-publication-7");
    }

    #[test]
    fn test_slug_truncates_long_titles() {
        let title = "word ".repeat(100);
        let rec = record(&title, RecordDetail::BoundPublication { publisher: None, isbn: None }, None);
        let slug = describe(&PlainRenderer, &rec, &[]).unwrap().slug;
        assert!(slug.chars().count() <= SLUG_TITLE_MAX + 30);
        assert!(slug.ends_with("bound-publication-7"));
    }

    #[test]
    fn test_search_index_tokens() {
        let rec = record("Foo bar", RecordDetail::ContinuousPublication { source_id: Some(1) }, Some("Journal X"));
        let description = describe(&PlainRenderer, &rec, &[author("Kowalski Jan", "Kowalski J.", 0)]).unwrap();
        assert_eq!(description.search_index, "bar foo j jan journal kowalski x");
    }

    #[test]
    fn test_render_is_deterministic() {
        let rec = record("Foo", RecordDetail::Patent { patent_number: None }, None);
        let authors = vec![author("Kowalski Jan", "Kowalski J.", 0)];
        assert_eq!(
            describe(&PlainRenderer, &rec, &authors).unwrap(),
            describe(&PlainRenderer, &rec, &authors).unwrap()
        );
    }

    #[test]
    fn test_render_errors_propagate() {
        struct Failing;
        impl DescriptionRenderer for Failing {
            fn render(&self, record: &SourceRecord, _: &[LinkedAuthor]) -> Result<String, Error> {
                Err(Error::RenderFailed(record.key.to_string()))
            }
        }

        let rec = record("Foo", RecordDetail::Patent { patent_number: None }, None);
        assert!(matches!(describe(&Failing, &rec, &[]), Err(Error::RenderFailed(_))));
    }
}
