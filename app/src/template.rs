//! Destination filename/path templates (spec.md §4.3).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateMode {
    /// Filename only; any `/` produced by the template is not a directory
    /// separator.
    Rename,
    /// `/` in the template (outside a token's substituted value) creates
    /// subdirectories.
    Organize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Author,
    Title,
    Year,
    Series,
    SeriesPosition,
    Subtitle,
    PartNumber,
}

impl Token {
    fn parse(name: &str) -> Option<Token> {
        match name {
            "Author" => Some(Token::Author),
            "Title" => Some(Token::Title),
            "Year" => Some(Token::Year),
            "Series" => Some(Token::Series),
            "SeriesPosition" => Some(Token::SeriesPosition),
            "Subtitle" => Some(Token::Subtitle),
            "PartNumber" => Some(Token::PartNumber),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Token::Author => "Author",
            Token::Title => "Title",
            Token::Year => "Year",
            Token::Series => "Series",
            Token::SeriesPosition => "SeriesPosition",
            Token::Subtitle => "Subtitle",
            Token::PartNumber => "PartNumber",
        }
    }
}

#[derive(Debug, Clone)]
enum GroupPart {
    Literal(String),
    Token(Token),
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Group(Vec<GroupPart>),
}

/// Split a template into literal runs and `{…}` conditional groups. Inside a
/// group, runs of characters matching a known token name become `Token`
/// parts; everything else in the group is `Literal`. Malformed input (an
/// unterminated `{`) is treated as literal text from that point on.
fn parse_template(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let after_open = &rest[open + 1..];
        match after_open.find('}') {
            Some(close) => {
                let body = &after_open[..close];
                segments.push(Segment::Group(parse_group_body(body)));
                rest = &after_open[close + 1..];
            }
            None => {
                segments.push(Segment::Literal(rest[open..].to_string()));
                rest = "";
                break;
            }
        }
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    segments
}

fn parse_group_body(body: &str) -> Vec<GroupPart> {
    const TOKEN_NAMES: &[&str] = &[
        "Author",
        "Title",
        "Year",
        "Series",
        "SeriesPosition",
        "Subtitle",
        "PartNumber",
    ];

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = body.char_indices().peekable();

    while let Some((i, c)) = chars.peek().copied() {
        let remaining = &body[i..];
        let matched = TOKEN_NAMES
            .iter()
            .find(|name| remaining.starts_with(*name))
            .copied();

        if let Some(name) = matched {
            if !literal.is_empty() {
                parts.push(GroupPart::Literal(std::mem::take(&mut literal)));
            }
            parts.push(GroupPart::Token(Token::parse(name).unwrap()));
            for _ in 0..name.len() {
                chars.next();
            }
        } else {
            literal.push(c);
            chars.next();
        }
    }
    if !literal.is_empty() {
        parts.push(GroupPart::Literal(literal));
    }
    parts
}

fn sanitize_value(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '-' } else { c })
        .collect();
    replaced.trim_matches(|c: char| c.is_whitespace() || c == '.').to_string()
}

fn render_group(parts: &[GroupPart], metadata: &BTreeMap<String, String>) -> Option<String> {
    let mut out = String::new();
    let mut all_non_empty = true;

    for part in parts {
        match part {
            GroupPart::Literal(text) => out.push_str(text),
            GroupPart::Token(token) => {
                let raw = metadata.get(token.key()).map(String::as_str).unwrap_or("");
                if raw.is_empty() {
                    all_non_empty = false;
                }
                out.push_str(&sanitize_value(raw));
            }
        }
    }

    if all_non_empty {
        Some(out)
    } else {
        None
    }
}

/// Expand `template` against `metadata`, eliding conditional groups whose
/// tokens resolve empty (spec.md §4.3).
fn render(template: &str, metadata: &BTreeMap<String, String>) -> String {
    let mut rendered = String::new();
    for segment in parse_template(template) {
        match segment {
            Segment::Literal(text) => rendered.push_str(&text),
            Segment::Group(parts) => {
                if let Some(text) = render_group(&parts, metadata) {
                    rendered.push_str(&text);
                }
            }
        }
    }
    rendered
}

/// Render `template` under `mode` into a relative path (no extension). In
/// `Rename` mode the whole expansion is one path component: `/` characters
/// carried by literal template text are not directory separators, so they
/// get the same illegal-character substitution as token values. In
/// `Organize` mode, `/` from literal template text splits the result into
/// subdirectories (slashes already inside token values were substituted
/// away during rendering, so only template-authored separators survive).
pub fn render_path(template: &str, mode: TemplateMode, metadata: &BTreeMap<String, String>) -> PathBuf {
    let rendered = render(template, metadata);

    match mode {
        TemplateMode::Rename => PathBuf::from(sanitize_value(&rendered)),
        TemplateMode::Organize => {
            let mut path = PathBuf::new();
            for component in rendered.split('/') {
                let trimmed = component.trim_matches(|c: char| c.is_whitespace() || c == '.');
                if !trimmed.is_empty() {
                    path.push(trimmed);
                }
            }
            path
        }
    }
}

/// Append `extension` (without a leading dot) to a rendered path's final
/// component (spec.md §4.3, "extension is appended after template
/// expansion from the source file's extension").
pub fn with_extension(path: &Path, extension: &str) -> PathBuf {
    if extension.is_empty() {
        return path.to_path_buf();
    }
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
    path.with_file_name(format!("{file_name}.{extension}"))
}

/// Sequential 1-based part numbers in natural scan order, zero-padded to
/// two digits. A single-file set gets `None` for every entry so
/// `PartNumber` resolves empty and its conditional group is elided.
pub fn assign_part_numbers(count: usize) -> Vec<Option<String>> {
    if count <= 1 {
        return vec![None; count];
    }
    (1..=count).map(|n| Some(format!("{n:02}"))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn simple_tokens_round_trip() {
        let md = metadata(&[("Author", "A"), ("Title", "B")]);
        let path = render_path("{Author}/{Title}", TemplateMode::Organize, &md);
        assert_eq!(path, PathBuf::from("A/B"));
    }

    #[test]
    fn conditional_group_elided_when_token_empty() {
        let md = metadata(&[("Author", "Tester"), ("Title", "Book")]);
        let path = render_path(
            "{Author} - {Title}{ - Part PartNumber}",
            TemplateMode::Rename,
            &md,
        );
        assert_eq!(path, PathBuf::from("Tester - Book"));
    }

    #[test]
    fn conditional_group_expands_when_token_present() {
        let md = metadata(&[
            ("Author", "Tester"),
            ("Title", "Book"),
            ("PartNumber", "01"),
        ]);
        let path = render_path(
            "{Author} - {Title}{ - Part PartNumber}",
            TemplateMode::Rename,
            &md,
        );
        assert_eq!(path, PathBuf::from("Tester - Book - Part 01"));
    }

    #[test]
    fn series_prefix_group_elides_cleanly() {
        let md = metadata(&[("Author", "A"), ("Title", "B")]);
        let path = render_path("{Author}/{Series/}{Title}", TemplateMode::Organize, &md);
        assert_eq!(path, PathBuf::from("A/B"));

        let md = metadata(&[("Author", "A"), ("Title", "B"), ("Series", "Stormlight")]);
        let path = render_path("{Author}/{Series/}{Title}", TemplateMode::Organize, &md);
        assert_eq!(path, PathBuf::from("A/Stormlight/B"));
    }

    #[test]
    fn token_slashes_never_create_directories() {
        let md = metadata(&[("Author", "A/B"), ("Title", "C")]);
        let path = render_path("{Author}/{Title}", TemplateMode::Organize, &md);
        assert_eq!(path, PathBuf::from("A-B/C"));
    }

    #[test]
    fn part_numbers_are_zero_padded_and_sequential() {
        assert_eq!(assign_part_numbers(1), vec![None]);
        assert_eq!(
            assign_part_numbers(2),
            vec![Some("01".to_string()), Some("02".to_string())]
        );
    }

    #[test]
    fn with_extension_appends_after_expansion() {
        let path = PathBuf::from("A/B");
        assert_eq!(with_extension(&path, "epub"), PathBuf::from("A/B.epub"));
    }
}
