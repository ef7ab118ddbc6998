//! Metadata header embedded in content blobs.
//!
//! Uploaded documents carry their catalog metadata in an HTML comment at
//! the top of the file, so a blob found without a catalog entry still has a
//! title and author:
//!
//! ```text
//! <!--
//! BOOK_METADATA_START
//! Title: Tôi thấy hoa vàng trên cỏ xanh
//! Author: Nguyễn Nhật Ánh
//! Description: ...
//! PublishedDate: 2010
//! CreatedAt: 2024-03-01T12:00:00.000Z
//! BOOK_METADATA_END
//! -->
//! ```
//!
//! Keys are matched case-insensitively. Unknown keys are kept in
//! [`BookMetadata::extra`] under their lowercased name.

use std::collections::BTreeMap;

pub const METADATA_START: &str = "BOOK_METADATA_START";
pub const METADATA_END: &str = "BOOK_METADATA_END";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub published_date: Option<String>,
    pub created_at: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl BookMetadata {
    fn set(&mut self, key: &str, value: String) {
        match key {
            "title" => self.title = Some(value),
            "author" => self.author = Some(value),
            "description" => self.description = Some(value),
            "publisheddate" => self.published_date = Some(value),
            "createdat" => self.created_at = Some(value),
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }
}

/// Byte range of the whole comment and of the block's inner text.
struct Block {
    start: usize,
    end: usize,
    inner_start: usize,
    inner_end: usize,
}

fn find_block(content: &str) -> Option<Block> {
    for (marker, _) in content.match_indices(METADATA_START) {
        let before = content[..marker].trim_end();
        if !before.ends_with("<!--") {
            continue;
        }
        let inner_start = marker + METADATA_START.len();
        let inner_end = inner_start + content[inner_start..].find(METADATA_END)?;
        let after_marker = inner_end + METADATA_END.len();
        let rest = &content[after_marker..];
        let trimmed = rest.trim_start();
        if !trimmed.starts_with("-->") {
            return None;
        }
        let end = after_marker + (rest.len() - trimmed.len()) + "-->".len();
        return Some(Block {
            start: before.len() - "<!--".len(),
            end,
            inner_start,
            inner_end,
        });
    }
    None
}

/// Parse the metadata block, if the content has one.
pub fn extract_metadata(content: &str) -> Option<BookMetadata> {
    let block = find_block(content)?;
    let mut meta = BookMetadata::default();
    for line in content[block.inner_start..block.inner_end].lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty()
            || value.is_empty()
            || !key.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            continue;
        }
        meta.set(&key.to_lowercase(), value.to_string());
    }
    Some(meta)
}

/// Content with the metadata block removed.
pub fn strip_metadata(content: &str) -> String {
    match find_block(content) {
        Some(block) => {
            let rest = content[block.end..].trim_start_matches(['\r', '\n']);
            format!("{}{}", &content[..block.start], rest)
        }
        None => content.to_string(),
    }
}

/// Render a metadata block. Absent fields are omitted.
pub fn render_metadata_block(meta: &BookMetadata) -> String {
    let mut out = String::from("<!--\n");
    out.push_str(METADATA_START);
    out.push('\n');

    let fields = [
        ("Title", &meta.title),
        ("Author", &meta.author),
        ("Description", &meta.description),
        ("PublishedDate", &meta.published_date),
        ("CreatedAt", &meta.created_at),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            out.push_str(&format!("{}: {}\n", key, single_line(value)));
        }
    }
    for (key, value) in &meta.extra {
        out.push_str(&format!("{}: {}\n", key, single_line(value)));
    }

    out.push_str(METADATA_END);
    out.push_str("\n-->\n");
    out
}

/// Replace any existing block in `content` with one rendered from `meta`.
pub fn with_metadata(meta: &BookMetadata, content: &str) -> String {
    format!("{}{}", render_metadata_block(meta), strip_metadata(content))
}

fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<!--\nBOOK_METADATA_START\nTitle: Tôi thấy hoa vàng\nauthor: Nguyễn Nhật Ánh\nPUBLISHEDDATE: 2010\nNote: first print\nBOOK_METADATA_END\n-->\n<h1>Chương 1</h1>";

    #[test]
    fn test_extract_is_case_insensitive() {
        let meta = extract_metadata(SAMPLE).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Tôi thấy hoa vàng"));
        assert_eq!(meta.author.as_deref(), Some("Nguyễn Nhật Ánh"));
        assert_eq!(meta.published_date.as_deref(), Some("2010"));
        assert_eq!(meta.extra.get("note").map(String::as_str), Some("first print"));
        assert!(meta.description.is_none());
    }

    #[test]
    fn test_strip_leaves_body() {
        assert_eq!(strip_metadata(SAMPLE), "<h1>Chương 1</h1>");
        assert_eq!(strip_metadata("<p>plain</p>"), "<p>plain</p>");
    }

    #[test]
    fn test_value_may_contain_colons() {
        let content = "<!-- BOOK_METADATA_START\nCreatedAt: 2024-03-01T12:00:00.000Z\nBOOK_METADATA_END -->";
        let meta = extract_metadata(content).unwrap();
        assert_eq!(meta.created_at.as_deref(), Some("2024-03-01T12:00:00.000Z"));
    }

    #[test]
    fn test_missing_or_unterminated_block() {
        assert!(extract_metadata("<p>none</p>").is_none());
        assert!(extract_metadata("<!--\nBOOK_METADATA_START\nTitle: x\n").is_none());
        // marker outside a comment is not a block
        assert!(extract_metadata("BOOK_METADATA_START Title: x BOOK_METADATA_END").is_none());
    }

    #[test]
    fn test_render_then_extract() {
        let meta = BookMetadata {
            title: Some("A\nB".to_string()),
            author: Some("C".to_string()),
            ..Default::default()
        };
        let content = with_metadata(&meta, SAMPLE);
        let parsed = extract_metadata(&content).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("A B"));
        assert_eq!(parsed.author.as_deref(), Some("C"));
        assert!(parsed.published_date.is_none());
        assert!(content.ends_with("<h1>Chương 1</h1>"));
        assert_eq!(content.matches(METADATA_START).count(), 1);
    }
}
