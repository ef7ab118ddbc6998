//! Slugs, display names, and document ids.
//!
//! Author folders and content file names in the store are slugs:
//! lowercase ASCII with `_` separators and accents folded away
//! (`"Nguyễn Nhật Ánh"` → `"nguyen_nhat_anh"`).

use chrono::{DateTime, Utc};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold `text` into a store-safe slug.
///
/// NFD-decomposes, drops combining marks, lowercases, replaces every run of
/// non `[a-z0-9]` characters with a single `_`, and trims `_` at both ends.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// `"nguyen_nhat_anh"` → `"Nguyen Nhat Anh"`.
pub fn slug_to_name(slug: &str) -> String {
    slug.replace('_', " ")
        .split(' ')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"toi_thay_hoa_vang.html"` → `"Toi Thay Hoa Vang"`.
pub fn filename_to_title(filename: &str) -> String {
    slug_to_name(file_stem(filename))
}

/// File name without its last extension.
pub fn file_stem(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    }
}

/// `<authorSlug>_<titleSlug>_<millis>`.
pub fn document_id(author_slug: &str, title_slug: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}_{}", author_slug, title_slug, at.timestamp_millis())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slugify_folds_accents() {
        assert_eq!(slugify("Nguyễn Nhật Ánh"), "nguyen_nhat_anh");
        assert_eq!(slugify("Tôi thấy hoa vàng trên cỏ xanh"), "toi_thay_hoa_vang_tren_co_xanh");
    }

    #[test]
    fn test_slugify_collapses_and_trims_separators() {
        assert_eq!(slugify("  Hello,   World!! "), "hello_world");
        assert_eq!(slugify("a--b__c"), "a_b_c");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_display_names() {
        assert_eq!(slug_to_name("nguyen_nhat_anh"), "Nguyen Nhat Anh");
        assert_eq!(filename_to_title("toi_thay_hoa_vang.html"), "Toi Thay Hoa Vang");
        assert_eq!(filename_to_title("noext"), "Noext");
    }

    #[test]
    fn test_document_id() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(document_id("a", "b", at), "a_b_1700000000123");
    }
}
