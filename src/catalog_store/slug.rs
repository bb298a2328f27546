use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Maximum length of a catalog slug.
pub const MAX_SLUG_LEN: usize = 50;

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_\s-]").expect("valid slug regex"))
}

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-\s]+").expect("valid slug regex"))
}

/// Derives the catalog slug of a display name.
///
/// Accents are folded to ASCII through NFKD decomposition; characters with no
/// ASCII decomposition are dropped, so the result can be empty.
pub fn slugify(name: &str) -> String {
    let folded: String = name.nfkd().filter(char::is_ascii).collect();
    let lower = folded.to_lowercase();
    let cleaned = disallowed_chars().replace_all(&lower, "");
    let dashed = separators().replace_all(&cleaned, "-");
    dashed
        .trim_matches(|c| c == '-' || c == '_')
        .chars()
        .take(MAX_SLUG_LEN)
        .collect()
}

/// Slug for a game whose name has no usable slug, built from its Steam id.
pub fn external_id_slug(external_id: &str) -> String {
    format!("steam-{}", slugify(external_id))
        .chars()
        .take(MAX_SLUG_LEN)
        .collect()
}
