use std::sync::LazyLock;

use regex::Regex;

/// Longest slug accepted by the `businesses.slug` column.
pub const MAX_SLUG_LEN: usize = 100;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("invalid slug regex"));

/// Lowercases `name`, collapses every run of characters outside `[a-z0-9]`
/// into a single `-` and trims leading/trailing dashes.
pub fn generate_slug(name: &str) -> String {
    let lowered = name.to_lowercase();
    let dashed = NON_ALPHANUMERIC.replace_all(&lowered, "-");
    dashed
        .trim_matches('-')
        .chars()
        .take(MAX_SLUG_LEN)
        .collect()
}
