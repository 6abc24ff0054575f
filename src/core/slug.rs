// Slug normalization and the auto-rename probe used when a sibling already
// claims the requested slug.

use std::collections::HashSet;

/// Lowercase, URL-safe form of a requested slug. Whitespace becomes `-`,
/// anything outside `[a-z0-9_-]` is dropped, runs of `-` collapse.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for ch in raw.trim().chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
            last_dash = false;
        } else if ch == '-' || ch.is_whitespace() {
            if !last_dash && !out.is_empty() {
                out.push('-');
                last_dash = true;
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "page".to_string()
    } else {
        out
    }
}

/// First of `slug`, `slug-2`, `slug-3`, ... not present in `taken`.
/// Deterministic: the same inputs always produce the same rename.
pub fn probe_unique(slug: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(slug) {
        return slug.to_string();
    }
    let mut n: u64 = 2;
    loop {
        let candidate = format!("{}-{}", slug, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken(slugs: &[&str]) -> HashSet<String> {
        slugs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizes_to_url_safe() {
        assert_eq!(normalize("Hello World"), "hello-world");
        assert_eq!(normalize("  About Us!  "), "about-us");
        assert_eq!(normalize("a--b---c"), "a-b-c");
        assert_eq!(normalize("trailing-"), "trailing");
        assert_eq!(normalize("???"), "page");
    }

    #[test]
    fn probe_returns_original_when_free() {
        assert_eq!(probe_unique("about", &taken(&["home"])), "about");
    }

    #[test]
    fn probe_counts_up_deterministically() {
        assert_eq!(probe_unique("about", &taken(&["about"])), "about-2");
        assert_eq!(
            probe_unique("about", &taken(&["about", "about-2"])),
            "about-3"
        );
        assert_eq!(
            probe_unique("about", &taken(&["about", "about-2", "about-3"])),
            "about-4"
        );
    }
}
