use std::collections::HashMap;

const DEFAULT_SLUG: &str = "section";

/// Convert heading text into a URL-safe anchor.
///
/// Keeps ASCII letters and digits, CJK ideographs, whitespace and hyphens
/// (everything else, underscores included, is dropped), then collapses
/// separator runs into a single `-`.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();

    let mut slug = String::with_capacity(lowered.len());
    let mut pending_separator = false;
    for c in lowered.chars() {
        if c.is_whitespace() || c == '-' {
            pending_separator = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || is_cjk_ideograph(c) {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        }
    }

    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug
    }
}

pub(crate) fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Hands out unique slugs within a single document render.
///
/// The first heading with a given base slug keeps it; later ones get `-1`,
/// `-2`, ... in document order.
#[derive(Debug, Default)]
pub struct SlugAllocator {
    seen: HashMap<String, usize>,
}

impl SlugAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, text: &str) -> String {
        let base = slugify(text);
        let count = self.seen.entry(base.clone()).or_insert(0);
        let slug = if *count == 0 {
            base
        } else {
            format!("{base}-{count}")
        };
        *count += 1;
        slug
    }
}
