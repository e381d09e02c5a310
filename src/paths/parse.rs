//! Parsing of the raw include and ignore specifications.
//!
//! Both specifications are newline separated lists:
//!
//! ```text
//! # include: path to cache, optionally followed by an indicator file
//! ./node_modules -> ./package-lock.json
//! ~/.gradle/caches
//!
//! # ignore: `pattern` skips change tracking, `!pattern` drops from the cache
//! *.lock
//! !~/.gradle/caches/*.tmp
//! ```

use std::collections::BTreeMap;

/// Separator between the path to cache and its indicator file.
pub const INDICATOR_SEPARATOR: &str = "->";

/// Split one include line into the path to cache and its optional indicator.
///
/// Whitespace around both halves is trimmed. An indicator that is empty after
/// trimming is reported as `None`, same as a line without a separator.
#[must_use]
pub fn parse_include_item(item: &str) -> (String, Option<String>) {
    let mut parts = item.split(INDICATOR_SEPARATOR);
    let path = parts.next().unwrap_or_default().trim().to_string();
    let indicator = parts
        .next()
        .map(str::trim)
        .filter(|indicator| !indicator.is_empty())
        .map(str::to_string);
    (path, indicator)
}

/// Split one ignore line into its pattern and exclude flag.
///
/// A leading `!` marks the pattern as "exclude from the cache"; without it the
/// matching paths are cached but never invalidate it.
#[must_use]
pub fn parse_ignore_item(item: &str) -> (String, bool) {
    let item = item.trim();
    match item.strip_prefix('!') {
        Some(rest) if !rest.is_empty() => (rest.trim().to_string(), true),
        Some(_) => (String::new(), false),
        None => (item.to_string(), false),
    }
}

/// Parse the include specification into `path -> indicator` pairs.
///
/// Empty lines are skipped. When a path is listed twice the later line wins.
#[must_use]
pub fn parse_include_list(spec: &str) -> BTreeMap<String, Option<String>> {
    let mut indicator_by_path = BTreeMap::new();
    for line in spec.lines() {
        let (path, indicator) = parse_include_item(line);
        if path.is_empty() {
            continue;
        }
        indicator_by_path.insert(path, indicator);
    }
    indicator_by_path
}

/// Parse the ignore specification into `pattern -> exclude` pairs.
///
/// If a pattern appears both with and without the leading `!`, the exclude
/// form wins regardless of line order.
#[must_use]
pub fn parse_ignore_list(spec: &str) -> BTreeMap<String, bool> {
    let mut exclude_by_pattern: BTreeMap<String, bool> = BTreeMap::new();
    for line in spec.lines() {
        let (pattern, exclude) = parse_ignore_item(line);
        if pattern.is_empty() {
            continue;
        }
        let entry = exclude_by_pattern.entry(pattern).or_insert(exclude);
        *entry |= exclude;
    }
    exclude_by_pattern
}
