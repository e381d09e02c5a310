//! Resolution of user supplied paths to absolute, lexically clean paths.
//!
//! Paths in the include and ignore specifications may be relative to the
//! working directory, start with `~`, or reference environment variables
//! (`$HOME/.cache`, `${GRADLE_USER_HOME}/caches`). Resolution never touches
//! the filesystem: symlinks are kept as written so they can be archived as
//! links rather than followed.

use std::path::{Component, Path, PathBuf};

use directories::BaseDirs;

/// Expand a leading `~` and every `$VAR` / `${VAR}` reference.
///
/// Unset variables expand to the empty string. `~user` forms are left alone.
#[must_use]
pub fn expand_vars(raw: &str) -> String {
    let with_home = expand_home(raw);
    expand_env(&with_home)
}

fn expand_home(raw: &str) -> String {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return raw.to_string(),
    };

    match BaseDirs::new() {
        Some(dirs) => format!("{}{}", dirs.home_dir().display(), rest),
        None => {
            log::warn!("Could not determine home directory, leaving '{}' as is", raw);
            raw.to_string()
        }
    }
}

fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices();

    while let Some((idx, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let rest = &raw[idx + 1..];
        if let Some(braced) = rest.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                // skip `{name}`
                for _ in 0..name.chars().count() + 2 {
                    chars.next();
                }
                continue;
            }
            out.push(c);
            continue;
        }

        let name_len = rest
            .char_indices()
            .take_while(|(_, ch)| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if name_len == 0 {
            out.push(c);
            continue;
        }
        out.push_str(&std::env::var(&rest[..name_len]).unwrap_or_default());
        for _ in 0..name_len {
            chars.next();
        }
    }

    out
}

/// Lexically clean a path: drop `.` components and fold `..` into its parent.
///
/// `..` at the root stays at the root, matching what the shell would resolve.
#[must_use]
pub fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = matches!(
                    cleaned.components().next_back(),
                    None | Some(Component::RootDir | Component::Prefix(_) | Component::ParentDir)
                );
                if !at_root {
                    cleaned.pop();
                } else if !cleaned.has_root() {
                    // relative paths keep leading `..`
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// Resolve `raw` against `base` after variable expansion.
#[must_use]
pub fn absolute_from(raw: &str, base: &Path) -> PathBuf {
    let expanded = PathBuf::from(expand_vars(raw));
    if expanded.is_absolute() {
        clean(&expanded)
    } else {
        clean(&base.join(expanded))
    }
}
