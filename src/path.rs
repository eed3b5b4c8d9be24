//! Path normalization shared by request paths and archive entry names.
//!
//! Paths inside the filesystem are relative, forward-slash separated and
//! clean: no empty segments, no `.` segments, no `..` segments. The root is
//! the empty string.

/// Clean `path` lexically.
///
/// Repeated separators and `.` segments are dropped, `..` removes the
/// preceding segment and a leading or trailing `/` is ignored. Returns `None`
/// when the path climbs above the root. For request paths the host
/// separator is accepted as well, so `a\b` means `a/b` on Windows.
///
/// ```
/// assert_eq!(zipfs::path::clean("a//b/./c/").as_deref(), Some("a/b/c"));
/// assert_eq!(zipfs::path::clean("/").as_deref(), Some(""));
/// assert_eq!(zipfs::path::clean("../etc/passwd"), None);
/// ```
pub fn clean(path: &str) -> Option<String> {
    normalize(&to_slash(path))
}

/// Clean an archive entry name.
///
/// Entry names always use `/`, whatever system wrote the archive, so unlike
/// [`clean`] the host separator is not translated and a `\` stays part of
/// the name.
///
/// ```
/// assert_eq!(zipfs::path::clean_entry("./a//b\\c.txt").as_deref(), Some("a/b\\c.txt"));
/// ```
pub fn clean_entry(name: &str) -> Option<String> {
    normalize(name)
}

fn normalize(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            _ => segments.push(segment),
        }
    }

    Some(segments.join("/"))
}

/// Final segment of a clean path, `.` for the root.
pub fn base_name(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((_, name)) => name,
        None if path.is_empty() => ".",
        None => path,
    }
}

/// Join a clean directory path and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Every proper ancestor directory of a clean path, root first.
///
/// `a/b/c` yields `""`, `a`, `a/b`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once("").chain(
        path.match_indices('/')
            .map(move |(index, _)| &path[..index]),
    )
}

fn to_slash(path: &str) -> std::borrow::Cow<'_, str> {
    if std::path::MAIN_SEPARATOR == '/' {
        path.into()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/").into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_collapses_separators() {
        assert_eq!(clean("a//b.txt").as_deref(), Some("a/b.txt"));
        assert_eq!(clean("./a/./b/").as_deref(), Some("a/b"));
        assert_eq!(clean("/a/b").as_deref(), Some("a/b"));
        assert_eq!(clean("a/c/../b").as_deref(), Some("a/b"));
    }

    #[test]
    fn test_clean_root_forms() {
        assert_eq!(clean("").as_deref(), Some(""));
        assert_eq!(clean(".").as_deref(), Some(""));
        assert_eq!(clean("//").as_deref(), Some(""));
        assert_eq!(clean("a/..").as_deref(), Some(""));
    }

    #[test]
    fn test_clean_rejects_escape() {
        assert_eq!(clean(".."), None);
        assert_eq!(clean("a/../../b"), None);
    }

    #[test]
    fn test_clean_entry_keeps_backslash() {
        assert_eq!(clean_entry("win\\path.txt").as_deref(), Some("win\\path.txt"));
        assert_eq!(clean_entry("/a//b/./c/").as_deref(), Some("a/b/c"));
        assert_eq!(clean_entry("../x"), None);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a/c/d.txt"), "d.txt");
        assert_eq!(base_name("a"), "a");
        assert_eq!(base_name(""), ".");
    }

    #[test]
    fn test_ancestors() {
        let all: Vec<&str> = ancestors("a/b/c.txt").collect();
        assert_eq!(all, vec!["", "a", "a/b"]);

        let top: Vec<&str> = ancestors("c.txt").collect();
        assert_eq!(top, vec![""]);
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a/b", "c"), "a/b/c");
    }
}
