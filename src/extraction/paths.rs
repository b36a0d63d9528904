use std::path::{Path, PathBuf};

/// Resolve an archive entry name against `dest_path`, refusing anything that
/// would land outside it.
///
/// Entry names are treated as untrusted: backslashes count as separators,
/// absolute paths and drive prefixes are refused, and any `..` segment is
/// refused outright rather than normalized away. Returns `None` for a
/// refused name.
pub(crate) fn contained_entry_path(dest_path: &Path, entry_name: &str) -> Option<PathBuf> {
    if entry_name.is_empty() || entry_name.contains('\0') {
        return None;
    }

    let normalized = entry_name.replace('\\', "/");
    if normalized.starts_with('/') {
        return None;
    }
    let bytes = normalized.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return None;
    }

    let mut resolved = dest_path.to_path_buf();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            name => resolved.push(name),
        }
    }

    resolved.starts_with(dest_path).then_some(resolved)
}
