// ABOUTME: Filesystem naming helpers shared by the JSONL and snapshot backends.
// ABOUTME: Escapes opaque identifiers into path-safe names and fsyncs rename metadata.

use std::fs::File;
use std::path::Path;

/// Map an opaque identifier to a filesystem-safe name. ASCII alphanumerics,
/// `-`, `_`, and `.` pass through; every other byte becomes `%XX`, so
/// distinct identifiers never collide on disk. The dot-only names `.` and
/// `..` are escaped in full; they would otherwise resolve as directory
/// navigation.
pub(crate) fn fs_name(raw: &str) -> String {
    if raw == "." || raw == ".." {
        return raw.bytes().map(|byte| format!("%{byte:02X}")).collect();
    }

    let mut name = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                name.push(byte as char);
            }
            other => name.push_str(&format!("%{other:02X}")),
        }
    }
    name
}

/// Fsync the parent directory so a completed rename survives a crash.
/// Best-effort: the rename itself has already landed and the data is
/// consistent either way.
pub(crate) fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_pass_through() {
        assert_eq!(fs_name("EventityTodo"), "EventityTodo");
        assert_eq!(fs_name("todo-list_1.v2"), "todo-list_1.v2");
    }

    #[test]
    fn unsafe_bytes_are_escaped() {
        assert_eq!(fs_name("a/b"), "a%2Fb");
        assert_eq!(fs_name("a b"), "a%20b");
    }

    #[test]
    fn dot_only_names_cannot_navigate() {
        assert_eq!(fs_name("."), "%2E");
        assert_eq!(fs_name(".."), "%2E%2E");
    }

    #[test]
    fn distinct_identifiers_stay_distinct() {
        assert_ne!(fs_name("a/b"), fs_name("a_b"));
        assert_ne!(fs_name("a/b"), fs_name("a%2Fb"));
    }
}
