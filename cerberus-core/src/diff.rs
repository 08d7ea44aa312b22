//! Unified diff helpers for inline review comments
//!
//! GitHub's PR review API anchors inline comments by `position`, a
//! 1-indexed line offset within a file's diff patch (the `patch` field of
//! `pulls/{pr}/files`). This maps new-file absolute line numbers onto those
//! positions.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static HUNK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header pattern")
});

/// Map new-file line numbers to 1-indexed patch positions
///
/// Only lines present in the patch (context and additions) are mapped;
/// deletions do not advance the new-file line counter.
pub fn newline_to_position(patch: &str) -> HashMap<u64, u64> {
    let mut mapping = HashMap::new();
    let mut new_line: Option<u64> = None;

    for (index, raw) in patch.lines().enumerate() {
        let position = (index + 1) as u64;

        if let Some(captures) = HUNK_RE.captures(raw) {
            new_line = captures.get(3).and_then(|m| m.as_str().parse().ok());
            continue;
        }

        let Some(line) = new_line else {
            continue;
        };
        let Some(prefix) = raw.chars().next() else {
            continue;
        };

        match prefix {
            // "\ No newline at end of file"
            '\\' => {}
            ' ' | '+' => {
                mapping.insert(line, position);
                new_line = Some(line + 1);
            }
            '-' => {}
            _ => {}
        }
    }

    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = "@@ -1,4 +1,5 @@\n context one\n-removed\n+added a\n+added b\n context two";

    #[test]
    fn test_maps_context_and_additions() {
        let mapping = newline_to_position(PATCH);
        // new line 1 = "context one" at position 2.
        assert_eq!(mapping.get(&1), Some(&2));
        // new line 2 = "added a" at position 4 (after the deletion).
        assert_eq!(mapping.get(&2), Some(&4));
        assert_eq!(mapping.get(&3), Some(&5));
        assert_eq!(mapping.get(&4), Some(&6));
    }

    #[test]
    fn test_deletions_not_mapped() {
        let mapping = newline_to_position(PATCH);
        assert_eq!(mapping.len(), 4);
    }

    #[test]
    fn test_multiple_hunks() {
        let patch = "@@ -1,1 +1,1 @@\n+first\n@@ -10,1 +10,2 @@\n context\n+second";
        let mapping = newline_to_position(patch);
        assert_eq!(mapping.get(&1), Some(&2));
        assert_eq!(mapping.get(&10), Some(&4));
        assert_eq!(mapping.get(&11), Some(&5));
    }

    #[test]
    fn test_empty_patch() {
        assert!(newline_to_position("").is_empty());
    }

    #[test]
    fn test_no_newline_marker_ignored() {
        let patch = "@@ -1,1 +1,1 @@\n+only\n\\ No newline at end of file";
        let mapping = newline_to_position(patch);
        assert_eq!(mapping.get(&1), Some(&2));
        assert_eq!(mapping.len(), 1);
    }
}
