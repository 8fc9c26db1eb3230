//! Content fingerprinting and unified diff generation.
//!
//! Fingerprints are hex SHA-256 digests used for cheap equality checks; the
//! line-oriented diff is only computed once fingerprints disagree.

use sha2::{Digest, Sha256};

const CONTEXT: usize = 3;

/// Hex SHA-256 digest of the raw content bytes.
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct DiffOp {
    tag: Tag,
    old_index: usize,
    new_index: usize,
}

/// Unified diff between two contents, with `--- {label} (previous)` and
/// `+++ {label} (current)` headers and standard `@@` hunk markers.
///
/// Returns `None` when the line sequences are identical (the contents may
/// still differ in ways invisible to a line diff, e.g. a trailing newline).
pub fn unified_diff(previous: &str, current: &str, label: &str) -> Option<String> {
    let old: Vec<&str> = previous.lines().collect();
    let new: Vec<&str> = current.lines().collect();

    let ops = diff_ops(&old, &new);
    if ops.iter().all(|op| op.tag == Tag::Equal) {
        return None;
    }

    let mut out = String::new();
    out.push_str(&format!("--- {} (previous)\n", label));
    out.push_str(&format!("+++ {} (current)\n", label));

    for hunk in hunks(&ops) {
        let hunk_ops = &ops[hunk.0..hunk.1];
        let old_count = hunk_ops.iter().filter(|op| op.tag != Tag::Insert).count();
        let new_count = hunk_ops.iter().filter(|op| op.tag != Tag::Delete).count();
        let first = hunk_ops[0];
        let old_start = if old_count == 0 {
            first.old_index
        } else {
            first.old_index + 1
        };
        let new_start = if new_count == 0 {
            first.new_index
        } else {
            first.new_index + 1
        };
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_start, old_count, new_start, new_count
        ));

        for op in hunk_ops {
            match op.tag {
                Tag::Equal => {
                    out.push(' ');
                    out.push_str(old[op.old_index]);
                }
                Tag::Delete => {
                    out.push('-');
                    out.push_str(old[op.old_index]);
                }
                Tag::Insert => {
                    out.push('+');
                    out.push_str(new[op.new_index]);
                }
            }
            out.push('\n');
        }
    }

    Some(out)
}

/// Line-level edit script via LCS, with common prefix/suffix stripped first
/// so the quadratic table only covers the changed middle.
fn diff_ops(old: &[&str], new: &[&str]) -> Vec<DiffOp> {
    let mut prefix = 0;
    while prefix < old.len() && prefix < new.len() && old[prefix] == new[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old.len() - prefix
        && suffix < new.len() - prefix
        && old[old.len() - 1 - suffix] == new[new.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mut ops = Vec::with_capacity(old.len().max(new.len()));
    for i in 0..prefix {
        ops.push(DiffOp {
            tag: Tag::Equal,
            old_index: i,
            new_index: i,
        });
    }

    let mid_old = &old[prefix..old.len() - suffix];
    let mid_new = &new[prefix..new.len() - suffix];
    let m = mid_old.len();
    let n = mid_new.len();

    // dp[i][j] = LCS length of mid_old[i..] and mid_new[j..].
    let mut dp = vec![vec![0u32; n + 1]; m + 1];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            dp[i][j] = if mid_old[i] == mid_new[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < m || j < n {
        if i < m && j < n && mid_old[i] == mid_new[j] {
            ops.push(DiffOp {
                tag: Tag::Equal,
                old_index: prefix + i,
                new_index: prefix + j,
            });
            i += 1;
            j += 1;
        } else if j == n || (i < m && dp[i + 1][j] >= dp[i][j + 1]) {
            ops.push(DiffOp {
                tag: Tag::Delete,
                old_index: prefix + i,
                new_index: prefix + j,
            });
            i += 1;
        } else {
            ops.push(DiffOp {
                tag: Tag::Insert,
                old_index: prefix + i,
                new_index: prefix + j,
            });
            j += 1;
        }
    }

    for k in 0..suffix {
        ops.push(DiffOp {
            tag: Tag::Equal,
            old_index: old.len() - suffix + k,
            new_index: new.len() - suffix + k,
        });
    }

    ops
}

/// Group the edit script into hunk ranges with `CONTEXT` equal lines of
/// surrounding context, merging hunks whose gap is within 2x context.
fn hunks(ops: &[DiffOp]) -> Vec<(usize, usize)> {
    let mut result = Vec::new();
    let mut prev_end = 0;
    let mut i = 0;

    while i < ops.len() {
        if ops[i].tag == Tag::Equal {
            i += 1;
            continue;
        }

        let start = i.saturating_sub(CONTEXT).max(prev_end);

        let mut j = i;
        let mut last_change = i;
        let mut equal_run = 0;
        while j < ops.len() {
            if ops[j].tag == Tag::Equal {
                equal_run += 1;
                if equal_run > 2 * CONTEXT {
                    break;
                }
            } else {
                equal_run = 0;
                last_change = j;
            }
            j += 1;
        }

        let end = (last_change + 1 + CONTEXT).min(ops.len());
        result.push((start, end));
        prev_end = end;
        i = end;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint("hello"), fingerprint("hello"));
        assert_ne!(fingerprint("hello"), fingerprint("hello "));
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = fingerprint("");
        assert_eq!(fp.len(), 64);
        assert_eq!(
            fp,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn identical_content_yields_no_diff() {
        assert!(unified_diff("a\nb\nc", "a\nb\nc", "http://x").is_none());
    }

    #[test]
    fn single_line_replacement() {
        let diff = unified_diff("v1", "v2", "http://example.com").unwrap();
        assert!(diff.contains("--- http://example.com (previous)"));
        assert!(diff.contains("+++ http://example.com (current)"));
        assert!(diff.contains("-v1"));
        assert!(diff.contains("+v2"));
        assert!(diff.contains("@@ -1,1 +1,1 @@"));
    }

    #[test]
    fn change_in_middle_keeps_context() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8\n9";
        let new = "1\n2\n3\n4\nX\n6\n7\n8\n9";
        let diff = unified_diff(old, new, "u").unwrap();
        assert!(diff.contains("@@ -2,7 +2,7 @@"));
        assert!(diff.contains("-5"));
        assert!(diff.contains("+X"));
        // Only three lines of context on each side.
        assert!(!diff.contains(" 1\n"));
    }

    #[test]
    fn distant_changes_produce_separate_hunks() {
        let old: Vec<String> = (1..=30).map(|n| n.to_string()).collect();
        let mut new = old.clone();
        new[0] = "first".into();
        new[29] = "last".into();
        let diff = unified_diff(&old.join("\n"), &new.join("\n"), "u").unwrap();
        assert_eq!(diff.matches("@@").count(), 4); // two hunks, two markers each
        assert!(diff.contains("-1\n"));
        assert!(diff.contains("+first"));
        assert!(diff.contains("-30"));
        assert!(diff.contains("+last"));
    }

    #[test]
    fn close_changes_merge_into_one_hunk() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8";
        let new = "1\nX\n3\n4\n5\nY\n7\n8";
        let diff = unified_diff(old, new, "u").unwrap();
        assert_eq!(diff.matches("@@").count(), 2);
    }

    #[test]
    fn pure_insertion() {
        let diff = unified_diff("a\nb", "a\nnew\nb", "u").unwrap();
        assert!(diff.contains("+new"));
        assert!(!diff.contains("-a"));
    }

    #[test]
    fn pure_deletion() {
        let diff = unified_diff("a\ngone\nb", "a\nb", "u").unwrap();
        assert!(diff.contains("-gone"));
        assert!(!diff.contains("+a"));
    }

    #[test]
    fn empty_previous_content() {
        let diff = unified_diff("", "hello", "u").unwrap();
        assert!(diff.contains("+hello"));
    }

    #[test]
    fn trailing_newline_only_change_is_invisible_to_line_diff() {
        // Hashes differ but the line sequences match.
        assert_ne!(fingerprint("a\n"), fingerprint("a"));
        assert!(unified_diff("a\n", "a", "u").is_none());
    }
}
