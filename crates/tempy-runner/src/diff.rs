//! Line-based unified diff of expected vs actual output.

/// Lines of unchanged context around each change.
const CONTEXT: usize = 3;

/// Largest LCS table built before falling back to a whole-block replace.
const MAX_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

/// One edit step; `old`/`new` are the line cursors in each input.
#[derive(Debug, Clone, Copy)]
struct Edit {
    op: Op,
    old: usize,
    new: usize,
}

/// Unified diff from `expected` to `actual`, or an empty string when equal.
///
/// A final line without a trailing newline is marked the way `diff -u`
/// marks it, so output that differs only in its last newline still shows
/// up.
pub fn unified_diff(expected: &str, actual: &str) -> String {
    let old: Vec<&str> = expected.split_inclusive('\n').collect();
    let new: Vec<&str> = actual.split_inclusive('\n').collect();
    let edits = diff_lines(&old, &new);

    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for (i, _) in edits.iter().enumerate().filter(|(_, e)| e.op != Op::Equal) {
        let start = i.saturating_sub(CONTEXT);
        let end = (i + CONTEXT + 1).min(edits.len());
        match hunks.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => hunks.push((start, end)),
        }
    }

    if hunks.is_empty() {
        return String::new();
    }
    debug_assert!(hunks.windows(2).all(|w| w[0].1 < w[1].0), "hunks overlap");

    let mut out = String::from("--- expected\n+++ actual\n");
    for (start, end) in hunks {
        let hunk = &edits[start..end];
        let old_len = hunk.iter().filter(|e| e.op != Op::Insert).count();
        let new_len = hunk.iter().filter(|e| e.op != Op::Delete).count();
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            hunk_range(hunk[0].old, old_len),
            hunk_range(hunk[0].new, new_len)
        ));

        for edit in hunk {
            let (marker, line) = match edit.op {
                Op::Equal => (' ', old[edit.old]),
                Op::Delete => ('-', old[edit.old]),
                Op::Insert => ('+', new[edit.new]),
            };
            out.push(marker);
            out.push_str(line.strip_suffix('\n').unwrap_or(line));
            out.push('\n');
            if !line.ends_with('\n') {
                out.push_str("\\ No newline at end of file\n");
            }
        }
    }
    out
}

fn hunk_range(start: usize, len: usize) -> String {
    // An empty range names the line before it
    if len == 0 {
        format!("{},0", start)
    } else {
        format!("{},{}", start + 1, len)
    }
}

fn diff_lines(old: &[&str], new: &[&str]) -> Vec<Edit> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mut edits: Vec<Edit> = (0..prefix)
        .map(|i| Edit {
            op: Op::Equal,
            old: i,
            new: i,
        })
        .collect();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];
    diff_middle(old_mid, new_mid, prefix, &mut edits);

    let old_tail = old.len() - suffix;
    let new_tail = new.len() - suffix;
    edits.extend((0..suffix).map(|k| Edit {
        op: Op::Equal,
        old: old_tail + k,
        new: new_tail + k,
    }));
    edits
}

fn diff_middle(old: &[&str], new: &[&str], offset: usize, edits: &mut Vec<Edit>) {
    let (n, m) = (old.len(), new.len());
    let mut i = 0;
    let mut j = 0;

    if n.saturating_mul(m) <= MAX_CELLS {
        // lcs[i * (m + 1) + j] = LCS length of old[i..] and new[j..]
        let width = m + 1;
        let mut lcs = vec![0u32; (n + 1) * width];
        for a in (0..n).rev() {
            for b in (0..m).rev() {
                lcs[a * width + b] = if old[a] == new[b] {
                    lcs[(a + 1) * width + b + 1] + 1
                } else {
                    lcs[(a + 1) * width + b].max(lcs[a * width + b + 1])
                };
            }
        }

        while i < n && j < m {
            let op = if old[i] == new[j] {
                Op::Equal
            } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
                Op::Delete
            } else {
                Op::Insert
            };
            edits.push(Edit {
                op,
                old: offset + i,
                new: offset + j,
            });
            match op {
                Op::Equal => {
                    i += 1;
                    j += 1;
                }
                Op::Delete => i += 1,
                Op::Insert => j += 1,
            }
        }
    }

    for a in i..n {
        edits.push(Edit {
            op: Op::Delete,
            old: offset + a,
            new: offset + j,
        });
    }
    for b in j..m {
        edits.push(Edit {
            op: Op::Insert,
            old: offset + n,
            new: offset + b,
        });
    }
}
