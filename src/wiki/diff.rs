/// Line diff between two texts.
///
/// Common lines are found with the longest-common-subsequence algorithm;
/// each run of differing lines becomes a hunk listing removed lines
/// prefixed `< ` and added lines prefixed `> `, separated by `---`.
/// Hunks are separated by a blank line. Identical inputs produce an
/// empty string.
#[must_use]
pub fn diff(old: &str, new: &str) -> String {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    // lcs[i][j] is the LCS length of a[i..] and b[j..].
    let mut lcs = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut hunks: Vec<(Vec<&str>, Vec<&str>)> = Vec::new();
    let mut current: Option<(Vec<&str>, Vec<&str>)> = None;
    let (mut i, mut j) = (0, 0);
    loop {
        if i < a.len() && j < b.len() && a[i] == b[j] {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            i += 1;
            j += 1;
        } else if i < a.len() && (j >= b.len() || lcs[i + 1][j] >= lcs[i][j + 1]) {
            current.get_or_insert_default().0.push(a[i]);
            i += 1;
        } else if j < b.len() {
            current.get_or_insert_default().1.push(b[j]);
            j += 1;
        } else {
            break;
        }
    }
    if let Some(hunk) = current.take() {
        hunks.push(hunk);
    }

    let mut out = String::new();
    for (n, (removed, added)) in hunks.iter().enumerate() {
        if n > 0 {
            out.push('\n');
        }
        for line in removed {
            out.push_str("< ");
            out.push_str(line);
            out.push('\n');
        }
        if !removed.is_empty() && !added.is_empty() {
            out.push_str("---\n");
        }
        for line in added {
            out.push_str("> ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_is_empty() {
        assert_eq!(diff("a\nb\n", "a\nb\n"), "");
        assert_eq!(diff("", ""), "");
    }

    #[test]
    fn test_one_line_replacement() {
        assert_eq!(
            diff("keep\nold\nkeep\n", "keep\nnew\nkeep\n"),
            "< old\n---\n> new\n"
        );
    }

    #[test]
    fn test_pure_addition() {
        assert_eq!(diff("a\n", "a\nb\n"), "> b\n");
    }

    #[test]
    fn test_pure_removal() {
        assert_eq!(diff("a\nb\n", "a\n"), "< b\n");
    }

    #[test]
    fn test_from_empty() {
        assert_eq!(diff("", "first\nsecond\n"), "> first\n> second\n");
    }

    #[test]
    fn test_two_hunks_are_separated() {
        let result = diff("one\nsame\ntwo\n", "uno\nsame\ndos\n");
        assert_eq!(result, "< one\n---\n> uno\n\n< two\n---\n> dos\n");
    }

    #[test]
    fn test_common_suffix_not_rewritten() {
        let result = diff("x\ntail\n", "y\nz\ntail\n");
        assert_eq!(result, "< x\n---\n> y\n> z\n");
    }
}
