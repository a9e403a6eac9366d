//! Wildmat pattern matching for newsgroup name filters
//!
//! Implements the wildmat subset used by LIST and NEWGROUPS (RFC 3977 §4):
//! `*` matches any run of characters, `?` matches one character, and a
//! comma-separated pattern list is evaluated left to right with `!` negating
//! a pattern. The last matching pattern wins.

/// Match a single glob pattern (`*`, `?`) against a name
///
/// Iterative backtracking over the single `*` star position; no recursion,
/// no allocation.
fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            // Backtrack: let the star consume one more character
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// A parsed wildmat expression
#[derive(Debug, Clone)]
pub struct Wildmat {
    /// (negated, pattern) pairs in source order
    patterns: Vec<(bool, String)>,
}

impl Wildmat {
    /// Parse a comma-separated wildmat expression
    pub fn new(expr: &str) -> Self {
        let patterns = expr
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| match p.strip_prefix('!') {
                Some(rest) => (true, rest.to_string()),
                None => (false, p.to_string()),
            })
            .collect();
        Self { patterns }
    }

    /// Check whether `name` is selected by this expression
    ///
    /// The last pattern that matches decides; a negated match deselects.
    /// An expression with no patterns selects nothing.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let mut selected = false;
        for (negated, pattern) in &self.patterns {
            if glob_match(pattern, name) {
                selected = !negated;
            }
        }
        selected
    }
}
