//! Pattern matchers: line-oriented regex heuristics over notebook code.
//!
//! Submitted code is reduced to [`SourceLines`] (comments, docstrings and
//! blank lines removed) and each [`LineMatcher`] answers one question about
//! it, e.g. "does any line import HashingVectorizer". Matching is
//! case-sensitive and per line; constructs split across lines are not seen.

use regex::Regex;

/// The user's code, reduced to the lines that matter for matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLines {
    lines: Vec<String>,
}

impl SourceLines {
    /// Strip comments, docstring blocks and blank lines from Python source.
    pub fn from_code(code: &str) -> Self {
        let mut lines = Vec::new();
        let mut open_docstring: Option<&'static str> = None;

        for raw in code.lines() {
            let trimmed = raw.trim();

            if let Some(delim) = open_docstring {
                if trimmed.contains(delim) {
                    open_docstring = None;
                }
                continue;
            }

            if let Some(delim) = docstring_delimiter(trimmed) {
                // Opening and closing on the same line, e.g. """Doc."""
                if trimmed.len() < delim.len() * 2 || !trimmed[delim.len()..].contains(delim) {
                    open_docstring = Some(delim);
                }
                continue;
            }

            let code_part = strip_trailing_comment(raw).trim_end();
            if code_part.trim().is_empty() {
                continue;
            }
            lines.push(code_part.to_string());
        }

        Self { lines }
    }

    /// Join the source of several cells, in order.
    pub fn from_cells<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut lines = Vec::new();
        for cell in cells {
            lines.extend(Self::from_code(cell).lines);
        }
        Self { lines }
    }

    /// Keep output text as-is, minus blank lines. Used for execution output,
    /// where `#` carries no comment meaning.
    pub fn from_output(text: &str) -> Self {
        Self {
            lines: text
                .lines()
                .map(str::trim_end)
                .filter(|l| !l.trim().is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

fn docstring_delimiter(trimmed: &str) -> Option<&'static str> {
    ["\"\"\"", "'''"]
        .into_iter()
        .find(|d| trimmed.starts_with(d))
}

/// Cut a `#` comment that sits outside any string literal.
fn strip_trailing_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '#') => return &line[..idx],
            _ => {}
        }
    }
    line
}

/// A named set of regexes; a line matches if any regex matches it.
#[derive(Debug, Clone)]
pub struct LineMatcher {
    name: &'static str,
    patterns: Vec<Regex>,
}

impl LineMatcher {
    /// Build a matcher from built-in patterns.
    ///
    /// # Panics
    /// Panics if a pattern does not compile; built-in patterns are fixed
    /// strings covered by the test suite.
    pub fn new(name: &'static str, patterns: &[&str]) -> Self {
        match Self::try_new(name, patterns) {
            Ok(matcher) => matcher,
            Err(e) => panic!("built-in pattern `{name}` failed to compile: {e}"),
        }
    }

    /// Build a matcher from patterns that may be invalid.
    pub fn try_new(name: &'static str, patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { name, patterns })
    }

    pub fn is_match_line(&self, line: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(line))
    }

    /// True if any line matches.
    pub fn matches(&self, lines: &SourceLines) -> bool {
        let hit = lines.iter().any(|l| self.is_match_line(l));
        tracing::trace!(matcher = self.name, hit, "line matcher evaluated");
        hit
    }

    /// Number of matching lines.
    pub fn count(&self, lines: &SourceLines) -> usize {
        lines.iter().filter(|l| self.is_match_line(l)).count()
    }

    /// First capture group of the first matching line, as text.
    pub fn capture<'a>(&self, lines: &'a SourceLines) -> Option<&'a str> {
        lines.iter().find_map(|line| {
            self.patterns
                .iter()
                .find_map(|p| p.captures(line).and_then(|c| c.get(1)))
                .map(|m| m.as_str())
        })
    }

    /// First capture group of the last matching line, as text.
    pub fn capture_last<'a>(&self, lines: &'a SourceLines) -> Option<&'a str> {
        lines.lines.iter().rev().find_map(|line| {
            self.patterns
                .iter()
                .find_map(|p| p.captures(line).and_then(|c| c.get(1)))
                .map(|m| m.as_str())
        })
    }

    /// First captured integer, if any line matches and it parses.
    pub fn capture_u32(&self, lines: &SourceLines) -> Option<u32> {
        self.capture(lines).and_then(|s| s.parse().ok())
    }
}

/// Conjunction of matchers over the full line set.
pub fn all_of(matchers: &[&LineMatcher], lines: &SourceLines) -> bool {
    matchers.iter().all(|m| m.matches(lines))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_comments_and_blank_lines() {
        let code = r#"
# load the data
import pandas as pd

df = pd.read_csv("wine.csv")  # raw data
"#;
        let lines = SourceLines::from_code(code);
        assert_eq!(
            lines.iter().collect::<Vec<_>>(),
            vec!["import pandas as pd", "df = pd.read_csv(\"wine.csv\")"]
        );
    }

    #[test]
    fn test_keeps_hash_inside_strings() {
        let lines = SourceLines::from_code("label = 'item #4'  # note");
        assert_eq!(lines.iter().collect::<Vec<_>>(), vec!["label = 'item #4'"]);
    }

    #[test]
    fn test_strips_docstring_blocks() {
        let code = r#"
"""
from sklearn.dummy import DummyClassifier
"""
'''One-liner docstring.'''
model = LogisticRegression()
"#;
        let lines = SourceLines::from_code(code);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines.iter().next(), Some("model = LogisticRegression()"));
    }

    #[test]
    fn test_from_cells_preserves_order() {
        let lines = SourceLines::from_cells(["a = 1", "# skip\nb = 2"]);
        assert_eq!(lines.iter().collect::<Vec<_>>(), vec!["a = 1", "b = 2"]);
    }

    #[test]
    fn test_output_lines_keep_hashes() {
        let lines = SourceLines::from_output("Epoch 1/5\n\n# not a comment\n");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_matcher_any_line() {
        let m = LineMatcher::new("scaler", &[r"StandardScaler\("]);
        let lines = SourceLines::from_code("x = 1\nscaler = StandardScaler()\n");
        assert!(m.matches(&lines));
        assert_eq!(m.count(&lines), 1);
    }

    #[test]
    fn test_matcher_is_case_sensitive() {
        let m = LineMatcher::new("scaler", &[r"StandardScaler\("]);
        let lines = SourceLines::from_code("scaler = standardscaler()");
        assert!(!m.matches(&lines));
    }

    #[test]
    fn test_commented_code_does_not_match() {
        let m = LineMatcher::new("dummy", &[r"DummyClassifier\("]);
        let lines = SourceLines::from_code("# model = DummyClassifier()");
        assert!(!m.matches(&lines));
    }

    #[test]
    fn test_multiline_call_is_not_detected() {
        let m = LineMatcher::new("drop_axis", &[r#"\.drop\(.*axis\s*=\s*1"#]);
        let lines = SourceLines::from_code("df = df.drop(\n    'Wine',\n    axis=1)");
        assert!(!m.matches(&lines));
    }

    #[test]
    fn test_capture_u32() {
        let m = LineMatcher::new("epochs", &[r"epochs\s*=\s*(\d+)"]);
        let lines = SourceLines::from_code("model.fit(x, y, epochs=60)");
        assert_eq!(m.capture_u32(&lines), Some(60));
        assert_eq!(m.capture_u32(&SourceLines::default()), None);
    }

    #[test]
    fn test_capture_last() {
        let m = LineMatcher::new("val_acc", &[r"val_accuracy:\s*([0-9.]+)"]);
        let lines = SourceLines::from_output("val_accuracy: 0.50\nval_accuracy: 0.75");
        assert_eq!(m.capture_last(&lines), Some("0.75"));
    }

    #[test]
    fn test_all_of_requires_every_matcher() {
        let import = LineMatcher::new("import", &[r"import .*HashingVectorizer"]);
        let fit = LineMatcher::new("fit", &[r"\.fit_transform\("]);
        let only_import =
            SourceLines::from_code("from sklearn.feature_extraction.text import HashingVectorizer");
        assert!(!all_of(&[&import, &fit], &only_import));

        let both = SourceLines::from_code(
            "from sklearn.feature_extraction.text import HashingVectorizer\nX = v.fit_transform(t)",
        );
        assert!(all_of(&[&import, &fit], &both));
    }

    #[test]
    fn test_try_new_rejects_bad_pattern() {
        assert!(LineMatcher::try_new("bad", &["(unclosed"]).is_err());
    }
}
