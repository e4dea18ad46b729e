use regex::Regex;

use crate::error::{CactusError, Result};

/// Selects tests by a `suite/test` pattern; each part is a case-insensitive
/// regular expression. A pattern without `/` selects whole suites.
#[derive(Clone, Debug)]
pub struct TestMatcher {
    pub suite: Regex,
    pub test: Regex,
    pub pattern: String,
}

impl TestMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let parts = Self::split_regexp(pattern);
        let suite = compile(parts[0])?;
        let test = if parts.len() > 1 {
            compile(&parts[1..].join("/"))?
        } else {
            compile("")?
        };
        Ok(Self {
            suite,
            test,
            pattern: pattern.to_string(),
        })
    }

    pub fn match_test(&self, suite: &str, test: &str) -> bool {
        if !self.suite.is_match(suite) {
            return false;
        }

        if !test.is_empty() && !self.test.is_match(test) {
            return false;
        }

        true
    }

    /// Splits the pattern on `/`, except inside brackets or parentheses and
    /// after a backslash.
    fn split_regexp(pattern: &str) -> Vec<&str> {
        let mut parts = Vec::with_capacity(pattern.matches('/').count() + 1);
        let mut square_bracket_counter = 0;
        let mut parenthesis_counter = 0;
        let mut start = 0;
        let mut escaped = false;
        for (index, c) in pattern.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '[' => square_bracket_counter += 1,
                ']' => {
                    if square_bracket_counter > 0 {
                        square_bracket_counter -= 1;
                    }
                }
                '(' => {
                    if square_bracket_counter == 0 {
                        parenthesis_counter += 1;
                    }
                }
                ')' => {
                    if square_bracket_counter == 0 {
                        parenthesis_counter -= 1;
                    }
                }
                '\\' => escaped = true,
                '/' => {
                    if square_bracket_counter == 0 && parenthesis_counter == 0 {
                        parts.push(&pattern[start..index]);
                        start = index + 1;
                    }
                }
                _ => {}
            }
        }
        parts.push(&pattern[start..]);
        parts
    }
}

fn compile(part: &str) -> Result<Regex> {
    Regex::new(&format!("(?i:{})", part))
        .map_err(|err| CactusError::Config(format!("invalid test pattern `{part}`: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_regexp() {
        let parts = TestMatcher::split_regexp("SessionTest/testBar");
        assert_eq!(parts, vec!["SessionTest", "testBar"]);

        let parts = TestMatcher::split_regexp("suite/test/1/2");
        assert_eq!(parts, vec!["suite", "test", "1", "2"]);

        let parts = TestMatcher::split_regexp("a[/]b/(c/d)/e\\/f");
        assert_eq!(parts, vec!["a[/]b", "(c/d)", "e\\/f"]);

        let parts = TestMatcher::split_regexp("/test");
        assert_eq!(parts, vec!["", "test"]);
    }

    #[test]
    fn test_match_test() {
        let matcher = TestMatcher::new("session/bar").unwrap();

        assert!(matcher.match_test("SessionTest", "testBar"));
        assert!(matcher.match_test("sessiontest", "testBarBaz"));
        assert!(!matcher.match_test("SessionTest", "testBaz"));
        assert!(!matcher.match_test("CookieTest", "testBar"));

        let matcher = TestMatcher::new("/bar").unwrap();
        assert!(matcher.match_test("SessionTest", "testBar"));
        assert!(matcher.match_test("", "testBar"));
        assert!(!matcher.match_test("SessionTest", "testFoo"));
    }

    #[test]
    fn test_match_suite() {
        let matcher = TestMatcher::new("session").unwrap();

        assert!(matcher.match_test("SessionTest", ""));
        assert!(matcher.match_test("SessionTest", "anything"));
        assert!(!matcher.match_test("CookieTest", ""));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            TestMatcher::new("session/(unclosed"),
            Err(CactusError::Config(_))
        ));
    }
}
