//! Ant-style path patterns.
//!
//! | Token | Matches |
//! |-------|---------|
//! | `?` | one character within a segment |
//! | `*` | zero or more characters within a segment |
//! | `**` | zero or more whole segments |
//! | `{name}` | a segment part, captured as `name` |
//! | `{name:[a-z]+}` | a segment part matching the regex, captured as `name` |
//!
//! ```rust
//! use switchyard_core::AntPathMatcher;
//!
//! let matcher = AntPathMatcher::new();
//! assert!(matcher.matches("/users/*", "/users/42"));
//! assert!(!matcher.matches("/users/*", "/users/42/posts"));
//! assert!(matcher.matches("/users/**", "/users/42/posts"));
//!
//! let vars = matcher
//!     .extract_uri_template_variables("/users/{id}/posts/{post}", "/users/42/posts/7")
//!     .unwrap();
//! assert_eq!(vars["id"], "42");
//! assert_eq!(vars["post"], "7");
//! ```
//!
//! A pattern and a path must agree on a trailing separator: `/users` does not
//! match `/users/`. Route tables that want both forms opt into trailing-slash
//! matching and test `pattern + "/"` as well.

use crate::cache::LookupCache;
use crate::error::{Error, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

const SEGMENT_CACHE_LIMIT: usize = 65_536;

// `?`, `*` or a `{...}` placeholder, allowing one level of nested braces for
// regex quantifiers such as `{id:\d{3}}`.
static GLOB_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\?|\*|\{((?:\{[^/]+?\}|[^/{}]|\\[{}])+?)\}").expect("static glob regex")
});

static VARIABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^/]+?\}").expect("static variable regex"));

/// Compiled matcher for a single pattern segment.
#[derive(Debug)]
enum SegmentMatcher {
    /// No wildcards or variables; compared as a plain string.
    Literal(String),
    Regex {
        regex: Regex,
        variables: Vec<String>,
    },
    /// The segment regex failed to compile; never matches.
    Invalid,
}

impl SegmentMatcher {
    fn compile(segment: &str, case_sensitive: bool) -> Result<Self> {
        if !GLOB_PATTERN.is_match(segment) {
            return Ok(SegmentMatcher::Literal(segment.to_string()));
        }

        let mut source = String::from(if case_sensitive { "^" } else { "(?i)^" });
        let mut variables = Vec::new();
        let mut end = 0;
        for caps in GLOB_PATTERN.captures_iter(segment) {
            let Some(whole) = caps.get(0) else { continue };
            source.push_str(&regex::escape(&segment[end..whole.start()]));
            match whole.as_str() {
                "?" => source.push('.'),
                "*" => source.push_str(".*"),
                placeholder => {
                    let inner = &placeholder[1..placeholder.len() - 1];
                    match inner.split_once(':') {
                        Some((name, custom)) => {
                            variables.push(name.to_string());
                            source.push('(');
                            source.push_str(custom);
                            source.push(')');
                        }
                        None => {
                            variables.push(inner.to_string());
                            source.push_str("(.*)");
                        }
                    }
                }
            }
            end = whole.end();
        }
        source.push_str(&regex::escape(&segment[end..]));
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| Error::Configuration(format!("invalid pattern segment '{}': {}", segment, e)))?;
        Ok(SegmentMatcher::Regex { regex, variables })
    }

    fn matches(
        &self,
        value: &str,
        case_sensitive: bool,
        vars: Option<&mut HashMap<String, String>>,
    ) -> Result<bool> {
        match self {
            SegmentMatcher::Literal(lit) => Ok(if case_sensitive {
                lit == value
            } else {
                lit.eq_ignore_ascii_case(value)
            }),
            SegmentMatcher::Invalid => Ok(false),
            SegmentMatcher::Regex { regex, variables } => {
                let Some(caps) = regex.captures(value) else {
                    return Ok(false);
                };
                if let Some(vars) = vars {
                    if caps.len() - 1 != variables.len() {
                        return Err(Error::Configuration(format!(
                            "the number of capturing groups in '{}' does not match the number of \
                             URI template variables; use non-capturing groups (?:...) in custom regexes",
                            regex.as_str()
                        )));
                    }
                    for (idx, name) in variables.iter().enumerate() {
                        let value = caps.get(idx + 1).map(|m| m.as_str()).unwrap_or_default();
                        vars.insert(name.clone(), value.to_string());
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Matcher for Ant-style path patterns.
///
/// Compiled segments are memoized in a bounded concurrent cache, so a single
/// matcher is shared across requests.
#[derive(Debug)]
pub struct AntPathMatcher {
    separator: char,
    case_sensitive: bool,
    segments: LookupCache<String, Arc<SegmentMatcher>>,
}

impl Default for AntPathMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AntPathMatcher {
    pub fn new() -> Self {
        Self {
            separator: '/',
            case_sensitive: true,
            segments: LookupCache::bounded(SEGMENT_CACHE_LIMIT),
        }
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Whether `path` contains pattern syntax.
    pub fn is_pattern(&self, path: &str) -> bool {
        let mut in_variable = false;
        for c in path.chars() {
            match c {
                '*' | '?' => return true,
                '{' => in_variable = true,
                '}' if in_variable => return true,
                _ => {}
            }
        }
        false
    }

    /// Check that every segment of `pattern` compiles.
    pub fn validate(&self, pattern: &str) -> Result<()> {
        for segment in self.tokenize(pattern) {
            SegmentMatcher::compile(segment, self.case_sensitive)?;
        }
        Ok(())
    }

    pub fn matches(&self, pattern: &str, path: &str) -> bool {
        self.do_match(pattern, path, true, None).unwrap_or(false)
    }

    /// Whether `path` could be the start of something `pattern` matches.
    pub fn match_start(&self, pattern: &str, path: &str) -> bool {
        self.do_match(pattern, path, false, None).unwrap_or(false)
    }

    /// Extract `{name}` captures of `pattern` from `path`.
    ///
    /// Fails if the pattern does not match, or if a custom regex contains its
    /// own capturing groups.
    pub fn extract_uri_template_variables(
        &self,
        pattern: &str,
        path: &str,
    ) -> Result<HashMap<String, String>> {
        let mut vars = HashMap::new();
        if !self.do_match(pattern, path, true, Some(&mut vars))? {
            return Err(Error::Internal(format!(
                "pattern \"{}\" is not a match for \"{}\"",
                pattern, path
            )));
        }
        Ok(vars)
    }

    /// The part of `path` matched by the wildcard portion of `pattern`.
    ///
    /// - `/docs/*` against `/docs/cvs/commit` gives `cvs/commit`
    /// - `/docs/cvs/commit.html` against itself gives the empty string
    /// - `/*.html` against `/docs/commit.html` gives `docs/commit.html`
    pub fn extract_path_within_pattern(&self, pattern: &str, path: &str) -> String {
        let pattern_parts = self.tokenize(pattern);
        let path_parts = self.tokenize(path);
        let mut out = String::new();
        let mut started = false;

        for (idx, part) in pattern_parts.iter().enumerate() {
            if part.contains('*') || part.contains('?') {
                for (seg, path_part) in path_parts.iter().enumerate().skip(idx) {
                    if started || (seg == 0 && !pattern.starts_with(self.separator)) {
                        out.push(self.separator);
                    }
                    out.push_str(path_part);
                    started = true;
                }
                break;
            }
        }
        out
    }

    /// Comparator ordering patterns from most to least specific for `path`.
    pub fn pattern_comparator<'a>(&self, path: &'a str) -> AntPatternComparator<'a> {
        AntPatternComparator { path }
    }

    fn tokenize<'p>(&self, path: &'p str) -> Vec<&'p str> {
        path.split(self.separator).filter(|s| !s.is_empty()).collect()
    }

    fn segment(&self, segment: &str) -> Arc<SegmentMatcher> {
        if let Some(found) = self.segments.get(segment) {
            return found;
        }
        let compiled = Arc::new(
            SegmentMatcher::compile(segment, self.case_sensitive)
                .unwrap_or(SegmentMatcher::Invalid),
        );
        self.segments.insert(segment.to_string(), Arc::clone(&compiled));
        compiled
    }

    fn match_segment(
        &self,
        pattern: &str,
        value: &str,
        vars: &mut Option<&mut HashMap<String, String>>,
    ) -> Result<bool> {
        self.segment(pattern)
            .matches(value, self.case_sensitive, vars.as_deref_mut())
    }

    fn do_match(
        &self,
        pattern: &str,
        path: &str,
        full_match: bool,
        mut vars: Option<&mut HashMap<String, String>>,
    ) -> Result<bool> {
        let sep = self.separator;
        if path.starts_with(sep) != pattern.starts_with(sep) {
            return Ok(false);
        }

        let patt_dirs = self.tokenize(pattern);
        let path_dirs = self.tokenize(path);

        let mut p_start: isize = 0;
        let mut p_end: isize = patt_dirs.len() as isize - 1;
        let mut s_start: isize = 0;
        let mut s_end: isize = path_dirs.len() as isize - 1;
        let pd = |i: isize| patt_dirs[i as usize];
        let sd = |i: isize| path_dirs[i as usize];
        let only_double_wildcards =
            |from: isize, to: isize| (from..=to).all(|i| patt_dirs[i as usize] == "**");

        // Match all segments up to the first **
        while p_start <= p_end && s_start <= s_end {
            if pd(p_start) == "**" {
                break;
            }
            if !self.match_segment(pd(p_start), sd(s_start), &mut vars)? {
                return Ok(false);
            }
            p_start += 1;
            s_start += 1;
        }

        if s_start > s_end {
            // Path is exhausted
            if p_start > p_end {
                return Ok(pattern.ends_with(sep) == path.ends_with(sep));
            }
            if !full_match {
                return Ok(true);
            }
            if p_start == p_end && pd(p_start) == "*" && path.ends_with(sep) {
                return Ok(true);
            }
            return Ok(only_double_wildcards(p_start, p_end));
        } else if p_start > p_end {
            // Path not exhausted, but pattern is
            return Ok(false);
        } else if !full_match && pd(p_start) == "**" {
            return Ok(true);
        }

        // Match segments from the end back to the last **
        while p_start <= p_end && s_start <= s_end {
            if pd(p_end) == "**" {
                break;
            }
            if !self.match_segment(pd(p_end), sd(s_end), &mut vars)? {
                return Ok(false);
            }
            p_end -= 1;
            s_end -= 1;
        }
        if s_start > s_end {
            return Ok(only_double_wildcards(p_start, p_end));
        }

        // Whatever sits between pairs of ** must appear somewhere in the
        // remaining path segments.
        while p_start != p_end && s_start <= s_end {
            let next_double = ((p_start + 1)..=p_end).find(|&i| pd(i) == "**");
            let Some(next_double) = next_double else {
                break;
            };
            if next_double == p_start + 1 {
                // '**/**'
                p_start += 1;
                continue;
            }

            let pat_len = next_double - p_start - 1;
            let str_len = s_end - s_start + 1;
            let mut found = None;
            'outer: for i in 0..=(str_len - pat_len) {
                for j in 0..pat_len {
                    if !self.match_segment(pd(p_start + j + 1), sd(s_start + i + j), &mut vars)? {
                        continue 'outer;
                    }
                }
                found = Some(s_start + i);
                break;
            }

            let Some(found) = found else {
                return Ok(false);
            };
            p_start = next_double;
            s_start = found + pat_len;
        }

        Ok(only_double_wildcards(p_start, p_end))
    }
}

/// Specificity counters for one pattern.
#[derive(Debug, Default)]
struct PatternInfo {
    uri_vars: usize,
    single_wildcards: usize,
    double_wildcards: usize,
    catch_all: bool,
    prefix: bool,
    length: usize,
    least_specific: bool,
}

impl PatternInfo {
    fn new(pattern: Option<&str>) -> Self {
        let Some(pattern) = pattern else {
            return PatternInfo {
                least_specific: true,
                ..Default::default()
            };
        };

        let mut info = PatternInfo::default();
        let bytes = pattern.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            match bytes[pos] {
                b'{' => {
                    info.uri_vars += 1;
                    pos += 1;
                }
                b'*' => {
                    if pos + 1 < bytes.len() && bytes[pos + 1] == b'*' {
                        info.double_wildcards += 1;
                        pos += 2;
                    } else {
                        // A trailing ".*" is a regex fragment, not a wildcard
                        if pos > 0 && !(pos + 1 == bytes.len() && bytes[pos - 1] == b'.') {
                            info.single_wildcards += 1;
                        }
                        pos += 1;
                    }
                }
                _ => pos += 1,
            }
        }
        info.catch_all = pattern == "/**";
        info.prefix = !info.catch_all && pattern.ends_with("/**");
        info.least_specific = info.catch_all;
        info.length = VARIABLE_PATTERN.replace_all(pattern, "#").len();
        info
    }

    fn total_count(&self) -> usize {
        self.uri_vars + self.single_wildcards + 2 * self.double_wildcards
    }
}

/// Orders patterns by specificity for one request path; the most specific
/// pattern sorts first.
///
/// In priority order:
///
/// 1. `/**` (or no pattern) sorts last.
/// 2. A pattern equal to the path sorts first.
/// 3. A prefix pattern (`/foo/**`) sorts after patterns without `**`.
/// 4. Fewer variables and wildcards first, with `**` counting double.
/// 5. Longer patterns first, with each `{var}` counted as one character.
/// 6. Fewer `*` first, then fewer variables.
#[derive(Debug, Clone, Copy)]
pub struct AntPatternComparator<'a> {
    path: &'a str,
}

impl AntPatternComparator<'_> {
    pub fn compare(&self, pattern1: &str, pattern2: &str) -> Ordering {
        self.compare_opt(Some(pattern1), Some(pattern2))
    }

    pub fn compare_opt(&self, pattern1: Option<&str>, pattern2: Option<&str>) -> Ordering {
        let info1 = PatternInfo::new(pattern1);
        let info2 = PatternInfo::new(pattern2);

        match (info1.least_specific, info2.least_specific) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }

        let exact1 = pattern1 == Some(self.path);
        let exact2 = pattern2 == Some(self.path);
        match (exact1, exact2) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        if info1.prefix && info2.double_wildcards == 0 {
            return Ordering::Greater;
        } else if info2.prefix && info1.double_wildcards == 0 {
            return Ordering::Less;
        }

        info1
            .total_count()
            .cmp(&info2.total_count())
            .then_with(|| info2.length.cmp(&info1.length))
            .then_with(|| info1.single_wildcards.cmp(&info2.single_wildcards))
            .then_with(|| info1.uri_vars.cmp(&info2.uri_vars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(path: &str, patterns: &[&'static str]) -> Vec<&'static str> {
        let matcher = AntPathMatcher::new();
        let comparator = matcher.pattern_comparator(path);
        let mut v = patterns.to_vec();
        v.sort_by(|a, b| comparator.compare(a, b));
        v
    }

    #[test]
    fn test_literal_match() {
        let m = AntPathMatcher::new();
        assert!(m.matches("/test", "/test"));
        assert!(!m.matches("/test", "/Test"));
        assert!(!m.matches("/test", "test"));
        assert!(m.matches("", ""));
        assert!(m.matches("/", "/"));
    }

    #[test]
    fn test_wildcards() {
        let m = AntPathMatcher::new();
        assert!(m.matches("/t?st", "/test"));
        assert!(!m.matches("/t?st", "/toast"));
        assert!(m.matches("/*.html", "/index.html"));
        assert!(m.matches("/a/*", "/a/b"));
        assert!(!m.matches("/a/*", "/a/b/c"));
        assert!(m.matches("/a/**", "/a/b/c"));
        assert!(m.matches("/a/**", "/a"));
        assert!(m.matches("/**/end", "/x/y/end"));
        assert!(m.matches("/a/**/b/**/c", "/a/x/b/y/z/c"));
        assert!(!m.matches("/a/**/b/**/c", "/a/x/y/c"));
        assert!(m.matches("/**", "/anything/at/all"));
    }

    #[test]
    fn test_trailing_separator_must_agree() {
        let m = AntPathMatcher::new();
        assert!(!m.matches("/users", "/users/"));
        assert!(m.matches("/users/", "/users/"));
        assert!(m.matches("/users/*", "/users/"));
    }

    #[test]
    fn test_case_insensitive() {
        let m = AntPathMatcher::new().case_sensitive(false);
        assert!(m.matches("/Users/{id}", "/users/7"));
        assert!(m.matches("/users", "/USERS"));
    }

    #[test]
    fn test_extract_uri_template_variables() {
        let m = AntPathMatcher::new();
        let vars = m
            .extract_uri_template_variables("/hotels/{hotel}/rooms/{room:\\d+}", "/hotels/1/rooms/22")
            .unwrap();
        assert_eq!(vars["hotel"], "1");
        assert_eq!(vars["room"], "22");

        assert!(!m.matches("/rooms/{room:\\d+}", "/rooms/abc"));
        assert!(m.extract_uri_template_variables("/a/{x}", "/b/1").is_err());
    }

    #[test]
    fn test_nested_brace_regex() {
        let m = AntPathMatcher::new();
        let vars = m
            .extract_uri_template_variables("/zip/{code:\\d{5}}", "/zip/12345")
            .unwrap();
        assert_eq!(vars["code"], "12345");
        assert!(!m.matches("/zip/{code:\\d{5}}", "/zip/1234"));
    }

    #[test]
    fn test_capturing_group_in_custom_regex_is_rejected() {
        let m = AntPathMatcher::new();
        assert!(m.matches("/x/{v:(a|b)}", "/x/a"));
        assert!(m.extract_uri_template_variables("/x/{v:(a|b)}", "/x/a").is_err());
    }

    #[test]
    fn test_extract_path_within_pattern() {
        let m = AntPathMatcher::new();
        assert_eq!(m.extract_path_within_pattern("/docs/cvs/commit.html", "/docs/cvs/commit.html"), "");
        assert_eq!(m.extract_path_within_pattern("/docs/*", "/docs/cvs/commit"), "cvs/commit");
        assert_eq!(m.extract_path_within_pattern("/docs/**", "/docs/cvs/commit"), "cvs/commit");
        assert_eq!(m.extract_path_within_pattern("/*.html", "/docs/commit.html"), "docs/commit.html");
        assert_eq!(m.extract_path_within_pattern("*", "/docs/commit.html"), "/docs/commit.html");
    }

    #[test]
    fn test_is_pattern() {
        let m = AntPathMatcher::new();
        assert!(m.is_pattern("/a/*"));
        assert!(m.is_pattern("/a/{id}"));
        assert!(!m.is_pattern("/a/b"));
        assert!(!m.is_pattern("/a/{b"));
    }

    #[test]
    fn test_validate_rejects_bad_regex() {
        let m = AntPathMatcher::new();
        assert!(m.validate("/a/{id:[0-9}").is_err());
        assert!(m.validate("/a/{id:[0-9]+}").is_ok());
    }

    #[test]
    fn test_comparator_exact_path_first() {
        assert_eq!(sorted("/a/b", &["/a/*", "/a/b"]), vec!["/a/b", "/a/*"]);
    }

    #[test]
    fn test_comparator_catch_all_last() {
        assert_eq!(
            sorted("/a/b", &["/**", "/a/**", "/a/{x}"]),
            vec!["/a/{x}", "/a/**", "/**"]
        );
    }

    #[test]
    fn test_comparator_fewer_wildcards_first() {
        assert_eq!(
            sorted("/hotels/new", &["/hotels/{hotel}", "/hotels/*"]),
            vec!["/hotels/{hotel}", "/hotels/*"]
        );
        assert_eq!(
            sorted("/hotels/new/x", &["/hotels/*/**", "/hotels/{h}/x"]),
            vec!["/hotels/{h}/x", "/hotels/*/**"]
        );
    }

    #[test]
    fn test_comparator_non_ascii_wildcard() {
        assert_eq!(sorted("/cafés", &["/{x}", "/café*"]), vec!["/café*", "/{x}"]);
        assert_eq!(sorted("/crème", &["/crè*", "/cr*"]), vec!["/crè*", "/cr*"]);
    }

    #[test]
    fn test_comparator_longer_first() {
        assert_eq!(
            sorted("/hotels/new.html", &["/hotels/*", "/hotels/*.html"]),
            vec!["/hotels/*.html", "/hotels/*"]
        );
    }

    #[test]
    fn test_comparator_none_is_least_specific() {
        let m = AntPathMatcher::new();
        let c = m.pattern_comparator("/x");
        assert_eq!(c.compare_opt(None, Some("/x/*")), Ordering::Greater);
        assert_eq!(c.compare_opt(None, None), Ordering::Equal);
    }
}
