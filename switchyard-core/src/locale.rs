//! Locale resolution.
//!
//! The dispatcher resolves the request locale before rendering, publishes it
//! as a [`CurrentLocale`] attribute, hands it to view resolvers and writes it
//! as `Content-Language`.

use crate::error::{Error, Result};
use crate::http::HttpRequest;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A language with optional script and region.
///
/// ```
/// use switchyard_core::Locale;
///
/// let locale: Locale = "zh-hans-cn".parse().unwrap();
/// assert_eq!(locale.tag(), "zh-Hans-CN");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale {
    /// ISO 639 code, lowercase
    pub language: String,
    /// ISO 15924 code, title case
    pub script: Option<String>,
    /// ISO 3166 code, uppercase, or a UN M.49 number
    pub region: Option<String>,
}

impl Locale {
    pub fn new(language: impl Into<String>, region: Option<&str>) -> Self {
        Self {
            language: language.into().to_lowercase(),
            script: None,
            region: region.map(str::to_uppercase),
        }
    }

    /// Parse a BCP 47 tag such as `en-US` or `en_US`.
    pub fn parse(tag: &str) -> Result<Self> {
        let mut parts = tag.split(['-', '_']);
        let language = parts.next().unwrap_or_default().to_lowercase();
        if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::BadRequest(format!("invalid locale tag '{}'", tag)));
        }

        let mut locale = Self {
            language,
            script: None,
            region: None,
        };
        for part in parts {
            let alpha = part.chars().all(|c| c.is_ascii_alphabetic());
            match part.len() {
                4 if alpha => locale.script = Some(title_case(part)),
                2 if alpha => locale.region = Some(part.to_uppercase()),
                3 if part.chars().all(|c| c.is_ascii_digit()) => locale.region = Some(part.to_string()),
                _ => {}
            }
        }
        Ok(locale)
    }

    /// BCP 47 tag, e.g. `en-US`.
    pub fn tag(&self) -> String {
        let mut tag = self.language.clone();
        for part in [&self.script, &self.region].into_iter().flatten() {
            tag.push('-');
            tag.push_str(part);
        }
        tag
    }

    /// Same language, and same region unless `other` has none.
    pub fn matches(&self, other: &Locale) -> bool {
        self.language == other.language && (other.region.is_none() || self.region == other.region)
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Locale::parse(s)
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::new("en", None)
    }
}

/// Locale resolved for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentLocale(pub Locale);

/// `Accept-Language` entries sorted by descending quality; `*` and malformed
/// tags are skipped.
pub fn parse_accept_language(header: &str) -> Vec<Locale> {
    let mut entries: Vec<(Locale, f32)> = header
        .split(',')
        .filter_map(|part| {
            let mut split = part.trim().splitn(2, ';');
            let tag = split.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let quality = split
                .next()
                .and_then(|q| q.trim().strip_prefix("q="))
                .and_then(|q| q.parse().ok())
                .unwrap_or(1.0);
            Some((Locale::parse(tag).ok()?, quality))
        })
        .collect();

    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    entries.into_iter().map(|(locale, _)| locale).collect()
}

/// Determines the locale of a request.
pub trait LocaleResolver: Send + Sync {
    fn resolve_locale(&self, request: &HttpRequest) -> Locale;
}

/// Locale from the `Accept-Language` header.
///
/// With supported locales configured, an exact match on any requested
/// locale wins, then a region-less supported locale sharing the language
/// of an earlier request, then the default.
#[derive(Debug, Clone, Default)]
pub struct AcceptHeaderLocaleResolver {
    default_locale: Option<Locale>,
    supported: Vec<Locale>,
}

impl AcceptHeaderLocaleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, locale: Locale) -> Self {
        self.default_locale = Some(locale);
        self
    }

    pub fn with_supported(mut self, locales: Vec<Locale>) -> Self {
        self.supported = locales;
        self
    }

    fn fallback(&self) -> Locale {
        self.default_locale.clone().unwrap_or_default()
    }
}

impl LocaleResolver for AcceptHeaderLocaleResolver {
    fn resolve_locale(&self, request: &HttpRequest) -> Locale {
        let Some(header) = request.header("Accept-Language") else {
            return self.fallback();
        };
        let requested = parse_accept_language(header);
        if self.supported.is_empty() {
            return requested.into_iter().next().unwrap_or_else(|| self.fallback());
        }

        let mut language_match = None;
        for locale in &requested {
            if self.supported.contains(locale) {
                return locale.clone();
            }
            if language_match.is_none() {
                language_match = self
                    .supported
                    .iter()
                    .find(|s| s.region.is_none() && s.language == locale.language);
            }
        }
        language_match.cloned().unwrap_or_else(|| self.fallback())
    }
}

/// Always the same locale.
#[derive(Debug, Clone, Default)]
pub struct FixedLocaleResolver(pub Locale);

impl LocaleResolver for FixedLocaleResolver {
    fn resolve_locale(&self, _request: &HttpRequest) -> Locale {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let locale = Locale::parse("en_us").unwrap();
        assert_eq!(locale.tag(), "en-US");
        assert_eq!(Locale::parse("es-419").unwrap().region.as_deref(), Some("419"));
        assert!(Locale::parse("x").is_err());
        assert!(Locale::parse("").is_err());
    }

    #[test]
    fn test_accept_language_order() {
        let locales = parse_accept_language("fr;q=0.5, en-GB, *;q=0.1, de;q=0.8");
        let tags: Vec<String> = locales.iter().map(Locale::tag).collect();
        assert_eq!(tags, vec!["en-GB", "de", "fr"]);
    }

    #[test]
    fn test_accept_header_resolver() {
        let resolver = AcceptHeaderLocaleResolver::new().with_default(Locale::new("de", None));
        let none = HttpRequest::new("GET", "/");
        assert_eq!(resolver.resolve_locale(&none).tag(), "de");

        let req = HttpRequest::new("GET", "/").with_header("Accept-Language", "fr-CA,en;q=0.5");
        assert_eq!(resolver.resolve_locale(&req).tag(), "fr-CA");
    }

    #[test]
    fn test_supported_locales() {
        let resolver = AcceptHeaderLocaleResolver::new()
            .with_default(Locale::new("en", None))
            .with_supported(vec![Locale::new("en", None), Locale::new("fr", None)]);

        let req = HttpRequest::new("GET", "/").with_header("Accept-Language", "fr-CA");
        assert_eq!(resolver.resolve_locale(&req).tag(), "fr");

        let req = HttpRequest::new("GET", "/").with_header("Accept-Language", "fr-CA,en;q=0.5");
        assert_eq!(resolver.resolve_locale(&req).tag(), "en");

        let req = HttpRequest::new("GET", "/").with_header("Accept-Language", "ja");
        assert_eq!(resolver.resolve_locale(&req).tag(), "en");
    }

    #[test]
    fn test_fixed_resolver() {
        let resolver = FixedLocaleResolver(Locale::new("pt", Some("br")));
        assert_eq!(resolver.resolve_locale(&HttpRequest::new("GET", "/")).tag(), "pt-BR");
    }
}
