//! Custom path rewriting
//!
//! Lets deployments map their own URL scheme onto the thumbor grammar with a
//! `REWRITE_MATCH_PATTERN` written as `/pattern/flags` and a `REWRITE_SUBSTITUTION`.

use lumen_core::{ImageHandlerError, RewriteConfig};
use regex::RegexBuilder;

pub const PATH_UNDEFINED: &str = "ThumborMapping::ParseCustomPath::PathUndefined";
pub const PATTERN_UNDEFINED: &str = "ThumborMapping::ParseCustomPath::RewriteMatchPatternUndefined";
pub const SUBSTITUTION_UNDEFINED: &str =
    "ThumborMapping::ParseCustomPath::RewriteSubstitutionUndefined";
pub const PATTERN_INVALID: &str = "ThumborMapping::ParseCustomPath::InvalidRewriteMatchPattern";

/// Rewrite `path` with the configured match pattern and substitution.
pub fn parse_custom_path(
    path: Option<&str>,
    rewrite: &RewriteConfig,
) -> Result<String, ImageHandlerError> {
    let path = path.ok_or_else(|| {
        ImageHandlerError::configuration(PATH_UNDEFINED, "No request path was provided")
    })?;
    let pattern = rewrite.match_pattern.as_deref().ok_or_else(|| {
        ImageHandlerError::configuration(PATTERN_UNDEFINED, "REWRITE_MATCH_PATTERN is not set")
    })?;
    let substitution = rewrite.substitution.as_deref().ok_or_else(|| {
        ImageHandlerError::configuration(SUBSTITUTION_UNDEFINED, "REWRITE_SUBSTITUTION is not set")
    })?;

    let (source, flags) = split_pattern(pattern).ok_or_else(|| {
        ImageHandlerError::configuration(
            PATTERN_INVALID,
            format!("Expected /pattern/flags, got {}", pattern),
        )
    })?;

    let regex = RegexBuilder::new(source)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| ImageHandlerError::configuration(PATTERN_INVALID, e.to_string()))?;

    let replacement = to_regex_replacement(substitution);
    let rewritten = if flags.contains('g') {
        regex.replace_all(path, replacement.as_str())
    } else {
        regex.replace(path, replacement.as_str())
    };

    tracing::debug!(path = %path, rewritten = %rewritten, "Applied custom path rewrite");
    Ok(rewritten.into_owned())
}

/// Split `/source/flags` into its source and flags.
fn split_pattern(pattern: &str) -> Option<(&str, &str)> {
    let body = pattern.strip_prefix('/')?;
    let end = body.rfind('/')?;
    let flags = &body[end + 1..];
    if !flags.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((&body[..end], flags))
}

/// Translate `$1`, `$&` and `$$` references into the `regex` crate's `${n}` form.
fn to_regex_replacement(substitution: &str) -> String {
    let mut out = String::with_capacity(substitution.len());
    let mut chars = substitution.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    if group.len() == 2 {
                        break;
                    }
                    group.push(d);
                    chars.next();
                }
                out.push_str(&format!("${{{}}}", group));
            }
            _ => out.push_str("$$"),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::ErrorMetadata;

    fn rewrite(pattern: &str, substitution: &str) -> RewriteConfig {
        RewriteConfig {
            match_pattern: Some(pattern.to_string()),
            substitution: Some(substitution.to_string()),
        }
    }

    #[test]
    fn test_rewrites_with_global_flag() {
        let config = rewrite(r"/(filters-)/gm", "filters:");
        let result = parse_custom_path(
            Some("/filters-rotate(90)/filters-grayscale()/thumbor-image.jpg"),
            &config,
        )
        .unwrap();
        assert_eq!(result, "/filters:rotate(90)/filters:grayscale()/thumbor-image.jpg");
    }

    #[test]
    fn test_rewrites_first_match_without_global_flag() {
        let config = rewrite(r"/(filters-)/", "filters:");
        let result =
            parse_custom_path(Some("/filters-rotate(90)/filters-grayscale()/img.jpg"), &config)
                .unwrap();
        assert_eq!(result, "/filters:rotate(90)/filters-grayscale()/img.jpg");
    }

    #[test]
    fn test_group_references() {
        let config = rewrite(r"/^\/size-(\d+)\/(.*)$/", "/$1x$1/$2");
        let result = parse_custom_path(Some("/size-200/cat.jpg"), &config).unwrap();
        assert_eq!(result, "/200x200/cat.jpg");

        let config = rewrite(r"/CAT/i", "[$&]");
        assert_eq!(
            parse_custom_path(Some("/cat.jpg"), &config).unwrap(),
            "/[cat].jpg"
        );
    }

    #[test]
    fn test_missing_configuration() {
        let err = parse_custom_path(None, &rewrite("/a/", "b")).unwrap_err();
        assert_eq!(err.error_code(), PATH_UNDEFINED);

        let err = parse_custom_path(Some("/x"), &RewriteConfig::default()).unwrap_err();
        assert_eq!(err.error_code(), PATTERN_UNDEFINED);

        let config = RewriteConfig {
            match_pattern: Some("/a/".to_string()),
            substitution: None,
        };
        let err = parse_custom_path(Some("/x"), &config).unwrap_err();
        assert_eq!(err.error_code(), SUBSTITUTION_UNDEFINED);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = parse_custom_path(Some("/x"), &rewrite("no-slashes", "b")).unwrap_err();
        assert_eq!(err.error_code(), PATTERN_INVALID);

        let err = parse_custom_path(Some("/x"), &rewrite("/(unclosed/", "b")).unwrap_err();
        assert_eq!(err.error_code(), PATTERN_INVALID);
    }

    #[test]
    fn test_replacement_translation() {
        assert_eq!(to_regex_replacement("$1a"), "${1}a");
        assert_eq!(to_regex_replacement("$$"), "$$");
        assert_eq!(to_regex_replacement("cost $"), "cost $$");
        assert_eq!(to_regex_replacement("$12$3"), "${12}${3}");
    }
}
