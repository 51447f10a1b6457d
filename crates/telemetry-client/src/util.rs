// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Validation helpers shared by the configuration and the line formatter.

/// Parses and validates a metric namespace.
///
/// A valid namespace must:
/// - Start with an ASCII letter
/// - Contain only ASCII alphanumerics, underscores, or periods
/// - Not be empty or contain only whitespace
///
/// Whitespace is automatically trimmed from the input.
///
/// # Examples
///
/// ```
/// use telemetry_client::util::parse_metric_namespace;
///
/// assert_eq!(parse_metric_namespace("myapp"), Some("myapp".to_string()));
/// assert_eq!(parse_metric_namespace("my_app.metrics"), Some("my_app.metrics".to_string()));
/// assert_eq!(parse_metric_namespace("1invalid"), None);
/// assert_eq!(parse_metric_namespace("my-app"), None);
/// ```
pub fn parse_metric_namespace(namespace: &str) -> Option<String> {
    let trimmed = namespace.trim();
    let mut chars = trimmed.chars();

    match chars.next() {
        Some(first_char) if first_char.is_ascii_alphabetic() => {}
        _ => return None,
    }

    if chars.any(|ch| !ch.is_ascii_alphanumeric() && ch != '_' && ch != '.') {
        return None;
    }

    Some(trimmed.to_string())
}

/// Returns true when `token` can be embedded in a line without breaking its framing.
///
/// Lines are split on newlines, fields on spaces and tags on `,` and `=`, so none of
/// those may appear inside a name, tag key or tag value.
pub fn is_line_safe(token: &str) -> bool {
    !token.is_empty()
        && !token
            .chars()
            .any(|ch| ch.is_whitespace() || ch == ',' || ch == '=')
}

/// Aggregation function names end up in request paths, so they are kept to a
/// conservative character set. Names made only of dots would be read as `.` or `..`
/// path segments and are refused.
pub fn is_valid_aggregation_function(function: &str) -> bool {
    !function.is_empty()
        && !function.chars().all(|ch| ch == '.')
        && function
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric_namespace_valid() {
        assert_eq!(parse_metric_namespace("myapp"), Some("myapp".to_string()));
        assert_eq!(parse_metric_namespace("my_app"), Some("my_app".to_string()));
        assert_eq!(parse_metric_namespace("my.app"), Some("my.app".to_string()));
        assert_eq!(
            parse_metric_namespace("a1.b2_c3"),
            Some("a1.b2_c3".to_string())
        );
    }

    #[test]
    fn test_parse_metric_namespace_with_whitespace() {
        assert_eq!(
            parse_metric_namespace("  application  "),
            Some("application".to_string())
        );
    }

    #[test]
    fn test_parse_metric_namespace_invalid() {
        assert_eq!(parse_metric_namespace(""), None);
        assert_eq!(parse_metric_namespace("   "), None);
        assert_eq!(parse_metric_namespace("1myapp"), None);
        assert_eq!(parse_metric_namespace(".myapp"), None);
        assert_eq!(parse_metric_namespace("my-app"), None);
        assert_eq!(parse_metric_namespace("my app"), None);
    }

    #[test]
    fn test_is_line_safe() {
        assert!(is_line_safe("requests"));
        assert!(is_line_safe("http.requests-total"));
        assert!(!is_line_safe(""));
        assert!(!is_line_safe("a b"));
        assert!(!is_line_safe("a,b"));
        assert!(!is_line_safe("a=b"));
        assert!(!is_line_safe("a\nb"));
    }

    #[test]
    fn test_is_valid_aggregation_function() {
        assert!(is_valid_aggregation_function("avg"));
        assert!(is_valid_aggregation_function("p99.9"));
        assert!(!is_valid_aggregation_function(""));
        assert!(!is_valid_aggregation_function("../sum"));
        assert!(!is_valid_aggregation_function("sum avg"));
        assert!(!is_valid_aggregation_function("."));
        assert!(!is_valid_aggregation_function(".."));
        assert!(!is_valid_aggregation_function("..."));
    }
}
