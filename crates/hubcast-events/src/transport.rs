//! Transport error classification shared by the runtime and its callers.

/// True for statuses that indicate a transient server-side condition and
/// self-heal on the next poll cycle.
pub fn is_transient_status(status: u16) -> bool {
    (500..600).contains(&status)
}

/// Truncates response bodies before they are embedded in error messages.
pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::{is_transient_status, truncate_for_error};

    #[test]
    fn unit_is_transient_status_covers_server_errors_only() {
        assert!(is_transient_status(500));
        assert!(is_transient_status(502));
        assert!(is_transient_status(503));
        assert!(!is_transient_status(404));
        assert!(!is_transient_status(422));
        assert!(!is_transient_status(200));
    }

    #[test]
    fn unit_truncate_for_error_is_char_boundary_safe() {
        assert_eq!(truncate_for_error("short", 10), "short");
        assert_eq!(truncate_for_error("abcdef", 3), "abc...");
        assert_eq!(truncate_for_error("héllo wörld", 4), "héll...");
    }
}
