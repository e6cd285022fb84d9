//! Helper functions for transcription module

/// Join a path onto a base URL path without doubling slashes
pub(super) fn join_path(base_path: &str, suffix: &str) -> String {
    format!(
        "{}/{}",
        base_path.trim_end_matches('/'),
        suffix.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "api/transcribe"), "/api/transcribe");
        assert_eq!(join_path("/proxy/", "/api/transcribe"), "/proxy/api/transcribe");
        assert_eq!(join_path("", "api"), "/api");
    }
}
