pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Reduce a caller-supplied name to its final path component.
///
/// Both `/` and `\` count as separators. Returns `None` when nothing usable
/// remains (empty, `.` or `..`).
pub fn safe_file_name(name: &str) -> Option<String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "." | ".." => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{safe_file_name, truncate};

    #[test]
    fn test_truncate_unicode_safe() {
        let input = "ééééé";
        assert_eq!(truncate(input, 4), "é...");
    }

    #[test]
    fn test_truncate_small_max() {
        let input = "こんにちは";
        assert_eq!(truncate(input, 3), "こんに");
        assert_eq!(truncate(input, 0), "");
    }

    #[test]
    fn test_safe_file_name_strips_directories() {
        assert_eq!(safe_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(safe_file_name("..\\evil.bat").as_deref(), Some("evil.bat"));
        assert_eq!(safe_file_name("/abs/index.html").as_deref(), Some("index.html"));
        assert_eq!(safe_file_name("styles.css").as_deref(), Some("styles.css"));
    }

    #[test]
    fn test_safe_file_name_rejects_empty_results() {
        assert_eq!(safe_file_name(""), None);
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name("dir/"), None);
    }
}
