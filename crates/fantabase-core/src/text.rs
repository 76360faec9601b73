/// Trim `value`, returning `None` when nothing is left.
pub fn trimmed_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Same as [`trimmed_non_empty`] for optional input (absent storage values,
/// missing JSON fields).
pub fn trimmed_opt(value: Option<&str>) -> Option<String> {
    value.and_then(trimmed_non_empty)
}
