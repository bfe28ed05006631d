//! Blob and container naming rules.
//!
//! Blob names follow the object-store rules: a restricted URL-safe alphabet, at most 1024 characters, at most
//! 63 path segments, and no segment (or the name itself) ending in `.` or `/`.
//! Container names follow the DNS-style rules: 3-63 lowercase alphanumerics
//! and single hyphens, starting and ending with an alphanumeric.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::defaults::{MAX_BLOB_NAME_LEN, MAX_BLOB_PATH_SEGMENTS, ZIP_CONTAINER_SUFFIX};

static BLOB_NAME_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9\-._~!$&'()*+,;=:@/]*$").expect("blob name pattern is valid")
});

static CONTAINER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9]|-[a-z0-9])*$").expect("container name pattern is valid")
});

/// Collect every rule a blob name violates. Empty means the name is legal.
pub fn blob_name_violations(name: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push("Blob name cannot be empty or whitespace.".to_string());
        return errors;
    }

    let len = name.chars().count();
    if len > MAX_BLOB_NAME_LEN {
        errors.push(format!(
            "Blob name must be between 1 and {} characters long.",
            MAX_BLOB_NAME_LEN
        ));
    }

    if !BLOB_NAME_CHARS.is_match(name) {
        errors.push(
            "Blob name contains invalid URL characters. Reserved URL characters must be properly escaped."
                .to_string(),
        );
    }

    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() > MAX_BLOB_PATH_SEGMENTS {
        errors.push(format!(
            "Blob name has too many path segments. Maximum allowed: {}.",
            MAX_BLOB_PATH_SEGMENTS
        ));
    }

    if segments.iter().any(|s| s.ends_with('.')) {
        errors.push("No path segments should end with a dot (.).".to_string());
    }

    if name.ends_with('.') || name.ends_with('/') {
        errors.push("Blob name cannot end with a dot (.) or forward slash (/).".to_string());
    }

    errors
}

/// Check a blob name, joining all violations into one message.
pub fn validate_blob_name(name: &str) -> std::result::Result<(), String> {
    let errors = blob_name_violations(name);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Check a container name.
pub fn validate_container_name(name: &str) -> std::result::Result<(), String> {
    if !(3..=63).contains(&name.len()) {
        return Err(format!(
            "Container name '{}' must be between 3 and 63 characters long.",
            name
        ));
    }
    if !CONTAINER_NAME.is_match(name) {
        return Err(format!(
            "Container name '{}' may only contain lowercase letters, digits, and single hyphens, and must start and end with a letter or digit.",
            name
        ));
    }
    Ok(())
}

/// Container holding a note's source attachments.
pub fn source_container_name(note_id: Uuid) -> String {
    note_id.as_hyphenated().to_string()
}

/// Container holding a note's generated zip archives.
pub fn zip_container_name(note_id: Uuid) -> String {
    format!("{}{}", note_id.as_hyphenated(), ZIP_CONTAINER_SUFFIX)
}

/// Fresh destination object name for a zip request (`<uuid>.zip`).
pub fn generate_zip_file_id() -> String {
    format!("{}.zip", Uuid::new_v4())
}
