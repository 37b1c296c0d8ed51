use crate::error::{ApiError, Result};

fn invalid(msg: String) -> ApiError {
    ApiError::Invalid(msg)
}

/// Validate a Kubernetes-style resource name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid("name must not be empty".to_string()));
    }
    if name.len() > 63 {
        return Err(invalid(format!(
            "name '{}' exceeds 63 characters (got {})",
            name,
            name.len()
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid(format!(
            "name '{}' must not start or end with a hyphen",
            name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(format!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        )));
    }
    Ok(())
}

/// Container names follow the engine's looser rule: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
pub fn validate_container_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => {
            return Err(invalid(format!(
                "container name '{}' must start with a letter or digit",
                name
            )));
        }
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(invalid(format!(
            "container name '{}' may only contain [a-zA-Z0-9_.-]",
            name
        )));
    }
    Ok(())
}

/// Image references must be non-empty and free of whitespace.
pub fn validate_image_reference(reference: &str) -> Result<()> {
    if reference.is_empty() || reference.chars().any(char::is_whitespace) {
        return Err(invalid(format!(
            "invalid image reference '{}'",
            reference
        )));
    }
    Ok(())
}
