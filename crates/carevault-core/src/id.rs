// Logical id handling
use crate::error::{CoreError, Result};

const MAX_ID_LEN: usize = 64;

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validate a logical id: 1-64 chars of `[A-Za-z0-9\-.]`.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(CoreError::invalid_id(format!("'{id}' must be 1-{MAX_ID_LEN} characters")));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(CoreError::invalid_id(format!("'{id}' contains invalid characters")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(validate_id(&a).is_ok());
    }

    #[test]
    fn test_validate_id_rejects_bad_input() {
        assert!(validate_id("").is_err());
        assert!(validate_id("has space").is_err());
        assert!(validate_id("slash/id").is_err());
        assert!(validate_id(&"x".repeat(65)).is_err());
        assert!(validate_id("abc-123.v2").is_ok());
    }
}
