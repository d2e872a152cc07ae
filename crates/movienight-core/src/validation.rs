//! Input validation shared by the use-cases.

use crate::error::AppError;

/// Minimum password length accepted at registration.
/// Matches the lower bound enforced by the hosted auth provider.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum length of a group name
const MAX_GROUP_NAME_LENGTH: usize = 60;

pub fn validate_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return Err(AppError::validation(format!("Invalid email address: {}", email))),
    };

    let domain_ok = domain.contains('.') && domain.split('.').all(|label| !label.is_empty());

    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(AppError::validation(format!("Invalid email address: {}", email)));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_group_name(name: &str) -> Result<(), AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Group name cannot be empty"));
    }
    if name.chars().count() > MAX_GROUP_NAME_LENGTH {
        return Err(AppError::validation(format!(
            "Group name cannot exceed {} characters",
            MAX_GROUP_NAME_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_user_id(user_id: &str) -> Result<(), AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::validation("User id cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email(" ana@mail.example.org ").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("ana").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ana@example").is_err());
        assert!(validate_email("ana@example.").is_err());
        assert!(validate_email("ana@@example.com").is_err());
        assert!(validate_email("a na@example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        let err = validate_password("short").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_validate_group_name() {
        assert!(validate_group_name("Movie Nights").is_ok());
        assert!(validate_group_name("   ").is_err());
        assert!(validate_group_name(&"x".repeat(61)).is_err());
    }
}
