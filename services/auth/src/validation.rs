//! Input validation for registration and password changes

use regex::Regex;
use std::sync::OnceLock;

/// Characters that count as "special" in a password
const PASSWORD_SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Validate display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let length = name.trim().chars().count();

    if length == 0 {
        return Err("Name is required".to_string());
    }

    if length < 2 {
        return Err("Name must be at least 2 characters long".to_string());
    }

    if length > 50 {
        return Err("Name cannot exceed 50 characters".to_string());
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();

    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    let mut has_upper = false;
    let mut has_digit = false;
    let mut has_special = false;

    for c in password.chars() {
        if c.is_ascii_uppercase() {
            has_upper = true;
        } else if c.is_ascii_digit() {
            has_digit = true;
        } else if PASSWORD_SPECIALS.contains(c) {
            has_special = true;
        }
    }

    if !has_upper {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !has_digit {
        return Err("Password must contain at least one number".to_string());
    }

    if !has_special {
        return Err("Password must contain at least one special character".to_string());
    }

    Ok(())
}

/// Validate a Bangladesh mobile number, `+8801XXXXXXXXX` or `01XXXXXXXXX`
pub fn validate_phone(phone: &str) -> Result<(), String> {
    static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PHONE_REGEX.get_or_init(|| {
        Regex::new(r"^(?:\+8801\d{9}|01\d{9})$").expect("Failed to compile phone regex")
    });

    if !regex.is_match(phone) {
        return Err(
            "Phone number must be valid for Bangladesh (e.g., +8801XXXXXXXXX or 01XXXXXXXXX)"
                .to_string(),
        );
    }

    Ok(())
}
