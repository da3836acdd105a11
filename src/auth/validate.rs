//! Client-side form checks. A failure here never reaches the network.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::errors::{LabError, Result};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const OTP_LEN: usize = 6;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

pub fn required(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LabError::validation(field, "is required"));
    }
    Ok(())
}

pub fn email(value: &str) -> Result<()> {
    required("email", value)?;
    let value = value.trim();
    let valid = email_pattern().map_or_else(|| value.contains('@'), |re| re.is_match(value));
    if valid {
        Ok(())
    } else {
        Err(LabError::validation("email", format!("{value:?} is not an email address")))
    }
}

pub fn password(field: &'static str, value: &str) -> Result<()> {
    required(field, value)?;
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(LabError::validation(
            field,
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

pub fn confirmation(password: &str, confirm: &str) -> Result<()> {
    if password == confirm {
        Ok(())
    } else {
        Err(LabError::validation("confirmation", "passwords do not match"))
    }
}

/// Six ASCII digits.
pub fn otp(value: &str) -> Result<()> {
    let value = value.trim();
    if value.len() == OTP_LEN && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(LabError::validation("code", format!("must be {OTP_LEN} digits")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(email("ada@lab.example.edu").is_ok());
        assert!(email(" ada@lab.io ").is_ok());
        assert!(email("ada@lab").is_err());
        assert!(email("ada lab@x.io").is_err());
        assert_eq!(email("").unwrap_err().code(), "LAB-2001");
    }

    #[test]
    fn passwords() {
        assert!(password("password", "12345678").is_ok());
        let err = password("password", "short").unwrap_err();
        assert!(err.to_string().contains("at least 8"));
        assert!(confirmation("abcdefgh", "abcdefgh").is_ok());
        assert!(confirmation("abcdefgh", "abcdefgH").is_err());
    }

    #[test]
    fn otp_codes() {
        assert!(otp("012345").is_ok());
        assert!(otp(" 987654 ").is_ok());
        assert!(otp("12345").is_err());
        assert!(otp("12a456").is_err());
        assert!(otp("١٢٣٤٥٦").is_err());
    }
}
