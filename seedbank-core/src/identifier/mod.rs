//! Per-scheme syntax and check-digit validation for creator identifiers.
//!
//! ORCID and ISNI both carry an ISO 7064 mod-11-2 check digit over the 15
//! preceding digits; anything else is free text. Validators are resolved
//! through [`validator_for`] instead of a mutable global registry, so the
//! lifecycle operations receive them as plain values.

use crate::error::{Result, SeedbankError};
use crate::model::IdentifierScheme;

pub trait IdentifierValidator: Send + Sync {
    /// Syntax and check-digit validity.
    fn is_valid(&self, value: &str) -> bool;

    /// Canonical form of the identifier. Fails with `InvalidArgument` when
    /// the input does not match the scheme's pattern.
    fn normalize(&self, value: &str) -> Result<String>;
}

/// Resolve the validator for a scheme. FUND_REF identifiers have no
/// check-digit structure and fall back to the free-text rules.
pub fn validator_for(scheme: IdentifierScheme) -> &'static dyn IdentifierValidator {
    match scheme {
        IdentifierScheme::Orcid => &OrcidValidator,
        IdentifierScheme::Isni => &IsniValidator,
        IdentifierScheme::FundRef | IdentifierScheme::Other => &OtherValidator,
    }
}

/// ISO 7064 mod-11-2 check character over the decimal digits of `base`,
/// left to right. Returns `'X'` for a check value of 10.
fn mod_11_2_check_char(base: &str) -> char {
    let mut total: u64 = 0;
    for c in base.chars() {
        if let Some(digit) = c.to_digit(10) {
            total = (total + digit as u64) * 2;
        }
    }
    let check = (12 - total % 11) % 11;
    if check == 10 {
        'X'
    } else {
        char::from_digit(check as u32, 10).unwrap_or('0')
    }
}

pub struct OrcidValidator;

impl OrcidValidator {
    const CANONICAL_PREFIX: &'static str = "https://orcid.org/";

    /// Strips an optional `http(s)://orcid.org/` prefix and checks the
    /// `dddd-dddd-dddd-dddX` shape. Returns the 19-character body.
    fn parse_body(value: &str) -> Option<&str> {
        let body = value
            .strip_prefix("https://orcid.org/")
            .or_else(|| value.strip_prefix("http://orcid.org/"))
            .unwrap_or(value);

        if body.len() != 19 {
            return None;
        }

        for (i, c) in body.chars().enumerate() {
            match i {
                4 | 9 | 14 => {
                    if c != '-' {
                        return None;
                    }
                }
                18 => {
                    if !c.is_ascii_digit() && c != 'X' {
                        return None;
                    }
                }
                _ => {
                    if !c.is_ascii_digit() {
                        return None;
                    }
                }
            }
        }

        Some(body)
    }
}

impl IdentifierValidator for OrcidValidator {
    fn is_valid(&self, value: &str) -> bool {
        let Some(body) = Self::parse_body(value) else {
            return false;
        };

        let digits: String = body.chars().filter(|c| c.is_ascii_digit()).take(15).collect();
        let check = body.chars().last().unwrap_or('-');
        mod_11_2_check_char(&digits) == check
    }

    fn normalize(&self, value: &str) -> Result<String> {
        let body = Self::parse_body(value.trim()).ok_or_else(|| {
            SeedbankError::InvalidArgument(format!("not a valid ORCID: {}", value))
        })?;
        Ok(format!("{}{}", Self::CANONICAL_PREFIX, body))
    }
}

pub struct IsniValidator;

impl IsniValidator {
    /// 16-24 characters of digits, `X`, hyphens and spaces; the stripped
    /// form must be 15 digits plus a digit-or-X check character.
    fn stripped(value: &str) -> Option<String> {
        let trimmed = value.trim();
        if trimmed.len() < 16 || trimmed.len() > 24 {
            return None;
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || c == 'X' || c == '-' || c == ' ')
        {
            return None;
        }

        let stripped: String = trimmed.chars().filter(|c| *c != '-' && *c != ' ').collect();
        if stripped.len() != 16 {
            return None;
        }
        if !stripped[..15].chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let check = stripped.chars().last()?;
        if !check.is_ascii_digit() && check != 'X' {
            return None;
        }

        Some(stripped)
    }
}

impl IdentifierValidator for IsniValidator {
    fn is_valid(&self, value: &str) -> bool {
        let Some(stripped) = Self::stripped(value) else {
            return false;
        };
        let check = stripped.chars().last().unwrap_or('-');
        mod_11_2_check_char(&stripped[..15]) == check
    }

    fn normalize(&self, value: &str) -> Result<String> {
        Self::stripped(value).ok_or_else(|| {
            SeedbankError::InvalidArgument(format!("not a valid ISNI: {}", value))
        })
    }
}

pub struct OtherValidator;

impl IdentifierValidator for OtherValidator {
    fn is_valid(&self, value: &str) -> bool {
        !value.trim().is_empty()
    }

    fn normalize(&self, value: &str) -> Result<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SeedbankError::InvalidArgument(
                "identifier cannot be blank".to_string(),
            ));
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orcid_valid_check_digit() {
        let validator = validator_for(IdentifierScheme::Orcid);
        assert!(validator.is_valid("0000-0001-5473-3208"));
        assert!(validator.is_valid("https://orcid.org/0000-0001-5473-3208"));
        assert!(validator.is_valid("http://orcid.org/0000-0001-5473-3208"));
    }

    #[test]
    fn test_orcid_bad_check_digit() {
        let validator = validator_for(IdentifierScheme::Orcid);
        assert!(!validator.is_valid("0000-0001-5473-3206"));
    }

    #[test]
    fn test_orcid_requires_hyphens() {
        let validator = validator_for(IdentifierScheme::Orcid);
        assert!(!validator.is_valid("0000000154733208"));
    }

    #[test]
    fn test_orcid_normalize_canonical_prefix() {
        let validator = validator_for(IdentifierScheme::Orcid);
        assert_eq!(
            validator.normalize("0000-0001-5473-3208").unwrap(),
            "https://orcid.org/0000-0001-5473-3208"
        );
        assert_eq!(
            validator
                .normalize("http://orcid.org/0000-0001-5473-3208")
                .unwrap(),
            "https://orcid.org/0000-0001-5473-3208"
        );
        assert!(validator.normalize("not-an-orcid").is_err());
    }

    #[test]
    fn test_orcid_x_check_character() {
        // 0000-0002-1694-233X is a published ORCID whose check char is X.
        let validator = validator_for(IdentifierScheme::Orcid);
        assert!(validator.is_valid("0000-0002-1694-233X"));
    }

    #[test]
    fn test_isni_normalize_strips_whitespace() {
        let validator = validator_for(IdentifierScheme::Isni);
        assert!(validator.is_valid("  000000007359228X  "));
        assert_eq!(
            validator.normalize("  000000007359228X  ").unwrap(),
            "000000007359228X"
        );
    }

    #[test]
    fn test_isni_hyphenated_form() {
        let validator = validator_for(IdentifierScheme::Isni);
        assert!(validator.is_valid("0000-0000-7359-228X"));
        assert_eq!(
            validator.normalize("0000-0000-7359-228X").unwrap(),
            "000000007359228X"
        );
    }

    #[test]
    fn test_isni_bad_check_digit() {
        let validator = validator_for(IdentifierScheme::Isni);
        assert!(!validator.is_valid("0000000073592281"));
    }

    #[test]
    fn test_other_accepts_non_blank() {
        let validator = validator_for(IdentifierScheme::Other);
        assert!(validator.is_valid("urn:lsid:example.org:names:1"));
        assert!(!validator.is_valid("   "));
        assert_eq!(validator.normalize("  x-1  ").unwrap(), "x-1");
        assert!(validator.normalize("   ").is_err());
    }

    #[test]
    fn test_fund_ref_uses_free_text_rules() {
        let validator = validator_for(IdentifierScheme::FundRef);
        assert!(validator.is_valid("501100000780"));
    }

    #[test]
    fn test_mod_11_2_known_values() {
        assert_eq!(mod_11_2_check_char("000000015473320"), '8');
        assert_eq!(mod_11_2_check_char("000000007359228"), 'X');
    }
}
