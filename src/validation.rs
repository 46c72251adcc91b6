//! Lead qualification — local checks run before contact details are sent.
//!
//! Quality gate, not a security boundary:
//! - email: syntax → disposable-provider deny-list → suspicious domain tokens
//! - phone: optional; normalized, length-bounded, placeholder numbers rejected
//!
//! The first failing check wins and the others are not evaluated.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::client::LeadCaptureRequest;
use crate::error::{FieldError, ValidationError};

/// Known disposable-mail providers, matched against the whole domain.
pub const DISPOSABLE_EMAIL_DOMAINS: &[&str] = &[
    "tempmail.com",
    "temp-mail.org",
    "guerrillamail.com",
    "mailinator.com",
    "10minutemail.com",
    "throwaway.email",
    "yopmail.com",
    "getnada.com",
    "maildrop.cc",
    "trashmail.com",
    "fakeinbox.com",
    "tempr.email",
    "mohmal.com",
    "dispostable.com",
    "emailondeck.com",
    "temp-mail.io",
    "guerrillamailblock.com",
    "sharklasers.com",
    "grr.la",
    "spam4.me",
    "getairmail.com",
    "emailtemporanea.net",
    "mytemp.email",
    "tmpnator.live",
    "tempinbox.com",
    "mintemail.com",
    "jetable.org",
    "mailnesia.com",
    "anonymbox.com",
    "binkmail.com",
    "bobmail.info",
    "dropmail.me",
    "fakemail.net",
    "imgof.com",
    "moakt.com",
    "tmail.com",
];

/// Tokens that mark a domain as throwaway wherever they appear in it.
pub const SUSPICIOUS_DOMAIN_TOKENS: &[&str] =
    &["temp", "fake", "trash", "disposable", "throwaway", "spam"];

/// Digit strings that are obviously typed to get past the form.
const SEQUENTIAL_PLACEHOLDERS: &[&str] = &["1234567890", "0987654321"];

const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;

const TEMPORARY_EMAIL_MESSAGE: &str =
    "Temporary email addresses are not allowed. Please use your professional or personal email.";

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// Why an email address was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailRejection {
    InvalidFormat,
    /// Domain is on the disposable-provider deny-list.
    DisposableDomain { domain: String },
    /// Domain contains a suspicious token.
    SuspiciousDomain { domain: String, token: &'static str },
}

impl std::fmt::Display for EmailRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "Invalid email format"),
            Self::DisposableDomain { .. } | Self::SuspiciousDomain { .. } => {
                write!(f, "{TEMPORARY_EMAIL_MESSAGE}")
            }
        }
    }
}

/// Why a phone number was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneRejection {
    InvalidCharacters,
    InvalidLength { digits: usize },
    Placeholder,
}

impl std::fmt::Display for PhoneRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCharacters => write!(
                f,
                "Phone number can only contain digits, spaces, dashes, and parentheses"
            ),
            Self::InvalidLength { .. } => write!(
                f,
                "Phone number must be between {MIN_PHONE_DIGITS} and {MAX_PHONE_DIGITS} digits"
            ),
            Self::Placeholder => write!(f, "Please provide a valid phone number"),
        }
    }
}

/// Check an email address.
pub fn validate_email(email: &str) -> Result<(), EmailRejection> {
    let email = email.trim();
    if !EMAIL_PATTERN.is_match(email) {
        return Err(EmailRejection::InvalidFormat);
    }

    let domain = email
        .rsplit_once('@')
        .map(|(_, d)| d.to_lowercase())
        .unwrap_or_default();

    if DISPOSABLE_EMAIL_DOMAINS.contains(&domain.as_str()) {
        debug!(domain = %domain, "Rejected disposable email domain");
        return Err(EmailRejection::DisposableDomain { domain });
    }

    if let Some(token) = SUSPICIOUS_DOMAIN_TOKENS
        .iter()
        .copied()
        .find(|t| domain.contains(t))
    {
        debug!(domain = %domain, token, "Rejected suspicious email domain");
        return Err(EmailRejection::SuspiciousDomain { domain, token });
    }

    Ok(())
}

/// Check an optional phone number. Blank input is always accepted.
pub fn validate_phone(phone: &str) -> Result<(), PhoneRejection> {
    if phone.trim().is_empty() {
        return Ok(());
    }

    let cleaned = strip_phone_formatting(phone);
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PhoneRejection::InvalidCharacters);
    }

    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return Err(PhoneRejection::InvalidLength {
            digits: digits.len(),
        });
    }

    if is_placeholder(digits) {
        return Err(PhoneRejection::Placeholder);
    }

    Ok(())
}

/// Render a phone number for display.
///
/// Ten digits become `(123) 456-7890`, a `+` followed by eleven digits
/// becomes `+1 (234) 567-8901`; anything else is returned unchanged.
pub fn format_phone_number(phone: &str) -> String {
    let cleaned = strip_phone_formatting(phone);

    if cleaned.len() == 10 && cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return format!("({}) {}-{}", &cleaned[..3], &cleaned[3..6], &cleaned[6..]);
    }

    if cleaned.len() == 12
        && cleaned.starts_with('+')
        && cleaned[1..].bytes().all(|b| b.is_ascii_digit())
    {
        return format!(
            "+{} ({}) {}-{}",
            &cleaned[1..2],
            &cleaned[2..5],
            &cleaned[5..8],
            &cleaned[8..]
        );
    }

    phone.to_string()
}

/// Validate the lead form and build the request to send.
///
/// Every field is checked so the caller can show all problems at once.
pub fn validate_lead(
    session_id: &str,
    name: &str,
    email: &str,
    phone: Option<&str>,
) -> Result<LeadCaptureRequest, ValidationError> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push(field_error("name", "Name is required"));
    }

    if email.trim().is_empty() {
        errors.push(field_error("email", "Email is required"));
    } else if let Err(rejection) = validate_email(email) {
        errors.push(field_error("email", rejection.to_string()));
    }

    let phone = phone.map(str::trim).filter(|p| !p.is_empty());
    if let Some(p) = phone {
        if let Err(rejection) = validate_phone(p) {
            errors.push(field_error("phone", rejection.to_string()));
        }
    }

    if !errors.is_empty() {
        return Err(ValidationError { errors });
    }

    Ok(LeadCaptureRequest {
        session_id: session_id.to_string(),
        name: name.trim().to_string(),
        email: email.trim().to_string(),
        phone: phone.map(String::from),
    })
}

fn strip_phone_formatting(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect()
}

fn is_placeholder(digits: &str) -> bool {
    let first = digits.as_bytes()[0];
    digits.bytes().all(|b| b == first) || SEQUENTIAL_PLACEHOLDERS.contains(&digits)
}

fn field_error(field: &str, message: impl Into<String>) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_accepts_common_provider() {
        assert!(validate_email("user@gmail.com").is_ok());
        assert!(validate_email("  founder@startup.io ").is_ok());
    }

    #[test]
    fn email_rejects_bad_syntax() {
        for bad in ["", "user", "user@", "user@domain", "us er@gmail.com", "a@b@c.com"] {
            assert_eq!(
                validate_email(bad),
                Err(EmailRejection::InvalidFormat),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn email_rejects_deny_listed_domain() {
        let err = validate_email("user@mailinator.com").unwrap_err();
        assert_eq!(
            err,
            EmailRejection::DisposableDomain {
                domain: "mailinator.com".into()
            }
        );
        assert!(err.to_string().contains("Temporary email"));
    }

    #[test]
    fn email_domain_match_is_case_insensitive() {
        assert!(matches!(
            validate_email("User@YOPMAIL.com"),
            Err(EmailRejection::DisposableDomain { .. })
        ));
    }

    #[test]
    fn email_rejects_suspicious_token() {
        let err = validate_email("user@my-temp-mail.io").unwrap_err();
        assert_eq!(
            err,
            EmailRejection::SuspiciousDomain {
                domain: "my-temp-mail.io".into(),
                token: "temp"
            }
        );
        assert!(matches!(
            validate_email("a@spamcatcher.net"),
            Err(EmailRejection::SuspiciousDomain { token: "spam", .. })
        ));
    }

    #[test]
    fn deny_list_checked_before_tokens() {
        // tempmail.com is both deny-listed and contains "temp".
        assert!(matches!(
            validate_email("x@tempmail.com"),
            Err(EmailRejection::DisposableDomain { .. })
        ));
    }

    #[test]
    fn phone_optional() {
        assert!(validate_phone("").is_ok());
        assert!(validate_phone("   ").is_ok());
    }

    #[test]
    fn phone_accepts_international_and_formatted() {
        assert!(validate_phone("+14155552671").is_ok());
        assert!(validate_phone("(415) 555-2671").is_ok());
        assert!(validate_phone("+44 20 7946 0958").is_ok());
    }

    #[test]
    fn phone_rejects_sequential() {
        assert_eq!(validate_phone("1234567890"), Err(PhoneRejection::Placeholder));
        assert_eq!(validate_phone("098-765-4321"), Err(PhoneRejection::Placeholder));
    }

    #[test]
    fn phone_rejects_repeated_digit() {
        assert_eq!(validate_phone("1111111111"), Err(PhoneRejection::Placeholder));
        assert_eq!(validate_phone("000 000 0000"), Err(PhoneRejection::Placeholder));
        assert_eq!(validate_phone("+5555555555"), Err(PhoneRejection::Placeholder));
    }

    #[test]
    fn phone_rejects_bad_length() {
        assert_eq!(
            validate_phone("123"),
            Err(PhoneRejection::InvalidLength { digits: 3 })
        );
        assert_eq!(
            validate_phone("1234567890123456"),
            Err(PhoneRejection::InvalidLength { digits: 16 })
        );
    }

    #[test]
    fn phone_rejects_letters_and_extra_plus() {
        assert_eq!(
            validate_phone("415-555-CALL"),
            Err(PhoneRejection::InvalidCharacters)
        );
        assert_eq!(
            validate_phone("+1+4155552671"),
            Err(PhoneRejection::InvalidCharacters)
        );
        assert_eq!(validate_phone("+"), Err(PhoneRejection::InvalidCharacters));
    }

    #[test]
    fn format_phone() {
        assert_eq!(format_phone_number("4155552671"), "(415) 555-2671");
        assert_eq!(format_phone_number("+1 415 555 2671"), "+1 (415) 555-2671");
        assert_eq!(format_phone_number("+44 20 7946 0958"), "+44 20 7946 0958");
        assert_eq!(format_phone_number("12345"), "12345");
    }

    #[test]
    fn lead_collects_every_field_error() {
        let err = validate_lead("s-1", " ", "user@trashbox.org", Some("123")).unwrap_err();
        assert_eq!(err.errors.len(), 3);
        assert_eq!(err.for_field("name"), Some("Name is required"));
        assert!(err.for_field("email").unwrap().contains("Temporary email"));
        assert!(err.for_field("phone").unwrap().contains("between 10 and 15"));
    }

    #[test]
    fn lead_requires_email() {
        let err = validate_lead("s-1", "Ada", "", None).unwrap_err();
        assert_eq!(err.for_field("email"), Some("Email is required"));
    }

    #[test]
    fn lead_builds_request() {
        let req = validate_lead("s-1", " Ada ", "ada@example.com", Some("  ")).unwrap();
        assert_eq!(req.session_id, "s-1");
        assert_eq!(req.name, "Ada");
        assert_eq!(req.email, "ada@example.com");
        assert!(req.phone.is_none());

        let req = validate_lead("s-1", "Ada", "ada@example.com", Some("+14155552671")).unwrap();
        assert_eq!(req.phone.as_deref(), Some("+14155552671"));
    }
}
