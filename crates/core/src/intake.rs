//! Lead intake rules.
//!
//! `validate` is pure and reports the first rule a form violates, in the order the
//! fields appear on the form: region, name, email, phone, consent.

use crate::domain::lead::{LeadFields, LeadSubmission};
use crate::domain::region::{region_profile, RegionProfile};
use crate::errors::ValidationError;

const MIN_PHONE_DIGITS: usize = 6;
const MAX_PHONE_DIGITS: usize = 15;

pub fn validate(fields: &LeadFields) -> Result<(), ValidationError> {
    let region = validate_region(&fields.region)?;

    if fields.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }

    validate_email(&fields.email)?;
    validate_phone(region, &fields.phone)?;

    if !fields.consent {
        return Err(ValidationError::ConsentRequired);
    }

    Ok(())
}

/// Validates and composes the request body in one step, so a body is never built
/// from fields that did not pass every rule.
pub fn prepare_submission(fields: &LeadFields) -> Result<LeadSubmission, ValidationError> {
    validate(fields)?;
    let region = validate_region(&fields.region)?;
    Ok(LeadSubmission::compose(fields, region))
}

fn validate_region(raw: &str) -> Result<&'static RegionProfile, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::MissingRegion);
    }
    region_profile(raw).ok_or_else(|| ValidationError::UnsupportedRegion(raw.trim().to_string()))
}

fn validate_email(raw: &str) -> Result<(), ValidationError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };
    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }

    let Some((host, tld)) = domain.rsplit_once('.') else {
        return Err(ValidationError::InvalidEmail);
    };
    if host.is_empty() || tld.is_empty() || host.split('.').any(str::is_empty) {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(())
}

fn validate_phone(region: &RegionProfile, raw: &str) -> Result<(), ValidationError> {
    let local = region.local_number(raw);
    if local.is_empty() {
        return Err(ValidationError::MissingPhone);
    }
    if !local.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::PhoneNotNumeric);
    }

    let digits = local.len();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        return Err(ValidationError::PhoneLength { digits });
    }

    Ok(())
}
