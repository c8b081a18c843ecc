//! Contact settings form: turns user input into a `ContactUpdate`.

use thiserror::Error;

use crate::api::ContactUpdate;
use crate::models::UserDetails;
use crate::utils::{is_valid_email, is_valid_phone};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContactFormError {
    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Please enter a valid phone number")]
    InvalidPhone,

    #[error("Please provide at least one field to update")]
    NothingChanged,
}

/// Raw values typed into the settings form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactForm {
    pub new_email: String,
    pub new_phone: String,
}

impl ContactForm {
    /// Pre-fill with the profile's current values.
    pub fn from_details(details: &UserDetails) -> Self {
        Self {
            new_email: details.email.clone().unwrap_or_default(),
            new_phone: details.contact_phone().unwrap_or_default().to_string(),
        }
    }

    /// Build the update from the fields that differ from `current`.
    /// Every problem is reported, not just the first.
    pub fn validate(&self, current: &UserDetails) -> Result<ContactUpdate, Vec<ContactFormError>> {
        let email = changed(&self.new_email, current.email.as_deref());
        let phone = changed(&self.new_phone, current.contact_phone());

        let mut errors = Vec::new();
        if email.is_some_and(|e| !is_valid_email(e)) {
            errors.push(ContactFormError::InvalidEmail);
        }
        if phone.is_some_and(|p| !is_valid_phone(p)) {
            errors.push(ContactFormError::InvalidPhone);
        }
        if email.is_none() && phone.is_none() {
            errors.push(ContactFormError::NothingChanged);
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(ContactUpdate {
            new_email: email.map(str::to_string),
            new_phone: phone.map(str::to_string),
        })
    }
}

fn changed<'a>(value: &'a str, current: Option<&str>) -> Option<&'a str> {
    let value = value.trim();
    (!value.is_empty() && Some(value) != current).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> UserDetails {
        serde_json::from_str(r#"{"email":"a@b.com","phone":"9876543210"}"#).unwrap()
    }

    #[test]
    fn test_only_changed_fields_are_sent() {
        let form = ContactForm {
            new_email: "new@b.com".into(),
            new_phone: "9876543210".into(),
        };
        let update = form.validate(&details()).unwrap();
        assert_eq!(update.new_email.as_deref(), Some("new@b.com"));
        assert_eq!(update.new_phone, None);
    }

    #[test]
    fn test_unchanged_form_is_rejected() {
        let form = ContactForm::from_details(&details());
        assert_eq!(
            form.validate(&details()).unwrap_err(),
            vec![ContactFormError::NothingChanged]
        );
        assert_eq!(
            ContactForm::default().validate(&details()).unwrap_err(),
            vec![ContactFormError::NothingChanged]
        );
    }

    #[test]
    fn test_invalid_values_are_all_reported() {
        let form = ContactForm {
            new_email: "not-an-email".into(),
            new_phone: "01234".into(),
        };
        assert_eq!(
            form.validate(&details()).unwrap_err(),
            vec![ContactFormError::InvalidEmail, ContactFormError::InvalidPhone]
        );
    }

    #[test]
    fn test_prefill_falls_back_to_mobile_number() {
        let details: UserDetails =
            serde_json::from_str(r#"{"email":"a@b.com","mobile_number":"99"}"#).unwrap();
        assert_eq!(ContactForm::from_details(&details).new_phone, "99");
    }

    #[test]
    fn test_untouched_form_with_mobile_number_only() {
        let details: UserDetails =
            serde_json::from_str(r#"{"email":"a@b.com","mobile_number":"9876543210"}"#).unwrap();
        assert_eq!(
            ContactForm::from_details(&details).validate(&details).unwrap_err(),
            vec![ContactFormError::NothingChanged]
        );

        let form = ContactForm {
            new_email: String::new(),
            new_phone: "9123456780".into(),
        };
        let update = form.validate(&details).unwrap();
        assert_eq!(update.new_phone.as_deref(), Some("9123456780"));
    }
}
