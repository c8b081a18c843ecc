//! Multi-step registration wizard.
//!
//! The form is filled over five steps; each step must validate before the
//! wizard moves on. Submission goes through `SessionState::register`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default nationality preset on new forms
const DEFAULT_NATIONALITY: &str = "Indian";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Personal = 1,
    Contact = 2,
    Address = 3,
    Education = 4,
    Account = 5,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Personal,
        Step::Contact,
        Step::Address,
        Step::Education,
        Step::Account,
    ];

    pub fn number(&self) -> usize {
        *self as usize
    }

    pub fn title(&self) -> &'static str {
        match self {
            Step::Personal => "Personal Details",
            Step::Contact => "Contact Details",
            Step::Address => "Address Details",
            Step::Education => "Educational Details",
            Step::Account => "Account Setup",
        }
    }

    /// The following step; stays on the last one.
    pub fn next(&self) -> Self {
        match self {
            Step::Personal => Step::Contact,
            Step::Contact => Step::Address,
            Step::Address => Step::Education,
            Step::Education | Step::Account => Step::Account,
        }
    }

    /// The previous step; stays on the first one.
    pub fn prev(&self) -> Self {
        match self {
            Step::Personal | Step::Contact => Step::Personal,
            Step::Address => Step::Contact,
            Step::Education => Step::Address,
            Step::Account => Step::Education,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step {} ({})", self.number(), self.title())
    }
}

/// Fields that kept a step from validating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Incomplete information in {step}: {}", .fields.join(", "))]
pub struct MissingFields {
    pub step: Step,
    pub fields: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationForm {
    // Personal
    pub name: String,
    pub father_name: String,
    pub mother_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub category: String,
    pub nationality: String,

    // Contact
    pub email: String,
    pub phone: String,
    pub alternate_phone: String,

    // Address
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub district: String,

    // Education
    pub qualification: String,
    pub university: String,
    pub passing_year: String,
    pub percentage: String,

    // Account
    pub password: String,
    /// Checked locally, never sent.
    #[serde(skip_serializing)]
    pub confirm_password: String,
    pub agree_terms: bool,
    pub agree_privacy: bool,
}

impl Default for RegistrationForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            father_name: String::new(),
            mother_name: String::new(),
            date_of_birth: String::new(),
            gender: String::new(),
            category: String::new(),
            nationality: DEFAULT_NATIONALITY.to_string(),
            email: String::new(),
            phone: String::new(),
            alternate_phone: String::new(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            pincode: String::new(),
            district: String::new(),
            qualification: String::new(),
            university: String::new(),
            passing_year: String::new(),
            percentage: String::new(),
            password: String::new(),
            confirm_password: String::new(),
            agree_terms: false,
            agree_privacy: false,
        }
    }
}

impl RegistrationForm {
    /// Check the fields one step requires.
    pub fn validate_step(&self, step: Step) -> Result<(), MissingFields> {
        let mut fields = match step {
            Step::Personal => blank_fields(&[
                (&self.name, "name"),
                (&self.father_name, "fatherName"),
                (&self.date_of_birth, "dateOfBirth"),
                (&self.gender, "gender"),
                (&self.category, "category"),
            ]),
            Step::Contact => blank_fields(&[(&self.email, "email"), (&self.phone, "phone")]),
            Step::Address => blank_fields(&[
                (&self.address, "address"),
                (&self.city, "city"),
                (&self.state, "state"),
                (&self.pincode, "pincode"),
            ]),
            Step::Education => blank_fields(&[
                (&self.qualification, "qualification"),
                (&self.university, "university"),
                (&self.passing_year, "passingYear"),
            ]),
            Step::Account => {
                let mut fields = blank_fields(&[
                    (&self.password, "password"),
                    (&self.confirm_password, "confirmPassword"),
                ]);
                if !self.confirm_password.is_empty() && !self.passwords_match() {
                    fields.push("confirmPassword");
                }
                if !self.agree_terms {
                    fields.push("agreeTerms");
                }
                if !self.agree_privacy {
                    fields.push("agreePrivacy");
                }
                fields
            }
        };

        fields.dedup();
        if fields.is_empty() {
            Ok(())
        } else {
            Err(MissingFields { step, fields })
        }
    }

    /// Validate every step, reporting the first that fails.
    pub fn validate(&self) -> Result<(), MissingFields> {
        Step::ALL
            .iter()
            .try_for_each(|step| self.validate_step(*step))
    }

    pub fn passwords_match(&self) -> bool {
        self.password == self.confirm_password
    }

    #[cfg(test)]
    pub(crate) fn sample() -> Self {
        Self {
            name: "Asha Rao".into(),
            father_name: "Ravi Rao".into(),
            date_of_birth: "2000-01-15".into(),
            gender: "female".into(),
            category: "general".into(),
            email: "asha@example.com".into(),
            phone: "9876543210".into(),
            address: "12 MG Road".into(),
            city: "Pune".into(),
            state: "Maharashtra".into(),
            pincode: "411001".into(),
            qualification: "B.Sc".into(),
            university: "Pune University".into(),
            passing_year: "2021".into(),
            password: "s3cret!".into(),
            confirm_password: "s3cret!".into(),
            agree_terms: true,
            agree_privacy: true,
            ..Default::default()
        }
    }
}

fn blank_fields(pairs: &[(&String, &'static str)]) -> Vec<&'static str> {
    pairs
        .iter()
        .filter(|(value, _)| value.trim().is_empty())
        .map(|(_, name)| *name)
        .collect()
}

/// Walks the form step by step.
#[derive(Debug, Clone)]
pub struct RegistrationWizard {
    form: RegistrationForm,
    step: Step,
}

impl RegistrationWizard {
    pub fn new() -> Self {
        Self {
            form: RegistrationForm::default(),
            step: Step::Personal,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn form(&self) -> &RegistrationForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut RegistrationForm {
        &mut self.form
    }

    pub fn into_form(self) -> RegistrationForm {
        self.form
    }

    /// Advance if the current step validates; otherwise stay put.
    pub fn next(&mut self) -> Result<Step, MissingFields> {
        self.form.validate_step(self.step)?;
        self.step = self.step.next();
        Ok(self.step)
    }

    pub fn prev(&mut self) -> Step {
        self.step = self.step.prev();
        self.step
    }

    pub fn is_last_step(&self) -> bool {
        self.step == Step::Account
    }

    /// `(current, total)` for progress display.
    pub fn progress(&self) -> (usize, usize) {
        (self.step.number(), Step::ALL.len())
    }
}

impl Default for RegistrationWizard {
    fn default() -> Self {
        Self::new()
    }
}
