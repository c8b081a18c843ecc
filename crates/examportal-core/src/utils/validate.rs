//! Input checks shared by the settings and registration forms.

/// Longest phone number accepted, excluding the leading `+`
const MAX_PHONE_DIGITS: usize = 16;

/// `local@domain.tld`: one `@`, no whitespace, a dot inside the domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .match_indices('.')
        .any(|(i, _)| i > 0 && i + 1 < domain.len())
}

/// Optional `+`, then up to 16 digits not starting with 0. Spaces are ignored.
pub fn is_valid_phone(phone: &str) -> bool {
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    !digits.is_empty()
        && digits.len() <= MAX_PHONE_DIGITS
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}
