//! Line-based terminal input.

use std::io::{self, Write};

use anyhow::Result;

/// Read one trimmed line after printing `label`.
pub fn line(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Like [`line`], but an empty answer keeps `current`.
pub fn line_with_default(label: &str, current: &str) -> Result<String> {
    if current.is_empty() {
        return line(label);
    }
    let input = line(&format!("{} [{}]", label, current))?;
    Ok(if input.is_empty() {
        current.to_string()
    } else {
        input
    })
}

pub fn password(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(format!("{}: ", label))?)
}

/// Yes/no question; `default` is used for an empty answer.
pub fn confirm(label: &str, default: bool) -> Result<bool> {
    let hint = if default { "Y/n" } else { "y/N" };
    let input = line(&format!("{} [{}]", label, hint))?.to_lowercase();
    Ok(match input.as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    })
}
