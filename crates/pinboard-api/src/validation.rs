//! Input validators for the HTTP edge. Each one enumerates exactly what it
//! accepts.

pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 2..=42;
pub const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 8..=30;
pub const NAME_MAX_LEN: usize = 42;
pub const TITLE_MAX_LEN: usize = 100;
const EMAIL_MAX_LEN: usize = 254;
const PATH_MAX_LEN: usize = 1024;
const EMAIL_SPECIALS: &[char] = &['(', ')', ',', ':', ';', '<', '>', '[', ']', '\\', '"'];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("username must be {min}-{max} characters", min = USERNAME_LEN.start(), max = USERNAME_LEN.end())]
    UsernameLength,
    #[error("username must start with a letter")]
    UsernameStart,
    #[error("username may only contain letters, digits and underscores")]
    UsernameCharset,
    #[error("password must be {min}-{max} characters", min = PASSWORD_LEN.start(), max = PASSWORD_LEN.end())]
    PasswordLength,
    #[error("invalid email address")]
    Email,
    #[error("{0} must be at most {max} letters or spaces", max = NAME_MAX_LEN)]
    Name(&'static str),
    #[error("invalid {0} path")]
    Path(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("title must be at most {max} characters", max = TITLE_MAX_LEN)]
    TitleLength,
}

pub fn username(value: &str) -> Result<(), ValidationError> {
    if !USERNAME_LEN.contains(&value.chars().count()) {
        return Err(ValidationError::UsernameLength);
    }
    if !value.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(ValidationError::UsernameStart);
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::UsernameCharset);
    }
    Ok(())
}

pub fn password(value: &str) -> Result<(), ValidationError> {
    if PASSWORD_LEN.contains(&value.chars().count()) {
        Ok(())
    } else {
        Err(ValidationError::PasswordLength)
    }
}

/// `local@domain.tld`: a non-empty local part of printable non-space
/// characters, and a dotted domain of alphanumeric/hyphen labels.
pub fn email(value: &str) -> Result<(), ValidationError> {
    if value.len() > EMAIL_MAX_LEN {
        return Err(ValidationError::Email);
    }
    let Some((local, domain)) = value.split_once('@') else {
        return Err(ValidationError::Email);
    };

    let local_ok = !local.is_empty()
        && !local.starts_with('.')
        && !local.ends_with('.')
        && local
            .chars()
            .all(|c| c.is_ascii_graphic() && !EMAIL_SPECIALS.contains(&c));

    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        && labels
            .last()
            .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));

    if local_ok && domain_ok {
        Ok(())
    } else {
        Err(ValidationError::Email)
    }
}

/// First or last name. Empty is allowed.
pub fn name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let ok = value.chars().count() <= NAME_MAX_LEN
        && value.chars().all(|c| c.is_alphabetic() || c == ' ');
    if ok {
        Ok(())
    } else {
        Err(ValidationError::Name(field))
    }
}

/// Unix-style path: `/`-separated, no NUL bytes, no backslashes, no `..`.
pub fn unix_path(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let ok = !value.is_empty()
        && value.len() <= PATH_MAX_LEN
        && !value.contains(['\0', '\\'])
        && !value.chars().any(char::is_control)
        && value.split('/').all(|part| part != "..");
    if ok {
        Ok(())
    } else {
        Err(ValidationError::Path(field))
    }
}

pub fn non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty(field))
    } else {
        Ok(())
    }
}

pub fn title(value: &str) -> Result<(), ValidationError> {
    non_empty("title", value)?;
    if value.chars().count() > TITLE_MAX_LEN {
        return Err(ValidationError::TitleLength);
    }
    Ok(())
}
