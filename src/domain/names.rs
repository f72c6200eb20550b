//! Bus naming rules.
//!
//! Object paths, interface names, member names and bus names follow the
//! conventional message-bus grammar. Each validator returns
//! [`BusError::InvalidName`] naming the offending value.

use crate::error::BusError;

/// Names longer than this are rejected.
pub const MAX_NAME_LEN: usize = 255;

fn invalid(kind: &'static str, name: &str) -> BusError {
    BusError::InvalidName {
        kind,
        name: name.to_string(),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn starts_with_digit(element: &str) -> bool {
    element.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Validates an object path such as `/com/example/obj`.
///
/// # Errors
///
/// Returns [`BusError::InvalidName`] if the path does not start with `/`,
/// ends with `/` (other than the root path), contains an empty element or
/// contains characters outside `[A-Za-z0-9_]`.
pub fn validate_object_path(path: &str) -> Result<(), BusError> {
    if path == "/" {
        return Ok(());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(invalid("object path", path));
    };
    let valid = rest
        .split('/')
        .all(|element| !element.is_empty() && element.chars().all(is_name_char));
    if valid { Ok(()) } else { Err(invalid("object path", path)) }
}

/// Validates an interface name such as `com.example.Iface`.
///
/// # Errors
///
/// Returns [`BusError::InvalidName`] if the name is empty, too long, has
/// fewer than two elements, or has an element that is empty, starts with
/// a digit or contains characters outside `[A-Za-z0-9_]`.
pub fn validate_interface(name: &str) -> Result<(), BusError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(invalid("interface", name));
    }
    let mut elements = 0usize;
    for element in name.split('.') {
        if element.is_empty() || starts_with_digit(element) || !element.chars().all(is_name_char)
        {
            return Err(invalid("interface", name));
        }
        elements += 1;
    }
    if elements < 2 {
        return Err(invalid("interface", name));
    }
    Ok(())
}

/// Validates a member (signal) name such as `Ping`.
///
/// # Errors
///
/// Returns [`BusError::InvalidName`] if the name is empty, too long,
/// starts with a digit or contains characters outside `[A-Za-z0-9_]`.
pub fn validate_member(name: &str) -> Result<(), BusError> {
    if name.is_empty()
        || name.len() > MAX_NAME_LEN
        || starts_with_digit(name)
        || !name.chars().all(is_name_char)
    {
        return Err(invalid("member", name));
    }
    Ok(())
}

/// Validates a bus name: either a unique name (`:1.42`) or a well-known
/// name (`net.example.Service`).
///
/// # Errors
///
/// Returns [`BusError::InvalidName`] if the name is empty, too long, has
/// fewer than two elements, or has an invalid element. Elements of
/// well-known names may not start with a digit; `-` is allowed in both
/// forms.
pub fn validate_bus_name(name: &str) -> Result<(), BusError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(invalid("bus name", name));
    }
    let (unique, body) = match name.strip_prefix(':') {
        Some(body) => (true, body),
        None => (false, name),
    };
    let mut elements = 0usize;
    for element in body.split('.') {
        let chars_ok = element.chars().all(|c| is_name_char(c) || c == '-');
        if element.is_empty() || !chars_ok || (!unique && starts_with_digit(element)) {
            return Err(invalid("bus name", name));
        }
        elements += 1;
    }
    if elements < 2 {
        return Err(invalid("bus name", name));
    }
    Ok(())
}

/// Returns `true` for unique connection names (`:1.42`).
#[must_use]
pub fn is_unique_name(name: &str) -> bool {
    name.starts_with(':')
}
