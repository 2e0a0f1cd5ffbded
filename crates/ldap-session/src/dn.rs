//! Distinguished-name helpers: RFC 4514 escaping, parsing, and
//! canonicalization.

use crate::error::{DirectoryError, DirectoryResult};

/// Escape special characters in a DN attribute value per RFC 4514.
///
/// Characters that must be escaped:
/// - `,` `+` `"` `\` `<` `>` `;` `=` (backslash prefix)
/// - NUL (escaped as `\00`)
/// - leading or trailing SPACE (escaped as `\20`)
/// - leading `#` (escaped as `\23`)
pub fn escape_dn_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let char_count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i == char_count - 1;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => {
                result.push_str("\\00");
            }
            ' ' if is_first || is_last => {
                result.push_str("\\20");
            }
            '#' if is_first => {
                result.push_str("\\23");
            }
            _ => {
                result.push(ch);
            }
        }
    }

    result
}

/// Parse a DN into `(attribute, value)` components, unescaping the values.
///
/// An empty DN parses to an empty component list. Multi-valued RDNs
/// (`a=x+b=y`) are not decomposed; the `+` stays inside the component.
pub fn parse_dn(dn: &str) -> DirectoryResult<Vec<(String, String)>> {
    if dn.is_empty() {
        return Ok(Vec::new());
    }

    let mut components = Vec::new();
    for raw in split_unescaped(dn, ',') {
        let raw = raw.trim();
        let eq = find_unescaped(raw, '=')
            .ok_or_else(|| DirectoryError::InvalidDn { dn: dn.to_string() })?;
        let attribute = raw[..eq].trim();
        if attribute.is_empty() {
            return Err(DirectoryError::InvalidDn { dn: dn.to_string() });
        }
        let value = unescape_dn_value(&raw[eq + 1..], dn)?;
        components.push((attribute.to_string(), value));
    }
    Ok(components)
}

/// Serialize components back into a DN, escaping each value.
pub fn format_dn(components: &[(String, String)]) -> String {
    components
        .iter()
        .map(|(attribute, value)| format!("{}={}", attribute, escape_dn_value(value)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Canonicalize a DN: parse it and serialize it back with uniform
/// escaping. The result is stable under repeated application.
pub fn escape_dn(dn: &str) -> DirectoryResult<String> {
    Ok(format_dn(&parse_dn(dn)?))
}

/// Split on a separator, honoring backslash escapes.
fn split_unescaped(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == separator {
            parts.push(&input[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Index of the first unescaped occurrence of a character.
fn find_unescaped(input: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == needle {
            return Some(i);
        }
    }
    None
}

/// Unescape a DN attribute value: `\X` for a special character, `\HH` for
/// a hex-encoded byte.
fn unescape_dn_value(value: &str, dn: &str) -> DirectoryResult<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let escaped = chars
            .next()
            .ok_or_else(|| DirectoryError::InvalidDn { dn: dn.to_string() })?;
        if escaped.is_ascii_hexdigit() {
            let second = chars.next().filter(char::is_ascii_hexdigit).ok_or_else(|| {
                DirectoryError::InvalidDn { dn: dn.to_string() }
            })?;
            let byte = (hex_digit(escaped) << 4) | hex_digit(second);
            bytes.push(byte);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(escaped.encode_utf8(&mut buf).as_bytes());
        }
    }
    String::from_utf8(bytes).map_err(|_| DirectoryError::InvalidDn { dn: dn.to_string() })
}

fn hex_digit(ch: char) -> u8 {
    ch.to_digit(16).map_or(0, |d| d as u8)
}
