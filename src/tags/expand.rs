// src/tags/expand.rs

//! Shell-style `$VAR` / `${VAR}` expansion for tag values.
//!
//! Unset variables expand to the empty string. A `$` that is not followed by
//! a name is kept as is; `${` with a bad name is dropped.

/// Expand variables from the process environment.
pub fn expand_env(raw: &str) -> String {
    expand_with(raw, |name| std::env::var(name).ok())
}

/// Expand variables using a caller supplied lookup.
pub fn expand_with<F>(raw: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        match shell_name(after) {
            Some((name, consumed)) if !name.is_empty() => {
                out.push_str(&lookup(name).unwrap_or_default());
                rest = &after[consumed..];
            }
            Some((_, consumed)) => {
                // Invalid `${...}` syntax: swallow it.
                rest = &after[consumed..];
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Returns the variable name following a `$` and how many bytes it spans.
///
/// `None` means `$` was not followed by anything name-like.
fn shell_name(s: &str) -> Option<(&str, usize)> {
    let bytes = s.as_bytes();
    let first = *bytes.first()?;

    if first == b'{' {
        if bytes.len() > 2 && is_special(bytes[1]) && bytes[2] == b'}' {
            return Some((&s[1..2], 3));
        }
        return match s[1..].find('}') {
            Some(end) => Some((&s[1..1 + end], end + 2)),
            // Unterminated brace: eat the `{`.
            None => Some(("", 1)),
        };
    }

    if is_special(first) {
        return Some((&s[..1], 1));
    }

    let len = bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();

    if len == 0 { None } else { Some((&s[..len], len)) }
}

fn is_special(b: u8) -> bool {
    matches!(b, b'*' | b'#' | b'$' | b'@' | b'!' | b'?' | b'-') || b.is_ascii_digit()
}
