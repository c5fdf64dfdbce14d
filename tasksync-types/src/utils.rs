//! String escaping helpers.

/// Escape an attribute value for its double-quoted wire form.
///
/// The escape set is the JSON one: `"`, `\`, `/` and the control characters
/// with short forms. Everything else, including non-ASCII, passes through as
/// UTF-8.
pub fn escape_value(input: &str) -> String {
    let mut output = String::with_capacity(input.len() + input.len() / 5);

    for c in input.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '/' => output.push_str("\\/"),
            '\u{0008}' => output.push_str("\\b"),
            '\u{000C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            _ => output.push(c),
        }
    }

    output
}

/// Undo [`escape_value`], additionally accepting `\uXXXX` escapes.
///
/// Unrecognized escape sequences are kept verbatim, so decoding is total:
/// old logs always load.
pub fn unescape_value(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }

        match chars.next() {
            Some('"') => output.push('"'),
            Some('\\') => output.push('\\'),
            Some('/') => output.push('/'),
            Some('b') => output.push('\u{0008}'),
            Some('f') => output.push('\u{000C}'),
            Some('n') => output.push('\n'),
            Some('r') => output.push('\r'),
            Some('t') => output.push('\t'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match (hex.len() == 4).then(|| u32::from_str_radix(&hex, 16).ok()) {
                    Some(Some(code)) => {
                        output.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                        for _ in 0..4 {
                            chars.next();
                        }
                    }
                    _ => output.push_str("\\u"),
                }
            }
            Some(other) => {
                output.push('\\');
                output.push(other);
            }
            None => output.push('\\'),
        }
    }

    output
}
