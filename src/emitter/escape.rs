//! Markup escaping into a scratch buffer.
//!
//! The escaped form only adds ASCII, so the caller can still replace
//! characters outside the output encoding afterwards.

/// Ersetzt drei Bytes per memchr3; grosse Bloecke ohne Sonderzeichen werden
/// am Stueck kopiert.
fn escape_memchr3(out: &mut String, s: &str, needle: [u8; 3], replacement: [&str; 3]) {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        match memchr::memchr3(needle[0], needle[1], needle[2], &bytes[start..]) {
            Some(offset) => {
                let pos = start + offset;
                // Needles sind ASCII, pos liegt also auf einer char-Grenze.
                out.push_str(&s[start..pos]);
                let idx = if bytes[pos] == needle[0] {
                    0
                } else if bytes[pos] == needle[1] {
                    1
                } else {
                    2
                };
                out.push_str(replacement[idx]);
                start = pos + 1;
            }
            None => {
                out.push_str(&s[start..]);
                break;
            }
        }
    }
}

fn escape_chars(out: &mut String, s: &str, entity: impl Fn(char) -> Option<&'static str>) {
    for c in s.chars() {
        match entity(c) {
            Some(e) => out.push_str(e),
            None => out.push(c),
        }
    }
}

/// Text content: `& < >` plus CR as `&#xD;` so it survives re-parsing.
pub fn escape_text(out: &mut String, s: &str) {
    if memchr::memchr(b'\r', s.as_bytes()).is_none() {
        escape_memchr3(out, s, [b'&', b'<', b'>'], ["&amp;", "&lt;", "&gt;"]);
    } else {
        escape_chars(out, s, |c| match c {
            '&' => Some("&amp;"),
            '<' => Some("&lt;"),
            '>' => Some("&gt;"),
            '\r' => Some("&#xD;"),
            _ => None,
        });
    }
}

/// Attribute values: `& < "` and the whitespace characters that attribute
/// normalization would otherwise turn into spaces.
pub fn escape_attribute(out: &mut String, s: &str) {
    if memchr::memchr3(b'\t', b'\n', b'\r', s.as_bytes()).is_none() {
        escape_memchr3(out, s, [b'&', b'<', b'"'], ["&amp;", "&lt;", "&quot;"]);
    } else {
        escape_chars(out, s, |c| match c {
            '&' => Some("&amp;"),
            '<' => Some("&lt;"),
            '"' => Some("&quot;"),
            '\t' => Some("&#x9;"),
            '\n' => Some("&#xA;"),
            '\r' => Some("&#xD;"),
            _ => None,
        });
    }
}

/// HTML text: like XML, with no-break space as `&nbsp;`.
pub fn escape_html_text(out: &mut String, s: &str) {
    if !s.contains('\u{a0}') {
        return escape_text(out, s);
    }
    escape_chars(out, s, |c| match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '\r' => Some("&#xD;"),
        '\u{a0}' => Some("&nbsp;"),
        _ => None,
    });
}

/// HTML attribute values: `<` stays literal and `&{` (script macro) is kept.
pub fn escape_html_attribute(out: &mut String, s: &str) {
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '&' if chars.peek() == Some(&'{') => out.push('&'),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn esc(f: fn(&mut String, &str), s: &str) -> String {
        let mut out = String::new();
        f(&mut out, s);
        out
    }

    #[test]
    fn text_escaping() {
        assert_eq!(esc(escape_text, "a&b<c>d"), "a&amp;b&lt;c&gt;d");
        assert_eq!(esc(escape_text, "plain äöü"), "plain äöü");
        assert_eq!(esc(escape_text, "a\r\nb"), "a&#xD;\nb");
    }

    #[test]
    fn attribute_escaping() {
        assert_eq!(esc(escape_attribute, r#"a"b<c&d>"#), "a&quot;b&lt;c&amp;d>");
        assert_eq!(esc(escape_attribute, "x\ty\nz"), "x&#x9;y&#xA;z");
    }

    #[test]
    fn html_escaping() {
        assert_eq!(esc(escape_html_text, "a\u{a0}b<"), "a&nbsp;b&lt;");
        assert_eq!(esc(escape_html_attribute, "a<b&{x}&c\""), "a<b&{x}&amp;c&quot;");
    }
}
