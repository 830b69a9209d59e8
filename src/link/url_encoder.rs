//! `$`-escaping of context values in URL paths
//!
//! Letters, digits and `-_.:` pass through. `$` becomes `$$`, the empty
//! string becomes `$N`, and every other UTF-16 unit is written as `$` plus
//! four lower-case hex digits. The result never contains `/`, so context
//! values stay positional when the path is split.

use super::LinkError;

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

pub fn encode(value: &str) -> String {
    if value.is_empty() {
        return "$N".to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut units = [0u16; 2];
    for c in value.chars() {
        if c == '$' {
            out.push_str("$$");
        } else if is_safe(c) {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("${:04x}", unit));
            }
        }
    }
    out
}

pub fn decode(segment: &str) -> Result<String, LinkError> {
    if segment == "$N" || segment == "$B" {
        return Ok(String::new());
    }

    let invalid = |reason: &str| LinkError::InvalidEncoding {
        value: segment.to_string(),
        reason: reason.to_string(),
    };

    let mut units: Vec<u16> = Vec::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '$' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }

        let rest = chars.as_str();
        if rest.starts_with('$') {
            units.push('$' as u16);
            chars.next();
            continue;
        }

        let hex = rest.get(..4).ok_or_else(|| invalid("truncated escape"))?;
        let unit = u16::from_str_radix(hex, 16).map_err(|_| invalid("escape is not hexadecimal"))?;
        units.push(unit);
        for _ in 0..4 {
            chars.next();
        }
    }

    String::from_utf16(&units).map_err(|_| invalid("escape is not valid UTF-16"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_characters_pass_through() {
        assert_eq!(encode("abc-DEF_1.2:3"), "abc-DEF_1.2:3");
    }

    #[test]
    fn test_unsafe_characters_escaped() {
        assert_eq!(encode("a/b"), "a$002fb");
        assert_eq!(encode("a b"), "a$0020b");
        assert_eq!(encode("$5"), "$$5");
        assert_eq!(encode(""), "$N");
    }

    #[test]
    fn test_decode_reverses_encode() {
        for value in ["", "1.2.3", "a:b:c", "x/y?z=1", "$$", "naïve", "🦀 crab"] {
            assert_eq!(decode(&encode(value)).unwrap(), value, "value {:?}", value);
        }
    }

    #[test]
    fn test_decode_rejects_bad_escapes() {
        assert!(matches!(decode("$00"), Err(LinkError::InvalidEncoding { .. })));
        assert!(matches!(decode("$zzzz"), Err(LinkError::InvalidEncoding { .. })));
    }
}
