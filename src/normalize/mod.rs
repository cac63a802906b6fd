//! Canonicalization of raw host strings returned by archive sources.
//!
//! Extracted strings often carry residue of URL or JSON escaping in front of the
//! real host (`%2fwww.example.com`, `u002fwww.example.com`) plus stray
//! punctuation. `normalize` peels those off until nothing changes and then
//! validates the result. Anything that is not a plausible host name comes back
//! as an empty string, which callers treat as "discard".
//!
//! Bare escape codes left behind once a regex has cut a host out of encoded
//! text (`2fwww.example.com`) cannot be told apart from real names such as
//! `3dprint.example.com`, so `normalize` keeps them. Scrapers that read raw
//! page text call [`strip_escape_residue`] on their matches first.

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// URL-escape codes that show up without their `%` once a regex has cut the host
/// out of encoded text.
const BARE_ESCAPES: [&str; 8] = ["20", "22", "25", "2b", "2f", "3a", "3d", "40"];

pub fn normalize(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = clean_step(&current);
        if next == current {
            break;
        }
        current = next;
    }

    if is_valid_host(&current) {
        current
    } else {
        String::new()
    }
}

fn clean_step(input: &str) -> String {
    let lowered = input.trim().to_ascii_lowercase();
    let stripped = strip_escape_prefix(&lowered);
    stripped
        .trim_start_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Removes one layer of escape residue from the front of `s`.
fn strip_escape_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();

    // Double-encoded: `%25` is the `%` of the escape that follows
    if bytes.len() >= 5 && s.starts_with("%25") && is_hex(&bytes[3..5]) {
        return &s[5..];
    }

    if bytes.len() >= 3 && bytes[0] == b'%' && is_hex(&bytes[1..3]) {
        return &s[3..];
    }

    if bytes.len() >= 6 && bytes[0] == b'\\' && bytes[1] == b'u' && is_hex(&bytes[2..6]) {
        return &s[6..];
    }

    if bytes.len() >= 5 && s.starts_with("u00") && is_hex(&bytes[3..5]) {
        return &s[5..];
    }

    s
}

/// Drops URL-escape codes that lost their `%` from the front of a match cut
/// out of raw page text, as long as a letter follows the code.
pub fn strip_escape_residue(raw: &str) -> &str {
    let mut rest = raw;
    loop {
        let bytes = rest.as_bytes();
        if bytes.len() < 3 || !bytes[2].is_ascii_alphabetic() {
            return rest;
        }
        let is_code = BARE_ESCAPES
            .iter()
            .any(|code| bytes[..2].eq_ignore_ascii_case(code.as_bytes()));
        if !is_code {
            return rest;
        }
        rest = &rest[2..];
    }
}

fn is_hex(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii_hexdigit())
}

fn is_valid_host(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'))
    {
        return false;
    }

    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}
