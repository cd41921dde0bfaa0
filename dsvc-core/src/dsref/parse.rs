use super::Ref;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty reference")]
    Empty,
    #[error("parsing ref, unexpected character at position {pos}: '{ch}'")]
    Unexpected { pos: usize, ch: char },
    #[error("parsing ref, unexpected end of input at position {pos}")]
    UnexpectedEnd { pos: usize },
    #[error("path contains invalid base58 characters")]
    InvalidBase58Path,
    #[error("profileID contains invalid base58 characters")]
    InvalidBase58ProfileId,
    #[error("ref can only have username/name")]
    NotHumanFriendly,
    /// Non-fatal: the ref parsed, but its name carries upper-case letters.
    #[error("dataset name may not contain any upper-case letters")]
    BadCase(Ref),
}

impl ParseError {
    /// Recover the ref from a bad-case warning; every other variant stays an error.
    pub fn into_ref(self) -> Result<Ref, ParseError> {
        match self {
            ParseError::BadCase(r) => Ok(r),
            other => Err(other),
        }
    }
}

/// Parse a full reference.
pub fn parse(text: &str) -> Result<Ref, ParseError> {
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut r = Ref::default();
    let mut pos = 0;

    if let Some((username, name, end)) = human_friendly_portion(text)? {
        r.username = username.to_string();
        r.name = name.to_string();
        pos = end;
    }

    if pos < text.len() {
        if text.as_bytes()[pos] != b'@' {
            return Err(unexpected(text, pos));
        }
        pos = concrete_portion(text, pos + 1, &mut r)?;
    }

    if pos < text.len() {
        return Err(unexpected(text, pos));
    }
    check_case(r)
}

/// Parse a plain `username/name`. Any `@` suffix fails with `NotHumanFriendly`.
pub fn parse_human_friendly(text: &str) -> Result<Ref, ParseError> {
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    let pos = match human_friendly_portion(text)? {
        Some((_, _, end)) => end,
        None => 0,
    };
    if text[pos..].starts_with('@') {
        return Err(ParseError::NotHumanFriendly);
    }
    parse(text)
}

/// `^[A-Za-z][A-Za-z0-9_]*$`
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_case(r: Ref) -> Result<Ref, ParseError> {
    if r.name.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ParseError::BadCase(r));
    }
    Ok(r)
}

fn is_username_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn is_store_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

fn scan_while(text: &str, from: usize, pred: impl Fn(u8) -> bool) -> usize {
    text.as_bytes()[from..]
        .iter()
        .position(|b| !pred(*b))
        .map(|n| from + n)
        .unwrap_or(text.len())
}

fn unexpected(text: &str, pos: usize) -> ParseError {
    match text[pos..].chars().next() {
        Some(ch) => ParseError::Unexpected { pos, ch },
        None => ParseError::UnexpectedEnd { pos },
    }
}

fn is_base58(s: &str) -> bool {
    bs58::decode(s).into_vec().is_ok()
}

/// Returns `(username, name, end)` when the text opens with `username/name`.
fn human_friendly_portion(text: &str) -> Result<Option<(&str, &str, usize)>, ParseError> {
    let user_end = scan_while(text, 0, is_username_byte);
    if user_end == 0 || text.as_bytes().get(user_end) != Some(&b'/') {
        return Ok(None);
    }
    let name_start = user_end + 1;
    match text.as_bytes().get(name_start) {
        Some(b) if b.is_ascii_alphabetic() => {}
        _ => return Err(unexpected(text, name_start)),
    }
    let name_end = scan_while(text, name_start, is_username_byte);
    Ok(Some((&text[..user_end], &text[name_start..name_end], name_end)))
}

/// Parses `[profileID] ["/" store "/" hash]` starting just past the `@`.
fn concrete_portion(text: &str, start: usize, r: &mut Ref) -> Result<usize, ParseError> {
    let pid_end = scan_while(text, start, |b| b.is_ascii_alphanumeric());
    let profile_id = &text[start..pid_end];
    if !profile_id.is_empty() && !is_base58(profile_id) {
        return Err(ParseError::InvalidBase58ProfileId);
    }
    r.profile_id = profile_id.to_string();

    let mut pos = pid_end;
    if text.as_bytes().get(pos) == Some(&b'/') {
        let store_start = pos + 1;
        let store_end = scan_while(text, store_start, is_store_byte);
        if store_end == store_start {
            return Err(unexpected(text, store_start));
        }
        if text.as_bytes().get(store_end) != Some(&b'/') {
            return Err(unexpected(text, store_end));
        }
        let hash_start = store_end + 1;
        let hash_end = scan_while(text, hash_start, |b| b.is_ascii_alphanumeric());
        if hash_end == hash_start {
            return Err(unexpected(text, hash_start));
        }
        if !is_base58(&text[hash_start..hash_end]) {
            return Err(ParseError::InvalidBase58Path);
        }
        r.path = text[pos..hash_end].to_string();
        pos = hash_end;
    }

    if r.profile_id.is_empty() && r.path.is_empty() {
        return Err(unexpected(text, pos));
    }
    Ok(pos)
}
