use std::borrow::Cow;

/// Clip a string to at most `max` characters, on a character boundary.
///
/// Storage bounds (title, author, GUID) are defined in characters, not
/// bytes; slicing by byte index could split a multi-byte character.
pub fn clip_chars(s: &str, max: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => Cow::Owned(s[..byte_idx].to_string()),
        None => Cow::Borrowed(s),
    }
}
