/// Hard ceiling GitHub enforces on issue comment bodies.
pub const GITHUB_COMMENT_CEILING_CHARS: usize = 65_535;
/// Cap applied before posting; kept below the ceiling to leave room for markup.
pub const COMMENT_BODY_MAX_CHARS: usize = 60_000;

/// Truncate a reply to at most `COMMENT_BODY_MAX_CHARS` characters.
pub fn truncate_comment_body(text: &str) -> &str {
    truncate_to_chars(text, COMMENT_BODY_MAX_CHARS)
}

/// Return the prefix of `text` holding at most `max_chars` characters.
pub fn truncate_to_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
