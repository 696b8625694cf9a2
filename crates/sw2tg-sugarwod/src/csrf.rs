const CSRF_MARKER: &str = "var CSRF = '";
const CSRF_LEN: usize = 36;

/// The CSRF token embedded in the login page as `var CSRF = '<token>';`.
pub fn extract_csrf(page: &str) -> Option<&str> {
    let token = page
        .find(CSRF_MARKER)
        .map(|idx| &page[idx + CSRF_MARKER.len()..])
        .and_then(take_chars);
    if token.is_none() {
        tracing::warn!("No csrf token retrieved from page");
    }
    token
}

/// The first `CSRF_LEN` characters, `None` when the page ends sooner.
fn take_chars(rest: &str) -> Option<&str> {
    match rest.char_indices().nth(CSRF_LEN) {
        Some((end, _)) => Some(&rest[..end]),
        None if rest.chars().count() == CSRF_LEN => Some(rest),
        None => None,
    }
}
