//! Minimal cookie jar for one SugarWOD login → logout span.

use reqwest::header::{HeaderMap, SET_COOKIE};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<String>,
    pub max_age: Option<i64>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            expires: None,
            max_age: None,
        }
    }

    /// Parse one `Set-Cookie` header value. Unknown attributes are ignored.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim().trim_matches('"'));
        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "path" => cookie.path = Some(val.to_string()),
                "domain" => cookie.domain = Some(val.to_string()),
                "expires" => cookie.expires = Some(val.to_string()),
                "max-age" => cookie.max_age = val.parse().ok(),
                _ => {}
            }
        }
        Some(cookie)
    }

    fn is_removal(&self) -> bool {
        self.max_age.is_some_and(|age| age <= 0)
    }
}

/// Cookies by name, in first-seen order.
///
/// A cookie set again keeps its original position with the new value.
#[derive(Clone, Debug, Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cookie: Cookie) {
        let existing = self.cookies.iter().position(|c| c.name == cookie.name);
        match (existing, cookie.is_removal()) {
            (Some(idx), true) => {
                self.cookies.remove(idx);
            }
            (Some(idx), false) => self.cookies[idx] = cookie,
            (None, true) => {}
            (None, false) => self.cookies.push(cookie),
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Value for a `Cookie` request header, `None` when the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Merge every `Set-Cookie` header of a response.
    pub fn merge(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                tracing::warn!("ignoring non-ascii Set-Cookie header");
                continue;
            };
            match Cookie::parse(raw) {
                Some(cookie) => self.insert(cookie),
                None => tracing::warn!("ignoring malformed Set-Cookie header"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn parses_value_and_attributes() {
        let cookie =
            Cookie::parse("sid=abc=; Path=/; Domain=.sugarwod.com; Max-Age=3600; HttpOnly").unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.value, "abc=");
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.domain.as_deref(), Some(".sugarwod.com"));
        assert_eq!(cookie.max_age, Some(3600));
        assert!(Cookie::parse("no-equals-sign").is_none());
        assert!(Cookie::parse("=orphan").is_none());
    }

    #[test]
    fn replaced_cookie_keeps_its_position() {
        let mut jar = CookieJar::new();
        jar.insert(Cookie::new("_sw_session", "seed"));
        jar.insert(Cookie::new("a", "1"));
        jar.insert(Cookie::new("_sw_session", "rotated"));

        assert_eq!(jar.len(), 2);
        assert_eq!(jar.header_value().as_deref(), Some("_sw_session=rotated; a=1"));
    }

    #[test]
    fn non_positive_max_age_removes() {
        let mut jar = CookieJar::new();
        jar.insert(Cookie::new("a", "1"));
        jar.insert(Cookie::parse("a=; Max-Age=0").unwrap());
        jar.insert(Cookie::parse("b=; Max-Age=-1").unwrap());

        assert!(jar.is_empty());
        assert_eq!(jar.header_value(), None);
    }

    #[test]
    fn merges_all_set_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.append(SET_COOKIE, HeaderValue::from_static("garbage"));

        let mut jar = CookieJar::new();
        jar.merge(&headers);

        assert_eq!(jar.len(), 2);
        assert_eq!(jar.header_value().as_deref(), Some("a=1; b=2"));
    }
}
