//! Cookie store that can be wiped
//!
//! The access and refresh credentials live in HTTP-only cookies. reqwest's
//! built-in jar has no way to drop them, so this store wraps one and swaps
//! in a fresh jar on [`ClearableCookieJar::clear`].

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use url::Url;

/// Cookie jar shared by the REST client, the event stream and the broker handshake
#[derive(Debug, Default)]
pub struct ClearableCookieJar {
    jar: RwLock<Arc<Jar>>,
}

impl ClearableCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a `Set-Cookie` style string for `url`
    pub fn add_cookie_str(&self, cookie: &str, url: &Url) {
        self.jar.read().add_cookie_str(cookie, url);
    }

    /// `Cookie` header value for `url`, if any cookie applies
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        self.cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    /// Drop every stored cookie
    pub fn clear(&self) {
        *self.jar.write() = Arc::new(Jar::default());
        tracing::debug!("Cookie jar cleared");
    }
}

impl CookieStore for ClearableCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let jar = self.jar.read().clone();
        jar.set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let jar = self.jar.read().clone();
        jar.cookies(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_round_trip_and_clear() {
        let url = Url::parse("http://localhost:9005/api/rooms").unwrap();
        let jar = ClearableCookieJar::new();
        assert_eq!(jar.cookie_header(&url), None);

        jar.add_cookie_str("access_token=abc; Path=/; HttpOnly", &url);
        assert_eq!(jar.cookie_header(&url).as_deref(), Some("access_token=abc"));

        let ws = Url::parse("http://localhost:9005/ws").unwrap();
        assert_eq!(jar.cookie_header(&ws).as_deref(), Some("access_token=abc"));

        jar.clear();
        assert_eq!(jar.cookie_header(&url), None);
    }

    #[test]
    fn test_set_cookies_through_store_trait() {
        let url = Url::parse("http://localhost:9005/api/auth/refresh").unwrap();
        let jar = ClearableCookieJar::new();
        let header = HeaderValue::from_static("access_token=fresh; Path=/");

        jar.set_cookies(&mut std::iter::once(&header), &url);
        assert_eq!(jar.cookie_header(&url).as_deref(), Some("access_token=fresh"));
    }
}
