//! Cookies, the shared cookie jar and the Netscape cookie-file format.
//!
//! See [RFC 6265](https://datatracker.ietf.org/doc/html/rfc6265) for the
//! `Set-Cookie` grammar. The jar stores cookies by name only, so two
//! cookies that differ only in domain or path overwrite each other; hosts
//! that rely on the composite key need one jar per scope.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::headers::Headers;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A single HTTP cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    secure: bool,
    http_only: bool,
    expires: Option<DateTime<Utc>>,
}

impl Cookie {
    /// A session cookie with path `/` and no domain restriction.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn get_domain(&self) -> &str {
        &self.domain
    }

    pub fn get_path(&self) -> &str {
        &self.path
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    /// A cookie without an expiry never expires.
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expiry| Utc::now() > expiry)
    }
}

/// Renders the cookie as a `Set-Cookie` style string: `name=value`
/// followed by the attributes that are actually set.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if !self.domain.is_empty() {
            write!(f, "; Domain={}", self.domain)?;
        }
        if !self.path.is_empty() {
            write!(f, "; Path={}", self.path)?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(expires) = self.expires {
            write!(f, "; Expires={}", expires.format(HTTP_DATE_FORMAT))?;
        }
        Ok(())
    }
}

/// A thread-safe collection of cookies keyed by name.
///
/// Shared between sessions and requests behind an `Arc`; every operation
/// locks the jar internally so callers never deal with the mutex.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<HashMap<String, Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a cookie, overwriting any entry with the same name. Storing
    /// an already-expired cookie removes the entry instead, which is how
    /// servers ask clients to delete cookies.
    pub fn set_cookie(&self, cookie: Cookie) {
        let mut cookies = self.cookies.lock().unwrap();
        if cookie.is_expired() {
            cookies.remove(&cookie.name);
            return;
        }
        cookies.insert(cookie.name.clone(), cookie);
    }

    /// The cookie with this name, unless it is absent or expired.
    pub fn get_cookie(&self, name: &str) -> Option<Cookie> {
        let cookies = self.cookies.lock().unwrap();
        cookies
            .get(name)
            .filter(|cookie| !cookie.is_expired())
            .cloned()
    }

    /// A snapshot of every non-expired cookie.
    pub fn get_cookies(&self) -> Vec<Cookie> {
        let cookies = self.cookies.lock().unwrap();
        cookies
            .values()
            .filter(|cookie| !cookie.is_expired())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.cookies.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.lock().unwrap().is_empty()
    }

    /// Feeds every `Set-Cookie` header (matched case-insensitively) into
    /// the jar. `default_domain` applies to cookies without a `Domain`
    /// attribute, typically the host the response came from.
    pub fn parse_cookies_from_headers(&self, headers: &Headers, default_domain: &str) {
        for value in headers.get_all("Set-Cookie") {
            self.parse_cookie_header(value, default_domain);
        }
    }

    /// Parses one `Set-Cookie` value and stores the result. Unknown
    /// attributes and unparseable dates are ignored; a `Max-Age` attribute
    /// beats `Expires` when both are present, per RFC 6265.
    pub fn parse_cookie_header(&self, header: &str, default_domain: &str) {
        let mut attributes = header.split(';');

        let Some((name, value)) = attributes.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };

        let mut cookie = Cookie::new(name.trim_start(), value.trim_start());
        cookie.domain = default_domain.to_string();

        let mut expires_attr = None;
        let mut max_age = None;

        for attribute in attributes {
            let (key, attr_value) = match attribute.split_once('=') {
                Some((key, attr_value)) => (key.trim(), attr_value.trim()),
                None => (attribute.trim(), ""),
            };

            if key.eq_ignore_ascii_case("domain") {
                cookie.domain = attr_value.to_string();
            } else if key.eq_ignore_ascii_case("path") {
                cookie.path = attr_value.to_string();
            } else if key.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if key.eq_ignore_ascii_case("httponly") {
                cookie.http_only = true;
            } else if key.eq_ignore_ascii_case("expires") {
                expires_attr = NaiveDateTime::parse_from_str(attr_value, HTTP_DATE_FORMAT)
                    .ok()
                    .map(|naive| naive.and_utc());
            } else if key.eq_ignore_ascii_case("max-age") {
                max_age = attr_value
                    .parse::<i64>()
                    .ok()
                    .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds));
            }
        }

        cookie.expires = max_age.or(expires_attr);
        self.set_cookie(cookie);
    }

    /// Replaces the jar contents with the cookies stored in a Netscape
    /// format file. Comment lines, lines with fewer than seven fields and
    /// lines with a malformed expiry are skipped.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = BufReader::new(File::open(path)?);

        let mut cookies = self.cookies.lock().unwrap();
        cookies.clear();

        for line in file.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                continue;
            }

            let Ok(expires_epoch) = fields[4].parse::<i64>() else {
                continue;
            };

            let mut cookie = Cookie::new(fields[5], fields[6])
                .domain(fields[0])
                .path(fields[2])
                .secure(fields[3] == "TRUE")
                .http_only(fields[1] == "TRUE");
            if expires_epoch > 0 {
                cookie.expires = DateTime::from_timestamp(expires_epoch, 0);
            }

            cookies.insert(cookie.name.clone(), cookie);
        }

        Ok(())
    }

    /// Writes every non-expired cookie in Netscape format. An absent
    /// expiry (a session cookie) is written as epoch `0`.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut file = File::create(path)?;

        writeln!(file, "# Netscape HTTP Cookie File")?;
        writeln!(file, "# https://curl.se/docs/http-cookies.html")?;

        let cookies = self.cookies.lock().unwrap();
        for cookie in cookies.values() {
            if cookie.is_expired() {
                continue;
            }
            writeln!(
                file,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                cookie.domain,
                if cookie.http_only { "TRUE" } else { "FALSE" },
                cookie.path,
                if cookie.secure { "TRUE" } else { "FALSE" },
                cookie.expires.map_or(0, |expiry| expiry.timestamp()),
                cookie.name,
                cookie.value,
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn display_starts_with_the_name_value_pair() {
        let cookie = Cookie::new("sid", "abc123");
        assert!(cookie.to_string().starts_with("sid=abc123"));
    }

    #[test]
    fn display_only_renders_set_attributes() {
        let cookie = Cookie::new("sid", "abc")
            .domain("example.com")
            .secure(true)
            .http_only(true);
        assert_eq!(
            cookie.to_string(),
            "sid=abc; Domain=example.com; Path=/; Secure; HttpOnly"
        );

        let bare = Cookie::new("k", "v").path("");
        assert_eq!(bare.to_string(), "k=v");
    }

    #[test]
    fn display_renders_expiry_as_rfc1123_gmt() {
        let expiry = DateTime::from_timestamp(784111777, 0).unwrap();
        let cookie = Cookie::new("k", "v").path("").expires(expiry);
        assert_eq!(cookie.to_string(), "k=v; Expires=Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn setting_an_expired_cookie_removes_the_entry() {
        let jar = CookieJar::new();
        jar.set_cookie(Cookie::new("sid", "abc"));
        assert!(jar.get_cookie("sid").is_some());

        let expired = Cookie::new("sid", "abc").expires(Utc::now() - TimeDelta::hours(1));
        jar.set_cookie(expired);
        assert!(jar.get_cookie("sid").is_none());
        assert!(jar.is_empty());
    }

    #[test]
    fn snapshot_skips_expired_cookies() {
        let jar = CookieJar::new();
        jar.set_cookie(Cookie::new("alive", "1"));
        {
            // Bypass set_cookie so an expired entry actually lands in the map.
            let mut cookies = jar.cookies.lock().unwrap();
            cookies.insert(
                "dead".to_string(),
                Cookie::new("dead", "0").expires(Utc::now() - TimeDelta::minutes(1)),
            );
        }

        let snapshot = jar.get_cookies();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name(), "alive");
    }

    #[test]
    fn parses_a_full_set_cookie_header() {
        let jar = CookieJar::new();
        jar.parse_cookie_header("sid=abc; Domain=x; Path=/; Secure", "fallback");

        let cookie = jar.get_cookie("sid").unwrap();
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.get_domain(), "x");
        assert_eq!(cookie.get_path(), "/");
        assert!(cookie.is_secure());
        assert!(!cookie.is_http_only());
    }

    #[test]
    fn default_domain_applies_when_the_attribute_is_missing() {
        let jar = CookieJar::new();
        jar.parse_cookie_header("sid=abc; HttpOnly", "example.com");

        let cookie = jar.get_cookie("sid").unwrap();
        assert_eq!(cookie.get_domain(), "example.com");
        assert!(cookie.is_http_only());
    }

    #[test]
    fn attribute_names_match_case_insensitively() {
        let jar = CookieJar::new();
        jar.parse_cookie_header("sid=abc; DOMAIN=y; secure; HTTPONLY", "z");

        let cookie = jar.get_cookie("sid").unwrap();
        assert_eq!(cookie.get_domain(), "y");
        assert!(cookie.is_secure());
        assert!(cookie.is_http_only());
    }

    #[test]
    fn max_age_wins_over_expires() {
        let jar = CookieJar::new();
        jar.parse_cookie_header(
            "sid=abc; Expires=Sun, 06 Nov 1994 08:49:37 GMT; Max-Age=3600",
            "x",
        );

        let cookie = jar.get_cookie("sid").unwrap();
        let expiry = cookie.expiry().unwrap();
        assert!(expiry > Utc::now() + TimeDelta::minutes(59));
        assert!(expiry < Utc::now() + TimeDelta::minutes(61));
    }

    #[test]
    fn malformed_dates_are_dropped_silently() {
        let jar = CookieJar::new();
        jar.parse_cookie_header("sid=abc; Expires=whenever; Max-Age=soon", "x");

        let cookie = jar.get_cookie("sid").unwrap();
        assert!(cookie.expiry().is_none());
    }

    #[test]
    fn headers_feed_every_set_cookie_entry() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1; Path=/");
        headers.append("set-cookie", "b=2; Secure");
        headers.append("Content-Type", "text/html");

        let jar = CookieJar::new();
        jar.parse_cookies_from_headers(&headers, "host");

        assert_eq!(jar.len(), 2);
        assert!(jar.get_cookie("a").is_some());
        assert!(jar.get_cookie("b").unwrap().is_secure());
    }

    #[test]
    fn netscape_round_trip_preserves_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");

        let jar = CookieJar::new();
        jar.set_cookie(
            Cookie::new("sid", "abc")
                .domain("example.com")
                .path("/app")
                .secure(true)
                .expires(Utc::now() + TimeDelta::days(1)),
        );
        jar.set_cookie(Cookie::new("session", "xyz").domain("example.com"));
        jar.save_to_file(&path).unwrap();

        let restored = CookieJar::new();
        restored.load_from_file(&path).unwrap();

        let sid = restored.get_cookie("sid").unwrap();
        assert_eq!(sid.value(), "abc");
        assert_eq!(sid.get_domain(), "example.com");
        assert_eq!(sid.get_path(), "/app");
        assert!(sid.is_secure());
        assert!(sid.expiry().is_some());

        // Session cookie round-trips with epoch 0, i.e. no expiry.
        let session = restored.get_cookie("session").unwrap();
        assert!(session.expiry().is_none());
    }

    #[test]
    fn expired_cookies_are_dropped_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");

        let jar = CookieJar::new();
        jar.set_cookie(Cookie::new("keep", "1"));
        {
            let mut cookies = jar.cookies.lock().unwrap();
            cookies.insert(
                "drop".to_string(),
                Cookie::new("drop", "0").expires(Utc::now() - TimeDelta::hours(1)),
            );
        }
        jar.save_to_file(&path).unwrap();

        let restored = CookieJar::new();
        restored.load_from_file(&path).unwrap();
        assert_eq!(restored.len(), 1);
        assert!(restored.get_cookie("keep").is_some());
    }

    #[test]
    fn load_skips_comments_short_lines_and_bad_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(
            &path,
            "# Netscape HTTP Cookie File\n\
             not\tenough\tfields\n\
             example.com\tFALSE\t/\tFALSE\tnot-a-number\tbad\tepoch\n\
             example.com\tFALSE\t/\tFALSE\t0\tgood\tvalue\n",
        )
        .unwrap();

        let jar = CookieJar::new();
        jar.load_from_file(&path).unwrap();

        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get_cookie("good").unwrap().value(), "value");
    }

    #[test]
    fn load_replaces_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "example.com\tFALSE\t/\tFALSE\t0\tfresh\t1\n").unwrap();

        let jar = CookieJar::new();
        jar.set_cookie(Cookie::new("old", "stale"));
        jar.load_from_file(&path).unwrap();

        assert!(jar.get_cookie("old").is_none());
        assert!(jar.get_cookie("fresh").is_some());
    }
}
