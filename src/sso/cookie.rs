//! 会话 cookie 绑定：名为 `<provider>Tok`，值即不透明会话键

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

/// 默认 cookie 有效期（天）
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 90;

/// 会话键与 cookie 之间的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookieBinder {
    name: String,
    secure: bool,
    max_age: Duration,
}

impl SessionCookieBinder {
    /// 按 cookie 名创建，默认 90 天有效
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
            max_age: Duration::days(DEFAULT_SESSION_TTL_DAYS),
        }
    }

    /// 设置有效期（天）
    #[must_use]
    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.max_age = Duration::days(days);
        self
    }

    /// cookie 名
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn base_cookie(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), value);
        cookie.set_http_only(true);
        cookie.set_path("/");
        cookie.set_same_site(SameSite::Lax);
        cookie.set_secure(self.secure);
        cookie
    }

    /// 写入会话 cookie
    #[must_use]
    pub fn issue(&self, jar: CookieJar, session_key: &str) -> CookieJar {
        let mut cookie = self.base_cookie(session_key.to_string());
        cookie.set_max_age(self.max_age);
        cookie.set_expires(OffsetDateTime::now_utc() + self.max_age);
        jar.add(cookie)
    }

    /// 读取会话键，cookie 缺失或为空时返回 `None`
    #[must_use]
    pub fn read(&self, jar: &CookieJar) -> Option<String> {
        jar.get(&self.name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    /// 从原始请求头读取会话键
    #[must_use]
    pub fn read_headers(&self, headers: &HeaderMap) -> Option<String> {
        self.read(&CookieJar::from_headers(headers))
    }

    /// 让浏览器删除会话 cookie
    #[must_use]
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        let mut cookie = self.base_cookie(String::new());
        cookie.make_removal();
        jar.add(cookie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::response::IntoResponse;

    #[test]
    fn test_issue_sets_flags_and_expiry() {
        let binder = SessionCookieBinder::new("githubTok", true);
        let jar = binder.issue(CookieJar::new(), "session-key");
        let cookie = jar.get("githubTok").unwrap();

        assert_eq!(cookie.value(), "session-key");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(Duration::days(90)));

        let expires = cookie.expires_datetime().unwrap();
        let ahead = expires - OffsetDateTime::now_utc();
        assert!(ahead > Duration::days(89));
    }

    #[test]
    fn test_insecure_for_local_http() {
        let binder = SessionCookieBinder::new("redditTok", false);
        let jar = binder.issue(CookieJar::new(), "k");
        assert_eq!(jar.get("redditTok").unwrap().secure(), Some(false));
    }

    #[test]
    fn test_read_from_headers() {
        let binder = SessionCookieBinder::new("githubTok", true);
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "other=1; githubTok=abc".parse().unwrap());
        assert_eq!(binder.read_headers(&headers), Some("abc".to_string()));

        let mut empty = HeaderMap::new();
        empty.insert(COOKIE, "githubTok=".parse().unwrap());
        assert_eq!(binder.read_headers(&empty), None);
        assert_eq!(binder.read_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_clear_emits_removal() {
        let binder = SessionCookieBinder::new("githubTok", true);
        let response = binder.clear(CookieJar::new()).into_response();
        let header = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();

        assert!(header.starts_with("githubTok=;"));
        assert!(header.contains("Max-Age=0"));
        assert!(header.contains("Path=/"));
    }
}
