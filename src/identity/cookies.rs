//! Visitor cookie extraction and issuance.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use cookie::Cookie;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::config::{ConfigError, IdentityConfig, validate_cookie_name, validate_expire_days};
use crate::types::VisitorToken;

/// Reads the visitor token from inbound requests and writes the replacement
/// cookie onto outbound responses.
///
/// The cookie only ever carries the opaque token. It is host-only (no
/// Domain), scoped to `/`, and HttpOnly.
#[derive(Debug, Clone)]
pub struct CookieCodec {
    name: String,
    expire_days: u32,
    secure: bool,
}

impl CookieCodec {
    /// Create a codec for the named cookie.
    pub fn new(name: impl Into<String>, expire_days: u32, secure: bool) -> Result<Self, ConfigError> {
        let name = name.into();
        validate_cookie_name(&name)?;
        validate_expire_days(expire_days)?;
        Ok(Self {
            name,
            expire_days,
            secure,
        })
    }

    /// Create a codec from the identity configuration.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.cookie_name.clone(),
            config.expire_days,
            config.cookie_secure,
        )
    }

    /// Name of the visitor cookie.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extract the visitor token from the request's `Cookie` headers.
    ///
    /// A missing cookie and an empty value are both treated as "no cookie".
    pub fn extract(&self, headers: &HeaderMap) -> Option<VisitorToken> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
            .map(VisitorToken::new)
    }

    /// Build the `Set-Cookie` value for `token`, expiring `expire_days` from now.
    ///
    /// Saturates at the largest representable date instead of overflowing.
    pub fn build(&self, token: &VisitorToken) -> Cookie<'static> {
        let expires = OffsetDateTime::now_utc()
            .checked_add(time::Duration::days(i64::from(self.expire_days)))
            .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc());

        Cookie::build((self.name.clone(), token.as_str().to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .expires(expires)
            .build()
    }

    /// Write the visitor cookie onto the response headers.
    ///
    /// Any visitor cookie issued earlier on the same headers is replaced;
    /// other `Set-Cookie` headers are left alone.
    pub fn issue(&self, headers: &mut HeaderMap, token: &VisitorToken) {
        let value = match HeaderValue::from_str(&self.build(token).to_string()) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(
                    token = %token.fingerprint(),
                    error = %e,
                    "visitor cookie is not a valid header value, not issued"
                );
                return;
            }
        };

        let prefix = format!("{}=", self.name);
        let kept: Vec<HeaderValue> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter(|existing| {
                !existing
                    .to_str()
                    .map(|s| s.starts_with(&prefix))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        headers.remove(SET_COOKIE);
        for existing in kept {
            headers.append(SET_COOKIE, existing);
        }
        headers.append(SET_COOKIE, value);
    }
}
