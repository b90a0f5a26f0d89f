//! Bearer token authentication for the dispatcher
//!
//! Protected routes expect `Authorization: Bearer <token>`. A bare token in
//! the header is accepted as well. Requests are rejected before any handler
//! runs, so nothing is dispatched for an unauthenticated caller.

use crate::http::messages::ApiError;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Decides whether a presented token is valid
pub trait TokenValidator: Send + Sync {
    fn is_valid(&self, token: &str) -> bool;
}

/// A fixed set of tokens, loaded at startup
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashSet<String>,
}

impl StaticTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    /// Parse a token file: one token per line, blank lines and `#` comments skipped
    pub fn parse(contents: &str) -> Self {
        Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    pub async fn from_file(path: &Path) -> std::io::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(&contents))
    }

    pub fn extend(&mut self, other: StaticTokens) {
        self.tokens.extend(other.tokens);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenValidator for StaticTokens {
    fn is_valid(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// Token carried by the request, if any
fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if value.eq_ignore_ascii_case("bearer") => "",
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}

/// Middleware for `axum::middleware::from_fn_with_state`
pub async fn require_token(
    State(validator): State<Arc<dyn TokenValidator>>,
    request: Request,
    next: Next,
) -> Response {
    match presented_token(request.headers()) {
        None => ApiError::new(StatusCode::UNAUTHORIZED, "missing bearer token").into_response(),
        Some(token) if !validator.is_valid(token) => {
            ApiError::new(StatusCode::FORBIDDEN, "invalid token").into_response()
        }
        Some(_) => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_token_file() {
        let tokens = StaticTokens::parse("# operators\nalpha\n\n  beta  \n#gamma\n");
        assert_eq!(tokens.len(), 2);
        assert!(tokens.is_valid("alpha"));
        assert!(tokens.is_valid("beta"));
        assert!(!tokens.is_valid("gamma"));
    }

    #[test]
    fn test_presented_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer alpha"));
        assert_eq!(presented_token(&headers), Some("alpha"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("alpha"));
        assert_eq!(presented_token(&headers), Some("alpha"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(presented_token(&headers), None);
    }
}
