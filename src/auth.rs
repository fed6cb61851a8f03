mod token;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::HeaderValue;

pub use token::Token;

/// Builds the `Authorization` header value for a personal access token.
///
/// Azure DevOps expects basic auth with an empty user name, so the encoded
/// payload is `":" + token`.
pub fn basic_auth_header(token: &Token) -> HeaderValue {
    let encoded = STANDARD.encode(format!(":{}", token.as_str()));
    // Base64 output is always visible ASCII.
    let mut value = HeaderValue::try_from(format!("Basic {encoded}"))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic "));
    value.set_sensitive(true);
    value
}
