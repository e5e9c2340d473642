//! Session cookie plumbing.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;

pub const SESSION_COOKIE: &str = "sessionId";
const COOKIE_PATH: &str = "/api/beehive";

/// Build the `Set-Cookie` line for a fresh session credential.
pub fn session_cookie(credential: &str) -> String {
    format!(
        "{}={}; Secure; SameSite=Strict; Path={}",
        SESSION_COOKIE, credential, COOKIE_PATH
    )
}

/// Extract the `<id>_<key>` session credential from the request, checking
/// the session cookie first and a bearer token second.
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
        for part in cookie.split(';') {
            let part = part.trim();
            if let Some(value) = part.strip_prefix(SESSION_COOKIE) {
                if let Some(value) = value.strip_prefix('=') {
                    return Some(url_decode(value));
                }
            }
        }
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
}

/// Percent-decode a cookie or query value.
pub fn url_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = &value[i + 1..i + 3];
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
