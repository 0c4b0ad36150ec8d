use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;

use crate::errors::EtcdError;

/// Bytes escaped inside a single key segment. `/` never reaches the encoder
/// because keys are split on it first.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const KEYS_PREFIX: &str = "/v2/keys";

/// Canonical form of a key: leading `/`, no empty segments, no trailing `/`.
/// The root directory is `/`.
pub fn normalize_key(key: &str) -> Result<String, EtcdError> {
    if key.chars().any(char::is_control) {
        return Err(EtcdError::InvalidKey(format!(
            "{key:?} contains control characters"
        )));
    }

    let mut normalized = String::with_capacity(key.len() + 1);
    for segment in key.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(EtcdError::InvalidKey(format!(
                "{key:?} contains a relative segment"
            )));
        }
        normalized.push('/');
        normalized.push_str(segment);
    }

    if normalized.is_empty() {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Percent-encodes each segment of an already normalized key, keeping the
/// `/` separators.
#[must_use]
pub fn encode_key_path(normalized: &str) -> String {
    normalized
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Full URL of a key under the given endpoint.
pub fn key_url(endpoint: &Url, key: &str) -> Result<Url, EtcdError> {
    let normalized = normalize_key(key)?;
    let base = endpoint.as_str().trim_end_matches('/');
    let path = if normalized == "/" {
        String::new()
    } else {
        encode_key_path(&normalized)
    };
    Ok(Url::parse(&format!("{base}{KEYS_PREFIX}{path}"))?)
}

/// URL of a non-keys resource such as `/version` or `/v2/members`.
pub fn endpoint_url(endpoint: &Url, path: &str) -> Result<Url, EtcdError> {
    let base = endpoint.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{base}{path}"))?)
}

pub fn join_key(dir: &str, name: &str) -> Result<String, EtcdError> {
    normalize_key(&format!("{dir}/{name}"))
}
