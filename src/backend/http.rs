//! Blocking HTTP plumbing shared by the cloud backends.

use reqwest::blocking::{Client, RequestBuilder, Response};

use super::{BackendError, BackendKind, BackendSettings};

/// Longest provider error body echoed into an error message.
const MAX_ERROR_BODY: usize = 300;

const USER_AGENT: &str = concat!("ttsgen/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(kind: BackendKind, settings: &BackendSettings) -> Result<Client, BackendError> {
    Client::builder()
        .timeout(settings.timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| BackendError::Setup { backend: kind, message: e.to_string() })
}

/// Send `request` and return the body of a 2xx response.
///
/// Non-2xx statuses become [`BackendError::Provider`] carrying a trimmed copy
/// of the body; failures before a response arrives become
/// [`BackendError::Transport`].
pub(crate) fn send(kind: BackendKind, request: RequestBuilder) -> Result<Vec<u8>, BackendError> {
    let response = request
        .send()
        .map_err(|e| BackendError::Transport { backend: kind, message: e.to_string() })?;
    read_success(kind, response)
}

fn read_success(kind: BackendKind, response: Response) -> Result<Vec<u8>, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(BackendError::Provider {
            backend: kind,
            status: status.as_u16(),
            message: truncate(body.trim(), MAX_ERROR_BODY),
        });
    }
    let bytes = response
        .bytes()
        .map_err(|e| BackendError::Transport { backend: kind, message: e.to_string() })?;
    if bytes.is_empty() {
        return Err(BackendError::InvalidResponse {
            backend: kind,
            message: "empty audio body".into(),
        });
    }
    Ok(bytes.to_vec())
}

/// Cut `s` to at most `max` bytes on a char boundary.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
        // 'é' is two bytes; never split it.
        assert_eq!(truncate("éé", 3), "é…");
    }
}
