//! Utility functions for file naming and document fetching

use crate::error::Result;
use std::path::Path;

/// Replace path-separator and filesystem-hostile characters with `_`
///
/// Applied to every file name reported by a download before it is written
/// into the mod directory, so a hostile upstream name cannot escape it.
///
/// # Examples
///
/// ```
/// use modpack_dl::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("Foo Mod 1.2.jar"), "Foo Mod 1.2.jar");
/// assert_eq!(sanitize_file_name("../../evil.jar"), ".._.._evil.jar");
/// assert_eq!(sanitize_file_name("a:b|c?.jar"), "a_b_c_.jar");
/// ```
pub fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect()
}

/// Extract the artifact file name from an HTTP response
///
/// Tries the Content-Disposition header first (quoted, unquoted and
/// RFC 5987 encoded forms), then falls back to the last path segment of the
/// response's final URL (after redirects), percent-decoded. Returns `None`
/// when neither yields a usable name. The extension is kept; the caller
/// still sanitizes the result before writing.
pub fn file_name_from_response(response: &reqwest::Response) -> Option<String> {
    if let Some(content_disposition) = response.headers().get("content-disposition")
        && let Ok(value) = content_disposition.to_str()
    {
        for part in value.split(';') {
            let part = part.trim();
            if let Some(name) = part.strip_prefix("filename=") {
                let name = name.trim_matches('"');
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            } else if let Some(encoded) = part.strip_prefix("filename*=") {
                // RFC 5987: charset'lang'percent-encoded-name
                if let Some(idx) = encoded.rfind('\'')
                    && let Ok(decoded) = urlencoding::decode(&encoded[idx + 1..])
                    && !decoded.is_empty()
                {
                    return Some(decoded.into_owned());
                }
            }
        }
    }

    // The final URL reflects any redirects the transfer followed
    let last_segment = response
        .url()
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())?;

    match urlencoding::decode(last_segment) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(_) => Some(last_segment.to_string()),
    }
}

/// Last-resort file name derived from a URL string, for responses whose
/// final URL has no path (e.g. a bare host)
pub fn file_name_from_url(url: &str) -> Option<String> {
    let segment = url.rsplit('/').next().filter(|s| !s.is_empty())?;
    match urlencoding::decode(segment) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(_) => Some(segment.to_string()),
    }
}

/// Read a document from an `http(s)://` URI or a local path
///
/// Consumers use this to load the mod-list document, which may live next to
/// the pack or on a web host.
///
/// # Errors
///
/// Network errors, non-success statuses and file-system errors propagate.
pub async fn read_uri(client: &reqwest::Client, uri: &str) -> Result<String> {
    let lower = uri.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        let text = client
            .get(uri)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    } else {
        Ok(tokio::fs::read_to_string(Path::new(uri)).await?)
    }
}
