//! Filename helpers: header parsing, sanitizing and URL fallbacks.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Name used when neither headers nor the URL yield a usable filename.
pub(crate) const FALLBACK_FILENAME: &str = "download.bin";

/// Extracts the filename from a `Content-Disposition` header value.
///
/// The RFC 5987 `filename*=charset''value` form wins over plain
/// `filename=` (quoted or bare).
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    let params = header.split(';').map(str::trim);

    let mut plain = None;
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value
                    .split_once("''")
                    .map_or(value, |(_, rest)| rest)
                    .trim();
                if let Ok(decoded) = urlencoding::decode(encoded)
                    && !decoded.is_empty()
                {
                    return Some(decoded.into_owned());
                }
            }
            "filename" => {
                let value = value.trim().trim_matches('"');
                if !value.is_empty() && plain.is_none() {
                    plain = Some(value.to_string());
                }
            }
            _ => {}
        }
    }
    plain
}

/// Replaces characters that are invalid on common filesystems.
///
/// Path separators, `: * ? " < > |` and control characters become `_`.
/// Names that would resolve to `.` or `..` have their dots replaced too.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }
    if is_plain_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

/// Last non-empty path segment of `url`, percent-decoded and sanitized.
pub(crate) fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    Some(sanitize_filename(&decoded))
}

/// Joins sanitized segments under `root`, so remote names never escape it.
pub(crate) fn join_sanitized<I, S>(root: &Path, segments: I) -> PathBuf
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .fold(root.to_path_buf(), |path, segment| {
            path.join(sanitize_filename(segment.as_ref()))
        })
}

fn is_plain_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
