//! Host and path predicates shared by resolver strategies and adapters.

use url::Url;

/// Host labels, lowercased (`www.dropbox.com` → `["www", "dropbox", "com"]`).
pub(crate) fn host_labels(url: &Url) -> Vec<String> {
    url.host_str()
        .map(|host| host.split('.').map(str::to_ascii_lowercase).collect())
        .unwrap_or_default()
}

/// True when the host is exactly `labels`.
pub(crate) fn host_is(url: &Url, labels: &[&str]) -> bool {
    host_labels(url) == labels
}

/// True when the host ends with `labels` (`x.gofile.io` ends with `["gofile", "io"]`).
pub(crate) fn host_ends_with(url: &Url, labels: &[&str]) -> bool {
    let host = host_labels(url);
    host.len() >= labels.len() && host[host.len() - labels.len()..] == *labels
}

/// Raw path segments (`/a/b` → `["a", "b"]`, `/` → `[""]`).
pub(crate) fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments().map(|s| s.collect()).unwrap_or_default()
}

/// First path segment, if any.
pub(crate) fn first_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.next()
}

/// Second path segment when the first equals `prefix` and the second is non-empty.
///
/// Matches the `/<prefix>/<id>` layout every supported host uses.
pub(crate) fn id_after_prefix<'a>(url: &'a Url, prefix: &str) -> Option<&'a str> {
    let mut segments = url.path_segments()?;
    if segments.next()? != prefix {
        return None;
    }
    segments.next().filter(|id| !id.is_empty())
}
