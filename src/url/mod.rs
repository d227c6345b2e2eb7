//! URL splitting and relative-URL resolution, plus the URL handle.
//!
//! The helpers here are deliberately textual: they do not normalise, decode
//! or validate, so a URL round-trips exactly as the caller wrote it.

pub mod handle;

pub use handle::{DoneLatch, UrlHandle};

/// Protocol, host and path of a URL as produced by [`split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub protocol: String,
    /// Host with any `:port` suffix.
    pub host: String,
    /// Path including the leading `/`.
    pub path: String,
}

/// Split `url` into protocol, host and path.
///
/// A missing `scheme://` defaults the protocol to `http`; a missing path
/// defaults to `/`.
///
/// ```
/// # use pullhttp::url::split;
/// let parts = split("http://host:80/path");
/// assert_eq!(parts.protocol, "http");
/// assert_eq!(parts.host, "host:80");
/// assert_eq!(parts.path, "/path");
/// ```
pub fn split(url: &str) -> UrlParts {
    let (protocol, rest) = match url.find("://") {
        Some(pos) => (&url[..pos], &url[pos + 3..]),
        None => ("http", url),
    };

    let (host, path) = match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, "/"),
    };

    UrlParts {
        protocol: protocol.to_string(),
        host: host.to_string(),
        path: path.to_string(),
    }
}

/// Resolve `relative` against `base`, e.g. a redirect `Location`.
///
/// ```
/// # use pullhttp::url::resolve;
/// assert_eq!(resolve("http://a.com/x/y", "z"), "http://a.com/x/z");
/// assert_eq!(resolve("http://a.com/x/y", "/z"), "http://a.com/z");
/// ```
pub fn resolve(base: &str, relative: &str) -> String {
    if has_scheme(relative) {
        return relative.to_string();
    }

    let authority = base.find("://").map_or(0, |pos| pos + 3);

    if relative.starts_with('/') {
        return match base[authority..].find('/') {
            Some(pos) => format!("{}{}", &base[..authority + pos], relative),
            None => format!("{}{}", base, relative),
        };
    }

    match base.rfind('/') {
        Some(pos) if pos >= authority => format!("{}{}", &base[..=pos], relative),
        _ => format!("{}/{}", base, relative),
    }
}

fn has_scheme(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}
