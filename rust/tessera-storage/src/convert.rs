//! Conversion of path-like handles into the path and URL view kinds.

use std::path::{Path, PathBuf};

use tessera_common::{Result, error::Error};
use url::Url;

use crate::{handle::Handle, kind::ViewKind, options::UrlEncoding};

/// Converts the handle into a view of the given kind, for the kinds which have no
/// dedicated opener.
pub(crate) fn convert(
    handle: &Handle,
    kind: ViewKind,
    url_encoding: UrlEncoding,
) -> Result<Handle> {
    let converted = match kind {
        ViewKind::Path => to_path(handle, url_encoding).map(Handle::Path),
        ViewKind::Url => to_url(handle).map(Handle::Url),
        _ => None,
    };
    converted.ok_or_else(|| Error::unsupported_conversion(handle.kind_name(), kind.name()))
}

/// Parses a text locator as a URL. Single-letter schemes are Windows drive letters, so
/// such text is taken as a path.
pub(crate) fn text_as_url(text: &str) -> Option<Url> {
    Url::parse(text).ok().filter(|url| url.scheme().len() > 1)
}

pub(crate) fn to_path(handle: &Handle, url_encoding: UrlEncoding) -> Option<PathBuf> {
    match handle {
        Handle::Path(path) => Some(path.clone()),
        Handle::Url(url) => url_to_path(url, url_encoding),
        Handle::Text(text) => match text_as_url(text) {
            Some(url) => url_to_path(&url, url_encoding),
            None => Some(PathBuf::from(text)),
        },
        _ => None,
    }
}

fn to_url(handle: &Handle) -> Option<Url> {
    match handle {
        Handle::Url(url) => Some(url.clone()),
        Handle::Path(path) => path_to_url(path),
        Handle::Text(text) => text_as_url(text).or_else(|| path_to_url(Path::new(text))),
        _ => None,
    }
}

fn url_to_path(url: &Url, url_encoding: UrlEncoding) -> Option<PathBuf> {
    if url.scheme() != "file" {
        return None;
    }
    match url_encoding {
        UrlEncoding::Decode => url.to_file_path().ok(),
        UrlEncoding::Verbatim => Some(PathBuf::from(url.path())),
    }
}

fn path_to_url(path: &Path) -> Option<Url> {
    let path = std::path::absolute(path).ok()?;
    Url::from_file_path(path).ok()
}
