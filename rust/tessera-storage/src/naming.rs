//! Storage names and file extensions, derived from the handle.

use std::path::Path;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::{handle::Handle, options::UrlEncoding};

/// Returns the name of the storage: the file name for path-like handles, or the handle
/// category otherwise. The name may be empty when a path ends with a separator.
pub(crate) fn storage_name(handle: &Handle, url_encoding: UrlEncoding) -> String {
    file_name(handle, url_encoding).unwrap_or_else(|| handle.kind_name().to_string())
}

/// Returns the text after the last `.` of the file name, or an empty string if there is
/// none. A leading `.` (hidden files) does not start an extension. Returns `None` for
/// handles which are not path-like.
pub(crate) fn file_extension(handle: &Handle, url_encoding: UrlEncoding) -> Option<String> {
    let name = file_name(handle, url_encoding)?;
    Some(match name.rfind('.') {
        Some(i) if i > 0 => name[i + 1..].to_string(),
        _ => String::new(),
    })
}

/// Returns the path-like string representation of the handle, if it has one.
pub(crate) fn path_string(handle: &Handle) -> Option<String> {
    match handle {
        Handle::Path(path) => Some(path.to_string_lossy().into_owned()),
        Handle::Url(url) => Some(url.as_str().to_string()),
        Handle::Text(text) => Some(text.clone()),
        _ => None,
    }
}

fn file_name(handle: &Handle, url_encoding: UrlEncoding) -> Option<String> {
    match handle {
        Handle::Path(path) => Some(path_file_name(path)),
        Handle::Url(url) => Some(url_file_name(url, url_encoding)),
        Handle::Text(text) => Some(last_component(text).to_string()),
        _ => None,
    }
}

fn path_file_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => last_component(&path.to_string_lossy()).to_string(),
    }
}

fn url_file_name(url: &Url, url_encoding: UrlEncoding) -> String {
    let segment = last_component(url.path());
    match url_encoding {
        UrlEncoding::Decode => percent_decode(segment),
        UrlEncoding::Verbatim => segment.to_string(),
    }
}

fn last_component(text: &str) -> &str {
    let start = text
        .rfind(|c| c == '/' || c == std::path::MAIN_SEPARATOR)
        .map_or(0, |i| i + 1);
    &text[start..]
}

/// Decodes `%XX` escapes. Malformed escapes are kept as they are, and invalid UTF-8
/// sequences are replaced.
pub(crate) fn percent_decode(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}
