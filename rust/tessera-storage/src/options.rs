//! Options controlling how views are built from a storage handle.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tessera_common::{Result, error::Error, verify_arg};
use tessera_io::Encoding;

use crate::DEFAULT_BUFFER_SIZE;

bitflags! {
    /// Access mode requested when a channel is opened on a path or URL.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct OpenOptions: u32 {
        const READ = 1;
        const WRITE = 2;
        const CREATE = 4;
        const TRUNCATE = 8;
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions::READ
    }
}

impl OpenOptions {
    pub fn is_write(&self) -> bool {
        self.contains(OpenOptions::WRITE)
    }

    pub(crate) fn to_fs_options(self) -> std::fs::OpenOptions {
        let mut options = std::fs::OpenOptions::new();
        options.read(true);
        if self.is_write() {
            options.write(true);
            options.create(self.contains(OpenOptions::CREATE));
            options.truncate(self.contains(OpenOptions::TRUNCATE));
        }
        options
    }
}

/// How percent-encoded characters in URLs are interpreted when a URL is turned into a
/// path or a name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlEncoding {
    /// `%20` stands for a space.
    #[default]
    Decode,
    /// `%20` is taken literally.
    Verbatim,
}

/// Keys of the options understood by the storage connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    Encoding,
    UrlEncoding,
    OpenOptions,
    BufferSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    Encoding(Encoding),
    UrlEncoding(UrlEncoding),
    OpenOptions(OpenOptions),
    BufferSize(usize),
}

impl OptionValue {
    pub fn key(&self) -> OptionKey {
        match self {
            OptionValue::Encoding(_) => OptionKey::Encoding,
            OptionValue::UrlEncoding(_) => OptionKey::UrlEncoding,
            OptionValue::OpenOptions(_) => OptionKey::OpenOptions,
            OptionValue::BufferSize(_) => OptionKey::BufferSize,
        }
    }
}

/// The set of options of one storage connector. Unset options fall back to defaults.
///
/// Options are meant to be set before any view is requested: changing them later has no
/// effect on the views already built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_encoding: Option<UrlEncoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_options: Option<OpenOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
}

impl StorageOptions {
    /// Loads options from their JSON form, e.g. `{"encoding": "ISO-8859-1", "buffer_size": 8192}`.
    pub fn from_json(json: &str) -> Result<StorageOptions> {
        let options: StorageOptions = serde_json::from_str(json)
            .map_err(|e| Error::invalid_arg("options", e.to_string()))?;
        if let Some(size) = options.buffer_size {
            verify_arg!(buffer_size, size > 0);
        }
        Ok(options)
    }

    /// Writes the options that are set in their JSON form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::invalid_arg("options", e.to_string()))
    }

    pub fn get(&self, key: OptionKey) -> Option<OptionValue> {
        match key {
            OptionKey::Encoding => self.encoding.map(OptionValue::Encoding),
            OptionKey::UrlEncoding => self.url_encoding.map(OptionValue::UrlEncoding),
            OptionKey::OpenOptions => self.open_options.map(OptionValue::OpenOptions),
            OptionKey::BufferSize => self.buffer_size.map(OptionValue::BufferSize),
        }
    }

    /// Sets or removes (`None`) the value of an option.
    pub fn set(&mut self, key: OptionKey, value: Option<OptionValue>) -> Result<()> {
        let Some(value) = value else {
            match key {
                OptionKey::Encoding => self.encoding = None,
                OptionKey::UrlEncoding => self.url_encoding = None,
                OptionKey::OpenOptions => self.open_options = None,
                OptionKey::BufferSize => self.buffer_size = None,
            }
            return Ok(());
        };
        if value.key() != key {
            return Err(Error::invalid_arg(
                format!("{key:?}"),
                format!("value {value:?} does not match the option"),
            ));
        }
        match value {
            OptionValue::Encoding(encoding) => self.encoding = Some(encoding),
            OptionValue::UrlEncoding(policy) => self.url_encoding = Some(policy),
            OptionValue::OpenOptions(flags) => self.open_options = Some(flags),
            OptionValue::BufferSize(size) => {
                verify_arg!(buffer_size, size > 0);
                self.buffer_size = Some(size);
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == StorageOptions::default()
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding.unwrap_or_default()
    }

    pub fn url_encoding(&self) -> UrlEncoding {
        self.url_encoding.unwrap_or_default()
    }

    pub fn open_options(&self) -> OpenOptions {
        self.open_options.unwrap_or_default()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }
}

impl fmt::Display for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries = Vec::new();
        if let Some(encoding) = self.encoding {
            entries.push(format!("encoding={encoding}"));
        }
        if let Some(policy) = self.url_encoding {
            entries.push(format!("url_encoding={policy:?}"));
        }
        if let Some(flags) = self.open_options {
            entries.push(format!("open_options={flags:?}"));
        }
        if let Some(size) = self.buffer_size {
            entries.push(format!("buffer_size={size}"));
        }
        write!(f, "{{{}}}", entries.join(", "))
    }
}
