//! Resolution of a byte channel from a storage handle.

use std::{cell::RefCell, fmt, path::PathBuf, rc::Rc, sync::Arc};

use log::debug;
use tessera_io::{FileChannel, ReadAt, ReadAtChannel, SharedChannel, StreamChannel};

use crate::{
    convert::{text_as_url, to_path},
    handle::Handle,
    options::{OpenOptions, UrlEncoding},
};

/// Opens byte channels on a storage handle.
///
/// Factories built on a path or a positional blob can open the storage any number of
/// times. Factories built on an existing channel or stream hand that source out once.
pub enum ChannelFactory {
    File {
        path: PathBuf,
        options: OpenOptions,
    },
    Blob(Arc<dyn ReadAt>),
    Existing {
        channel: RefCell<Option<SharedChannel>>,
        coupled: bool,
    },
}

impl ChannelFactory {
    /// Returns a factory for the given handle, or `None` if no byte channel can be
    /// obtained from it with the requested access mode.
    pub fn prepare(
        handle: &Handle,
        url_encoding: UrlEncoding,
        options: OpenOptions,
    ) -> Option<ChannelFactory> {
        let factory = match handle {
            Handle::Channel(channel) => ChannelFactory::existing(channel.clone(), false),
            Handle::Stream(stream) if !options.is_write() => {
                let channel: SharedChannel =
                    Rc::new(RefCell::new(StreamChannel::new(stream.clone())));
                ChannelFactory::existing(channel, true)
            }
            Handle::Blob(blob) if !options.is_write() => ChannelFactory::Blob(blob.clone()),
            Handle::Path(_) | Handle::Url(_) => ChannelFactory::File {
                path: to_path(handle, url_encoding)?,
                options,
            },
            Handle::Text(text) => {
                if let Some(url) = text_as_url(text) {
                    return ChannelFactory::prepare(&Handle::Url(url), url_encoding, options);
                }
                ChannelFactory::File {
                    path: PathBuf::from(text),
                    options,
                }
            }
            _ => return None,
        };
        debug!("channel factory for {}: {factory:?}", handle.kind_name());
        Some(factory)
    }

    fn existing(channel: SharedChannel, coupled: bool) -> ChannelFactory {
        ChannelFactory::Existing {
            channel: RefCell::new(Some(channel)),
            coupled,
        }
    }

    /// Returns a channel reading the storage from its beginning (or, for an existing
    /// channel, from its current position).
    ///
    /// `name` is the storage name, used in error messages.
    pub fn reader(&self, name: &str) -> std::io::Result<SharedChannel> {
        match self {
            ChannelFactory::File { path, options } => {
                let channel = FileChannel::open(path, &options.to_fs_options())?;
                Ok(Rc::new(RefCell::new(channel)))
            }
            ChannelFactory::Blob(blob) => {
                Ok(Rc::new(RefCell::new(ReadAtChannel::new(blob.clone()))))
            }
            ChannelFactory::Existing { channel, .. } => {
                channel.borrow_mut().take().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        format!("the channel of {name} can be obtained only once"),
                    )
                })
            }
        }
    }

    /// Returns `true` if reading the channel moves the position of the storage handle
    /// itself, so that both must be reset together.
    pub fn is_coupled(&self) -> bool {
        matches!(self, ChannelFactory::Existing { coupled: true, .. })
    }

    /// Returns `true` if [`ChannelFactory::reader`] can be invoked more than once.
    pub fn can_open(&self) -> bool {
        !matches!(self, ChannelFactory::Existing { .. })
    }
}

impl fmt::Debug for ChannelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelFactory::File { path, options } => f
                .debug_struct("File")
                .field("path", path)
                .field("options", options)
                .finish(),
            ChannelFactory::Blob(_) => f.write_str("Blob"),
            ChannelFactory::Existing { coupled, .. } => f
                .debug_struct("Existing")
                .field("coupled", coupled)
                .finish(),
        }
    }
}
