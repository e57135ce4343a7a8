//! The closed set of view kinds a storage connector can be asked for.

use std::{fmt, path::PathBuf, rc::Rc};

use tessera_io::{ByteWindow, SharedChannel, SharedDataInput, SharedReader, SharedStream};
use url::Url;

use crate::{channel_factory::ChannelFactory, connection::SharedConnection, handle::Handle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// A path-like character string.
    Text,
    Path,
    Url,
    /// A read-only window over the first bytes of the storage.
    ByteBuffer,
    Channel,
    /// The buffered random-access binary reader.
    DataInput,
    Stream,
    Reader,
    Connection,
    /// A factory able to open the storage again.
    ChannelFactory,
}

impl ViewKind {
    /// Returns the kind satisfied by the handle itself, if any.
    pub fn of(handle: &Handle) -> Option<ViewKind> {
        match handle {
            Handle::Path(_) => Some(ViewKind::Path),
            Handle::Url(_) => Some(ViewKind::Url),
            Handle::Text(_) => Some(ViewKind::Text),
            Handle::Channel(_) => Some(ViewKind::Channel),
            Handle::Stream(_) => Some(ViewKind::Stream),
            Handle::DataInput(_) => Some(ViewKind::DataInput),
            Handle::Reader(_) => Some(ViewKind::Reader),
            Handle::Connection(_) => Some(ViewKind::Connection),
            Handle::Bytes(_) => Some(ViewKind::ByteBuffer),
            Handle::ChannelFactory(_) => Some(ViewKind::ChannelFactory),
            Handle::Blob(_) | Handle::ConnectionFactory(_) | Handle::Opaque(_) => None,
        }
    }

    /// Returns `true` if the kind is built by a dedicated opener rather than by
    /// converting the storage handle.
    pub const fn has_opener(self) -> bool {
        !matches!(self, ViewKind::Path | ViewKind::Url | ViewKind::Channel)
    }

    pub fn name(self) -> &'static str {
        match self {
            ViewKind::Text => "String",
            ViewKind::Path => "Path",
            ViewKind::Url => "URL",
            ViewKind::ByteBuffer => "ByteBuffer",
            ViewKind::Channel => "ByteChannel",
            ViewKind::DataInput => "ChannelDataInput",
            ViewKind::Stream => "InputStream",
            ViewKind::Reader => "Reader",
            ViewKind::Connection => "Connection",
            ViewKind::ChannelFactory => "ChannelFactory",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust type standing for one view kind, for use with
/// [`StorageConnector::get`](crate::StorageConnector::get).
pub trait StorageView: Sized {
    const KIND: ViewKind;

    fn from_handle(handle: Handle) -> Option<Self>;
}

macro_rules! storage_view {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl StorageView for $ty {
            const KIND: ViewKind = ViewKind::$kind;

            fn from_handle(handle: Handle) -> Option<Self> {
                match handle {
                    Handle::$variant(view) => Some(view),
                    _ => None,
                }
            }
        }
    };
}

storage_view!(String, Text, Text);
storage_view!(PathBuf, Path, Path);
storage_view!(Url, Url, Url);
storage_view!(ByteWindow, ByteBuffer, Bytes);
storage_view!(SharedChannel, Channel, Channel);
storage_view!(SharedDataInput, DataInput, DataInput);
storage_view!(SharedStream, Stream, Stream);
storage_view!(SharedReader, Reader, Reader);
storage_view!(SharedConnection, Connection, Connection);
storage_view!(Rc<ChannelFactory>, ChannelFactory, ChannelFactory);
