//! Storage handles: the object a connector is built on, and the views derived from it.

use std::{
    any::Any,
    cell::RefCell,
    fmt,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use tessera_io::{
    ByteChannel, ByteWindow, ChannelDataInput, CharReader, Closeable, InputStream, ReadAt,
    SharedChannel, SharedDataInput, SharedReader, SharedStream, utils::borrow_mut,
};
use url::Url;

use crate::{
    channel_factory::ChannelFactory,
    connection::{Connection, ConnectionFactory, SharedConnection},
};

/// A storage handle, or a view of one.
///
/// Stateful handles are shared (`Rc`) and compared by identity; value handles (paths,
/// URLs, text) are compared by value. Cloning a handle never copies the underlying
/// resource.
#[derive(Clone)]
pub enum Handle {
    Path(PathBuf),
    Url(Url),
    /// A path-like string.
    Text(String),
    /// A positional blob, such as a memory buffer or a file opened for random access.
    Blob(Arc<dyn ReadAt>),
    Channel(SharedChannel),
    Stream(SharedStream),
    DataInput(SharedDataInput),
    Reader(SharedReader),
    Connection(SharedConnection),
    ConnectionFactory(Rc<dyn ConnectionFactory>),
    Bytes(ByteWindow),
    ChannelFactory(Rc<ChannelFactory>),
    /// Any other object, typically understood by a single format reader.
    Opaque(Rc<dyn Any>),
}

fn address<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc).cast::<()>() as usize
}

impl Handle {
    pub fn channel(channel: impl ByteChannel + 'static) -> Handle {
        Handle::Channel(Rc::new(RefCell::new(channel)))
    }

    pub fn stream(stream: impl InputStream + 'static) -> Handle {
        Handle::Stream(Rc::new(RefCell::new(stream)))
    }

    pub fn reader(reader: impl CharReader + 'static) -> Handle {
        Handle::Reader(Rc::new(RefCell::new(reader)))
    }

    pub fn data_input(input: ChannelDataInput) -> Handle {
        Handle::DataInput(Rc::new(RefCell::new(input)))
    }

    pub fn blob(blob: impl ReadAt) -> Handle {
        Handle::Blob(Arc::new(blob))
    }

    pub fn connection(connection: impl Connection + 'static) -> Handle {
        Handle::Connection(Rc::new(RefCell::new(connection)))
    }

    pub fn connection_factory(factory: impl ConnectionFactory + 'static) -> Handle {
        Handle::ConnectionFactory(Rc::new(factory))
    }

    pub fn opaque<T: Any>(value: T) -> Handle {
        Handle::Opaque(Rc::new(value))
    }

    /// Short name of the handle category.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Handle::Path(_) => "Path",
            Handle::Url(_) => "URL",
            Handle::Text(_) => "String",
            Handle::Blob(_) => "ReadAt",
            Handle::Channel(_) => "ByteChannel",
            Handle::Stream(_) => "InputStream",
            Handle::DataInput(_) => "ChannelDataInput",
            Handle::Reader(_) => "Reader",
            Handle::Connection(_) => "Connection",
            Handle::ConnectionFactory(_) => "ConnectionFactory",
            Handle::Bytes(_) => "ByteBuffer",
            Handle::ChannelFactory(_) => "ChannelFactory",
            Handle::Opaque(_) => "Object",
        }
    }

    /// Returns `true` if both handles designate the same object.
    pub fn same_object(&self, other: &Handle) -> bool {
        match (self, other) {
            (Handle::Path(a), Handle::Path(b)) => a == b,
            (Handle::Url(a), Handle::Url(b)) => a == b,
            (Handle::Text(a), Handle::Text(b)) => a == b,
            (Handle::Bytes(a), Handle::Bytes(b)) => a.ptr_eq(b),
            (Handle::Blob(a), Handle::Blob(b)) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            _ => match (self.address(), other.address()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Address of the shared object, for handles compared by identity.
    pub(crate) fn address(&self) -> Option<usize> {
        match self {
            Handle::Channel(rc) => Some(address(rc)),
            Handle::Stream(rc) => Some(address(rc)),
            Handle::DataInput(rc) => Some(address(rc)),
            Handle::Reader(rc) => Some(address(rc)),
            Handle::Connection(rc) => Some(address(rc)),
            Handle::ConnectionFactory(rc) => Some(address(rc)),
            Handle::ChannelFactory(rc) => Some(address(rc)),
            Handle::Opaque(rc) => Some(address(rc)),
            Handle::Path(_)
            | Handle::Url(_)
            | Handle::Text(_)
            | Handle::Blob(_)
            | Handle::Bytes(_) => None,
        }
    }

    /// Returns `true` if the handle holds a resource that must be closed.
    pub fn is_closeable(&self) -> bool {
        matches!(
            self,
            Handle::Channel(_)
                | Handle::Stream(_)
                | Handle::DataInput(_)
                | Handle::Reader(_)
                | Handle::Connection(_)
        )
    }

    /// Closes the resource held by the handle. Does nothing for handles that are not
    /// closeable.
    pub fn close(&self) -> std::io::Result<()> {
        match self {
            Handle::Channel(rc) => borrow_mut(rc, "channel")?.close(),
            Handle::Stream(rc) => borrow_mut(rc, "input stream")?.close(),
            Handle::DataInput(rc) => borrow_mut(rc, "binary reader")?.close(),
            Handle::Reader(rc) => borrow_mut(rc, "reader")?.close(),
            Handle::Connection(rc) => borrow_mut(rc, "connection")?.close(),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Handle::Url(url) => f.debug_tuple("Url").field(&url.as_str()).finish(),
            Handle::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Handle::Bytes(window) => f.debug_tuple("Bytes").field(window).finish(),
            Handle::DataInput(input) => match input.try_borrow() {
                Ok(input) => f.debug_tuple("DataInput").field(&*input).finish(),
                Err(_) => f.write_str("DataInput(<in use>)"),
            },
            Handle::ChannelFactory(factory) => {
                f.debug_tuple("ChannelFactory").field(factory).finish()
            }
            other => write!(f, "{}@{:#x}", other.kind_name(), other.address().unwrap_or(0)),
        }
    }
}

impl From<PathBuf> for Handle {
    fn from(path: PathBuf) -> Self {
        Handle::Path(path)
    }
}

impl From<&Path> for Handle {
    fn from(path: &Path) -> Self {
        Handle::Path(path.to_path_buf())
    }
}

impl From<Url> for Handle {
    fn from(url: Url) -> Self {
        Handle::Url(url)
    }
}

impl From<String> for Handle {
    fn from(text: String) -> Self {
        Handle::Text(text)
    }
}

impl From<&str> for Handle {
    fn from(text: &str) -> Self {
        Handle::Text(text.to_string())
    }
}

impl From<SharedChannel> for Handle {
    fn from(channel: SharedChannel) -> Self {
        Handle::Channel(channel)
    }
}

impl From<SharedStream> for Handle {
    fn from(stream: SharedStream) -> Self {
        Handle::Stream(stream)
    }
}

impl From<SharedDataInput> for Handle {
    fn from(input: SharedDataInput) -> Self {
        Handle::DataInput(input)
    }
}

impl From<SharedReader> for Handle {
    fn from(reader: SharedReader) -> Self {
        Handle::Reader(reader)
    }
}

impl From<SharedConnection> for Handle {
    fn from(connection: SharedConnection) -> Self {
        Handle::Connection(connection)
    }
}

impl From<ByteWindow> for Handle {
    fn from(window: ByteWindow) -> Self {
        Handle::Bytes(window)
    }
}
