//! A registry of the views that format readers need on a storage.
//!
//! A [`StorageConnector`] wraps the storage handle given by the caller (a path, a URL,
//! a stream, a channel, a connection factory...) and lets each format prober ask for
//! the view it understands: the path-like text, the first bytes, a buffered binary
//! reader, a byte stream, a character reader or a database connection. The connector
//! keeps track of which view wraps which, so that using one view resets the others
//! when they are requested again, and so that closing the connector releases every
//! resource except the one kept by the chosen format reader.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use tessera_storage::{StorageConnector, ViewKind};
//!
//! let mut connector = StorageConnector::new(PathBuf::from("data.bin"));
//! let head = connector.get_storage_as(ViewKind::ByteBuffer)?;
//! let input = connector.get_storage_as(ViewKind::DataInput)?;
//! connector.close_all_except(input.as_ref())?;
//! # let _ = head;
//! # Ok::<(), tessera_common::error::Error>(())
//! ```

pub mod channel_factory;
pub mod connection;
pub mod connector;
pub(crate) mod convert;
pub(crate) mod coupled;
pub mod handle;
pub mod kind;
pub(crate) mod naming;
pub mod options;

pub use channel_factory::ChannelFactory;
pub use connection::{Connection, ConnectionFactory, SharedConnection};
pub use connector::StorageConnector;
pub use handle::Handle;
pub use kind::{StorageView, ViewKind};
pub use options::{OpenOptions, OptionKey, OptionValue, StorageOptions, UrlEncoding};
pub use tessera_io::{
    ByteWindow, Encoding, SharedChannel, SharedDataInput, SharedReader, SharedStream,
};

/// Capacity of the buffer of the binary reader, unless specified by
/// [`OptionKey::BufferSize`].
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Number of bytes read in the byte buffer view when it is built from a stream.
pub const MINIMAL_BUFFER_SIZE: usize = 256;
