//! The openers creating each view kind, and the prefetch of more bytes into the byte
//! buffer view.

use std::rc::Rc;

use log::debug;
use tessera_common::{Result, error::Error};
use tessera_io::{
    ByteWindow, ChannelDataInput, DataInputStream, SharedReader, SharedStream, StreamReader,
    shared, utils::borrow_mut, utils::skip_exact,
};

use super::StorageConnector;
use crate::{
    DEFAULT_BUFFER_SIZE, MINIMAL_BUFFER_SIZE, channel_factory::ChannelFactory,
    handle::Handle, kind::ViewKind, naming,
};

impl StorageConnector {
    /// Creates the view of the given kind and registers it, or registers that there is
    /// none. Invoked at most once per kind, unless the opener failed.
    pub(super) fn open(&mut self, kind: ViewKind) -> Result<Option<Handle>> {
        match kind {
            ViewKind::Text => self.open_text(),
            ViewKind::ByteBuffer => self.open_byte_buffer(),
            ViewKind::DataInput => self.open_data_input(),
            ViewKind::Stream => self.open_stream(),
            ViewKind::Reader => self.open_reader(),
            ViewKind::Connection => self.open_connection(),
            ViewKind::ChannelFactory => self.open_channel_factory(),
            ViewKind::Path | ViewKind::Url | ViewKind::Channel => Err(
                Error::unsupported_conversion(self.storage.kind_name(), kind.name()),
            ),
        }
    }

    fn register(
        &mut self,
        kind: ViewKind,
        view: Option<Handle>,
        source: Option<ViewKind>,
        cascade_on_reset: bool,
        cascade_on_close: bool,
    ) -> Result<Option<Handle>> {
        let graph = self.graph_mut()?;
        if view.is_some() {
            graph.add_view(kind, view.clone(), source, cascade_on_reset, cascade_on_close);
        } else {
            graph.add_view(kind, None, None, false, false);
        }
        Ok(view)
    }

    fn open_text(&mut self) -> Result<Option<Handle>> {
        let view = naming::path_string(&self.storage).map(Handle::Text);
        self.register(ViewKind::Text, view, None, false, false)
    }

    /// Opens a channel on the storage and wraps it in a buffered binary reader. The
    /// channel and, when it can open the storage again, the channel factory are
    /// registered as well.
    fn open_data_input(&mut self) -> Result<Option<Handle>> {
        self.reset_storage()?;
        let buffer_size = self.options.buffer_size();
        // The channel may consume a stream given as storage; the mark lets the other
        // views start from the beginning again.
        let read_limit = buffer_size.max(DEFAULT_BUFFER_SIZE);
        match &self.storage {
            Handle::Stream(stream) => borrow_mut(stream, "input stream")?.mark(read_limit),
            Handle::Reader(reader) => borrow_mut(reader, "reader")?.mark(read_limit),
            _ => {}
        }

        let Some(factory) = ChannelFactory::prepare(
            &self.storage,
            self.options.url_encoding(),
            self.options.open_options(),
        ) else {
            return self.register(ViewKind::DataInput, None, None, false, false);
        };
        let name = self.storage_name().to_string();
        let channel = factory.reader(&name)?;
        self.graph_mut()?.add_view(
            ViewKind::Channel,
            Some(Handle::Channel(channel.clone())),
            None,
            factory.is_coupled(),
            false,
        );

        let input = ChannelDataInput::new(name, channel, buffer_size)?;
        let view = Handle::DataInput(shared(input));
        let graph = self.graph_mut()?;
        graph.add_view(
            ViewKind::DataInput,
            Some(view.clone()),
            Some(ViewKind::Channel),
            true,
            false,
        );
        if factory.can_open() {
            graph.add_view(
                ViewKind::ChannelFactory,
                Some(Handle::ChannelFactory(Rc::new(factory))),
                None,
                false,
                false,
            );
        }
        debug!("opened {view:?} on '{}'", self.storage_name());
        Ok(Some(view))
    }

    /// Shares the window of the binary reader. Without a binary reader, reads the first
    /// bytes of the input stream into a small window of its own.
    fn open_byte_buffer(&mut self) -> Result<Option<Handle>> {
        if let Some(Handle::DataInput(input)) = self.get_storage_as(ViewKind::DataInput)? {
            let window = borrow_mut(&input, "binary reader")?.head_window().clone();
            return self.register(
                ViewKind::ByteBuffer,
                Some(Handle::Bytes(window)),
                None,
                false,
                false,
            );
        }

        let mut view = None;
        if let Some(Handle::Stream(stream)) = self.get_storage_as(ViewKind::Stream)? {
            let mut stream = borrow_mut(&stream, "input stream")?;
            if stream.mark_supported() {
                let window = ByteWindow::with_capacity(MINIMAL_BUFFER_SIZE);
                stream.mark(MINIMAL_BUFFER_SIZE);
                let n = window.fill_from(&mut *stream, MINIMAL_BUFFER_SIZE)?;
                stream.reset()?;
                if n > 0 {
                    view = Some(Handle::Bytes(window));
                }
            }
        }
        self.register(ViewKind::ByteBuffer, view, None, false, false)
    }

    /// Adapts the binary reader as an input stream. Closing the adapter leaves the
    /// binary reader open. Without a binary reader, a stream given as storage is used
    /// as it is.
    fn open_stream(&mut self) -> Result<Option<Handle>> {
        let view = match self.get_storage_as(ViewKind::DataInput)? {
            Some(Handle::DataInput(input)) => {
                let stream: SharedStream = shared(DataInputStream::new(input));
                Some(Handle::Stream(stream))
            }
            _ if matches!(self.storage, Handle::Stream(_)) => {
                self.reset_storage()?;
                Some(self.storage.clone())
            }
            _ => None,
        };
        self.register(ViewKind::Stream, view, Some(ViewKind::DataInput), true, true)
    }

    /// Decodes the input stream with the encoding option. The reader does not support
    /// mark and reset, since resetting it would not rewind the stream.
    fn open_reader(&mut self) -> Result<Option<Handle>> {
        let view = match self.get_storage_as(ViewKind::Stream)? {
            Some(Handle::Stream(stream)) => {
                borrow_mut(&stream, "input stream")?.mark(DEFAULT_BUFFER_SIZE);
                let reader: SharedReader =
                    shared(StreamReader::new(stream, self.options.encoding()));
                Some(Handle::Reader(reader))
            }
            _ => None,
        };
        self.register(ViewKind::Reader, view, Some(ViewKind::Stream), true, false)
    }

    fn open_connection(&mut self) -> Result<Option<Handle>> {
        let view = match &self.storage {
            Handle::ConnectionFactory(factory) => Some(Handle::Connection(factory.connect()?)),
            _ => None,
        };
        self.register(ViewKind::Connection, view, None, false, true)
    }

    /// The channel factory is a by-product of the binary reader. A missing factory is
    /// not remembered.
    fn open_channel_factory(&mut self) -> Result<Option<Handle>> {
        self.get_storage_as(ViewKind::DataInput)?;
        Ok(self.graph_mut()?.view(ViewKind::ChannelFactory).flatten().cloned())
    }

    /// Transfers more bytes from the storage to the byte buffer view. Returns `false`
    /// if no byte was added: the end of the storage was reached, the buffer is full, or
    /// no binary reader nor stream is available.
    ///
    /// Format probers invoke this method when the bytes in the buffer are not enough to
    /// recognize the format. The position of the other views is unchanged.
    pub fn prefetch(&mut self) -> Result<bool> {
        self.ensure_open()?;
        self.try_prefetch().map_err(|e| {
            if e.is_domain() {
                e
            } else {
                e.in_storage(self.storage_name())
            }
        })
    }

    fn try_prefetch(&mut self) -> Result<bool> {
        let input_id = self.graph_mut()?.get(ViewKind::DataInput);
        if let Some(id) = input_id {
            if !self.reset_node(id)? {
                return Ok(false);
            }
            let view = self.graph_mut()?.node(id).view.clone();
            if let Some(Handle::DataInput(input)) = view {
                let mut input = borrow_mut(&input, "binary reader")?;
                let before = input.head_window().len();
                let n = input.prefetch()?;
                let grown = input.head_window().len() > before;
                debug!("prefetched {n} byte(s) of '{}', buffer grown: {grown}", input.name());
                return Ok(grown);
            }
        }

        // No binary reader: the byte buffer, if any, was read from the stream.
        let graph = self.graph_mut()?;
        let (Some(stream_id), Some(buffer_id)) =
            (graph.get(ViewKind::Stream), graph.get(ViewKind::ByteBuffer))
        else {
            return Ok(false);
        };
        if !self.reset_node(stream_id)? || !self.reset_node(buffer_id)? {
            return Ok(false);
        }
        let graph = self.graph_mut()?;
        let (Some(Handle::Stream(stream)), Some(Handle::Bytes(window))) = (
            graph.node(stream_id).view.clone(),
            graph.node(buffer_id).view.clone(),
        ) else {
            return Ok(false);
        };
        let p = window.len();
        let remaining = MINIMAL_BUFFER_SIZE.saturating_sub(p);
        if remaining == 0 {
            return Ok(false);
        }
        let mut stream = borrow_mut(&stream, "input stream")?;
        stream.mark(MINIMAL_BUFFER_SIZE);
        skip_exact(&mut *stream, p as u64)?;
        let n = window.fill_from(&mut *stream, remaining)?;
        stream.reset()?;
        debug!("prefetched {n} byte(s) of '{}' from the stream", self.storage_name());
        Ok(n > 0)
    }
}
