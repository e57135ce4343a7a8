//! The storage connector: a registry of the views derived from one storage handle.

mod openers;

use std::{cell::OnceCell, fmt};

use log::{debug, warn};
use tessera_common::{
    Result,
    error::{Error, ErrorKind},
};

use crate::{
    convert,
    coupled::{NodeId, ROOT, ViewGraph},
    handle::Handle,
    kind::{StorageView, ViewKind},
    naming,
    options::{OptionKey, OptionValue, StorageOptions},
};

enum ViewState {
    /// No view requested yet.
    Unopened,
    Open(ViewGraph),
    /// The connector has been closed and can't be used anymore.
    Closed,
}

/// Information about a storage (path, URL, stream, channel, database...) for which
/// format readers are searched.
///
/// Each format prober asks the connector for the view it understands (a byte buffer
/// with the first bytes, a binary reader, a character reader...). Views are created
/// lazily, cached, and share the underlying resource: when a view has been used, the
/// views sharing its position are reset the next time they are requested, so every
/// prober starts from the beginning of the data. Probers must still leave the views
/// they obtained in the state they found them.
///
/// Once a format reader has been chosen, [`StorageConnector::close_all_except`] closes
/// every view but the one used by that reader (and the views it depends on). The
/// connector can't be used after that.
///
/// A connector is meant for a single thread.
pub struct StorageConnector {
    storage: Handle,
    name: OnceCell<String>,
    extension: OnceCell<Option<String>>,
    options: StorageOptions,
    state: ViewState,
}

impl StorageConnector {
    pub fn new(storage: impl Into<Handle>) -> StorageConnector {
        StorageConnector::with_options(storage, StorageOptions::default())
    }

    pub fn with_options(storage: impl Into<Handle>, options: StorageOptions) -> StorageConnector {
        StorageConnector {
            storage: storage.into(),
            name: OnceCell::new(),
            extension: OnceCell::new(),
            options,
            state: ViewState::Unopened,
        }
    }

    pub fn get_option(&self, key: OptionKey) -> Option<OptionValue> {
        self.options.get(key)
    }

    /// Sets or removes an option. Options should be set before any view is requested.
    pub fn set_option(&mut self, key: OptionKey, value: Option<OptionValue>) -> Result<()> {
        self.options.set(key, value)
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Returns a short name of the storage, typically the file name.
    pub fn storage_name(&self) -> &str {
        self.name
            .get_or_init(|| naming::storage_name(&self.storage, self.options.url_encoding()))
    }

    /// Returns the file extension of the storage: empty if the name has none, `None`
    /// if the storage is not path-like.
    pub fn file_extension(&self) -> Option<&str> {
        self.extension
            .get_or_init(|| naming::file_extension(&self.storage, self.options.url_encoding()))
            .as_deref()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ViewState::Closed)
    }

    /// Returns the storage handle given at construction, rewound to its initial
    /// position if a view has moved it.
    pub fn get_storage(&mut self) -> Result<Handle> {
        self.ensure_open()?;
        self.reset_storage()?;
        Ok(self.storage.clone())
    }

    /// Returns the storage as a view of the given kind, or `None` if no such view can
    /// be created. Both outcomes are cached: asking again for the same kind returns the
    /// same view, reset to its initial position if another view has moved it.
    pub fn get_storage_as(&mut self, kind: ViewKind) -> Result<Option<Handle>> {
        self.ensure_open()?;
        let cached = self.graph_mut()?.get(kind);
        if let Some(id) = cached {
            if self.reset_node(id)? {
                return Ok(self.graph_mut()?.node(id).view.clone());
            }
        }

        // A forward-only stream is read through the binary reader, which keeps the first
        // bytes in memory.
        if ViewKind::of(&self.storage) == Some(kind) && !self.is_forward_only() {
            self.reset_storage()?;
            let view = self.storage.clone();
            self.graph_mut()?.add_view(kind, Some(view.clone()), None, false, false);
            return Ok(Some(view));
        }

        if !kind.has_opener() {
            let view = convert::convert(&self.storage, kind, self.options.url_encoding())?;
            self.graph_mut()?.add_view(kind, Some(view.clone()), None, false, false);
            return Ok(Some(view));
        }

        debug!("opening {kind} view of '{}'", self.storage_name());
        match self.open(kind) {
            Ok(view) => Ok(view),
            Err(e) if is_borrow_conflict(&e) => Err(Error::invalid_operation(format!(
                "open {kind} view of '{}' while a view is borrowed: {e}",
                self.storage_name()
            ))),
            Err(e) if e.is_domain() => Err(e),
            Err(e) => {
                let e = e.in_storage(self.storage_name());
                debug!("{kind} view of '{}' is not available: {e}", self.storage_name());
                // Remember the failure. A channel factory may become available later.
                if kind != ViewKind::ChannelFactory {
                    let graph = self.graph_mut()?;
                    if graph.get(kind).is_none() {
                        graph.add_view(kind, None, None, false, false);
                    }
                }
                Err(e)
            }
        }
    }

    /// Typed version of [`StorageConnector::get_storage_as`].
    pub fn get<T: StorageView>(&mut self) -> Result<Option<T>> {
        Ok(self.get_storage_as(T::KIND)?.and_then(T::from_handle))
    }

    /// Closes every view created by this connector except `keep`, the views `keep`
    /// depends on, and the views that would close `keep` when closed. With no view to
    /// keep, everything is closed, including the storage handle.
    ///
    /// Every view is closed at most once, and all of them are attempted even if some
    /// fail; the first failure is reported with the others attached. The connector is
    /// unusable afterward, whatever the outcome.
    pub fn close_all_except(&mut self, keep: Option<&Handle>) -> Result<()> {
        let state = std::mem::replace(&mut self.state, ViewState::Closed);
        let views = match state {
            ViewState::Closed => {
                return Err(Error::invalid_operation(
                    "close_all_except on a closed storage connector",
                ));
            }
            ViewState::Unopened => {
                let kept = keep.is_some_and(|keep| keep.same_object(&self.storage));
                if kept || !self.storage.is_closeable() {
                    Vec::new()
                } else {
                    vec![self.storage.clone()]
                }
            }
            ViewState::Open(graph) => graph.close_plan(keep),
        };

        debug!(
            "closing {} view(s) of '{}'",
            views.len(),
            self.storage_name()
        );
        let mut failure: Option<(std::io::Error, Vec<std::io::Error>)> = None;
        for view in views {
            if let Err(e) = view.close() {
                warn!(
                    "failed to close {} of '{}': {e}",
                    view.kind_name(),
                    self.storage_name()
                );
                match &mut failure {
                    None => failure = Some((e, Vec::new())),
                    Some((_, suppressed)) => suppressed.push(e),
                }
            }
        }
        match failure {
            None => Ok(()),
            Some((source, suppressed)) => Err(Error::close_failure(
                self.storage_name(),
                source,
                suppressed,
            )),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::invalid_operation(format!(
                "use of storage connector '{}' after close",
                self.storage_name()
            )))
        } else {
            Ok(())
        }
    }

    fn graph_mut(&mut self) -> Result<&mut ViewGraph> {
        if matches!(self.state, ViewState::Unopened) {
            self.state = ViewState::Open(ViewGraph::new(self.storage.clone()));
        }
        match &mut self.state {
            ViewState::Open(graph) => Ok(graph),
            _ => Err(Error::invalid_operation(
                "use of storage connector after close",
            )),
        }
    }

    /// Resets the given node if it is invalid, then invalidates the nodes sharing its
    /// position. Returns whether the node is valid.
    fn reset_node(&mut self, id: NodeId) -> Result<bool> {
        let result = self.graph_mut()?.reset(id);
        let done = result.map_err(|e| self.rewind_error(e))?;
        let graph = self.graph_mut()?;
        if done {
            debug!("reset view node {id}: {:?}", graph.node(id));
            graph.invalidate_sources(id);
            graph.invalidate_usages(id);
        }
        Ok(graph.node(id).is_valid)
    }

    /// Rewinds the storage handle, if views have been created from it.
    fn reset_storage(&mut self) -> Result<()> {
        if matches!(self.state, ViewState::Open(_)) && !self.reset_node(ROOT)? {
            return Err(Error::stream_not_rewindable(self.storage_name(), None));
        }
        Ok(())
    }

    /// Whether the storage is a stream that can't be marked and reset.
    fn is_forward_only(&self) -> bool {
        match &self.storage {
            Handle::Stream(stream) => stream.try_borrow().is_ok_and(|s| !s.mark_supported()),
            _ => false,
        }
    }

    fn rewind_error(&self, e: std::io::Error) -> Error {
        if e.kind() == std::io::ErrorKind::WouldBlock {
            Error::invalid_operation(format!("reset of '{}': {e}", self.storage_name()))
        } else {
            Error::stream_not_rewindable(self.storage_name(), Some(e))
        }
    }
}

/// A shared view was still borrowed by the caller while the connector needed it.
fn is_borrow_conflict(e: &Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::DataAccess { source, .. } if source.kind() == std::io::ErrorKind::WouldBlock
    )
}

impl fmt::Display for StorageConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageConnector[\"{}\"", self.storage_name())?;
        if !self.options.is_empty() {
            write!(f, ", options={}", self.options)?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for StorageConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("StorageConnector");
        s.field("storage", &self.storage)
            .field("options", &self.options);
        match &self.state {
            ViewState::Unopened => s.field("views", &"none"),
            ViewState::Open(graph) => s.field("views", graph),
            ViewState::Closed => s.field("views", &"closed"),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, io::Read, path::PathBuf, rc::Rc};

    use tessera_common::error::ErrorKind;
    use tessera_io::{ByteChannel, Closeable, InputStream};

    use super::{StorageConnector, ViewState};
    use crate::{
        connection::Connection,
        coupled::ViewGraph,
        handle::Handle,
        kind::ViewKind,
        options::{OptionKey, OptionValue},
    };

    /// A source that reads nothing and counts its closes.
    struct Probe {
        id: usize,
        closes: Rc<Cell<usize>>,
        fail: bool,
    }

    impl Probe {
        fn new(id: usize, fail: bool) -> (Probe, Rc<Cell<usize>>) {
            let closes = Rc::new(Cell::new(0));
            let probe = Probe {
                id,
                closes: closes.clone(),
                fail,
            };
            (probe, closes)
        }
    }

    impl Read for Probe {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Closeable for Probe {
        fn close(&mut self) -> std::io::Result<()> {
            self.closes.set(self.closes.get() + 1);
            if self.fail {
                Err(std::io::Error::other(format!("probe {} failed", self.id)))
            } else {
                Ok(())
            }
        }
    }

    impl ByteChannel for Probe {
        fn position(&self) -> u64 {
            0
        }
    }

    impl InputStream for Probe {}

    impl Connection for Probe {
        fn is_closed(&self) -> bool {
            self.closes.get() > 0
        }
    }

    fn is_invalid_operation(result: tessera_common::Result<impl Sized>) -> bool {
        matches!(
            result.map(|_| ()).map_err(|e| e.into_kind()),
            Err(ErrorKind::InvalidOperation { .. })
        )
    }

    #[test]
    fn test_close_failures_are_aggregated() {
        let (first, first_closes) = Probe::new(1, false);
        let (second, second_closes) = Probe::new(2, true);
        let (third, third_closes) = Probe::new(3, true);

        let storage = Handle::opaque(0u8);
        let mut graph = ViewGraph::new(storage.clone());
        graph.add_view(ViewKind::Channel, Some(Handle::channel(first)), None, false, false);
        graph.add_view(ViewKind::Stream, Some(Handle::stream(second)), None, false, false);
        graph.add_view(
            ViewKind::Connection,
            Some(Handle::connection(third)),
            None,
            false,
            false,
        );
        let mut connector = StorageConnector::new(storage);
        connector.state = ViewState::Open(graph);

        let err = connector.close_all_except(None).unwrap_err();
        match err.into_kind() {
            ErrorKind::CloseFailure {
                source, suppressed, ..
            } => {
                assert_eq!(source.to_string(), "probe 2 failed");
                assert_eq!(suppressed.len(), 1);
                assert_eq!(suppressed[0].to_string(), "probe 3 failed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(first_closes.get(), 1);
        assert_eq!(second_closes.get(), 1);
        assert_eq!(third_closes.get(), 1);
        assert!(connector.is_closed());
    }

    #[test]
    fn test_second_close_fails() {
        let mut connector = StorageConnector::new(PathBuf::from("data.bin"));
        connector.close_all_except(None).unwrap();
        assert!(is_invalid_operation(connector.close_all_except(None)));
    }

    #[test]
    fn test_use_after_close() {
        let mut connector = StorageConnector::new(PathBuf::from("data.bin"));
        connector.close_all_except(None).unwrap();
        assert!(is_invalid_operation(connector.get_storage()));
        assert!(is_invalid_operation(connector.get_storage_as(ViewKind::Text)));
        assert!(is_invalid_operation(connector.prefetch()));
        // Name and options stay available for diagnostics.
        assert_eq!(connector.storage_name(), "data.bin");
    }

    #[test]
    fn test_unopened_close_closes_storage() {
        let (probe, closes) = Probe::new(1, false);
        let mut connector = StorageConnector::new(Handle::stream(probe));
        connector.close_all_except(None).unwrap();
        assert_eq!(closes.get(), 1);

        let (probe, closes) = Probe::new(2, false);
        let storage = Handle::stream(probe);
        let mut connector = StorageConnector::new(storage.clone());
        connector.close_all_except(Some(&storage)).unwrap();
        assert_eq!(closes.get(), 0);
    }

    #[test]
    fn test_borrowed_view_is_invalid_operation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut connector = StorageConnector::new(path);
        let Some(Handle::DataInput(input)) = connector.get_storage_as(ViewKind::DataInput).unwrap()
        else {
            panic!("no binary reader");
        };
        // Obtaining the stream invalidates the binary reader it reads from.
        connector.get_storage_as(ViewKind::Stream).unwrap().unwrap();
        let guard = input.borrow_mut();
        assert!(is_invalid_operation(connector.get_storage_as(ViewKind::DataInput)));
        drop(guard);
        let view = connector.get_storage_as(ViewKind::DataInput).unwrap().unwrap();
        assert!(view.same_object(&Handle::DataInput(input)));
    }

    #[test]
    fn test_display() {
        let mut connector = StorageConnector::new(PathBuf::from("/tmp/data.bin"));
        assert_eq!(connector.to_string(), "StorageConnector[\"data.bin\"]");
        connector
            .set_option(OptionKey::BufferSize, Some(OptionValue::BufferSize(64)))
            .unwrap();
        assert_eq!(
            connector.to_string(),
            "StorageConnector[\"data.bin\", options={buffer_size=64}]"
        );
        assert!(format!("{connector:?}").contains("views: \"none\""));
    }
}
