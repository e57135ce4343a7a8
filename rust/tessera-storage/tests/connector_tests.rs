use std::{
    cell::Cell,
    io::{Cursor, Read},
    ops::Range,
    path::{Path, PathBuf},
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tessera_common::error::ErrorKind;
use tessera_io::{
    Closeable, FileReader, ForwardStream, InputStream, MarkableStream, ReadAt, StreamChannel,
    shared,
};
use tessera_storage::{
    ByteWindow, ChannelFactory, Connection, ConnectionFactory, Encoding, Handle,
    SharedConnection, SharedDataInput, SharedReader, SharedStream, StorageConnector,
    StorageOptions, ViewKind,
};

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write");
    path
}

fn data_input(connector: &mut StorageConnector) -> SharedDataInput {
    connector
        .get::<SharedDataInput>()
        .expect("get binary reader")
        .expect("binary reader available")
}

struct FakeConnection {
    closed: Rc<Cell<bool>>,
}

impl Closeable for FakeConnection {
    fn close(&mut self) -> std::io::Result<()> {
        self.closed.set(true);
        Ok(())
    }
}

impl Connection for FakeConnection {
    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

struct CountingFactory {
    connects: Rc<Cell<usize>>,
    closed: Rc<Cell<bool>>,
}

impl ConnectionFactory for CountingFactory {
    fn connect(&self) -> std::io::Result<SharedConnection> {
        self.connects.set(self.connects.get() + 1);
        Ok(shared(FakeConnection {
            closed: self.closed.clone(),
        }))
    }
}

/// A blob counting how many times its size was asked, that is how many channels were
/// opened and read on it.
struct CountingBlob {
    bytes: Vec<u8>,
    sizes: Arc<AtomicUsize>,
}

impl ReadAt for CountingBlob {
    fn size(&self) -> std::io::Result<u64> {
        self.sizes.fetch_add(1, Ordering::SeqCst);
        Ok(self.bytes.len() as u64)
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        self.bytes.read_at(range)
    }
}

#[test]
fn test_views_are_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "data.bin", &sample(300));
    let mut connector = StorageConnector::new(path.clone());

    let first = connector.get_storage_as(ViewKind::DataInput).unwrap().unwrap();
    let second = connector.get_storage_as(ViewKind::DataInput).unwrap().unwrap();
    assert!(first.same_object(&second));

    let buffer = connector.get::<ByteWindow>().unwrap().unwrap();
    let again = connector.get::<ByteWindow>().unwrap().unwrap();
    assert!(buffer.ptr_eq(&again));
    assert_eq!(buffer.to_vec(), sample(300));

    let text = connector.get::<String>().unwrap().unwrap();
    assert_eq!(text, path.to_string_lossy());
    assert_eq!(connector.get::<PathBuf>().unwrap(), Some(path.clone()));
    assert!(connector.get_storage().unwrap().same_object(&Handle::from(path)));

    // Unavailable views are remembered as well.
    assert!(connector.get_storage_as(ViewKind::Connection).unwrap().is_none());
    assert!(connector.get_storage_as(ViewKind::Connection).unwrap().is_none());
}

#[test]
fn test_connection_opened_once() {
    let connects = Rc::new(Cell::new(0));
    let closed = Rc::new(Cell::new(false));
    let factory = CountingFactory {
        connects: connects.clone(),
        closed: closed.clone(),
    };
    let mut connector = StorageConnector::new(Handle::connection_factory(factory));

    let first = connector.get_storage_as(ViewKind::Connection).unwrap().unwrap();
    let second = connector.get_storage_as(ViewKind::Connection).unwrap().unwrap();
    assert!(first.same_object(&second));
    assert_eq!(connects.get(), 1);
    assert!(connector.get_storage_as(ViewKind::DataInput).unwrap().is_none());
    assert_eq!(connector.storage_name(), "ConnectionFactory");
    assert_eq!(connector.file_extension(), None);

    connector.close_all_except(None).unwrap();
    assert!(closed.get());
}

#[test]
fn test_blob_channel_opened_once() {
    let sizes = Arc::new(AtomicUsize::new(0));
    let blob = CountingBlob {
        bytes: sample(100),
        sizes: sizes.clone(),
    };
    let mut connector = StorageConnector::new(Handle::blob(blob));

    let input = data_input(&mut connector);
    assert!(Rc::ptr_eq(&input, &data_input(&mut connector)));
    connector.get::<ByteWindow>().unwrap().unwrap();
    connector.get::<SharedStream>().unwrap().unwrap();
    assert!(Rc::ptr_eq(&input, &data_input(&mut connector)));
    assert_eq!(sizes.load(Ordering::SeqCst), 1);

    // The factory opens the blob again, independently of the binary reader.
    let factory = connector.get::<Rc<ChannelFactory>>().unwrap().unwrap();
    let channel = factory.reader("blob").unwrap();
    let mut bytes = Vec::new();
    channel.borrow_mut().read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, sample(100));
    assert_eq!(sizes.load(Ordering::SeqCst), 2);
}

#[test]
fn test_using_a_view_resets_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let content = sample(200);
    let path = write_file(dir.path(), "data.bin", &content);
    let mut connector = StorageConnector::new(path);

    let input = data_input(&mut connector);
    let stream = connector.get::<SharedStream>().unwrap().unwrap();
    let mut bytes = Vec::new();
    stream.borrow_mut().read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, content);

    // The stream read through the binary reader; asking for it again rewinds it.
    let again = data_input(&mut connector);
    assert!(Rc::ptr_eq(&input, &again));
    assert_eq!(again.borrow().stream_position(), 0);
    let mut buf = vec![0u8; content.len()];
    again.borrow_mut().read_fully(&mut buf).unwrap();
    assert_eq!(buf, content);

    let stream_again = connector.get::<SharedStream>().unwrap().unwrap();
    assert!(Handle::Stream(stream_again.clone()).same_object(&Handle::Stream(stream)));
    let mut bytes = Vec::new();
    stream_again.borrow_mut().read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, content);
}

#[test]
fn test_typed_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "header.bin",
        &[0xCA, 0xFE, 0xBA, 0xBE, 0x01, 0x00, 0x00, 0x00],
    );
    let mut connector = StorageConnector::new(path);
    let input = data_input(&mut connector);
    let mut input = input.borrow_mut();
    assert_eq!(input.read_u32().unwrap(), 0xCAFE_BABE);
    input.set_byte_order(tessera_io::Endianness::LittleEndian);
    assert_eq!(input.read_u32().unwrap(), 1);
}

#[test]
fn test_close_keeps_the_view_in_use() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "data.txt", b"some text");
    let mut connector = StorageConnector::new(path);

    let input = data_input(&mut connector);
    let stream = connector.get::<SharedStream>().unwrap().unwrap();
    let reader = connector.get::<SharedReader>().unwrap().unwrap();

    connector
        .close_all_except(Some(&Handle::DataInput(input.clone())))
        .unwrap();
    assert!(connector.is_closed());

    assert!(!input.borrow().is_closed());
    let mut input = input.borrow_mut();
    input.seek(0).unwrap();
    let mut buf = [0u8; 4];
    input.read_fully(&mut buf).unwrap();
    assert_eq!(&buf, b"some");

    assert!(reader.borrow_mut().read_to_string().is_err());
    assert!(stream.borrow_mut().read(&mut buf).is_err());
}

#[test]
fn test_close_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "data.txt", b"some text");
    let mut connector = StorageConnector::new(path);

    let input = data_input(&mut connector);
    let reader = connector.get::<SharedReader>().unwrap().unwrap();
    connector.close_all_except(None).unwrap();
    assert!(input.borrow().is_closed());
    assert!(reader.borrow_mut().read_to_string().is_err());

    let err = connector.get::<SharedDataInput>().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
}

/// A markable stream counting how many times it was closed.
struct CountingStream {
    inner: MarkableStream<Cursor<Vec<u8>>>,
    closes: Rc<Cell<usize>>,
}

impl Read for CountingStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl InputStream for CountingStream {
    fn mark(&mut self, read_limit: usize) {
        self.inner.mark(read_limit);
    }

    fn reset(&mut self) -> std::io::Result<()> {
        self.inner.reset()
    }

    fn mark_supported(&self) -> bool {
        true
    }
}

impl Closeable for CountingStream {
    fn close(&mut self) -> std::io::Result<()> {
        self.closes.set(self.closes.get() + 1);
        self.inner.close()
    }
}

fn counting_stream(text: &str, closes: &Rc<Cell<usize>>) -> Handle {
    Handle::stream(CountingStream {
        inner: MarkableStream::new(Cursor::new(text.as_bytes().to_vec())),
        closes: closes.clone(),
    })
}

#[test]
fn test_forward_stream_probed_by_several_views() {
    let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";
    let stream = ForwardStream::new(Cursor::new(text.as_bytes().to_vec()));
    let mut connector = StorageConnector::new(Handle::stream(stream));

    let buffer = connector.get::<ByteWindow>().unwrap().unwrap();
    assert!(buffer.starts_with(b"Lorem"));

    let reader = connector.get::<SharedReader>().unwrap().unwrap();
    assert_eq!(reader.borrow_mut().read_to_string().unwrap(), text);

    let input = data_input(&mut connector);
    let mut head = [0u8; 5];
    input.borrow_mut().read_fully(&mut head).unwrap();
    assert_eq!(&head, b"Lorem");
    assert!(!connector.prefetch().unwrap());

    // The stream itself has been consumed.
    let err = connector.get_storage().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::StreamNotRewindable { .. }));
    connector.close_all_except(None).unwrap();
}

#[test]
fn test_non_seekable_channel_as_storage() {
    let bytes = sample(100);
    let stream: SharedStream = shared(ForwardStream::new(Cursor::new(bytes.clone())));
    let mut connector = StorageConnector::new(Handle::channel(StreamChannel::new(stream)));

    let input = data_input(&mut connector);
    assert!(connector.get::<SharedStream>().unwrap().is_some());
    let again = data_input(&mut connector);
    assert!(Rc::ptr_eq(&input, &again));
    let mut all = Vec::new();
    again.borrow_mut().read_to_end(&mut all).unwrap();
    assert_eq!(all, bytes);
}

#[test]
fn test_shared_stream_closed_once() {
    let closes = Rc::new(Cell::new(0));
    let mut connector = StorageConnector::new(counting_stream("abc", &closes));
    data_input(&mut connector);
    assert!(connector.get::<SharedReader>().unwrap().is_some());
    connector.close_all_except(None).unwrap();
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_kept_reader_keeps_its_stream() {
    let closes = Rc::new(Cell::new(0));
    let mut connector = StorageConnector::new(counting_stream("abc", &closes));
    data_input(&mut connector);
    let reader = connector.get::<SharedReader>().unwrap().unwrap();
    connector
        .close_all_except(Some(&Handle::Reader(reader.clone())))
        .unwrap();
    assert_eq!(closes.get(), 0);
    assert_eq!(reader.borrow_mut().read_to_string().unwrap(), "abc");
}

#[test]
fn test_markable_stream_probed_by_several_views() {
    let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";
    let stream = MarkableStream::new(Cursor::new(text.as_bytes().to_vec()));
    let mut connector = StorageConnector::new(Handle::stream(stream));

    let buffer = connector.get::<ByteWindow>().unwrap().unwrap();
    assert!(!buffer.is_empty());
    assert!(buffer.starts_with(b"Lorem"));

    let reader = connector.get::<SharedReader>().unwrap().unwrap();
    assert_eq!(reader.borrow_mut().read_to_string().unwrap(), text);

    let input = data_input(&mut connector);
    let mut head = [0u8; 5];
    input.borrow_mut().read_fully(&mut head).unwrap();
    assert_eq!(&head, b"Lorem");

    // A stream can't be opened again.
    assert!(connector.get::<Rc<ChannelFactory>>().unwrap().is_none());
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut connector = StorageConnector::new(dir.path().join("missing.bin"));

    let err = connector.get_storage_as(ViewKind::DataInput).unwrap_err();
    match err.kind() {
        ErrorKind::DataAccess { storage, source } => {
            assert_eq!(storage, "missing.bin");
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(connector.get_storage_as(ViewKind::ByteBuffer).unwrap().is_none());
    assert!(connector.get_storage_as(ViewKind::DataInput).unwrap().is_none());
    assert!(connector.get_storage_as(ViewKind::Reader).unwrap().is_none());
    connector.close_all_except(None).unwrap();
}

#[test]
fn test_prefetch_grows_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let content = sample(1000);
    let path = write_file(dir.path(), "large.bin", &content);
    let options = StorageOptions::from_json(r#"{"buffer_size": 64}"#).unwrap();
    let mut connector = StorageConnector::with_options(path, options);

    let buffer = connector.get::<ByteWindow>().unwrap().unwrap();
    assert_eq!(buffer.len(), 64);
    let mut len = buffer.len();
    while connector.prefetch().unwrap() {
        assert!(buffer.len() > len);
        len = buffer.len();
    }
    assert_eq!(buffer.len(), content.len());
    assert_eq!(buffer.to_vec(), content);
    assert!(!connector.prefetch().unwrap());

    // The binary reader is still at the beginning.
    let input = data_input(&mut connector);
    assert_eq!(input.borrow().stream_position(), 0);
    assert_eq!(input.borrow_mut().read_u8().unwrap(), content[0]);
}

#[test]
fn test_prefetch_after_reading_past_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let content = sample(1000);
    let path = write_file(dir.path(), "large.bin", &content);
    let options = StorageOptions::from_json(r#"{"buffer_size": 64}"#).unwrap();
    let mut connector = StorageConnector::with_options(path, options);

    let buffer = connector.get::<ByteWindow>().unwrap().unwrap();
    let input = data_input(&mut connector);
    let mut skipped = [0u8; 200];
    input.borrow_mut().read_fully(&mut skipped).unwrap();

    assert!(connector.prefetch().unwrap());
    assert_eq!(buffer.to_vec(), &content[..128]);
    assert_eq!(input.borrow().stream_position(), 200);
    assert_eq!(input.borrow_mut().read_u8().unwrap(), content[200]);
}

#[test]
fn test_prefetch_without_views() {
    let mut connector = StorageConnector::new(Handle::opaque(42u32));
    assert!(!connector.prefetch().unwrap());
    assert!(connector.get::<ByteWindow>().unwrap().is_none());
    assert!(!connector.prefetch().unwrap());
}

#[test]
fn test_byte_buffer_from_stream_when_writing() {
    let content = sample(100);
    let stream = MarkableStream::new(Cursor::new(content.clone()));
    let options = StorageOptions::from_json(r#"{"open_options": "READ | WRITE"}"#).unwrap();
    let mut connector = StorageConnector::with_options(Handle::stream(stream), options);

    assert!(connector.get::<SharedDataInput>().unwrap().is_none());
    let buffer = connector.get::<ByteWindow>().unwrap().unwrap();
    assert_eq!(buffer.to_vec(), content);
    assert!(!connector.prefetch().unwrap());

    let stream = connector.get::<SharedStream>().unwrap().unwrap();
    let mut bytes = Vec::new();
    stream.borrow_mut().read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, content);
}

#[test]
fn test_stream_without_mark_support() {
    let stream = ForwardStream::new(Cursor::new(b"abcdef".to_vec()));
    let mut connector = StorageConnector::new(Handle::stream(stream));
    let buffer = connector.get::<ByteWindow>().unwrap().unwrap();
    assert!(buffer.starts_with(b"abcdef"));

    // The binary reader consumed the stream, which can't be rewound.
    let err = connector.get_storage().unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::StreamNotRewindable { .. }
    ));
}

#[test]
fn test_reader_encoding_option() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "latin.txt", b"caf\xe9");
    let options = StorageOptions::from_json(r#"{"encoding": "ISO-8859-1"}"#).unwrap();
    let mut connector = StorageConnector::with_options(path, options);
    assert_eq!(connector.options().encoding(), Encoding::Iso8859_1);

    let reader = connector.get::<SharedReader>().unwrap().unwrap();
    assert_eq!(reader.borrow_mut().read_to_string().unwrap(), "café");
}

#[test]
fn test_names() {
    let mut connector = StorageConnector::new(PathBuf::from("/data/archive.tar.gz"));
    assert_eq!(connector.storage_name(), "archive.tar.gz");
    assert_eq!(connector.file_extension(), Some("gz"));
    assert_eq!(
        connector.to_string(),
        "StorageConnector[\"archive.tar.gz\"]"
    );
    assert_eq!(
        connector.get::<String>().unwrap().as_deref(),
        Some("/data/archive.tar.gz")
    );

    let connector = StorageConnector::new(".hidden");
    assert_eq!(connector.file_extension(), Some(""));
}

#[test]
fn test_file_opened_for_random_access() {
    let dir = tempfile::tempdir().unwrap();
    let content = sample(500);
    let path = write_file(dir.path(), "random.bin", &content);
    let options = StorageOptions::from_json(r#"{"buffer_size": 128}"#).unwrap();
    let mut connector =
        StorageConnector::with_options(Handle::blob(FileReader::open(&path).unwrap()), options);
    assert_eq!(connector.storage_name(), "ReadAt");

    let input = data_input(&mut connector);
    let mut input = input.borrow_mut();
    input.seek(400).unwrap();
    assert_eq!(input.read_u8().unwrap(), content[400]);
    input.seek(10).unwrap();
    assert_eq!(input.read_u8().unwrap(), content[10]);
}
