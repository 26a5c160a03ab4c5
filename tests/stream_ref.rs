mod common;

use crossio::{
    Caps, Outcome, Stream, Whence, capability_set,
    devices::{FileDevice, RingDevice, SpanDevice, VecDevice},
    stream_ref::{
        CapabilitySet, Duplex, Positional, RandomAccess, SeekableSink, Sink, Source, StreamRef,
    },
};

capability_set! {
    /// Durable append only log.
    struct Journal { Write, Sync, Tell }
}

/// Same report for every kind of device.
fn report(mut sink: StreamRef<'_, Sink>, name: &str) {
    assert_eq!(sink.write(b"device: "), Outcome::ok(8));
    assert_eq!(sink.write(name.as_bytes()), Outcome::ok(name.len()));
    assert_eq!(sink.put(b'\n'), Outcome::ok(()));
    assert_eq!(sink.flush(), Outcome::ok(()));
}

fn drain(mut source: StreamRef<'_, Source>) -> Vec<u8> {
    let mut bytes = Vec::new();
    loop {
        let (byte, error) = source.get().into_parts();
        match error {
            None => bytes.push(byte),
            Some(error) => {
                assert!(error.is_eof());
                return bytes;
            }
        }
    }
}

#[test]
fn one_sink_many_devices() {
    common::init_logging();

    let mut vec = Stream::new(VecDevice::new());
    report(StreamRef::new(&mut vec), "vec");
    assert_eq!(vec.get_ref().as_slice(), b"device: vec\n");

    let mut memory = [0; 32];
    let mut span = Stream::new(SpanDevice::new(&mut memory));
    report(StreamRef::new(&mut span), "span");
    assert_eq!(span.get_ref().as_slice(), b"device: span\n");

    let mut ring = Stream::new(RingDevice::with_capacity(64).unwrap());
    report(StreamRef::new(&mut ring), "ring");
    assert_eq!(drain(StreamRef::new(&mut ring)), b"device: ring\n");

    let mut file = Stream::new(FileDevice::from(tempfile::tempfile().unwrap()));
    report(StreamRef::new(&mut file), "file");
    assert_eq!(file.seek(0), Outcome::ok(0));
    assert_eq!(drain(StreamRef::new(&mut file)), b"device: file\n");
}

#[test]
fn narrowing_keeps_position() {
    let mut stream = Stream::new(VecDevice::new());
    let mut random = StreamRef::<RandomAccess>::new(&mut stream);

    {
        let mut sink = random.narrow::<SeekableSink>();
        assert_eq!(sink.write(b"abcdef"), Outcome::ok(6));
        assert_eq!(sink.seek_by(-3, Whence::Current), Outcome::ok(3));
        assert_eq!(sink.tell(), Outcome::ok(3));
    }

    let mut duplex = random.into_narrow::<Duplex>();
    assert_eq!(duplex.get(), Outcome::ok(b'd'));
    assert_eq!(drain(duplex.into_narrow()), b"ef");
}

#[test]
fn user_defined_set() {
    assert_eq!(Journal::CAPS, Caps::WRITE | Caps::SYNC | Caps::TELL);
    assert_eq!(Journal::CAPS.to_string(), "{write, sync, tell}");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal");
    let mut stream = Stream::new(FileDevice::create(&path).unwrap());

    let mut journal = StreamRef::<Journal>::new(&mut stream);
    assert_eq!(journal.caps(), Journal::CAPS);
    assert_eq!(journal.write(b"entry\n"), Outcome::ok(6));
    assert_eq!(journal.tell(), Outcome::ok(6));
    assert_eq!(journal.sync(), Outcome::ok(()));
    assert_eq!(std::fs::read(&path).unwrap(), b"entry\n");
}

#[cfg(unix)]
#[test]
fn positional_access_to_file() {
    let mut stream = Stream::new(FileDevice::from(tempfile::tempfile().unwrap()));
    let mut positional = StreamRef::<Positional>::new(&mut stream);
    assert_eq!(positional.write_at(b"world", 6), Outcome::ok(5));
    assert_eq!(positional.write_at(b"hello ", 0), Outcome::ok(6));

    let mut buf = [0; 11];
    assert_eq!(positional.read_at(&mut buf, 0), Outcome::ok(11));
    assert_eq!(&buf, b"hello world");
}
