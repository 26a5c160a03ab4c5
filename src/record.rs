//! Definition of fixed size values that are written to and read from streams as raw bytes.
//!
//! Records are transmuted to and from bytes without copying, in native byte
//! order and without any framing. Both sides of a stream must agree on the
//! layout of records.

use crate::{Device, Outcome, Readable, Stream, Writable};
use bytemuck::{Pod, bytes_of, bytes_of_mut, cast_slice, cast_slice_mut};

/// Fixed sized type with compile time known layout, that can be transmuted to and from bytes.
///
/// There is a blanket implementation for types that implement [`Pod`].
pub trait Record: Pod {
    /// Size of the record in bytes.
    #[inline]
    fn size() -> usize {
        size_of::<Self>()
    }

    /// Zero copy transmute from record to bytes.
    #[inline]
    fn to_bytes(record: &Self) -> &[u8] {
        bytes_of(record)
    }

    /// Zero copy transmute from record to mutable bytes.
    #[inline]
    fn to_bytes_mut(record: &mut Self) -> &mut [u8] {
        bytes_of_mut(record)
    }
}

impl<T: Pod> Record for T {}

impl<D: Device + Writable> Stream<D> {
    /// Write a record as raw bytes.
    ///
    /// * Returns number of bytes written.
    ///
    /// # Arguments
    ///
    /// * `record` - Record to write.
    pub fn write_record<T: Record>(&mut self, record: &T) -> Outcome<usize> {
        self.write(T::to_bytes(record))
    }

    /// Write a slice of records as raw bytes.
    ///
    /// * Returns number of bytes written.
    ///
    /// # Arguments
    ///
    /// * `records` - Records to write.
    pub fn write_records<T: Record>(&mut self, records: &[T]) -> Outcome<usize> {
        self.write(cast_slice(records))
    }
}

impl<D: Device + Readable> Stream<D> {
    /// Read a record from raw bytes.
    ///
    /// When stream ends before the whole record is read, returned record holds
    /// the bytes that were read, followed by zeros.
    pub fn read_record<T: Record>(&mut self) -> Outcome<T> {
        let mut record = T::zeroed();
        let (_, error) = self.read_exact(T::to_bytes_mut(&mut record)).into_parts();
        Outcome::new(record, error)
    }

    /// Read records from raw bytes, until `records` is full.
    ///
    /// * Returns number of complete records read.
    ///
    /// # Arguments
    ///
    /// * `records` - Records to read into.
    pub fn read_records<T: Record>(&mut self, records: &mut [T]) -> Outcome<usize> {
        self.read_exact(cast_slice_mut(records)).map(|read| read / T::size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, devices::VecDevice};
    use bolero::{TypeGenerator, check};
    use bytemuck::Zeroable;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, TypeGenerator, Pod, Zeroable)]
    struct Log {
        seq_no: u64,
        offset: u32,
        flags: u32,
    }

    #[test]
    fn records_survive_a_stream() {
        check!().with_type::<Vec<Log>>().for_each(|records| {
            let mut stream = Stream::new(VecDevice::new());
            for record in records {
                assert_eq!(stream.write_record(record), Outcome::ok(Log::size()));
            }

            let device = stream.into_inner().into_result().unwrap();
            assert_eq!(device.len(), records.len() * Log::size());

            let mut stream = Stream::new(VecDevice::from(device.into_vec()));
            let mut read = vec![Log::zeroed(); records.len()];
            assert_eq!(stream.read_records(&mut read), Outcome::ok(records.len()));
            assert_eq!(&read, records);
        });
    }

    #[test]
    fn truncated_record() {
        let mut stream = Stream::new(VecDevice::from(vec![1, 0, 0, 0]));
        let (record, error) = stream.read_record::<Log>().into_parts();
        assert_eq!(record.seq_no.to_ne_bytes()[..4], [1, 0, 0, 0]);
        assert_eq!(error.map(|error| error.kind()), Some(ErrorKind::EndOfFile));
    }

    #[test]
    fn slice_of_records() {
        let records = [
            Log { seq_no: 1, offset: 2, flags: 3 },
            Log { seq_no: 4, offset: 5, flags: 6 },
        ];
        let mut stream = Stream::new(VecDevice::new());
        assert_eq!(stream.write_records(&records), Outcome::ok(2 * Log::size()));

        let device = stream.into_inner().into_result().unwrap();
        let mut stream = Stream::new(VecDevice::from(device.into_vec()));
        assert_eq!(stream.read_record::<Log>(), Outcome::ok(records[0]));
        assert_eq!(stream.read_record::<Log>(), Outcome::ok(records[1]));
        assert_eq!(stream.read_record::<Log>().error_kind(), Some(ErrorKind::EndOfFile));
    }
}
