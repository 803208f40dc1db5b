//! Single-writer, multi-reader ring buffer indexed by sample position.
//!
//! Positions come in two flavours:
//!
//! - **physical**: number of samples ever written into the ring
//! - **logical**: physical + offset, where the offset is re-anchored by
//!   [`TimeBuffer::sync`] so that logical positions track the pipeline clock
//!
//! Readers always address logical positions. The ring keeps the last
//! `capacity` physical samples; anything older is reported as
//! [`BufferError::Evicted`].

use crate::stop::StopSignal;
use crate::stream::{Stream, StreamDescriptor};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Slice used by interruptible reads to re-check the stop signal
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Result of a buffer access that could not complete
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("destination too small: need {required} bytes, got {available}")]
    DestinationTooSmall { required: usize, available: usize },

    #[error("requested {requested} samples but capacity is {capacity}")]
    ExceedsCapacity { requested: usize, capacity: usize },

    #[error("samples up to {requested_end} not yet written (position {position})")]
    NotYetAvailable { requested_end: i64, position: i64 },

    #[error("sample {requested_start} was evicted (oldest retained {oldest})")]
    Evicted { requested_start: i64, oldest: i64 },

    #[error("empty or invalid span")]
    InvalidSpan,

    #[error("buffer closed")]
    Closed,
}

#[derive(Clone, Copy)]
enum WaitMode<'a> {
    NoWait,
    UntilClosed,
    Until(&'a StopSignal),
}

enum Source<'a> {
    Bytes(&'a [u8]),
    Zeroes(usize),
}

impl Source<'_> {
    fn len(&self) -> usize {
        match self {
            Source::Bytes(b) => b.len(),
            Source::Zeroes(n) => *n,
        }
    }
}

struct Ring {
    data: Vec<u8>,
    /// Total bytes ever written
    written: u64,
    /// Logical minus physical sample position
    offset: i64,
    closed: bool,
}

impl Ring {
    fn write(&mut self, src: Source<'_>) {
        let cap = self.data.len();
        let len = src.len();
        // Only the newest `cap` bytes can survive, skip the rest.
        let skip = len.saturating_sub(cap);
        let keep = len - skip;
        let start = ((self.written + skip as u64) % cap as u64) as usize;
        let first = keep.min(cap - start);

        match src {
            Source::Bytes(bytes) => {
                let bytes = &bytes[skip..];
                self.data[start..start + first].copy_from_slice(&bytes[..first]);
                self.data[..keep - first].copy_from_slice(&bytes[first..]);
            }
            Source::Zeroes(_) => {
                self.data[start..start + first].fill(0);
                self.data[..keep - first].fill(0);
            }
        }
        self.written += len as u64;
    }

    fn copy_out(&self, dst: &mut [u8], phys_start_byte: u64) {
        let cap = self.data.len();
        let len = dst.len();
        let start = (phys_start_byte % cap as u64) as usize;
        let first = len.min(cap - start);
        dst[..first].copy_from_slice(&self.data[start..start + first]);
        dst[first..].copy_from_slice(&self.data[..len - first]);
    }
}

/// Time-indexed circular buffer shared between one writer and many readers
pub struct TimeBuffer {
    name: String,
    descriptor: StreamDescriptor,
    bytes_per_sample: usize,
    capacity_samples: usize,
    ring: Mutex<Ring>,
    cond: Condvar,
    // Mirrors of the ring cursor for lock-free position queries.
    written_samples: AtomicU64,
    offset: AtomicI64,
}

impl TimeBuffer {
    /// Create a buffer holding `capacity_seconds` of `descriptor`'s stream
    pub fn new(name: impl Into<String>, descriptor: StreamDescriptor, capacity_seconds: f64) -> Self {
        let name = name.into();
        let bytes_per_sample = descriptor.bytes_per_sample().max(1);
        let capacity_samples = descriptor.samples_for(capacity_seconds).max(1);
        debug!(
            buffer = %name,
            capacity_samples,
            bytes_per_sample,
            sample_rate = descriptor.sample_rate,
            "Created time buffer"
        );
        Self {
            name,
            bytes_per_sample,
            capacity_samples,
            ring: Mutex::new(Ring {
                data: vec![0; capacity_samples * bytes_per_sample],
                written: 0,
                offset: 0,
                closed: false,
            }),
            cond: Condvar::new(),
            written_samples: AtomicU64::new(0),
            offset: AtomicI64::new(0),
            descriptor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn sample_rate(&self) -> f64 {
        self.descriptor.sample_rate
    }

    pub fn capacity_samples(&self) -> usize {
        self.capacity_samples
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    /// Samples physically written since the last reset
    pub fn written_samples(&self) -> u64 {
        self.written_samples.load(Ordering::Acquire)
    }

    /// Logical write position (next sample index to be written)
    pub fn position_samples(&self) -> i64 {
        self.written_samples() as i64 + self.offset.load(Ordering::Acquire)
    }

    /// Time in seconds at the logical write position
    pub fn last_sample_time(&self) -> f64 {
        self.position_samples() as f64 / self.descriptor.sample_rate
    }

    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }

    /// Append raw sample bytes. Trailing partial samples are dropped.
    pub fn push(&self, bytes: &[u8]) {
        let remainder = bytes.len() % self.bytes_per_sample;
        if remainder != 0 {
            warn!(
                buffer = %self.name,
                bytes = bytes.len(),
                "Dropping {} trailing bytes of a partial sample",
                remainder
            );
        }
        let usable = &bytes[..bytes.len() - remainder];
        if usable.is_empty() {
            return;
        }
        self.write(Source::Bytes(usable));
    }

    /// Append the contents of a stream
    pub fn push_stream(&self, stream: &Stream) {
        self.push(stream.bytes());
    }

    /// Append `samples` zero samples (stall compensation)
    pub fn push_zeroes(&self, samples: usize) {
        if samples == 0 {
            return;
        }
        self.write(Source::Zeroes(samples * self.bytes_per_sample));
    }

    fn write(&self, src: Source<'_>) {
        let mut ring = self.ring.lock();
        if ring.closed {
            return;
        }
        ring.write(src);
        self.written_samples
            .store(ring.written / self.bytes_per_sample as u64, Ordering::Release);
        drop(ring);
        self.cond.notify_all();
    }

    /// Blocking read of `num_samples` starting at logical `start_sample`.
    /// Waits until the range is written or the buffer is closed.
    pub fn get(&self, dst: &mut [u8], start_sample: i64, num_samples: usize) -> Result<(), BufferError> {
        self.read(dst, start_sample, num_samples, WaitMode::UntilClosed)
    }

    /// Non-blocking read; reports `NotYetAvailable` instead of waiting
    pub fn try_get(&self, dst: &mut [u8], start_sample: i64, num_samples: usize) -> Result<(), BufferError> {
        self.read(dst, start_sample, num_samples, WaitMode::NoWait)
    }

    /// Blocking read that also gives up with `Closed` once `stop` fires
    pub fn get_interruptible(
        &self,
        dst: &mut [u8],
        start_sample: i64,
        num_samples: usize,
        stop: &StopSignal,
    ) -> Result<(), BufferError> {
        self.read(dst, start_sample, num_samples, WaitMode::Until(stop))
    }

    /// Blocking read addressed in seconds of the virtual clock
    pub fn get_time(&self, dst: &mut [u8], start_time: f64, duration: f64) -> Result<(), BufferError> {
        let rate = self.descriptor.sample_rate;
        let start = (start_time * rate).round() as i64;
        let samples = (duration * rate).round();
        if samples < 1.0 {
            return Err(BufferError::InvalidSpan);
        }
        self.get(dst, start, samples as usize)
    }

    /// Fill `stream` (all of its samples) starting at logical `start_sample`
    pub fn get_stream(&self, stream: &mut Stream, start_sample: i64) -> Result<(), BufferError> {
        self.read_stream(stream, start_sample, WaitMode::UntilClosed)
    }

    pub fn get_stream_interruptible(
        &self,
        stream: &mut Stream,
        start_sample: i64,
        stop: &StopSignal,
    ) -> Result<(), BufferError> {
        self.read_stream(stream, start_sample, WaitMode::Until(stop))
    }

    fn read_stream(&self, stream: &mut Stream, start_sample: i64, mode: WaitMode<'_>) -> Result<(), BufferError> {
        let n = stream.num_samples;
        self.read(stream.bytes_mut(), start_sample, n, mode)?;
        stream.time = start_sample as f64 / self.descriptor.sample_rate;
        Ok(())
    }

    fn read(
        &self,
        dst: &mut [u8],
        start: i64,
        num_samples: usize,
        mode: WaitMode<'_>,
    ) -> Result<(), BufferError> {
        if num_samples == 0 {
            return Err(BufferError::InvalidSpan);
        }
        let required = num_samples * self.bytes_per_sample;
        if dst.len() < required {
            return Err(BufferError::DestinationTooSmall {
                required,
                available: dst.len(),
            });
        }
        if num_samples > self.capacity_samples {
            return Err(BufferError::ExceedsCapacity {
                requested: num_samples,
                capacity: self.capacity_samples,
            });
        }

        let bps = self.bytes_per_sample as i64;
        let mut ring = self.ring.lock();
        loop {
            if ring.closed {
                return Err(BufferError::Closed);
            }

            let written = ring.written as i64 / bps;
            let oldest = (written - self.capacity_samples as i64).max(0);
            let phys_start = start - ring.offset;
            if start < 0 || phys_start < oldest {
                return Err(BufferError::Evicted {
                    requested_start: start,
                    oldest: (oldest + ring.offset).max(0),
                });
            }

            let phys_end = phys_start + num_samples as i64;
            if phys_end <= written {
                ring.copy_out(&mut dst[..required], (phys_start * bps) as u64);
                return Ok(());
            }

            match mode {
                WaitMode::NoWait => {
                    return Err(BufferError::NotYetAvailable {
                        requested_end: start + num_samples as i64,
                        position: written + ring.offset,
                    });
                }
                WaitMode::UntilClosed => self.cond.wait(&mut ring),
                WaitMode::Until(stop) => {
                    if stop.is_stopped() {
                        return Err(BufferError::Closed);
                    }
                    self.wait_slice(&mut ring);
                }
            }
        }
    }

    fn wait_slice(&self, ring: &mut MutexGuard<'_, Ring>) {
        let _ = self.cond.wait_for(ring, WAIT_SLICE);
    }

    /// Re-anchor logical positions so the write position maps to `time`.
    /// Only the offset changes; physical data and the writer are untouched.
    pub fn sync(&self, time: f64) {
        let mut ring = self.ring.lock();
        let written = (ring.written / self.bytes_per_sample as u64) as i64;
        let target = (time * self.descriptor.sample_rate).round() as i64;
        let old = ring.offset;
        ring.offset = target - written;
        self.offset.store(ring.offset, Ordering::Release);
        drop(ring);
        if old != target - written {
            debug!(
                buffer = %self.name,
                shift = target - written - old,
                "Re-anchored buffer to clock"
            );
        }
        self.cond.notify_all();
    }

    /// Clear all data and reopen the buffer for a new run
    pub fn reset(&self) {
        let mut ring = self.ring.lock();
        ring.data.fill(0);
        ring.written = 0;
        ring.offset = 0;
        ring.closed = false;
        self.written_samples.store(0, Ordering::Release);
        self.offset.store(0, Ordering::Release);
        drop(ring);
        self.cond.notify_all();
    }

    /// Close the buffer and wake every blocked reader with `Closed`
    pub fn close(&self) {
        self.ring.lock().closed = true;
        self.cond.notify_all();
        debug!(buffer = %self.name, "Closed time buffer");
    }
}

impl std::fmt::Debug for TimeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeBuffer")
            .field("name", &self.name)
            .field("capacity_samples", &self.capacity_samples)
            .field("position", &self.position_samples())
            .finish()
    }
}
