//! Typed sample windows passed into and out of component hooks.
//!
//! A [`Stream`] holds `num_samples × dim` values of one [`SampleKind`],
//! interleaved sample-major. Its storage is a typed vector so components
//! work with `&[f32]` and friends, while the time buffers see the same memory
//! as bytes through `bytemuck`.

use crate::types::SampleKind;
use serde::{Deserialize, Serialize};

/// Shape of a stream: element type, channels per sample and rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub kind: SampleKind,
    /// Number of values per sample
    pub dim: usize,
    /// Samples per second
    pub sample_rate: f64,
    /// Human-readable name of each dimension
    #[serde(default)]
    pub labels: Vec<String>,
}

impl StreamDescriptor {
    pub fn new(kind: SampleKind, dim: usize, sample_rate: f64) -> Self {
        Self {
            kind,
            dim,
            sample_rate,
            labels: Vec::new(),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Size in bytes of one sample (all dimensions)
    pub fn bytes_per_sample(&self) -> usize {
        self.kind.size_bytes() * self.dim
    }

    /// Number of samples covering `seconds` at this rate
    pub fn samples_for(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate).round().max(0.0) as usize
    }

    /// Label of dimension `index`, falling back to its index
    pub fn label(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("dim{}", index))
    }
}

/// Typed backing storage of a [`Stream`]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl StreamData {
    fn zeroed(kind: SampleKind, len: usize) -> Self {
        match kind {
            SampleKind::U8 => StreamData::U8(vec![0; len]),
            SampleKind::I16 => StreamData::I16(vec![0; len]),
            SampleKind::I32 => StreamData::I32(vec![0; len]),
            SampleKind::I64 => StreamData::I64(vec![0; len]),
            SampleKind::F32 => StreamData::F32(vec![0.0; len]),
            SampleKind::F64 => StreamData::F64(vec![0.0; len]),
        }
    }

    fn resize(&mut self, len: usize) {
        match self {
            StreamData::U8(v) => v.resize(len, 0),
            StreamData::I16(v) => v.resize(len, 0),
            StreamData::I32(v) => v.resize(len, 0),
            StreamData::I64(v) => v.resize(len, 0),
            StreamData::F32(v) => v.resize(len, 0.0),
            StreamData::F64(v) => v.resize(len, 0.0),
        }
    }

    fn len(&self) -> usize {
        match self {
            StreamData::U8(v) => v.len(),
            StreamData::I16(v) => v.len(),
            StreamData::I32(v) => v.len(),
            StreamData::I64(v) => v.len(),
            StreamData::F32(v) => v.len(),
            StreamData::F64(v) => v.len(),
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            StreamData::U8(v) => v,
            StreamData::I16(v) => bytemuck::cast_slice(v),
            StreamData::I32(v) => bytemuck::cast_slice(v),
            StreamData::I64(v) => bytemuck::cast_slice(v),
            StreamData::F32(v) => bytemuck::cast_slice(v),
            StreamData::F64(v) => bytemuck::cast_slice(v),
        }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            StreamData::U8(v) => v,
            StreamData::I16(v) => bytemuck::cast_slice_mut(v),
            StreamData::I32(v) => bytemuck::cast_slice_mut(v),
            StreamData::I64(v) => bytemuck::cast_slice_mut(v),
            StreamData::F32(v) => bytemuck::cast_slice_mut(v),
            StreamData::F64(v) => bytemuck::cast_slice_mut(v),
        }
    }
}

/// A fixed-length window of samples owned by one component call
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub descriptor: StreamDescriptor,
    pub num_samples: usize,
    /// Virtual-clock time of the first sample, in seconds
    pub time: f64,
    data: StreamData,
}

macro_rules! typed_view {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        /// Typed view, `None` if the stream holds another kind
        pub fn $get(&self) -> Option<&[$ty]> {
            match &self.data {
                StreamData::$variant(v) => Some(v),
                _ => None,
            }
        }

        pub fn $get_mut(&mut self) -> Option<&mut [$ty]> {
            match &mut self.data {
                StreamData::$variant(v) => Some(v),
                _ => None,
            }
        }
    };
}

impl Stream {
    /// Allocate a zeroed stream of `num_samples`
    pub fn new(descriptor: StreamDescriptor, num_samples: usize) -> Self {
        let data = StreamData::zeroed(descriptor.kind, num_samples * descriptor.dim);
        Self {
            descriptor,
            num_samples,
            time: 0.0,
            data,
        }
    }

    /// Change the sample count, zero-extending if it grows
    pub fn resize(&mut self, num_samples: usize) {
        self.num_samples = num_samples;
        self.data.resize(num_samples * self.descriptor.dim);
    }

    pub fn zero(&mut self) {
        self.bytes_mut().fill(0);
    }

    pub fn dim(&self) -> usize {
        self.descriptor.dim
    }

    pub fn sample_rate(&self) -> f64 {
        self.descriptor.sample_rate
    }

    pub fn kind(&self) -> SampleKind {
        self.descriptor.kind
    }

    /// Number of values (samples × dim)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples == 0
    }

    /// Duration covered in seconds
    pub fn duration(&self) -> f64 {
        if self.descriptor.sample_rate > 0.0 {
            self.num_samples as f64 / self.descriptor.sample_rate
        } else {
            0.0
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_bytes_mut()
    }

    pub fn data(&self) -> &StreamData {
        &self.data
    }

    typed_view!(as_u8, as_u8_mut, U8, u8);
    typed_view!(as_i16, as_i16_mut, I16, i16);
    typed_view!(as_i32, as_i32_mut, I32, i32);
    typed_view!(as_i64, as_i64_mut, I64, i64);
    typed_view!(as_f32, as_f32_mut, F32, f32);
    typed_view!(as_f64, as_f64_mut, F64, f64);

    /// Value at (`sample`, `channel`) widened to f64
    pub fn value(&self, sample: usize, channel: usize) -> Option<f64> {
        if sample >= self.num_samples || channel >= self.descriptor.dim {
            return None;
        }
        let i = sample * self.descriptor.dim + channel;
        Some(match &self.data {
            StreamData::U8(v) => v[i] as f64,
            StreamData::I16(v) => v[i] as f64,
            StreamData::I32(v) => v[i] as f64,
            StreamData::I64(v) => v[i] as f64,
            StreamData::F32(v) => v[i] as f64,
            StreamData::F64(v) => v[i],
        })
    }

    /// Store `value` at (`sample`, `channel`), casting to the stream kind.
    /// Returns false when out of range.
    pub fn set_value(&mut self, sample: usize, channel: usize, value: f64) -> bool {
        if sample >= self.num_samples || channel >= self.descriptor.dim {
            return false;
        }
        let i = sample * self.descriptor.dim + channel;
        match &mut self.data {
            StreamData::U8(v) => v[i] = value as u8,
            StreamData::I16(v) => v[i] = value as i16,
            StreamData::I32(v) => v[i] = value as i32,
            StreamData::I64(v) => v[i] = value as i64,
            StreamData::F32(v) => v[i] = value as f32,
            StreamData::F64(v) => v[i] = value,
        }
        true
    }

    /// Iterate over the values of one dimension
    pub fn channel_values(&self, channel: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.num_samples).filter_map(move |s| self.value(s, channel))
    }
}
