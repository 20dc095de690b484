//! Reads complex samples from a raw IQ stream

use std::io::{self, Read};

use byteorder::{ByteOrder, LittleEndian};
use clap::ValueEnum;
use num_complex::Complex32;

/// Format of interleaved I/Q samples
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    /// Unsigned 8-bit, offset by 127.5 (rtl_sdr)
    Cu8,

    /// 32-bit little-endian float
    Cf32,
}

impl SampleFormat {
    /// Bytes per complex sample
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Cu8 => 2,
            SampleFormat::Cf32 => 8,
        }
    }
}

/// Reads blocks of complex samples
///
/// Each call to [`read_block()`](IqReader::read_block) returns
/// up to `block_len` samples. Only the last block of the
/// stream may be short.
#[derive(Debug)]
pub struct IqReader<R: Read> {
    inner: R,
    format: SampleFormat,
    block_len: usize,
    buf: Vec<u8>,
}

impl<R: Read> IqReader<R> {
    /// Wrap a byte stream
    pub fn new(inner: R, format: SampleFormat, block_len: usize) -> Self {
        let block_len = usize::max(block_len, 1);
        Self {
            inner,
            format,
            block_len,
            buf: vec![0u8; block_len * format.bytes_per_sample()],
        }
    }

    /// Read the next block
    ///
    /// Returns `Ok(None)` at end of stream. A trailing partial
    /// sample is dropped.
    pub fn read_block(&mut self) -> io::Result<Option<Vec<Complex32>>> {
        let filled = read_full(&mut self.inner, &mut self.buf)?;
        let bytes = filled - filled % self.format.bytes_per_sample();
        if bytes == 0 {
            return Ok(None);
        }

        let raw = &self.buf[0..bytes];
        let out = match self.format {
            SampleFormat::Cu8 => raw
                .chunks_exact(2)
                .map(|iq| Complex32::new(cu8_to_f32(iq[0]), cu8_to_f32(iq[1])))
                .collect(),
            SampleFormat::Cf32 => {
                let mut floats = vec![0.0f32; bytes / 4];
                LittleEndian::read_f32_into(raw, &mut floats);
                floats
                    .chunks_exact(2)
                    .map(|iq| Complex32::new(iq[0], iq[1]))
                    .collect()
            }
        };
        Ok(Some(out))
    }

    /// Samples per block
    pub fn block_len(&self) -> usize {
        self.block_len
    }
}

// read until `buf` is full or the stream ends
fn read_full<R: Read>(inner: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[inline]
fn cu8_to_f32(byte: u8) -> f32 {
    (byte as f32 - 127.5) / 127.5
}
