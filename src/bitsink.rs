// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Abstract interface for bit-based output.

use std::convert::Infallible;
use std::fmt;
use std::io::Write;

use super::error::BitWidthError;
use super::error::OutputError;

/// Size of the internal byte buffer of [`BitWriter`] before it is flushed.
const WRITER_BUFFER_SIZE: usize = 8192;

/// Trait for the bit-addressible unsigned integers.
///
/// This trait is sealed so a user cannot implement it. Currently, this trait
/// covers: [`u8`], [`u16`], [`u32`], and [`u64`].
pub trait Bits: seal_bits::Sealed {}

impl<T: seal_bits::Sealed> Bits for T {}

/// Trait for the signed integers that can be provided to bitsink.
///
/// This trait is sealed so a user cannot implement it. Currently, this trait
/// covers: [`i8`], [`i16`], [`i32`], and [`i64`].
pub trait SignedBits: seal_signed_bits::Sealed {}

impl<T: seal_signed_bits::Sealed> SignedBits for T {}

/// Checksum-like state that observes every completed output byte.
///
/// Accumulators are attached to a [`BitSink`] with
/// [`push_callback`](BitSink::push_callback). While attached, `update` is
/// called exactly once for every byte that is completed, in output order.
pub trait ByteAccumulator {
    /// Feeds a completed byte.
    fn update(&mut self, byte: u8);

    /// Returns the current accumulated value.
    fn value(&self) -> u64;
}

/// Storage-agnostic interface trait for bit-based output.
///
/// The encoder repeatedly generates arrays of code bits that are typically
/// smaller than a byte (8 bits).  Type implementing `BitSink` is used to
/// arrange those bits typically in bytes, and transfer them to the backend
/// storage. [`ByteSink`] is an in-memory implementation used for recording
/// candidates, and [`BitWriter`] forwards bytes to an [`std::io::Write`].
pub trait BitSink: Sized {
    /// Error type that may happen while writing bits to `BitSink`.
    type Error: std::error::Error;

    /// Puts zeros to `BitSink` until the length aligns to the byte boundaries.
    ///
    /// # Returns
    ///
    /// The number of zeros put.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacore::bitsink::{ByteSink, BitSink};
    /// let mut sink = ByteSink::new();
    ///
    /// sink.write_lsbs(0xFFu8, 3);
    /// assert_eq!(sink.len(), 3);
    ///
    /// let pads = sink.align_to_byte()?;
    /// assert_eq!(pads, 5);
    /// assert_eq!(sink.len(), 8);
    /// # Ok(())}
    /// ```
    fn align_to_byte(&mut self) -> Result<usize, Self::Error>;

    /// Writes bytes after alignment, and returns padded bits.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// # use flacore::bitsink::{ByteSink, BitSink};
    /// let mut sink = ByteSink::new();
    ///
    /// sink.write_lsbs(0xFFu8, 3);
    /// assert_eq!(sink.len(), 3);
    ///
    /// sink.write_bytes_aligned(&[0xB7, 0x7D])?;
    ///
    /// assert_eq!(sink.to_bitstring(), "11100000_10110111_01111101");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_bytes_aligned(&mut self, bytes: &[u8]) -> Result<usize, Self::Error> {
        let ret = self.align_to_byte()?;
        for b in bytes {
            self.write(*b)?;
        }
        Ok(ret)
    }

    /// Writes `n` LSBs to the sink.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacore::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_lsbs(0x0Fu8, 3);
    ///
    /// assert_eq!(sink.len(), 3);
    /// assert_eq!(sink.to_bitstring(), "111*****");
    /// # Ok(())}
    /// ```
    fn write_lsbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error>;

    /// Writes `n` MSBs to the sink.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacore::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3);
    ///
    /// assert_eq!(sink.to_bitstring(), "111*****");
    /// # Ok(())}
    /// ```
    fn write_msbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error>;

    /// Writes all bits in `val: Bits`.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacore::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3);
    ///
    /// sink.write(0x5555u16);
    ///
    /// assert_eq!(sink.to_bitstring(), "11101010_10101010_101*****");
    /// # Ok(())}
    /// ```
    fn write<T: Bits>(&mut self, val: T) -> Result<(), Self::Error>;

    /// Writes `val` in two's coplement format.
    ///
    /// This is an unchecked operation: bits above `bits_per_sample` are
    /// silently discarded. Use [`write_signed_bits`](Self::write_signed_bits)
    /// when the value is not known to fit.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacore::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3);
    /// assert_eq!(sink.to_bitstring(), "111*****");
    ///
    /// // two's complement of 00011 in 11101
    /// sink.write_twoc(-3i32, 5);
    /// assert_eq!(sink.to_bitstring(), "11111101");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_twoc<T: SignedBits>(
        &mut self,
        val: T,
        bits_per_sample: usize,
    ) -> Result<(), Self::Error> {
        if bits_per_sample == 0 {
            return Ok(());
        }
        let val: i64 = val.into();
        let shifted = (val << (64 - bits_per_sample)) as u64;
        self.write_msbs(shifted, bits_per_sample)
    }

    /// Writes `n`-bits of zeros.
    ///
    /// A default implementation using `write_msbs` is provided. An impl can
    /// provide a faster short-cut for writing zeros.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacore::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3);
    /// assert_eq!(sink.to_bitstring(), "111*****");
    ///
    /// sink.write_zeros(6);
    /// assert_eq!(sink.to_bitstring(), "11100000_0*******");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_zeros(&mut self, n: usize) -> Result<(), Self::Error> {
        let mut n = n;
        while n > 64 {
            self.write(0u64)?;
            n -= 64;
        }
        self.write_msbs(0u64, n)?;
        Ok(())
    }

    /// Writes `value` using exactly `width` bits, MSB first.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::BitWidth`] if `value` needs more than `width`
    /// bits, and [`OutputError::Sink`] for backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// use flacore::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_bits(5, 0b10110).unwrap();
    /// assert_eq!(sink.to_bitstring(), "10110***");
    /// assert!(sink.write_bits(3, 8).is_err());
    /// assert_eq!(sink.len(), 5);
    /// ```
    #[inline]
    fn write_bits(&mut self, width: usize, value: u64) -> Result<(), OutputError<Self>> {
        let fits = width <= 64 && (width == 64 || value >> width == 0);
        if !fits {
            return Err(BitWidthError::new(width, i128::from(value)).into());
        }
        self.write_lsbs(value, width)
            .map_err(OutputError::<Self>::from_sink)
    }

    /// Writes `value` in two's complement using exactly `width` bits.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::BitWidth`] if `value` is out of the range of
    /// `width`-bit signed integers, and [`OutputError::Sink`] for backend
    /// issues.
    ///
    /// # Examples
    ///
    /// ```
    /// use flacore::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_signed_bits(4, -8).unwrap();
    /// assert_eq!(sink.to_bitstring(), "1000****");
    /// assert!(sink.write_signed_bits(4, 8).is_err());
    /// ```
    #[inline]
    fn write_signed_bits(&mut self, width: usize, value: i64) -> Result<(), OutputError<Self>> {
        let fits = match width {
            0 => value == 0,
            1..=63 => {
                let half = 1i64 << (width - 1);
                (-half..half).contains(&value)
            }
            64 => true,
            _ => false,
        };
        if !fits {
            return Err(BitWidthError::new(width, i128::from(value)).into());
        }
        self.write_twoc(value, width)
            .map_err(OutputError::<Self>::from_sink)
    }

    /// Writes `count` copies of the inverse of `stop_bit`, then `stop_bit`.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacore::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_unary(true, 3)?;
    /// sink.write_unary(false, 2)?;
    /// assert_eq!(sink.to_bitstring(), "0001110*");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_unary(&mut self, stop_bit: bool, count: usize) -> Result<(), Self::Error> {
        if stop_bit {
            self.write_zeros(count)?;
            self.write_lsbs(1u8, 1)
        } else {
            let mut n = count;
            while n > 64 {
                self.write(u64::MAX)?;
                n -= 64;
            }
            self.write_msbs(u64::MAX, n)?;
            self.write_lsbs(0u8, 1)
        }
    }

    /// Attaches a byte accumulator on top of the callback stack.
    fn push_callback(&mut self, callback: Box<dyn ByteAccumulator>);

    /// Detaches the most recently attached byte accumulator.
    fn pop_callback(&mut self) -> Option<Box<dyn ByteAccumulator>>;
}

/// In-memory recorder implementing `BitSink` over a [`Vec`] of [`u8`]s.
///
/// Since this type store code bits in [`u8`]s, the internal buffer can directly
/// be written to, e.g. [`std::io::Write`] via [`write_all`] method, or be
/// replayed into another sink via [`ByteSink::copy_to`].
///
/// [`write_all`]: std::io::Write::write_all
pub struct ByteSink {
    storage: Vec<u8>,
    bitlength: usize,
    notified: usize,
    callbacks: Vec<Box<dyn ByteAccumulator>>,
}

impl Default for ByteSink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ByteSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSink")
            .field("bitlength", &self.bitlength)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl ByteSink {
    /// Creates new `ByteSink` instance with the default capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// let sink = ByteSink::new();
    /// let empty: [u8; 0] = [];
    /// assert_eq!(&empty, sink.as_slice());
    /// ```
    pub fn new() -> Self {
        Self {
            storage: vec![],
            bitlength: 0usize,
            notified: 0usize,
            callbacks: vec![],
        }
    }

    /// Creates new `ByteSink` instance with the specified capacity (in bits).
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// let mut sink = ByteSink::with_capacity(128);
    /// sink.write_lsbs(0x00FFu16, 10);
    /// assert!(sink.into_inner().capacity() > 128 / 8);
    /// ```
    pub fn with_capacity(capacity_in_bits: usize) -> Self {
        Self {
            storage: Vec::with_capacity((capacity_in_bits >> 3) + 1),
            ..Self::new()
        }
    }

    /// Clears the recorded bits. Attached callbacks are kept.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_lsbs(0xAAAAAAAAu32, 14);
    /// assert_eq!(sink.to_bitstring(), "10101010_101010**");
    /// sink.clear();
    /// assert_eq!(sink.to_bitstring(), "");
    /// ```
    pub fn clear(&mut self) {
        self.storage.clear();
        self.bitlength = 0;
        self.notified = 0;
    }

    /// Returns the number of bits stored in the buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write(0u64);
    /// sink.write_msbs(0u8, 6);
    /// assert_eq!(sink.len(), 70)
    /// ```
    pub fn len(&self) -> usize {
        self.bitlength
    }

    /// Returns the number of bytes touched, including a partial last byte.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0u8, 6);
    /// assert_eq!(sink.byte_len(), 1);
    /// sink.write_msbs(0u8, 3);
    /// assert_eq!(sink.byte_len(), 2);
    /// ```
    pub fn byte_len(&self) -> usize {
        (self.bitlength + 7) >> 3
    }

    /// Checks if the buffer is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// assert!(sink.is_empty());
    /// sink.write_msbs(0u8, 6);
    /// assert!(!sink.is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        self.bitlength == 0
    }

    /// Returns the remaining number of bits in the last byte in `self.bytes`.
    #[inline]
    const fn paddings(&self) -> usize {
        ((!self.bitlength).wrapping_add(1)) & 7
    }

    /// Feeds bytes completed since the last call to the attached callbacks.
    #[inline]
    fn notify_completed(&mut self) {
        let complete = self.bitlength >> 3;
        if !self.callbacks.is_empty() {
            for b in &self.storage[self.notified..complete] {
                for cb in &mut self.callbacks {
                    cb.update(*b);
                }
            }
        }
        self.notified = complete;
    }

    /// Returns bits in a string.
    ///
    /// This function formats an internal buffer state to a human-readable
    /// string. Each byte is shown in eight characters joined by `'_'`, and the
    /// last bits of the last byte that are not yet filled are shown as `'*'`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0x3456u16, 13);
    /// assert_eq!(sink.to_bitstring(), "00110100_01010***");
    /// ```
    pub fn to_bitstring(&self) -> String {
        let mut ret = String::new();
        for b in &self.storage {
            ret.push_str(&format!("{b:08b}"));
            ret.push('_');
        }
        ret.pop();

        for _t in 0..self.paddings() {
            ret.pop();
        }
        for _t in 0..self.paddings() {
            ret.push('*');
        }
        ret
    }

    /// Consumes `ByteSink` and returns the internal buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_bytes_aligned(&[0xABu8; 4]);
    /// let v: Vec<u8> = sink.into_inner();
    /// assert_eq!(&v, &[0xAB; 4]);
    /// ```
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.storage
    }

    /// Returns a reference to the internal bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0x3456u16, 13);
    /// assert_eq!(sink.as_slice(), &[0x34, 0x50]);
    /// ```
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    /// Replays the recorded bits into another sink.
    ///
    /// The destination does not need to be byte-aligned.
    ///
    /// # Errors
    ///
    /// Propagates backend errors of `dest`.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// # use flacore::bitsink::*;
    /// let mut src = ByteSink::new();
    /// src.write_msbs(0xFFFFu16, 10)?;
    ///
    /// let mut dest = ByteSink::new();
    /// dest.write_lsbs(0u8, 2)?;
    /// src.copy_to(&mut dest)?;
    /// assert_eq!(dest.to_bitstring(), "00111111_1111****");
    /// # Ok(())}
    /// ```
    pub fn copy_to<S: BitSink>(&self, dest: &mut S) -> Result<(), S::Error> {
        let full = self.bitlength >> 3;
        for b in &self.storage[..full] {
            dest.write(*b)?;
        }
        let rem = self.bitlength & 7;
        if rem > 0 {
            dest.write_msbs(self.storage[full], rem)?;
        }
        Ok(())
    }

    #[inline]
    fn write_msbs_impl<T: Bits>(&mut self, mut val: T, mut n: usize) {
        if n == 0 {
            return;
        }
        let r = self.paddings();
        self.bitlength += n;
        val = val & !((T::one() << (T::BITS - n)) - T::one());

        if r != 0 {
            let b: u8 = (val >> (T::BITS - r)).as_();
            if let Some(last) = self.storage.last_mut() {
                *last |= b;
            }
            if r >= n {
                return;
            }
            val <<= r;
            n -= r;
        }
        let bytes_to_write = n >> 3;
        if bytes_to_write > 0 {
            let bytes = val.to_be_bytes();
            self.storage
                .extend_from_slice(&bytes.as_ref()[..bytes_to_write]);
            n &= 7;
        }
        if n > 0 {
            let tail_byte: u8 = (val.wrapping_shl((bytes_to_write << 3) as u32)
                >> (T::BITS - 8))
                .as_();
            self.storage.push(tail_byte);
        }
    }
}

impl BitSink for ByteSink {
    type Error = Infallible;

    #[inline]
    fn write<T: Bits>(&mut self, val: T) -> Result<(), Self::Error> {
        self.write_msbs_impl(val, T::BITS);
        self.notify_completed();
        Ok(())
    }

    #[inline]
    fn align_to_byte(&mut self) -> Result<usize, Self::Error> {
        let r = self.paddings();
        self.bitlength += r;
        self.notify_completed();
        Ok(r)
    }

    #[inline]
    fn write_bytes_aligned(&mut self, bytes: &[u8]) -> Result<usize, Self::Error> {
        let ret = self.align_to_byte()?;
        self.storage.extend_from_slice(bytes);
        self.bitlength += 8 * bytes.len();
        self.notify_completed();
        Ok(ret)
    }

    #[inline]
    fn write_msbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error> {
        self.write_msbs_impl(val, n);
        self.notify_completed();
        Ok(())
    }

    #[inline]
    fn write_lsbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error> {
        if n == 0 {
            return Ok(());
        }
        self.write_msbs(val << (T::BITS - n), n)
    }

    #[inline]
    fn write_zeros(&mut self, n: usize) -> Result<(), Self::Error> {
        let pad = self.paddings();
        if n <= pad {
            self.bitlength += n;
            self.notify_completed();
            return Ok(());
        }
        self.bitlength += pad;
        let n = n - pad;

        let bytes = (n + 7) >> 3;
        self.storage.resize(self.storage.len() + bytes, 0u8);
        self.bitlength += n;
        self.notify_completed();
        Ok(())
    }

    fn push_callback(&mut self, callback: Box<dyn ByteAccumulator>) {
        self.callbacks.push(callback);
    }

    fn pop_callback(&mut self) -> Option<Box<dyn ByteAccumulator>> {
        self.callbacks.pop()
    }
}

/// `BitSink` that forwards completed bytes to an [`std::io::Write`].
///
/// Bytes are buffered internally and handed to the writer in chunks. The
/// last incomplete byte stays in the writer until it is completed, so callers
/// are expected to [`align_to_byte`](BitSink::align_to_byte) before
/// [`flush`](BitWriter::flush).
pub struct BitWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    pending: u8,
    pending_bits: usize,
    bytes_written: u64,
    callbacks: Vec<Box<dyn ByteAccumulator>>,
}

impl<W: Write> fmt::Debug for BitWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitWriter")
            .field("bytes_written", &self.bytes_written)
            .field("pending_bits", &self.pending_bits)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl<W: Write> BitWriter<W> {
    /// Creates a writer forwarding bytes to `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(WRITER_BUFFER_SIZE),
            pending: 0u8,
            pending_bits: 0usize,
            bytes_written: 0u64,
            callbacks: vec![],
        }
    }

    /// Returns the number of completed bytes, including the buffered ones.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::io::Error> {
    /// # use flacore::bitsink::*;
    /// let mut writer = BitWriter::new(Vec::new());
    /// writer.write_msbs(0xFFu8, 7)?;
    /// assert_eq!(writer.bytes_written(), 0);
    /// writer.write_msbs(0xFFu8, 2)?;
    /// assert_eq!(writer.bytes_written(), 1);
    /// # Ok(())}
    /// ```
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Returns the number of written bits not yet forming a byte.
    pub const fn pending_bits(&self) -> usize {
        self.pending_bits
    }

    /// Hands completed bytes over to the inner writer and flushes it.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors of the inner writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.drain_buffer()?;
        self.inner.flush()
    }

    /// Flushes the completed bytes and returns the inner writer.
    ///
    /// Bits of an incomplete last byte are discarded.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors of the inner writer.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::io::Error> {
    /// # use flacore::bitsink::*;
    /// let mut writer = BitWriter::new(Vec::new());
    /// writer.write_bytes_aligned(b"fLaC")?;
    /// assert_eq!(writer.into_inner()?, b"fLaC");
    /// # Ok(())}
    /// ```
    pub fn into_inner(mut self) -> std::io::Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn drain_buffer(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            self.inner.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    #[inline]
    fn emit_byte(&mut self, byte: u8) -> std::io::Result<()> {
        for cb in &mut self.callbacks {
            cb.update(byte);
        }
        self.buffer.push(byte);
        self.bytes_written += 1;
        if self.buffer.len() >= WRITER_BUFFER_SIZE {
            self.drain_buffer()?;
        }
        Ok(())
    }
}

impl<W: Write> BitSink for BitWriter<W> {
    type Error = std::io::Error;

    #[inline]
    fn write<T: Bits>(&mut self, val: T) -> Result<(), Self::Error> {
        self.write_msbs(val, T::BITS)
    }

    #[inline]
    fn align_to_byte(&mut self) -> Result<usize, Self::Error> {
        if self.pending_bits == 0 {
            return Ok(0);
        }
        let r = 8 - self.pending_bits;
        let byte = self.pending;
        self.pending = 0;
        self.pending_bits = 0;
        self.emit_byte(byte)?;
        Ok(r)
    }

    #[inline]
    fn write_bytes_aligned(&mut self, bytes: &[u8]) -> Result<usize, Self::Error> {
        let ret = self.align_to_byte()?;
        for b in bytes {
            self.emit_byte(*b)?;
        }
        Ok(ret)
    }

    fn write_msbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error> {
        let mut v: u64 = val.into();
        v <<= 64 - T::BITS;
        let mut n = n;
        while n > 0 {
            let room = 8 - self.pending_bits;
            let take = std::cmp::min(room, n);
            let bits = (v >> (64 - take)) as u8;
            self.pending |= bits << (room - take);
            v <<= take;
            n -= take;
            self.pending_bits += take;
            if self.pending_bits == 8 {
                let byte = self.pending;
                self.pending = 0;
                self.pending_bits = 0;
                self.emit_byte(byte)?;
            }
        }
        Ok(())
    }

    #[inline]
    fn write_lsbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error> {
        if n == 0 {
            return Ok(());
        }
        self.write_msbs(val << (T::BITS - n), n)
    }

    fn push_callback(&mut self, callback: Box<dyn ByteAccumulator>) {
        self.callbacks.push(callback);
    }

    fn pop_callback(&mut self) -> Option<Box<dyn ByteAccumulator>> {
        self.callbacks.pop()
    }
}

mod seal_bits {
    use num_traits::AsPrimitive;
    use num_traits::One;
    use num_traits::PrimInt;
    use num_traits::ToBytes;
    use num_traits::WrappingShl;
    pub trait Sealed:
        ToBytes
        + From<u8>
        + Into<u64>
        + PrimInt
        + std::ops::ShlAssign<usize>
        + AsPrimitive<u8>
        + One
        + WrappingShl
    {
        /// The number of bits in the type.
        const BITS: usize = 1usize << Self::BITS_LOG2;
        /// `ilog2` of `Self::BITS`.
        #[rustversion::since(1.67)]
        const BITS_LOG2: usize = (std::mem::size_of::<Self>() * 8).ilog2() as usize;
        #[rustversion::before(1.67)]
        const BITS_LOG2: usize = 3 + std::mem::size_of::<Self>().trailing_zeros() as usize;
    }

    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

mod seal_signed_bits {
    pub trait Sealed: Into<i64> {}

    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}
