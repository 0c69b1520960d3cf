use crate::{Endianness, Error};

macro_rules! put_impls {
    () => {
        /// Writes a single bit.
        #[inline]
        pub fn put_bit(&mut self, bit: bool) {
            self.put32::<crate::BigEndian>(1, u32::from(bit));
        }

        /// Writes one byte.
        #[inline]
        pub fn put_byte(&mut self, value: u8) {
            self.put32::<crate::BigEndian>(8, u32::from(value));
        }

        /// Writes up to 8 bits from `value` in the given byte order.
        #[inline]
        pub fn put_u8<E: Endianness>(&mut self, bits: u32, value: u8) {
            debug_assert!(bits >= 1 && bits <= 8, "bit width out of range");
            self.put32::<E>(bits, u32::from(value));
        }

        /// Writes up to 8 bits from `value` in the given byte order.
        ///
        /// The value is truncated to its `bits`-wide two's-complement
        /// representation.
        #[inline]
        pub fn put_i8<E: Endianness>(&mut self, bits: u32, value: i8) {
            debug_assert!(bits >= 1 && bits <= 8, "bit width out of range");
            self.put32::<E>(bits, value as u32);
        }

        /// Writes up to 16 bits from `value` in the given byte order.
        #[inline]
        pub fn put_u16<E: Endianness>(&mut self, bits: u32, value: u16) {
            debug_assert!(bits >= 1 && bits <= 16, "bit width out of range");
            self.put32::<E>(bits, u32::from(value));
        }

        /// Writes up to 16 bits from `value` in the given byte order.
        ///
        /// The value is truncated to its `bits`-wide two's-complement
        /// representation.
        #[inline]
        pub fn put_i16<E: Endianness>(&mut self, bits: u32, value: i16) {
            debug_assert!(bits >= 1 && bits <= 16, "bit width out of range");
            self.put32::<E>(bits, value as u32);
        }

        /// Writes up to 32 bits from `value` in the given byte order.
        #[inline]
        pub fn put_u32<E: Endianness>(&mut self, bits: u32, value: u32) {
            debug_assert!(bits >= 1 && bits <= 32, "bit width out of range");
            self.put32::<E>(bits, value);
        }

        /// Writes up to 32 bits from `value` in the given byte order.
        ///
        /// The value is truncated to its `bits`-wide two's-complement
        /// representation.
        #[inline]
        pub fn put_i32<E: Endianness>(&mut self, bits: u32, value: i32) {
            debug_assert!(bits >= 1 && bits <= 32, "bit width out of range");
            self.put32::<E>(bits, value as u32);
        }

        /// Writes up to 64 bits from `value` in the given byte order.
        ///
        /// Widths above 32 decompose into two chunked writes; the
        /// little-endian strategy emits the low 32 bits first.
        #[inline]
        pub fn put_u64<E: Endianness>(&mut self, bits: u32, value: u64) {
            debug_assert!(bits >= 1 && bits <= 64, "bit width out of range");
            if bits > 32 {
                if E::LOW_CHUNK_FIRST {
                    self.put32::<E>(32, value as u32);
                    self.put32::<E>(bits - 32, (value >> 32) as u32);
                } else {
                    self.put32::<E>(bits - 32, (value >> 32) as u32);
                    self.put32::<E>(32, value as u32);
                }
            } else {
                self.put32::<E>(bits, value as u32);
            }
        }

        /// Writes up to 64 bits from `value` in the given byte order.
        ///
        /// The value is truncated to its `bits`-wide two's-complement
        /// representation.
        #[inline]
        pub fn put_i64<E: Endianness>(&mut self, bits: u32, value: i64) {
            debug_assert!(bits >= 1 && bits <= 64, "bit width out of range");
            self.put_u64::<E>(bits, value as u64);
        }
    };
}

/// Writes integers of arbitrary bit width into a fixed byte buffer.
///
/// Bits accumulate left-justified in a 64-bit cache and drain to the
/// destination in whole 4-byte words as the cache fills. Like the reader,
/// the put methods never fail; a write that does not fit is dropped and the
/// fault is realized by [`flush`](BitWriter::flush).
///
/// ```rust
/// use bitcursor::{BitWriter, BE};
///
/// let mut buf = [0u8; 1];
/// let mut w = BitWriter::new(&mut buf);
/// w.put_bit(false);
/// w.put_bit(true);
/// w.put_u32::<BE>(5, 0);
/// w.put_bit(true);
/// assert!(w.flush().is_ok());
/// assert_eq!(buf, [0x41]);
/// ```
#[derive(Debug)]
pub struct BitWriter<'a> {
    dst: &'a mut [u8],
    cache: u64,
    fill: u32,
    idx: usize,
}

impl<'a> BitWriter<'a> {
    /// Creates a writer filling `dst` from its first byte.
    #[inline]
    pub fn new(dst: &'a mut [u8]) -> Self {
        BitWriter {
            dst,
            cache: 0,
            fill: 0,
            idx: 0,
        }
    }

    put_impls!();

    /// Inserts up to 32 already-packed bits below the current cache fill,
    /// pre-draining the top 4 cache bytes when they would not fit. A drain
    /// that lands past the destination is dropped; the cursor still
    /// advances so the overflow surfaces at flush.
    #[inline]
    fn put32<E: Endianness>(&mut self, bits: u32, value: u32) {
        let value = E::pack32(bits, value);
        if self.fill + bits > 64 {
            if self.idx + 4 <= self.dst.len() {
                let word = (self.cache >> 32) as u32;
                self.dst[self.idx..self.idx + 4].copy_from_slice(&word.to_be_bytes());
            }
            self.idx += 4;
            self.cache <<= 32;
            self.fill -= 32;
        }
        let mut u = u64::from(value);
        u &= !(!0u64 << bits);
        u <<= 64 - self.fill - bits;
        self.fill += bits;
        self.cache |= u;
    }

    /// Drains the cache to the destination.
    ///
    /// Returns [`Error::Overflow`] if the writes did not fit the
    /// destination, and [`Error::Underflow`] if a non-byte-aligned number
    /// of bits is still pending. Overflow takes precedence when both hold.
    /// Flushing is idempotent; a successful flush leaves the writer ready
    /// for more byte-aligned writes.
    ///
    /// ```rust
    /// use bitcursor::{BitWriter, Error, BE};
    ///
    /// let mut buf = [0u8; 2];
    /// let mut w = BitWriter::new(&mut buf);
    /// w.put_u32::<BE>(9, 0);
    /// assert_eq!(w.flush(), Err(Error::Underflow));
    /// ```
    pub fn flush(&mut self) -> Result<(), Error> {
        while self.fill >= 8 && self.idx < self.dst.len() {
            self.dst[self.idx] = (self.cache >> 56) as u8;
            self.idx += 1;
            self.cache <<= 8;
            self.fill -= 8;
        }
        if self.index() > self.dst.len() as u64 * 8 {
            Err(Error::Overflow)
        } else if self.fill != 0 {
            Err(Error::Underflow)
        } else {
            Ok(())
        }
    }

    /// Writes a whole byte slice at once.
    ///
    /// The writer must be byte aligned: pending bits are flushed first and
    /// any flush fault is returned unchanged. Returns
    /// [`Error::Overflow`] if `data` does not fit the remaining space.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        self.flush()?;
        let n = data.len().min(self.dst.len() - self.idx);
        self.dst[self.idx..self.idx + n].copy_from_slice(&data[..n]);
        self.idx += data.len();
        if n != data.len() {
            Err(Error::Overflow)
        } else {
            Ok(())
        }
    }

    /// Returns the current position in bits, counting dropped writes.
    #[inline]
    pub fn index(&self) -> u64 {
        self.idx as u64 * 8 + u64::from(self.fill)
    }

    /// Returns the number of bits still available to write, saturating at
    /// zero.
    #[inline]
    pub fn bits_remaining(&self) -> u64 {
        let total = self.dst.len() as u64 * 8;
        total - self.index().min(total)
    }

    /// Returns the unwritten portion of the destination, including bytes
    /// still staged in the cache.
    ///
    /// The slice is byte aligned even if the writer is not.
    #[inline]
    pub fn remaining_bytes(&mut self) -> &mut [u8] {
        let skip = (self.idx + (self.fill >> 3) as usize).min(self.dst.len());
        &mut self.dst[skip..]
    }

    /// Rewinds the writer to its initial position, discarding pending
    /// bits.
    #[inline]
    pub fn reset(&mut self) {
        self.cache = 0;
        self.fill = 0;
        self.idx = 0;
    }
}

/// Writes integers of arbitrary bit width to an [`std::io::Write`] sink.
///
/// Completed bytes collect in a staging buffer and are forwarded to the
/// sink whenever fewer than 8 staging bytes remain, so output length is
/// unbounded. Faults are sticky: the first fault wins, later staged bytes
/// are discarded, and [`flush`](StreamWriter::flush) or
/// [`check`](StreamWriter::check) report it. A sink error is reported as
/// [`Error::Overflow`].
///
/// ```rust
/// use bitcursor::{StreamWriter, BE};
///
/// let mut out = Vec::new();
/// {
///     let mut w = StreamWriter::new(&mut out);
///     w.put_u32::<BE>(4, 0xf);
///     w.put_u32::<BE>(4, 0x0);
///     assert!(w.flush().is_ok());
/// }
/// assert_eq!(out, [0xf0]);
/// ```
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct StreamWriter<W> {
    sink: W,
    staging: Box<[u8]>,
    cache: u64,
    fill: u32,
    idx: usize,
    written: u64,
    fault: Option<Error>,
}

#[cfg(feature = "std")]
impl<W: std::io::Write> StreamWriter<W> {
    /// Creates a writer forwarding to `sink` with the default staging
    /// capacity.
    pub fn new(sink: W) -> Self {
        StreamWriter::with_capacity(sink, 64)
    }

    /// Creates a writer with a staging buffer of `capacity` bytes, clamped
    /// to at least 8 so a full cache always fits.
    pub fn with_capacity(sink: W, capacity: usize) -> Self {
        StreamWriter {
            sink,
            staging: vec![0; capacity.max(8)].into_boxed_slice(),
            cache: 0,
            fill: 0,
            idx: 0,
            written: 0,
            fault: None,
        }
    }

    put_impls!();

    #[inline]
    fn put32<E: Endianness>(&mut self, bits: u32, value: u32) {
        let value = E::pack32(bits, value);
        if self.fill + bits > 64 {
            let word = (self.cache >> 32) as u32;
            self.staging[self.idx..self.idx + 4].copy_from_slice(&word.to_be_bytes());
            self.cache <<= 32;
            self.fill -= 32;
            self.idx += 4;
            if self.idx + 8 > self.staging.len() {
                self.write_out();
            }
        }
        let mut u = u64::from(value);
        u &= !(!0u64 << bits);
        u <<= 64 - self.fill - bits;
        self.fill += bits;
        self.cache |= u;
        self.written += u64::from(bits);
    }

    /// Forwards the staged bytes to the sink, unless already faulted.
    fn write_out(&mut self) {
        if self.fault.is_none() && self.sink.write_all(&self.staging[..self.idx]).is_err() {
            self.fault = Some(Error::Overflow);
        }
        self.idx = 0;
    }

    /// Drains pending whole bytes and forwards everything staged to the
    /// sink.
    ///
    /// Marks the sticky fault as [`Error::Underflow`] if a non-byte-aligned
    /// number of bits is pending, then returns the sticky fault if any.
    pub fn flush(&mut self) -> Result<(), Error> {
        while self.fill >= 8 {
            self.staging[self.idx] = (self.cache >> 56) as u8;
            self.cache <<= 8;
            self.fill -= 8;
            self.idx += 1;
        }
        if self.fill != 0 && self.fault.is_none() {
            self.fault = Some(Error::Underflow);
        }
        self.write_out();
        self.check()
    }

    /// Writes a whole byte slice straight to the sink.
    ///
    /// The writer must be byte aligned: pending bits are flushed first and
    /// any fault is returned unchanged.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        self.flush()?;
        if self.sink.write_all(data).is_err() {
            self.fault = Some(Error::Overflow);
        } else {
            self.written += data.len() as u64 * 8;
        }
        self.check()
    }

    /// Returns the number of bits accepted so far.
    #[inline]
    pub fn index(&self) -> u64 {
        self.written
    }

    /// Returns the sticky fault if one occurred.
    #[inline]
    pub fn check(&self) -> Result<(), Error> {
        match self.fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{BitWriter, Error, BE};

    #[test]
    fn test_flush_faults() {
        let mut buf = [0u8; 2];

        let mut w = BitWriter::new(&mut buf);
        w.put_u32::<BE>(9, 0);
        assert_eq!(w.flush(), Err(Error::Underflow));

        let mut w = BitWriter::new(&mut buf);
        w.put_u32::<BE>(16, 0);
        assert_eq!(w.flush(), Ok(()));

        let mut w = BitWriter::new(&mut buf);
        w.put_u32::<BE>(17, 0);
        assert_eq!(w.flush(), Err(Error::Overflow));
    }

    #[test]
    fn test_overflow_beats_underflow() {
        // 17 bits into 1 byte overruns capacity and leaves a ragged bit:
        // capacity wins the report.
        let mut buf = [0u8; 1];
        let mut w = BitWriter::new(&mut buf);
        w.put_u32::<BE>(17, 0);
        assert_eq!(w.flush(), Err(Error::Overflow));
    }

    #[test]
    fn test_reset_clears_cache() {
        let mut buf = [0u8; 1];
        let mut w = BitWriter::new(&mut buf);
        w.put_u32::<BE>(3, 0b111);
        w.reset();
        w.put_u32::<BE>(8, 0);
        assert_eq!(w.flush(), Ok(()));
        assert_eq!(buf, [0x00]);
    }
}
