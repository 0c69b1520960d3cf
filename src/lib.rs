/*!

Primitives for reading and writing bits.

The main purpose of this crate is to remove the need for hand-written
bit-masks and shifts when decoding or encoding bitstreams, especially when
fields are not aligned on byte boundaries. Endianness is chosen per call, so
one reader or writer can mix big- and little-endian fields in a single pass.

Errors are sticky: the hot path of puts and gets never returns a `Result`.
Faults are checked after a chunk of meaningful work with
[`BitReader::check`] or [`BitWriter::flush`] instead of after every
operation.

For example, an MPEG-TS PCR can be decoded like this:

```rust
use bitcursor::{BitReader, BE};

let buffer = [0x00, 0x00, 0x00, 0x00, 0x7f, 0x00];
let mut r = BitReader::new(&buffer);
let base = r.read_u64::<BE>(33);      // PCR base is 33 bits
r.skip(6);                            // 6 reserved bits
let extension = r.read_u64::<BE>(9);  // PCR extension is 9 bits
assert!(r.check().is_ok());
assert_eq!(base, 0);
assert_eq!(extension, 0x100);
```

instead of spelling out every mask and shift, and encoded like this:

```rust
use bitcursor::{BitWriter, BE};

let mut buffer = [0u8; 6];
let mut w = BitWriter::new(&mut buffer);
w.put_u64::<BE>(33, 0);
w.put_u32::<BE>(6, 0x3f);
w.put_u32::<BE>(9, 0x100);
assert!(w.flush().is_ok());
```

## Reading

[`BitReader`] wraps a byte slice and advances a bit cursor. Reads past the
end of the data are memory safe and return unspecified bits; whether the
data actually covered everything that was read is answered once, afterwards,
by [`check`](BitReader::check):

```rust
use bitcursor::{BitReader, BE, LE};

let mut bits = BitReader::new(&[0xab, 0xcd, 0xef]);
assert_eq!(bits.read_bit(), true);
assert_eq!(bits.read_u16::<BE>(11), 0x2bc);
assert_eq!(bits.read_u16::<LE>(12), 0xfde);
assert!(bits.check().is_ok());
```

## Writing

[`BitWriter`] fills a fixed byte buffer in place. For unbounded output,
[`StreamWriter`] drains completed bytes to any [`std::io::Write`] sink
(requires the default `std` feature).

## `no_std`

Disabling the default `std` feature makes the crate `no_std`; only
[`StreamWriter`] is unavailable.

*/

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

use core::fmt;

mod writer;
pub use crate::writer::BitWriter;
#[cfg(feature = "std")]
pub use crate::writer::StreamWriter;

/// The faults a reader or writer can report.
///
/// Faults are sticky: once an instance reports one, the whole decode or
/// encode should be discarded. They surface only from
/// [`BitReader::check`], [`BitWriter::flush`], and their streaming
/// equivalents, never from the per-field put and get calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A write exceeded the destination capacity, or the read cursor
    /// advanced past the logical end of the source.
    Overflow,
    /// A flush found a non-byte-aligned number of bits still pending.
    Underflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Overflow => f.write_str("bit overflow"),
            Error::Underflow => f.write_str("bit underflow"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

mod private {
    pub trait Sealed {}
    impl Sealed for crate::BigEndian {}
    impl Sealed for crate::LittleEndian {}
}

/// Byte-order strategy, selected per call.
///
/// Implemented only by [`BigEndian`] and [`LittleEndian`]; the trait is
/// sealed. Readers and writers take the strategy as a type parameter on
/// each operation, so a single instance can interleave endiannesses:
///
/// ```rust
/// use bitcursor::{BitWriter, BE, LE};
///
/// let mut buf = [0u8; 4];
/// let mut w = BitWriter::new(&mut buf);
/// w.put_u16::<LE>(16, 0x1122);
/// w.put_u16::<BE>(16, 0x3344);
/// assert!(w.flush().is_ok());
/// assert_eq!(buf, [0x22, 0x11, 0x33, 0x44]);
/// ```
pub trait Endianness: private::Sealed {
    /// Whether 64-bit values split into two chunks emit the low 32 bits
    /// first.
    #[doc(hidden)]
    const LOW_CHUNK_FIRST: bool;

    /// Reorders a value of `bits` width into the pattern inserted
    /// MSB-first into the bit cache.
    #[doc(hidden)]
    fn pack32(bits: u32, value: u32) -> u32;

    /// Inverse of [`pack32`](Endianness::pack32): recovers the value from
    /// the raw MSB-first pattern extracted from the stream.
    #[doc(hidden)]
    fn unpack32(bits: u32, raw: u32) -> u32;
}

/// Big-endian byte order: multi-byte fields emit their most significant
/// byte first.
#[derive(Debug)]
pub enum BigEndian {}

/// Little-endian byte order: multi-byte fields emit their least
/// significant byte first, while bit significance within each byte stays
/// MSB-first.
#[derive(Debug)]
pub enum LittleEndian {}

/// Shorthand for [`BigEndian`].
pub type BE = BigEndian;

/// Shorthand for [`LittleEndian`].
pub type LE = LittleEndian;

impl Endianness for BigEndian {
    const LOW_CHUNK_FIRST: bool = false;

    #[inline]
    fn pack32(_bits: u32, value: u32) -> u32 {
        value
    }

    #[inline]
    fn unpack32(_bits: u32, raw: u32) -> u32 {
        raw
    }
}

impl Endianness for LittleEndian {
    const LOW_CHUNK_FIRST: bool = true;

    // Byte order reverses while bit significance within each byte stays
    // MSB-first: swap the masked value as a whole, then recombine the
    // `left` spill bits of a partial top byte with the `right` whole-byte
    // bits.
    #[inline]
    fn pack32(bits: u32, value: u32) -> u32 {
        let value = (value & (!0u32 >> (32 - bits))).swap_bytes();
        let left = bits & 7;
        let right = bits & !7;
        let sub = if right == 32 {
            0
        } else {
            (value >> (24 - right)) & !(!0u32 << left)
        };
        ((value >> (32 - bits)) & (!0u32 << left)) + sub
    }

    #[inline]
    fn unpack32(bits: u32, raw: u32) -> u32 {
        let left = bits & 7;
        let right = bits & !7;
        let whole = if right == 0 {
            0
        } else {
            ((raw >> left) << (32 - right)).swap_bytes()
        };
        if left == 0 {
            whole
        } else {
            whole | ((raw & !(!0u32 << left)) << right)
        }
    }
}

/// Replicates the sign bit of a `bits`-wide two's-complement value up to
/// 64 bits, branch-free for widths 1..=64.
#[inline]
pub(crate) fn sign_extend(value: u64, bits: u32) -> i64 {
    let m = !0u64 << (bits - 1);
    (value ^ m).wrapping_sub(m) as i64
}

#[inline]
fn load_be64(src: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&src[offset..offset + 8]);
    u64::from_be_bytes(raw)
}

#[derive(Debug, Clone)]
enum Source<'a> {
    /// The caller's buffer, at least 8 bytes long.
    Direct(&'a [u8]),
    /// A private copy of a shorter buffer, zero-padded to 8 bytes so
    /// windowed loads stay in bounds.
    Padded([u8; 8]),
}

impl Source<'_> {
    #[inline]
    fn as_slice(&self) -> &[u8] {
        match self {
            Source::Direct(data) => data,
            Source::Padded(data) => data,
        }
    }
}

/// Reads integers of arbitrary bit width from a byte buffer.
///
/// The reader keeps a monotonically advancing bit cursor and performs each
/// extraction with a fixed 8-byte load around the cursor. Near the end of
/// the buffer the load offset is clamped rather than allowed to run past
/// the data, so every load is memory safe; reads whose bits extend past
/// the logical end return unspecified values and are detected after the
/// fact by [`check`](BitReader::check).
///
/// ```rust
/// use bitcursor::{BitReader, BE};
///
/// let mut bits = BitReader::new(&[0b1001_0011]);
/// assert_eq!(bits.read_bit(), true);
/// assert_eq!(bits.read_u8::<BE>(7), 0b001_0011);
/// assert!(bits.check().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    src: Source<'a>,
    idx: u64,
    max: u64,
    size: u64,
}

impl<'a> BitReader<'a> {
    /// Creates a reader over `src`.
    ///
    /// Buffers shorter than 8 bytes are copied into a private zero-padded
    /// block, so later mutations of such a buffer are not visible to the
    /// reader.
    #[inline]
    pub fn new(src: &'a [u8]) -> Self {
        if src.len() >= 8 {
            BitReader {
                max: (src.len() - 8) as u64,
                size: src.len() as u64,
                src: Source::Direct(src),
                idx: 0,
            }
        } else {
            let mut clone = [0u8; 8];
            clone[..src.len()].copy_from_slice(src);
            BitReader {
                src: Source::Padded(clone),
                idx: 0,
                max: 0,
                size: src.len() as u64,
            }
        }
    }

    /// Loads 8 bytes at the nearest safe 4-byte-aligned offset and
    /// left-justifies the bits at the cursor. Shift amounts of 64 or more
    /// happen only once the cursor is past the logical end and yield zero.
    #[inline]
    fn get64(&mut self, bits: u32) -> u64 {
        let skip = (self.idx >> 5 << 2).min(self.max);
        let val = load_be64(self.src.as_slice(), skip as usize);
        let val = val.checked_shl((self.idx - skip * 8) as u32).unwrap_or(0);
        self.idx += u64::from(bits);
        val
    }

    #[inline]
    fn read32(&mut self, bits: u32) -> u32 {
        (self.get64(bits) >> (64 - bits)) as u32
    }

    /// Reads the next bit.
    ///
    /// ```rust
    /// use bitcursor::BitReader;
    ///
    /// let mut bits = BitReader::new(&[0b1010_0000]);
    /// assert_eq!(bits.read_bit(), true);
    /// assert_eq!(bits.read_bit(), false);
    /// assert_eq!(bits.read_bit(), true);
    /// ```
    #[inline]
    pub fn read_bit(&mut self) -> bool {
        let skip = (self.idx >> 3).min(self.max + 7);
        let val = self.src.as_slice()[skip as usize];
        let val = val.checked_shl((self.idx - skip * 8) as u32).unwrap_or(0);
        self.idx += 1;
        val >> 7 != 0
    }

    /// Reads one byte.
    #[inline]
    pub fn read_byte(&mut self) -> u8 {
        self.read32(8) as u8
    }

    /// Reads up to 8 unsigned bits.
    #[inline]
    pub fn read_u8<E: Endianness>(&mut self, bits: u32) -> u8 {
        debug_assert!(bits >= 1 && bits <= 8, "bit width out of range");
        self.read_u32::<E>(bits) as u8
    }

    /// Reads up to 8 signed bits.
    #[inline]
    pub fn read_i8<E: Endianness>(&mut self, bits: u32) -> i8 {
        debug_assert!(bits >= 1 && bits <= 8, "bit width out of range");
        self.read_i32::<E>(bits) as i8
    }

    /// Reads up to 16 unsigned bits.
    #[inline]
    pub fn read_u16<E: Endianness>(&mut self, bits: u32) -> u16 {
        debug_assert!(bits >= 1 && bits <= 16, "bit width out of range");
        self.read_u32::<E>(bits) as u16
    }

    /// Reads up to 16 signed bits.
    #[inline]
    pub fn read_i16<E: Endianness>(&mut self, bits: u32) -> i16 {
        debug_assert!(bits >= 1 && bits <= 16, "bit width out of range");
        self.read_i32::<E>(bits) as i16
    }

    /// Reads up to 32 unsigned bits in the given byte order.
    ///
    /// ```rust
    /// use bitcursor::{BitReader, BE, LE};
    ///
    /// let mut bits = BitReader::new(&[0x12, 0x34, 0x56, 0x78]);
    /// assert_eq!(bits.read_u32::<BE>(16), 0x1234);
    /// bits.reset();
    /// assert_eq!(bits.read_u32::<LE>(16), 0x3412);
    /// ```
    #[inline]
    pub fn read_u32<E: Endianness>(&mut self, bits: u32) -> u32 {
        debug_assert!(bits >= 1 && bits <= 32, "bit width out of range");
        E::unpack32(bits, self.read32(bits))
    }

    /// Reads up to 32 signed bits in the given byte order.
    ///
    /// The most significant bit of the field is the sign:
    ///
    /// ```rust
    /// use bitcursor::{BitReader, BE};
    ///
    /// let mut bits = BitReader::new(&[0b1110_0000]);
    /// assert_eq!(bits.read_i32::<BE>(3), -1);
    /// ```
    #[inline]
    pub fn read_i32<E: Endianness>(&mut self, bits: u32) -> i32 {
        debug_assert!(bits >= 1 && bits <= 32, "bit width out of range");
        sign_extend(u64::from(self.read_u32::<E>(bits)), bits) as i32
    }

    /// Reads up to 64 unsigned bits in the given byte order.
    ///
    /// Widths above 32 decompose into two windowed loads; the
    /// little-endian strategy reads the low 32 bits first.
    #[inline]
    pub fn read_u64<E: Endianness>(&mut self, bits: u32) -> u64 {
        debug_assert!(bits >= 1 && bits <= 64, "bit width out of range");
        if bits > 32 {
            if E::LOW_CHUNK_FIRST {
                let lo = u64::from(self.read_u32::<E>(32));
                let hi = u64::from(self.read_u32::<E>(bits - 32));
                hi << 32 | lo
            } else {
                let hi = u64::from(self.read_u32::<E>(bits - 32));
                let lo = u64::from(self.read_u32::<E>(32));
                hi << 32 | lo
            }
        } else {
            u64::from(self.read_u32::<E>(bits))
        }
    }

    /// Reads up to 64 signed bits in the given byte order.
    #[inline]
    pub fn read_i64<E: Endianness>(&mut self, bits: u32) -> i64 {
        debug_assert!(bits >= 1 && bits <= 64, "bit width out of range");
        sign_extend(self.read_u64::<E>(bits), bits)
    }

    /// Returns an independent copy of the reader.
    ///
    /// Useful for reading ahead without advancing the original, e.g. to
    /// pick a format branch before committing to it:
    ///
    /// ```rust
    /// use bitcursor::BitReader;
    ///
    /// let mut bits = BitReader::new(&[0b1000_0000]);
    /// assert_eq!(bits.peek().read_bit(), true);
    /// assert_eq!(bits.peek().read_bit(), true);
    /// assert_eq!(bits.index(), 0);
    /// ```
    #[inline]
    pub fn peek(&self) -> BitReader<'a> {
        self.clone()
    }

    /// Advances the cursor by `bits` without decoding anything.
    #[inline]
    pub fn skip(&mut self, bits: u64) {
        self.idx = self.idx.saturating_add(bits);
    }

    /// Returns the current position in bits.
    #[inline]
    pub fn index(&self) -> u64 {
        self.idx
    }

    /// Returns the number of bits left to read, saturating at zero.
    #[inline]
    pub fn bits_remaining(&self) -> u64 {
        let total = self.size * 8;
        total - self.idx.min(total)
    }

    /// Returns the unread portion of the source.
    ///
    /// The slice is byte aligned even if the reader is not: the cursor is
    /// rounded down to the enclosing byte.
    #[inline]
    pub fn remaining_bytes(&self) -> &[u8] {
        let skip = (self.idx >> 3).min(self.size);
        &self.src.as_slice()[skip as usize..self.size as usize]
    }

    /// Reports whether the cursor ever advanced past the logical end of
    /// the source. This is the only bounds signal; individual reads never
    /// fail.
    #[inline]
    pub fn check(&self) -> Result<(), Error> {
        if self.idx > self.size * 8 {
            Err(Error::Overflow)
        } else {
            Ok(())
        }
    }

    /// Rewinds the reader to its initial position.
    #[inline]
    pub fn reset(&mut self) {
        self.idx = 0;
    }
}
