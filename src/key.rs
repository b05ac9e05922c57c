//! Module implement order-preserving key encoding.
//!
//! Typed field values are appended onto a [MdbKey] so that
//! byte-lexicographic order of the encoded keys coincides with the
//! natural order of the values:
//!
//! * unsigned integers encode big-endian;
//! * signed integers carry a sign-tag byte (`'>'` for non-negative,
//!   `'-'` for negative, and `'-' < '>'`) followed by the big-endian
//!   two's-complement bytes;
//! * floats map onto unsigned integers by flipping the sign bit of
//!   non-negatives and inverting all bits of negatives, a monotone map;
//! * strings and byte slices encode raw.
//!
//! A composite key starts with a single byte holding the declared field
//! count and prefixes every field with a length byte, so that a key built
//! from the leading fields only is a byte-prefix of the full key.

use arbitrary::Arbitrary;

use crate::{iradix::ByteBuffer, Error, Result};

pub(crate) fn f32_to_u32(f: f32) -> u32 {
    let u = f.to_bits();
    if f >= 0.0 {
        u | 0x8000_0000
    } else {
        !u
    }
}

pub(crate) fn f64_to_u64(f: f64) -> u64 {
    let u = f.to_bits();
    if f >= 0.0 {
        u | 0x8000_0000_0000_0000
    } else {
        !u
    }
}

pub(crate) fn u32_to_f32(u: u32) -> f32 {
    if u & 0x8000_0000 > 0 {
        f32::from_bits(u & !0x8000_0000)
    } else {
        f32::from_bits(!u)
    }
}

pub(crate) fn u64_to_f64(u: u64) -> f64 {
    if u & 0x8000_0000_0000_0000 > 0 {
        f64::from_bits(u & !0x8000_0000_0000_0000)
    } else {
        f64::from_bits(!u)
    }
}

/// Encoded index key under construction.
///
/// Each index owns a reusable `MdbKey` configured with the index's field
/// count and uniqueness; mutations and finders encode into it through the
/// `append_*` family. The encoder rejects appends past the declared field
/// count and composite field encodings longer than 255 bytes.
#[derive(Clone)]
pub struct MdbKey {
    buf: ByteBuffer,
    is_unique: bool,
    key_count: usize,
    key_num: usize,
}

impl MdbKey {
    /// `key_count` must be between 1 and 255.
    pub fn new(key_count: usize, is_unique: bool) -> MdbKey {
        if key_count == 0 {
            panic!("key must have at least one field");
        }
        if key_count > 255 {
            panic!("composite key limited to 255 fields, got {}", key_count);
        }
        MdbKey {
            buf: ByteBuffer::new(),
            is_unique,
            key_count,
            key_num: 0,
        }
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    #[inline]
    pub fn is_compound_key(&self) -> bool {
        self.key_count > 1
    }

    /// Declared number of fields.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// Number of fields appended so far.
    #[inline]
    pub fn key_num(&self) -> usize {
        self.key_num
    }

    pub fn reset(&mut self) {
        self.buf.reset();
        self.key_num = 0;
    }

    #[inline]
    pub fn key(&self) -> &[u8] {
        self.buf.bytes()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Raw access to the underlying buffer, used to append the primary-id
    /// tail of non-unique keys past the field-count accounting.
    pub fn buffer_mut(&mut self) -> &mut ByteBuffer {
        &mut self.buf
    }

    pub fn append_bytes(&mut self, val: &[u8]) -> Result<()> {
        self.write_head(val.len())?;
        self.buf.write(val);
        Ok(())
    }

    pub fn append_str(&mut self, val: &str) -> Result<()> {
        self.write_head(val.len())?;
        self.buf.write_str(val);
        Ok(())
    }

    pub fn append_i16(&mut self, val: i16) -> Result<()> {
        self.write_head(3)?;
        self.buf.write_byte(sign_tag(val >= 0));
        self.buf.write_u16(val as u16);
        Ok(())
    }

    pub fn append_i32(&mut self, val: i32) -> Result<()> {
        self.write_head(5)?;
        self.buf.write_byte(sign_tag(val >= 0));
        self.buf.write_u32(val as u32);
        Ok(())
    }

    pub fn append_i64(&mut self, val: i64) -> Result<()> {
        self.write_head(9)?;
        self.buf.write_byte(sign_tag(val >= 0));
        self.buf.write_u64(val as u64);
        Ok(())
    }

    pub fn append_u16(&mut self, val: u16) -> Result<()> {
        self.write_head(2)?;
        self.buf.write_u16(val);
        Ok(())
    }

    pub fn append_u32(&mut self, val: u32) -> Result<()> {
        self.write_head(4)?;
        self.buf.write_u32(val);
        Ok(())
    }

    pub fn append_u64(&mut self, val: u64) -> Result<()> {
        self.write_head(8)?;
        self.buf.write_u64(val);
        Ok(())
    }

    pub fn append_f32(&mut self, val: f32) -> Result<()> {
        self.append_u32(f32_to_u32(val))
    }

    pub fn append_f64(&mut self, val: f64) -> Result<()> {
        self.append_u64(f64_to_u64(val))
    }

    /// Dynamic append, dispatching on the scalar's runtime tag.
    pub fn append_scalar(&mut self, val: &Scalar) -> Result<()> {
        match val {
            Scalar::I16(v) => self.append_i16(*v),
            Scalar::I32(v) => self.append_i32(*v),
            Scalar::I64(v) => self.append_i64(*v),
            Scalar::U16(v) => self.append_u16(*v),
            Scalar::U32(v) => self.append_u32(*v),
            Scalar::U64(v) => self.append_u64(*v),
            Scalar::F32(v) => self.append_f32(*v),
            Scalar::F64(v) => self.append_f64(*v),
            Scalar::Str(v) => self.append_str(v),
            Scalar::Bytes(v) => self.append_bytes(v),
        }
    }

    /// Append any value convertible to a [Scalar], domain wrapper types
    /// included.
    pub fn append_value<T: ToScalar>(&mut self, val: &T) -> Result<()> {
        self.append_scalar(&val.to_scalar())
    }

    fn write_head(&mut self, n: usize) -> Result<()> {
        if self.key_num > self.key_count {
            return err_at!(InvalidKey, msg: "append past {} declared fields", self.key_count);
        }
        if self.key_count > 1 {
            if n > 255 {
                return err_at!(InvalidKey, msg: "field encodes to {} bytes, max 255", n);
            }
            if self.key_num == 0 {
                self.buf.write_byte(self.key_count as u8);
            }
            self.buf.write_byte(n as u8);
        }
        self.key_num += 1;
        Ok(())
    }
}

#[inline]
fn sign_tag(non_negative: bool) -> u8 {
    if non_negative {
        b'>'
    } else {
        b'-'
    }
}

/// Tagged scalar value, the runtime-typed side of the key encoder.
///
/// Projection lookups and other dynamic callers hand fields over as
/// scalars; [MdbKey::append_scalar] dispatches them onto the typed
/// appends.
#[derive(Clone, Debug, PartialEq, Arbitrary)]
pub enum Scalar {
    I16(i16),
    I32(i32),
    I64(i64),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Conversion into [Scalar], the hook domain wrapper types implement to
/// participate in dynamic key building.
pub trait ToScalar {
    fn to_scalar(&self) -> Scalar;
}

macro_rules! impl_to_scalar {
    ($(($t:ty, $v:ident)),*) => {
        $(impl ToScalar for $t {
            fn to_scalar(&self) -> Scalar {
                Scalar::$v(*self)
            }
        })*
    };
}

impl_to_scalar![
    (i16, I16),
    (i32, I32),
    (i64, I64),
    (u16, U16),
    (u32, U32),
    (u64, U64),
    (f32, F32),
    (f64, F64)
];

impl ToScalar for String {
    fn to_scalar(&self) -> Scalar {
        Scalar::Str(self.clone())
    }
}

impl ToScalar for &str {
    fn to_scalar(&self) -> Scalar {
        Scalar::Str(self.to_string())
    }
}

impl ToScalar for Vec<u8> {
    fn to_scalar(&self) -> Scalar {
        Scalar::Bytes(self.clone())
    }
}

impl ToScalar for Scalar {
    fn to_scalar(&self) -> Scalar {
        self.clone()
    }
}

#[cfg(test)]
#[path = "key_test.rs"]
mod key_test;
