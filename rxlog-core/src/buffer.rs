//! Buffer access for little-endian receiver log bodies.
//!
//! This module provides:
//! - [`ReadBuffer`] for fixed-offset reads (flattened layouts, header records)
//! - [`WriteBuffer`] for fixed-offset writes and in-place patching
//! - [`ByteReader`], a bounds-checked forward cursor for variable layouts

use crate::error::{Error, Result};

/// Trait for read-only buffer access at fixed offsets.
///
/// All read methods use little-endian byte order. Offsets are not checked;
/// callers validate the total length once before reading a fixed layout.
pub trait ReadBuffer {
    /// Returns the buffer as a byte slice.
    fn as_slice(&self) -> &[u8];

    /// Returns the length of the buffer in bytes.
    fn len(&self) -> usize;

    /// Returns true if the buffer is empty.
    #[must_use]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a u8 at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_u8(&self, offset: usize) -> u8 {
        self.as_slice()[offset]
    }

    /// Reads an i8 at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_i8(&self, offset: usize) -> i8 {
        self.as_slice()[offset] as i8
    }

    /// Reads a u16 in little-endian at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_u16_le(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.get_array(offset))
    }

    /// Reads an i16 in little-endian at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_i16_le(&self, offset: usize) -> i16 {
        i16::from_le_bytes(self.get_array(offset))
    }

    /// Reads a u32 in little-endian at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_u32_le(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.get_array(offset))
    }

    /// Reads an i32 in little-endian at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_i32_le(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.get_array(offset))
    }

    /// Reads a u64 in little-endian at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_u64_le(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.get_array(offset))
    }

    /// Reads an i64 in little-endian at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_i64_le(&self, offset: usize) -> i64 {
        i64::from_le_bytes(self.get_array(offset))
    }

    /// Reads an f32 in little-endian at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_f32_le(&self, offset: usize) -> f32 {
        f32::from_bits(self.get_u32_le(offset))
    }

    /// Reads an f64 in little-endian at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to read from
    #[inline(always)]
    fn get_f64_le(&self, offset: usize) -> f64 {
        f64::from_bits(self.get_u64_le(offset))
    }

    /// Copies `N` bytes at the given offset into an array.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to start from
    #[inline(always)]
    fn get_array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.as_slice()[offset..offset + N]);
        out
    }

    /// Returns a slice of bytes at the given offset and length.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to start from
    /// * `len` - Number of bytes to read
    #[inline(always)]
    fn get_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.as_slice()[offset..offset + len]
    }

    /// Reads a NUL-padded character field, stopping at the first NUL.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to start from
    /// * `len` - Field width in bytes
    #[inline]
    fn get_cstr(&self, offset: usize, len: usize) -> &[u8] {
        let bytes = self.get_bytes(offset, len);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        &bytes[..end]
    }
}

/// Trait for read-write buffer access at fixed offsets.
///
/// All write methods use little-endian byte order.
pub trait WriteBuffer: ReadBuffer {
    /// Returns the buffer as a mutable byte slice.
    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Writes a u8 at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to write to
    /// * `value` - Value to write
    #[inline(always)]
    fn put_u8(&mut self, offset: usize, value: u8) {
        self.as_mut_slice()[offset] = value;
    }

    /// Writes an i8 at the given offset.
    #[inline(always)]
    fn put_i8(&mut self, offset: usize, value: i8) {
        self.as_mut_slice()[offset] = value as u8;
    }

    /// Writes a u16 in little-endian at the given offset.
    #[inline(always)]
    fn put_u16_le(&mut self, offset: usize, value: u16) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    /// Writes an i16 in little-endian at the given offset.
    #[inline(always)]
    fn put_i16_le(&mut self, offset: usize, value: i16) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    /// Writes a u32 in little-endian at the given offset.
    #[inline(always)]
    fn put_u32_le(&mut self, offset: usize, value: u32) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    /// Writes an i32 in little-endian at the given offset.
    #[inline(always)]
    fn put_i32_le(&mut self, offset: usize, value: i32) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    /// Writes a u64 in little-endian at the given offset.
    #[inline(always)]
    fn put_u64_le(&mut self, offset: usize, value: u64) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    /// Writes an i64 in little-endian at the given offset.
    #[inline(always)]
    fn put_i64_le(&mut self, offset: usize, value: i64) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    /// Writes an f32 in little-endian at the given offset.
    #[inline(always)]
    fn put_f32_le(&mut self, offset: usize, value: f32) {
        self.put_u32_le(offset, value.to_bits());
    }

    /// Writes an f64 in little-endian at the given offset.
    #[inline(always)]
    fn put_f64_le(&mut self, offset: usize, value: f64) {
        self.put_u64_le(offset, value.to_bits());
    }

    /// Writes a byte slice at the given offset.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to write to
    /// * `src` - Source bytes to copy
    #[inline(always)]
    fn put_bytes(&mut self, offset: usize, src: &[u8]) {
        self.as_mut_slice()[offset..offset + src.len()].copy_from_slice(src);
    }

    /// Writes bytes into a fixed-width field, truncating and padding with NULs.
    ///
    /// # Arguments
    /// * `offset` - Byte offset to write to
    /// * `value` - Bytes to write
    /// * `width` - Field width in bytes
    #[inline]
    fn put_padded(&mut self, offset: usize, value: &[u8], width: usize) {
        let copy_len = value.len().min(width);
        self.as_mut_slice()[offset..offset + copy_len].copy_from_slice(&value[..copy_len]);
        if copy_len < width {
            self.as_mut_slice()[offset + copy_len..offset + width].fill(0);
        }
    }
}

impl ReadBuffer for [u8] {
    #[inline(always)]
    fn as_slice(&self) -> &[u8] {
        self
    }

    #[inline(always)]
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }
}

impl WriteBuffer for [u8] {
    #[inline(always)]
    fn as_mut_slice(&mut self) -> &mut [u8] {
        self
    }
}

impl ReadBuffer for Vec<u8> {
    #[inline(always)]
    fn as_slice(&self) -> &[u8] {
        self
    }

    #[inline(always)]
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

impl WriteBuffer for Vec<u8> {
    #[inline(always)]
    fn as_mut_slice(&mut self) -> &mut [u8] {
        self
    }
}

/// Forward cursor over a byte slice with bounds checking on every read.
///
/// Used for layouts whose field offsets depend on earlier values (counted
/// arrays, variable strings). Every read that would run past the end returns
/// [`Error::BufferTooShort`] with the absolute position required.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Returns the current read position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Returns true when every byte has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.position == self.data.len()
    }

    /// Checks that `len` more bytes are available.
    ///
    /// # Errors
    /// Returns [`Error::BufferTooShort`] if fewer bytes remain.
    #[inline]
    pub fn ensure(&self, len: usize) -> Result<()> {
        if self.remaining() < len {
            return Err(Error::BufferTooShort {
                required: self.position + len,
                available: self.data.len(),
            });
        }
        Ok(())
    }

    /// Consumes `len` bytes and returns them.
    ///
    /// # Errors
    /// Returns [`Error::BufferTooShort`] if fewer bytes remain.
    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Advances the cursor by `len` bytes.
    ///
    /// # Errors
    /// Returns [`Error::BufferTooShort`] if fewer bytes remain.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.position += len;
        Ok(())
    }

    /// Advances the cursor to the next multiple of `alignment`, measured from
    /// the start of the reader.
    ///
    /// # Errors
    /// Returns [`Error::BufferTooShort`] if the padding runs past the end.
    pub fn align_to(&mut self, alignment: usize) -> Result<()> {
        let rem = self.position % alignment;
        if rem != 0 {
            self.skip(alignment - rem)?;
        }
        Ok(())
    }

    /// Consumes a NUL-terminated string and returns the bytes before the NUL.
    ///
    /// The terminator is consumed but not returned.
    ///
    /// # Errors
    /// Returns [`Error::BufferTooShort`] if no NUL is found before the end.
    pub fn read_cstr(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.position..];
        let Some(len) = rest.iter().position(|&b| b == 0) else {
            return Err(Error::BufferTooShort {
                required: self.data.len() + 1,
                available: self.data.len(),
            });
        };
        let bytes = &rest[..len];
        self.position += len + 1;
        Ok(bytes)
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads a u8.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads an i8.
    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_array::<1>()?[0] as i8)
    }

    /// Reads a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a little-endian i16.
    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_array().map(i16::from_le_bytes)
    }

    /// Reads a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a little-endian i32.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Reads a little-endian u64.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Reads a little-endian i64.
    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_array().map(i64::from_le_bytes)
    }

    /// Reads a little-endian f32.
    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_array().map(f32::from_le_bytes)
    }

    /// Reads a little-endian f64.
    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_array().map(f64::from_le_bytes)
    }
}
