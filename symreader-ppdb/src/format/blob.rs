use super::{FormatError, FormatErrorKind};

/// Reads a little-endian `u32` at the start of a byte slice.
pub(crate) fn read_u32(data: &[u8]) -> Option<(u32, &[u8])> {
    let bytes = data.get(..4)?;
    let num = u32::from_le_bytes(bytes.try_into().ok()?);
    Some((num, &data[4..]))
}

/// Decodes a compressed unsigned number at the start of a byte slice, returning the number
/// and the rest of the slice in the success case.
pub(crate) fn decode_unsigned(data: &[u8]) -> Result<(u32, &[u8]), FormatError> {
    let first_byte = *data
        .first()
        .ok_or(FormatErrorKind::InvalidCompressedUnsigned)?;

    if first_byte & 0b1000_0000 == 0 {
        return Ok((first_byte as u32, &data[1..]));
    }

    if first_byte & 0b0100_0000 == 0 {
        let bytes: [u8; 2] = data
            .get(..2)
            .and_then(|b| b.try_into().ok())
            .ok_or(FormatErrorKind::InvalidCompressedUnsigned)?;
        let num = u16::from_be_bytes(bytes);
        let masked = num & 0b0011_1111_1111_1111;
        return Ok((masked as u32, &data[2..]));
    }

    if first_byte & 0b0010_0000 == 0 {
        let bytes: [u8; 4] = data
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(FormatErrorKind::InvalidCompressedUnsigned)?;
        let num = u32::from_be_bytes(bytes);
        let masked = num & 0b0001_1111_1111_1111_1111_1111_1111_1111;
        return Ok((masked, &data[4..]));
    }

    Err(FormatErrorKind::InvalidCompressedUnsigned.into())
}

/// Decodes a compressed signed number at the start of a byte slice, returning the number
/// and the rest of the slice in the success case.
pub(crate) fn decode_signed(data: &[u8]) -> Result<(i32, &[u8]), FormatError> {
    let first_byte = *data
        .first()
        .ok_or(FormatErrorKind::InvalidCompressedSigned)?;

    if first_byte & 0b1000_0000 == 0 {
        // transform `0b0abc_defg` to `0bggab_cdef`.
        let lsb = first_byte & 0b0000_0001; // lsb = 0b0000_000g
        let mut rotated = first_byte >> 1; // rotated = 0b00ab_cdef
        rotated |= lsb << 6; // rotated = 0b0gab_cdef
        rotated |= lsb << 7; // rotated = 0bggab_cdef;
        return Ok((rotated as i8 as i32, &data[1..]));
    }

    if first_byte & 0b0100_0000 == 0 {
        let bytes: [u8; 2] = data
            .get(..2)
            .and_then(|b| b.try_into().ok())
            .ok_or(FormatErrorKind::InvalidCompressedSigned)?;
        let mut num = u16::from_be_bytes(bytes);
        num &= 0b0011_1111_1111_1111; // clear the tag bits
        let lsb = num & 0b0000_0001;
        let mut rotated = num >> 1;
        rotated |= lsb << 13;
        rotated |= lsb << 14;
        rotated |= lsb << 15;
        return Ok((rotated as i16 as i32, &data[2..]));
    }

    if first_byte & 0b0010_0000 == 0 {
        let bytes: [u8; 4] = data
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(FormatErrorKind::InvalidCompressedSigned)?;
        let mut num = u32::from_be_bytes(bytes);
        num &= 0b0001_1111_1111_1111_1111_1111_1111_1111; // clear the tag bits
        let lsb = num & 0b0000_0001;
        let mut rotated = num >> 1;
        rotated |= lsb << 28;
        rotated |= lsb << 29;
        rotated |= lsb << 30;
        rotated |= lsb << 31;
        return Ok((rotated as i32, &data[4..]));
    }

    Err(FormatErrorKind::InvalidCompressedSigned.into())
}

/// A forward-only cursor over the contents of a blob.
///
/// Every read failure is reported with the error kind the cursor was created with, so that
/// callers get an error that names the kind of blob that was malformed.
#[derive(Debug, Clone)]
pub(crate) struct BlobReader<'data> {
    data: &'data [u8],
    error: FormatErrorKind,
}

impl<'data> BlobReader<'data> {
    pub(crate) fn new(data: &'data [u8], error: FormatErrorKind) -> Self {
        Self { data, error }
    }

    /// The bytes that have not been consumed yet.
    pub(crate) fn rest(&self) -> &'data [u8] {
        self.data
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn peek_u8(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'data [u8], FormatError> {
        if len > self.data.len() {
            return Err(self.error.into());
        }
        let (bytes, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(bytes)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let bytes = self.read_bytes(N)?;
        bytes.try_into().map_err(|_| self.error.into())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, FormatError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_compressed_unsigned(&mut self) -> Result<u32, FormatError> {
        let (value, rest) =
            decode_unsigned(self.data).map_err(|e| FormatError::new(self.error, e))?;
        self.data = rest;
        Ok(value)
    }

    pub(crate) fn read_compressed_signed(&mut self) -> Result<i32, FormatError> {
        let (value, rest) = decode_signed(self.data).map_err(|e| FormatError::new(self.error, e))?;
        self.data = rest;
        Ok(value)
    }
}
