//! Walking ECMA-335 type signatures, see II.23.2.

use super::blob::BlobReader;
use super::{FormatError, FormatErrorKind};

pub(crate) const ELEMENT_TYPE_BOOLEAN: u8 = 0x02;
pub(crate) const ELEMENT_TYPE_CHAR: u8 = 0x03;
pub(crate) const ELEMENT_TYPE_I1: u8 = 0x04;
pub(crate) const ELEMENT_TYPE_U1: u8 = 0x05;
pub(crate) const ELEMENT_TYPE_I2: u8 = 0x06;
pub(crate) const ELEMENT_TYPE_U2: u8 = 0x07;
pub(crate) const ELEMENT_TYPE_I4: u8 = 0x08;
pub(crate) const ELEMENT_TYPE_U4: u8 = 0x09;
pub(crate) const ELEMENT_TYPE_I8: u8 = 0x0a;
pub(crate) const ELEMENT_TYPE_U8: u8 = 0x0b;
pub(crate) const ELEMENT_TYPE_R4: u8 = 0x0c;
pub(crate) const ELEMENT_TYPE_R8: u8 = 0x0d;
pub(crate) const ELEMENT_TYPE_STRING: u8 = 0x0e;
pub(crate) const ELEMENT_TYPE_PTR: u8 = 0x0f;
pub(crate) const ELEMENT_TYPE_BYREF: u8 = 0x10;
pub(crate) const ELEMENT_TYPE_VALUETYPE: u8 = 0x11;
pub(crate) const ELEMENT_TYPE_CLASS: u8 = 0x12;
pub(crate) const ELEMENT_TYPE_VAR: u8 = 0x13;
pub(crate) const ELEMENT_TYPE_ARRAY: u8 = 0x14;
pub(crate) const ELEMENT_TYPE_GENERICINST: u8 = 0x15;
pub(crate) const ELEMENT_TYPE_TYPEDBYREF: u8 = 0x16;
pub(crate) const ELEMENT_TYPE_I: u8 = 0x18;
pub(crate) const ELEMENT_TYPE_U: u8 = 0x19;
pub(crate) const ELEMENT_TYPE_FNPTR: u8 = 0x1b;
pub(crate) const ELEMENT_TYPE_OBJECT: u8 = 0x1c;
pub(crate) const ELEMENT_TYPE_SZARRAY: u8 = 0x1d;
pub(crate) const ELEMENT_TYPE_MVAR: u8 = 0x1e;
pub(crate) const ELEMENT_TYPE_CMOD_REQD: u8 = 0x1f;
pub(crate) const ELEMENT_TYPE_CMOD_OPT: u8 = 0x20;
pub(crate) const ELEMENT_TYPE_SENTINEL: u8 = 0x41;
pub(crate) const ELEMENT_TYPE_PINNED: u8 = 0x45;

/// The leading byte of a local variable signature.
const LOCAL_SIG: u8 = 0x07;
/// The calling convention flag of generic method signatures.
const CALLCONV_GENERIC: u8 = 0x10;

/// Signatures nested deeper than this are rejected.
const MAX_DEPTH: usize = 64;

/// Converts a `TypeDefOrRefOrSpecEncoded` value into a metadata token.
pub(crate) fn type_def_or_ref_token(coded: u32) -> Result<u32, FormatError> {
    let table = match coded & 0b11 {
        0 => 0x0200_0000,
        1 => 0x0100_0000,
        2 => 0x1b00_0000,
        _ => return Err(FormatErrorKind::InvalidTypeSignature.into()),
    };
    Ok(table | coded >> 2)
}

/// Reads a `TypeDefOrRefOrSpecEncoded` value and converts it into a metadata token.
pub(crate) fn read_type_token(reader: &mut BlobReader<'_>) -> Result<u32, FormatError> {
    type_def_or_ref_token(reader.read_compressed_unsigned()?)
}

fn invalid() -> FormatError {
    FormatErrorKind::InvalidTypeSignature.into()
}

/// Skips over custom modifiers at the current position.
pub(crate) fn skip_custom_mods(reader: &mut BlobReader<'_>) -> Result<(), FormatError> {
    while let Some(ELEMENT_TYPE_CMOD_REQD | ELEMENT_TYPE_CMOD_OPT) = reader.peek_u8() {
        reader.read_u8()?;
        read_type_token(reader)?;
    }
    Ok(())
}

/// Skips over one complete type, including leading custom modifiers.
pub(crate) fn skip_type(reader: &mut BlobReader<'_>) -> Result<(), FormatError> {
    skip_type_at(reader, 0)
}

fn skip_type_at(reader: &mut BlobReader<'_>, depth: usize) -> Result<(), FormatError> {
    if depth > MAX_DEPTH {
        return Err(invalid());
    }
    let depth = depth + 1;

    skip_custom_mods(reader)?;
    match reader.read_u8()? {
        0x01..=ELEMENT_TYPE_STRING
        | ELEMENT_TYPE_TYPEDBYREF
        | ELEMENT_TYPE_I
        | ELEMENT_TYPE_U
        | ELEMENT_TYPE_OBJECT => {}
        ELEMENT_TYPE_PTR
        | ELEMENT_TYPE_BYREF
        | ELEMENT_TYPE_SZARRAY
        | ELEMENT_TYPE_PINNED
        | ELEMENT_TYPE_SENTINEL => skip_type_at(reader, depth)?,
        ELEMENT_TYPE_VALUETYPE | ELEMENT_TYPE_CLASS => {
            read_type_token(reader)?;
        }
        ELEMENT_TYPE_VAR | ELEMENT_TYPE_MVAR => {
            reader.read_compressed_unsigned()?;
        }
        ELEMENT_TYPE_ARRAY => {
            skip_type_at(reader, depth)?;
            let _rank = reader.read_compressed_unsigned()?;
            let num_sizes = reader.read_compressed_unsigned()?;
            for _ in 0..num_sizes {
                reader.read_compressed_unsigned()?;
            }
            let num_lo_bounds = reader.read_compressed_unsigned()?;
            for _ in 0..num_lo_bounds {
                reader.read_compressed_signed()?;
            }
        }
        ELEMENT_TYPE_GENERICINST => {
            match reader.read_u8()? {
                ELEMENT_TYPE_VALUETYPE | ELEMENT_TYPE_CLASS => {}
                _ => return Err(invalid()),
            }
            read_type_token(reader)?;
            let count = reader.read_compressed_unsigned()?;
            for _ in 0..count {
                skip_type_at(reader, depth)?;
            }
        }
        ELEMENT_TYPE_FNPTR => {
            let calling_convention = reader.read_u8()?;
            if calling_convention & CALLCONV_GENERIC != 0 {
                reader.read_compressed_unsigned()?;
            }
            let param_count = reader.read_compressed_unsigned()?;
            // return type
            skip_type_at(reader, depth)?;
            for _ in 0..param_count {
                skip_type_at(reader, depth)?;
            }
        }
        _ => return Err(invalid()),
    }
    Ok(())
}

/// Splits a local variable signature into the type signatures of its slots.
pub fn local_slots(signature: &[u8]) -> Result<Vec<&[u8]>, FormatError> {
    let mut reader = BlobReader::new(signature, FormatErrorKind::InvalidTypeSignature);
    if reader.read_u8()? != LOCAL_SIG {
        return Err(invalid());
    }
    let count = reader.read_compressed_unsigned()?;

    let mut slots = Vec::with_capacity(count.min(0x1000) as usize);
    for _ in 0..count {
        let before = reader.rest();
        skip_type(&mut reader)?;
        let len = before.len() - reader.rest().len();
        slots.push(&before[..len]);
    }
    Ok(slots)
}
