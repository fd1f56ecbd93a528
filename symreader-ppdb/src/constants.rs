//! Values of local constants.
//!
//! See https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#localconstant-table-0x34
//! for the layout of the constant signature blob.

use std::fmt;

use crate::format::signatures::*;
use crate::format::BlobReader;
use crate::{FormatError, FormatErrorKind};

/// The namespace and name of a type of the compiled binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    /// The namespace, empty for types in the global namespace.
    pub namespace: String,
    /// The simple name of the type.
    pub name: String,
}

impl TypeName {
    /// Creates a type name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns true if this is the type `namespace.name`.
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// A 96-bit decimal number as stored in `System.Decimal` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    negative: bool,
    scale: u8,
    mantissa: u128,
}

impl Decimal {
    /// The largest number of fractional digits.
    pub const MAX_SCALE: u8 = 28;

    /// Creates a decimal from its sign, its scale (number of fractional digits) and its mantissa.
    ///
    /// Returns `None` if the scale exceeds [`MAX_SCALE`](Self::MAX_SCALE) or the mantissa does
    /// not fit into 96 bits.
    pub fn new(negative: bool, scale: u8, mantissa: u128) -> Option<Self> {
        if scale > Self::MAX_SCALE || mantissa >> 96 != 0 {
            return None;
        }
        Some(Self {
            negative,
            scale,
            mantissa,
        })
    }

    /// Decodes the 13 byte representation: a sign and scale byte followed by the low, middle
    /// and high 32 bits of the mantissa.
    ///
    /// Returns `None` if the scale is out of range.
    pub fn from_bytes(bytes: [u8; 13]) -> Option<Self> {
        let word = |i: usize| {
            u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]) as u128
        };
        let mantissa = word(1) | word(5) << 32 | word(9) << 64;
        Self::new(bytes[0] & 0x80 != 0, bytes[0] & 0x7f, mantissa)
    }

    /// The 13 byte representation of this decimal.
    pub fn to_bytes(&self) -> [u8; 13] {
        let mut bytes = [0; 13];
        bytes[0] = self.scale | if self.negative { 0x80 } else { 0 };
        bytes[1..5].copy_from_slice(&(self.mantissa as u32).to_le_bytes());
        bytes[5..9].copy_from_slice(&((self.mantissa >> 32) as u32).to_le_bytes());
        bytes[9..13].copy_from_slice(&((self.mantissa >> 64) as u32).to_le_bytes());
        bytes
    }

    /// Whether the number is negative.
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// The number of fractional digits.
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// The unscaled 96-bit integer value.
    pub fn mantissa(&self) -> u128 {
        self.mantissa
    }

    /// Converts the decimal to the nearest `f64`.
    pub fn to_f64(&self) -> f64 {
        let value = self.mantissa as f64 / 10f64.powi(self.scale as i32);
        if self.negative {
            -value
        } else {
            value
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        let scale = self.scale as usize;
        if self.negative && self.mantissa != 0 {
            f.write_str("-")?;
        }
        if scale == 0 {
            return f.write_str(&digits);
        }
        let digits = format!("{digits:0>width$}", width = scale + 1);
        let (int, frac) = digits.split_at(digits.len() - scale);
        write!(f, "{int}.{frac}")
    }
}

/// The value of a local constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// A null reference.
    Null,
    /// A `bool`.
    Boolean(bool),
    /// A UTF-16 code unit.
    Char(u16),
    /// An `sbyte`.
    I1(i8),
    /// A `byte`.
    U1(u8),
    /// A `short`.
    I2(i16),
    /// A `ushort`.
    U2(u16),
    /// An `int`.
    I4(i32),
    /// A `uint`.
    U4(u32),
    /// A `long`.
    I8(i64),
    /// A `ulong`.
    U8(u64),
    /// A `float`.
    R4(f32),
    /// A `double`.
    R8(f64),
    /// A string.
    String(String),
    /// A `System.Decimal`.
    Decimal(Decimal),
    /// A `System.DateTime`, in ticks.
    DateTime(i64),
}

/// The decoded contents of a constant signature blob.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantData {
    /// A value that is fully described by the blob.
    ///
    /// Enum constants decode to the value of their underlying type.
    Value(ConstantValue),
    /// A value of a type that can only be interpreted once its name is known.
    ///
    /// This is how `decimal` and `DateTime` constants are stored.
    Typed {
        /// The `TypeDef`, `TypeRef` or `TypeSpec` token of the value's type.
        type_token: u32,
        /// The raw bytes of the value.
        value: Vec<u8>,
    },
}

impl ConstantData {
    /// The token of the type whose name is needed to interpret the value, if any.
    pub fn type_token(&self) -> Option<u32> {
        match self {
            ConstantData::Typed { type_token, .. } => Some(*type_token),
            ConstantData::Value(_) => None,
        }
    }

    /// Interprets the constant, using `type_name` to look up the names of referenced types.
    ///
    /// `type_name` is only invoked for typed values.
    pub fn resolve<F>(&self, type_name: F) -> Result<ConstantValue, FormatError>
    where
        F: FnOnce(u32) -> Option<TypeName>,
    {
        let (type_token, value) = match self {
            ConstantData::Value(value) => return Ok(value.clone()),
            ConstantData::Typed { type_token, value } => (*type_token, value),
        };
        let name = type_name(type_token).ok_or(FormatErrorKind::InvalidConstant)?;
        if name.is("System", "Decimal") {
            let bytes: [u8; 13] = value
                .as_slice()
                .try_into()
                .map_err(|e| FormatError::new(FormatErrorKind::InvalidConstant, e))?;
            let decimal = Decimal::from_bytes(bytes).ok_or_else(|| {
                FormatError::new(
                    FormatErrorKind::InvalidBlobData,
                    format!("decimal scale {} out of range", bytes[0] & 0x7f),
                )
            })?;
            Ok(ConstantValue::Decimal(decimal))
        } else if name.is("System", "DateTime") {
            let bytes: [u8; 8] = value
                .as_slice()
                .try_into()
                .map_err(|e| FormatError::new(FormatErrorKind::InvalidConstant, e))?;
            Ok(ConstantValue::DateTime(i64::from_le_bytes(bytes)))
        } else {
            Err(FormatError::new(
                FormatErrorKind::InvalidConstant,
                format!("unsupported constant type {name}"),
            ))
        }
    }
}

/// A constant signature blob split into the value and the signature without the value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedConstant {
    pub(crate) signature: Vec<u8>,
    pub(crate) data: ConstantData,
}

/// Splits a constant signature blob into its type signature and value.
pub(crate) fn parse_constant(blob: &[u8]) -> Result<ParsedConstant, FormatError> {
    let mut reader = BlobReader::new(blob, FormatErrorKind::InvalidConstant);
    skip_custom_mods(&mut reader)?;
    let mut signature = blob[..blob.len() - reader.rest().len()].to_vec();

    let type_code = reader.read_u8()?;
    let data = match type_code {
        ELEMENT_TYPE_BOOLEAN..=ELEMENT_TYPE_U8 => {
            let value = read_primitive(&mut reader, type_code)?;
            if reader.is_empty() {
                signature.push(type_code);
            } else {
                // Enum constants are followed by the enum type.
                let enum_type = reader.rest();
                read_type_token(&mut reader)?;
                signature.push(ELEMENT_TYPE_VALUETYPE);
                signature.extend_from_slice(enum_type);
            }
            ConstantData::Value(value)
        }
        ELEMENT_TYPE_R4 | ELEMENT_TYPE_R8 => {
            signature.push(type_code);
            ConstantData::Value(read_primitive(&mut reader, type_code)?)
        }
        ELEMENT_TYPE_STRING => {
            signature.push(type_code);
            ConstantData::Value(read_string(&mut reader)?)
        }
        ELEMENT_TYPE_CLASS | ELEMENT_TYPE_VALUETYPE => {
            let type_start = reader.rest();
            let type_token = read_type_token(&mut reader)?;
            let type_len = type_start.len() - reader.rest().len();
            signature.push(type_code);
            signature.extend_from_slice(&type_start[..type_len]);

            let value = reader.rest().to_vec();
            if value.is_empty() {
                ConstantData::Value(ConstantValue::Null)
            } else {
                ConstantData::Typed { type_token, value }
            }
        }
        ELEMENT_TYPE_OBJECT => {
            signature.push(type_code);
            ConstantData::Value(ConstantValue::Null)
        }
        _ => return Err(FormatErrorKind::InvalidConstant.into()),
    };

    if let ConstantData::Value(_) = data {
        if !reader.is_empty() {
            return Err(FormatErrorKind::InvalidConstant.into());
        }
    }

    Ok(ParsedConstant { signature, data })
}

fn read_primitive(
    reader: &mut BlobReader<'_>,
    type_code: u8,
) -> Result<ConstantValue, FormatError> {
    Ok(match type_code {
        ELEMENT_TYPE_BOOLEAN => ConstantValue::Boolean(reader.read_u8()? != 0),
        ELEMENT_TYPE_CHAR => ConstantValue::Char(u16::from_le_bytes(reader.read_array()?)),
        ELEMENT_TYPE_I1 => ConstantValue::I1(i8::from_le_bytes(reader.read_array()?)),
        ELEMENT_TYPE_U1 => ConstantValue::U1(reader.read_u8()?),
        ELEMENT_TYPE_I2 => ConstantValue::I2(i16::from_le_bytes(reader.read_array()?)),
        ELEMENT_TYPE_U2 => ConstantValue::U2(u16::from_le_bytes(reader.read_array()?)),
        ELEMENT_TYPE_I4 => ConstantValue::I4(reader.read_i32()?),
        ELEMENT_TYPE_U4 => ConstantValue::U4(reader.read_u32()?),
        ELEMENT_TYPE_I8 => ConstantValue::I8(i64::from_le_bytes(reader.read_array()?)),
        ELEMENT_TYPE_U8 => ConstantValue::U8(u64::from_le_bytes(reader.read_array()?)),
        ELEMENT_TYPE_R4 => ConstantValue::R4(f32::from_le_bytes(reader.read_array()?)),
        ELEMENT_TYPE_R8 => ConstantValue::R8(f64::from_le_bytes(reader.read_array()?)),
        _ => return Err(FormatErrorKind::InvalidConstant.into()),
    })
}

/// Reads a UTF-16 string value, where a single `0xff` byte denotes a null string.
fn read_string(reader: &mut BlobReader<'_>) -> Result<ConstantValue, FormatError> {
    let bytes = reader.rest();
    if bytes == [0xff] {
        reader.read_u8()?;
        return Ok(ConstantValue::Null);
    }
    if bytes.len() % 2 != 0 {
        return Err(FormatErrorKind::InvalidConstant.into());
    }
    let bytes = reader.read_bytes(bytes.len())?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let string = String::from_utf16(&units)
        .map_err(|e| FormatError::new(FormatErrorKind::InvalidConstant, e))?;
    Ok(ConstantValue::String(string))
}
