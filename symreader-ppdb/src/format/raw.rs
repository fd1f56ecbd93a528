use watto::Pod;

/// Signature for physical metadata as specified by ECMA-335.
///
/// Serialized as ASCII "BSJB" on little-endian systems.
pub const METADATA_SIGNATURE: u32 = 0x424A_5342;

/// First part of the metadata header, as specified in the ECMA-335 spec, II.24.2.1.
///
/// This includes everything before the version string.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    /// The metadata signature.
    ///
    /// The value of this should be [`METADATA_SIGNATURE`].
    pub signature: u32,
    /// Major version, 1 (ignore on read).
    pub major_version: u16,
    /// Minor version, 1 (ignore on read).
    pub minor_version: u16,
    /// Reserved, always 0.
    pub _reserved: u32,
    /// Number of bytes allocated to hold version string.
    ///
    /// This is the actual length of the version string, including the
    /// null terminator, rounded up to a multiple of 4.
    pub version_length: u32,
}

/// Second part of the metadata header, as specified in the ECMA-335 spec, II.24.2.1.
///
/// This includes everything after the version string.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HeaderPart2 {
    /// Reserved, always 0.
    pub flags: u16,
    /// Number of streams.
    pub streams: u16,
}

/// A stream header, as specified in the ECMA-335 spec, II.24.2.2.
///
/// Does not contain the stream's name due to its variable length.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StreamHeader {
    /// Memory offset to start of this stream form start of the metadata root.
    pub offset: u32,
    /// Size of this stream in bytes.
    ///
    /// This should always be a multiple of 4.
    pub size: u32,
}

/// The fixed part of the `#Pdb` stream.
///
/// It is followed by one `u32` row count per bit set in `referenced_tables`.
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct PdbStreamHeader {
    /// The PDB id: a GUID followed by a 4 byte time stamp.
    pub id: [u8; 20],
    /// The token of the user entry point method, or 0.
    pub entry_point: u32,
    /// Bit vector of the type system tables referenced by this file.
    pub referenced_tables: u64,
}

/// The header of the `#~` stream, as specified in the ECMA-335 spec, II.24.2.6.
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct MetadataStreamHeader {
    pub _reserved: u32,
    pub major_version: u8,
    pub minor_version: u8,
    pub heap_sizes: u8,
    pub _reserved2: u8,
    pub valid_tables: u64,
    pub sorted_tables: u64,
}

unsafe impl Pod for Header {}
unsafe impl Pod for HeaderPart2 {}
unsafe impl Pod for StreamHeader {}
unsafe impl Pod for PdbStreamHeader {}
unsafe impl Pod for MetadataStreamHeader {}
