//! A writer for minimal PE32 images carrying debug directory entries.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use uuid::Uuid;

const PE_OFFSET: usize = 0x80;
const SECTION_RVA: u32 = 0x1000;
const SECTION_OFFSET: u32 = 0x200;
const FILE_ALIGNMENT: u32 = 0x200;
const DEBUG_DIRECTORY_SIZE: usize = 28;

/// The CodeView debug directory entry type.
pub const DEBUG_TYPE_CODEVIEW: u32 = 2;
/// The reproducible build debug directory entry type.
pub const DEBUG_TYPE_REPRO: u32 = 16;
/// The embedded Portable PDB debug directory entry type.
pub const DEBUG_TYPE_EMBEDDED_PORTABLE_PDB: u32 = 17;

#[derive(Debug, Clone)]
struct DebugEntry {
    type_: u32,
    stamp: u32,
    major_version: u16,
    minor_version: u16,
    data: Vec<u8>,
}

/// Writes a PE32 image with a single section holding the debug directory.
#[derive(Debug, Clone, Default)]
pub struct PeBuilder {
    entries: Vec<DebugEntry>,
}

impl PeBuilder {
    /// Creates an image without debug directory entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a CodeView entry referencing a Portable PDB with the given identity.
    pub fn codeview(&mut self, guid: Uuid, stamp: u32, pdb_path: &str) -> &mut Self {
        let mut data = Vec::new();
        data.extend_from_slice(b"RSDS");
        data.extend_from_slice(&guid.to_bytes_le());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(pdb_path.as_bytes());
        data.push(0);
        self.entries.push(DebugEntry {
            type_: DEBUG_TYPE_CODEVIEW,
            stamp,
            major_version: 0x0100,
            minor_version: 0x504d,
            data,
        });
        self
    }

    /// Adds a debug directory entry with raw data.
    pub fn raw_entry(&mut self, type_: u32, data: &[u8]) -> &mut Self {
        self.entries.push(DebugEntry {
            type_,
            stamp: 0,
            major_version: 0,
            minor_version: 0,
            data: data.to_vec(),
        });
        self
    }

    /// Embeds a Portable PDB into the image.
    pub fn embedded_pdb(&mut self, pdb: &[u8]) -> &mut Self {
        let mut data = Vec::new();
        data.extend_from_slice(b"MPDB");
        data.extend_from_slice(&(pdb.len() as u32).to_le_bytes());
        let mut encoder = DeflateEncoder::new(data, Compression::default());
        encoder.write_all(pdb).unwrap();
        let data = encoder.finish().unwrap();
        self.entries.push(DebugEntry {
            type_: DEBUG_TYPE_EMBEDDED_PORTABLE_PDB,
            stamp: 0,
            major_version: 0x0100,
            minor_version: 0x0100,
            data,
        });
        self
    }

    /// Serializes the image.
    pub fn build(&self) -> Vec<u8> {
        let directory_size = self.entries.len() * DEBUG_DIRECTORY_SIZE;

        let mut section = vec![0; directory_size];
        let mut directory = Vec::with_capacity(directory_size);
        for entry in &self.entries {
            while section.len() % 4 != 0 {
                section.push(0);
            }
            let offset = section.len() as u32;
            section.extend_from_slice(&entry.data);

            directory.extend_from_slice(&0u32.to_le_bytes());
            directory.extend_from_slice(&entry.stamp.to_le_bytes());
            directory.extend_from_slice(&entry.major_version.to_le_bytes());
            directory.extend_from_slice(&entry.minor_version.to_le_bytes());
            directory.extend_from_slice(&entry.type_.to_le_bytes());
            directory.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            directory.extend_from_slice(&(SECTION_RVA + offset).to_le_bytes());
            directory.extend_from_slice(&(SECTION_OFFSET + offset).to_le_bytes());
        }
        section[..directory_size].copy_from_slice(&directory);

        let virtual_size = section.len().max(1) as u32;
        let raw_size = (virtual_size + FILE_ALIGNMENT - 1) / FILE_ALIGNMENT * FILE_ALIGNMENT;
        section.resize(raw_size as usize, 0);
        let image_size = SECTION_RVA + (virtual_size + 0xfff) / 0x1000 * 0x1000;

        let mut buf = vec![0; PE_OFFSET];
        buf[..2].copy_from_slice(b"MZ");
        buf[0x3c..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());

        buf.extend_from_slice(b"PE\0\0");

        // COFF header
        buf.extend_from_slice(&0x014cu16.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&0x5f5e_1000u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&224u16.to_le_bytes());
        buf.extend_from_slice(&0x2102u16.to_le_bytes());

        // Optional header, standard fields
        buf.extend_from_slice(&0x010bu16.to_le_bytes());
        buf.extend_from_slice(&[11, 0]);
        buf.extend_from_slice(&raw_size.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&SECTION_RVA.to_le_bytes());
        buf.extend_from_slice(&SECTION_RVA.to_le_bytes());

        // Optional header, windows fields
        buf.extend_from_slice(&0x1000_0000u32.to_le_bytes());
        buf.extend_from_slice(&0x1000u32.to_le_bytes());
        buf.extend_from_slice(&FILE_ALIGNMENT.to_le_bytes());
        for version in [4u16, 0, 0, 0, 4, 0] {
            buf.extend_from_slice(&version.to_le_bytes());
        }
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&image_size.to_le_bytes());
        buf.extend_from_slice(&SECTION_OFFSET.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&3u16.to_le_bytes());
        buf.extend_from_slice(&0x8540u16.to_le_bytes());
        for size in [0x10_0000u32, 0x1000, 0x10_0000, 0x1000] {
            buf.extend_from_slice(&size.to_le_bytes());
        }
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&16u32.to_le_bytes());

        // Data directories, only the debug directory is set
        for index in 0..16 {
            let (rva, size) = match index {
                6 if directory_size > 0 => (SECTION_RVA, directory_size as u32),
                _ => (0, 0),
            };
            buf.extend_from_slice(&rva.to_le_bytes());
            buf.extend_from_slice(&size.to_le_bytes());
        }

        // Section table
        buf.extend_from_slice(b".text\0\0\0");
        buf.extend_from_slice(&virtual_size.to_le_bytes());
        buf.extend_from_slice(&SECTION_RVA.to_le_bytes());
        buf.extend_from_slice(&raw_size.to_le_bytes());
        buf.extend_from_slice(&SECTION_OFFSET.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0x6000_0020u32.to_le_bytes());

        assert!(buf.len() <= SECTION_OFFSET as usize);
        buf.resize(SECTION_OFFSET as usize, 0);
        buf.extend_from_slice(&section);
        buf
    }
}
