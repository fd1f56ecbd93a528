//! Support for the debug directory of Portable Executables.
//!
//! A .NET binary references its Portable PDB through a CodeView entry in the debug directory and
//! may carry the whole PDB in an embedded Portable PDB entry.

use std::error::Error;
use std::io::Read;

use flate2::read::DeflateDecoder;
use goblin::pe;
use goblin::pe::debug::ImageDebugDirectory;
use goblin::pe::section_table::SectionTable;
use scroll::{Pread, LE};
use thiserror::Error;

use symreader_common::Uuid;
use symreader_ppdb::PdbId;

/// The CodeView debug directory entry type.
pub const IMAGE_DEBUG_TYPE_CODEVIEW: u32 = 2;
/// The embedded Portable PDB debug directory entry type.
pub const IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB: u32 = 17;

const DEBUG_DIRECTORY_SIZE: usize = 28;
const CODEVIEW_SIGNATURE: &[u8; 4] = b"RSDS";
const EMBEDDED_PDB_SIGNATURE: &[u8; 4] = b"MPDB";
/// The largest expansion deflate can achieve, about 1032:1.
const MAX_DEFLATE_RATIO: usize = 1032;

/// An error when dealing with [`PeDebugInfo`].
#[derive(Debug, Error)]
#[error("invalid PE file")]
pub struct PeError {
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl PeError {
    /// Creates a new PE error from an arbitrary error payload.
    fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { source }
    }
}

/// A raw entry of the debug directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugDirectoryEntry {
    /// The type of the entry, such as [`IMAGE_DEBUG_TYPE_CODEVIEW`].
    pub data_type: u32,
    /// The time stamp of the entry.
    pub time_date_stamp: u32,
    /// The major version of the entry's format.
    pub major_version: u16,
    /// The minor version of the entry's format.
    pub minor_version: u16,
    /// The file offset of the entry's data.
    pub pointer_to_raw_data: u32,
    /// The size of the entry's data.
    pub size_of_data: u32,
}

/// The contents of a CodeView debug directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeViewInfo {
    guid: Uuid,
    age: u32,
    path: String,
    stamp: u32,
}

impl CodeViewInfo {
    /// The GUID of the PDB.
    pub fn guid(&self) -> Uuid {
        self.guid
    }

    /// The age of the PDB.
    pub fn age(&self) -> u32 {
        self.age
    }

    /// The path of the PDB at the time the binary was built.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The time stamp of the debug directory entry.
    pub fn stamp(&self) -> u32 {
        self.stamp
    }

    /// The identity a Portable PDB must have to belong to this binary.
    pub fn pdb_id(&self) -> PdbId {
        PdbId::new(self.guid, self.stamp)
    }
}

/// The debug directory of a Portable Executable.
#[derive(Debug, Clone)]
pub struct PeDebugInfo<'data> {
    data: &'data [u8],
    entries: Vec<DebugDirectoryEntry>,
    codeview: Option<CodeViewInfo>,
}

impl<'data> PeDebugInfo<'data> {
    /// Tests whether the buffer could contain a PE file.
    pub fn test(data: &[u8]) -> bool {
        matches!(data.pread_with::<u16>(0, LE), Ok(pe::header::DOS_MAGIC))
    }

    /// Parses the debug directory of a PE file.
    pub fn parse(data: &'data [u8]) -> Result<Self, PeError> {
        let pe = pe::PE::parse(data).map_err(PeError::new)?;

        let mut entries = Vec::new();
        let debug_table = pe
            .header
            .optional_header
            .as_ref()
            .and_then(|header| header.data_directories.get_debug_table());
        if let Some(table) = debug_table {
            let offset = rva_to_offset(&pe.sections, table.virtual_address)
                .ok_or_else(|| PeError::new("debug directory is not mapped to a section"))?;
            let count = table.size as usize / DEBUG_DIRECTORY_SIZE;
            for index in 0..count {
                let entry: ImageDebugDirectory = data
                    .pread_with(offset + index * DEBUG_DIRECTORY_SIZE, LE)
                    .map_err(PeError::new)?;
                entries.push(DebugDirectoryEntry {
                    data_type: entry.data_type,
                    time_date_stamp: entry.time_date_stamp,
                    major_version: entry.major_version,
                    minor_version: entry.minor_version,
                    pointer_to_raw_data: entry.pointer_to_raw_data,
                    size_of_data: entry.size_of_data,
                });
            }
        }

        let mut info = PeDebugInfo {
            data,
            entries,
            codeview: None,
        };
        info.codeview = info.parse_codeview()?;
        Ok(info)
    }

    /// All entries of the debug directory.
    pub fn entries(&self) -> &[DebugDirectoryEntry] {
        &self.entries
    }

    /// The first CodeView entry that references a PDB 7.0 file.
    pub fn codeview(&self) -> Option<&CodeViewInfo> {
        self.codeview.as_ref()
    }

    /// Returns true if the binary embeds its Portable PDB.
    pub fn has_embedded_pdb(&self) -> bool {
        self.entry(IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB).is_some()
    }

    /// Decompresses the embedded Portable PDB, if there is one.
    pub fn embedded_pdb(&self) -> Result<Option<Vec<u8>>, PeError> {
        let Some(entry) = self.entry(IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB) else {
            return Ok(None);
        };

        // The data has the following structure: `signature size deflated`
        // - signature - 4 bytes, `MPDB`
        // - size - uint32, the size of the decompressed PDB
        // - deflated - the deflated PDB, up to the end of the entry
        let data = self.entry_data(entry)?;
        if data.len() < 8 || &data[..4] != EMBEDDED_PDB_SIGNATURE {
            return Err(PeError::new("invalid embedded portable pdb signature"));
        }
        let size: u32 = data.pread_with(4, LE).map_err(PeError::new)?;
        let deflated = &data[8..];

        // The declared size is untrusted: cap the reservation and the inflated output.
        let capacity = (size as usize).min(deflated.len().saturating_mul(MAX_DEFLATE_RATIO));
        let mut pdb = Vec::with_capacity(capacity);
        DeflateDecoder::new(deflated)
            .take(u64::from(size) + 1)
            .read_to_end(&mut pdb)
            .map_err(PeError::new)?;
        if pdb.len() != size as usize {
            return Err(PeError::new(format!(
                "embedded portable pdb has {} bytes, expected {size}",
                pdb.len()
            )));
        }
        Ok(Some(pdb))
    }

    fn entry(&self, data_type: u32) -> Option<&DebugDirectoryEntry> {
        self.entries.iter().find(|entry| entry.data_type == data_type)
    }

    fn entry_data(&self, entry: &DebugDirectoryEntry) -> Result<&'data [u8], PeError> {
        let start = entry.pointer_to_raw_data as usize;
        let end = start + entry.size_of_data as usize;
        self.data
            .get(start..end)
            .ok_or_else(|| PeError::new("debug directory entry out of bounds"))
    }

    fn parse_codeview(&self) -> Result<Option<CodeViewInfo>, PeError> {
        for entry in &self.entries {
            if entry.data_type != IMAGE_DEBUG_TYPE_CODEVIEW {
                continue;
            }

            // The data has the following structure: `signature guid age path`
            // - signature - 4 bytes, `RSDS`
            // - guid - 16 bytes, little endian GUID
            // - age - uint32
            // - path - NUL-terminated UTF-8
            let data = self.entry_data(entry)?;
            if data.len() < 24 || &data[..4] != CODEVIEW_SIGNATURE {
                continue;
            }
            let mut guid = [0; 16];
            guid.copy_from_slice(&data[4..20]);
            let age: u32 = data.pread_with(20, LE).map_err(PeError::new)?;
            let path = &data[24..];
            let path = match path.iter().position(|&b| b == 0) {
                Some(end) => &path[..end],
                None => path,
            };

            return Ok(Some(CodeViewInfo {
                guid: Uuid::from_bytes_le(guid),
                age,
                path: String::from_utf8_lossy(path).into_owned(),
                stamp: entry.time_date_stamp,
            }));
        }
        Ok(None)
    }
}

/// Maps a relative virtual address to a file offset.
fn rva_to_offset(sections: &[SectionTable], rva: u32) -> Option<usize> {
    sections.iter().find_map(|section| {
        let size = section.virtual_size.max(section.size_of_raw_data);
        let offset = rva.checked_sub(section.virtual_address)?;
        (offset < size).then(|| section.pointer_to_raw_data as usize + offset as usize)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use symreader_testutils::{PeBuilder, DEBUG_TYPE_REPRO, SAMPLE_GUID, SAMPLE_STAMP};

    #[test]
    fn test_codeview() {
        let image = symreader_testutils::sample_pe();
        assert!(PeDebugInfo::test(&image));

        let info = PeDebugInfo::parse(&image).unwrap();
        assert_eq!(info.entries().len(), 1);
        assert!(!info.has_embedded_pdb());
        assert_eq!(info.embedded_pdb().unwrap(), None);

        let codeview = info.codeview().unwrap();
        assert_eq!(codeview.guid(), SAMPLE_GUID);
        assert_eq!(codeview.age(), 1);
        assert_eq!(codeview.path(), "C:\\obj\\Documents.pdb");
        assert_eq!(codeview.pdb_id(), PdbId::new(SAMPLE_GUID, SAMPLE_STAMP));
    }

    #[test]
    fn test_embedded_pdb() {
        let image = symreader_testutils::embedded_pe();
        let info = PeDebugInfo::parse(&image).unwrap();

        let types: Vec<_> = info.entries().iter().map(|e| e.data_type).collect();
        assert_eq!(
            types,
            [
                IMAGE_DEBUG_TYPE_CODEVIEW,
                DEBUG_TYPE_REPRO,
                IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB
            ]
        );
        assert!(info.has_embedded_pdb());
        let pdb = info.embedded_pdb().unwrap().unwrap();
        assert_eq!(pdb, symreader_testutils::sample_pdb());
    }

    #[test]
    fn test_invalid_embedded_pdb() {
        let image = PeBuilder::new()
            .raw_entry(IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB, b"XPDB\0\0\0\0")
            .build();
        let info = PeDebugInfo::parse(&image).unwrap();
        assert!(info.codeview().is_none());
        assert!(info.embedded_pdb().is_err());
    }

    fn embedded_entry(size: u32, contents: &[u8]) -> Vec<u8> {
        use std::io::Write;

        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(contents).unwrap();

        let mut entry = EMBEDDED_PDB_SIGNATURE.to_vec();
        entry.extend_from_slice(&size.to_le_bytes());
        entry.extend_from_slice(&encoder.finish().unwrap());
        entry
    }

    #[test]
    fn test_embedded_pdb_size_mismatch() {
        // a huge declared size on a tiny payload
        let entry = embedded_entry(u32::MAX, b"BSJB");
        let image = PeBuilder::new()
            .raw_entry(IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB, &entry)
            .build();
        let info = PeDebugInfo::parse(&image).unwrap();
        assert!(info.embedded_pdb().is_err());

        // a payload that inflates to far more than declared
        let entry = embedded_entry(4, &[0; 1 << 20]);
        let image = PeBuilder::new()
            .raw_entry(IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB, &entry)
            .build();
        let info = PeDebugInfo::parse(&image).unwrap();
        assert!(info.embedded_pdb().is_err());

        let entry = embedded_entry(4, b"BSJB");
        let image = PeBuilder::new()
            .raw_entry(IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB, &entry)
            .build();
        let info = PeDebugInfo::parse(&image).unwrap();
        assert_eq!(info.embedded_pdb().unwrap().as_deref(), Some(&b"BSJB"[..]));
    }

    #[test]
    fn test_not_a_pe() {
        let pdb = symreader_testutils::sample_pdb();
        assert!(!PeDebugInfo::test(&pdb));
        assert!(PeDebugInfo::parse(&pdb).is_err());
    }
}
