//! Test helpers for `symreader`.
//!
//! Fixtures are generated in memory: [`PdbBuilder`] writes Portable PDB files and [`PeBuilder`]
//! writes PE images that reference or embed them.
#![warn(missing_docs)]

mod pdb;
mod pe;

use uuid::Uuid;

pub use pdb::*;
pub use pe::*;

/// The GUID of the [`sample_pdb`].
pub const SAMPLE_GUID: Uuid = uuid::uuid!("6D6A8D49-7D4F-4A4D-9E9F-5C5F2C2E1A01");
/// The time stamp of the [`sample_pdb`].
pub const SAMPLE_STAMP: u32 = 0x8E5F_1D2B;

/// The `TypeRef` token the [`sample_pdb`] uses for `System.Decimal`.
pub const DECIMAL_TYPE_TOKEN: u32 = 0x0100_000B;
/// The `TypeRef` token the [`sample_pdb`] uses for `System.DateTime`.
pub const DATE_TIME_TYPE_TOKEN: u32 = 0x0100_000C;

/// The source of the first document, embedded compressed.
pub const SAMPLE_SOURCE: &str = "class C\n{\n    static void Main()\n    {\n    }\n}\n";

/// The paths of the documents of the [`sample_pdb`].
pub const SAMPLE_DOCUMENTS: [&str; 13] = [
    "C:\\Documents.cs",
    "C:\\a\\b\\c\\d\\1.cs",
    "C:\\a\\b\\c\\D\\2.vb",
    "C:\\a\\b\\C\\d\\3.cs",
    "C:\\a\\b\\c\\d\\x.cs",
    "C:\\A\\b\\c\\x.cs",
    "C:\\a\\b\\x.cs",
    "C:\\a\\B\\3.cs",
    "C:\\a\\B\\c\\4.cs",
    "C:\\*\\5.cs",
    ":6.cs",
    "C:\\a\\b\\X.cs",
    "C:\\a\\B\\x.cs",
];

/// The SHA-1 checksum of the first document of the [`sample_pdb`].
pub const SAMPLE_CHECKSUM: [u8; 20] = [
    0xDB, 0xEB, 0x2A, 0x06, 0x7B, 0x2F, 0x0E, 0x0D, 0x67, 0x8A, 0x00, 0x2C, 0x58, 0x7A, 0x28,
    0x06, 0x05, 0x6C, 0x3D, 0xCE,
];

/// The sequence points of `Main` (method row 1), which spans the first two documents.
pub fn main_points() -> Vec<Point> {
    vec![
        Point::new(0x00, 5, 5, 5, 6),
        Point::new(0x01, 6, 9, 6, 30),
        Point::hidden(0x07),
        Point::new(0x0c, 3, 9, 3, 25).in_document(2),
        Point::new(0x14, 7, 9, 9, 10),
        Point::new(0x1e, 10, 5, 10, 6),
    ]
}

/// The 29 constants of the only scope of method row 2, as name and signature blob.
///
/// The last one is `D = 123456.78M`, which can only be decoded once the name of its type is
/// known.
pub fn sample_constants() -> Vec<(&'static str, Vec<u8>)> {
    let mut decimal = vec![0x11, 0x2D, 0x02];
    decimal.extend_from_slice(&12_345_678u32.to_le_bytes());
    decimal.extend_from_slice(&[0; 8]);

    let mut date_time = vec![0x11, 0x31];
    date_time.extend_from_slice(&630_822_816_000_000_000i64.to_le_bytes());

    let mut r4 = vec![0x0C];
    r4.extend_from_slice(&1.5f32.to_le_bytes());
    let mut r8 = vec![0x0D];
    r8.extend_from_slice(&2.5f64.to_le_bytes());
    let mut max = vec![0x08];
    max.extend_from_slice(&i32::MAX.to_le_bytes());
    let mut min = vec![0x08];
    min.extend_from_slice(&i32::MIN.to_le_bytes());
    let mut big = vec![0x0B];
    big.extend_from_slice(&u64::MAX.to_le_bytes());

    vec![
        ("B", vec![0x02, 0x01]),
        ("C", vec![0x03, 0x63, 0x00]),
        ("I1", vec![0x04, 0xFF]),
        ("U1", vec![0x05, 0x01]),
        ("I2", vec![0x06, 0xFE, 0xFF]),
        ("U2", vec![0x07, 0x02, 0x00]),
        ("I4", vec![0x08, 0xFC, 0xFF, 0xFF, 0xFF]),
        ("U4", vec![0x09, 0x04, 0x00, 0x00, 0x00]),
        ("I8", vec![0x0A, 0xF8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]),
        ("U8", vec![0x0B, 0x08, 0, 0, 0, 0, 0, 0, 0]),
        ("R4", r4),
        ("R8", r8),
        ("S", vec![0x0E, 0x73, 0x00, 0x74, 0x00, 0x72, 0x00]),
        ("ES", vec![0x0E]),
        ("NS", vec![0x0E, 0xFF]),
        ("O", vec![0x1C]),
        ("NC", vec![0x12, 0x09]),
        ("E", vec![0x08, 0x07, 0x00, 0x00, 0x00, 0x08]),
        ("EM", vec![0x20, 0x09, 0x05, 0x03, 0x0C]),
        ("DT", date_time),
        ("MOD", vec![0x1F, 0x09, 0x08, 0x01, 0x00, 0x00, 0x00]),
        ("Zero", vec![0x08, 0, 0, 0, 0]),
        ("Max", max),
        ("Min", min),
        ("Big", big),
        ("Ch", vec![0x03, 0xBB, 0x03]),
        ("US", vec![0x0E, 0xBB, 0x03]),
        ("T", vec![0x02, 0x00]),
        ("D", decimal),
    ]
}

/// A builder for the [`sample_pdb`].
pub fn sample_pdb_builder() -> PdbBuilder {
    let mut builder = PdbBuilder::new(SAMPLE_GUID, SAMPLE_STAMP);
    builder
        .entry_point(0x0600_0001)
        .method_count(8)
        .referenced_rows(0x01, 12)
        .referenced_rows(0x02, 4)
        .referenced_rows(0x11, 3)
        .referenced_rows(0x23, 2);

    for (i, path) in SAMPLE_DOCUMENTS.iter().enumerate() {
        match i {
            0 => builder.add_document(path, LANGUAGE_CSHARP, HASH_SHA1, &SAMPLE_CHECKSUM),
            2 => builder.add_document(path, LANGUAGE_VB, HASH_SHA256, &[0xAB; 32]),
            _ => builder.add_document(path, LANGUAGE_CSHARP, Uuid::nil(), &[]),
        };
    }

    let file_imports = builder.add_import_scope(
        0,
        &[
            ImportDef::Namespace("System".into()),
            ImportDef::AliasNamespace("IO".into(), "System.IO".into()),
            ImportDef::AliasAssemblyReference("ext".into(), 2),
        ],
    );
    let method_imports = builder.add_import_scope(
        file_imports,
        &[
            ImportDef::Namespace("System.Collections.Generic".into()),
            ImportDef::AssemblyNamespace(1, "System.Linq".into()),
            ImportDef::AliasType("L".into(), 0x09),
            ImportDef::XmlNamespace("x".into(), "urn:x".into()),
            ImportDef::Type(0x2D),
        ],
    );

    // Main
    builder.add_method(1, 1, &main_points());
    builder.add_scope(
        ScopeDef::new(1, 0, 0x20)
            .with_import_scope(method_imports)
            .with_variable(LocalDef::new("x", 0))
            .with_variable(LocalDef::new("y", 1)),
    );
    builder.add_scope(
        ScopeDef::new(1, 0x07, 0x0d)
            .with_import_scope(method_imports)
            .with_variable(LocalDef::new("z", 2))
            .with_variable(LocalDef {
                name: "CS$0".into(),
                index: 3,
                attributes: 1,
            })
            .with_constant("K", &[0x08, 0x05, 0x00, 0x00, 0x00]),
    );

    // C<S>.F<T>
    builder.add_method(
        2,
        0,
        &[Point::new(0x00, 20, 9, 20, 10), Point::new(0x01, 21, 13, 21, 20)],
    );
    let mut constants_scope = ScopeDef::new(2, 0, 2).with_import_scope(file_imports);
    for (name, signature) in sample_constants() {
        constants_scope = constants_scope.with_constant(name, &signature);
    }
    builder.add_scope(constants_scope);

    // async M and its MoveNext
    builder.add_method(4, 0, &[Point::new(0x00, 30, 5, 30, 6)]);
    builder.add_method(
        5,
        2,
        &[
            Point::new(0x00, 31, 9, 31, 40),
            Point::hidden(0x10),
            Point::new(0x20, 32, 9, 32, 30),
            Point::new(0x30, 33, 5, 33, 6),
        ],
    );
    builder.add_scope(ScopeDef::new(5, 0, 0x38).with_variable(LocalDef::new("t", 0)));
    builder.add_async_method(5, 4, Some(0x28), &[(0x0a, 0x12, 5), (0x22, 0x2a, 5)]);

    builder.add_method(6, 0, &[Point::new(0x00, 40, 1, 40, 10).in_document(3)]);
    builder.add_method(7, 0, &[Point::new(0x00, 41, 1, 41, 2).in_document(13)]);

    // a method with scopes but without sequence points
    builder.add_scope(ScopeDef::new(8, 0, 4).with_variable(LocalDef::new("w", 0)));

    builder.add_source_link(r#"{"documents": {"C:\\*": "https://example.com/src/*"}}"#);
    builder.add_embedded_source(1, SAMPLE_SOURCE.as_bytes(), true);
    builder.add_embedded_source(2, b"// 1.cs\n", false);

    builder
}

/// A Portable PDB with 13 documents and methods that cover all kinds of debug information.
pub fn sample_pdb() -> Vec<u8> {
    sample_pdb_builder().build()
}

/// A valid Portable PDB whose identity does not match the [`sample_pdb`].
pub fn other_pdb() -> Vec<u8> {
    let mut builder = PdbBuilder::new(
        uuid::uuid!("0F3C8A11-2B7E-4E7B-8C2D-8E4F1A6B9C01"),
        SAMPLE_STAMP,
    );
    builder.method_count(1);
    builder.add_document("C:\\Async.cs", LANGUAGE_CSHARP, Uuid::nil(), &[]);
    builder.add_method(1, 0, &[Point::new(0, 1, 1, 1, 2)]);
    builder.build()
}

/// A PE image whose CodeView entry references the [`sample_pdb`].
pub fn sample_pe() -> Vec<u8> {
    PeBuilder::new()
        .codeview(SAMPLE_GUID, SAMPLE_STAMP, "C:\\obj\\Documents.pdb")
        .build()
}

/// A PE image that embeds the [`sample_pdb`].
pub fn embedded_pe() -> Vec<u8> {
    PeBuilder::new()
        .codeview(SAMPLE_GUID, SAMPLE_STAMP, "Documents.pdb")
        .raw_entry(DEBUG_TYPE_REPRO, &[])
        .embedded_pdb(&sample_pdb())
        .build()
}
