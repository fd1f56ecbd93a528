use symreader_common::{Language, HASH_ALGORITHM_SHA1};
use symreader_ppdb::{
    local_variable_signatures, ConstantData, ConstantValue, DebugInfo, FormatErrorKind, Import,
    PdbId, PortablePdb, SequencePoint, TableType, TypeName, HIDDEN_LINE,
};
use symreader_testutils::*;

fn sample() -> DebugInfo {
    DebugInfo::parse(&sample_pdb()).unwrap()
}

#[test]
fn test_parse_header() {
    let buf = sample_pdb();
    assert!(PortablePdb::peek(&buf));

    let ppdb = PortablePdb::parse(&buf).unwrap();
    assert_eq!(ppdb.version_string(), "PDB v1.0");
    assert_eq!(
        ppdb.pdb_id(),
        Some(PdbId::new(SAMPLE_GUID, SAMPLE_STAMP))
    );
    assert_eq!(ppdb.entry_point(), Some(0x0600_0001));
    assert_eq!(ppdb.row_count(TableType::Document), 13);
    assert_eq!(ppdb.row_count(TableType::MethodDebugInformation), 8);
    assert!(ppdb.has_debug_info());
}

#[test]
fn test_parse_invalid() {
    let err = PortablePdb::parse(b"MZ\x90\x00not a pdb").unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::InvalidSignature);

    let err = PortablePdb::parse(b"BS").unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::InvalidHeader);

    let buf = sample_pdb();
    assert!(PortablePdb::parse(&buf[..100]).is_err());
}

#[test]
fn test_metadata_without_pdb_stream() {
    let mut builder = PdbBuilder::new(SAMPLE_GUID, SAMPLE_STAMP);
    builder.without_pdb_stream();
    builder.add_document("a.cs", LANGUAGE_CSHARP, uuid::Uuid::nil(), &[]);
    let buf = builder.build();

    let ppdb = PortablePdb::parse(&buf).unwrap();
    assert_eq!(ppdb.pdb_id(), None);
    assert_eq!(ppdb.entry_point(), None);
    assert!(!ppdb.has_debug_info());
}

#[test]
fn test_documents() {
    let info = sample();
    let documents = info.documents();
    assert_eq!(documents.len(), 13);

    let names: Vec<_> = documents.iter().map(|d| d.name()).collect();
    assert_eq!(names, SAMPLE_DOCUMENTS);

    let first = &documents[0];
    assert_eq!(first.language(), Language::CSharp);
    assert_eq!(first.hash_algorithm(), HASH_ALGORITHM_SHA1);
    assert_eq!(first.hash(), SAMPLE_CHECKSUM);

    assert_eq!(documents[2].language(), Language::VisualBasic);
    assert_eq!(documents[2].hash().len(), 32);

    assert!(documents[3].hash().is_empty());
    assert!(documents[3].hash_algorithm().is_nil());
}

#[test]
fn test_embedded_sources() {
    let info = sample();
    let documents = info.documents();

    let source = documents[0].embedded_source().unwrap();
    assert_eq!(source.len().unwrap(), SAMPLE_SOURCE.len());
    assert_eq!(&*source.contents().unwrap(), SAMPLE_SOURCE.as_bytes());
    assert!(source.format().unwrap() > 0);

    let source = documents[1].embedded_source().unwrap();
    assert_eq!(source.format().unwrap(), 0);
    assert_eq!(&*source.contents().unwrap(), b"// 1.cs\n");

    assert!(documents[2].embedded_source().is_none());
}

#[test]
fn test_source_link() {
    let info = sample();
    assert_eq!(info.source_link().len(), 1);
    assert_eq!(
        info.source_link_mappings()
            .resolve("C:\\a\\b\\c\\d\\1.cs")
            .as_deref(),
        Some("https://example.com/src/a/b/c/d/1.cs")
    );
    assert_eq!(info.source_link_mappings().resolve(":6.cs"), None);
}

#[test]
fn test_sequence_points() {
    let info = sample();
    let main = info.method(0x0600_0001).unwrap();
    assert_eq!(main.token(), 0x0600_0001);
    assert_eq!(main.local_signature_token(), Some(0x1100_0001));

    let points = main.sequence_points();
    assert_eq!(points.len(), 6);
    assert_eq!(
        points[1],
        SequencePoint {
            il_offset: 0x01,
            start_line: 6,
            start_column: 9,
            end_line: 6,
            end_column: 30,
            document: 0,
        }
    );
    assert!(points[2].is_hidden());
    assert_eq!(points[2].start_line, HIDDEN_LINE);

    // the point in the second document, with a smaller line than the previous one
    assert_eq!(points[3].document, 1);
    assert_eq!((points[3].start_line, points[3].end_column), (3, 25));

    // back in the first document, spanning several lines
    assert_eq!(points[4].document, 0);
    assert_eq!(
        (points[4].start_line, points[4].end_line, points[4].end_column),
        (7, 9, 10)
    );

    let expected: Vec<_> = main_points().iter().map(|p| p.il_offset).collect();
    let actual: Vec<_> = points.iter().map(|p| p.il_offset).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_methods_without_debug_info() {
    let info = sample();
    assert!(info.method(0x0600_0003).is_none());
    assert!(info.method(0x0600_0009).is_none());
    assert!(info.method(0x0200_0001).is_none());
    assert!(info.method(0x0600_0000).is_none());

    // scopes without sequence points still count as debug information
    let method = info.method(0x0600_0008).unwrap();
    assert!(method.sequence_points().is_empty());
    assert_eq!(method.root_scopes().len(), 1);

    let tokens: Vec<_> = info.methods().map(|m| m.token()).collect();
    assert_eq!(
        tokens,
        [0x0600_0001, 0x0600_0002, 0x0600_0004, 0x0600_0005, 0x0600_0006, 0x0600_0007, 0x0600_0008]
    );
}

#[test]
fn test_scopes() {
    let info = sample();
    let main = info.method(0x0600_0001).unwrap();
    assert_eq!(main.root_scopes().len(), 1);

    let outer = info.scope(main.root_scopes()[0]).unwrap();
    assert_eq!((outer.start_offset(), outer.end_offset()), (0, 0x20));
    assert_eq!(outer.parent(), None);
    assert_eq!(outer.children().len(), 1);

    let names: Vec<_> = outer
        .variables()
        .map(|i| info.variables()[i].name())
        .collect();
    assert_eq!(names, ["x", "y"]);
    assert_eq!(outer.constants().len(), 0);

    let inner = info.scope(outer.children()[0]).unwrap();
    assert_eq!((inner.start_offset(), inner.end_offset()), (0x07, 0x14));
    assert_eq!(inner.parent(), Some(main.root_scopes()[0]));
    assert!(inner.contains(0x07));
    assert!(!inner.contains(0x14));

    let variables: Vec<_> = inner.variables().map(|i| &info.variables()[i]).collect();
    assert_eq!(variables.len(), 2);
    assert_eq!(variables[0].name(), "z");
    assert_eq!(variables[0].index(), 2);
    assert!(!variables[0].is_debugger_hidden());
    assert_eq!(variables[1].name(), "CS$0");
    assert!(variables[1].is_debugger_hidden());

    let constants: Vec<_> = inner.constants().map(|i| &info.constants()[i]).collect();
    assert_eq!(constants.len(), 1);
    assert_eq!(constants[0].name(), "K");
    assert_eq!(constants[0].data(), &ConstantData::Value(ConstantValue::I4(5)));
}

#[test]
fn test_constants() {
    let info = sample();
    let method = info.method(0x0600_0002).unwrap();
    let scope = info.scope(method.root_scopes()[0]).unwrap();
    assert_eq!((scope.start_offset(), scope.end_offset()), (0, 2));
    assert_eq!(scope.variables().len(), 0);

    let constants: Vec<_> = scope.constants().map(|i| &info.constants()[i]).collect();
    assert_eq!(constants.len(), 29);

    let value = |name: &str| {
        constants
            .iter()
            .find(|c| c.name() == name)
            .unwrap()
            .data()
            .clone()
    };
    assert_eq!(value("B"), ConstantData::Value(ConstantValue::Boolean(true)));
    assert_eq!(value("C"), ConstantData::Value(ConstantValue::Char(0x63)));
    assert_eq!(value("I8"), ConstantData::Value(ConstantValue::I8(-8)));
    assert_eq!(value("R4"), ConstantData::Value(ConstantValue::R4(1.5)));
    assert_eq!(
        value("S"),
        ConstantData::Value(ConstantValue::String("str".into()))
    );
    assert_eq!(
        value("US"),
        ConstantData::Value(ConstantValue::String("\u{3bb}".into()))
    );
    assert_eq!(value("NS"), ConstantData::Value(ConstantValue::Null));
    assert_eq!(value("O"), ConstantData::Value(ConstantValue::Null));
    assert_eq!(value("NC"), ConstantData::Value(ConstantValue::Null));
    assert_eq!(value("E"), ConstantData::Value(ConstantValue::I4(7)));
    assert_eq!(value("Big"), ConstantData::Value(ConstantValue::U8(u64::MAX)));

    let enum_with_modifier = constants.iter().find(|c| c.name() == "EM").unwrap();
    assert_eq!(enum_with_modifier.signature(), [0x20, 0x09, 0x11, 0x0C]);

    let decimal = constants[28];
    assert_eq!(decimal.name(), "D");
    assert_eq!(decimal.signature(), [0x11, 0x2D]);
    assert_eq!(decimal.data().type_token(), Some(DECIMAL_TYPE_TOKEN));
    let resolved = decimal
        .data()
        .resolve(|token| {
            assert_eq!(token, DECIMAL_TYPE_TOKEN);
            Some(TypeName::new("System", "Decimal"))
        })
        .unwrap();
    match resolved {
        ConstantValue::Decimal(decimal) => assert_eq!(decimal.to_string(), "123456.78"),
        other => panic!("unexpected value {other:?}"),
    }

    let date_time = constants.iter().find(|c| c.name() == "DT").unwrap();
    assert_eq!(date_time.data().type_token(), Some(DATE_TIME_TYPE_TOKEN));
}

#[test]
fn test_import_scopes() {
    let info = sample();
    let scopes = info.import_scopes();
    assert_eq!(scopes.len(), 2);

    assert_eq!(scopes[0].parent(), None);
    assert_eq!(
        scopes[0].imports(),
        [
            Import::Namespace {
                namespace: "System".into()
            },
            Import::AliasNamespace {
                alias: "IO".into(),
                namespace: "System.IO".into()
            },
            Import::AliasAssemblyReference {
                alias: "ext".into(),
                assembly: 0x2300_0002
            },
        ]
    );

    assert_eq!(scopes[1].parent(), Some(0));
    let imports = scopes[1].imports();
    assert_eq!(imports.len(), 5);
    assert_eq!(
        imports[1],
        Import::AssemblyNamespace {
            assembly: 0x2300_0001,
            namespace: "System.Linq".into()
        }
    );
    assert_eq!(
        imports[2],
        Import::AliasType {
            alias: "L".into(),
            type_token: 0x0100_0002
        }
    );
    assert_eq!(
        imports[4],
        Import::Type {
            type_token: 0x0100_000B
        }
    );

    let namespaces: Vec<_> = imports.iter().filter_map(|i| i.namespace()).collect();
    assert_eq!(
        namespaces,
        ["System.Collections.Generic", "System.Linq", "urn:x"]
    );

    let main = info.method(0x0600_0001).unwrap();
    let outer = info.scope(main.root_scopes()[0]).unwrap();
    assert_eq!(outer.import_scope(), Some(1));
}

#[test]
fn test_async_info() {
    let info = sample();
    assert!(info.method(0x0600_0004).unwrap().async_info().is_none());

    let move_next = info.method(0x0600_0005).unwrap();
    let async_info = move_next.async_info().unwrap();
    assert_eq!(async_info.kickoff_method(), 0x0600_0004);
    assert_eq!(async_info.catch_handler_offset(), Some(0x28));

    let steps = async_info.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].yield_offset, 0x0a);
    assert_eq!(steps[0].resume_offset, 0x12);
    assert_eq!(steps[0].resume_method, 0x0600_0005);
    assert_eq!(steps[1].yield_offset, 0x22);
}

#[test]
fn test_async_info_without_state_machine() {
    let mut builder = PdbBuilder::new(SAMPLE_GUID, SAMPLE_STAMP);
    builder.method_count(1);
    builder.add_document("a.cs", LANGUAGE_CSHARP, uuid::Uuid::nil(), &[]);
    builder.add_method(1, 0, &[Point::new(0, 1, 1, 1, 2)]);
    builder.add_custom_debug_information(
        CDI_PARENT_METHOD_DEF,
        1,
        ASYNC_METHOD_STEPPING_INFORMATION,
        &[0, 0, 0, 0],
    );

    let info = DebugInfo::parse(&builder.build()).unwrap();
    assert!(info.method(0x0600_0001).unwrap().async_info().is_none());
}

#[test]
fn test_invalid_source_link() {
    let mut builder = PdbBuilder::new(SAMPLE_GUID, SAMPLE_STAMP);
    builder.add_source_link("{not json");

    let err = DebugInfo::parse(&builder.build()).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::InvalidSourceLinkJson);
}

#[test]
fn test_sequence_point_in_missing_document() {
    let mut builder = PdbBuilder::new(SAMPLE_GUID, SAMPLE_STAMP);
    builder.method_count(1);
    builder.add_document("a.cs", LANGUAGE_CSHARP, uuid::Uuid::nil(), &[]);
    builder.add_method(1, 0, &[Point::new(0, 1, 1, 1, 2).in_document(2)]);

    let err = DebugInfo::parse(&builder.build()).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::InvalidSequencePoint);
}

#[test]
fn test_local_variable_signatures() {
    // int, string, List<int>
    let signature = [0x07, 0x03, 0x08, 0x0E, 0x15, 0x12, 0x09, 0x01, 0x08];
    let slots = local_variable_signatures(&signature).unwrap();
    assert_eq!(slots.len(), 3);
    assert_eq!(slots[0], [0x08]);
    assert_eq!(slots[1], [0x0E]);
    assert_eq!(slots[2], [0x15, 0x12, 0x09, 0x01, 0x08]);
}
