use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use symreader::buffer::{fill, fill_slice, fill_utf16, Status};
use symreader::{
    AsyncStepInfo, ConstantValue, Decimal, Document, DocumentFilter, Error, ErrorKind,
    MetadataImport, NoMetadataImport, ReleaseStatus, SymReader, TypeName, ADDRESS_KIND_IL_OFFSET,
};
use symreader_common::Uuid;
use symreader_testutils::*;

#[derive(Debug, Default)]
struct TestImport {
    types: HashMap<u32, TypeName>,
    signatures: HashMap<u32, Vec<u8>>,
}

impl MetadataImport for TestImport {
    fn type_name(&self, token: u32) -> Option<TypeName> {
        self.types.get(&token).cloned()
    }

    fn local_signature(&self, token: u32) -> Option<Vec<u8>> {
        self.signatures.get(&token).cloned()
    }
}

fn test_import() -> Arc<dyn MetadataImport> {
    let mut import = TestImport::default();
    import
        .types
        .insert(DECIMAL_TYPE_TOKEN, TypeName::new("System", "Decimal"));
    import
        .types
        .insert(DATE_TIME_TYPE_TOKEN, TypeName::new("System", "DateTime"));
    // int, string, bool, object
    import
        .signatures
        .insert(0x1100_0001, vec![0x07, 0x04, 0x08, 0x0E, 0x02, 0x1C]);
    Arc::new(import)
}

fn sample() -> SymReader {
    SymReader::parse(&sample_pdb(), NoMetadataImport).unwrap()
}

fn document(reader: &SymReader, index: usize) -> Document {
    reader.documents().unwrap().swap_remove(index)
}

fn kind<T>(result: Result<T, Error>) -> ErrorKind {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(e) => e.kind(),
    }
}

#[test]
fn test_documents() {
    let reader = sample();

    let mut out = Vec::new();
    let (count, status) = fill(reader.documents().unwrap(), 0, &mut out);
    assert_eq!((count, status), (13, Status::NoData));
    assert!(out.is_empty());

    let (count, status) = fill(reader.documents().unwrap(), count, &mut out);
    assert_eq!((count, status), (13, Status::Ok));

    let urls: Vec<_> = out.iter().map(|d| d.url().unwrap()).collect();
    similar_asserts::assert_eq!(urls, SAMPLE_DOCUMENTS.map(String::from).to_vec());

    // views are created per query but compare by identity
    assert_eq!(out[3], document(&reader, 3));
    assert_ne!(out[3], out[4]);
}

#[test]
fn test_document_properties() {
    let reader = sample();
    let documents = reader.documents().unwrap();

    let first = &documents[0];
    assert_eq!(first.language().unwrap(), LANGUAGE_CSHARP);
    assert_eq!(
        first.language_vendor().unwrap(),
        symreader_common::LANGUAGE_VENDOR_MICROSOFT
    );
    assert_eq!(
        first.document_type().unwrap(),
        symreader_common::DOCUMENT_TYPE_TEXT
    );
    assert_eq!(first.checksum_algorithm().unwrap(), HASH_SHA1);
    assert_eq!(first.checksum().unwrap(), SAMPLE_CHECKSUM);

    let mut checksum = [0; 20];
    assert_eq!(
        fill_slice(&first.checksum().unwrap(), &mut []),
        (20, Status::NoData)
    );
    assert_eq!(
        fill_slice(&first.checksum().unwrap(), &mut checksum),
        (20, Status::Ok)
    );
    assert_eq!(checksum, SAMPLE_CHECKSUM);

    // no checksum at all
    let second = &documents[1];
    assert_eq!(second.checksum_algorithm().unwrap(), Uuid::nil());
    assert_eq!(
        fill_slice(&second.checksum().unwrap(), &mut checksum),
        (0, Status::NoData)
    );

    assert_eq!(documents[2].language().unwrap(), LANGUAGE_VB);
    assert_eq!(documents[2].checksum().unwrap().len(), 32);
}

#[test]
fn test_document_url_buffer() {
    let reader = sample();
    let document = document(&reader, 0);
    let url = document.url().unwrap();

    let (required, status) = fill_utf16(&url, &mut []);
    assert_eq!(required, url.len() + 1);
    assert_eq!(status, Status::NoData);

    let mut buf = vec![0xFFFF; required];
    assert_eq!(fill_utf16(&url, &mut buf), (required, Status::Ok));
    assert_eq!(String::from_utf16(&buf[..required - 1]).unwrap(), url);
    assert_eq!(buf[required - 1], 0);

    // too small buffers receive a prefix
    let mut short = [0; 4];
    assert_eq!(fill_utf16(&url, &mut short), (4, Status::Ok));
    assert_eq!(String::from_utf16(&short).unwrap(), "C:\\D");
}

#[test]
fn test_document_lookup() {
    let reader = sample();
    let any = DocumentFilter::default();

    for (index, url) in SAMPLE_DOCUMENTS.iter().enumerate() {
        assert_eq!(reader.document(url, &any).unwrap(), document(&reader, index));
    }

    // the lookup is exact
    assert_eq!(
        kind(reader.document("c:\\documents.cs", &any)),
        ErrorKind::NotFound
    );
    assert_eq!(kind(reader.document("Documents.cs", &any)), ErrorKind::NotFound);

    let vb = DocumentFilter {
        language: LANGUAGE_VB,
        ..Default::default()
    };
    assert!(reader.document(SAMPLE_DOCUMENTS[2], &vb).is_ok());
    assert_eq!(
        kind(reader.document(SAMPLE_DOCUMENTS[0], &vb)),
        ErrorKind::NotFound
    );

    let sha1 = DocumentFilter {
        checksum_algorithm: HASH_SHA1,
        language_vendor: symreader_common::LANGUAGE_VENDOR_MICROSOFT,
        document_type: symreader_common::DOCUMENT_TYPE_TEXT,
        ..Default::default()
    };
    assert!(reader.document(SAMPLE_DOCUMENTS[0], &sha1).is_ok());
    assert_eq!(
        kind(reader.document(SAMPLE_DOCUMENTS[2], &sha1)),
        ErrorKind::NotFound
    );

    let other_vendor = DocumentFilter {
        language_vendor: LANGUAGE_VB,
        ..Default::default()
    };
    assert_eq!(
        kind(reader.document(SAMPLE_DOCUMENTS[0], &other_vendor)),
        ErrorKind::NotFound
    );
}

#[test]
fn test_embedded_source() {
    let reader = sample();
    let documents = reader.documents().unwrap();

    // compressed
    assert!(documents[0].has_embedded_source().unwrap());
    assert_eq!(documents[0].source_length().unwrap(), SAMPLE_SOURCE.len());
    assert_eq!(
        documents[0].embedded_source().unwrap().as_deref(),
        Some(SAMPLE_SOURCE.as_bytes())
    );

    // stored as is
    assert_eq!(documents[1].source_length().unwrap(), 8);
    assert_eq!(
        documents[1].embedded_source().unwrap().as_deref(),
        Some(&b"// 1.cs\n"[..])
    );

    assert!(!documents[2].has_embedded_source().unwrap());
    assert_eq!(documents[2].source_length().unwrap(), 0);
    assert_eq!(documents[2].embedded_source().unwrap(), None);
}

#[test]
fn test_source_link() {
    let reader = sample();
    assert_eq!(reader.source_link().unwrap().len(), 1);

    let documents = reader.documents().unwrap();
    assert_eq!(
        documents[0].source_link_url().unwrap().as_deref(),
        Some("https://example.com/src/Documents.cs")
    );
    assert_eq!(
        documents[1].source_link_url().unwrap().as_deref(),
        Some("https://example.com/src/a/b/c/d/1.cs")
    );
    assert_eq!(documents[10].source_link_url().unwrap(), None);
}

#[test]
fn test_method_lookup() {
    let reader = sample();

    assert_eq!(reader.user_entry_point().unwrap(), 0x0600_0001);
    let main = reader.method(0x0600_0001).unwrap();
    assert_eq!(main.token().unwrap(), 0x0600_0001);
    assert_eq!(main, reader.method_by_version(0x0600_0001, 1).unwrap());
    assert_eq!(
        kind(reader.method_by_version(0x0600_0001, 2)),
        ErrorKind::NotFound
    );

    // no debug information
    assert_eq!(kind(reader.method(0x0600_0003)), ErrorKind::NotFound);
    // out of range
    assert_eq!(kind(reader.method(0x0600_0009)), ErrorKind::NotFound);
    assert_eq!(kind(reader.method(0x0600_0000)), ErrorKind::NotFound);
    // not a MethodDef token
    assert_eq!(kind(reader.method(0x0200_0001)), ErrorKind::NotFound);

    // scopes without sequence points
    let method = reader.method(0x0600_0008).unwrap();
    assert!(method.sequence_points().unwrap().is_empty());
    assert!(method.documents().unwrap().is_empty());
    assert_eq!(method.root_scope().unwrap().children().unwrap().len(), 1);
}

#[test]
fn test_sequence_points() {
    let reader = sample();
    let main = reader.method(0x0600_0001).unwrap();

    let points = main.sequence_points().unwrap();
    let offsets: Vec<_> = points.iter().map(|p| p.il_offset).collect();
    assert_eq!(offsets, [0x00, 0x01, 0x07, 0x0c, 0x14, 0x1e]);
    assert!(points[2].is_hidden());
    assert_eq!(points[3].document, 1);

    let (count, status) = fill_slice(&points, &mut []);
    assert_eq!((count, status), (6, Status::NoData));

    assert_eq!(
        main.documents().unwrap(),
        [document(&reader, 0), document(&reader, 1)]
    );
    assert_eq!(main.local_signature_token().unwrap(), Some(0x1100_0001));
    assert_eq!(
        reader
            .method(0x0600_0002)
            .unwrap()
            .local_signature_token()
            .unwrap(),
        None
    );
}

#[test]
fn test_il_offset() {
    let reader = sample();
    let main = reader.method(0x0600_0001).unwrap();
    let documents = reader.documents().unwrap();

    assert_eq!(main.il_offset(&documents[0], 5, 0).unwrap(), 0x00);
    assert_eq!(main.il_offset(&documents[0], 6, 0).unwrap(), 0x01);
    // inside a multi-line point
    assert_eq!(main.il_offset(&documents[0], 8, 0).unwrap(), 0x14);
    assert_eq!(main.il_offset(&documents[0], 10, 1).unwrap(), 0x1e);
    assert_eq!(main.il_offset(&documents[1], 3, 0).unwrap(), 0x0c);

    assert_eq!(
        kind(main.il_offset(&documents[0], 11, 0)),
        ErrorKind::NotFound
    );
    assert_eq!(
        kind(main.il_offset(&documents[0], 3, 0)),
        ErrorKind::NotFound
    );
    assert_eq!(
        kind(main.il_offset(&documents[2], 5, 0)),
        ErrorKind::NotFound
    );
}

#[test]
fn test_ranges() {
    let reader = sample();
    let documents = reader.documents().unwrap();

    let main = reader.method(0x0600_0001).unwrap();
    // ends at the following hidden point
    assert_eq!(main.ranges(&documents[0], 6, 0).unwrap(), [(0x01, 0x07)]);
    assert_eq!(main.ranges(&documents[0], 8, 0).unwrap(), [(0x14, 0x1e)]);
    // the last point extends to the end of the method
    assert_eq!(main.ranges(&documents[0], 10, 0).unwrap(), [(0x1e, 0x20)]);
    assert_eq!(main.ranges(&documents[1], 3, 0).unwrap(), [(0x0c, 0x14)]);
    assert!(main.ranges(&documents[0], 11, 0).unwrap().is_empty());

    let move_next = reader.method(0x0600_0005).unwrap();
    assert_eq!(
        move_next.ranges(&documents[0], 33, 0).unwrap(),
        [(0x30, 0x38)]
    );

    // without scopes the end of the method is unknown
    let kickoff = reader.method(0x0600_0004).unwrap();
    assert_eq!(
        kickoff.ranges(&documents[0], 30, 0).unwrap(),
        [(0x00, u32::MAX)]
    );
}

#[test]
fn test_source_extent() {
    let reader = sample();
    let documents = reader.documents().unwrap();
    let main = reader.method(0x0600_0001).unwrap();

    assert_eq!(main.source_extent(&documents[0]).unwrap(), (5, 10));
    assert_eq!(main.source_extent(&documents[1]).unwrap(), (3, 3));
    assert_eq!(
        kind(main.source_extent(&documents[2])),
        ErrorKind::NotFound
    );
}

#[test]
fn test_methods_at() {
    let reader = sample();
    let documents = reader.documents().unwrap();

    let methods = reader.methods_at(&documents[0], 8, 0).unwrap();
    assert_eq!(methods, [reader.method(0x0600_0001).unwrap()]);
    assert_eq!(
        reader.primary_method_at(&documents[0], 32, 0).unwrap(),
        reader.method(0x0600_0005).unwrap()
    );
    assert_eq!(
        reader.primary_method_at(&documents[2], 40, 0).unwrap(),
        reader.method(0x0600_0006).unwrap()
    );

    assert!(reader.methods_at(&documents[0], 25, 0).unwrap().is_empty());
    assert_eq!(
        kind(reader.primary_method_at(&documents[0], 25, 0)),
        ErrorKind::NotFound
    );

    let mut out = Vec::new();
    assert_eq!(
        fill(reader.methods_at(&documents[0], 25, 0).unwrap(), 4, &mut out),
        (0, Status::NoData)
    );
}

#[test]
fn test_find_closest_line() {
    let reader = sample();
    let documents = reader.documents().unwrap();

    assert_eq!(documents[0].find_closest_line(5).unwrap(), 5);
    assert_eq!(documents[0].find_closest_line(8).unwrap(), 10);
    assert_eq!(documents[0].find_closest_line(11).unwrap(), 20);
    assert_eq!(
        kind(documents[0].find_closest_line(34)),
        ErrorKind::NotFound
    );
    assert_eq!(documents[1].find_closest_line(1).unwrap(), 3);
    assert_eq!(
        kind(documents[3].find_closest_line(1)),
        ErrorKind::NotFound
    );
}

#[test]
fn test_scopes() {
    let reader = sample();
    let main = reader.method(0x0600_0001).unwrap();

    let root = main.root_scope().unwrap();
    assert!(root.is_root().unwrap());
    assert_eq!(root.parent().unwrap(), None);
    assert_eq!(root.start_offset().unwrap(), 0);
    assert_eq!(root.end_offset().unwrap(), 0x20);
    assert!(root.variables().unwrap().is_empty());
    assert!(root.constants().unwrap().is_empty());
    assert!(root.namespaces().unwrap().is_empty());
    assert_eq!(root.method().unwrap(), main);

    let children = root.children().unwrap();
    assert_eq!(children.len(), 1);
    let outer = &children[0];
    assert!(!outer.is_root().unwrap());
    assert_eq!(outer.parent().unwrap().as_ref(), Some(&root));
    assert_eq!((outer.start_offset().unwrap(), outer.end_offset().unwrap()), (0, 0x20));

    let inner = outer.children().unwrap().remove(0);
    assert_eq!((inner.start_offset().unwrap(), inner.end_offset().unwrap()), (0x07, 0x14));
    assert_eq!(inner.parent().unwrap().as_ref(), Some(outer));
    assert!(inner.children().unwrap().is_empty());

    assert_eq!(main.scope_at_offset(0x08).unwrap(), inner);
    assert_eq!(main.scope_at_offset(0x14).unwrap(), *outer);
    assert_eq!(main.scope_at_offset(0x00).unwrap(), *outer);
    assert_eq!(kind(main.scope_at_offset(0x20)), ErrorKind::NotFound);
}

#[test]
fn test_variables() {
    let reader = sample();
    let main = reader.method(0x0600_0001).unwrap();
    let outer = main.root_scope().unwrap().children().unwrap().remove(0);
    let inner = main.scope_at_offset(0x08).unwrap();

    let names: Vec<_> = outer
        .variables()
        .unwrap()
        .iter()
        .map(|v| (v.name().unwrap(), v.slot().unwrap()))
        .collect();
    assert_eq!(names, [("x".to_owned(), 0), ("y".to_owned(), 1)]);

    let variables = inner.variables().unwrap();
    assert_eq!(variables.len(), 2);

    let z = &variables[0];
    assert_eq!(z.name().unwrap(), "z");
    assert_eq!(z.address_field1().unwrap(), 2);
    assert_eq!(z.address_kind().unwrap(), ADDRESS_KIND_IL_OFFSET);
    assert_eq!(z.attributes().unwrap(), 0);
    assert!(!z.is_debugger_hidden().unwrap());
    assert_eq!(kind(z.address_field2()), ErrorKind::NotImplemented);
    assert_eq!(kind(z.address_field3()), ErrorKind::NotImplemented);
    assert_eq!(kind(z.start_offset()), ErrorKind::NotImplemented);
    assert_eq!(kind(z.end_offset()), ErrorKind::NotImplemented);
    // no metadata to read the signature from
    assert_eq!(kind(z.signature()), ErrorKind::MetadataUnavailable);

    let generated = &variables[1];
    assert_eq!(generated.name().unwrap(), "CS$0");
    assert_eq!(generated.slot().unwrap(), 3);
    assert_eq!(generated.attributes().unwrap(), 1);
    assert!(generated.is_debugger_hidden().unwrap());
}

#[test]
fn test_variable_signatures() {
    let provider = || -> Result<Arc<dyn MetadataImport>, Error> { Ok(test_import()) };
    let reader = SymReader::parse(&sample_pdb(), provider).unwrap();
    let main = reader.method(0x0600_0001).unwrap();
    let outer = main.root_scope().unwrap().children().unwrap().remove(0);
    let inner = main.scope_at_offset(0x08).unwrap();

    let signatures: Vec<_> = outer
        .variables()
        .unwrap()
        .iter()
        .chain(&inner.variables().unwrap())
        .map(|v| v.signature().unwrap())
        .collect();
    assert_eq!(signatures, [[0x08], [0x0E], [0x02], [0x1C]]);

    // MoveNext references a signature the metadata does not have
    let move_next = reader.method(0x0600_0005).unwrap();
    let scope = move_next.scope_at_offset(0).unwrap();
    let t = scope.variables().unwrap().remove(0);
    assert_eq!(t.name().unwrap(), "t");
    assert_eq!(kind(t.signature()), ErrorKind::NotFound);
}

#[test]
fn test_constants() {
    let reader = sample();
    let main = reader.method(0x0600_0001).unwrap();
    let inner = main.scope_at_offset(0x08).unwrap();

    let constants = inner.constants().unwrap();
    assert_eq!(constants.len(), 1);
    assert_eq!(constants[0].name().unwrap(), "K");
    assert_eq!(constants[0].value().unwrap(), ConstantValue::I4(5));
    assert_eq!(constants[0].signature().unwrap(), [0x08]);

    let scope = reader
        .method(0x0600_0002)
        .unwrap()
        .scope_at_offset(0)
        .unwrap();
    let constants = scope.constants().unwrap();
    assert_eq!(constants.len(), 29);

    let by_name = |name: &str| {
        constants
            .iter()
            .find(|c| c.name().unwrap() == name)
            .unwrap()
            .clone()
    };
    assert_eq!(by_name("B").value().unwrap(), ConstantValue::Boolean(true));
    assert_eq!(
        by_name("S").value().unwrap(),
        ConstantValue::String("str".into())
    );
    assert_eq!(by_name("NS").value().unwrap(), ConstantValue::Null);
    assert_eq!(by_name("Min").value().unwrap(), ConstantValue::I4(i32::MIN));
    assert_eq!(
        by_name("Big").value().unwrap(),
        ConstantValue::U8(u64::MAX)
    );
    assert_eq!(by_name("R4").value().unwrap(), ConstantValue::R4(1.5));

    // values and signatures are stable across queries
    let first = by_name("I2");
    assert_eq!(first.value().unwrap(), ConstantValue::I2(-2));
    assert_eq!(first.value().unwrap(), by_name("I2").value().unwrap());
    assert_eq!(first.signature().unwrap(), [0x06]);
    assert_eq!(first.signature().unwrap(), by_name("I2").signature().unwrap());

    // decimals need the metadata of the binary
    assert_eq!(
        kind(by_name("D").value()),
        ErrorKind::MetadataUnavailable
    );
    assert_eq!(by_name("D").signature().unwrap(), [0x11, 0x2D]);
}

#[test]
fn test_lazy_metadata_import() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = {
        let calls = calls.clone();
        move || -> Result<Arc<dyn MetadataImport>, Error> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(test_import())
        }
    };
    let reader = SymReader::parse(&sample_pdb(), provider).unwrap();

    let method = reader.method(0x0600_0002).unwrap();
    let root = method.root_scope().unwrap();
    assert_eq!(
        (root.start_offset().unwrap(), root.end_offset().unwrap()),
        (0, 2)
    );

    let children = root.children().unwrap();
    assert_eq!(children.len(), 1);
    let child = &children[0];
    assert_eq!(child.parent().unwrap(), Some(root.clone()));

    let constants = child.constants().unwrap();
    assert_eq!(constants.len(), 29);
    let decimal = constants.last().unwrap();
    assert_eq!(decimal.name().unwrap(), "D");
    assert_eq!(decimal.signature().unwrap(), [0x11, 0x2D]);

    // nothing so far needed the metadata
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let value = decimal.value().unwrap();
    assert_eq!(
        value,
        ConstantValue::Decimal(Decimal::new(false, 2, 12_345_678).unwrap())
    );
    match value {
        ConstantValue::Decimal(d) => assert_eq!(d.to_string(), "123456.78"),
        other => panic!("unexpected value {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let date_time = constants
        .iter()
        .find(|c| c.name().unwrap() == "DT")
        .unwrap();
    assert_eq!(
        date_time.value().unwrap(),
        ConstantValue::DateTime(630_822_816_000_000_000)
    );
    assert!(reader.metadata_import().is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_metadata_import_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = {
        let calls = calls.clone();
        move || -> Result<Arc<dyn MetadataImport>, Error> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::new(ErrorKind::Io, "no such binary"))
        }
    };
    let reader = SymReader::parse(&sample_pdb(), provider).unwrap();

    assert_eq!(
        kind(reader.metadata_import()),
        ErrorKind::MetadataUnavailable
    );
    assert_eq!(
        kind(reader.metadata_import()),
        ErrorKind::MetadataUnavailable
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // queries that do not need metadata keep working
    assert_eq!(reader.documents().unwrap().len(), 13);
}

#[test]
fn test_concurrent_metadata_import() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = {
        let calls = calls.clone();
        move || -> Result<Arc<dyn MetadataImport>, Error> {
            calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            Ok(test_import())
        }
    };
    let reader = SymReader::parse(&sample_pdb(), provider).unwrap();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let import = reader.metadata_import().unwrap();
                assert_eq!(
                    import.type_name(DECIMAL_TYPE_TOKEN),
                    Some(TypeName::new("System", "Decimal"))
                );
            });
        }
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_with_metadata_import() {
    let info = reader_info();
    let reader = SymReader::with_metadata_import(info, test_import());
    let constant = reader
        .method(0x0600_0002)
        .unwrap()
        .scope_at_offset(0)
        .unwrap()
        .constants()
        .unwrap()
        .pop()
        .unwrap();
    assert!(matches!(
        constant.value().unwrap(),
        ConstantValue::Decimal(_)
    ));
}

fn reader_info() -> symreader::DebugInfo {
    symreader::DebugInfo::parse(&sample_pdb()).unwrap()
}

#[test]
fn test_namespaces() {
    let reader = sample();
    let main = reader.method(0x0600_0001).unwrap();
    let outer = main.root_scope().unwrap().children().unwrap().remove(0);

    let namespaces = outer.namespaces().unwrap();
    let names: Vec<_> = namespaces.iter().map(|n| n.name().unwrap()).collect();
    assert_eq!(names, ["System.Collections.Generic", "System.Linq", "urn:x"]);
    assert_eq!(namespaces[0].alias().unwrap(), None);
    assert_eq!(namespaces[2].alias().unwrap().as_deref(), Some("x"));

    // the constants scope uses the file level imports
    let scope = reader
        .method(0x0600_0002)
        .unwrap()
        .scope_at_offset(0)
        .unwrap();
    let names: Vec<_> = scope
        .namespaces()
        .unwrap()
        .iter()
        .map(|n| n.name().unwrap())
        .collect();
    assert_eq!(names, ["System", "System.IO"]);

    // no import scope
    let scope = reader
        .method(0x0600_0005)
        .unwrap()
        .scope_at_offset(0)
        .unwrap();
    assert!(scope.namespaces().unwrap().is_empty());
}

#[test]
fn test_async_method() {
    let reader = sample();

    let move_next = reader.method(0x0600_0005).unwrap();
    assert!(move_next.is_async().unwrap());
    let info = move_next.async_info().unwrap().unwrap();
    assert_eq!(info.method(), &move_next);
    assert_eq!(info.kickoff_method().unwrap(), 0x0600_0004);
    assert!(info.has_catch_handler().unwrap());
    assert_eq!(info.catch_handler_offset().unwrap(), 0x28);
    assert_eq!(
        info.step_info().unwrap(),
        [
            AsyncStepInfo {
                yield_offset: 0x0a,
                resume_offset: 0x12,
                resume_method: 0x0600_0005,
            },
            AsyncStepInfo {
                yield_offset: 0x22,
                resume_offset: 0x2a,
                resume_method: 0x0600_0005,
            },
        ]
    );

    let main = reader.method(0x0600_0001).unwrap();
    assert!(!main.is_async().unwrap());
    assert_eq!(main.async_info().unwrap(), None);
}

#[test]
fn test_async_method_without_catch_handler() {
    let mut builder = PdbBuilder::new(SAMPLE_GUID, SAMPLE_STAMP);
    builder.method_count(2);
    builder.add_document("C:\\Async.cs", LANGUAGE_CSHARP, Uuid::nil(), &[]);
    builder.add_method(1, 0, &[Point::new(0x00, 1, 1, 1, 2)]);
    builder.add_method(2, 0, &[Point::new(0x00, 3, 1, 3, 2)]);
    builder.add_async_method(2, 1, None, &[(0x02, 0x04, 2)]);
    let reader = SymReader::parse(&builder.build(), NoMetadataImport).unwrap();

    let info = reader.method(0x0600_0002).unwrap().async_info().unwrap().unwrap();
    assert_eq!(info.kickoff_method().unwrap(), 0x0600_0001);
    assert!(!info.has_catch_handler().unwrap());
    assert_eq!(kind(info.catch_handler_offset()), ErrorKind::Unexpected);
    assert_eq!(info.step_info().unwrap().len(), 1);
}

#[test]
fn test_empty_pdb() {
    let mut builder = PdbBuilder::new(SAMPLE_GUID, SAMPLE_STAMP);
    let reader = SymReader::parse(&builder.build(), NoMetadataImport).unwrap();

    let mut out = Vec::new();
    assert_eq!(
        fill(reader.documents().unwrap(), 16, &mut out),
        (0, Status::NoData)
    );
    assert_eq!(kind(reader.method(0x0600_0001)), ErrorKind::NotFound);
    assert_eq!(
        kind(reader.document("", &DocumentFilter::default())),
        ErrorKind::NotFound
    );
    assert!(reader.source_link().unwrap().is_empty());
}

#[test]
fn test_documents_of_other_readers() {
    let reader = sample();
    let other = sample();
    let foreign = document(&other, 0);

    assert_ne!(document(&reader, 0), foreign);
    assert_eq!(
        kind(reader.methods_at(&foreign, 8, 0)),
        ErrorKind::Unexpected
    );
    let main = reader.method(0x0600_0001).unwrap();
    assert_eq!(kind(main.il_offset(&foreign, 8, 0)), ErrorKind::Unexpected);
}

#[test]
fn test_release() {
    let reader = sample();
    let document = document(&reader, 0);
    let main = reader.method(0x0600_0001).unwrap();
    let scope = main.scope_at_offset(0x08).unwrap();
    let variable = scope.variables().unwrap().remove(0);
    let constant = scope.constants().unwrap().remove(0);

    assert_eq!(reader.add_ref().unwrap(), 2);
    assert_eq!(reader.release(), ReleaseStatus::Retained);
    assert!(!reader.is_released());
    assert_eq!(document.url().unwrap(), SAMPLE_DOCUMENTS[0]);

    assert_eq!(reader.release(), ReleaseStatus::Released);
    assert!(reader.is_released());
    assert_eq!(reader.release(), ReleaseStatus::AlreadyReleased);

    assert_eq!(kind(reader.documents()), ErrorKind::InvalidState);
    assert_eq!(kind(reader.method(0x0600_0001)), ErrorKind::InvalidState);
    assert_eq!(kind(reader.add_ref()), ErrorKind::InvalidState);
    assert_eq!(kind(document.url()), ErrorKind::InvalidState);
    assert_eq!(kind(main.token()), ErrorKind::InvalidState);
    assert_eq!(kind(main.sequence_points()), ErrorKind::InvalidState);
    assert_eq!(kind(scope.start_offset()), ErrorKind::InvalidState);
    assert_eq!(kind(variable.name()), ErrorKind::InvalidState);
    assert_eq!(kind(constant.value()), ErrorKind::InvalidState);
}

/// An import that records when it is dropped.
struct DropFlag(Arc<AtomicBool>);

impl MetadataImport for DropFlag {
    fn type_name(&self, _token: u32) -> Option<TypeName> {
        None
    }

    fn local_signature(&self, _token: u32) -> Option<Vec<u8>> {
        None
    }
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_release_frees_state() {
    let dropped = Arc::new(AtomicBool::new(false));
    let reader =
        SymReader::with_metadata_import(reader_info(), Arc::new(DropFlag(dropped.clone())));
    let document = document(&reader, 0);
    let info = reader.debug_info().unwrap();

    assert_eq!(reader.add_ref().unwrap(), 2);
    assert_eq!(reader.release(), ReleaseStatus::Retained);
    assert!(!dropped.load(Ordering::SeqCst));

    // views are still alive, but the import goes away with the last reference
    assert_eq!(reader.release(), ReleaseStatus::Released);
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(kind(document.url()), ErrorKind::InvalidState);
    assert_eq!(kind(reader.debug_info()), ErrorKind::InvalidState);
    assert_eq!(kind(reader.metadata_import()), ErrorKind::InvalidState);

    // debug info handed out before the release stays usable
    assert_eq!(info.documents().len(), 13);
}
