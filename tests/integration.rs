//! Integration tests for the PDF operator lint library

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pdf_oplint::pdf::{extract_metadata, leaf_count, DocumentStore};
use pdf_oplint::{Error, IssueKind, ScanOptions, Session};
use tempfile::TempDir;

/// Builds a document with one page per content string under a flat page tree
fn build_document(pages: &[&str]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = pages
        .iter()
        .map(|text| {
            let content_id = doc.add_object(Stream::new(dictionary! {}, text.as_bytes().to_vec()));
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            }))
        })
        .collect();

    finish_document(&mut doc, pages_id, kids, dictionary! {});
    doc
}

fn finish_document(doc: &mut Document, pages_id: ObjectId, kids: Vec<Object>, extra: lopdf::Dictionary) {
    let mut pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
    };
    for (key, value) in extra.iter() {
        pages.set(key.clone(), value.clone());
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
}

/// Serialize and re-parse, so the tests exercise the xref and trailer reader
fn round_trip(mut doc: Document) -> Session {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize PDF");
    Session::from_bytes(&bytes).expect("Failed to parse PDF")
}

#[test]
fn test_clean_document_has_no_issues() {
    let session = round_trip(build_document(&["q\n1 0 0 1 0 0 cm\nQ"]));

    let report = session.validate_content(None).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.pages_scanned, 1);

    let operators = session.list_operators(None).unwrap();
    assert_eq!(operators.operators, vec!["Q", "cm", "q"]);
}

#[test]
fn test_unknown_operator_is_reported_with_position() {
    let session = round_trip(build_document(&["q\n0 0 100 100 re\nxyz\nQ"]));

    let report = session.validate_content(None).unwrap();
    assert_eq!(report.issues.len(), 1);

    let issue = &report.issues[0];
    assert_eq!(issue.kind, IssueKind::UnknownOperator);
    assert_eq!(issue.operator_name, "xyz");
    assert_eq!(issue.page_number, 1);
    assert_eq!(issue.line_number, 3);
    assert_eq!(issue.message.as_deref(), Some("No validator for xyz"));

    let json = serde_json::to_value(issue).unwrap();
    assert_eq!(json["kind"], "UNKNOWN_OPERATOR");
}

#[test]
fn test_malformed_operands_across_pages() {
    let session = round_trip(build_document(&[
        "BT\n/F1 12 Tf\nET",
        "BT\n12 /F1 Tf\nET",
        "1 0 0 RG\n0.5 w",
    ]));

    let report = session.validate_content(None).unwrap();
    let found: Vec<_> = report
        .issues
        .iter()
        .map(|issue| (issue.page_number, issue.line_number, issue.kind))
        .collect();
    assert_eq!(
        found,
        vec![(2, 2, IssueKind::Malformed), (3, 1, IssueKind::UnknownOperator)]
    );

    let page_two = session.validate_content(Some(1)).unwrap();
    assert_eq!(page_two.issues.len(), 1);
    assert_eq!(page_two.pages_scanned, 1);
}

/// Adds a page whose content is `stream` under `pages_id`
fn add_page(doc: &mut Document, pages_id: ObjectId, stream: Stream) -> Object {
    let content_id = doc.add_object(stream);
    Object::Reference(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    }))
}

fn unfiltered(text: &str) -> Stream {
    Stream::new(dictionary! {}, text.as_bytes().to_vec())
}

/// Scans sequentially and in parallel, returning issue pages and failures
fn scan_both_ways(session: &Session) -> Vec<(Vec<usize>, Vec<(usize, String)>)> {
    [false, true]
        .into_iter()
        .map(|parallel| {
            let report = session
                .validate_content_with(&ScanOptions::default().with_parallel(parallel))
                .unwrap();
            let issue_pages = report.issues.iter().map(|issue| issue.page_number).collect();
            let failures = report
                .failures
                .iter()
                .map(|failure| (failure.page_number, failure.error.to_string()))
                .collect();
            (issue_pages, failures)
        })
        .collect()
}

#[test]
fn test_broken_page_does_not_stop_scan() {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let first = add_page(&mut doc, pages_id, unfiltered("q\nfoo\nQ"));
    let broken = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => Object::Reference((999, 0)),
    });
    let third = add_page(&mut doc, pages_id, unfiltered("q\nbar\nQ"));
    finish_document(&mut doc, pages_id, vec![first, Object::Reference(broken), third], dictionary! {});

    let session = Session::new(DocumentStore::from_document(doc).unwrap());
    for parallel in [false, true] {
        let report = session
            .validate_content_with(&ScanOptions::default().with_parallel(parallel))
            .unwrap();

        let found: Vec<_> = report
            .issues
            .iter()
            .map(|issue| (issue.page_number, issue.operator_name.as_str()))
            .collect();
        assert_eq!(found, vec![(1, "foo"), (3, "bar")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].page_number, 2);
        assert!(matches!(report.failures[0].error, Error::ObjectNotFound(_)));
    }

    assert!(matches!(session.content(1), Err(Error::ObjectNotFound(_))));
}

#[test]
fn test_repeated_kid_fails_only_that_page() {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let first = add_page(&mut doc, pages_id, unfiltered("q\nfoo\nQ"));
    let second = add_page(&mut doc, pages_id, unfiltered("q\nbar\nQ"));
    let kids = vec![first.clone(), second, first];
    finish_document(&mut doc, pages_id, kids, dictionary! {});

    let session = Session::new(DocumentStore::from_document(doc).unwrap());
    for report in scan_both_ways(&session) {
        assert_eq!(report.0, vec![1, 2]);
        assert_eq!(report.1.len(), 1);
        assert_eq!(report.1[0].0, 3);
    }

    let report = session.validate_content(None).unwrap();
    assert!(matches!(report.failures[0].error, Error::CyclicPageTree(_)));
    assert!(matches!(session.page(2), Err(Error::CyclicPageTree(_))));
}

#[test]
fn test_undecodable_stream_does_not_stop_scan() {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let first = add_page(&mut doc, pages_id, unfiltered("q\nfoo\nQ"));
    let undecodable = add_page(
        &mut doc,
        pages_id,
        Stream::new(dictionary! { "Filter" => "NoSuchDecode" }, b"q\nQ".to_vec()),
    );
    let third = add_page(&mut doc, pages_id, unfiltered("q\nbar\nQ"));
    finish_document(&mut doc, pages_id, vec![first, undecodable, third], dictionary! {});

    let session = Session::new(DocumentStore::from_document(doc).unwrap());
    for report in scan_both_ways(&session) {
        assert_eq!(report.0, vec![1, 3]);
        assert_eq!(report.1.len(), 1);
        assert_eq!(report.1[0].0, 2);
    }

    let report = session.validate_content(None).unwrap();
    assert!(matches!(report.failures[0].error, Error::Decode { .. }));

    let operators = session.list_operators(None).unwrap();
    assert_eq!(operators.operators, vec!["Q", "bar", "foo", "q"]);
    assert_eq!(operators.failures.len(), 1);
}

#[test]
fn test_nested_page_tree() {
    let mut doc = Document::with_version("1.5");
    let root_id = doc.new_object_id();
    let middle_id = doc.new_object_id();

    let leaf = |doc: &mut Document, parent: ObjectId, text: &str| {
        let content_id = doc.add_object(Stream::new(dictionary! {}, text.as_bytes().to_vec()));
        Object::Reference(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => parent,
            "Contents" => content_id,
        }))
    };
    let first = leaf(&mut doc, middle_id, "q");
    let second = leaf(&mut doc, middle_id, "BT\nET");
    let third = leaf(&mut doc, root_id, "Q");

    doc.objects.insert(middle_id, Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Parent" => root_id,
        "Kids" => vec![first, second],
        "Count" => 2,
        "Rotate" => 90,
    }));
    let kids = vec![Object::Reference(middle_id), third];
    finish_document(
        &mut doc,
        root_id,
        kids,
        dictionary! {
            "Count" => 3,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
        },
    );

    let session = round_trip(doc);
    assert_eq!(session.page_count().unwrap(), 3);
    assert_eq!(leaf_count(session.store()).unwrap(), 3);

    let ops: Vec<_> = (0..3)
        .map(|index| session.list_operators(Some(index)).unwrap().operators)
        .collect();
    assert_eq!(ops, vec![vec!["q"], vec!["BT", "ET"], vec!["Q"]]);

    let rotation = |index| session.page(index).unwrap().rotate.and_then(|r| r.as_i64().ok());
    assert_eq!(rotation(1), Some(90));
    assert_eq!(rotation(2), None);
    let media_box = session.get("Page.2.MediaBox").unwrap();
    assert_eq!(media_box.as_array().unwrap().len(), 4);
}

#[test]
fn test_compressed_content_stream() {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let text = "q\n1 0 0 1 72 720 cm\nBT\n/F1 12 Tf\n[(Hello)] TJ\nET\nQ\n".repeat(20);
    let mut stream = Stream::new(dictionary! {}, text.clone().into_bytes());
    stream.compress().unwrap();
    let content_id = doc.add_object(stream);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    finish_document(&mut doc, pages_id, vec![Object::Reference(page_id)], dictionary! {});

    let session = round_trip(doc);
    assert_eq!(session.content(0).unwrap(), text.into_bytes());
    assert!(session.validate_content(None).unwrap().is_clean());
    assert_eq!(
        session.list_operators(None).unwrap().operators,
        vec!["BT", "ET", "Q", "TJ", "Tf", "cm", "q"]
    );
}

#[test]
fn test_open_file_and_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("report.pdf");

    let mut doc = build_document(&["q\nQ", "BT\nET"]);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Lint Fixture"),
    });
    doc.trailer.set("Info", info_id);
    doc.save(&path).expect("Failed to write PDF");

    let session = Session::open(&path).unwrap();
    assert_eq!(session.page_count().unwrap(), 2);
    assert_eq!(session.get("Root.Pages.Count").unwrap().as_i64().unwrap(), 2);

    let metadata = extract_metadata(session.store()).unwrap();
    assert_eq!(metadata.page_count, 2);
    assert_eq!(metadata.reachable_pages, 2);
    assert_eq!(metadata.title.as_deref(), Some("Lint Fixture"));
    assert!(metadata.author.is_none());
}

#[test]
fn test_open_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.pdf");

    assert!(matches!(Session::open(&path), Err(Error::FileNotFound(_))));
}
