use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use sealdex::format::{read_doc_record, DataInput, SegmentInput};
use sealdex::keys::derive_key;
use sealdex::segment::{DocNo, SeekStatus, TermStats};
use sealdex::{
    CodecSettings, FieldInfo, FieldInfos, FieldsReader, FieldsWriter, IndexOptions, KeyScope,
    KeyStore, MasterKey, SealedSpan, StoredField, StoredFieldsCipher, StoredValue,
};

const MASTER: &[u8] = b"scenario master key";

fn setup_keys(settings: &CodecSettings) -> Arc<KeyStore> {
    let keys = KeyStore::from_settings(settings);
    keys.set_master_key(MasterKey::new(MASTER.to_vec()).unwrap())
        .unwrap();
    Arc::new(keys)
}

fn infos() -> Arc<FieldInfos> {
    Arc::new(
        FieldInfos::new()
            .with("manu", IndexOptions::DocsAndFreqs)
            .with("cat", IndexOptions::Docs),
    )
}

/// Write `manu` and `cat`, each term posting the given docs with freq 1
fn write_segment(
    path: &Path,
    keys: Arc<KeyStore>,
    settings: &CodecSettings,
    manu: &[(&str, Vec<u32>)],
    cat: &[(&str, Vec<u32>)],
) {
    let mut writer = FieldsWriter::create(path, keys, settings.clone()).unwrap();
    for (name, options, terms) in [
        ("manu", IndexOptions::DocsAndFreqs, manu),
        ("cat", IndexOptions::Docs, cat),
    ] {
        let mut field = writer.add_field(&FieldInfo::new(name, options)).unwrap();
        for (term, docs) in terms {
            field.start_term(term.as_bytes()).unwrap();
            for &doc in docs.iter() {
                field.start_doc(DocNo(doc), 1).unwrap();
            }
            field
                .finish_term(TermStats::new(docs.len() as u32, docs.len() as u64))
                .unwrap();
        }
        field.finish().unwrap();
    }
    writer.finish().unwrap();
}

fn open(path: &Path, keys: Arc<KeyStore>, settings: &CodecSettings) -> FieldsReader {
    FieldsReader::open(path, keys, infos(), settings.clone()).unwrap()
}

#[test]
fn test_acme_document_is_sealed_and_searchable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("acme.sealed");
    let settings = CodecSettings::new(["manu", "cat"]);
    let keys = setup_keys(&settings);
    assert!(keys.has_key(&KeyScope::field("manu")));

    write_segment(&path, keys.clone(), &settings, &[("acme", vec![0])], &[("tools", vec![0])]);

    // the term never appears in plaintext
    let bytes = std::fs::read(&path).unwrap();
    assert!(!bytes.windows(4).any(|w| w == b"acme"));

    let reader = open(&path, keys.clone(), &settings);
    let terms = reader.terms("manu").unwrap().unwrap();
    let meta = terms.get(b"acme").unwrap();
    assert_eq!(meta.doc_freq, 1);

    // decrypting the span by hand yields exactly one record for doc 0
    let key = keys.require(&KeyScope::field("manu")).unwrap();
    let input = SegmentInput::open(&path).unwrap();
    let mut span = SealedSpan::open_at(
        &input,
        meta.postings_offset,
        &key,
        settings.cipher_suite,
        reader.salt(),
    )
    .unwrap();
    let record = read_doc_record(&mut span, IndexOptions::DocsAndFreqs).unwrap();
    assert_eq!(record.doc, DocNo(0));
    assert_eq!(record.freq, 1);
    assert_eq!(span.remaining(), 0);

    // the stored value round-trips through the same key
    let stored = StoredFieldsCipher::new(keys.clone(), &settings);
    let sealed = stored
        .seal("manu", &StoredValue::Str("Acme".to_string()))
        .unwrap();
    assert_eq!(
        stored.open("manu", &sealed),
        StoredValue::Str("Acme".to_string())
    );

    keys.forget_all();
    assert!(!keys.has_key(&KeyScope::field("manu")));
    let reader = open(&path, keys, &settings);
    assert!(reader.terms("manu").unwrap().is_none());
    assert!(matches!(stored.open("manu", &sealed), StoredValue::Str(s) if s != "Acme"));
    // header statistics stay readable
    assert_eq!(reader.field_stats("manu").unwrap().doc_count, 1);
}

#[test]
fn test_ceiling_seek_over_sealed_terms() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fruit.sealed");
    let settings = CodecSettings::new(["manu", "cat"]);
    let keys = setup_keys(&settings);
    write_segment(
        &path,
        keys.clone(),
        &settings,
        &[("apple", vec![0]), ("banana", vec![1]), ("cherry", vec![2])],
        &[],
    );

    let reader = open(&path, keys, &settings);
    let terms = reader.terms("manu").unwrap().unwrap();

    match terms.seek_ceil(b"b").unwrap() {
        SeekStatus::NotFound(entry) => assert_eq!(entry.term, b"banana"),
        other => panic!("expected NotFound(banana), got {:?}", other),
    }
    assert!(terms.seek_ceil(b"banana").unwrap().is_found());
    assert_eq!(terms.seek_ceil(b"d").unwrap(), SeekStatus::End);

    let mut te = terms.iter();
    te.seek_ceil(b"b").unwrap();
    let mut cursor = te.postings(None).unwrap().unwrap();
    assert_eq!(cursor.next_doc().unwrap(), Some(DocNo(1)));
    assert_eq!(te.next_term().unwrap().unwrap().term, b"cherry");

    let empty = reader.terms("cat").unwrap().unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.seek_ceil(b"a").unwrap(), SeekStatus::End);
}

#[test]
fn test_same_master_key_reopens_segment() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("determinism.sealed");
    let settings = CodecSettings::new(["manu", "cat"]);
    write_segment(&path, setup_keys(&settings), &settings, &[("acme", vec![3, 7])], &[]);

    // a fresh process with the same master key derives the same field key
    let keys = setup_keys(&settings);
    let master = MasterKey::new(MASTER.to_vec()).unwrap();
    assert_eq!(
        keys.require(&KeyScope::field("manu")).unwrap(),
        derive_key(&master, b"manu").unwrap()
    );

    let reader = open(&path, keys, &settings);
    let terms = reader.terms("manu").unwrap().unwrap();
    let mut cursor = terms.postings_for(b"acme", None).unwrap().unwrap();
    assert_eq!(cursor.advance(DocNo(5)).unwrap(), Some(DocNo(7)));
}

#[test]
fn test_segments_under_one_key_do_not_share_keystream() {
    let tmp = TempDir::new().unwrap();
    let settings = CodecSettings::new(["manu", "cat"]);
    let keys = setup_keys(&settings);

    let mut segments = Vec::new();
    for (name, doc) in [("a.sealed", 0x1111_1111u32), ("b.sealed", 0x2222_2222)] {
        let path = tmp.path().join(name);
        write_segment(&path, keys.clone(), &settings, &[("acme", vec![doc])], &[]);
        let reader = open(&path, keys.clone(), &settings);
        let meta = reader.terms("manu").unwrap().unwrap().get(b"acme").unwrap();
        segments.push((std::fs::read(&path).unwrap(), *reader.salt(), meta.postings_offset));
    }
    let (a, salt_a, at) = &segments[0];
    let (b, salt_b, bt) = &segments[1];
    assert_ne!(salt_a, salt_b);
    assert_eq!(at, bt);

    // one doc record: u32 doc, u32 freq
    let start = *at as usize + 8;
    let plain_xor = [0x33u8, 0x33, 0x33, 0x33, 0, 0, 0, 0];
    let cipher_xor: Vec<u8> = a[start..start + 8]
        .iter()
        .zip(&b[start..start + 8])
        .map(|(x, y)| x ^ y)
        .collect();
    assert_ne!(cipher_xor, plain_xor);
}

#[test]
fn test_wrong_master_key_does_not_yield_postings() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("wrong.sealed");
    let settings = CodecSettings::new(["manu", "cat"]);
    write_segment(&path, setup_keys(&settings), &settings, &[("acme", vec![0])], &[]);

    let keys = KeyStore::new();
    keys.set_master_key(MasterKey::new(b"another key".to_vec()).unwrap())
        .unwrap();
    let reader = open(&path, Arc::new(keys), &settings);
    let err = reader.terms("manu").err().unwrap();
    assert!(err.is_fatal());
}

#[test]
fn test_missing_field_key_leaves_other_fields_readable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("partial.sealed");
    let settings = CodecSettings::new(["manu", "cat"]);
    write_segment(
        &path,
        setup_keys(&settings),
        &settings,
        &[("acme", vec![0])],
        &[("tools", vec![0, 1])],
    );

    // only the cat key is available
    let master = MasterKey::new(MASTER.to_vec()).unwrap();
    let keys = KeyStore::new();
    keys.add_key(&KeyScope::field("cat"), derive_key(&master, b"cat").unwrap());

    let reader = open(&path, Arc::new(keys), &settings);
    assert!(reader.terms("manu").unwrap().is_none());
    let cat = reader.terms("cat").unwrap().unwrap();
    let mut cursor = cat.postings_for(b"tools", None).unwrap().unwrap();
    assert_eq!(cursor.next_doc().unwrap(), Some(DocNo(0)));
    assert_eq!(cursor.next_doc().unwrap(), Some(DocNo(1)));
    assert_eq!(cursor.next_doc().unwrap(), None);
}

#[test]
fn test_writer_without_key_still_finishes_segment() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nokey.sealed");
    let settings = CodecSettings::new(["manu"]);
    let keys = Arc::new(KeyStore::new());

    let mut writer = FieldsWriter::create(&path, keys.clone(), settings.clone()).unwrap();
    let err = writer
        .add_field(&FieldInfo::new("manu", IndexOptions::DocsAndFreqs))
        .err()
        .unwrap();
    assert!(err.is_missing_key());
    assert!(!err.is_fatal());
    writer.finish().unwrap();

    let reader = open(&path, keys, &settings);
    assert!(reader.is_empty());
    assert!(reader.terms("manu").unwrap().is_none());
}

#[test]
fn test_key_log_records_derived_keys() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("keys.sealed");
    let log = tmp.path().join("keys.log");
    let settings = CodecSettings::new(["manu", "cat"]).with_key_log(&log);
    let keys = setup_keys(&settings);
    write_segment(&path, keys.clone(), &settings, &[("acme", vec![0])], &[]);

    let manu_key = keys.require(&KeyScope::field("manu")).unwrap();
    let content = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines[0].starts_with(':'));
    assert!(lines.contains(&format!("manu:{}", manu_key.to_hex()).as_str()));
    assert!(lines.iter().any(|l| l.starts_with("cat:")));
}

#[test]
fn test_stored_values_of_plain_fields_are_untouched() {
    let settings = CodecSettings::new(["manu"]);
    let stored = StoredFieldsCipher::new(setup_keys(&settings), &settings);
    let value = StoredValue::Double(19.95);
    assert_eq!(
        stored.seal("price", &value).unwrap(),
        StoredField::Plain(value.clone())
    );
}
