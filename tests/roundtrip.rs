use std::collections::BTreeMap;
use std::io::{Seek, Write};
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use tempfile::TempDir;

use sealdex::format::{FieldStats, Position};
use sealdex::segment::{
    DeletedDocs, DocNo, FieldMetadata, PostingsSource, TermStats,
};
use sealdex::{
    CipherSuite, CodecSettings, FieldInfo, FieldInfos, FieldTerms, FieldsReader, FieldsWriter,
    IndexOptions, KeyStore, MasterKey,
};

/// term -> doc -> positions
type Corpus = BTreeMap<Vec<u8>, BTreeMap<u32, Vec<Position>>>;

/// term -> [(doc, freq, positions)]
type Decoded = BTreeMap<Vec<u8>, Vec<(u32, u32, Vec<Position>)>>;

fn keys() -> Arc<KeyStore> {
    let keys = KeyStore::new();
    keys.set_master_key(MasterKey::new(b"roundtrip master key".to_vec()).unwrap())
        .unwrap();
    Arc::new(keys)
}

fn write_field<W: Write + Seek>(
    writer: &mut FieldsWriter<W>,
    info: &FieldInfo,
    corpus: &Corpus,
) -> FieldStats {
    let options = info.index_options;
    let mut field = writer.add_field(info).unwrap();
    for (term, docs) in corpus {
        field.start_term(term).unwrap();
        let mut total_term_freq = 0u64;
        for (&doc, positions) in docs {
            let freq = if options.has_freqs() { positions.len() as u32 } else { 1 };
            field.start_doc(DocNo(doc), freq).unwrap();
            if options.has_positions() {
                for position in positions {
                    field.add_position(position).unwrap();
                }
            }
            field.finish_doc().unwrap();
            total_term_freq += freq as u64;
        }
        field
            .finish_term(TermStats::new(docs.len() as u32, total_term_freq))
            .unwrap();
    }
    field.finish().unwrap()
}

fn expected(options: IndexOptions, corpus: &Corpus) -> Decoded {
    corpus
        .iter()
        .map(|(term, docs)| {
            let records = docs
                .iter()
                .map(|(&doc, positions)| {
                    let freq = if options.has_freqs() { positions.len() as u32 } else { 1 };
                    let positions = if options.has_positions() {
                        positions.clone()
                    } else {
                        Vec::new()
                    };
                    (doc, freq, positions)
                })
                .collect();
            (term.clone(), records)
        })
        .collect()
}

fn decode(terms: &FieldTerms) -> Decoded {
    let options = terms.index_options();
    let mut decoded = Decoded::new();
    for entry in terms.iter() {
        let entry = entry.unwrap();
        let mut cursor = terms.postings(&entry, None).unwrap().unwrap();
        let mut records = Vec::new();
        while let Some(doc) = cursor.next_doc().unwrap() {
            let mut positions = Vec::new();
            if options.has_positions() {
                for _ in 0..cursor.freq() {
                    positions.push(cursor.next_position().unwrap());
                }
            }
            records.push((doc.as_u32(), cursor.freq(), positions));
        }
        assert_eq!(records.len() as u32, entry.meta.doc_freq);
        decoded.insert(entry.term, records);
    }
    decoded
}

fn sample_corpus(with_offsets: bool) -> Corpus {
    let mut corpus = Corpus::new();
    let words: [&[u8]; 4] = [b"acme", b"bolt", b"crane", b"drill"];
    for (t, word) in words.iter().enumerate() {
        let mut docs = BTreeMap::new();
        for doc in (t as u32..20).step_by(t + 1) {
            let positions = (0..(doc % 3 + 1))
                .map(|p| {
                    let pos = Position::new(p * 2).with_payload(vec![p as u8; p as usize]);
                    if with_offsets {
                        pos.with_offsets(p * 10, p * 10 + 4)
                    } else {
                        pos
                    }
                })
                .collect();
            docs.insert(doc, positions);
        }
        corpus.insert(word.to_vec(), docs);
    }
    corpus
}

fn field_infos() -> FieldInfos {
    FieldInfos::new()
        .with("manu", IndexOptions::DocsAndFreqsAndPositionsAndOffsets)
        .with("mg", IndexOptions::Docs)
        .with("manu_id_s", IndexOptions::DocsAndFreqs)
        .with("cat", IndexOptions::DocsAndFreqsAndPositions)
}

fn write_all(path: &std::path::Path, keys: Arc<KeyStore>, settings: &CodecSettings) {
    let infos = field_infos();
    let mut writer = FieldsWriter::create(path, keys, settings.clone()).unwrap();
    for name in ["cat", "manu", "manu_id_s", "mg"] {
        let info = infos.field_info(name).unwrap();
        let corpus = sample_corpus(info.index_options.has_offsets());
        let stats = write_field(&mut writer, &info, &corpus);
        assert_eq!(stats.term_count, 4);
    }
    writer.finish().unwrap();
}

#[test]
fn test_roundtrip_all_index_options() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("postings.sealed");
    let keys = keys();
    let settings = CodecSettings::new(["manu", "mg", "manu_id_s", "cat"]);
    write_all(&path, keys.clone(), &settings);

    let infos = field_infos();
    let reader = FieldsReader::open(&path, keys, Arc::new(field_infos()), settings).unwrap();
    assert_eq!(
        reader.fields().collect::<Vec<_>>(),
        vec!["cat", "manu", "manu_id_s", "mg"]
    );

    for name in ["cat", "manu", "manu_id_s", "mg"] {
        let options = infos.field_info(name).unwrap().index_options;
        let corpus = sample_corpus(options.has_offsets());
        let terms = reader.terms(name).unwrap().unwrap();
        assert_eq!(decode(&terms), expected(options, &corpus), "field {}", name);
    }
}

#[test]
fn test_roundtrip_with_ecb_and_small_chunks() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("postings.sealed");
    let keys = keys();
    let settings = CodecSettings::new(["manu", "mg", "manu_id_s", "cat"])
        .with_cipher_suite(CipherSuite::Aes128Ecb)
        .with_span_chunk_size(7);
    write_all(&path, keys.clone(), &settings);

    let reader = FieldsReader::open(&path, keys, Arc::new(field_infos()), settings).unwrap();
    let terms = reader.terms("manu").unwrap().unwrap();
    assert_eq!(
        decode(&terms),
        expected(IndexOptions::DocsAndFreqsAndPositionsAndOffsets, &sample_corpus(true))
    );
}

#[test]
fn test_live_docs_filter_deleted_documents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("postings.sealed");
    let keys = keys();
    let settings = CodecSettings::new(["manu", "mg", "manu_id_s", "cat"]);
    write_all(&path, keys.clone(), &settings);

    let reader = FieldsReader::open(&path, keys, Arc::new(field_infos()), settings).unwrap();
    let terms = reader.terms("cat").unwrap().unwrap();
    let deleted: DeletedDocs = (0..20).filter(|d| d % 2 == 1).map(DocNo).collect();
    let mut cursor = terms
        .postings_for(b"acme", Some(Arc::new(deleted)))
        .unwrap()
        .unwrap();

    let mut docs = Vec::new();
    while let Some(doc) = cursor.next_doc().unwrap() {
        // positions stay aligned after skipped documents
        let first = cursor.next_position().unwrap();
        assert_eq!(first.position, 0);
        docs.push(doc.as_u32());
    }
    assert_eq!(docs, (0..20).step_by(2).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_cursors_over_one_field() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("postings.sealed");
    let keys = keys();
    let settings = CodecSettings::new(["manu", "mg", "manu_id_s", "cat"]);
    write_all(&path, keys.clone(), &settings);

    let reader = FieldsReader::open(&path, keys, Arc::new(field_infos()), settings).unwrap();
    let terms = reader.terms("manu_id_s").unwrap().unwrap();
    let cursor = terms.postings_for(b"bolt", None).unwrap().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mut cursor = cursor.clone();
            thread::spawn(move || {
                let mut docs = Vec::new();
                while let Some(doc) = cursor.next_doc().unwrap() {
                    docs.push(doc.as_u32());
                }
                docs
            })
        })
        .collect();

    let expected: Vec<u32> = (1..20).step_by(2).collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

fn corpus_strategy() -> impl Strategy<Value = Corpus> {
    let positions = prop::collection::vec((0u32..1000, prop::collection::vec(any::<u8>(), 0..4)), 1..4);
    let docs = prop::collection::btree_map(0u32..200, positions, 1..8);
    prop::collection::btree_map(prop::collection::vec(any::<u8>(), 1..6), docs, 0..10).prop_map(
        |raw| {
            raw.into_iter()
                .map(|(term, docs)| {
                    let docs = docs
                        .into_iter()
                        .map(|(doc, mut positions)| {
                            positions.sort();
                            let positions = positions
                                .into_iter()
                                .map(|(p, payload)| Position::new(p).with_payload(payload))
                                .collect();
                            (doc, positions)
                        })
                        .collect();
                    (term, docs)
                })
                .collect()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_write_then_read_reproduces_postings(corpus in corpus_strategy()) {
        let keys = keys();
        let settings = CodecSettings::new(["body"]);
        let info = FieldInfo::new("body", IndexOptions::DocsAndFreqsAndPositions);

        let mut writer =
            FieldsWriter::new(std::io::Cursor::new(Vec::new()), keys.clone(), settings.clone()).unwrap();
        let stats = write_field(&mut writer, &info, &corpus);
        let bytes = writer.finish().unwrap().into_inner();
        prop_assert_eq!(stats.term_count as usize, corpus.len());

        let reader = FieldsReader::from_input(
            sealdex::format::SegmentInput::from_bytes(bytes),
            keys,
            Arc::new(FieldInfos::new().with("body", info.index_options)),
            settings.clone(),
            Arc::new(sealdex::EncryptedFieldSet::from_settings(&settings)),
        )
        .unwrap();
        let terms = reader.terms("body").unwrap().unwrap();
        prop_assert_eq!(decode(&terms), expected(info.index_options, &corpus));
    }
}
