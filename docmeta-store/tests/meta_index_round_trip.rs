use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use docmeta_store::{
    BuilderOptions, IndexDirectory, MetaIndex, MetaIndexBuilder, MetaIndexError, Structure,
    StructureKind,
};

fn options() -> BuilderOptions {
    BuilderOptions {
        block_rows: 2,
        reverse_build_threads: 2,
        compressed_keys: Vec::new(),
        skip_sorted_reverse_maps: false,
    }
}

fn create_meta_index(
    index: &Arc<IndexDirectory>,
    name: &str,
    keys: &[&str],
    reverse_keys: &[&str],
    data: &[&[&str]],
    options: BuilderOptions,
) -> MetaIndex {
    let mut builder =
        MetaIndexBuilder::with_options(index.clone(), name, keys, reverse_keys, options)
            .expect("builder");
    for (i, tuple) in data.iter().enumerate() {
        let id = builder.write_document_entry(*tuple).expect("write entry");
        assert_eq!(id as usize, i);
    }
    builder.close().expect("close builder");

    assert!(index.has_structure(name));
    assert!(index.has_input_stream(name));
    index.open_meta_index(name).expect("open meta index")
}

/// Checks random access and the input stream for every key of `data`.
fn check_structure(name: &str, keys: &[&str], reverse_keys: &[&str], data: &[&[&str]]) {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let meta = create_meta_index(&index, name, keys, reverse_keys, data, options());
    let reverse: HashSet<&str> = reverse_keys.iter().copied().collect();

    assert_eq!(meta.size().expect("size"), data.len());
    for (offset, key) in keys.iter().enumerate() {
        for (id, tuple) in data.iter().enumerate() {
            let id = id as u32;
            assert_eq!(meta.get_item(key, id).expect("get item"), tuple[offset]);
            assert_eq!(meta.get_all_items(id).expect("get all items")[offset], tuple[offset]);
            if reverse.contains(key) {
                assert_eq!(
                    meta.get_document(key, tuple[offset]).expect("lookup"),
                    Some(id)
                );
            }
        }
    }

    // A reader over the same properties, reloaded from disk.
    let reopened = IndexDirectory::open(dir.path(), "data").expect("reopen index");
    let stream = reopened.open_input_stream(name).expect("input stream");
    assert_eq!(stream.len(), data.len());
    let mut seen = 0;
    for (tuple, expected) in stream.zip(data) {
        let tuple = tuple.expect("stream tuple");
        assert_eq!(tuple, expected.to_vec());
        seen += 1;
    }
    assert_eq!(seen, data.len(), "not every document was streamed");
}

#[test]
fn reverse_key_subset_configuration_mismatch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let result = MetaIndexBuilder::new(index.clone(), "meta", &["docno"], &["url"]);
    assert!(matches!(result, Err(MetaIndexError::Configuration(_))));
    assert!(!index.has_structure("meta"));
    assert!(!index.artifact_path("meta").exists());
}

#[test]
fn single_key_single_char_value() {
    check_structure("meta", &["docno"], &[], &[&["a"]]);
}

#[test]
fn single_key_many_char_values() {
    check_structure("meta", &["docno"], &[], &[&["a"], &["b"], &["c"], &["d"]]);
}

#[test]
fn single_key_many_utf_char_values() {
    check_structure(
        "meta",
        &["docno"],
        &["docno"],
        &[&["\u{0400}"], &["\u{0460}"], &["\u{93E0}"]],
    );
}

#[test]
fn single_key_many_string_values() {
    check_structure("meta", &["docno"], &[], &[&["aa"], &["ba"], &["ca"], &["da"]]);
}

#[test]
fn single_key_many_utf_string_values() {
    check_structure("meta", &["docno"], &["docno"], &[&["aa"], &["\u{0400}\u{93E0}"]]);
}

#[test]
fn many_keys_many_values() {
    check_structure(
        "meta",
        &["docno", "words"],
        &["docno", "words"],
        &[
            &["a", "The lazy cat"],
            &["b", "jumped over the"],
            &["c", "sleeping dog"],
            &["d", "today"],
        ],
    );
}

#[test]
fn different_structure_name() {
    check_structure(
        "differentName",
        &["docno"],
        &[],
        &[&["a"], &["b"], &["c"], &["d"]],
    );
}

#[test]
fn sorted_key_served_by_binary_search() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let mut options = options();
    options.skip_sorted_reverse_maps = true;
    let meta = create_meta_index(
        &index,
        "meta",
        &["docno", "words"],
        &["docno"],
        &[
            &["a", "The lazy cat"],
            &["b", "Jumped over the"],
            &["c", "sleeping dog"],
            &["d", "today"],
        ],
        options,
    );

    assert_eq!(meta.reverse_strategy("docno").expect("strategy"), Some("binary-search"));
    for id in 0..meta.size().expect("size") as u32 {
        let docno = meta.get_item("docno", id).expect("docno");
        assert_eq!(meta.get_document("docno", &docno).expect("lookup"), Some(id));
    }
    assert!(matches!(
        meta.get_document("words", "today"),
        Err(MetaIndexError::UnsupportedOperation(_))
    ));
}

#[test]
fn binary_search_misses_values_around_the_column() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let mut options = options();
    options.skip_sorted_reverse_maps = true;
    let docnos: &[&[&str]] = &[&["doc1"], &["doc20"], &["doc3"], &["doc4"]];
    let meta = create_meta_index(&index, "meta", &["docno"], &["docno"], docnos, options);

    for (id, docno) in docnos.iter().enumerate() {
        assert_eq!(
            meta.get_document("docno", docno[0]).expect("lookup"),
            Some(id as u32)
        );
    }
    for absent in ["doc", "doc0", "doc10", "doc5"] {
        assert_eq!(meta.get_document("docno", absent).expect("lookup"), None);
    }
}

#[test]
fn reverse_value_sorted_uses_hash_map() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let meta = create_meta_index(
        &index,
        "meta",
        &["docno", "url"],
        &["url"],
        &[
            &["a", "url1"],
            &["b", "url2"],
            &["c", "url3"],
            &["d", "url4"],
        ],
        options(),
    );

    assert_eq!(meta.reverse_strategy("url").expect("strategy"), Some("hash"));
    for i in 0..4u32 {
        assert_eq!(
            meta.get_document("url", &format!("url{}", i + 1)).expect("lookup"),
            Some(i)
        );
    }
    assert_eq!(meta.get_document("url", "urlX").expect("lookup"), None);
}

#[test]
fn duplicate_values_resolve_to_the_last_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let meta = create_meta_index(
        &index,
        "meta",
        &["docno", "host"],
        &["host"],
        &[
            &["a", "example.org"],
            &["b", "example.com"],
            &["c", "example.org"],
        ],
        options(),
    );
    assert_eq!(meta.get_document("host", "example.org").expect("lookup"), Some(2));
    assert_eq!(meta.get_document("host", "example.com").expect("lookup"), Some(1));
}

#[test]
fn sorted_values_without_reverse_keys_are_unsupported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let meta = create_meta_index(
        &index,
        "meta",
        &["docno"],
        &[],
        &[&["a"], &["b"], &["c"], &["d"]],
        options(),
    );
    assert_eq!(meta.size().expect("size"), 4);
    assert_eq!(meta.get_item("docno", 2).expect("get item"), "c");
    assert!(matches!(
        meta.get_document("docno", "c"),
        Err(MetaIndexError::UnsupportedOperation(_))
    ));
}

#[test]
fn compressed_keys_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let mut options = options();
    options.compressed_keys = vec!["body".to_string()];
    let body = "lorem ipsum ".repeat(64);
    let meta = create_meta_index(
        &index,
        "meta",
        &["docno", "body"],
        &["body"],
        &[&["a", body.as_str()], &["b", "\u{0400}\u{93E0}"], &["c", ""]],
        options,
    );

    assert_eq!(meta.get_item("body", 0).expect("body"), body);
    assert_eq!(meta.get_item("body", 1).expect("body"), "\u{0400}\u{93E0}");
    assert_eq!(meta.get_item("body", 2).expect("body"), "");
    assert_eq!(meta.get_document("body", "").expect("lookup"), Some(2));
    assert_eq!(
        index.property("index.meta.key-compress").as_deref(),
        Some("false,true")
    );
}

#[test]
fn sparse_map_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let mut builder =
        MetaIndexBuilder::with_options(index.clone(), "meta", &["docno", "url", "title"], &["docno"], options())
            .expect("builder");
    builder
        .write_document_entry_map(&HashMap::from([
            ("docno".to_string(), "d1".to_string()),
            ("title".to_string(), "First".to_string()),
        ]))
        .expect("write map entry");
    builder
        .write_document_entry_map(&HashMap::from([("docno".to_string(), "d2".to_string())]))
        .expect("write map entry");
    builder.close().expect("close");

    let meta = index.open_meta_index("meta").expect("open");
    assert_eq!(meta.get_all_items(0).expect("items"), vec!["d1", "", "First"]);
    assert_eq!(meta.get_all_items(1).expect("items"), vec!["d2", "", ""]);
    assert_eq!(meta.get_document("docno", "d2").expect("lookup"), Some(1));
}

#[test]
fn value_sorted_property_tracks_each_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    create_meta_index(
        &index,
        "meta",
        &["docno", "words"],
        &[],
        &[&["a", "The lazy cat"], &["b", "Jumped over the"]],
        options(),
    );
    assert_eq!(
        index.property("index.meta.value-sorted").as_deref(),
        Some("true,false")
    );
    assert_eq!(index.property("index.meta.key-names").as_deref(), Some("docno,words"));
}

#[test]
fn default_structure_name_is_meta() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let mut builder =
        MetaIndexBuilder::new_default(index.clone(), &["docno"], &["docno"]).expect("builder");
    builder.write_document_entry(&["x"]).expect("write");
    builder.close().expect("close");

    assert_eq!(index.structure_kind("meta").expect("kind"), StructureKind::MetaIndex);
    assert_eq!(
        index.structure_kind("meta-inputstream").expect("kind"),
        StructureKind::MetaIndexInputStream
    );
    match index.open_structure("meta-inputstream").expect("open structure") {
        Structure::InputStream(stream) => assert_eq!(stream.size(), 1),
        Structure::MetaIndex(_) => panic!("expected an input stream"),
    }
}

#[test]
fn unregistered_structures_are_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    assert!(matches!(
        index.open_meta_index("meta"),
        Err(MetaIndexError::StructureNotFound(_))
    ));
    assert!(matches!(
        index.open_input_stream("meta"),
        Err(MetaIndexError::StructureNotFound(_))
    ));
}

#[test]
fn readers_share_across_threads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let data: Vec<[String; 2]> = (0..100)
        .map(|i| [format!("doc{i:03}"), format!("http://example.org/{i}")])
        .collect();
    let mut builder =
        MetaIndexBuilder::with_options(index.clone(), "meta", &["docno", "url"], &["docno", "url"], options())
            .expect("builder");
    for tuple in &data {
        builder.write_document_entry(tuple).expect("write");
    }
    builder.close().expect("close");

    let meta = Arc::new(index.open_meta_index("meta").expect("open"));
    std::thread::scope(|scope| {
        for t in 0..4u32 {
            let meta = meta.clone();
            let data = &data;
            scope.spawn(move || {
                for id in (t..100).step_by(4) {
                    let tuple = &data[id as usize];
                    assert_eq!(meta.get_item("url", id).expect("url"), tuple[1]);
                    assert_eq!(meta.get_document("docno", &tuple[0]).expect("lookup"), Some(id));
                }
            });
        }
    });
}

#[test]
fn reader_close_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let mut meta = create_meta_index(&index, "meta", &["docno"], &[], &[&["a"]], options());
    meta.close();
    assert!(matches!(meta.get_keys(), Err(MetaIndexError::ReaderClosed(_))));
    assert!(matches!(
        meta.get_items_matrix(&["docno"], &[0]),
        Err(MetaIndexError::ReaderClosed(_))
    ));
}

#[test]
fn repeated_reverse_keys_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    let result = MetaIndexBuilder::new(index.clone(), "meta", &["docno", "url"], &["docno", "docno"]);
    assert!(matches!(result, Err(MetaIndexError::Configuration(_))));
    assert!(!index.has_structure("meta"));
    assert!(index.property("index.meta.reverse-key-names").is_none());
}

#[test]
fn padded_key_names_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    for keys in [["docno", " url"], ["docno", "url "]] {
        let result = MetaIndexBuilder::new(index.clone(), "meta", &keys, &["docno"]);
        assert!(
            matches!(result, Err(MetaIndexError::Configuration(_))),
            "{keys:?} should be rejected"
        );
    }
    assert!(!index.has_structure("meta"));
    assert!(!index.artifact_path("meta").exists());
}

#[test]
fn rebuilding_a_structure_replaces_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    create_meta_index(&index, "meta", &["docno"], &["docno"], &[&["a"], &["b"]], options());
    let meta = create_meta_index(
        &index,
        "meta",
        &["docno", "url"],
        &["url"],
        &[&["x", "u1"], &["y", "u2"], &["z", "u3"]],
        options(),
    );
    assert_eq!(meta.size().expect("size"), 3);
    assert_eq!(meta.get_document("url", "u3").expect("lookup"), Some(2));
    assert_eq!(
        meta.get_reverse_keys().expect("reverse keys"),
        vec!["url".to_string()]
    );

    let reopened = IndexDirectory::open(dir.path(), "data").expect("reopen index");
    let meta = reopened.open_meta_index("meta").expect("open meta index");
    assert_eq!(meta.get_keys().expect("keys"), vec!["docno", "url"]);
    assert_eq!(meta.get_item("docno", 1).expect("get item"), "y");
}

#[test]
fn failed_rebuild_leaves_the_previous_structure_readable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = IndexDirectory::create(dir.path(), "data").expect("index");
    create_meta_index(&index, "meta", &["docno"], &["docno"], &[&["a"], &["b"]], options());

    let mut blocked = index.properties_path().into_os_string();
    blocked.push(".tmp");
    std::fs::create_dir(&blocked).expect("block property staging");

    let mut builder =
        MetaIndexBuilder::with_options(index.clone(), "meta", &["docno"], &["docno"], options())
            .expect("builder");
    builder.write_document_entry(&["z"]).expect("write entry");
    assert!(builder.close().is_err());
    std::fs::remove_dir(&blocked).expect("unblock property staging");

    let reopened = IndexDirectory::open(dir.path(), "data").expect("reopen index");
    assert!(reopened.has_structure("meta"));
    let meta = reopened.open_meta_index("meta").expect("open meta index");
    assert_eq!(meta.size().expect("size"), 2);
    assert_eq!(meta.get_document("docno", "b").expect("lookup"), Some(1));
    assert_eq!(meta.get_document("docno", "z").expect("lookup"), None);
}
