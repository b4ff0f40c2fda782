//! Disk store tests: persistence, sessions, locking and crash detection.

use basalt_common::{files, BasaltError, StoreConfig};
use basalt_data::{Context, DataClip, MemData, StoreState};
use tempfile::tempdir;

fn library(ctx: &mut Context) -> MemData {
    let mut b = ctx.builder("library");
    b.start_doc("library.xml").unwrap();
    b.start_elem("lib:library", &[("xml:lang", "en")], &[("lib", "urn:library")])
        .unwrap();
    for (i, title) in ["Dune", "Solaris", "Neuromancer"].iter().enumerate() {
        let year = (1961 + i * 11).to_string();
        b.start_elem("lib:book", &[("year", year.as_str())], &[])
            .unwrap();
        b.text(title).unwrap();
        b.end_elem().unwrap();
    }
    b.end_elem().unwrap();
    b.end_doc().unwrap();
    b.finish().unwrap()
}

#[test]
fn test_roundtrip_through_disk() {
    let tmp = tempdir().unwrap();
    let mut ctx = Context::new(StoreConfig::new(tmp.path()));
    let src = library(&mut ctx);
    let mut data = ctx.create_disk("library", &src).unwrap();
    assert!(ctx.exists("library"));
    data.close().unwrap();

    let data = ctx.open_disk("library").unwrap();
    assert_eq!(data.state(), StoreState::Open);
    assert_eq!(data.len(), src.len());
    for pre in 0..src.len() {
        assert_eq!(data.kind(pre).unwrap(), src.kind(pre).unwrap());
        assert_eq!(data.size(pre).unwrap(), src.size(pre).unwrap());
        assert_eq!(data.parent(pre).unwrap(), src.parent(pre).unwrap());
        assert_eq!(data.qname(pre).unwrap(), src.qname(pre).unwrap());
        assert_eq!(data.text(pre).unwrap(), src.text(pre).unwrap());
    }
    assert_eq!(
        data.namespaces(1).unwrap(),
        vec![(b"lib".to_vec(), b"urn:library".to_vec())]
    );
    assert_eq!(data.uri(2).unwrap(), b"http://www.w3.org/XML/1998/namespace");
    assert_eq!(data.text_int(4).unwrap(), Some(1961));
    assert_eq!(data.atom(1).unwrap(), b"DuneSolarisNeuromancer");
}

#[test]
fn test_long_texts_are_compressed_and_survive_updates() {
    let tmp = tempdir().unwrap();
    let config = StoreConfig::new(tmp.path()).compress_threshold(16);
    let mut ctx = Context::new(config);
    let long = "the quick brown fox ".repeat(100);

    let mut b = ctx.builder("texts");
    b.start_elem("doc", &[("summary", long.as_str())], &[]).unwrap();
    b.text(&long).unwrap();
    b.end_elem().unwrap();
    let src = b.finish().unwrap();

    let mut data = ctx.create_disk("texts", &src).unwrap();
    assert_eq!(data.text(2).unwrap(), long.as_bytes());
    assert_eq!(data.text_len(1).unwrap(), long.len());

    let longer = "jumps over the lazy dog ".repeat(300);
    data.start_update().unwrap();
    data.update_value(2, longer.as_bytes()).unwrap();
    data.update_value(1, b"short").unwrap();
    data.finish_update().unwrap();
    data.close().unwrap();

    let data = ctx.open_disk("texts").unwrap();
    assert_eq!(data.text(2).unwrap(), longer.as_bytes());
    assert_eq!(data.att_value(b"summary", 0).unwrap(), Some(b"short".to_vec()));
}

#[test]
fn test_update_session_is_exclusive() {
    let tmp = tempdir().unwrap();
    let mut ctx = Context::new(StoreConfig::new(tmp.path()));
    let src = library(&mut ctx);
    ctx.create_disk("library", &src).unwrap().close().unwrap();

    let mut first = ctx.open_disk("library").unwrap();
    let mut second = ctx.open_disk("library").unwrap();
    assert_ne!(first.store_id(), second.store_id());

    let err = first.start_update().err().unwrap();
    assert!(matches!(err, BasaltError::Pinned(_)));
    assert_eq!(first.state(), StoreState::Open);

    second.close().unwrap();
    first.start_update().unwrap();
    first.delete(3).unwrap();
    first.finish_update().unwrap();
    assert_eq!(first.state(), StoreState::Open);
    first.close().unwrap();

    let data = ctx.open_disk("library").unwrap();
    assert_eq!(data.len(), src.len() - 3);
}

#[test]
fn test_writer_blocks_readers_without_autoflush() {
    let tmp = tempdir().unwrap();
    let mut ctx = Context::new(StoreConfig::new(tmp.path()).autoflush(false));
    let src = library(&mut ctx);
    let mut writer = ctx.create_disk("library", &src).unwrap();
    writer.start_update().unwrap();

    let err = ctx.open_disk("library").err().unwrap();
    assert!(matches!(err, BasaltError::Pinned(_)));

    writer.finish_update().unwrap();
    writer.close().unwrap();
    assert!(ctx.open_disk("library").is_ok());
}

#[test]
fn test_interrupted_session_is_detected() {
    let tmp = tempdir().unwrap();
    let config = StoreConfig::new(tmp.path());
    let mut ctx = Context::new(config.clone());
    let src = library(&mut ctx);
    let mut data = ctx.create_disk("library", &src).unwrap();

    data.start_update().unwrap();
    let frag = library(&mut ctx);
    data.insert(data.len(), None, &DataClip::all(&frag).unwrap())
        .unwrap();
    drop(data);

    let marker = config.store_dir("library").join(files::UPDATE_MARKER);
    assert!(marker.exists());
    assert!(matches!(
        ctx.open_disk("library"),
        Err(BasaltError::Updating(_))
    ));

    ctx.drop_disk("library").unwrap();
    assert!(!ctx.exists("library"));
    assert!(matches!(
        ctx.drop_disk("library"),
        Err(BasaltError::StoreNotFound(_))
    ));
}

#[test]
fn test_namespaced_updates_persist() {
    let tmp = tempdir().unwrap();
    let mut ctx = Context::new(StoreConfig::new(tmp.path()));
    let src = library(&mut ctx);
    let mut data = ctx.create_disk("library", &src).unwrap();

    let mut b = ctx.builder("frag");
    b.start_elem("lib:book", &[("dc:title", "Ubik")], &[("lib", "urn:library"), ("dc", "urn:dc")])
        .unwrap();
    b.end_elem().unwrap();
    let frag = b.finish().unwrap();

    let end = 1 + data.size(1).unwrap();
    data.start_update().unwrap();
    data.insert(end, Some(1), &DataClip::all(&frag).unwrap())
        .unwrap();
    data.finish_update().unwrap();
    data.close().unwrap();

    let data = ctx.open_disk("library").unwrap();
    assert_eq!(data.uri(end).unwrap(), b"urn:library");
    assert_eq!(
        data.namespaces(end).unwrap(),
        vec![(b"dc".to_vec(), b"urn:dc".to_vec())]
    );
    assert_eq!(data.uri(end + 1).unwrap(), b"urn:dc");
    assert_eq!(data.nspaces().node_count(), 2);
    assert_eq!(data.meta().size, data.len());
}

#[test]
fn test_ids_survive_reopen() {
    let tmp = tempdir().unwrap();
    let mut ctx = Context::new(StoreConfig::new(tmp.path()).update_index(true));
    let src = library(&mut ctx);
    let mut data = ctx.create_disk("library", &src).unwrap();
    let last = data.len() - 1;
    let id = data.id(last).unwrap();

    data.start_update().unwrap();
    data.delete(3).unwrap();
    data.finish_update().unwrap();
    assert_eq!(data.pre(id).unwrap(), Some(last - 3));
    data.close().unwrap();

    let data = ctx.open_disk("library").unwrap();
    assert!(data.meta().update_index);
    assert_eq!(data.pre(id).unwrap(), Some(last - 3));
    assert!(data.meta().peek_id() > id);
}
