mod common;

use common::{MemoryFetcher, serve, sha256, sources};
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::io::Read;
use tokio::io::AsyncWriteExt;
use wiremock::MockServer;

use urlzip::zip::ArchiveReader;
use urlzip::{Assembler, AssemblyError, Compression, LocalFileFetcher};

#[tokio::test]
async fn test_http_sources_round_trip() {
    let server = MockServer::start().await;
    let bodies = [
        ("/a.txt", b"alpha".to_vec()),
        ("/dir/b.bin", vec![0xAB; 200_000]),
        ("/empty", Vec::new()),
    ];
    for (route, body) in &bodies {
        serve(&server, route, body.clone()).await;
    }
    let locations: Vec<String> = bodies
        .iter()
        .map(|(route, _)| format!("{}{}", server.uri(), route))
        .collect();
    let sources = sources(&locations);

    let assembler = Assembler::builder().build().unwrap();
    let mut out = Vec::new();
    assembler.write_to(&sources, &mut out).await.unwrap();

    let reader = ArchiveReader::new(&out);
    let entries = reader.entries().unwrap();
    assert_eq!(entries.len(), bodies.len());
    for ((source, (_, body)), entry) in sources.iter().zip(&bodies).zip(&entries) {
        assert_eq!(entry.name, assembler.entry_name(source));
        assert_eq!(sha256(&reader.read(entry).unwrap()), sha256(body));
    }

    // an independent reader sees the same archive
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(out)).unwrap();
    assert_eq!(archive.len(), bodies.len());
    for (i, (_, body)) in bodies.iter().enumerate() {
        let mut file = archive.by_index(i).unwrap();
        assert_eq!(file.name(), entries[i].name);
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        assert_eq!(&data, body);
    }
}

#[tokio::test]
async fn test_failing_fetch_leaves_valid_truncated_archive() {
    let server = MockServer::start().await;
    serve(&server, "/1", b"one".to_vec()).await;
    serve(&server, "/2", b"two".to_vec()).await;
    serve(&server, "/4", b"four".to_vec()).await;
    // "/3" is not mounted, so the server answers 404

    let locations: Vec<String> = (1..=4)
        .map(|i| format!("{}/{}", server.uri(), i))
        .collect();
    let assembler = Assembler::builder().build().unwrap();
    let mut out = Vec::new();
    let err = assembler
        .write_to(&sources(&locations), &mut out)
        .await
        .unwrap_err();

    assert!(matches!(err, AssemblyError::Fetch { .. }), "{err}");
    assert_eq!(err.location(), Some(locations[2].as_str()));

    let reader = ArchiveReader::new(&out);
    let entries = reader.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(reader.read(&entries[0]).unwrap(), b"one");
    assert_eq!(reader.read(&entries[1]).unwrap(), b"two");
}

#[tokio::test]
async fn test_duplicate_names_are_kept_as_separate_entries() {
    let fetcher = MemoryFetcher::new(&[("http://h/a", b"plain"), ("https://h/a", b"secure")]);
    let assembler = Assembler::builder().fetcher(fetcher).build().unwrap();

    let mut out = Vec::new();
    assembler
        .write_to(&sources(&["http://h/a", "https://h/a", "http://h/a"]), &mut out)
        .await
        .unwrap();

    let reader = ArchiveReader::new(&out);
    let entries = reader.entries().unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.name == "h-a"));
    let contents: Vec<_> = entries.iter().map(|e| reader.read(e).unwrap()).collect();
    assert_eq!(contents, [b"plain".to_vec(), b"secure".to_vec(), b"plain".to_vec()]);
}

#[tokio::test]
async fn test_local_corpus_round_trip_through_stream() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let pattern = hex::encode(Sha512::digest(b"test repeat"));
    let mut expected = Vec::new();
    let mut locations = Vec::new();
    for i in 1..=100 {
        let file = src.path().join(format!("repeat-{i}"));
        let content = pattern.repeat(i);
        std::fs::write(&file, &content).unwrap();
        expected.push(sha256(content.as_bytes()));
        locations.push(file.display().to_string());
    }
    let sources = sources(&locations);

    let assembler = Assembler::builder()
        .fetcher(LocalFileFetcher)
        .chunk_size(1000)
        .build()
        .unwrap();

    let zip_path = dst.path().join("file.zip");
    let mut reader = assembler.stream(sources.clone()).into_async_read();
    let mut file = tokio::fs::File::create(&zip_path).await.unwrap();
    tokio::io::copy(&mut reader, &mut file).await.unwrap();
    file.flush().await.unwrap();

    let bytes = std::fs::read(&zip_path).unwrap();
    let archive = ArchiveReader::new(&bytes);
    let by_name: HashMap<_, _> = archive
        .entries()
        .unwrap()
        .into_iter()
        .map(|entry| (entry.name.clone(), entry))
        .collect();
    assert_eq!(by_name.len(), 100);

    for (source, want) in sources.iter().zip(&expected) {
        let entry = &by_name[&assembler.entry_name(source)];
        assert_eq!(&sha256(&archive.read(entry).unwrap()), want, "{source}");
    }
}

#[tokio::test]
async fn test_stored_entries_are_byte_identical() {
    let body = b"not compressed at all".repeat(100);
    let fetcher = MemoryFetcher::new(&[("mem://s", body.as_slice())]);
    let assembler = Assembler::builder()
        .fetcher(fetcher)
        .compression(Compression::Stored)
        .build()
        .unwrap();

    let mut out = Vec::new();
    assembler
        .write_to(&sources(&["mem://s"]), &mut out)
        .await
        .unwrap();

    let entries = ArchiveReader::new(&out).entries().unwrap();
    assert_eq!(entries[0].compressed_size, body.len() as u64);
    assert!(out.windows(body.len()).any(|w| w == body.as_slice()));
}

#[tokio::test]
async fn test_panic_is_propagated_after_finalize_on_direct_call() {
    let assembler = Assembler::builder()
        .fetcher(MemoryFetcher::new(&[("mem://ok", b"fine")]))
        .build()
        .unwrap();

    let task = tokio::spawn(async move {
        let mut out = Vec::new();
        assembler
            .write_to(&sources(&["mem://ok", "mem://boom"]), &mut out)
            .await
    });

    let err = task.await.unwrap_err();
    assert!(err.is_panic());
}

#[tokio::test]
async fn test_default_facade() {
    let server = MockServer::start().await;
    serve(&server, "/x", b"via default".to_vec()).await;
    let location = format!("{}/x", server.uri());

    let mut out = Vec::new();
    urlzip::write_archive(&sources(&[&location]), &mut out)
        .await
        .unwrap();

    let reader = ArchiveReader::new(&out);
    let entries = reader.entries().unwrap();
    assert_eq!(reader.read(&entries[0]).unwrap(), b"via default");

    let stream = urlzip::stream_archive(sources(&[&location])).unwrap();
    let (streamed, err) = common::drain(stream).await;
    assert!(err.is_none());
    assert_eq!(streamed, out);
}
