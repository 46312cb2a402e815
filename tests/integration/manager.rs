//! Download manager behavior against fake collaborators

use crate::support::{config, sha256_hex, FakeDownloader, FakeExtractor, Gate};
use fetchcache::cache::{CacheIndex, DownloadRecord};
use fetchcache::checksums::UrlInfo;
use fetchcache::{
    Archive, ChecksumRegistry, DownloadManager, ExtractMethod, FetchError, ManagerConfig,
    Resource,
};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

const ZIP_URL: &str = "https://example.com/data.zip";
const MIRROR_URL: &str = "https://mirror.example.org/copy.zip";
const PLAIN_URL: &str = "https://example.com/readme.txt";

fn build(
    config: ManagerConfig,
    downloader: &FakeDownloader,
    extractor: &FakeExtractor,
    registry: ChecksumRegistry,
) -> DownloadManager {
    DownloadManager::builder(config)
        .downloader(downloader.clone())
        .extractor(extractor.clone())
        .registry(registry)
        .build()
}

fn recording(temp: &TempDir, downloader: &FakeDownloader, extractor: &FakeExtractor) -> DownloadManager {
    build(config(temp), downloader, extractor, ChecksumRegistry::recording())
}

fn verifying(entries: &[(&str, &[u8])]) -> ChecksumRegistry {
    ChecksumRegistry::new(
        entries
            .iter()
            .map(|(url, body)| {
                (
                    url.to_string(),
                    UrlInfo::new(body.len() as u64, sha256_hex(body)),
                )
            })
            .collect(),
    )
}

async fn wait_idle(manager: &DownloadManager) {
    for _ in 0..200 {
        if manager.in_flight() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("operations still running");
}

#[tokio::test]
async fn repeated_download_returns_same_path_without_refetch() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"hello");
    let manager = recording(&temp, &downloader, &FakeExtractor::new());

    let first = manager.download(PLAIN_URL).await.unwrap();
    let second = manager.download(PLAIN_URL).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(downloader.calls(PLAIN_URL), 1);
}

#[tokio::test]
async fn cache_survives_a_new_manager() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"hello");
    let extractor = FakeExtractor::new();

    let first = recording(&temp, &downloader, &extractor)
        .download(PLAIN_URL)
        .await
        .unwrap();
    let again = recording(&temp, &downloader, &extractor);
    let second = again.download(PLAIN_URL).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(downloader.calls(PLAIN_URL), 1);
    // checksum comes from the metadata record of the published file
    assert_eq!(
        again.recorded_checksums().get(PLAIN_URL),
        Some(&sha256_hex(b"hello"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_download_and_extraction() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new()
        .serve(ZIP_URL, b"zip bytes")
        .delay(ZIP_URL, Duration::from_millis(100));
    let extractor = FakeExtractor::with_delay(Duration::from_millis(50));
    let manager = recording(&temp, &downloader, &extractor);

    let requests = (0..10).map(|_| {
        let manager = manager.clone();
        tokio::spawn(async move { manager.download_and_extract(ZIP_URL).await })
    });
    let paths: Vec<PathBuf> = join_all(requests)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(paths.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(downloader.calls(ZIP_URL), 1);
    assert_eq!(extractor.calls(), 1);
    assert_eq!(manager.in_flight(), 0);
}

#[tokio::test]
async fn checksum_mismatch_publishes_nothing() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"tampered");
    let registry = verifying(&[(PLAIN_URL, &b"original"[..])]);
    let manager = build(config(&temp), &downloader, &FakeExtractor::new(), registry);

    let err = manager.download(PLAIN_URL).await.unwrap_err();

    match err {
        FetchError::ChecksumMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, Some(sha256_hex(b"original")));
            assert_eq!(actual, sha256_hex(b"tampered"));
        }
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
    assert!(!manager.index().download_path(PLAIN_URL).exists());
}

#[tokio::test]
async fn verifying_registry_accepts_matching_download() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"original");
    let registry = verifying(&[(PLAIN_URL, &b"original"[..])]);
    let manager = build(config(&temp), &downloader, &FakeExtractor::new(), registry);

    let path = manager.download(PLAIN_URL).await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"original");
}

#[tokio::test]
async fn unknown_url_in_verifying_mode_is_rejected() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"data");
    let registry = verifying(&[("https://example.com/other", &b"x"[..])]);
    let manager = build(config(&temp), &downloader, &FakeExtractor::new(), registry);

    let err = manager.download(PLAIN_URL).await.unwrap_err();
    assert!(matches!(
        err,
        FetchError::ChecksumMismatch { expected: None, .. }
    ));
}

#[tokio::test]
async fn unknown_url_accepted_when_unpinned_allowed() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"data");
    let registry = verifying(&[("https://example.com/other", &b"x"[..])]).with_allow_unpinned(true);
    let manager = build(config(&temp), &downloader, &FakeExtractor::new(), registry);

    manager.download(PLAIN_URL).await.unwrap();
    assert_eq!(
        manager.recorded_checksums().get(PLAIN_URL),
        Some(&sha256_hex(b"data"))
    );
}

#[tokio::test]
async fn recording_mode_records_checksums_and_sizes() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new()
        .serve(PLAIN_URL, b"hello")
        .serve(ZIP_URL, b"zipped!");
    let manager = recording(&temp, &downloader, &FakeExtractor::new());

    manager.download_all(vec![PLAIN_URL, ZIP_URL]).await.unwrap();

    let checksums = manager.recorded_checksums();
    assert_eq!(checksums.get(PLAIN_URL), Some(&sha256_hex(b"hello")));
    assert_eq!(checksums.get(ZIP_URL), Some(&sha256_hex(b"zipped!")));
    let sizes = manager.download_sizes();
    assert_eq!(sizes.get(PLAIN_URL), Some(&5));
    assert_eq!(sizes.get(ZIP_URL), Some(&7));
}

#[tokio::test]
async fn pinned_checksum_enforced_in_recording_mode() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"hello");
    let manager = recording(&temp, &downloader, &FakeExtractor::new());

    let resource = Resource::new(PLAIN_URL).with_checksum(sha256_hex(b"something else"));
    let err = manager.download(resource).await.unwrap_err();

    assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
    assert!(manager.recorded_checksums().is_empty());
}

#[tokio::test]
async fn identical_bytes_from_two_urls_extract_once() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new()
        .serve(ZIP_URL, b"same archive")
        .serve(MIRROR_URL, b"same archive");
    let extractor = FakeExtractor::new();
    let manager = recording(&temp, &downloader, &extractor);

    let first = manager.download_and_extract(ZIP_URL).await.unwrap();
    let second = manager.download_and_extract(MIRROR_URL).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(downloader.total_calls(), 2);
    assert_eq!(extractor.calls(), 1);
    assert_eq!(
        first,
        manager
            .index()
            .extraction_path(ExtractMethod::Zip, &sha256_hex(b"same archive"))
    );
}

#[tokio::test]
async fn no_extraction_returns_download_path() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"plain text");
    let extractor = FakeExtractor::new();
    let manager = recording(&temp, &downloader, &extractor);

    let path = manager.download_and_extract(PLAIN_URL).await.unwrap();

    assert_eq!(path, manager.index().download_path(PLAIN_URL));
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn failing_batch_item_does_not_cancel_siblings() {
    let temp = TempDir::new().unwrap();
    let urls = [
        "https://example.com/one.zip",
        "https://example.com/two.zip",
        "https://example.com/three.zip",
    ];
    let downloader = FakeDownloader::new()
        .serve(urls[0], b"one")
        .delay(urls[0], Duration::from_millis(100))
        .fail(urls[1], 1)
        .serve(urls[2], b"three")
        .delay(urls[2], Duration::from_millis(100));
    let extractor = FakeExtractor::new();
    let manager = recording(&temp, &downloader, &extractor);

    let err = manager
        .download_and_extract_all(urls.to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TransferFailure { .. }));

    wait_idle(&manager).await;
    // siblings finished on their own and left complete entries
    for (url, body) in [(urls[0], &b"one"[..]), (urls[2], &b"three"[..])] {
        let extracted = manager
            .index()
            .extraction_path(ExtractMethod::Zip, &sha256_hex(body));
        for _ in 0..200 {
            if extracted.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(std::fs::read(manager.index().download_path(url)).unwrap(), body);
        assert_eq!(std::fs::read(extracted.join("payload")).unwrap(), body);
    }
    assert!(!manager.index().download_path(urls[1]).exists());
}

#[tokio::test]
async fn retry_after_failure_starts_fresh() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new()
        .serve(PLAIN_URL, b"eventually")
        .fail(PLAIN_URL, 1);
    let manager = recording(&temp, &downloader, &FakeExtractor::new());

    let err = manager.download(PLAIN_URL).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(manager.in_flight(), 0);

    let path = manager.download(PLAIN_URL).await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"eventually");
    assert_eq!(downloader.calls(PLAIN_URL), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_path_absent_until_published() {
    let temp = TempDir::new().unwrap();
    let gate = Gate::default();
    let downloader = FakeDownloader::new()
        .serve(PLAIN_URL, b"slow body")
        .gated(gate.clone());
    let manager = recording(&temp, &downloader, &FakeExtractor::new());
    let final_path = manager.index().download_path(PLAIN_URL);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.download(PLAIN_URL).await })
    };

    gate.entered.notified().await;
    assert!(!final_path.exists());
    assert_eq!(manager.in_flight(), 1);

    gate.release.notify_one();
    let path = pending.await.unwrap().unwrap();
    assert_eq!(path, final_path);
    assert_eq!(std::fs::read(&path).unwrap(), b"slow body");

    // only the published file and its record remain
    let names: Vec<String> = std::fs::read_dir(temp.path().join("dl"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|name| name.ends_with(".INFO")));
}

#[tokio::test]
async fn keyed_batch_keeps_its_keys() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new()
        .serve(ZIP_URL, b"train")
        .serve(PLAIN_URL, b"test");
    let manager = recording(&temp, &downloader, &FakeExtractor::new());

    let batch = BTreeMap::from([
        ("train", Resource::new(ZIP_URL).with_name("train")),
        ("test", Resource::new(PLAIN_URL)),
    ]);
    let paths = manager.download_and_extract_all(batch).await.unwrap();

    assert_eq!(paths.len(), 2);
    assert_eq!(paths["test"], manager.index().download_path(PLAIN_URL));
    assert_eq!(
        paths["train"],
        manager
            .index()
            .extraction_path(ExtractMethod::Zip, &sha256_hex(b"train"))
    );

    let hashed = HashMap::from([(1u8, PLAIN_URL)]);
    let downloaded = manager.download_all(hashed).await.unwrap();
    assert_eq!(downloaded[&1], manager.index().download_path(PLAIN_URL));
}

#[tokio::test]
async fn unsupported_method_skips_extractor() {
    let temp = TempDir::new().unwrap();
    let url = "https://example.com/data.bz2";
    let downloader = FakeDownloader::new().serve(url, b"BZh91AY");
    let extractor = FakeExtractor::new();
    let manager = recording(&temp, &downloader, &extractor);

    let err = manager.download_and_extract(url).await.unwrap_err();

    assert!(matches!(
        err,
        FetchError::UnsupportedExtractionMethod(ExtractMethod::Bzip2)
    ));
    assert_eq!(extractor.calls(), 0);
    // the download itself is still published
    assert!(manager.index().download_path(url).exists());
}

#[tokio::test]
async fn stale_cached_file_is_downloaded_again() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"fresh");
    let registry = verifying(&[(PLAIN_URL, &b"fresh"[..])]);
    let manager = build(config(&temp), &downloader, &FakeExtractor::new(), registry);

    let path = manager.index().download_path(PLAIN_URL);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"stale").unwrap();

    let published = manager.download(PLAIN_URL).await.unwrap();

    assert_eq!(published, path);
    assert_eq!(std::fs::read(&path).unwrap(), b"fresh");
    assert_eq!(downloader.calls(PLAIN_URL), 1);
}

#[tokio::test]
async fn force_download_refetches() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"again");
    let mut forced = config(&temp);
    forced.force_download = true;
    let manager = build(forced, &downloader, &FakeExtractor::new(), ChecksumRegistry::recording());

    manager.download(PLAIN_URL).await.unwrap();
    manager.download(PLAIN_URL).await.unwrap();

    assert_eq!(downloader.calls(PLAIN_URL), 2);
}

#[tokio::test]
async fn local_archives_share_content_addressed_extraction() {
    let temp = TempDir::new().unwrap();
    let extractor = FakeExtractor::new();
    let manager = recording(&temp, &FakeDownloader::new(), &extractor);

    let a = temp.path().join("a.zip");
    let b = temp.path().join("b.zip");
    std::fs::write(&a, b"same").unwrap();
    std::fs::write(&b, b"same").unwrap();

    let paths = manager
        .extract_all(vec![Archive::new(&a), Archive::new(&b)])
        .await
        .unwrap();

    assert_eq!(paths[0], paths[1]);
    assert_eq!(extractor.calls(), 1);
}

#[tokio::test]
async fn recorded_checksums_written_as_tsv() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"hello");
    let manager = recording(&temp, &downloader, &FakeExtractor::new());
    manager.download(PLAIN_URL).await.unwrap();

    let file = temp.path().join("checksums.tsv");
    let written = manager.registry().write_recorded(&file).await.unwrap();
    assert_eq!(written, 1);

    let reloaded = ChecksumRegistry::load(&file).await.unwrap();
    assert_eq!(
        reloaded.lookup(PLAIN_URL),
        Some(&UrlInfo::new(5, sha256_hex(b"hello")))
    );
}

#[tokio::test]
async fn attached_caller_pin_is_still_checked() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new()
        .serve(ZIP_URL, b"archive")
        .delay(ZIP_URL, Duration::from_millis(100));
    let extractor = FakeExtractor::new();
    let manager = recording(&temp, &downloader, &extractor);
    let wrong = "0".repeat(64);

    let batch = vec![
        Resource::new(ZIP_URL),
        Resource::new(ZIP_URL).with_checksum(wrong.clone()),
    ];
    let err = manager.download_all(batch.clone()).await.unwrap_err();
    match err {
        FetchError::ChecksumMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, Some(wrong.clone()));
            assert_eq!(actual, sha256_hex(b"archive"));
        }
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
    // the unpinned caller still got the one shared download
    assert_eq!(downloader.calls(ZIP_URL), 1);
    assert!(manager.index().download_path(ZIP_URL).exists());

    let err = manager.download_and_extract_all(batch).await.unwrap_err();
    assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
    assert!(manager.download(ZIP_URL).await.is_ok());
}

#[tokio::test]
async fn record_with_wrong_size_is_not_trusted() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new();
    let extractor = FakeExtractor::new();
    let manager = recording(&temp, &downloader, &extractor);

    let url = "https://example.com/swapped.zip";
    let path = manager.index().download_path(url);
    let staging = CacheIndex::staging_dir(&path);
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(&path, b"new content").unwrap();
    DownloadRecord::new(url, None, &UrlInfo::new(3, sha256_hex(b"old")))
        .save(&path, &staging)
        .await
        .unwrap();

    let extracted = manager.download_and_extract(url).await.unwrap();

    assert_eq!(downloader.total_calls(), 0);
    assert_eq!(
        extracted,
        manager
            .index()
            .extraction_path(ExtractMethod::Zip, &sha256_hex(b"new content"))
    );
    assert_eq!(
        manager.recorded_checksums().get(url),
        Some(&sha256_hex(b"new content"))
    );
}

#[tokio::test]
async fn forced_download_replaces_record() {
    let temp = TempDir::new().unwrap();
    let downloader = FakeDownloader::new().serve(PLAIN_URL, b"first");
    let mut forced = config(&temp);
    forced.force_download = true;
    let manager = build(forced, &downloader, &FakeExtractor::new(), ChecksumRegistry::recording());

    let path = manager.download(PLAIN_URL).await.unwrap();
    let first = DownloadRecord::load(&path).await.unwrap().unwrap();

    let _ = downloader.clone().serve(PLAIN_URL, b"second!");
    manager.download(PLAIN_URL).await.unwrap();
    let second = DownloadRecord::load(&path).await.unwrap().unwrap();

    assert_eq!(second.urls, vec![PLAIN_URL]);
    assert_eq!(second.checksum, sha256_hex(b"second!"));
    assert_eq!(second.size_bytes, 7);
    assert_ne!(second.checksum, first.checksum);
    assert_eq!(std::fs::read(&path).unwrap(), b"second!");
}
