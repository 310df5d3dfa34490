//! Tests for storage module

use super::*;
use pretty_assertions::assert_eq;
use test_case::test_case;

// ============================================================================
// Location Parsing Tests
// ============================================================================

#[test_case("s3://bucket/song_data/", Scheme::S3, "bucket", "song_data" ; "s3")]
#[test_case(
    "s3a://udacity-dend/log-data/*/*/*.json", Scheme::S3, "udacity-dend", "log-data/*/*/*.json" ;
    "s3a glob"
)]
#[test_case("s3n://b/k", Scheme::S3, "b", "k" ; "s3n")]
#[test_case("r2://bucket", Scheme::R2, "bucket", "" ; "r2 bucket only")]
fn test_parse_bucket_locations(url: &str, scheme: Scheme, bucket: &str, key: &str) {
    let location = Location::parse(url).unwrap();
    assert_eq!(location.scheme(), scheme);
    assert_eq!(location.bucket(), Some(bucket));
    assert_eq!(location.key(), key);
    assert!(location.scheme().is_remote());
}

#[test]
fn test_parse_local_locations() {
    let location = Location::parse("/tmp/data/").unwrap();
    assert_eq!(location.scheme(), Scheme::Local);
    assert_eq!(location.bucket(), None);
    assert_eq!(location.key(), "tmp/data");

    let location = Location::parse("file:///var/out").unwrap();
    assert_eq!(location.key(), "var/out");

    let relative = Location::parse("out/tables").unwrap();
    assert!(relative.key().ends_with("out/tables"));
    assert!(!relative.key().starts_with('/'));
}

#[test_case("" ; "empty")]
#[test_case("ftp://host/file" ; "unsupported scheme")]
#[test_case("s3:///key" ; "missing bucket")]
#[test_case("s3://buck*/key" ; "bucket pattern")]
fn test_parse_invalid_locations(url: &str) {
    let err = Location::parse(url).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_join() {
    let base = Location::parse("s3a://emr-test4/").unwrap();
    let songs = base.join("songs_table");
    assert_eq!(songs.key(), "songs_table");
    assert_eq!(songs.as_str(), "s3a://emr-test4/songs_table");
    assert_eq!(songs.join("/year=2000/").key(), "songs_table/year=2000");
}

#[test]
fn test_child_path_keeps_escapes_literal() {
    let base = Location::parse("s3://b/t").unwrap();
    let path = base.child_path("name=A%2FB/part-00000.parquet").unwrap();
    assert_eq!(path.as_ref(), "t/name=A%2FB/part-00000.parquet");
}

// ============================================================================
// Glob Tests
// ============================================================================

#[test]
fn test_literal_prefix() {
    let location = Location::parse("s3://b/song_data/A/*/*/*.json").unwrap();
    assert!(location.has_glob());
    assert_eq!(location.literal_prefix(), "song_data/A");

    let literal = Location::parse("s3://b/song_data/A/A/A/").unwrap();
    assert!(!literal.has_glob());
    assert_eq!(literal.literal_prefix(), "song_data/A/A/A");
    assert!(literal.glob_regex().unwrap().is_none());
}

#[test_case("log-data/2018/11/2018-11-01-events.json", true ; "matching file")]
#[test_case("log-data/2018/11/sub/x.json", false ; "too deep for star")]
#[test_case("log-data/2018/11/notes.txt", false ; "wrong extension")]
#[test_case("log-data/2018/events.json", false ; "too shallow")]
fn test_glob_star(key: &str, expected: bool) {
    let location = Location::parse("s3://b/log-data/*/*/*.json").unwrap();
    let re = location.glob_regex().unwrap().unwrap();
    assert_eq!(re.is_match(key), expected);
}

#[test]
fn test_glob_directory_selects_descendants() {
    let location = Location::parse("s3://b/song_data/A/*").unwrap();
    let re = location.glob_regex().unwrap().unwrap();
    assert!(re.is_match("song_data/A/B/C/TRABC.json"));
    assert!(!re.is_match("song_data/B/A/C/TRABC.json"));
}

#[test_case("data/{a,b}/x.json", "data/b/x.json", true ; "alternation")]
#[test_case("data/{a,b}/x.json", "data/c/x.json", false ; "alternation miss")]
#[test_case("data/[AB]/x.json", "data/A/x.json", true ; "class")]
#[test_case("data/[!AB]/x.json", "data/A/x.json", false ; "negated class")]
#[test_case("data/file?.json", "data/file1.json", true ; "single char")]
#[test_case("data/a.b*", "data/aXb", false ; "dot is literal")]
fn test_glob_patterns(pattern: &str, key: &str, expected: bool) {
    let location = Location::parse(&format!("s3://b/{pattern}")).unwrap();
    let re = location.glob_regex().unwrap().unwrap();
    assert_eq!(re.is_match(key), expected);
}

#[test]
fn test_glob_unterminated() {
    let location = Location::parse("s3://b/data/[ab/x").unwrap();
    assert!(location.glob_regex().is_err());
}

// ============================================================================
// Client Tests (local filesystem)
// ============================================================================

fn write_file(root: &std::path::Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_list_skips_hidden_and_sorts() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "b.json", "{}");
    write_file(dir.path(), "a/a.json", "{}");
    write_file(dir.path(), "_SUCCESS", "");
    write_file(dir.path(), ".a.json.crc", "");
    write_file(dir.path(), "_temporary/x.json", "{}");

    let client = StorageClient::local();
    let location = Location::parse(dir.path().to_str().unwrap()).unwrap();
    let objects = client.list(&location).await.unwrap();

    let names: Vec<String> = objects
        .iter()
        .map(|o| o.path.filename().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["a.json", "b.json"]);
}

#[tokio::test]
async fn test_list_single_object() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "one.json", "{\"a\": 1}");
    write_file(dir.path(), "two.json", "{\"a\": 2}");

    let client = StorageClient::local();
    let location = Location::parse(dir.path().join("one.json").to_str().unwrap()).unwrap();
    let objects = client.list(&location).await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].size, 8);
}

#[tokio::test]
async fn test_list_glob() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "2018/11/a.json", "{}");
    write_file(dir.path(), "2018/12/b.json", "{}");
    write_file(dir.path(), "2018/12/readme.md", "");

    let client = StorageClient::local();
    let pattern = format!("{}/*/*/*.json", dir.path().display());
    let objects = client.list(&Location::parse(&pattern).unwrap()).await.unwrap();
    assert_eq!(objects.len(), 2);
}

#[tokio::test]
async fn test_read_all_empty_selection_fails() {
    let dir = tempfile::tempdir().unwrap();
    let client = StorageClient::local();
    let pattern = format!("{}/*.json", dir.path().display());
    let err = client
        .read_all(&Location::parse(&pattern).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SourceRead { .. }));
}

#[tokio::test]
async fn test_put_exists_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let client = StorageClient::local();
    let table = Location::parse(dir.path().to_str().unwrap())
        .unwrap()
        .join("songs_table");

    assert!(!client.exists_any(&table).await.unwrap());

    let written = client
        .put(&table, "year=2000/part-00000.parquet", Bytes::from_static(b"x"))
        .await
        .unwrap();
    assert!(written.ends_with("songs_table/year=2000/part-00000.parquet"));
    assert!(dir.path().join("songs_table/year=2000/part-00000.parquet").exists());
    assert!(client.exists_any(&table).await.unwrap());

    client.delete_prefix(&table).await.unwrap();
    assert!(!dir.path().join("songs_table").exists());

    // Deleting a missing destination is fine
    client.delete_prefix(&table).await.unwrap();
}

#[tokio::test]
async fn test_remote_without_credentials() {
    let client = StorageClient::local();
    let location = Location::parse("s3://bucket/key").unwrap();
    let err = client.store_for(&location).unwrap_err();
    assert!(matches!(err, Error::Credentials { .. }));
}

#[test]
fn test_r2_requires_endpoint() {
    let credentials = Credentials::new("id", "secret");
    let client = StorageClient::new(Some(credentials), StorageOptions::default());
    let err = client
        .store_for(&Location::parse("r2://bucket/key").unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::MissingConfigField { .. }));
}

#[test]
fn test_s3_store_is_cached() {
    let client = StorageClient::new(
        Some(Credentials::new("id", "secret")),
        StorageOptions {
            region: Some("us-west-2".to_string()),
            endpoint: None,
        },
    );
    let a = client.store_for(&Location::parse("s3a://b/x").unwrap()).unwrap();
    let b = client.store_for(&Location::parse("s3://b/y").unwrap()).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}
