//! Tests for the memory-mapped backing file
//!
//! These tests verify:
//! - Create/open sizing and content preservation
//! - Bounds-checked reads
//! - Growth on writes past the end, bounded by an optional cap
//! - Rename keeps the mapping usable

use std::fs;
use std::path::PathBuf;

use mapstore::storage::MappedFile;
use mapstore::MapStoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.dat");
    (temp_dir, path)
}

// =============================================================================
// Open / Create Tests
// =============================================================================

#[test]
fn test_open_creates_file_with_min_len() {
    let (_temp, path) = setup_temp_file();

    let file = MappedFile::open(&path, 4096).unwrap();

    assert_eq!(file.len(), 4096);
    assert_eq!(fs::metadata(&path).unwrap().len(), 4096);
    assert!(file.read(0, 4096).unwrap().iter().all(|b| *b == 0));
}

#[test]
fn test_open_preserves_existing_content() {
    let (_temp, path) = setup_temp_file();

    {
        let mut file = MappedFile::open(&path, 4096).unwrap();
        file.write(100, b"persisted").unwrap();
        file.flush().unwrap();
    }

    let file = MappedFile::open(&path, 4096).unwrap();
    assert_eq!(file.read(100, 9).unwrap(), b"persisted");
}

#[test]
fn test_open_never_shrinks() {
    let (_temp, path) = setup_temp_file();
    MappedFile::open(&path, 8192).unwrap();

    let file = MappedFile::open(&path, 4096).unwrap();
    assert_eq!(file.len(), 8192);
}

#[test]
fn test_create_truncates() {
    let (_temp, path) = setup_temp_file();
    {
        let mut file = MappedFile::open(&path, 4096).unwrap();
        file.write(0, b"old").unwrap();
        file.flush().unwrap();
    }

    let file = MappedFile::create(&path, 4096).unwrap();
    assert_eq!(file.read(0, 3).unwrap(), &[0u8; 3]);
}

// =============================================================================
// Read / Write Tests
// =============================================================================

#[test]
fn test_read_out_of_bounds() {
    let (_temp, path) = setup_temp_file();
    let file = MappedFile::open(&path, 4096).unwrap();

    let result = file.read(4090, 16);
    assert!(matches!(result, Err(MapStoreError::CorruptRecord(_))));
}

#[test]
fn test_write_past_end_grows_at_least_double() {
    let (_temp, path) = setup_temp_file();
    let mut file = MappedFile::open(&path, 4096).unwrap();

    file.write(4090, b"0123456789").unwrap();

    assert_eq!(file.len(), 8192);
    assert_eq!(file.read(4090, 10).unwrap(), b"0123456789");
}

#[test]
fn test_large_write_grows_to_required() {
    let (_temp, path) = setup_temp_file();
    let mut file = MappedFile::open(&path, 4096).unwrap();

    let data = vec![0xAB; 20_000];
    file.write(0, &data).unwrap();

    assert_eq!(file.len(), 20_000);
    assert_eq!(file.read(0, 20_000).unwrap(), &data[..]);
}

#[test]
fn test_growth_clamped_to_max_len() {
    let (_temp, path) = setup_temp_file();
    let mut file = MappedFile::open(&path, 4096).unwrap().with_max_len(6000);

    file.write(4090, b"0123456789").unwrap();

    assert_eq!(file.len(), 6000);
    assert_eq!(fs::metadata(&path).unwrap().len(), 6000);
}

#[test]
fn test_write_past_max_len_rejected() {
    let (_temp, path) = setup_temp_file();
    let mut file = MappedFile::open(&path, 4096).unwrap().with_max_len(6000);

    let result = file.write(5990, b"0123456789abcdef");

    assert!(matches!(result, Err(MapStoreError::CacheCapacity { .. })));
    assert_eq!(file.len(), 4096);
}

#[test]
fn test_flush_range() {
    let (_temp, path) = setup_temp_file();
    let mut file = MappedFile::open(&path, 4096).unwrap();

    file.write(0, b"abc").unwrap();
    file.flush_range(0, 3).unwrap();
    file.flush_range(10, 0).unwrap();

    let on_disk = fs::read(&path).unwrap();
    assert_eq!(&on_disk[0..3], b"abc");
}

// =============================================================================
// Rename Tests
// =============================================================================

#[test]
fn test_rename_keeps_mapping() {
    let (temp, path) = setup_temp_file();
    let target = temp.path().join("renamed.dat");
    let mut file = MappedFile::open(&path, 4096).unwrap();
    file.write(0, b"before").unwrap();

    file.rename_to(&target).unwrap();
    file.write(6, b"after").unwrap();
    file.flush().unwrap();

    assert_eq!(file.path(), target.as_path());
    assert!(!path.exists());
    assert_eq!(&fs::read(&target).unwrap()[0..11], b"beforeafter");
}
