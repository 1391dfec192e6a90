//! Corrupt and foreign files are rejected before reaching live state.

use savestate_durability::BLOB_HEADER_SIZE;

use crate::common::*;

fn saved_slot(dir: &TempDir) -> (Coordinator<Player>, std::path::PathBuf) {
    let c = open(dir.path(), Player::new(3, 30));
    assert!(finish(&c, &c.save("slot1").unwrap()).is_success());
    c.with_state_mut(|p| p.level = 99);
    (c, dir.path().join("slot1.sav"))
}

fn assert_corrupt_and_untouched(c: &Coordinator<Player>) {
    let completion = finish(c, &c.load("slot1").unwrap());
    let err = completion.error().expect("load fails");
    assert!(
        matches!(
            err,
            PipelineError::Storage {
                stage: Stage::Read,
                source: PersistError::CorruptFile { .. },
                ..
            }
        ),
        "{:?}",
        err
    );
    c.with_state(|p| {
        assert_eq!(p.level, 99);
        assert_eq!(p.loads, 0);
    });
}

#[test]
fn single_flipped_payload_byte_is_detected() {
    let dir = TempDir::new().unwrap();
    let (c, path) = saved_slot(&dir);
    let len = file_size(&path);
    assert!(len > BLOB_HEADER_SIZE as u64);

    flip_byte(&path, len - 1);
    assert_corrupt_and_untouched(&c);
}

#[test]
fn every_flipped_byte_is_detected() {
    let dir = TempDir::new().unwrap();
    let (_c, path) = saved_slot(&dir);
    let original = std::fs::read(&path).unwrap();

    for offset in 0..original.len() {
        let mut bytes = original.clone();
        bytes[offset] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();
        assert!(
            store().read_durable(&path).is_err(),
            "flip at offset {} went unnoticed",
            offset
        );
    }
}

#[test]
fn truncated_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let (c, path) = saved_slot(&dir);
    truncate_file(&path, file_size(&path) - 3);
    assert_corrupt_and_untouched(&c);
}

#[test]
fn header_only_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let (c, path) = saved_slot(&dir);
    truncate_file(&path, 10);
    assert_corrupt_and_untouched(&c);
}

#[test]
fn foreign_magic_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (c, path) = saved_slot(&dir);

    let foreign = BinaryCodec::default()
        .encode_blob(&SaveDocument::new(2).with_field(LEVEL, 1i64), *b"ELSE")
        .unwrap();
    std::fs::write(&path, foreign).unwrap();
    assert_corrupt_and_untouched(&c);
}

#[test]
fn garbage_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (c, path) = saved_slot(&dir);
    std::fs::write(&path, vec![0xAB; 512]).unwrap();
    assert_corrupt_and_untouched(&c);
}

#[test]
fn intact_file_still_loads_after_failed_attempts() {
    let dir = TempDir::new().unwrap();
    let (c, path) = saved_slot(&dir);
    let good = std::fs::read(&path).unwrap();

    flip_byte(&path, file_size(&path) - 1);
    assert_corrupt_and_untouched(&c);

    std::fs::write(&path, good).unwrap();
    assert!(finish(&c, &c.load("slot1").unwrap()).is_success());
    c.with_state(|p| assert_eq!(p.level, 3));
}
