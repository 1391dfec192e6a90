//! Crash atomicity: an interrupted write leaves the old file or the new one.
//!
//! The store is armed to fail at each crash point during the second write of
//! a slot; a fresh coordinator then recovers orphans and loads the slot.

use crate::common::*;

fn old_document() -> SaveDocument {
    SaveDocument::new(2)
        .with_field(LEVEL, 1i64)
        .with_field(EXPERIENCE, 100i64)
        .with_field(UNLOCKED, Value::empty_sequence())
}

fn new_document() -> SaveDocument {
    SaveDocument::new(2)
        .with_field(LEVEL, 2i64)
        .with_field(EXPERIENCE, 200i64)
        .with_field(UNLOCKED, Value::Sequence(vec![Value::from("lantern")]))
}

#[test]
fn crash_at_every_point_leaves_a_whole_file() {
    for point in CrashPoint::all() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slot1.sav");
        write_document(&path, &old_document());

        let store = store();
        store.arm_crash(point);
        let blob = BinaryCodec::default()
            .encode_blob(&new_document(), DEFAULT_MAGIC)
            .unwrap();
        let err = store.write_durable(&path, &blob).unwrap_err();
        assert!(
            matches!(err, PersistError::SimulatedCrash { .. }),
            "{}: {:?}",
            point.description(),
            err
        );

        // "Restart"
        let c = open(dir.path(), Player::default());
        c.recover_orphans().unwrap();
        assert_eq!(list_dir(dir.path()), vec![path.clone()], "{}", point.description());

        let completion = finish(&c, &c.load("slot1").unwrap());
        assert!(completion.is_success(), "{}: {:?}", point.description(), completion);

        let expected = if point.new_content_visible() { 2 } else { 1 };
        c.with_state(|p| assert_eq!(p.level, expected, "{}", point.description()));
    }
}

#[test]
fn crash_before_first_write_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slot1.sav");

    let store = store();
    store.arm_crash(CrashPoint::AfterTempSync);
    let blob = BinaryCodec::default()
        .encode_blob(&new_document(), DEFAULT_MAGIC)
        .unwrap();
    assert!(store.write_durable(&path, &blob).is_err());
    assert!(!path.exists());

    let c = open(dir.path(), Player::new(5, 5));
    let removed = c.recover_orphans().unwrap();
    assert_eq!(removed.len(), 1);

    let completion = finish(&c, &c.load("slot1").unwrap());
    assert!(completion.error().unwrap().is_not_found());
    c.with_state(|p| assert_eq!(p.level, 5));
}

#[test]
fn orphan_recovery_leaves_slot_files_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slot1.sav");
    write_document(&path, &old_document());
    std::fs::write(dir.path().join("slot2.sav.tmp"), b"half a save").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

    let c = open(dir.path(), Player::default());
    let removed = c.recover_orphans().unwrap();

    assert_eq!(removed, vec![dir.path().join("slot2.sav.tmp")]);
    assert!(path.exists());
    assert!(dir.path().join("notes.txt").exists());
    assert_eq!(read_document(&path), old_document());
}

#[test]
fn orphan_recovery_leaves_host_temp_files_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slot1.sav");
    write_document(&path, &old_document());
    for name in ["notes.tmp", "download.part.tmp", "slot1.dat.tmp"] {
        std::fs::write(dir.path().join(name), b"host file").unwrap();
    }
    std::fs::write(dir.path().join("slot1.sav.tmp"), b"half a save").unwrap();

    let c = open(dir.path(), Player::default());
    let removed = c.recover_orphans().unwrap();

    assert_eq!(removed, vec![dir.path().join("slot1.sav.tmp")]);
    for name in ["notes.tmp", "download.part.tmp", "slot1.dat.tmp"] {
        assert!(dir.path().join(name).exists(), "{} was removed", name);
    }
    assert_eq!(read_document(&path), old_document());
}

#[test]
fn slot_extension_colliding_with_temp_suffix_is_refused() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::default().with_slot_extension("tmp");
    let result = Coordinator::open(registry(), dir.path(), config, Player::default());
    assert!(matches!(result, Err(PipelineError::Config(_))));
}

#[test]
fn recover_orphans_on_missing_directory_is_empty() {
    let dir = TempDir::new().unwrap();
    let c = open(&dir.path().join("not-yet"), Player::default());
    assert!(c.recover_orphans().unwrap().is_empty());
}
