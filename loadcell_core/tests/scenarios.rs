//! End-to-end flows over simulated hardware: tare, calibrate, persist, reload.

use loadcell_core::{
    BatchAverager, CalibrationState, Channel, ChannelSettings, ConfigStore, Phase, ScaleEntry,
    ScaleError, StoreError,
};
use loadcell_hardware::{FileFlash, MemFlash, SimulatedSource};
use rstest::rstest;

fn no_discard() -> ChannelSettings {
    ChannelSettings {
        discard: 0,
        read_timeout: None,
        ..ChannelSettings::default()
    }
}

#[test]
fn tare_calibrate_weigh() {
    let mut ch: Channel<_> = Channel::new("c", SimulatedSource::constant(100), no_discard());
    assert_eq!(ch.tare(7).unwrap(), 100);

    ch.source_mut().set_script(vec![150]);
    assert_eq!(ch.calibrate(50.0, 7).unwrap(), 1.0);
    assert_eq!(ch.calibration().phase(), Phase::Calibrated);
    assert_eq!(ch.calibration().weight_grams(200.0), 100.0);

    ch.source_mut().set_script(vec![200]);
    assert_eq!(ch.read_weight(4).unwrap(), 100.0);
}

#[test]
fn calibrate_with_zero_weight_is_a_no_op() {
    let mut ch: Channel<_> = Channel::new("c", SimulatedSource::constant(100), no_discard());
    ch.tare(7).unwrap();
    let before = ch.to_entry();
    assert!(matches!(
        ch.calibrate(0.0, 10),
        Err(ScaleError::InvalidInput(_))
    ));
    assert_eq!(ch.to_entry(), before);
}

#[test]
fn stale_samples_are_discarded_before_tare() {
    // six stale conversions from before the load settled, then the real zero
    let mut script = vec![9_000; 6];
    script.extend([100; 7]);
    let mut ch: Channel<_> = Channel::new(
        "c",
        SimulatedSource::scripted(script),
        ChannelSettings {
            read_timeout: None,
            ..ChannelSettings::default()
        },
    );
    assert_eq!(ch.tare(7).unwrap(), 100);
}

#[test]
fn record_round_trips_through_store() {
    let entries = [
        ScaleEntry::new(100, 1.0),
        ScaleEntry::new(0, 0.0),
        ScaleEntry::new(0, 0.0),
    ];
    let mut store = ConfigStore::new(MemFlash::new(64 * 1024, 4096)).unwrap();
    store.save(&entries).unwrap();
    assert_eq!(store.load().unwrap(), Some(entries));
}

#[rstest]
#[case::magic_low_byte(0, 0x01)]
#[case::entry_byte(9, 0x40)]
#[case::crc_byte(28, 0xFF)]
fn corruption_invalidates_record(#[case] at: u32, #[case] mask: u8) {
    let mut store = ConfigStore::new(MemFlash::new(64 * 1024, 4096)).unwrap();
    store
        .save(&[ScaleEntry::new(100, 1.0), ScaleEntry::default(), ScaleEntry::default()])
        .unwrap();
    let base = store.sector_offset();
    store.flash_mut().flip_bits(base + at, mask);
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn blank_device_loads_nothing() {
    let mut store = ConfigStore::new(MemFlash::new(8192, 4096)).unwrap();
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn torn_write_is_reported() {
    let mut store = ConfigStore::new(MemFlash::new(8192, 4096)).unwrap();
    store.flash_mut().drop_next_program();
    assert_eq!(
        store.save(&[ScaleEntry::default(); 3]),
        Err(StoreError::VerifyFailed)
    );
}

#[test]
fn calibration_survives_restart_on_file_flash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flash.bin");

    let mut ch: Channel<_> = Channel::new("c", SimulatedSource::constant(1_000), no_discard());
    ch.tare(0).unwrap();
    ch.source_mut().set_script(vec![1_000 + 420 * 250]);
    ch.calibrate(250.0, 0).unwrap();
    let saved = [ch.to_entry(), ScaleEntry::default(), ScaleEntry::default()];
    {
        let mut store = ConfigStore::new(FileFlash::open(&path, 16 * 1024, 4096).unwrap()).unwrap();
        store.save(&saved).unwrap();
    }

    let mut store = ConfigStore::new(FileFlash::open(&path, 16 * 1024, 4096).unwrap()).unwrap();
    let loaded = store.load().unwrap().expect("record present");
    let restored = CalibrationState::from_entry(&loaded[0]);
    assert_eq!(restored.offset(), 1_000);
    assert_eq!(restored.scale(), 420.0);
    assert_eq!(restored.weight_grams(f64::from(1_000 + 420 * 10)), 10.0);
}

#[test]
fn bounded_tare_reports_timeout_and_keeps_state() {
    let mut cal = CalibrationState::new();
    cal.set_offset(77);
    let mut src = SimulatedSource::unresponsive();
    let err = cal
        .tare_with(
            &mut src,
            7,
            &BatchAverager::default(),
            Some(std::time::Duration::from_millis(1)),
        )
        .unwrap_err();
    assert_eq!(err, ScaleError::Timeout);
    assert_eq!(cal.offset(), 77);
}
