use loadcell_config::{Config, load_file, load_toml};
use rstest::rstest;

const BASE: &str = r#"
[[channel]]
name = "left"
dout = 5
sck = 6
window = 15
trim = 3

[[channel]]
name = "right"
dout = 17
sck = 27
gain = 64
rate = 80

[storage]
path = "flash.bin"
sector_size = 4096
capacity = 65536
"#;

fn with_channel_field(field: &str) -> String {
    format!(
        r#"
[[channel]]
name = "only"
{field}
"#
    )
}

#[test]
fn parses_full_config() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.channels.len(), 2);
    assert_eq!(cfg.channels[1].gain, 64);
    assert_eq!(cfg.channels[1].rate, 80);
    // unspecified fields fall back to defaults
    assert_eq!(cfg.channels[1].window, 15);
    assert_eq!(cfg.channels[0].discard, 6);
    assert_eq!(cfg.storage.capacity, 65536);
}

#[test]
fn empty_file_gets_one_default_channel() {
    let cfg = load_toml("").expect("parse");
    cfg.validate().expect("valid");
    assert_eq!(cfg.channels.len(), 1);
    assert_eq!(cfg, Config::default());
}

#[test]
fn channel_lookup_by_name_or_index() {
    let cfg = load_toml(BASE).unwrap();
    assert_eq!(cfg.channel("right").map(|(i, _)| i), Some(1));
    assert_eq!(cfg.channel("0").map(|(_, c)| c.name.as_str()), Some("left"));
    assert!(cfg.channel("middle").is_none());
    assert!(cfg.channel("7").is_none());
}

#[rstest]
#[case("window = 0", "window must be in 1..=32")]
#[case("window = 33", "window must be in 1..=32")]
#[case("window = 6\ntrim = 3", "2*trim < window")]
#[case("gain = 100", "gain must be one of")]
#[case("rate = 40", "rate must be 10 or 80")]
#[case("tare_samples = 0", "tare_samples must be >= 1")]
#[case("calibrate_samples = -2", "calibrate_samples must be >= 1")]
#[case("trimmed_samples = 4\ntrimmed_trim = 2", "2*trimmed_trim < trimmed_samples")]
#[case("dout = 6\nsck = 6", "must be different pins")]
#[case(
    "calibration = { offset_counts = 10, counts_per_gram = 0.0 }",
    "counts_per_gram must be a positive number"
)]
fn rejects_bad_channel_fields(#[case] field: &str, #[case] needle: &str) {
    let cfg = load_toml(&with_channel_field(field)).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}");
    assert!(msg.contains("channel[0]"), "message {msg:?} should name the channel");
}

#[test]
fn rejects_more_than_three_channels() {
    let mut toml = String::new();
    for (i, pins) in [(1, 2), (3, 4), (5, 6), (7, 8)].iter().enumerate() {
        toml.push_str(&format!(
            "[[channel]]\nname = \"c{i}\"\ndout = {}\nsck = {}\n",
            pins.0, pins.1
        ));
    }
    let err = load_toml(&toml).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("at most 3 channels"));
}

#[test]
fn rejects_duplicate_names() {
    let toml = "[[channel]]\nname = \"a\"\n[[channel]]\nname = \"a\"\ndout = 9\nsck = 10\n";
    let err = load_toml(toml).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("used twice"));
}

#[rstest]
#[case("sector_size = 16", "sector_size must be >= 32")]
#[case("sector_size = 4096\ncapacity = 6000", "multiple of storage.sector_size")]
#[case("sector_size = 4096\ncapacity = 1024", "at least one sector")]
#[case("path = \"\"", "storage.path must not be empty")]
fn rejects_bad_storage(#[case] field: &str, #[case] needle: &str) {
    let toml = format!("[storage]\n{field}\n");
    let err = load_toml(&toml).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains(needle), "{err}");
}

#[test]
fn rejects_unknown_rotation() {
    let err = load_toml("[logging]\nrotation = \"weekly\"\n")
        .unwrap()
        .validate()
        .unwrap_err();
    assert!(format!("{err}").contains("logging.rotation"));
}

#[test]
fn load_file_reports_path_on_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[[channel]]\nwindow = \"wide\"\n").unwrap();
    let err = load_file(&path).unwrap_err();
    assert!(format!("{err}").contains("bad.toml"));
}

#[test]
fn load_file_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    std::fs::write(&path, BASE).unwrap();
    let cfg = load_file(&path).unwrap();
    assert_eq!(cfg.storage.path, "flash.bin");

    std::fs::write(&path, "[[channel]]\nwindow = 40\n").unwrap();
    assert!(load_file(&path).is_err());
}

#[test]
fn huge_trim_is_rejected_not_wrapped() {
    let mut cfg = Config::default();
    cfg.channels[0].trim = usize::MAX / 2 + 1;
    let msg = cfg.validate().unwrap_err().to_string();
    assert!(msg.contains("2*trim"), "{msg}");

    let mut cfg = Config::default();
    cfg.channels[0].trimmed_trim = usize::MAX;
    assert!(cfg.validate().is_err());
}
