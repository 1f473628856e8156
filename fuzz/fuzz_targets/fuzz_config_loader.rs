#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and validation may reject anything but must never panic.
    if let Ok(cfg) = loadcell_config::load_toml(data) {
        if cfg.validate().is_ok() {
            assert!(!cfg.channels.is_empty());
            for ch in &cfg.channels {
                assert!(2 * ch.trim < ch.window);
            }
        }
    }
});
