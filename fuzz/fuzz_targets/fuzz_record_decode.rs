#![no_main]
use libfuzzer_sys::fuzz_target;
use loadcell_core::{ConfigRecord, MAGIC, RECORD_LEN};

fuzz_target!(|data: &[u8]| {
    // Any accepted record must carry the magic and re-encode to the same bytes.
    if let Some(rec) = ConfigRecord::decode(data) {
        assert_eq!(rec.magic, MAGIC);
        assert_eq!(&rec.encode()[..], &data[..RECORD_LEN]);
    }
});
