#![no_main]
use libfuzzer_sys::fuzz_target;
use scanrep_core::force::{is_valid_record, parse_record};

fuzz_target!(|line: &str| {
    if let Ok(rec) = parse_record(line) {
        assert!(is_valid_record(line));
        assert!(rec.value.is_finite());
    }
});
