#![no_main]

use libfuzzer_sys::fuzz_target;
use medseq::contracts::FormatConfig;
use medseq::format::format_identifier;

fuzz_target!(|data: &[u8]| {
    // Any config that passes validation must render without panicking,
    // and the number must survive unpadded
    let Ok(config) = serde_json::from_slice::<FormatConfig>(data) else {
        return;
    };
    if config.validate().is_err() {
        return;
    }

    for sequence in [1, 42, 99_999, u64::MAX] {
        let formatted = format_identifier(&config, "MR", sequence, 2024);
        let digits = sequence.to_string();
        assert!(formatted.ends_with(&digits));
    }
});
