//! Fuzz target: `BlinkConfig::from_params` / `BlinkConfig::from_json`
//!
//! Splits arbitrary bytes into whitespace-separated words and feeds them to
//! the parameter parser, then tries the same bytes as a JSON document.
//! Neither path may panic, and anything accepted must also validate.
//!
//! cargo fuzz run fuzz_config_params

#![no_main]

use buttonblink::BlinkConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    if let Ok(config) = BlinkConfig::from_params(text.split_whitespace()) {
        assert!(config.validate().is_ok(), "accepted params must validate");
    }

    if let Ok(config) = BlinkConfig::from_json(text) {
        assert!(config.validate().is_ok(), "accepted document must validate");
    }
});
