#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(cfg) = ffj_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // a validated config must convert without panicking
            let _ = ffj_core::SequenceCfg::from(&cfg);
            let _ = ffj_core::AxesCfg::from(&cfg.axes);
        }
    }
});
