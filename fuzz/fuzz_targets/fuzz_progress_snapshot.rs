#![no_main]
use libfuzzer_sys::fuzz_target;

use ffj_core::StageSnapshot;

fuzz_target!(|data: &[u8]| {
    // Whatever is on the card, decoding either fails cleanly or yields a
    // snapshot that re-encodes to the same stage.
    if let Ok(snap) = StageSnapshot::decode(data) {
        let bytes = snap.encode().expect("encode");
        let again = StageSnapshot::decode(&bytes).expect("decode");
        assert_eq!(again.stage, snap.stage);
    }
    let legacy = StageSnapshot::from_legacy_flags(data);
    assert!(legacy.is_done(ffj_core::Stage::Ready));
});
