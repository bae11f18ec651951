#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any outcome but a panic or runaway allocation is acceptable here.
    if let Ok(doc) = asedev::load_from_memory(data) {
        let _ = asedev::flatten_all_frames(&doc);
    }
});
