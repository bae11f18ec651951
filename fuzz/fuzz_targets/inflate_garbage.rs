#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut output = [0u8; 4096];
    let _ = asedev::inflate::inflate(data, &mut output);
});
