#![no_main]

use std::io::Write as _;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut output = vec![0u8; data.len()];
    let written = asedev::inflate::zlib_decompress(&compressed, &mut output).unwrap();
    assert_eq!(&output[..written], data);
});
