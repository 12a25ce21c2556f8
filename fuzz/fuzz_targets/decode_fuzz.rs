#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdstream::vcdiff::{DecoderOptions, decoder::decode_all_with};

fuzz_target!(|data: &[u8]| {
    // Small limits keep hostile window sizes from allocating.
    let options = DecoderOptions {
        max_target_window_size: 1 << 20,
        max_target_file_size: 4 << 20,
        ..DecoderOptions::default()
    };

    let _ = decode_all_with(&[], data, options);

    // Also with a dictionary taken from the input.
    if data.len() >= 2 {
        let (dictionary, delta) = data.split_at(data.len() / 2);
        let _ = decode_all_with(dictionary, delta, options);
    }
});
