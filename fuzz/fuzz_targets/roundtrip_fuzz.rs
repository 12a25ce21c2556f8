#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdstream::{EncoderOptions, FormatExtensions, decode_all, encode_all};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let match_level = u32::from(data[0] % 10);
    let look_for_target_matches = data[0] & 0x80 != 0;
    let split = 2 + (data[1] as usize % (data.len() - 2));
    let dictionary = &data[2..split];
    let target = &data[split..];

    let options = EncoderOptions {
        match_level,
        look_for_target_matches,
        extensions: FormatExtensions::all(),
        ..EncoderOptions::default()
    };
    let delta = encode_all(dictionary, target, options).unwrap();
    assert_eq!(decode_all(dictionary, &delta).unwrap(), target);
});
