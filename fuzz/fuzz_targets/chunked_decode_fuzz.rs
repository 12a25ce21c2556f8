#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdstream::{EncoderOptions, FormatExtensions, StreamingDecoder, decode_all, encode_all};
use vcdstream::vcdiff::DecoderOptions;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // Control bytes: extensions and the chunk size for feeding the decoder.
    let extensions = FormatExtensions::from_bits_truncate(data[0]);
    let step = usize::from(data[1]).max(1);
    let payload = &data[2..];
    let (dictionary, target) = payload.split_at(payload.len() / 3);

    let options = EncoderOptions {
        extensions,
        window_size: 4096,
        ..EncoderOptions::default()
    };
    let delta = encode_all(dictionary, target, options).unwrap();

    // Decoding in arbitrary pieces must match decoding in one call.
    let whole = decode_all(dictionary, &delta).unwrap();
    let mut decoder = StreamingDecoder::new(DecoderOptions::default());
    let mut pieces = Vec::new();
    decoder.start_decoding(dictionary);
    for chunk in delta.chunks(step) {
        decoder.decode_chunk(chunk, &mut pieces).unwrap();
    }
    decoder.finish_decoding().unwrap();

    assert_eq!(whole, target);
    assert_eq!(pieces, target);
});
