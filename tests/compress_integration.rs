// Integration tests for the compress module.
//
// Tests the full pipeline: StreamingEncoder -> VCDIFF stream -> decoder,
// including chunked encoding, every match level, the format extensions,
// custom code tables, session lifecycles and multi-window data.

use std::io;

use vcdstream::compress::DeltaDecoder;
use vcdstream::vcdiff::code_table::{CodeTable, CodeTableError};
use vcdstream::vcdiff::header::CodeTableData;
use vcdstream::vcdiff::{EncodingTable, FileHeader, HeaderParser, Parsed};
use vcdstream::{
    DecodeError, DecoderOptions, EncodeError, EncoderOptions, FormatExtensions, HashedDictionary,
    OutputSink, StreamingDecoder, StreamingEncoder, WriteSink, decode_all, encode_all,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn roundtrip(source: &[u8], target: &[u8], opts: EncoderOptions) -> Vec<u8> {
    let delta = encode_all(source, target, opts).unwrap();
    let decoded = decode_all(source, &delta).unwrap();
    assert_eq!(
        decoded,
        target,
        "roundtrip mismatch (source={}, target={}, delta={})",
        source.len(),
        target.len(),
        delta.len()
    );
    delta
}

fn generate_data(size: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    let mut data = Vec::with_capacity(size);
    for _ in 0..size {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        data.push((state >> 33) as u8);
    }
    data
}

fn mutate_data(source: &[u8], change_pct: f64, seed: u64) -> Vec<u8> {
    let mut target = source.to_vec();
    let mut state = seed;
    let changes = ((change_pct / 100.0) * source.len() as f64) as usize;
    for _ in 0..changes {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let pos = (state >> 33) as usize % target.len();
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        target[pos] = (state >> 33) as u8;
    }
    target
}

fn level(match_level: u32) -> EncoderOptions {
    EncoderOptions {
        match_level,
        ..EncoderOptions::default()
    }
}

/// Count the windows of a delta by walking their headers.
fn count_windows(delta: &[u8], dictionary_len: u64) -> usize {
    let mut parser = HeaderParser::new(delta);
    assert!(matches!(parser.parse_file_header().unwrap(), Parsed::Complete(_)));
    let mut offset = parser.position();
    let mut windows = 0;
    while offset < delta.len() {
        let mut p = HeaderParser::new(&delta[offset..]);
        p.parse_win_indicator_and_source_segment(dictionary_len, u64::MAX, true)
            .unwrap();
        p.parse_window_lengths().unwrap();
        offset += p.end_of_delta_window().unwrap();
        windows += 1;
    }
    windows
}

// ---------------------------------------------------------------------------
// All levels roundtrip
// ---------------------------------------------------------------------------

#[test]
fn all_levels_1kb() {
    let source = generate_data(1024, 1);
    let target = mutate_data(&source, 5.0, 2);
    for match_level in 0..=9 {
        roundtrip(&source, &target, level(match_level));
    }
}

#[test]
fn all_levels_64kb() {
    let source = generate_data(64 * 1024, 10);
    let target = mutate_data(&source, 5.0, 20);
    for match_level in 0..=9 {
        roundtrip(&source, &target, level(match_level));
    }
}

#[test]
fn all_levels_1mb() {
    let source = generate_data(1024 * 1024, 100);
    let target = mutate_data(&source, 2.0, 200);
    for match_level in [0, 1, 6, 9] {
        roundtrip(&source, &target, level(match_level));
    }
}

#[test]
fn higher_levels_never_lose_much() {
    let source = generate_data(64 * 1024, 5);
    let target = mutate_data(&source, 1.0, 6);
    let fast = roundtrip(&source, &target, level(1)).len();
    let best = roundtrip(&source, &target, level(9)).len();
    assert!(best <= fast + fast / 4, "level 9 {best} vs level 1 {fast}");
}

// ---------------------------------------------------------------------------
// Level 0 (literals only)
// ---------------------------------------------------------------------------

#[test]
fn level_0_is_literal_only() {
    let target = b"Hello, world! This is stored without compression.";
    let opts = EncoderOptions {
        match_level: 0,
        extensions: FormatExtensions::CHECKSUM,
        ..EncoderOptions::default()
    };
    // Even an identical dictionary is ignored.
    let delta = roundtrip(target, target, opts);
    assert!(delta.len() >= target.len());
}

// ---------------------------------------------------------------------------
// Format extensions
// ---------------------------------------------------------------------------

#[test]
fn every_extension_combination() {
    let source = generate_data(8 * 1024, 3);
    let target = mutate_data(&source, 4.0, 4);
    for bits in 0..4u8 {
        let extensions = FormatExtensions::from_bits_truncate(bits);
        for look_for_target_matches in [false, true] {
            let opts = EncoderOptions {
                extensions,
                look_for_target_matches,
                window_size: 3000,
                ..EncoderOptions::default()
            };
            let delta = roundtrip(&source, &target, opts);
            let expected_version = if extensions.is_empty() { 0x00 } else { b'S' };
            assert_eq!(delta[3], expected_version, "extensions {extensions:?}");
        }
    }
}

#[test]
fn target_matches_shrink_repetitive_data() {
    let block = generate_data(300, 9);
    let target: Vec<u8> = block.iter().copied().cycle().take(300 * 20).collect();
    let without = roundtrip(
        b"",
        &target,
        EncoderOptions {
            look_for_target_matches: false,
            ..EncoderOptions::default()
        },
    );
    let with = roundtrip(b"", &target, EncoderOptions::default());
    assert!(with.len() < without.len() / 4, "{} vs {}", with.len(), without.len());
}

#[test]
fn runs_and_literals_mixed() {
    let mut target = Vec::new();
    target.extend_from_slice(b"HEADER");
    target.extend(std::iter::repeat_n(0xAA, 100));
    target.extend_from_slice(b"MIDDLE");
    target.extend(std::iter::repeat_n(0xBB, 200));
    target.extend_from_slice(b"FOOTER");

    for match_level in [0, 6] {
        let delta = roundtrip(b"", &target, level(match_level));
        assert!(delta.len() < target.len());
    }
}

// ---------------------------------------------------------------------------
// Application header and custom code tables
// ---------------------------------------------------------------------------

#[test]
fn app_header_reaches_decoder() {
    let opts = EncoderOptions {
        app_header: Some(b"build 1234".to_vec()),
        ..EncoderOptions::default()
    };
    let delta = roundtrip(b"dict", b"dict and more", opts);

    let mut decoder = DeltaDecoder::new(&delta[..], b"dict");
    let mut out = Vec::new();
    decoder.decode_to(&mut out).unwrap();
    assert_eq!(decoder.session().app_header(), Some(&b"build 1234"[..]));
}

#[test]
fn custom_code_table_roundtrip() {
    let mut table = CodeTable::default();
    // Swap two single-ADD opcodes so the table differs from the default.
    table.entries_mut().swap(5, 9);
    let source = generate_data(4096, 12);
    let target = mutate_data(&source, 3.0, 13);

    for extensions in [FormatExtensions::empty(), FormatExtensions::all()] {
        let opts = EncoderOptions {
            code_table: EncodingTable::custom(table.clone(), 4, 3).unwrap(),
            extensions,
            ..EncoderOptions::default()
        };
        let delta = roundtrip(&source, &target, opts);
        // VCD_CODETABLE
        assert_eq!(delta[4] & 0x02, 0x02);
    }
}

#[test]
fn custom_cache_sizes_roundtrip() {
    // Same nine modes as the default cache, split differently.
    let opts = EncoderOptions {
        code_table: EncodingTable::custom(CodeTable::default(), 5, 2).unwrap(),
        ..EncoderOptions::default()
    };
    let source = generate_data(16 * 1024, 21);
    let target = mutate_data(&source, 2.0, 22);
    roundtrip(&source, &target, opts);
}

#[test]
fn custom_table_with_too_few_modes_is_rejected() {
    // The default table addresses mode 8, which needs 9 modes.
    assert!(EncodingTable::custom(CodeTable::default(), 1, 1).is_err());
    // Two extra modes would have no explicit-size COPY opcode.
    assert!(EncodingTable::custom(CodeTable::default(), 5, 4).is_err());
}

#[test]
fn nested_custom_table_is_rejected() {
    // A genuine custom-table delta, used as the code table of another file.
    let mut table = CodeTable::default();
    table.entries_mut().swap(5, 9);
    let opts = EncoderOptions {
        code_table: EncodingTable::custom(table, 4, 3).unwrap(),
        ..EncoderOptions::default()
    };
    let inner = encode_all(b"", b"x", opts).unwrap();

    let mut header = FileHeader::new(FormatExtensions::empty());
    header.code_table = Some(CodeTableData {
        near_size: 4,
        same_size: 3,
        delta: inner,
    });
    let mut outer = Vec::new();
    header.encode(&mut outer);

    let err = decode_all(b"", &outer).unwrap_err();
    assert!(
        matches!(err, DecodeError::CodeTable(CodeTableError::InvalidCustomTable(_))),
        "{err}"
    );
}

// ---------------------------------------------------------------------------
// Streaming encode
// ---------------------------------------------------------------------------

#[test]
fn streaming_encode_small_chunks() {
    let source = generate_data(4096, 42);
    let target = mutate_data(&source, 10.0, 99);
    let dictionary = HashedDictionary::new(&source);

    // 37-byte chunks put window boundaries at odd offsets.
    let mut delta = Vec::new();
    let mut enc = StreamingEncoder::new(&dictionary, level(6));
    enc.start_encoding(&mut delta).unwrap();
    for chunk in target.chunks(37) {
        enc.encode_chunk(chunk, &mut delta).unwrap();
    }
    enc.finish_encoding(&mut delta).unwrap();

    assert_eq!(enc.bytes_in(), target.len() as u64);
    assert_eq!(enc.windows_written(), target.len().div_ceil(37) as u64);
    assert_eq!(decode_all(&source, &delta).unwrap(), target);
}

#[test]
fn streaming_encode_single_byte() {
    let target = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let dictionary = HashedDictionary::new(b"");
    let mut delta = Vec::new();
    let mut enc = StreamingEncoder::new(&dictionary, level(1));
    enc.start_encoding(&mut delta).unwrap();
    for byte in target {
        enc.encode_chunk(std::slice::from_ref(byte), &mut delta).unwrap();
    }
    enc.finish_encoding(&mut delta).unwrap();
    assert_eq!(decode_all(b"", &delta).unwrap(), target);
}

#[test]
fn streaming_encode_into_writer() {
    let source = generate_data(2048, 5);
    let target = mutate_data(&source, 5.0, 6);
    let dictionary = HashedDictionary::new(&source);

    let mut sink = WriteSink(io::BufWriter::new(Vec::new()));
    let mut enc = StreamingEncoder::new(&dictionary, EncoderOptions::default());
    enc.start_encoding(&mut sink).unwrap();
    enc.encode_chunk(&target, &mut sink).unwrap();
    enc.finish_encoding(&mut sink).unwrap();
    let delta = sink.into_inner().into_inner().unwrap();

    assert_eq!(decode_all(&source, &delta).unwrap(), target);
}

#[test]
fn shared_dictionary_across_sessions() {
    let source = generate_data(8 * 1024, 31);
    let dictionary = HashedDictionary::new(&source);
    for seed in 0..4 {
        let target = mutate_data(&source, 1.0, seed);
        let mut delta = Vec::new();
        let mut enc = StreamingEncoder::new(&dictionary, EncoderOptions::default());
        enc.start_encoding(&mut delta).unwrap();
        enc.encode_chunk(&target, &mut delta).unwrap();
        enc.finish_encoding(&mut delta).unwrap();
        assert_eq!(decode_all(&source, &delta).unwrap(), target);
    }
}

#[test]
fn encoder_lifecycle() {
    let dictionary = HashedDictionary::new(b"dict");
    let mut enc = StreamingEncoder::new(&dictionary, EncoderOptions::default());
    let mut out = Vec::new();

    assert!(matches!(enc.encode_chunk(b"x", &mut out), Err(EncodeError::NotStarted)));
    assert!(matches!(enc.finish_encoding(&mut out), Err(EncodeError::NotStarted)));
    assert!(out.is_empty());

    enc.start_encoding(&mut out).unwrap();
    assert!(matches!(enc.start_encoding(&mut out), Err(EncodeError::AlreadyStarted)));
    enc.encode_chunk(b"dict!", &mut out).unwrap();
    enc.finish_encoding(&mut out).unwrap();

    assert!(matches!(enc.encode_chunk(b"x", &mut out), Err(EncodeError::AlreadyFinished)));
    assert!(matches!(enc.finish_encoding(&mut out), Err(EncodeError::AlreadyFinished)));
    assert_eq!(decode_all(b"dict", &out).unwrap(), b"dict!");

    // A finished encoder starts a fresh delta file.
    let mut again = Vec::new();
    enc.start_encoding(&mut again).unwrap();
    enc.encode_chunk(b"again", &mut again).unwrap();
    enc.finish_encoding(&mut again).unwrap();
    assert_eq!(decode_all(b"dict", &again).unwrap(), b"again");
}

#[test]
fn sink_failure_surfaces() {
    struct Full;
    impl io::Write for Full {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::StorageFull, "no space"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let dictionary = HashedDictionary::new(b"");
    let mut enc = StreamingEncoder::new(&dictionary, EncoderOptions::default());
    let err = enc.start_encoding(&mut WriteSink(Full)).unwrap_err();
    assert!(matches!(err, EncodeError::Sink(_)));
    // The header never went out, so the session cannot be resumed.
    let mut out = Vec::new();
    assert!(matches!(enc.start_encoding(&mut out), Err(EncodeError::Sink(_))));
    assert!(out.is_empty());
}

#[test]
fn sink_failure_ends_the_session() {
    /// Collects output but rejects the next write when `fail_next` is set.
    struct Flaky {
        out: Vec<u8>,
        fail_next: bool,
    }
    impl OutputSink for Flaky {
        fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
            if std::mem::take(&mut self.fail_next) {
                return Err(io::Error::other("transient"));
            }
            self.out.extend_from_slice(bytes);
            Ok(())
        }
    }

    let dictionary = HashedDictionary::new(b"");
    let mut enc = StreamingEncoder::new(&dictionary, EncoderOptions::default());
    let mut sink = Flaky {
        out: Vec::new(),
        fail_next: false,
    };
    enc.start_encoding(&mut sink).unwrap();
    enc.encode_chunk(b"first ", &mut sink).unwrap();

    sink.fail_next = true;
    assert!(matches!(enc.encode_chunk(b"second ", &mut sink), Err(EncodeError::Sink(_))));

    // The sink works again, but a window is missing: nothing more may be written.
    let written = sink.out.len();
    assert!(matches!(enc.encode_chunk(b"third", &mut sink), Err(EncodeError::Sink(_))));
    assert!(matches!(enc.finish_encoding(&mut sink), Err(EncodeError::Sink(_))));
    assert!(matches!(enc.start_encoding(&mut sink), Err(EncodeError::Sink(_))));
    assert_eq!(sink.out.len(), written);
    assert_eq!(enc.windows_written(), 1);
    assert_eq!(decode_all(b"", &sink.out).unwrap(), b"first ");
}

// ---------------------------------------------------------------------------
// Streaming decode
// ---------------------------------------------------------------------------

#[test]
fn decoder_lifecycle() {
    let delta = encode_all(b"", b"payload", EncoderOptions::default()).unwrap();
    let mut decoder = StreamingDecoder::new(DecoderOptions::default());
    let mut out = Vec::new();

    assert!(matches!(decoder.decode_chunk(&delta, &mut out), Err(DecodeError::NotStarted)));
    assert!(matches!(decoder.finish_decoding(), Err(DecodeError::NotStarted)));

    decoder.start_decoding(b"");
    decoder.decode_chunk(&delta, &mut out).unwrap();
    decoder.finish_decoding().unwrap();
    assert_eq!(out, b"payload");
    assert_eq!(decoder.total_decoded(), 7);

    assert!(matches!(decoder.decode_chunk(b"", &mut out), Err(DecodeError::AlreadyFinished)));
    assert!(matches!(decoder.finish_decoding(), Err(DecodeError::AlreadyFinished)));
    // Usage errors do not fail the session.
    assert!(decoder.error().is_none());
}

#[test]
fn delta_decoder_streams_to_writer() {
    let source = generate_data(32 * 1024, 1);
    let target = mutate_data(&source, 3.0, 2);
    let delta = roundtrip(
        &source,
        &target,
        EncoderOptions {
            window_size: 8 * 1024,
            ..EncoderOptions::default()
        },
    );
    assert_eq!(count_windows(&delta, source.len() as u64), 4);

    let mut dec = DeltaDecoder::new(io::Cursor::new(&delta), &source);
    let mut output = Vec::new();
    let written = dec.decode_to(&mut output).unwrap();

    assert_eq!(output, target);
    assert_eq!(written, target.len() as u64);
    assert_eq!(dec.bytes_decoded(), target.len() as u64);
    assert_eq!(dec.bytes_read(), delta.len() as u64);
}

#[test]
fn decoder_with_vcd_target_disabled_accepts_encoder_output() {
    let source = generate_data(4096, 50);
    let target = mutate_data(&source, 5.0, 51);
    let delta = encode_all(&source, &target, EncoderOptions::default()).unwrap();
    let options = DecoderOptions {
        allow_vcd_target: false,
        ..DecoderOptions::default()
    };
    let mut dec = DeltaDecoder::with_options(&delta[..], &source, options);
    let mut out = Vec::new();
    dec.decode_to(&mut out).unwrap();
    assert_eq!(out, target);
}

// ---------------------------------------------------------------------------
// Edge cases
// ---------------------------------------------------------------------------

#[test]
fn empty_source_empty_target() {
    let delta = roundtrip(b"", b"", EncoderOptions::default());
    assert_eq!(delta.len(), 5);
}

#[test]
fn empty_source() {
    roundtrip(b"", b"Hello, world!", EncoderOptions::default());
}

#[test]
fn empty_target() {
    roundtrip(b"Hello, world!", b"", EncoderOptions::default());
}

#[test]
fn identical_source_and_target() {
    let data = generate_data(4096, 77);
    let delta = roundtrip(&data, &data, EncoderOptions::default());
    assert!(delta.len() < 32, "delta is {} bytes", delta.len());
}

#[test]
fn single_byte_target() {
    roundtrip(b"abc", b"x", EncoderOptions::default());
}

#[test]
fn all_zeros() {
    let data = vec![0u8; 10_000];
    roundtrip(&data, &data, EncoderOptions::default());
    roundtrip(b"", &data, EncoderOptions::default());
}

// ---------------------------------------------------------------------------
// Multi-window processing
// ---------------------------------------------------------------------------

#[test]
fn multi_window_large_data() {
    let source = generate_data(32 * 1024, 1);
    let target = mutate_data(&source, 3.0, 2);
    let dictionary = HashedDictionary::new(&source);
    let opts = EncoderOptions {
        window_size: 8 * 1024,
        extensions: FormatExtensions::all(),
        ..EncoderOptions::default()
    };

    let mut delta = Vec::new();
    let mut enc = StreamingEncoder::new(&dictionary, opts);
    enc.start_encoding(&mut delta).unwrap();
    enc.encode_chunk(&target, &mut delta).unwrap();
    enc.finish_encoding(&mut delta).unwrap();
    assert_eq!(enc.windows_written(), 4);

    let mut decoder = StreamingDecoder::new(DecoderOptions::default());
    let mut output = Vec::new();
    decoder.start_decoding(&source);
    for chunk in delta.chunks(1000) {
        decoder.decode_chunk(chunk, &mut output).unwrap();
    }
    decoder.finish_decoding().unwrap();
    assert_eq!(output, target);
}

// ---------------------------------------------------------------------------
// Delta is actually smaller than target for similar data
// ---------------------------------------------------------------------------

#[test]
fn delta_compression_effective() {
    let source = generate_data(16 * 1024, 7);
    let target = mutate_data(&source, 1.0, 8);
    let delta = roundtrip(&source, &target, level(6));
    assert!(
        delta.len() < target.len() / 2,
        "delta ({}) should be much smaller than target ({}) for 99% similar data",
        delta.len(),
        target.len()
    );
}
