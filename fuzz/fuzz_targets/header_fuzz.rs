#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdstream::vcdiff::{HeaderParser, Parsed};

fuzz_target!(|data: &[u8]| {
    let mut parser = HeaderParser::new(data);
    let Ok(Parsed::Complete(_)) = parser.parse_file_header() else {
        return;
    };

    // Walk window headers until the input runs out or fails to parse.
    let mut offset = parser.position();
    while offset < data.len() {
        let mut p = HeaderParser::new(&data[offset..]);
        let source = p.parse_win_indicator_and_source_segment(1 << 16, 1 << 16, true);
        let Ok(Parsed::Complete(source)) = source else {
            return;
        };
        let Ok(Parsed::Complete(_)) = p.parse_window_lengths() else {
            return;
        };
        let Ok(Parsed::Complete(())) = p.parse_delta_indicator() else {
            return;
        };
        let Ok(Parsed::Complete(_)) = p.parse_section_lengths(source.has_checksum()) else {
            return;
        };
        let Ok(end) = p.end_of_delta_window() else {
            return;
        };
        assert!(end >= p.position());
        offset = offset.saturating_add(end);
    }
});
