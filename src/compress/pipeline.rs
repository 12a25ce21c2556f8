// Matcher output to window instructions.
//
// Copies go straight to the window writer. Literal stretches are scanned for
// runs of one byte: runs of at least MIN_RUN bytes become RUN, everything
// between them becomes ADD.

use crate::hash::config::MIN_RUN;
use crate::hash::matching::MatchSink;
use crate::hash::rolling;
use crate::vcdiff::encoder::WindowWriter;

impl MatchSink for WindowWriter<'_> {
    fn literal(&mut self, bytes: &[u8]) {
        emit_literals(self, bytes);
    }

    fn copy(&mut self, len: usize, address: u64) {
        WindowWriter::copy(self, len as u64, address);
    }

    fn address_cost(&self, address: u64, pending: u64) -> usize {
        WindowWriter::address_cost(self, address, pending)
    }
}

/// Write `data` as ADD and RUN instructions.
pub fn emit_literals(writer: &mut WindowWriter<'_>, data: &[u8]) {
    let mut add_start = 0;
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        let run = rolling::run_length(&data[i..], byte);
        if run >= MIN_RUN {
            writer.add(&data[add_start..i]);
            writer.run(run as u64, byte);
            add_start = i + run;
        }
        i += run;
    }
    writer.add(&data[add_start..]);
}
