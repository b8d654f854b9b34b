//! This module records statistics about a run of the register allocator: how many copies it had to
//! insert, how often it had to reclaim space, and how full the register file got.
//!
//! Statistics are always collected, since they are cheap and are handed back with the allocation.
//! They are additionally written out if the end user defines the environment variable
//! `GENRAD_LOG_STATS` (a path, or `-` for stderr).

use std::{env, fs};
use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};

/// The events we count.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Display, EnumCount, EnumIter)]
// You can add new events to this with the following notes:
//   1. The variants range from `0..Event::COUNT`: don't assign numbers to any of the variants.
//   2. The `strum` `to_string` of each variant is the key that will appear in the JSON stats.
pub(crate) enum Event {
    /// A vector group was seen by the coalescer.
    #[strum(to_string = "vectors")]
    Vector,
    /// A vector group was already satisfied by a previously coalesced group.
    #[strum(to_string = "vectors_satisfied")]
    VectorSatisfied,
    /// A copy instruction was inserted to make a vector allocatable.
    #[strum(to_string = "copies_inserted")]
    CopyInserted,
    /// A register was allocated on its own.
    #[strum(to_string = "single_allocs")]
    SingleAlloc,
    /// A vector group was allocated as one block.
    #[strum(to_string = "vector_allocs")]
    VectorAlloc,
    /// An interval was expired and its space handed back to the register file.
    #[strum(to_string = "expirations")]
    Expiration,
}

#[derive(Clone, Debug)]
pub struct Stats {
    /// The path to write output to. If exactly equal to `-`, output will be written to stderr. If
    /// `None`, no output is written.
    output_path: Option<String>,
    counts: [u64; Event::COUNT],
    /// The number of register file bytes currently handed out by linear scan.
    bytes_in_use: u64,
    /// The maximum value `bytes_in_use` has reached.
    peak_bytes: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self {
            output_path: env::var("GENRAD_LOG_STATS").ok(),
            ..Self::new_silent()
        }
    }

    pub(crate) fn new_silent() -> Self {
        Self {
            output_path: None,
            counts: [0; Event::COUNT],
            bytes_in_use: 0,
            peak_bytes: 0,
        }
    }

    pub(crate) fn count(&mut self, ev: Event) {
        self.counts[ev as usize] += 1;
    }

    /// Record that `n` bytes of the register file were handed out.
    pub(crate) fn grew(&mut self, n: u32) {
        self.bytes_in_use += u64::from(n);
        self.peak_bytes = self.peak_bytes.max(self.bytes_in_use);
    }

    /// Record that `n` bytes of the register file were handed back.
    pub(crate) fn shrank(&mut self, n: u32) {
        debug_assert!(self.bytes_in_use >= u64::from(n));
        self.bytes_in_use -= u64::from(n);
    }

    fn get(&self, ev: Event) -> u64 {
        self.counts[ev as usize]
    }

    /// How many copy instructions were inserted to satisfy vector constraints?
    pub fn copies_inserted(&self) -> u64 {
        self.get(Event::CopyInserted)
    }

    /// How many vector groups were already satisfied without needing any work?
    pub fn vectors_satisfied(&self) -> u64 {
        self.get(Event::VectorSatisfied)
    }

    /// How many intervals were expired?
    pub fn expirations(&self) -> u64 {
        self.get(Event::Expiration)
    }

    /// How many single registers were allocated by linear scan?
    pub fn single_allocs(&self) -> u64 {
        self.get(Event::SingleAlloc)
    }

    /// How many vector blocks were allocated by linear scan?
    pub fn vector_allocs(&self) -> u64 {
        self.get(Event::VectorAlloc)
    }

    /// The largest number of register file bytes simultaneously handed out by linear scan.
    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }

    /// Output these statistics to the appropriate output path, if there is one.
    pub(crate) fn output(&self) {
        match self.output_path.as_deref() {
            Some("-") => eprintln!("{}", self.to_json()),
            Some(p) => {
                fs::write(p, self.to_json()).ok();
            }
            None => (),
        }
    }

    /// Turn these statistics into JSON. The output is guaranteed to be sorted by field name so
    /// that textual matching of the JSON string is possible.
    fn to_json(&self) -> String {
        let mut fields = Event::iter()
            .map(|ev| (ev.to_string(), self.get(ev).to_string()))
            .collect::<Vec<_>>();
        fields.push(("peak_bytes".to_owned(), self.peak_bytes.to_string()));
        fields.sort_unstable_by(|(k1, _), (k2, _)| k1.cmp(k2));
        format!(
            r#"{{
    {}
}}"#,
            fields
                .iter()
                .map(|(x, y)| format!(r#""{x}": {y}"#))
                .collect::<Vec<_>>()
                .join(",\n    ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fm::FMatcher;

    #[test]
    fn peak() {
        let mut s = Stats::new_silent();
        s.grew(64);
        s.grew(32);
        s.shrank(64);
        s.grew(16);
        assert_eq!(s.peak_bytes(), 96);
    }

    #[test]
    fn json() {
        let mut s = Stats::new_silent();
        s.count(Event::CopyInserted);
        s.count(Event::CopyInserted);
        s.count(Event::Expiration);
        s.grew(32);
        FMatcher::new(
            r#"{
    "copies_inserted": 2,
    "expirations": 1,
    "peak_bytes": 32,
    "single_allocs": 0,
    ...
}"#,
        )
        .unwrap()
        .matches(&s.to_json())
        .unwrap();
    }

    #[test]
    fn output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("stats.json");
        let mut s = Stats::new_silent();
        s.output_path = Some(p.to_str().unwrap().to_owned());
        s.count(Event::VectorAlloc);
        s.output();
        assert!(fs::read_to_string(&p)
            .unwrap()
            .contains(r#""vector_allocs": 1"#));
    }
}
