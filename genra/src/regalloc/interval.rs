//! Live intervals.

use std::fmt;

/// A closed range `[start, end]` of instruction positions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Do `self` and `other` share at least one position?
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// The live interval of one virtual register. An interval that has never been touched denotes a
/// register that is never used.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Interval(Option<Span>);

impl Interval {
    /// The span this interval covers, or `None` if it has never been touched.
    pub(crate) fn span(&self) -> Option<Span> {
        self.0
    }

    /// Extend this interval to cover position `pos`.
    pub(crate) fn touch(&mut self, pos: u32) {
        self.cover(Span {
            start: pos,
            end: pos,
        });
    }

    /// Extend this interval to cover all of `span`.
    pub(crate) fn cover(&mut self, span: Span) {
        self.0 = Some(match self.0 {
            Some(x) => Span {
                start: x.start.min(span.start),
                end: x.end.max(span.end),
            },
            None => span,
        });
    }

    /// If this interval has been touched, make it start at position 0.
    pub(crate) fn pin_start(&mut self) {
        if let Some(x) = &mut self.0 {
            x.start = 0;
        }
    }
}
