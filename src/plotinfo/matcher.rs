//! Line-shape matchers for plotter log lines
//!
//! The plotter has written two log formats over time. Both are recognized:
//! every event has a canonical shape and a legacy shape, and the shapes are
//! tried in a fixed priority order with the first match winning.

use super::stage::Stage;

/// A recognized line, before the table index is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMatch<'a> {
    /// A phase started (or finished) work on a table. `index` is the raw
    /// digit run captured from the line.
    Table { stage: Stage, index: &'a str },
    /// The plot has been written
    Terminal,
}

/// Known line shapes, in match priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `Computing table N`
    ComputingTable,
    /// `[P1] Table N took <t> sec[, found <n> matches]`
    ComputeTimed,
    /// `Backpropagating on table N`
    BackpropagatingTable,
    /// `[P2] Table N rewrite took <t> sec[, dropped <n> entries (<pct>)]`
    BackpropTimed,
    /// `Compressing tables N and M`
    CompressingTables,
    /// `[P3-2] Table N took <t> sec, wrote <n> left entries, <n> final`
    CompressTimed,
    /// `... Write Checkpoint tables ...`
    WriteCheckpoint,
    /// `Total plot creation time was <t> sec`
    TotalTime,
}

const SHAPES: [Shape; 8] = [
    Shape::ComputingTable,
    Shape::ComputeTimed,
    Shape::BackpropagatingTable,
    Shape::BackpropTimed,
    Shape::CompressingTables,
    Shape::CompressTimed,
    Shape::WriteCheckpoint,
    Shape::TotalTime,
];

impl Shape {
    fn capture(self, line: &str) -> Option<LineMatch<'_>> {
        match self {
            Shape::ComputingTable => {
                let index = line.strip_prefix("Computing table ")?;
                is_digits(index).then_some(LineMatch::Table {
                    stage: Stage::Compute,
                    index,
                })
            }
            Shape::ComputeTimed => {
                let (index, rest) = split_digits(line.strip_prefix("[P1] Table ")?)?;
                let timing = rest.strip_prefix(" took ")?;
                (ends_with_sec(timing) || ends_with_found_matches(timing)).then_some(
                    LineMatch::Table {
                        stage: Stage::Compute,
                        index,
                    },
                )
            }
            Shape::BackpropagatingTable => {
                let index = line.strip_prefix("Backpropagating on table ")?;
                is_digits(index).then_some(LineMatch::Table {
                    stage: Stage::Backprop,
                    index,
                })
            }
            Shape::BackpropTimed => {
                let (index, rest) = split_digits(line.strip_prefix("[P2] Table ")?)?;
                let timing = rest.strip_prefix(" rewrite took ")?;
                (ends_with_sec(timing) || ends_with_dropped_entries(timing)).then_some(
                    LineMatch::Table {
                        stage: Stage::Backprop,
                        index,
                    },
                )
            }
            Shape::CompressingTables => {
                let (index, rest) = split_digits(line.strip_prefix("Compressing tables ")?)?;
                let next = rest.strip_prefix(" and ")?;
                is_digits(next).then_some(LineMatch::Table {
                    stage: Stage::Compress,
                    index,
                })
            }
            Shape::CompressTimed => {
                let (index, rest) = split_digits(line.strip_prefix("[P3-2] Table ")?)?;
                let timing = rest.strip_prefix(" took ")?;
                ends_with_wrote_entries(timing).then_some(LineMatch::Table {
                    stage: Stage::Compress,
                    index,
                })
            }
            Shape::WriteCheckpoint => (line.contains("Write Checkpoint tables")
                || line == "Write checkpoint tables")
                .then_some(LineMatch::Terminal),
            Shape::TotalTime => line
                .strip_prefix("Total plot creation time was ")
                .filter(|timing| ends_with_sec(timing))
                .map(|_| LineMatch::Terminal),
        }
    }
}

/// Match a line against every known shape
///
/// Returns `None` for lines that carry no progress information.
pub fn match_line(line: &str) -> Option<LineMatch<'_>> {
    SHAPES.iter().find_map(|shape| shape.capture(line))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Split a non-empty leading run of ASCII digits from the rest
fn split_digits(s: &str) -> Option<(&str, &str)> {
    let end = s.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(s.len());
    (end > 0).then(|| s.split_at(end))
}

/// Strip a non-empty trailing run of ASCII digits, returning what precedes it
fn strip_trailing_digits(s: &str) -> Option<&str> {
    let rest = s.trim_end_matches(|c: char| c.is_ascii_digit());
    (rest.len() < s.len()).then_some(rest)
}

/// `<anything> sec`
fn ends_with_sec(timing: &str) -> bool {
    timing.ends_with(" sec")
}

/// `<anything> sec, found <n> matches`
fn ends_with_found_matches(timing: &str) -> bool {
    timing
        .strip_suffix(" matches")
        .and_then(strip_trailing_digits)
        .is_some_and(|head| head.ends_with(" sec, found "))
}

/// `<anything> sec, dropped <anything> entries (<anything>)`
fn ends_with_dropped_entries(timing: &str) -> bool {
    const DROPPED: &str = " sec, dropped ";
    const ENTRIES: &str = " entries (";

    if !timing.ends_with(')') {
        return false;
    }
    let Some(dropped_at) = timing.find(DROPPED) else {
        return false;
    };
    let after_dropped = &timing[dropped_at + DROPPED.len()..];
    match after_dropped.find(ENTRIES) {
        // The closing paren must come after the opening one
        Some(entries_at) => entries_at + ENTRIES.len() < after_dropped.len(),
        None => false,
    }
}

/// `<anything> sec, wrote <n> left entries, <n> final`
fn ends_with_wrote_entries(timing: &str) -> bool {
    timing
        .strip_suffix(" final")
        .and_then(strip_trailing_digits)
        .and_then(|head| head.strip_suffix(" left entries, "))
        .and_then(strip_trailing_digits)
        .is_some_and(|head| head.ends_with(" sec, wrote "))
}
