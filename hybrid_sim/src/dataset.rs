// hybrid_sim/src/dataset.rs

//! Line-oriented pose-graph datasets.
//!
//! An edge line reads `<tag> <from> <tag> <to> <tag> <n>` followed by `n`
//! candidate relative poses `x y θ`. Consecutive keys make an odometry edge
//! (ambiguous when `n > 1`); anything else is a loop closure. A line
//! `GPS <key> <x> <y>` is an absolute planar position fix. Blank lines and
//! lines starting with `#` are skipped.

use crate::error::DatasetError;
use hybrid_core::nonlinear::Pose2;
use nalgebra::Vector2;
use std::fmt;
use std::io::BufRead;

pub const GPS_TAG: &str = "GPS";

/// A relative-pose measurement with one or more candidate values.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: u64,
    pub to: u64,
    pub measurements: Vec<Pose2>,
}

impl Edge {
    pub fn is_odometry(&self) -> bool {
        self.to == self.from + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Edge(Edge),
    Gps { key: u64, position: Vector2<f64> },
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Edge(edge) => {
                write!(f, "X {} X {} N {}", edge.from, edge.to, edge.measurements.len())?;
                for pose in &edge.measurements {
                    write!(f, " {} {} {}", pose.x, pose.y, pose.theta)?;
                }
                Ok(())
            }
            Record::Gps { key, position } => write!(f, "{GPS_TAG} {key} {} {}", position.x, position.y),
        }
    }
}

/// Parses one line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str, line_number: usize) -> Result<Option<Record>, DatasetError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    let err = |reason: String| DatasetError::new(line_number, reason);

    let integer = |i: usize, what: &str| -> Result<u64, DatasetError> {
        let token = parts.get(i).ok_or_else(|| err(format!("missing {what}")))?;
        token
            .parse()
            .map_err(|_| err(format!("{what} `{token}` is not a non-negative integer")))
    };
    let real = |i: usize, what: &str| -> Result<f64, DatasetError> {
        let token = parts.get(i).ok_or_else(|| err(format!("missing {what}")))?;
        token
            .parse()
            .map_err(|_| err(format!("{what} `{token}` is not a number")))
    };

    if parts[0] == GPS_TAG {
        if parts.len() != 4 {
            return Err(err(format!("GPS line needs 4 fields, found {}", parts.len())));
        }
        let key = integer(1, "GPS key")?;
        let position = Vector2::new(real(2, "GPS x")?, real(3, "GPS y")?);
        return Ok(Some(Record::Gps { key, position }));
    }

    let from = integer(1, "source key")?;
    let to = integer(3, "target key")?;
    let count = integer(5, "measurement count")? as usize;
    if count == 0 {
        return Err(err("an edge needs at least one measurement".to_string()));
    }
    let expected = 6 + 3 * count;
    if parts.len() != expected {
        return Err(err(format!(
            "{count} measurements need {expected} fields, found {}",
            parts.len()
        )));
    }
    let measurements = (0..count)
        .map(|i| -> Result<Pose2, DatasetError> {
            let base = 6 + 3 * i;
            Ok(Pose2::new(
                real(base, "x")?,
                real(base + 1, "y")?,
                real(base + 2, "theta")?,
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if from == to {
        return Err(err(format!("edge connects pose {from} to itself")));
    }
    Ok(Some(Record::Edge(Edge {
        from,
        to,
        measurements,
    })))
}

/// Streams records out of a reader, skipping blank and comment lines.
pub struct DatasetReader<R> {
    lines: std::io::Lines<R>,
    line_number: usize,
}

impl<R: BufRead> DatasetReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for DatasetReader<R> {
    type Item = Result<Record, crate::error::SimError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;
            match parse_line(&line, self.line_number) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use approx::assert_abs_diff_eq;
    use std::io::Cursor;

    #[test]
    fn parses_an_ambiguous_odometry_edge() {
        let record = parse_line("X 4 X 5 N 2 1.0 0.0 0.1 1.5 0.0 0.1", 1).unwrap().unwrap();
        let Record::Edge(edge) = record else {
            panic!("expected an edge");
        };
        assert!(edge.is_odometry());
        assert_eq!(edge.measurements.len(), 2);
        assert_abs_diff_eq!(edge.measurements[1].x, 1.5);
    }

    #[test]
    fn non_consecutive_keys_are_a_loop_closure() {
        let Some(Record::Edge(edge)) = parse_line("X 9 X 2 N 1 0.5 0.5 3.0", 1).unwrap() else {
            panic!("expected an edge");
        };
        assert!(!edge.is_odometry());
    }

    #[test]
    fn parses_gps_lines() {
        let record = parse_line("GPS 7 2.5 -1.0", 1).unwrap().unwrap();
        assert_eq!(
            record,
            Record::Gps {
                key: 7,
                position: Vector2::new(2.5, -1.0)
            }
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("   ", 1).unwrap(), None);
        assert_eq!(parse_line("# header", 2).unwrap(), None);
    }

    #[test]
    fn malformed_lines_report_their_number() {
        let err = parse_line("X 0 X 1 N 2 1.0 0.0 0.0", 12).unwrap_err();
        assert_eq!(err.line, 12);
        let err = parse_line("X 0 X one N 1 1.0 0.0 0.0", 3).unwrap_err();
        assert!(err.reason.contains("target key"));
        assert!(parse_line("GPS 1 2.0", 4).is_err());
    }

    #[test]
    fn reader_counts_skipped_lines() {
        let text = "# comment\nX 0 X 1 N 1 1 0 0\n\nX 1 X 2 N bad\n";
        let records: Vec<_> = DatasetReader::new(Cursor::new(text)).collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        match &records[1] {
            Err(SimError::Dataset(e)) => assert_eq!(e.line, 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn display_writes_a_parseable_line() {
        let record = Record::Edge(Edge {
            from: 3,
            to: 0,
            measurements: vec![Pose2::new(-1.0, 2.0, 0.25)],
        });
        let Some(Record::Edge(parsed)) = parse_line(&record.to_string(), 1).unwrap() else {
            panic!("expected an edge");
        };
        assert_eq!((parsed.from, parsed.to), (3, 0));
        assert_abs_diff_eq!(parsed.measurements[0].theta, 0.25, epsilon = 1e-12);
    }
}
