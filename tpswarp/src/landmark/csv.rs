//! Landmark CSV import and export
//!
//! Each row is either `x,y,z` or `name,x,y,z`.  Blank lines and lines starting
//! with `#` are skipped; a first row whose coordinate columns contain no
//! numbers at all is treated as a header.
//!
//! Paired landmarks are exported one pair per row, as
//! `name,source.x,source.y,source.z,dest.x,dest.y,dest.z`.
use super::{Input, LandmarkPair, NonParticipatingLandmark};
use crate::Error;
use nalgebra::Point3;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

/// Landmark read from a CSV file
#[derive(Clone, Debug, PartialEq)]
pub struct CsvLandmark {
    /// Name column, if present
    pub name: Option<String>,
    /// Location
    pub position: Point3<f64>,
}

/// Reads every landmark from a CSV stream
pub fn read_landmarks<R: Read>(r: R) -> Result<Vec<CsvLandmark>, Error> {
    let reader = BufReader::new(r);
    let mut out = vec![];
    let mut first_row = true;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_row(line, i + 1) {
            Ok(lm) => out.push(lm),
            Err(_) if first_row && is_header(line) => (),
            Err(e) => return Err(e),
        }
        first_row = false;
    }
    Ok(out)
}

/// Checks whether none of the coordinate columns (the last three) are numbers
fn is_header(line: &str) -> bool {
    let cols = line.split(',').map(str::trim).collect::<Vec<_>>();
    let coords = &cols[cols.len().saturating_sub(3)..];
    !coords.iter().any(|c| c.parse::<f64>().is_ok())
}

fn parse_row(line: &str, line_number: usize) -> Result<CsvLandmark, Error> {
    let bad = |reason: String| Error::BadCsvRow {
        line: line_number,
        reason,
    };
    let cols = line.split(',').map(str::trim).collect::<Vec<_>>();
    let (name, xyz) = match cols.as_slice() {
        [x, y, z] => (None, [*x, *y, *z]),
        [name, x, y, z] => (Some(name.to_string()), [*x, *y, *z]),
        _ => {
            return Err(bad(format!(
                "expected 3 or 4 columns, got {}",
                cols.len()
            )));
        }
    };
    let mut pos = [0.0; 3];
    for (out, txt) in pos.iter_mut().zip(xyz) {
        *out = txt
            .parse::<f64>()
            .map_err(|e| bad(format!("`{txt}` is not a number: {e}")))?;
    }
    Ok(CsvLandmark {
        name: name.filter(|n| !n.is_empty()),
        position: Point3::from(pos),
    })
}

/// Layout options for CSV export
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CsvFlags {
    /// Write a header row
    pub header: bool,
    /// Write a leading name column
    pub names: bool,
}

impl Default for CsvFlags {
    fn default() -> Self {
        Self {
            header: true,
            names: true,
        }
    }
}

/// Writes named locations, one per row
fn write_named_points<'a, W, I>(
    rows: I,
    flags: CsvFlags,
    out: &mut W,
) -> Result<(), Error>
where
    W: Write,
    I: IntoIterator<Item = (&'a str, Point3<f64>)>,
{
    let mut out = BufWriter::new(out);
    if flags.header {
        if flags.names {
            write!(out, "name,")?;
        }
        writeln!(out, "x,y,z")?;
    }
    for (name, pos) in rows {
        if flags.names {
            write!(out, "{name},")?;
        }
        writeln!(out, "{},{},{}", pos.x, pos.y, pos.z)?;
    }
    out.flush()?;
    Ok(())
}

/// Writes one side of every pair that has it placed
pub fn write_landmarks<W: Write>(
    pairs: &[LandmarkPair],
    input: Input,
    flags: CsvFlags,
    out: &mut W,
) -> Result<(), Error> {
    let rows = pairs
        .iter()
        .filter_map(|p| Some((p.name.as_str(), p.get(input)?)));
    write_named_points(rows, flags, out)
}

/// Writes non-participating landmarks (e.g. after warping them)
pub fn write_non_participating<W: Write>(
    landmarks: &[NonParticipatingLandmark],
    flags: CsvFlags,
    out: &mut W,
) -> Result<(), Error> {
    let rows = landmarks.iter().map(|p| (p.name.as_str(), p.location));
    write_named_points(rows, flags, out)
}

/// Writes both sides of every complete pair, one pair per row
///
/// Incomplete pairs are skipped.
pub fn write_pairs<W: Write>(
    pairs: &[LandmarkPair],
    flags: CsvFlags,
    out: &mut W,
) -> Result<(), Error> {
    let mut out = BufWriter::new(out);
    if flags.header {
        if flags.names {
            write!(out, "name,")?;
        }
        writeln!(out, "source.x,source.y,source.z,dest.x,dest.y,dest.z")?;
    }
    for p in pairs {
        let Some((s, d)) = p.locations() else {
            continue;
        };
        if flags.names {
            write!(out, "{},", p.name)?;
        }
        writeln!(out, "{},{},{},{},{},{}", s.x, s.y, s.z, d.x, d.y, d.z)?;
    }
    out.flush()?;
    Ok(())
}
