// src/output.rs

use crate::error::Result;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use std::fmt;
use std::io::{self, Write};

/// Why a comparison did not produce an average.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[serde(rename = "no file found in the given path")]
    FileNotFound,
    #[serde(rename = "videos does not have equal length")]
    UnequalLength,
    #[serde(rename = "videos are not rgb")]
    NotRgb,
    #[serde(rename = "video file cannot be opened")]
    CannotOpen,
}

impl ErrorKind {
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "no file found in the given path",
            ErrorKind::UnequalLength => "videos does not have equal length",
            ErrorKind::NotRgb => "videos are not rgb",
            ErrorKind::CannotOpen => "video file cannot be opened",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The single answer a comparison writes to stdout.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonResult {
    AvgSim(f64),
    Error(ErrorKind),
}

impl ComparisonResult {
    pub fn avg_sim(&self) -> Option<f64> {
        match self {
            ComparisonResult::AvgSim(avg) => Some(*avg),
            ComparisonResult::Error(_) => None,
        }
    }
}

/// Compact JSON with a space after `:` and `,`, e.g. `{"avg_sim": 0.97}`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

pub fn to_json_line(result: &ComparisonResult) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, SpacedFormatter);
    result.serialize(&mut ser)?;
    // serde_json only ever writes valid UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Writes `result` as one JSON line and flushes it.
pub fn emit<W: Write>(out: &mut W, result: &ComparisonResult) -> Result<()> {
    let line = to_json_line(result)?;
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}
