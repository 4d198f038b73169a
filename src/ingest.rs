use crate::parser::{parse_timed_line, parse_translation_line};
use crate::store::RowStore;

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::debug;

/// Outcome of one pasted block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub skipped: usize,
    pub unknown_rows: usize,
}

/// Reads lines until the input signals end-of-input. Blank lines are kept;
/// the ingest functions ignore them.
pub fn read_block<R: BufRead>(input: &mut R) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    while let Some(line) = read_line_lossy(input).context("Failed to read pasted lines")? {
        lines.push(line);
    }
    Ok(lines)
}

/// Reads one line without its line ending, or `None` at end-of-input.
/// Bytes that are not UTF-8 (GBK pasted from elsewhere, say) become U+FFFD
/// instead of failing the read.
pub fn read_line_lossy<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    if input.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Appends one new row per `[timestamp] English` line. Existing rows are never touched.
pub fn ingest_timed_lines<I, S, W>(store: &RowStore, lines: I, out: &mut W) -> Result<IngestReport>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    W: Write,
{
    let mut report = IngestReport::default();
    for line in lines {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        match parse_timed_line(line) {
            Some(parsed) => {
                let row = store.append(parsed.timestamp, &parsed.en)?;
                debug!(number = row.number, timestamp = %row.timestamp, "Row created");
                writeln!(out, "Added #{} {} {}", row.number, row.timestamp, row.en)?;
                report.accepted += 1;
            }
            None => {
                debug!(line, "Skipped malformed timestamp line");
                writeln!(out, "Skipped (expected [HH:MM:SS.mmm] text): {}", line.trim())?;
                report.skipped += 1;
            }
        }
    }
    Ok(report)
}

/// Fills in the Chinese text of existing rows from `number Chinese` lines.
/// Lines naming a row that does not exist are skipped; no row is ever created.
pub fn ingest_translations<I, S, W>(store: &RowStore, lines: I, out: &mut W) -> Result<IngestReport>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    W: Write,
{
    let mut report = IngestReport::default();
    for line in lines {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        let parsed = match parse_translation_line(line) {
            Some(parsed) => parsed,
            None => {
                debug!(line, "Skipped malformed translation line");
                writeln!(out, "Skipped (expected number then text): {}", line.trim())?;
                report.skipped += 1;
                continue;
            }
        };
        match store.get_row(parsed.number) {
            Some(row) => {
                store.set_row(parsed.number, row.with_zh(parsed.zh))?;
                debug!(number = parsed.number, "Row updated");
                writeln!(out, "Updated #{}", parsed.number)?;
                report.accepted += 1;
            }
            None => {
                debug!(number = parsed.number, "No row to update");
                writeln!(out, "Skipped (no row #{}): {}", parsed.number, line.trim())?;
                report.unknown_rows += 1;
            }
        }
    }
    Ok(report)
}
