use crate::row::Row;
use crate::serialiser;
use crate::srt::Subtitle;
use crate::store::{sanitise_plate, RowStore};

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

/// How long the final cue stays up, having no successor to end it.
const LAST_CUE_DURATION: Duration = Duration::from_secs(2);
const CUE_GAP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    FullDictionary,
    NumberEnglish,
    NumberChinese,
    TimestampChinese,
    TimestampEnglish,
    ChineseSrt,
    EnglishSrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Number,
    Timestamp,
    English,
    Chinese,
}

impl Column {
    fn header(self) -> &'static str {
        match self {
            Column::Number => "Number",
            Column::Timestamp => "Timestamp",
            Column::English => "English",
            Column::Chinese => "Chinese",
        }
    }

    fn cell(self, row: &Row) -> String {
        match self {
            Column::Number => row.number.to_string(),
            Column::Timestamp => row.timestamp.to_string(),
            Column::English => row.en.clone(),
            Column::Chinese => row.zh.clone(),
        }
    }
}

impl ExportFormat {
    /// Menu order; option `n` is `ALL[n - 1]`.
    pub const ALL: [ExportFormat; 7] = [
        ExportFormat::FullDictionary,
        ExportFormat::NumberEnglish,
        ExportFormat::NumberChinese,
        ExportFormat::TimestampChinese,
        ExportFormat::TimestampEnglish,
        ExportFormat::ChineseSrt,
        ExportFormat::EnglishSrt,
    ];

    pub fn from_choice(choice: &str) -> Option<Self> {
        let n: usize = choice.trim().parse().ok()?;
        n.checked_sub(1).and_then(|i| Self::ALL.get(i)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            ExportFormat::FullDictionary => "Full_Dictionary",
            ExportFormat::NumberEnglish => "Number_English",
            ExportFormat::NumberChinese => "Number_Chinese",
            ExportFormat::TimestampChinese => "Timestamp_Chinese",
            ExportFormat::TimestampEnglish => "Timestamp_English",
            ExportFormat::ChineseSrt => "CHI",
            ExportFormat::EnglishSrt => "ENG",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::FullDictionary
            | ExportFormat::NumberEnglish
            | ExportFormat::NumberChinese => "md",
            ExportFormat::TimestampChinese | ExportFormat::TimestampEnglish => "txt",
            ExportFormat::ChineseSrt | ExportFormat::EnglishSrt => "srt",
        }
    }

    pub fn file_name(self, plate: &str) -> String {
        format!("{}_{}.{}", sanitise_plate(plate), self.name(), self.extension())
    }

    fn columns(self) -> &'static [Column] {
        match self {
            ExportFormat::FullDictionary => &[
                Column::Number,
                Column::Timestamp,
                Column::English,
                Column::Chinese,
            ],
            ExportFormat::NumberEnglish => &[Column::Number, Column::English],
            ExportFormat::NumberChinese => &[Column::Number, Column::Chinese],
            ExportFormat::TimestampChinese => &[Column::Timestamp, Column::Chinese],
            ExportFormat::TimestampEnglish => &[Column::Timestamp, Column::English],
            ExportFormat::ChineseSrt => &[Column::Chinese],
            ExportFormat::EnglishSrt => &[Column::English],
        }
    }

    fn is_subtitle(self) -> bool {
        matches!(self, ExportFormat::ChineseSrt | ExportFormat::EnglishSrt)
    }

    /// Renders `rows` in ascending index order.
    pub fn write_to<W: Write>(self, buf: &mut W, rows: &BTreeMap<u32, Row>) -> Result<()> {
        if self.is_subtitle() {
            let subs = synthesise_cues(rows, self.columns()[0]);
            serialiser::write_subs(buf, &subs)
        } else {
            write_table(buf, self.columns(), rows)
        }
    }
}

/// Writes the whole dictionary in `format` into `export_dir`, replacing any
/// earlier export of the same name.
pub fn export(store: &RowStore, format: ExportFormat, export_dir: &Path) -> Result<PathBuf> {
    let plate = store.plate().unwrap_or_else(|| "unknown".to_string());
    fs::create_dir_all(export_dir).with_context(|| {
        format!("Failed to create export directory: '{}'", export_dir.display())
    })?;
    let path = export_dir.join(format.file_name(&plate));
    let rows = store.get_data();

    let file = fs::File::create(&path)
        .with_context(|| format!("Failed to create export file: '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    format
        .write_to(&mut writer, &rows)
        .context("Failed to write to export file.")?;
    writer.flush().context("Failed to write to export file.")?;

    info!(format = format.name(), path = %path.display(), rows = rows.len(), "Export written");
    Ok(path)
}

fn write_table<W: Write>(buf: &mut W, columns: &[Column], rows: &BTreeMap<u32, Row>) -> Result<()> {
    let headers: Vec<&str> = columns.iter().map(|c| c.header()).collect();
    write_table_line(buf, headers.as_slice())?;
    write_table_line(buf, vec!["---"; columns.len()].as_slice())?;
    for row in rows.values() {
        let cells: Vec<String> = columns.iter().map(|c| c.cell(row)).collect();
        write_table_line(buf, cells.as_slice())?;
    }
    Ok(())
}

fn write_table_line<W: Write, S: AsRef<str>>(buf: &mut W, cells: &[S]) -> Result<()> {
    let cells: Vec<&str> = cells.iter().map(|c| c.as_ref()).collect();
    writeln!(buf, "| {} |", cells.join(" | "))?;
    Ok(())
}

/// Each row's timestamp is where its cue starts; a cue ends 1ms before the
/// next one starts.
fn synthesise_cues(rows: &BTreeMap<u32, Row>, text: Column) -> Vec<Subtitle> {
    let rows: Vec<&Row> = rows.values().collect();
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let show_at = row.timestamp.as_duration();
            let hide_at = match rows.get(i + 1) {
                Some(next) => next.timestamp.as_duration().saturating_sub(CUE_GAP),
                None => show_at + LAST_CUE_DURATION,
            };
            Subtitle {
                sequence_number: i + 1,
                show_at,
                hide_at,
                text: text.cell(row),
            }
        })
        .collect()
}
