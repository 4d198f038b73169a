use crate::export::{self, ExportFormat};
use crate::ingest::{self, IngestReport};
use crate::store::RowStore;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

/// Invalid answers tolerated at an ingestion prompt before the session gives up.
pub const MAX_MENU_RETRIES: usize = 5;
/// Invalid answers tolerated at the export menu.
pub const MAX_EXPORT_RETRIES: usize = 1;

const RETRY: &str = "Say that again?";
const FAREWELL: &str = "Okie. Bye!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    TimedEnglish,
    NumberedChinese,
}

/// The line-based conversation around one plate.
pub struct Session<'a, R, W> {
    store: &'a RowStore,
    input: R,
    output: W,
    export_dir: PathBuf,
}

impl<'a, R: BufRead, W: Write> Session<'a, R, W> {
    pub fn new<P: Into<PathBuf>>(store: &'a RowStore, input: R, output: W, export_dir: P) -> Self {
        Session {
            store,
            input,
            output,
            export_dir: export_dir.into(),
        }
    }

    /// Runs a whole session: pick a plate, add entries, save, then offer an export.
    pub fn run(&mut self, plate: Option<String>, export_only: bool) -> Result<()> {
        self.say("Yay! I'm ready!")?;
        let plate = match plate {
            Some(plate) => plate,
            None => match self.prompt_plate()? {
                Some(plate) => plate,
                None => return Ok(()),
            },
        };
        self.start(&plate)?;

        if export_only {
            self.run_export_flow()?;
            return Ok(());
        }

        if let Err(err) = self.run_add_flow() {
            // Keep what was entered so far before giving up on the session.
            if let Some(path) = self.store.save()? {
                info!(path = %path.display(), "Saved after failed session");
            }
            return Err(err);
        }
        self.finish()?;

        self.say("Wanna export something?")?;
        if self.read_answer()?.map_or(false, |a| a.eq_ignore_ascii_case("yes")) {
            self.run_export_flow()?;
        }
        Ok(())
    }

    fn prompt_plate(&mut self) -> Result<Option<String>> {
        for _ in 0..=MAX_MENU_RETRIES {
            self.say("Which plate are we working on?")?;
            match self.read_answer()? {
                None => return Ok(None),
                Some(plate) if !plate.is_empty() => return Ok(Some(plate)),
                Some(_) => self.say(RETRY)?,
            }
        }
        self.say(FAREWELL)?;
        Ok(None)
    }

    pub fn start(&mut self, plate: &str) -> Result<bool> {
        let found = self.store.initialize(plate)?;
        if found {
            let rows = self.store.len();
            let next = self.store.next_index();
            self.say(&format!(
                "Found the dictionary for '{}' ({} rows, next row is #{}).",
                plate, rows, next
            ))?;
        } else {
            if let Some(backup) = self.store.set_aside() {
                self.say(&format!(
                    "The dictionary for '{}' could not be read. It was kept as {}.",
                    plate,
                    backup.display()
                ))?;
            }
            self.say(&format!("Starting a new dictionary for '{}'.", plate))?;
        }
        Ok(found)
    }

    /// The add-entries loop. Returns once the user is done, runs out of
    /// retries or closes the input.
    pub fn run_add_flow(&mut self) -> Result<()> {
        if !self.ask_to_start()? {
            return Ok(());
        }

        loop {
            let mode = match self.ask_mode()? {
                Some(mode) => mode,
                None => return Ok(()),
            };
            let report = self.ingest(mode)?;
            info!(?mode, ?report, "Batch ingested");

            self.say("Wanna add more stuff?")?;
            match self.read_answer()? {
                Some(answer) if answer.eq_ignore_ascii_case("yes") => continue,
                _ => {
                    self.say(FAREWELL)?;
                    return Ok(());
                }
            }
        }
    }

    /// Prints the closing summary and persists the dictionary.
    pub fn finish(&mut self) -> Result<()> {
        match self.store.last_row() {
            Some(row) => self.say(&format!("Last row: {}", row))?,
            None => self.say("The dictionary is empty.")?,
        }
        if let Some(path) = self.store.save()? {
            self.say(&format!("Saved to {}", path.display()))?;
        }
        Ok(())
    }

    /// The export menu. Returns the written file, if any.
    pub fn run_export_flow(&mut self) -> Result<Option<PathBuf>> {
        self.say("I wonder what I should export… 0_o")?;
        for (i, format) in ExportFormat::ALL.iter().enumerate() {
            self.say(&format!("Option {}: {}.{}", i + 1, format.name(), format.extension()))?;
        }

        for attempt in 0..=MAX_EXPORT_RETRIES {
            let answer = match self.read_answer()? {
                Some(answer) => answer,
                None => return Ok(None),
            };
            if let Some(format) = ExportFormat::from_choice(&answer) {
                let path = export::export(self.store, format, &self.export_dir)?;
                self.say(&format!("Wrote {}", path.display()))?;
                self.say("Export finished >< See you next time~~")?;
                return Ok(Some(path));
            }
            if attempt < MAX_EXPORT_RETRIES {
                self.say(RETRY)?;
            }
        }
        self.say("Alright. Bye!")?;
        Ok(None)
    }

    fn ask_to_start(&mut self) -> Result<bool> {
        for attempt in 0..=MAX_MENU_RETRIES {
            if attempt == 0 {
                self.say("Time to add stuff?")?;
            }
            match self.read_answer()?.map(|a| a.to_ascii_lowercase()).as_deref() {
                Some("yes") => return Ok(true),
                Some("no") | None => break,
                Some(_) if attempt < MAX_MENU_RETRIES => self.say(RETRY)?,
                Some(_) => (),
            }
        }
        self.say(FAREWELL)?;
        Ok(false)
    }

    fn ask_mode(&mut self) -> Result<Option<Mode>> {
        self.say("What is your input content?")?;
        self.say("Option 1: Timestamp and English")?;
        self.say("Option 2: Number and Chinese")?;
        for attempt in 0..=MAX_MENU_RETRIES {
            match self.read_answer()?.as_deref() {
                Some("1") => return Ok(Some(Mode::TimedEnglish)),
                Some("2") => return Ok(Some(Mode::NumberedChinese)),
                None => return Ok(None),
                Some(_) if attempt < MAX_MENU_RETRIES => self.say(RETRY)?,
                Some(_) => (),
            }
        }
        self.say(FAREWELL)?;
        Ok(None)
    }

    fn ingest(&mut self, mode: Mode) -> Result<IngestReport> {
        let label = match mode {
            Mode::TimedEnglish => "Option 1 (Timestamp and English)",
            Mode::NumberedChinese => "Option 2 (Number and Chinese)",
        };
        self.say(&format!(
            "Paste your lines for {}. Press Ctrl-D (macOS/Linux) or Ctrl-Z then Enter (Windows) to finish:",
            label
        ))?;
        let lines = ingest::read_block(&mut self.input)?;

        let report = match mode {
            Mode::TimedEnglish => {
                let report = ingest::ingest_timed_lines(self.store, &lines, &mut self.output)?;
                self.say(&format!(
                    "Added Option 1 entries. ({} added, {} skipped)",
                    report.accepted, report.skipped
                ))?;
                report
            }
            Mode::NumberedChinese => {
                let report = ingest::ingest_translations(self.store, &lines, &mut self.output)?;
                self.say(&format!(
                    "Updated Chinese text for matching numbers. ({} updated, {} skipped, {} not found)",
                    report.accepted, report.skipped, report.unknown_rows
                ))?;
                report
            }
        };
        Ok(report)
    }

    fn read_answer(&mut self) -> Result<Option<String>> {
        let answer = ingest::read_line_lossy(&mut self.input).context("Failed to read from stdin")?;
        Ok(answer.map(|a| a.trim().to_string()))
    }

    fn say(&mut self, msg: &str) -> Result<()> {
        writeln!(self.output, "{}", msg)?;
        self.output.flush()?;
        Ok(())
    }
}
