// 🙋 Operator Selections - ask once, replay forever
//
// Anything the tool cannot infer on its own (which column is the open date,
// which of several tickers a CUSIP means) goes through a Chooser.
//
//   ReplayChooser            answers from a previous run's selections CSV
//     └─ InteractivePrompt   asks the operator on the terminal
//
// New answers are recorded so the next run over the same inputs is silent.

use crate::error::{AnalysisError, Result};
use anyhow::Context as AnyhowContext;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

// ============================================================================
// CHOOSER CAPABILITY
// ============================================================================

pub trait Chooser {
    /// Pick one of `options`, returning its index
    fn choose(&self, prompt: &str, options: &[String]) -> Result<usize>;

    /// Free-form answer (e.g. typing a ticker nobody could find)
    fn enter(&self, prompt: &str) -> Result<String> {
        Err(AnalysisError::AmbiguousResolution(format!(
            "no operator available to answer '{}'",
            prompt
        )))
    }
}

/// Batch mode: every question is an error
#[derive(Debug, Default)]
pub struct NonInteractive;

impl Chooser for NonInteractive {
    fn choose(&self, prompt: &str, options: &[String]) -> Result<usize> {
        Err(AnalysisError::AmbiguousResolution(format!(
            "no operator available to answer '{}' (options: {})",
            prompt,
            options.join(", ")
        )))
    }
}

impl<C: Chooser + ?Sized> Chooser for Box<C> {
    fn choose(&self, prompt: &str, options: &[String]) -> Result<usize> {
        (**self).choose(prompt, options)
    }

    fn enter(&self, prompt: &str) -> Result<String> {
        (**self).enter(prompt)
    }
}

// ============================================================================
// INTERACTIVE PROMPT
// ============================================================================

/// Asks on a reader/writer pair (stdin/stdout in the binary)
pub struct InteractivePrompt<R: BufRead, W: Write> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl<R: BufRead, W: Write> InteractivePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        InteractivePrompt {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    fn read_line(&self, prompt: &str) -> Result<String> {
        let mut line = String::new();
        let read = self.input.borrow_mut().read_line(&mut line)?;
        if read == 0 {
            return Err(AnalysisError::AmbiguousResolution(format!(
                "input closed while waiting for an answer to '{}'",
                prompt
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl InteractivePrompt<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Chooser for InteractivePrompt<R, W> {
    fn choose(&self, prompt: &str, options: &[String]) -> Result<usize> {
        if options.is_empty() {
            return Err(AnalysisError::AmbiguousResolution(format!(
                "nothing to choose from for '{}'",
                prompt
            )));
        }

        {
            let mut out = self.output.borrow_mut();
            writeln!(out, "{}", prompt)?;
            for (idx, option) in options.iter().enumerate() {
                writeln!(out, " [{}]: {}", idx, option)?;
            }
            out.flush()?;
        }

        loop {
            let answer = self.read_line(prompt)?;
            match answer.trim().parse::<usize>() {
                Ok(idx) if idx < options.len() => return Ok(idx),
                _ => {
                    let mut out = self.output.borrow_mut();
                    write!(out, "Invalid, try again: ")?;
                    out.flush()?;
                }
            }
        }
    }

    fn enter(&self, prompt: &str) -> Result<String> {
        {
            let mut out = self.output.borrow_mut();
            write!(out, "{} ", prompt)?;
            out.flush()?;
        }
        self.read_line(prompt)
    }
}

// ============================================================================
// REPLAY DECORATOR
// ============================================================================

/// One recorded answer. `sequence` is the options joined with ';'
/// (empty for free-form answers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub prompt: String,
    pub sequence: String,
    pub selection: String,
}

pub struct ReplayChooser<C: Chooser> {
    inner: C,
    records: RefCell<Vec<SelectionRecord>>,
    made_new_selection: Cell<bool>,
}

impl<C: Chooser> ReplayChooser<C> {
    pub fn new(inner: C) -> Self {
        ReplayChooser {
            inner,
            records: RefCell::new(Vec::new()),
            made_new_selection: Cell::new(false),
        }
    }

    /// Import a selections CSV from an earlier run
    pub fn load(&self, path: &Path) -> anyhow::Result<usize> {
        tracing::info!("Importing selections file {}", path.display());
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open selections file: {}", path.display()))?;

        let mut imported = 0;
        for (line_num, row) in reader.deserialize::<SelectionRecord>().enumerate() {
            match row {
                Ok(record) => {
                    self.records.borrow_mut().push(record);
                    imported += 1;
                }
                Err(e) => tracing::warn!(
                    "Selection on line {} of {} is missing a prompt, sequence or selection and will not be imported: {}",
                    line_num + 2,
                    path.display(),
                    e
                ),
            }
        }

        Ok(imported)
    }

    /// Write the selections CSV, but only if this run asked something new.
    ///
    /// Returns the written path.
    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
        let records = self.records.borrow();
        if records.is_empty() || !self.made_new_selection.get() {
            tracing::debug!("There were no new selections to record");
            return Ok(None);
        }

        let path = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(default_selections_filename()),
        };

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create selections file: {}", path.display()))?;
        for record in records.iter() {
            writer.serialize(record)?;
        }
        writer.flush()?;

        tracing::info!(
            "Wrote selections to {}. They can be reused with --selections",
            path.display()
        );
        Ok(Some(path))
    }

    pub fn records(&self) -> Vec<SelectionRecord> {
        self.records.borrow().clone()
    }

    pub fn made_new_selection(&self) -> bool {
        self.made_new_selection.get()
    }

    fn lookup(&self, prompt: &str, sequence: &str) -> Result<Option<String>> {
        let hits: Vec<String> = self
            .records
            .borrow()
            .iter()
            .filter(|r| r.prompt == prompt && r.sequence == sequence)
            .map(|r| r.selection.clone())
            .collect();

        match hits.len() {
            0 => Ok(None),
            1 => Ok(hits.into_iter().next()),
            _ => {
                let msg = format!(
                    "Found multiple records for query '{}' with selections '{}'",
                    prompt, sequence
                );
                tracing::warn!("{}", msg);
                let idx = self.choose(&msg, &hits)?;
                Ok(Some(hits[idx].clone()))
            }
        }
    }

    fn record(&self, prompt: &str, sequence: String, selection: String) {
        self.made_new_selection.set(true);
        self.records.borrow_mut().push(SelectionRecord {
            prompt: prompt.to_string(),
            sequence,
            selection,
        });
    }
}

impl<C: Chooser> Chooser for ReplayChooser<C> {
    fn choose(&self, prompt: &str, options: &[String]) -> Result<usize> {
        let sequence = options.join(";");

        if let Some(previous) = self.lookup(prompt, &sequence)? {
            if let Some(idx) = options.iter().position(|o| *o == previous) {
                tracing::debug!("Using previously supplied answer '{}' to prompt '{}'", previous, prompt);
                return Ok(idx);
            }
            tracing::warn!(
                "Recorded answer '{}' to '{}' is not among the options; asking again",
                previous,
                prompt
            );
        }

        let idx = self.inner.choose(prompt, options)?;
        self.record(prompt, sequence, options[idx].clone());
        Ok(idx)
    }

    fn enter(&self, prompt: &str) -> Result<String> {
        if let Some(previous) = self.lookup(prompt, "")? {
            tracing::debug!("Using previously supplied answer '{}' to prompt '{}'", previous, prompt);
            return Ok(previous);
        }

        let answer = self.inner.enter(prompt)?;
        self.record(prompt, String::new(), answer.clone());
        Ok(answer)
    }
}

fn default_selections_filename() -> String {
    format!("selections_{}.csv", Local::now().format("%Y-%m-%d_%H-%M"))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn options(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn prompt_with(input: &str) -> InteractivePrompt<Cursor<Vec<u8>>, Vec<u8>> {
        InteractivePrompt::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_interactive_reasks_until_valid() {
        let prompt = prompt_with("abc\n7\n1\n");
        let idx = prompt.choose("Which column?", &options(&["Open", "Close"])).unwrap();
        assert_eq!(idx, 1);

        let printed = String::from_utf8(prompt.output.borrow().clone()).unwrap();
        assert!(printed.contains(" [0]: Open"));
        assert!(printed.contains("Invalid, try again"));
    }

    #[test]
    fn test_interactive_eof_is_ambiguous() {
        let prompt = prompt_with("");
        let result = prompt.choose("Which column?", &options(&["Open"]));
        assert!(matches!(result, Err(AnalysisError::AmbiguousResolution(_))));
    }

    #[test]
    fn test_non_interactive_always_fails() {
        assert!(NonInteractive.choose("q", &options(&["a"])).is_err());
        assert!(NonInteractive.enter("q").is_err());
    }

    #[test]
    fn test_replay_records_and_reuses() {
        let replay = ReplayChooser::new(prompt_with("1\n"));
        let opts = options(&["Date Acquired", "Date Sold"]);

        assert_eq!(replay.choose("Open date?", &opts).unwrap(), 1);
        // inner prompt has no more input: a second ask would fail
        assert_eq!(replay.choose("Open date?", &opts).unwrap(), 1);
        assert!(replay.made_new_selection());
        assert_eq!(
            replay.records(),
            vec![SelectionRecord {
                prompt: "Open date?".into(),
                sequence: "Date Acquired;Date Sold".into(),
                selection: "Date Sold".into(),
            }]
        );
    }

    #[test]
    fn test_replay_requires_exact_options() {
        let replay = ReplayChooser::new(NonInteractive);
        replay.records.borrow_mut().push(SelectionRecord {
            prompt: "Open date?".into(),
            sequence: "A;B".into(),
            selection: "B".into(),
        });

        assert_eq!(replay.choose("Open date?", &options(&["A", "B"])).unwrap(), 1);
        assert!(replay.choose("Open date?", &options(&["A", "B", "C"])).is_err());
        assert!(!replay.made_new_selection());
    }

    #[test]
    fn test_replay_free_form_answer() {
        let replay = ReplayChooser::new(prompt_with("XYZ\n"));
        assert_eq!(replay.enter("Ticker for 000000000?").unwrap(), "XYZ");
        assert_eq!(replay.enter("Ticker for 000000000?").unwrap(), "XYZ");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("divreq-selections-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("selections.csv");

        let first = ReplayChooser::new(prompt_with("0\n"));
        first.choose("Close date?", &options(&["Sold", "Acquired"])).unwrap();
        let written = first.save(Some(&path)).unwrap();
        assert_eq!(written.as_deref(), Some(path.as_path()));

        let second = ReplayChooser::new(NonInteractive);
        assert_eq!(second.load(&path).unwrap(), 1);
        assert_eq!(second.choose("Close date?", &options(&["Sold", "Acquired"])).unwrap(), 0);

        // nothing new was asked: no file written
        assert_eq!(second.save(Some(&dir.join("unused.csv"))).unwrap(), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
