// ⚙️ Analysis configuration - JSON file, every field defaulted
//
// {
//   "tax_year": 2023,
//   "date_formats": ["%Y-%m-%d", "%m/%d/%Y"],
//   "output_dir": "reports",
//   "exdates_file": "exdates.json"
// }

use crate::parser::ParseOptions;
use anyhow::{Context as AnyhowContext, Result};
use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Tax year whose exdates are fetched
    pub tax_year: i32,

    /// chrono formats tried in order when reading dates
    pub date_formats: Vec<String>,

    /// Where the adjusted dividends CSV is written
    pub output_dir: PathBuf,

    /// Previous run's operator selections
    pub selections_file: Option<PathBuf>,

    /// Offline exdate table (skips Yahoo)
    pub exdates_file: Option<PathBuf>,

    /// Offline cusip,symbol map (skips Yahoo)
    pub symbols_file: Option<PathBuf>,

    /// Extra dividend type rules
    pub type_rules_file: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            tax_year: Local::now().year() - 1,
            date_formats: ParseOptions::default().date_formats,
            output_dir: PathBuf::from("."),
            selections_file: None,
            exdates_file: None,
            symbols_file: None,
            type_rules_file: None,
        }
    }
}

impl AnalysisConfig {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AnalysisConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        if config.date_formats.is_empty() {
            anyhow::bail!("Config {:?} lists no date formats", path.as_ref());
        }
        Ok(config)
    }

    /// File config when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::with_date_formats(self.date_formats.clone())
    }

    /// True when exdates come from a file rather than a live lookup
    pub fn is_offline(&self) -> bool {
        self.exdates_file.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("divreq-config-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.tax_year, Local::now().year() - 1);
        assert_eq!(config.date_formats, vec!["%Y-%m-%d", "%m/%d/%Y"]);
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert!(!config.is_offline());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = write_config(r#"{"tax_year": 2023, "exdates_file": "exdates.json"}"#);
        let config = AnalysisConfig::from_file(&path).unwrap();

        assert_eq!(config.tax_year, 2023);
        assert_eq!(config.exdates_file, Some(PathBuf::from("exdates.json")));
        assert_eq!(config.date_formats, AnalysisConfig::default().date_formats);
        assert!(config.is_offline());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_date_formats_rejected() {
        let path = write_config(r#"{"date_formats": []}"#);
        assert!(AnalysisConfig::from_file(&path).is_err());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_without_path() {
        assert_eq!(AnalysisConfig::load(None).unwrap(), AnalysisConfig::default());
    }
}
