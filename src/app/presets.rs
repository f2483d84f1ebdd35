//! Built-in crews.
//!
//! Each preset is an embedded crew TOML (the same format `crew-run --crew`
//! reads), so a preset can be copied out and edited as a starting point.

use crate::config::crew_config::CrewConfig;
use crate::domain::model::CrewOutput;
use crate::domain::ports::Storage;
use crate::utils::error::{DocCrewError, Result};
use std::fmt;
use std::str::FromStr;

pub const GENERATED_CODE_TXT: &str = "generated_code.txt";
pub const GENERATED_CODE_CSV: &str = "generated_code.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    VideoToBlog,
    PythonWriter,
    ResumeWriter,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::VideoToBlog, Preset::PythonWriter, Preset::ResumeWriter];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::VideoToBlog => "video-to-blog",
            Preset::PythonWriter => "python-writer",
            Preset::ResumeWriter => "resume-writer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Preset::VideoToBlog => "YouTube channel research -> LinkedIn post, tweet and blog post",
            Preset::PythonWriter => "requirements -> plan -> Python code -> review",
            Preset::ResumeWriter => "job posting analysis -> tailored resume",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Preset::VideoToBlog => include_str!("../../presets/video-to-blog.toml"),
            Preset::PythonWriter => include_str!("../../presets/python-writer.toml"),
            Preset::ResumeWriter => include_str!("../../presets/resume-writer.toml"),
        }
    }

    pub fn config(&self) -> Result<CrewConfig> {
        let config = CrewConfig::from_toml_str(self.source())?;
        config.validate()?;
        Ok(config)
    }

    /// kickoff 之後的額外輸出，回傳寫入的路徑
    pub async fn post_process<S: Storage>(&self, storage: &S, output: &CrewOutput) -> Result<Vec<String>> {
        match self {
            Preset::PythonWriter => write_generated_code(storage, &output.raw).await,
            Preset::VideoToBlog | Preset::ResumeWriter => Ok(Vec::new()),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = DocCrewError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Preset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(wanted) || p.name().replace('-', "_") == wanted)
            .ok_or_else(|| DocCrewError::InvalidConfigValueError {
                field: "preset".to_string(),
                value: s.to_string(),
                reason: format!(
                    "Unknown preset. Available: {}",
                    Preset::ALL.map(|p| p.name()).join(", ")
                ),
            })
    }
}

/// 整段輸出放在單一欄位、單一列的 CSV
pub fn single_cell_csv(text: &str) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([text])?;
    writer
        .into_inner()
        .map_err(|e| DocCrewError::IoError(e.into_error()))
}

pub async fn write_generated_code<S: Storage>(storage: &S, code: &str) -> Result<Vec<String>> {
    let txt = storage.write_file(GENERATED_CODE_TXT, code.as_bytes()).await?;
    let csv = storage.write_file(GENERATED_CODE_CSV, &single_cell_csv(code)?).await?;
    tracing::info!("💾 Generated code saved to {} and {}", txt, csv);
    Ok(vec![txt, csv])
}
