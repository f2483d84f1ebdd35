pub mod cli;
pub mod crew_config;
pub mod form;
pub mod settings;

use crate::utils::error::{DocCrewError, Result};
use regex::Regex;
use std::sync::OnceLock;

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static env var regex"))
}

/// 替換 `${VAR}` 環境變數；找不到的變數保留原樣
pub fn substitute_env_vars(content: &str) -> String {
    substitute_with(content, |name| std::env::var(name).ok())
}

pub fn substitute_with<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            lookup(var_name).unwrap_or_else(|| format!("${{{}}}", var_name))
        })
        .into_owned()
}

/// 仍是 `${VAR}` 形式代表環境變數沒有設定
pub fn is_unresolved(value: &str) -> bool {
    env_var_pattern().is_match(value)
}

/// 解析 `KEY=VALUE`，只以第一個 `=` 切開
pub fn parse_key_value(s: &str) -> Result<(String, String)> {
    let (key, value) = s.split_once('=').ok_or_else(|| DocCrewError::InvalidConfigValueError {
        field: "KEY=VALUE".to_string(),
        value: s.to_string(),
        reason: "expected KEY=VALUE".to_string(),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(DocCrewError::InvalidConfigValueError {
            field: "KEY=VALUE".to_string(),
            value: s.to_string(),
            reason: "key must not be empty".to_string(),
        });
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "doc-crew")]
#[command(about = "Generate a Statement of Work (.docx) with a hosted language model")]
pub struct SowCli {
    #[arg(long, help = "TOML file with SOW form fields")]
    pub form: Option<PathBuf>,

    #[arg(long, help = "Project title")]
    pub title: Option<String>,

    #[arg(long, help = "Client name")]
    pub client: Option<String>,

    #[arg(long, help = "Project description")]
    pub description: Option<String>,

    #[arg(long, help = "Start date (YYYY-MM-DD)")]
    pub start_date: Option<String>,

    #[arg(long, help = "End date (YYYY-MM-DD)")]
    pub end_date: Option<String>,

    #[arg(long)]
    pub budget: Option<String>,

    #[arg(long, help = "fixed-bid, tm, managed-capacity or managed-services")]
    pub sow_type: Option<String>,

    #[arg(long = "role", value_name = "ROLE=RATE", value_parser = parse_key_value)]
    pub roles: Vec<(String, String)>,

    #[arg(long = "section", value_name = "HEADING=TEXT", value_parser = parse_key_value)]
    pub sections: Vec<(String, String)>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, help = "Settings TOML (API keys, models, retry)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Print the section headings for --sow-type (or every type) and exit")]
    pub list_headings: bool,

    #[arg(long, help = "Print the prompt without calling the model")]
    pub dry_run: bool,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl SowCli {
    /// 載入 `--form` 檔案後以命令列參數覆蓋
    pub fn to_form(&self) -> Result<crate::domain::model::SowForm> {
        let mut form = match &self.form {
            Some(path) => form::load_form(path)?,
            None => crate::domain::model::SowForm::default(),
        };

        form::FormOverrides {
            project_title: self.title.clone(),
            client_name: self.client.clone(),
            project_description: self.description.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            budget: self.budget.clone(),
            sow_type: self.sow_type.clone(),
            roles: self.roles.clone(),
            sections: self.sections.clone(),
        }
        .apply(&mut form)?;

        Ok(form)
    }
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "crew-run")]
#[command(about = "Run a sequential agent crew from a preset or a TOML file")]
pub struct CrewRunCli {
    #[arg(long, conflicts_with = "crew", help = "video-to-blog, python-writer or resume-writer")]
    pub preset: Option<String>,

    #[arg(long, help = "Crew definition TOML")]
    pub crew: Option<PathBuf>,

    #[arg(long = "input", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub inputs: Vec<(String, String)>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, help = "Settings TOML (API keys, models, retry)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "List built-in presets and exit")]
    pub list_presets: bool,

    #[arg(long, help = "Print the planned tasks and prompts without calling the model")]
    pub dry_run: bool,

    #[arg(long, help = "Log elapsed time and memory per task")]
    pub monitor: bool,

    #[arg(long, help = "Print the crew output as JSON")]
    pub json: bool,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,
}
