pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::cli::LocalStorage;
#[cfg(feature = "cli")]
pub use config::{CrewRunCli, SowCli};

pub use adapters::llm::{GeminiProvider, OpenAiProvider, ProviderKind, RetryPolicy};
pub use app::{presets::Preset, sow_generator::SowGenerator};
pub use config::{crew_config::CrewConfig, settings::Settings};
pub use core::crew::{Agent, Crew, Task};
pub use domain::model::{CrewOutput, SowForm, SowType, TaskOutput};
pub use utils::error::{DocCrewError, Result};
