//! SOW 表單檔格式：
//!
//! ```toml
//! project_title = "Data Platform Migration"
//! client_name = "Acme Corp"
//! project_description = "Move the reporting stack to the cloud."
//! start_date = "2024-01-01"
//! end_date = "2024-06-30"
//! budget = "$250,000"
//! sow_type = "T&M (Time & Materials)"
//!
//! [[roles]]
//! role = "Data Engineer"
//! rate = "$120/h"
//!
//! [sections]
//! "Scope" = "Migrate 40 reports."
//! ```

use super::substitute_env_vars;
use crate::domain::model::{RoleRate, SowForm, SowType};
use crate::utils::error::{DocCrewError, Result};
use std::path::Path;

pub fn load_form<P: AsRef<Path>>(path: P) -> Result<SowForm> {
    let content = std::fs::read_to_string(&path).map_err(DocCrewError::IoError)?;
    form_from_toml_str(&content)
}

pub fn form_from_toml_str(content: &str) -> Result<SowForm> {
    let processed = substitute_env_vars(content);
    toml::from_str(&processed).map_err(|e| DocCrewError::ConfigValidationError {
        field: "form_toml_parsing".to_string(),
        message: format!("SOW form TOML parsing error: {}", e),
    })
}

/// 命令列提供的欄位；有值時覆蓋表單檔
#[derive(Debug, Clone, Default)]
pub struct FormOverrides {
    pub project_title: Option<String>,
    pub client_name: Option<String>,
    pub project_description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: Option<String>,
    pub sow_type: Option<String>,
    pub roles: Vec<(String, String)>,
    pub sections: Vec<(String, String)>,
}

impl FormOverrides {
    pub fn apply(self, form: &mut SowForm) -> Result<()> {
        let fields = [
            (&mut form.project_title, self.project_title),
            (&mut form.client_name, self.client_name),
            (&mut form.project_description, self.project_description),
            (&mut form.start_date, self.start_date),
            (&mut form.end_date, self.end_date),
            (&mut form.budget, self.budget),
        ];
        for (slot, value) in fields {
            if value.is_some() {
                *slot = value;
            }
        }

        if let Some(sow_type) = self.sow_type {
            form.sow_type = Some(sow_type.parse::<SowType>()?);
        }

        // 有 --role 時整組取代表單檔內的角色
        if !self.roles.is_empty() {
            form.roles = self
                .roles
                .into_iter()
                .map(|(role, rate)| RoleRate::new(role, rate))
                .collect();
        }

        for (heading, text) in self.sections {
            form.sections.insert(heading, text);
        }

        Ok(())
    }
}
