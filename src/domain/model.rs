use crate::utils::error::{DocCrewError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// SOW 合約類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SowType {
    FixedBid,
    TimeAndMaterials,
    ManagedCapacity,
    ManagedServices,
}

impl SowType {
    pub const ALL: [SowType; 4] = [
        SowType::FixedBid,
        SowType::TimeAndMaterials,
        SowType::ManagedCapacity,
        SowType::ManagedServices,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SowType::FixedBid => "Fixed Bid",
            SowType::TimeAndMaterials => "T&M (Time & Materials)",
            SowType::ManagedCapacity => "Managed Capacity",
            SowType::ManagedServices => "Managed Services / Support",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            SowType::FixedBid => "fixed-bid",
            SowType::TimeAndMaterials => "tm",
            SowType::ManagedCapacity => "managed-capacity",
            SowType::ManagedServices => "managed-services",
        }
    }

    /// 只有 T&M 與 Managed Capacity 需要填寫角色與費率
    pub fn collects_roles(&self) -> bool {
        matches!(self, SowType::TimeAndMaterials | SowType::ManagedCapacity)
    }
}

impl fmt::Display for SowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SowType {
    type Err = DocCrewError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        SowType::ALL
            .into_iter()
            .find(|t| {
                t.label().eq_ignore_ascii_case(wanted) || t.slug().eq_ignore_ascii_case(wanted)
            })
            .or_else(|| match wanted.to_ascii_lowercase().as_str() {
                "t&m" | "time-and-materials" => Some(SowType::TimeAndMaterials),
                "managed-services-support" | "support" => Some(SowType::ManagedServices),
                _ => None,
            })
            .ok_or_else(|| DocCrewError::InvalidConfigValueError {
                field: "sow_type".to_string(),
                value: s.to_string(),
                reason: format!(
                    "Unknown SOW type. Valid types: {}",
                    SowType::ALL
                        .iter()
                        .map(|t| format!("{} ({})", t.label(), t.slug()))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
    }
}

impl TryFrom<String> for SowType {
    type Error = DocCrewError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SowType> for String {
    fn from(value: SowType) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRate {
    pub role: String,
    pub rate: String,
}

impl RoleRate {
    pub fn new(role: impl Into<String>, rate: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            rate: rate.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.role.trim().is_empty() && !self.rate.trim().is_empty()
    }
}

/// SOW 表單：所有欄位都可能尚未填寫，送出前由 guard 檢查
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SowForm {
    pub project_title: Option<String>,
    pub client_name: Option<String>,
    pub project_description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: Option<String>,
    pub sow_type: Option<SowType>,
    #[serde(default)]
    pub roles: Vec<RoleRate>,
    /// heading -> 內容
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
}

/// 單一 crew task 的輸出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task: String,
    pub agent: String,
    pub raw: String,
    pub output_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewOutput {
    pub crew: String,
    pub tasks: Vec<TaskOutput>,
    /// 最後一個 task 的輸出
    pub raw: String,
}

impl CrewOutput {
    pub fn task(&self, name: &str) -> Option<&TaskOutput> {
        self.tasks.iter().find(|t| t.task == name)
    }
}

impl fmt::Display for CrewOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
