use crate::domain::model::{RoleRate, SowForm, SowType};
use crate::utils::error::{DocCrewError, Result};
use crate::utils::validation::parse_date;
use chrono::NaiveDate;

pub const SYSTEM_PROMPT: &str = "You are an expert in generating Statements of Work (SOW).";

const FIXED_BID: &[&str] = &[
    "Legal Entity",
    "Description of Project",
    "Scope",
    "Services Included",
    "Deliverables",
    "Start and End Date",
    "Milestone",
    "Payment / Invoice Schedule",
    "Upfront 35% Invoicing",
    "IP or Licenses Secured/Procured by G10X",
    "Passthrough Expenses",
    "Governance Model",
    "Out of Scope",
    "Assumptions",
    "Dependencies",
    "Warranty",
    "Early Exit / Termination Clause",
    "Change Management",
    "Signatory (based on location)",
];

const TIME_AND_MATERIALS: &[&str] = &[
    "Legal Entity",
    "Description of Project",
    "Scope",
    "Services Included",
    "Deliverables",
    "Start and End Date",
    "Team Structure (Location & Headcount)",
    "Rate Card",
    "Payment / Invoice Schedule",
    "Upfront 35% Invoicing",
    "IP or Licenses Secured/Procured by G10X",
    "Passthrough Expenses",
    "Governance Model",
    "Out of Scope",
    "Assumptions",
    "Dependencies",
    "Change Management",
    "Warranty",
    "Early Exit / Termination Clause",
    "Signatory (based on location)",
];

const MANAGED_CAPACITY: &[&str] = &[
    "Legal Entity",
    "Description of Project",
    "Scope",
    "Services Included",
    "Deliverables",
    "Start and End Date",
    "Team Structure (Location & Headcount)",
    "Metrics, KPIs",
    "Rate Card",
    "Capacity Fee",
    "Payment / Invoice Schedule",
    "Upfront 35% Invoicing",
    "IP or Licenses Secured/Procured by G10X",
    "Passthrough Expenses",
    "Governance Model",
    "Out of Scope",
    "Assumptions",
    "Dependencies",
    "Change Management",
    "Warranty",
    "Early Exit / Termination Clause",
    "Signatory (based on location)",
];

const MANAGED_SERVICES: &[&str] = &[
    "Legal Entity",
    "Description of Project",
    "Scope",
    "Services Included",
    "Deliverables",
    "Start and End Date",
    "SLA",
    "Payment / Invoice Schedule",
    "Upfront 35% Invoicing",
    "IP or Licenses Secured/Procured by G10X",
    "Passthrough Expenses",
    "Governance Model",
    "Out of Scope",
    "Assumptions",
    "Dependencies",
    "Change Management",
    "Warranty",
    "Early Exit / Termination Clause",
    "Signatory (based on location)",
    "Penalty / Service Credit",
    "Metrics, KPIs",
    "Capacity Fee",
];

/// 各 SOW 類型的段落標題，依宣告順序
pub fn headings(sow_type: SowType) -> &'static [&'static str] {
    match sow_type {
        SowType::FixedBid => FIXED_BID,
        SowType::TimeAndMaterials => TIME_AND_MATERIALS,
        SowType::ManagedCapacity => MANAGED_CAPACITY,
        SowType::ManagedServices => MANAGED_SERVICES,
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

/// 回傳尚未填寫的必填欄位名稱，依表單順序
pub fn missing_fields(form: &SowForm) -> Vec<&'static str> {
    let mut missing = Vec::new();
    let text_fields = [
        ("Project Title", &form.project_title),
        ("Client Name", &form.client_name),
        ("Project Description", &form.project_description),
        ("Start Date", &form.start_date),
        ("End Date", &form.end_date),
        ("Budget", &form.budget),
    ];
    for (label, value) in text_fields {
        if is_blank(value) {
            missing.push(label);
        }
    }
    if form.sow_type.is_none() {
        missing.push("SOW Type");
    }
    missing
}

/// 通過檢查、可以組 prompt 的表單
#[derive(Debug, Clone, PartialEq)]
pub struct SowRequest {
    pub project_title: String,
    pub client_name: String,
    pub project_description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: String,
    pub sow_type: SowType,
    /// 只保留完整填寫的角色；非 T&M / Managed Capacity 時為空
    pub roles: Vec<RoleRate>,
    /// 依 heading 宣告順序排列，只包含非空白內容
    pub sections: Vec<(&'static str, String)>,
}

impl SowRequest {
    pub fn from_form(form: &SowForm) -> Result<Self> {
        let missing = missing_fields(form);
        if !missing.is_empty() {
            return Err(DocCrewError::MissingFields {
                fields: missing.into_iter().map(str::to_string).collect(),
            });
        }

        let text = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
        let sow_type = form.sow_type.ok_or_else(|| DocCrewError::MissingFields {
            fields: vec!["SOW Type".to_string()],
        })?;

        let start_date = parse_date("Start Date", &text(&form.start_date))?;
        let end_date = parse_date("End Date", &text(&form.end_date))?;
        if start_date > end_date {
            return Err(DocCrewError::ValidationError {
                message: format!(
                    "Start Date {} is after End Date {}",
                    start_date, end_date
                ),
            });
        }

        let roles = if sow_type.collects_roles() {
            form.roles
                .iter()
                .filter(|r| r.is_complete())
                .map(|r| RoleRate::new(r.role.trim(), r.rate.trim()))
                .collect()
        } else {
            if !form.roles.is_empty() {
                tracing::warn!(
                    "⚠️ Roles are only used for T&M and Managed Capacity SOWs; ignoring {} role(s)",
                    form.roles.len()
                );
            }
            Vec::new()
        };

        let table = headings(sow_type);
        for heading in form.sections.keys() {
            if !table.contains(&heading.as_str()) {
                tracing::warn!(
                    "⚠️ Section '{}' is not part of a {} SOW; ignoring it",
                    heading,
                    sow_type
                );
            }
        }
        let sections = table
            .iter()
            .filter_map(|heading| {
                form.sections
                    .get(*heading)
                    .map(|body| body.trim())
                    .filter(|body| !body.is_empty())
                    .map(|body| (*heading, body.to_string()))
            })
            .collect();

        Ok(Self {
            project_title: text(&form.project_title),
            client_name: text(&form.client_name),
            project_description: text(&form.project_description),
            start_date,
            end_date,
            budget: text(&form.budget),
            sow_type,
            roles,
            sections,
        })
    }

    /// Word 檔名：`SOW_<title>.docx`，空白與路徑字元換成底線
    pub fn file_name(&self) -> String {
        let title: String = self
            .project_title
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_whitespace() || c.is_control() => '_',
                c => c,
            })
            .collect();
        format!("SOW_{}.docx", title)
    }
}

/// 組出送給模型的 user prompt
pub fn build_prompt(request: &SowRequest) -> String {
    let mut prompt = format!(
        "You are an expert in generating Statements of Work (SOW). Based on the following information, \
         create a comprehensive and professional SOW for a {} engagement:\n\n",
        request.sow_type.label()
    );

    prompt.push_str(&format!("Project Title: {}\n", request.project_title));
    prompt.push_str(&format!("Client Name: {}\n", request.client_name));
    prompt.push_str(&format!("Project Description: {}\n", request.project_description));
    prompt.push_str(&format!("Start Date: {}\n", request.start_date));
    prompt.push_str(&format!("End Date: {}\n", request.end_date));
    prompt.push_str(&format!("Budget: {}\n\n", request.budget));

    if request.sow_type.collects_roles() {
        prompt.push_str("The following roles are involved:\n");
        for role in &request.roles {
            prompt.push_str(&format!("- {}: {}\n", role.role, role.rate));
        }
        prompt.push('\n');
    }

    for (heading, body) in &request.sections {
        prompt.push_str(&format!("{}: {}\n", heading, body));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn filled_form(sow_type: SowType) -> SowForm {
        SowForm {
            project_title: Some("Data Platform Revamp".to_string()),
            client_name: Some("Acme Corp".to_string()),
            project_description: Some("Migrate the warehouse to a lakehouse".to_string()),
            start_date: Some("2024-09-01".to_string()),
            end_date: Some("2025-03-31".to_string()),
            budget: Some("$250,000".to_string()),
            sow_type: Some(sow_type),
            ..Default::default()
        }
    }

    #[test]
    fn test_heading_tables_have_no_duplicates() {
        for sow_type in SowType::ALL {
            let table = headings(sow_type);
            let unique: HashSet<_> = table.iter().collect();
            assert_eq!(unique.len(), table.len(), "duplicate heading in {}", sow_type);
        }
    }

    #[test]
    fn test_heading_tables_match_declared_lists() {
        assert_eq!(
            headings(SowType::FixedBid),
            [
                "Legal Entity",
                "Description of Project",
                "Scope",
                "Services Included",
                "Deliverables",
                "Start and End Date",
                "Milestone",
                "Payment / Invoice Schedule",
                "Upfront 35% Invoicing",
                "IP or Licenses Secured/Procured by G10X",
                "Passthrough Expenses",
                "Governance Model",
                "Out of Scope",
                "Assumptions",
                "Dependencies",
                "Warranty",
                "Early Exit / Termination Clause",
                "Change Management",
                "Signatory (based on location)",
            ]
        );
        assert_eq!(
            headings(SowType::TimeAndMaterials),
            [
                "Legal Entity",
                "Description of Project",
                "Scope",
                "Services Included",
                "Deliverables",
                "Start and End Date",
                "Team Structure (Location & Headcount)",
                "Rate Card",
                "Payment / Invoice Schedule",
                "Upfront 35% Invoicing",
                "IP or Licenses Secured/Procured by G10X",
                "Passthrough Expenses",
                "Governance Model",
                "Out of Scope",
                "Assumptions",
                "Dependencies",
                "Change Management",
                "Warranty",
                "Early Exit / Termination Clause",
                "Signatory (based on location)",
            ]
        );
        assert_eq!(
            headings(SowType::ManagedCapacity),
            [
                "Legal Entity",
                "Description of Project",
                "Scope",
                "Services Included",
                "Deliverables",
                "Start and End Date",
                "Team Structure (Location & Headcount)",
                "Metrics, KPIs",
                "Rate Card",
                "Capacity Fee",
                "Payment / Invoice Schedule",
                "Upfront 35% Invoicing",
                "IP or Licenses Secured/Procured by G10X",
                "Passthrough Expenses",
                "Governance Model",
                "Out of Scope",
                "Assumptions",
                "Dependencies",
                "Change Management",
                "Warranty",
                "Early Exit / Termination Clause",
                "Signatory (based on location)",
            ]
        );
        assert_eq!(
            headings(SowType::ManagedServices),
            [
                "Legal Entity",
                "Description of Project",
                "Scope",
                "Services Included",
                "Deliverables",
                "Start and End Date",
                "SLA",
                "Payment / Invoice Schedule",
                "Upfront 35% Invoicing",
                "IP or Licenses Secured/Procured by G10X",
                "Passthrough Expenses",
                "Governance Model",
                "Out of Scope",
                "Assumptions",
                "Dependencies",
                "Change Management",
                "Warranty",
                "Early Exit / Termination Clause",
                "Signatory (based on location)",
                "Penalty / Service Credit",
                "Metrics, KPIs",
                "Capacity Fee",
            ]
        );
    }

    #[test]
    fn test_rendered_sections_equal_heading_table() {
        const BODY: &str = "filled in";
        for sow_type in SowType::ALL {
            let mut form = filled_form(sow_type);
            for heading in headings(sow_type) {
                form.sections.insert(heading.to_string(), BODY.to_string());
            }

            let prompt = build_prompt(&SowRequest::from_form(&form).unwrap());
            let rendered: Vec<&str> = prompt
                .lines()
                .filter_map(|line| line.strip_suffix(&format!(": {}", BODY)))
                .collect();

            assert_eq!(rendered, headings(sow_type), "sections of {}", sow_type);
        }
    }

    #[test]
    fn test_missing_fields_in_form_order() {
        let mut form = filled_form(SowType::FixedBid);
        form.client_name = Some("   ".to_string());
        form.budget = None;
        form.sow_type = None;

        assert_eq!(missing_fields(&form), vec!["Client Name", "Budget", "SOW Type"]);
        assert!(missing_fields(&filled_form(SowType::FixedBid)).is_empty());
    }

    #[test]
    fn test_from_form_rejects_missing_fields() {
        let form = SowForm::default();
        match SowRequest::from_form(&form) {
            Err(DocCrewError::MissingFields { fields }) => assert_eq!(fields.len(), 7),
            other => panic!("expected MissingFields, got {:?}", other),
        }
    }

    #[test]
    fn test_from_form_rejects_inverted_dates() {
        let mut form = filled_form(SowType::FixedBid);
        form.start_date = Some("2025-06-01".to_string());
        assert!(matches!(
            SowRequest::from_form(&form),
            Err(DocCrewError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_prompt_contains_each_field_once_in_order() {
        let mut form = filled_form(SowType::FixedBid);
        form.sections.insert("Warranty".to_string(), "90 days".to_string());
        form.sections.insert("Scope".to_string(), "Ingestion and reporting".to_string());
        form.sections.insert("Assumptions".to_string(), "   ".to_string());

        let request = SowRequest::from_form(&form).unwrap();
        let prompt = build_prompt(&request);

        let expected = [
            "Project Title: Data Platform Revamp",
            "Client Name: Acme Corp",
            "Project Description: Migrate the warehouse to a lakehouse",
            "Start Date: 2024-09-01",
            "End Date: 2025-03-31",
            "Budget: $250,000",
            "Scope: Ingestion and reporting",
            "Warranty: 90 days",
        ];
        let mut last = 0;
        for line in expected {
            assert_eq!(prompt.matches(line).count(), 1, "'{}' should appear once", line);
            let pos = prompt.find(line).unwrap();
            assert!(pos >= last, "'{}' out of order", line);
            last = pos;
        }
        assert!(!prompt.contains("Assumptions:"));
        assert!(!prompt.contains("roles are involved"));
        assert!(prompt.contains("for a Fixed Bid engagement"));
    }

    #[test]
    fn test_prompt_lists_roles_for_time_and_materials() {
        let mut form = filled_form(SowType::TimeAndMaterials);
        form.roles = vec![
            RoleRate::new("Data Engineer", "$120/hour"),
            RoleRate::new("Architect", ""),
            RoleRate::new("Project Manager", "$100/hour"),
        ];

        let request = SowRequest::from_form(&form).unwrap();
        assert_eq!(request.roles.len(), 2);

        let prompt = build_prompt(&request);
        assert!(prompt.contains(
            "The following roles are involved:\n- Data Engineer: $120/hour\n- Project Manager: $100/hour\n\n"
        ));
        assert!(!prompt.contains("Architect"));
    }

    #[test]
    fn test_sections_outside_the_table_are_ignored() {
        let mut form = filled_form(SowType::FixedBid);
        form.sections.insert("SLA".to_string(), "99.9% uptime".to_string());

        let request = SowRequest::from_form(&form).unwrap();
        assert!(request.sections.is_empty());
        assert!(!build_prompt(&request).contains("99.9% uptime"));
    }

    #[test]
    fn test_file_name() {
        let request = SowRequest::from_form(&filled_form(SowType::FixedBid)).unwrap();
        assert_eq!(request.file_name(), "SOW_Data_Platform_Revamp.docx");
    }

    #[test]
    fn test_file_name_strips_path_separators() {
        let mut form = filled_form(SowType::FixedBid);
        form.project_title = Some("A/B ../Test".to_string());
        let request = SowRequest::from_form(&form).unwrap();
        assert_eq!(request.file_name(), "SOW_A_B_.._Test.docx");

        form.project_title = Some("x\\..\\..\\y: draft".to_string());
        let name = SowRequest::from_form(&form).unwrap().file_name();
        assert_eq!(name, "SOW_x_.._.._y__draft.docx");
        assert!(!name.contains('/') && !name.contains('\\'));
    }
}
