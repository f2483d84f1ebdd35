use super::settings::Settings;
use super::substitute_env_vars;
use crate::adapters::llm::ProviderKind;
use crate::adapters::tools::{build_tool, ToolSpec};
use crate::core::crew::{system_prompt, task_prompt, Agent, Crew, PlannedTask, Process, Task};
use crate::core::template::{interpolate, placeholders};
use crate::domain::ports::{LlmProvider, Storage, Tool};
use crate::utils::error::{DocCrewError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_relative_file, Validate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewConfig {
    pub crew: CrewInfo,
    pub agents: Vec<AgentDefinition>,
    pub tasks: Vec<TaskDefinition>,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewInfo {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub process: Process,
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    pub max_tokens: Option<u32>,
    // 以下欄位只為相容而接受，執行時不使用
    pub memory: Option<bool>,
    pub cache: Option<bool>,
    pub max_rpm: Option<u32>,
    pub verbose: Option<bool>,
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    #[serde(default)]
    pub tools: Vec<String>, // [[tools]] 名稱
    #[serde(default)]
    pub allow_delegation: bool,
    pub llm: Option<ProviderKind>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent: String,
    pub context: Option<Vec<String>>, // 未設定時使用前一個 task
    pub output_file: Option<String>,
    pub tools: Option<Vec<String>>,
    pub tool_query: Option<String>,
    pub async_execution: Option<bool>,
}

impl AgentDefinition {
    /// 不含工具與 provider 的 agent
    fn to_agent(&self) -> Agent {
        let mut agent = Agent::new(&self.name, &self.role, &self.goal, &self.backstory)
            .with_delegation(self.allow_delegation);
        if let Some(model) = &self.model {
            agent = agent.with_model(model);
        }
        if let Some(temperature) = self.temperature {
            agent = agent.with_temperature(temperature);
        }
        agent
    }
}

impl TaskDefinition {
    fn to_task(&self) -> Task {
        let mut task = Task::new(&self.name, &self.description, &self.expected_output, &self.agent);
        if let Some(context) = &self.context {
            task = task.with_context(context.iter().cloned());
        }
        if let Some(output_file) = &self.output_file {
            task = task.with_output_file(output_file);
        }
        if let Some(query) = &self.tool_query {
            task = task.with_tool_query(query);
        }
        task
    }
}

impl CrewConfig {
    /// 從 TOML 檔案載入 crew 定義
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(DocCrewError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| DocCrewError::ConfigValidationError {
            field: "crew_toml_parsing".to_string(),
            message: format!("Crew TOML parsing error: {}", e),
        })
    }

    /// 驗證 crew 定義
    pub fn validate(&self) -> Result<()> {
        validate_non_empty_string("crew.name", &self.crew.name)?;

        if self.tasks.is_empty() {
            return Err(DocCrewError::ConfigValidationError {
                field: "tasks".to_string(),
                message: format!("Crew '{}' defines no tasks", self.crew.name),
            });
        }

        let tool_names = unique_names("tools.name", self.tools.iter().map(|t| t.name()))?;
        let agent_names = unique_names("agents.name", self.agents.iter().map(|a| a.name.as_str()))?;
        unique_names("tasks.name", self.tasks.iter().map(|t| t.name.as_str()))?;

        for agent in &self.agents {
            self.validate_tool_refs(&format!("agents.{}.tools", agent.name), &agent.tools, &tool_names)?;
            if let Some(temperature) = agent.temperature {
                crate::utils::validation::validate_range(
                    &format!("agents.{}.temperature", agent.name),
                    temperature,
                    0.0,
                    2.0,
                )?;
            }
        }

        // 驗證 task 的 agent、context 與輸出檔
        let mut earlier: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            if !agent_names.contains(task.agent.as_str()) {
                return Err(DocCrewError::ConfigValidationError {
                    field: format!("tasks.{}.agent", task.name),
                    message: format!("Agent '{}' not found in agents definition", task.agent),
                });
            }

            if let Some(context) = &task.context {
                for dep in context {
                    if !earlier.contains(dep.as_str()) {
                        return Err(DocCrewError::ConfigValidationError {
                            field: format!("tasks.{}.context", task.name),
                            message: format!(
                                "Context task '{}' must be defined before '{}'",
                                dep, task.name
                            ),
                        });
                    }
                }
            }

            if let Some(tools) = &task.tools {
                self.validate_tool_refs(&format!("tasks.{}.tools", task.name), tools, &tool_names)?;
            }

            if let Some(output_file) = &task.output_file {
                validate_relative_file(&format!("tasks.{}.output_file", task.name), output_file)?;
            }

            earlier.insert(task.name.as_str());
        }

        Ok(())
    }

    fn validate_tool_refs(&self, field: &str, refs: &[String], known: &HashSet<&str>) -> Result<()> {
        for name in refs {
            if !known.contains(name.as_str()) {
                return Err(DocCrewError::ConfigValidationError {
                    field: field.to_string(),
                    message: format!("Tool '{}' not found in tools definition", name),
                });
            }
        }
        Ok(())
    }

    /// 以命令列的 `--input` 覆蓋檔案中的預設值
    pub fn apply_inputs(&mut self, overrides: &[(String, String)]) {
        self.inputs.extend(overrides.iter().cloned());
    }

    /// prompt 或工具設定用到、但沒有提供的輸入
    pub fn missing_inputs(&self, inputs: &HashMap<String, String>) -> Vec<String> {
        let agent_texts = self
            .agents
            .iter()
            .flat_map(|a| [a.role.as_str(), a.goal.as_str(), a.backstory.as_str()]);
        let task_texts = self.tasks.iter().flat_map(|t| {
            [t.description.as_str(), t.expected_output.as_str()]
                .into_iter()
                .chain(t.tool_query.as_deref())
        });
        let tool_texts = self.tools.iter().flat_map(ToolSpec::templated_fields);
        agent_texts
            .chain(task_texts)
            .chain(tool_texts)
            .flat_map(placeholders)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|name| !inputs.contains_key(name))
            .collect()
    }

    fn log_compatibility_flags(&self) {
        let info = &self.crew;
        if info.memory.is_some() || info.cache.is_some() || info.max_rpm.is_some() || info.verbose.is_some() {
            tracing::debug!(
                "Crew '{}': memory={:?} cache={:?} max_rpm={:?} verbose={:?} are accepted but not used",
                info.name,
                info.memory,
                info.cache,
                info.max_rpm,
                info.verbose
            );
        }
        for task in self.tasks.iter().filter(|t| t.async_execution == Some(true)) {
            tracing::warn!("⚠️ Task '{}': async_execution is ignored, tasks run sequentially", task.name);
        }
    }

    /// 不需要 API 金鑰：列出每個 task 的 agent、上下文、工具與 prompt
    pub fn plan(&self) -> Result<Vec<PlannedTask>> {
        self.validate()?;

        let mut planned = Vec::with_capacity(self.tasks.len());
        let mut previous: Option<&str> = None;
        for def in &self.tasks {
            let agent_def = self
                .agents
                .iter()
                .find(|a| a.name == def.agent)
                .ok_or_else(|| DocCrewError::ConfigValidationError {
                    field: format!("tasks.{}.agent", def.name),
                    message: format!("Agent '{}' not found in agents definition", def.agent),
                })?;
            let agent = agent_def.to_agent();
            let task = def.to_task();

            planned.push(PlannedTask {
                task: def.name.clone(),
                agent_role: interpolate(&agent.role, &self.inputs),
                system_prompt: system_prompt(&agent, &self.inputs),
                user_prompt: task_prompt(&task, &self.inputs, &[], &[]),
                context_from: match &def.context {
                    Some(names) => names.clone(),
                    None => previous.map(|p| vec![p.to_string()]).unwrap_or_default(),
                },
                tools: def.tools.clone().unwrap_or_else(|| agent_def.tools.clone()),
                output_file: def.output_file.clone(),
            });
            previous = Some(def.name.as_str());
        }
        Ok(planned)
    }

    /// 建立可執行的 crew：解析 provider、工具與 agent
    pub fn into_crew<S: Storage>(&self, settings: &Settings, storage: S) -> Result<Crew<S>> {
        self.validate()?;
        self.log_compatibility_flags();

        let default_llm = settings.provider(self.crew.provider)?;
        let mut providers: HashMap<ProviderKind, Arc<dyn LlmProvider>> =
            HashMap::from([(self.crew.provider, default_llm.clone())]);

        let backend = settings.search_backend();
        let tools: HashMap<&str, Arc<dyn Tool>> = self
            .tools
            .iter()
            .map(|spec| {
                let resolved = interpolate_tool_spec(spec, &self.inputs);
                Ok((spec.name(), build_tool(&resolved, &backend)?))
            })
            .collect::<Result<_>>()?;
        let resolve_tools = |names: &[String]| -> Vec<Arc<dyn Tool>> {
            names
                .iter()
                .filter_map(|name| tools.get(name.as_str()).cloned())
                .collect()
        };

        let mut crew = Crew::new(self.crew.name.clone(), default_llm, storage)
            .with_process(self.crew.process)
            .with_max_tokens(self.crew.max_tokens);

        for def in &self.agents {
            let mut agent = def.to_agent();
            for tool in resolve_tools(&def.tools) {
                agent = agent.with_tool(tool);
            }
            if let Some(kind) = def.llm {
                let llm = match providers.get(&kind) {
                    Some(llm) => llm.clone(),
                    None => {
                        let llm = settings.provider(kind)?;
                        providers.insert(kind, llm.clone());
                        llm
                    }
                };
                agent = agent.with_llm(llm);
            }
            crew = crew.agent(agent);
        }

        for def in &self.tasks {
            let mut task = def.to_task();
            if let Some(names) = &def.tools {
                task = task.with_tools(resolve_tools(names));
            }
            crew = crew.task(task);
        }

        tracing::info!(
            "📋 Crew '{}' loaded: {} agent(s), {} task(s), {} tool(s), provider {}",
            self.crew.name,
            self.agents.len(),
            self.tasks.len(),
            self.tools.len(),
            self.crew.provider.as_str()
        );

        Ok(crew)
    }
}

/// 工具的路徑、網址與頻道也可以使用 `{input}` 佔位符
fn interpolate_tool_spec(spec: &ToolSpec, inputs: &HashMap<String, String>) -> ToolSpec {
    match spec {
        ToolSpec::FileRead { name, path } => ToolSpec::FileRead {
            name: name.clone(),
            path: interpolate(path, inputs),
        },
        ToolSpec::ScrapeWebsite { name, url, max_chars } => ToolSpec::ScrapeWebsite {
            name: name.clone(),
            url: url.as_deref().map(|u| interpolate(u, inputs)),
            max_chars: *max_chars,
        },
        ToolSpec::YoutubeChannelSearch {
            name,
            channel_handle,
            num_results,
        } => ToolSpec::YoutubeChannelSearch {
            name: name.clone(),
            channel_handle: interpolate(channel_handle, inputs),
            num_results: *num_results,
        },
        other => other.clone(),
    }
}

fn unique_names<'a>(field: &str, names: impl Iterator<Item = &'a str>) -> Result<HashSet<&'a str>> {
    let mut seen = HashSet::new();
    for name in names {
        validate_non_empty_string(field, name)?;
        if !seen.insert(name) {
            return Err(DocCrewError::ConfigValidationError {
                field: field.to_string(),
                message: format!("Duplicate name '{}'", name),
            });
        }
    }
    Ok(seen)
}

impl Validate for CrewConfig {
    fn validate(&self) -> Result<()> {
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;

    const CREW: &str = r#"
[crew]
name = "code-writer"
description = "Plan and write a small program"
provider = "openai"
memory = true

[inputs]
topic = "binary search"

[[tools]]
name = "search"
type = "serper_search"
num_results = 3

[[agents]]
name = "planner"
role = "Code Planner"
goal = "Plan the implementation of {topic}"
backstory = "You are an experienced software architect."
tools = ["search"]

[[agents]]
name = "writer"
role = "Code Writer"
goal = "Write clean code for {topic}"
backstory = "You write idiomatic code."
llm = "gemini"

[[tasks]]
name = "plan"
description = "Plan how to implement {topic}."
expected_output = "A numbered plan."
agent = "planner"

[[tasks]]
name = "write"
description = "Write the code for {topic} in {language}."
expected_output = "The complete source code."
agent = "writer"
context = ["plan"]
output_file = "code/solution.txt"
"#;

    #[test]
    fn test_crew_config_parsing() {
        let config = CrewConfig::from_toml_str(CREW).unwrap();
        assert_eq!(config.crew.name, "code-writer");
        assert_eq!(config.crew.process, Process::Sequential);
        assert_eq!(config.crew.provider, ProviderKind::OpenAi);
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[1].llm, Some(ProviderKind::Gemini));
        assert_eq!(config.tasks[1].context, Some(vec!["plan".to_string()]));
        assert!(matches!(config.tools[0], ToolSpec::SerperSearch { num_results: Some(3), .. }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_process_is_rejected() {
        let content = CREW.replace("provider = \"openai\"", "provider = \"openai\"\nprocess = \"hierarchical\"");
        assert!(CrewConfig::from_toml_str(&content).is_err());
    }

    #[test]
    fn test_forward_context_reference_is_rejected() {
        let content = CREW.replace("context = [\"plan\"]", "context = [\"review\"]");
        let config = CrewConfig::from_toml_str(&content).unwrap();
        match config.validate() {
            Err(DocCrewError::ConfigValidationError { field, .. }) => {
                assert_eq!(field, "tasks.write.context")
            }
            other => panic!("expected ConfigValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_agent_and_tool_are_rejected() {
        let config = CrewConfig::from_toml_str(&CREW.replace("agent = \"writer\"", "agent = \"ghost\"")).unwrap();
        assert!(config.validate().is_err());

        let config = CrewConfig::from_toml_str(&CREW.replace("tools = [\"search\"]", "tools = [\"browser\"]")).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_file_must_stay_relative() {
        let config =
            CrewConfig::from_toml_str(&CREW.replace("code/solution.txt", "../solution.txt")).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inputs_and_missing_inputs() {
        let mut config = CrewConfig::from_toml_str(CREW).unwrap();
        assert_eq!(config.missing_inputs(&config.inputs), vec!["language".to_string()]);

        config.apply_inputs(&[
            ("language".to_string(), "Rust".to_string()),
            ("topic".to_string(), "merge sort".to_string()),
        ]);
        assert_eq!(config.inputs["topic"], "merge sort");
        assert!(config.missing_inputs(&config.inputs).is_empty());
    }

    #[test]
    fn test_tool_placeholders_count_as_inputs() {
        let content = CREW.replace(
            "num_results = 3",
            "num_results = 3\n\n[[tools]]\nname = \"videos\"\ntype = \"youtube_channel_search\"\nchannel_handle = \"{channel}\"\n\n[[tools]]\nname = \"resume\"\ntype = \"file_read\"\npath = \"{resume_path}\"",
        );
        let mut config = CrewConfig::from_toml_str(&content).unwrap();
        config.apply_inputs(&[("language".to_string(), "Rust".to_string())]);
        assert_eq!(
            config.missing_inputs(&config.inputs),
            vec!["channel".to_string(), "resume_path".to_string()]
        );

        config.apply_inputs(&[
            ("channel".to_string(), "@rustlang".to_string()),
            ("resume_path".to_string(), "./cv.md".to_string()),
        ]);
        assert!(config.missing_inputs(&config.inputs).is_empty());
    }

    #[test]
    fn test_plan_without_api_keys() {
        let mut config = CrewConfig::from_toml_str(CREW).unwrap();
        config.apply_inputs(&[("language".to_string(), "Rust".to_string())]);

        let plan = config.plan().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].agent_role, "Code Planner");
        assert!(plan[0].context_from.is_empty());
        assert_eq!(plan[0].tools, vec!["search".to_string()]);
        assert_eq!(
            plan[0].system_prompt,
            "You are Code Planner. You are an experienced software architect.\n\
             Your personal goal is: Plan the implementation of binary search"
        );
        assert_eq!(plan[1].context_from, vec!["plan".to_string()]);
        assert!(plan[1].user_prompt.starts_with("Write the code for binary search in Rust."));
        assert_eq!(plan[1].output_file.as_deref(), Some("code/solution.txt"));
    }

    #[test]
    fn test_tool_specs_use_inputs() {
        let spec = ToolSpec::FileRead {
            name: "resume".to_string(),
            path: "{resume_path}".to_string(),
        };
        let inputs = HashMap::from([("resume_path".to_string(), "./cv.md".to_string())]);
        assert_eq!(
            interpolate_tool_spec(&spec, &inputs),
            ToolSpec::FileRead {
                name: "resume".to_string(),
                path: "./cv.md".to_string(),
            }
        );
    }

    #[test]
    fn test_into_crew_requires_provider_keys() {
        let config = CrewConfig::from_toml_str(CREW).unwrap();
        let dir = tempfile::TempDir::new().unwrap();

        let mut settings = Settings::default();
        settings.openai.api_key = Some("sk-test".to_string());
        settings.serper.api_key = Some("serper".to_string());
        // writer 使用 gemini，但沒有 GOOGLE_API_KEY
        assert!(matches!(
            config.into_crew(&settings, LocalStorage::new(dir.path())),
            Err(DocCrewError::MissingConfigError { .. })
        ));

        settings.gemini.api_key = Some("google".to_string());
        let crew = config.into_crew(&settings, LocalStorage::new(dir.path())).unwrap();
        assert_eq!(crew.name(), "code-writer");
        assert_eq!(crew.tasks().len(), 2);
        assert_eq!(crew.tasks()[1].output_file.as_deref(), Some("code/solution.txt"));
    }
}
