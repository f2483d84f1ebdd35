use crate::core::template::{interpolate, placeholders};
use crate::domain::model::{CrewOutput, TaskOutput};
use crate::domain::ports::{ChatMessage, ChatRequest, LlmProvider, Storage, Tool};
use crate::utils::error::{DocCrewError, Result};
use crate::utils::monitor::RunMonitor;
use crate::utils::validation::validate_relative_file;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// 一個角色：交給模型的 system prompt 來源
#[derive(Clone)]
pub struct Agent {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub tools: Vec<Arc<dyn Tool>>,
    pub allow_delegation: bool,
    /// 未設定時使用 crew 的預設模型
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            tools: Vec::new(),
            allow_delegation: false,
            llm: None,
            model: None,
            temperature: None,
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// 交給某個 agent 的一個工作單位
#[derive(Clone)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent: String,
    /// None: 使用前一個 task 的輸出；Some: 只使用列出的 task
    pub context: Option<Vec<String>>,
    pub output_file: Option<String>,
    /// 設定時取代 agent 的工具
    pub tools: Option<Vec<Arc<dyn Tool>>>,
    /// 交給工具的查詢字串，未設定時使用 description
    pub tool_query: Option<String>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent: agent.into(),
            context: None,
            output_file: None,
            tools: None,
            tool_query: None,
        }
    }

    pub fn with_context<I, T>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.context = Some(tasks.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_output_file(mut self, path: impl Into<String>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_query(mut self, query: impl Into<String>) -> Self {
        self.tool_query = Some(query.into());
        self
    }
}

/// 執行中傳遞給下一個 task 的上下文
#[derive(Debug, Clone)]
pub struct CrewContext {
    pub execution_id: String,
    outputs: Vec<TaskOutput>,
}

impl CrewContext {
    pub fn new(execution_id: String) -> Self {
        Self {
            execution_id,
            outputs: Vec::new(),
        }
    }

    pub fn get_previous_output(&self) -> Option<&TaskOutput> {
        self.outputs.last()
    }

    pub fn get_output_by_name(&self, name: &str) -> Option<&TaskOutput> {
        self.outputs.iter().find(|o| o.task == name)
    }

    pub fn add_output(&mut self, output: TaskOutput) {
        self.outputs.push(output);
    }

    /// 依 task 設定挑出要放進 prompt 的前序輸出
    pub fn outputs_for(&self, task: &Task) -> Vec<&TaskOutput> {
        match &task.context {
            Some(names) => names
                .iter()
                .filter_map(|name| self.get_output_by_name(name))
                .collect(),
            None => self.get_previous_output().into_iter().collect(),
        }
    }

    pub fn into_outputs(self) -> Vec<TaskOutput> {
        self.outputs
    }
}

/// 單一 task 的 prompt 預覽，尚未加入前序輸出與工具結果 (dry run 用)
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTask {
    pub task: String,
    pub agent_role: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub context_from: Vec<String>,
    pub tools: Vec<String>,
    pub output_file: Option<String>,
}

pub fn system_prompt(agent: &Agent, inputs: &HashMap<String, String>) -> String {
    format!(
        "You are {}. {}\nYour personal goal is: {}",
        interpolate(&agent.role, inputs),
        interpolate(&agent.backstory, inputs),
        interpolate(&agent.goal, inputs)
    )
}

pub fn task_prompt(
    task: &Task,
    inputs: &HashMap<String, String>,
    context: &[&TaskOutput],
    observations: &[(String, String)],
) -> String {
    let mut prompt = format!(
        "{}\n\nThis is the expected criteria for your final answer: {}\n\
         You MUST return the actual complete content as the final answer, not a summary.",
        interpolate(task.description.trim(), inputs),
        interpolate(task.expected_output.trim(), inputs)
    );

    if !context.is_empty() {
        prompt.push_str("\n\n# Context from previous tasks:");
        for output in context {
            prompt.push_str(&format!("\n\n## {} ({})\n{}", output.task, output.agent, output.raw));
        }
    }

    if !observations.is_empty() {
        prompt.push_str("\n\n# Tool observations:");
        for (tool, text) in observations {
            prompt.push_str(&format!("\n\n## {}\n{}", tool, text));
        }
    }

    prompt
}

/// 只支援依宣告順序執行
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    #[default]
    Sequential,
}

pub struct Crew<S: Storage> {
    name: String,
    process: Process,
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    llm: Arc<dyn LlmProvider>,
    storage: S,
    max_tokens: Option<u32>,
    monitor: RunMonitor,
}

impl<S: Storage> Crew<S> {
    pub fn new(name: impl Into<String>, llm: Arc<dyn LlmProvider>, storage: S) -> Self {
        Self {
            name: name.into(),
            process: Process::Sequential,
            agents: Vec::new(),
            tasks: Vec::new(),
            llm,
            storage,
            max_tokens: None,
            monitor: RunMonitor::default(),
        }
    }

    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = RunMonitor::new(enabled);
        self
    }

    pub fn with_process(mut self, process: Process) -> Self {
        self.process = process;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn process(&self) -> Process {
        self.process
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    fn find_agent(&self, name: &str) -> Result<&Agent> {
        self.agents
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| DocCrewError::ConfigValidationError {
                field: "tasks.agent".to_string(),
                message: format!("Agent '{}' is not defined in crew '{}'", name, self.name),
            })
    }

    /// 檢查 agent / task 名稱、context 參照與輸出路徑
    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(DocCrewError::ConfigValidationError {
                field: "tasks".to_string(),
                message: format!("Crew '{}' has no tasks", self.name),
            });
        }

        let mut agent_names = HashSet::new();
        for agent in &self.agents {
            if !agent_names.insert(agent.name.as_str()) {
                return Err(DocCrewError::ConfigValidationError {
                    field: "agents.name".to_string(),
                    message: format!("Duplicate agent name '{}'", agent.name),
                });
            }
        }

        let mut earlier: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            self.find_agent(&task.agent)?;

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

            if let Some(output_file) = &task.output_file {
                validate_relative_file(&format!("tasks.{}.output_file", task.name), output_file)?;
            }

            if !earlier.insert(task.name.as_str()) {
                return Err(DocCrewError::ConfigValidationError {
                    field: "tasks.name".to_string(),
                    message: format!("Duplicate task name '{}'", task.name),
                });
            }
        }

        Ok(())
    }

    /// 所有 prompt 中用到的佔位符名稱
    pub fn required_inputs(&self) -> BTreeSet<String> {
        let agent_texts = self
            .agents
            .iter()
            .flat_map(|a| [&a.role, &a.goal, &a.backstory]);
        let task_texts = self.tasks.iter().flat_map(|t| {
            [&t.description, &t.expected_output]
                .into_iter()
                .chain(t.tool_query.iter())
        });
        agent_texts
            .chain(task_texts)
            .flat_map(|text| placeholders(text))
            .collect()
    }

    fn tools_for<'a>(&'a self, task: &'a Task, agent: &'a Agent) -> &'a [Arc<dyn Tool>] {
        task.tools.as_deref().unwrap_or(&agent.tools)
    }

    async fn run_tools(&self, task: &Task, agent: &Agent, query: &str) -> Vec<(String, String)> {
        let mut observations = Vec::new();
        for tool in self.tools_for(task, agent) {
            tracing::info!("🛠️ {}: running tool '{}'", task.name, tool.name());
            match tool.run(query).await {
                Ok(text) => observations.push((tool.name().to_string(), text)),
                Err(e) => {
                    tracing::warn!("⚠️ {}: tool '{}' failed: {}", task.name, tool.name(), e);
                    observations.push((tool.name().to_string(), format!("Tool failed: {}", e)));
                }
            }
        }
        observations
    }

    /// 依序執行所有 task，回傳每個 task 的輸出
    pub async fn kickoff(&self, inputs: &HashMap<String, String>) -> Result<CrewOutput> {
        self.validate()?;

        let missing: Vec<String> = self
            .required_inputs()
            .into_iter()
            .filter(|name| !inputs.contains_key(name))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "⚠️ Crew '{}': no input supplied for {{{}}}, placeholders are sent as-is",
                self.name,
                missing.join("}, {")
            );
        }

        let execution_id = format!("{}_{}", self.name, chrono::Utc::now().format("%Y%m%d_%H%M%S"));
        let mut context = CrewContext::new(execution_id);

        tracing::info!(
            "🚀 Crew '{}' kicking off {} task(s) ({:?}, execution: {})",
            self.name,
            self.tasks.len(),
            self.process,
            context.execution_id
        );

        for (index, task) in self.tasks.iter().enumerate() {
            let agent = self.find_agent(&task.agent)?;
            let role = interpolate(&agent.role, inputs);
            tracing::info!(
                "▶️ [{}/{}] {} (agent: {})",
                index + 1,
                self.tasks.len(),
                task.name,
                role
            );
            if agent.allow_delegation {
                tracing::debug!("{}: delegation requested but tasks run sequentially", role);
            }

            let query = interpolate(
                task.tool_query.as_deref().unwrap_or(&task.description),
                inputs,
            );
            let observations = self.run_tools(task, agent, &query).await;
            let prior = context.outputs_for(task);

            let mut request = ChatRequest::new(vec![
                ChatMessage::system(system_prompt(agent, inputs)),
                ChatMessage::user(task_prompt(task, inputs, &prior, &observations)),
            ]);
            request.model = agent.model.clone();
            request.temperature = agent.temperature;
            request.max_tokens = self.max_tokens;

            let llm = agent.llm.as_ref().unwrap_or(&self.llm);
            let response = llm.complete(request).await.map_err(|e| {
                tracing::error!("❌ Task '{}' failed: {}", task.name, e);
                DocCrewError::TaskError {
                    task: task.name.clone(),
                    details: e.to_string(),
                }
            })?;

            let output_file = match &task.output_file {
                Some(file) => {
                    let written = self.storage.write_file(file, response.content.as_bytes()).await?;
                    tracing::info!("💾 {}: output written to {}", task.name, written);
                    Some(written)
                }
                None => None,
            };

            context.add_output(TaskOutput {
                task: task.name.clone(),
                agent: role,
                raw: response.content,
                output_file,
            });
            self.monitor.log_stage(&task.name);
        }

        self.monitor.log_final_stats();

        let tasks = context.into_outputs();
        let raw = tasks.last().map(|t| t.raw.clone()).unwrap_or_default();
        tracing::info!("✅ Crew '{}' finished {} task(s)", self.name, tasks.len());

        Ok(CrewOutput {
            crew: self.name.clone(),
            tasks,
            raw,
        })
    }
}
