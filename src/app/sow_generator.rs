use crate::core::document::sow_document;
use crate::core::sow::{build_prompt, missing_fields, SowRequest, SYSTEM_PROMPT};
use crate::domain::model::SowForm;
use crate::domain::ports::{ChatMessage, ChatRequest, LlmProvider, Storage};
use crate::utils::error::{DocCrewError, Result};
use std::sync::Arc;

pub const DEFAULT_MAX_TOKENS: u32 = 1500;

#[derive(Debug, Clone, PartialEq)]
pub enum SowOutcome {
    /// 必填欄位未填：沒有呼叫模型，也沒有寫檔
    Skipped { missing: Vec<String> },
    Generated { path: String, text: String },
}

/// 表單檢查、prompt 組裝與 Word 檔輸出
pub struct SowGenerator<S: Storage> {
    storage: S,
    llm: Arc<dyn LlmProvider>,
    max_tokens: u32,
}

fn skipped(form: &SowForm) -> SowOutcome {
    SowOutcome::Skipped {
        missing: missing_fields(form).into_iter().map(str::to_string).collect(),
    }
}

/// 先檢查表單，通過後才呼叫 `connect` 建立模型 provider。
/// 缺欄位時不需要 API 金鑰也不會寫檔。
pub async fn generate_sow<S, F>(form: &SowForm, storage: S, connect: F) -> Result<SowOutcome>
where
    S: Storage,
    F: FnOnce() -> Result<(Arc<dyn LlmProvider>, u32)>,
{
    let Some((request, prompt)) = prepare(form)? else {
        return Ok(skipped(form));
    };
    let (llm, max_tokens) = connect()?;
    SowGenerator::new(storage, llm)
        .with_max_tokens(max_tokens)
        .generate_request(request, prompt)
        .await
}

/// 表單通過檢查時回傳 request 與 prompt；缺欄位時記錄警告並回傳 None
pub fn prepare(form: &SowForm) -> Result<Option<(SowRequest, String)>> {
    match SowRequest::from_form(form) {
        Ok(request) => {
            let prompt = build_prompt(&request);
            Ok(Some((request, prompt)))
        }
        Err(DocCrewError::MissingFields { fields }) => {
            tracing::warn!(
                "⚠️ Please fill in all fields before generating the SOW (missing: {})",
                fields.join(", ")
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl<S: Storage> SowGenerator<S> {
    pub fn new(storage: S, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            storage,
            llm,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub async fn generate(&self, form: &SowForm) -> Result<SowOutcome> {
        match prepare(form)? {
            Some((request, prompt)) => self.generate_request(request, prompt).await,
            None => Ok(skipped(form)),
        }
    }

    async fn generate_request(&self, request: SowRequest, prompt: String) -> Result<SowOutcome> {
        tracing::info!(
            "📝 Generating {} SOW for '{}' ({} section(s), {} role(s))",
            request.sow_type,
            request.project_title,
            request.sections.len(),
            request.roles.len()
        );
        tracing::debug!("Prompt:\n{}", prompt);

        let chat = ChatRequest::new(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)])
            .with_max_tokens(self.max_tokens);
        let response = self.llm.complete(chat).await?;
        tracing::info!("🤖 {} returned {} characters ({})", self.llm.name(), response.content.len(), response.model);

        let bytes = sow_document(&request, &response.content).to_bytes()?;
        let path = self.storage.write_file(&request.file_name(), &bytes).await?;
        tracing::info!("💾 SOW document saved to {}", path);

        Ok(SowOutcome::Generated {
            path,
            text: response.content,
        })
    }
}
