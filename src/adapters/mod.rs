// Adapters layer: 外部系統的具體實作 (LLM API、搜尋與爬取工具)

pub mod llm;
pub mod tools;
