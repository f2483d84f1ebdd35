use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // 只接受識別字形式的 {name}，其他大括號 (例如程式碼片段) 原樣保留
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static placeholder regex"))
}

/// 以 inputs 替換 `{name}` 佔位符；未知的佔位符保持原樣
pub fn interpolate(text: &str, inputs: &HashMap<String, String>) -> String {
    placeholder_pattern()
        .replace_all(text, |caps: &Captures| match inputs.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// 列出文字中出現的佔位符名稱
pub fn placeholders(text: &str) -> BTreeSet<String> {
    placeholder_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}
