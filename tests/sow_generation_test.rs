use doc_crew::adapters::llm::OpenAiProvider;
use doc_crew::app::sow_generator::{generate_sow, SowGenerator, SowOutcome};
use doc_crew::{DocCrewError, LocalStorage, ProviderKind, RetryPolicy, Settings, SowForm, SowType};
use doc_crew::domain::model::RoleRate;
use doc_crew::domain::ports::LlmProvider;
use httpmock::prelude::*;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "model": "gpt-4-turbo-2024-04-09",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ]
    })
}

fn provider(server: &MockServer) -> Arc<OpenAiProvider> {
    Arc::new(
        OpenAiProvider::new("sk-test")
            .unwrap()
            .with_base_url(server.base_url())
            .with_retry(RetryPolicy::disabled()),
    )
}

fn tm_form() -> SowForm {
    let mut form = SowForm {
        project_title: Some("Data Platform Migration".to_string()),
        client_name: Some("Smith & Sons".to_string()),
        project_description: Some("Move reporting to the cloud".to_string()),
        start_date: Some("2024-01-01".to_string()),
        end_date: Some("2024-06-30".to_string()),
        budget: Some("$250,000".to_string()),
        sow_type: Some(SowType::TimeAndMaterials),
        roles: vec![
            RoleRate::new("Data Engineer", "$120/h"),
            RoleRate::new("", "$90/h"),
        ],
        ..Default::default()
    };
    form.sections.insert("Scope".to_string(), "Migrate 40 reports.".to_string());
    form.sections.insert("Assumptions".to_string(), "   ".to_string());
    form
}

fn document_xml(path: &std::path::Path) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

#[tokio::test]
async fn test_sow_generated_into_docx() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();

    let chat_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .header("authorization", "Bearer sk-test")
            .body_contains("\"max_tokens\":1500")
            .body_contains("You are an expert in generating Statements of Work (SOW).")
            .body_contains("- Data Engineer: $120/h")
            .body_contains("Scope: Migrate 40 reports.");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(completion("1. Overview\nThe vendor will migrate <40> reports."));
    });

    let generator = SowGenerator::new(LocalStorage::new(temp_dir.path()), provider(&server));
    let outcome = generator.generate(&tm_form()).await.unwrap();

    chat_mock.assert();
    let path = match outcome {
        SowOutcome::Generated { path, text } => {
            assert!(text.starts_with("1. Overview"));
            path
        }
        other => panic!("expected a generated SOW, got {:?}", other),
    };
    assert!(path.ends_with("SOW_Data_Platform_Migration.docx"));

    let xml = document_xml(&temp_dir.path().join("SOW_Data_Platform_Migration.docx"));
    assert!(xml.contains("Data Platform Migration"));
    assert!(xml.contains("Smith &amp; Sons"));
    assert!(xml.contains("Roles &amp; Rates:"));
    assert!(xml.contains("Data Engineer: $120/h"));
    assert!(xml.contains("Total Budget"));
    assert!(xml.contains("2024-06-30"));
    assert!(xml.contains("migrate &lt;40&gt; reports."));
    assert!(!xml.contains("Assumptions"));
}

#[tokio::test]
async fn test_missing_fields_make_no_request_and_no_file() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();

    let chat_mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(completion("should not be used"));
    });

    let mut form = tm_form();
    form.client_name = None;

    let generator = SowGenerator::new(LocalStorage::new(temp_dir.path()), provider(&server));
    let outcome = generator.generate(&form).await.unwrap();

    assert_eq!(
        outcome,
        SowOutcome::Skipped {
            missing: vec!["Client Name".to_string()]
        }
    );
    chat_mock.assert_hits(0);
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_incomplete_form_skips_before_api_key_is_needed() {
    let temp_dir = TempDir::new().unwrap();
    let mut form = tm_form();
    form.budget = None;

    // 沒有 OPENAI_API_KEY 的設定
    let connect = || -> doc_crew::Result<(Arc<dyn LlmProvider>, u32)> {
        let settings = Settings::default();
        Ok((settings.provider(ProviderKind::OpenAi)?, settings.openai.max_tokens))
    };
    let outcome = generate_sow(&form, LocalStorage::new(temp_dir.path()), connect)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SowOutcome::Skipped {
            missing: vec!["Budget".to_string()]
        }
    );
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);

    let err = generate_sow(&tm_form(), LocalStorage::new(temp_dir.path()), connect)
        .await
        .unwrap_err();
    assert!(matches!(err, DocCrewError::MissingConfigError { .. }));
}

#[tokio::test]
async fn test_provider_error_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(401)
            .json_body(serde_json::json!({"error": {"message": "Incorrect API key provided"}}));
    });

    let generator = SowGenerator::new(LocalStorage::new(temp_dir.path()), provider(&server));
    let err = generator.generate(&tm_form()).await.unwrap_err();

    assert!(err.to_string().contains("401"));
    assert_eq!(err.severity().exit_code(), 1);
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}
