use anyhow::Context;
use clap::Parser;
use doc_crew::app::sow_generator::{generate_sow, prepare, SowOutcome};
use doc_crew::core::sow::{headings, SYSTEM_PROMPT};
use doc_crew::utils::logger;
use doc_crew::{DocCrewError, LocalStorage, ProviderKind, Settings, SowCli, SowType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = SowCli::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting doc-crew SOW generator");
    if cli.verbose {
        tracing::debug!("CLI args: {:?}", cli);
    }

    if cli.list_headings {
        let sow_type = cli
            .sow_type
            .as_deref()
            .map(str::parse::<SowType>)
            .transpose()
            .context("invalid --sow-type")?;
        print_headings(sow_type);
        return Ok(());
    }

    let form = cli.to_form().unwrap_or_else(|e| exit_with(&e));

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - the model will not be called");
        match prepare(&form) {
            Ok(Some((request, prompt))) => {
                println!("📋 System: {}", SYSTEM_PROMPT);
                println!();
                println!("{}", prompt);
                println!("📁 Would save to: {}/{}", cli.output_path, request.file_name());
            }
            Ok(None) => warn_missing(&form),
            Err(e) => exit_with(&e),
        }
        return Ok(());
    }

    // 必填欄位檢查在讀取設定與 API 金鑰之前
    let storage = LocalStorage::new(&cli.output_path);
    let outcome = generate_sow(&form, storage, || {
        let settings = Settings::load(cli.config.as_deref())?;
        tracing::info!("⚙️ Settings: {}", settings.summary());
        Ok((settings.provider(ProviderKind::OpenAi)?, settings.openai.max_tokens))
    })
    .await;

    match outcome {
        Ok(SowOutcome::Generated { path, text }) => {
            println!("{}", text);
            println!();
            println!("✅ SOW generated successfully!");
            println!("📁 Output saved to: {}", path);
        }
        Ok(SowOutcome::Skipped { .. }) => warn_missing(&form),
        Err(e) => exit_with(&e),
    }

    Ok(())
}

fn print_headings(sow_type: Option<SowType>) {
    let types: Vec<SowType> = match sow_type {
        Some(sow_type) => vec![sow_type],
        None => SowType::ALL.to_vec(),
    };
    for sow_type in types {
        println!("📄 {} ({})", sow_type.label(), sow_type.slug());
        for (index, heading) in headings(sow_type).iter().enumerate() {
            println!("  {:>2}. {}", index + 1, heading);
        }
        println!();
    }
}

fn warn_missing(form: &doc_crew::SowForm) {
    let missing = DocCrewError::MissingFields {
        fields: doc_crew::core::sow::missing_fields(form)
            .into_iter()
            .map(str::to_string)
            .collect(),
    };
    eprintln!("⚠️ {}", missing.user_friendly_message());
}

fn exit_with(e: &DocCrewError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ SOW generation failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    std::process::exit(e.severity().exit_code())
}
