use clap::Parser;
use doc_crew::config::crew_config::CrewConfig;
use doc_crew::utils::logger;
use doc_crew::{CrewOutput, CrewRunCli, DocCrewError, LocalStorage, Preset, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CrewRunCli::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);

    tracing::info!("🚀 Starting crew-run");

    if cli.list_presets {
        println!("📦 Built-in presets:");
        for preset in Preset::ALL {
            println!("  {:<14} {}", preset.name(), preset.description());
        }
        return Ok(());
    }

    // 載入 crew 定義
    let (mut config, preset) = match (&cli.preset, &cli.crew) {
        (Some(name), _) => {
            let preset: Preset = name.parse().unwrap_or_else(|e| exit_with(&e));
            tracing::info!("📦 Using preset: {}", preset);
            (preset.config().unwrap_or_else(|e| exit_with(&e)), Some(preset))
        }
        (None, Some(path)) => {
            tracing::info!("📁 Loading crew configuration from: {}", path.display());
            let config = CrewConfig::from_file(path).unwrap_or_else(|e| {
                eprintln!("❌ Failed to load crew file '{}': {}", path.display(), e);
                eprintln!("💡 Make sure the file exists and is valid TOML format");
                std::process::exit(1);
            });
            (config, None)
        }
        (None, None) => anyhow::bail!("either --preset or --crew is required (see --list-presets)"),
    };

    config.apply_inputs(&cli.inputs);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Crew configuration validation failed: {}", e);
        exit_with(&e);
    }
    tracing::info!("✅ Crew configuration loaded and validated successfully");

    let missing = config.missing_inputs(&config.inputs);
    if !missing.is_empty() {
        tracing::warn!("⚠️ No value for input(s): {} (use --input KEY=VALUE)", missing.join(", "));
    }

    display_crew_summary(&config, &cli);

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - the model will not be called");
        perform_dry_run(&config);
        return Ok(());
    }

    let mut settings = Settings::load(cli.config.as_deref()).unwrap_or_else(|e| exit_with(&e));
    if cli.monitor {
        settings.monitoring.enabled = true;
    }
    tracing::info!("⚙️ Settings: {}", settings.summary());
    if settings.monitoring.enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(&cli.output_path);
    let crew = config
        .into_crew(&settings, storage.clone())
        .unwrap_or_else(|e| exit_with(&e))
        .with_monitoring(settings.monitoring.enabled);

    tracing::info!("🎬 Starting crew execution");
    let output = match crew.kickoff(&config.inputs).await {
        Ok(output) => output,
        Err(e) => exit_with(&e),
    };

    let mut extra_files = Vec::new();
    if let Some(preset) = preset {
        extra_files = preset
            .post_process(&storage, &output)
            .await
            .unwrap_or_else(|e| exit_with(&e));
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("-----------------------------");
        println!("{}", output);
    }
    display_execution_results(&output, &extra_files);

    Ok(())
}

fn display_crew_summary(config: &CrewConfig, cli: &CrewRunCli) {
    println!("📋 Crew Summary:");
    println!("  Name: {}", config.crew.name);
    if let Some(description) = &config.crew.description {
        println!("  Description: {}", description);
    }
    println!("  Provider: {}", config.crew.provider.as_str());
    println!("  Agents: {}  Tasks: {}  Tools: {}", config.agents.len(), config.tasks.len(), config.tools.len());
    println!("  Output directory: {}", cli.output_path);

    if !config.inputs.is_empty() {
        let mut inputs: Vec<_> = config.inputs.iter().collect();
        inputs.sort();
        println!("  Inputs:");
        for (key, value) in inputs {
            println!("    {} = {}", key, value);
        }
    }

    if cli.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
    println!("📝 Execution Order:");
    for (index, task) in config.tasks.iter().enumerate() {
        let output = task.output_file.as_deref().unwrap_or("-");
        println!("  {}. {} (agent: {}) -> {}", index + 1, task.name, task.agent, output);
    }
    println!();
}

fn perform_dry_run(config: &CrewConfig) {
    println!("🔍 Dry Run Analysis:");
    println!();

    let plan = config.plan().unwrap_or_else(|e| exit_with(&e));
    for (index, task) in plan.iter().enumerate() {
        println!("📦 Task {}: {} ({})", index + 1, task.task, task.agent_role);
        if task.context_from.is_empty() {
            println!("  📂 Context: none");
        } else {
            println!("  📂 Context from: {}", task.context_from.join(", "));
        }
        if !task.tools.is_empty() {
            println!("  🛠️ Tools: {}", task.tools.join(", "));
        }
        if let Some(output_file) = &task.output_file {
            println!("  💾 Output: {}", output_file);
        }
        println!("  🧑 System prompt:");
        for line in task.system_prompt.lines() {
            println!("    {}", line);
        }
        println!("  📝 Task prompt:");
        for line in task.user_prompt.lines() {
            println!("    {}", line);
        }
        println!();
    }

    println!("✅ Dry run analysis complete ({} task(s)).", plan.len());
}

fn display_execution_results(output: &CrewOutput, extra_files: &[String]) {
    println!();
    println!("📊 Execution Results Summary:");
    println!("  Crew: {}", output.crew);
    println!("  Completed Tasks: {}", output.tasks.len());
    for (index, task) in output.tasks.iter().enumerate() {
        println!(
            "  {}. {} ({}) - {} chars",
            index + 1,
            task.task,
            task.agent,
            task.raw.chars().count()
        );
        if let Some(path) = &task.output_file {
            println!("     Output: {}", path);
        }
    }
    for path in extra_files {
        println!("  📁 {}", path);
    }
    println!("✅ Crew completed successfully!");
}

fn exit_with(e: &DocCrewError) -> ! {
    tracing::error!(
        "❌ Crew run failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    std::process::exit(e.severity().exit_code())
}
