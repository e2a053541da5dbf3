use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use phish_fusion::{
    Config, EmailInput, FusionEngine, MessageParser, Reporter, ReputationOracle, RiskResult,
    ServiceContext,
};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("phish-fusion")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing risk scoring from content, URL, LLM and ledger signals")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/phish-fusion.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("analyze")
                .long("analyze")
                .value_name("FILE")
                .help("Score a JSON request {sender, subject, body, urls?, force_refresh?}")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-email")
                .long("test-email")
                .value_name("FILE")
                .help("Score a raw RFC 822 email file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("force-refresh")
                .long("force-refresh")
                .help("Run the LLM even when the ledger already knows the sender")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-report")
                .long("no-report")
                .help("Do not report confident verdicts to the ledger")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("lookup")
                .long("lookup")
                .value_name("KEY")
                .help("Query the reputation ledger for a sender address or domain")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .value_name("KEY")
                .help("Store a classification in the ledger (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("spam")
                .long("spam")
                .help("Report as spam/phishing")
                .action(ArgAction::SetTrue)
                .conflicts_with("ham"),
        )
        .arg(
            Arg::new("ham")
                .long("ham")
                .help("Report as legitimate")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("reason")
                .long("reason")
                .value_name("TEXT")
                .help("Reason stored with a manual report")
                .default_value("Manual admin classification"),
        )
        .arg(
            Arg::new("feedback")
                .long("feedback")
                .value_name("SENDER")
                .help("Record user feedback for a sender (with --spam or --ham)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("status")
                .long("status")
                .help("Show model, LLM and ledger status")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/phish-fusion.yaml");

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("❌ Configuration validation failed: {e}");
        process::exit(1);
    }

    if matches.get_flag("test-config") {
        print_config_summary(&config);
        return;
    }

    let ctx = match ServiceContext::from_config(&config) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            eprintln!("Error initializing services: {e:#}");
            process::exit(1);
        }
    };

    if matches.get_flag("status") {
        print_json(&ctx.status());
        return;
    }

    if let Some(key) = matches.get_one::<String>("lookup") {
        let record = ctx.oracle.lookup(&key.trim().to_lowercase()).await;
        print_json(&record);
        return;
    }

    let reporter = Reporter::new(&ctx);

    if matches.contains_id("report") || matches.contains_id("feedback") {
        let is_spam = match (matches.get_flag("spam"), matches.get_flag("ham")) {
            (true, false) => true,
            (false, true) => false,
            _ => {
                eprintln!("Specify exactly one of --spam or --ham");
                process::exit(2);
            }
        };
        let reason = matches
            .get_one::<String>("reason")
            .map(String::as_str)
            .unwrap_or_default();

        if let Some(sender) = matches.get_one::<String>("feedback") {
            match reporter.report_feedback(sender, is_spam, reason, None).await {
                Ok(outcome) => print_json(&outcome),
                Err(e) => {
                    eprintln!("❌ {e}");
                    process::exit(1);
                }
            }
        }

        if let Some(keys) = matches.get_many::<String>("report") {
            let keys: Vec<String> = keys.cloned().collect();
            let outcomes = reporter.report_keys(&keys, is_spam, reason).await;
            let failed = outcomes.iter().filter(|(_, o)| !o.success).count();
            print_json(&outcomes);
            if failed > 0 {
                process::exit(1);
            }
        }
        return;
    }

    let input = if let Some(path) = matches.get_one::<String>("analyze") {
        read_request(path)
    } else if let Some(path) = matches.get_one::<String>("test-email") {
        read_email(path)
    } else {
        eprintln!("Nothing to do: pass --analyze, --test-email, --lookup, --report, --feedback or --status");
        process::exit(2);
    };

    let mut input = match input {
        Ok(input) => input,
        Err(e) => {
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    };
    if matches.get_flag("force-refresh") {
        input.force_refresh = true;
    }

    let engine = FusionEngine::new(Arc::clone(&ctx), config.fusion.weights);
    let result = engine.analyze(&input).await;

    if !matches.get_flag("no-report") {
        if let Some(outcome) = reporter.auto_report(&result, &input).await {
            log::info!("Ledger report: {}", outcome.message);
        }
    }

    print_result(&result);
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    let mut config = if std::path::Path::new(path).exists() {
        Config::from_file(path)?
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Config::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e:#}");
            process::exit(1);
        }
    }
}

fn print_config_summary(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();
    let w = &config.fusion.weights;
    for (name, weights) in [
        ("trust ledger", w.trust_ledger),
        ("forced refresh", w.forced_refresh),
        ("no reputation", w.no_reputation),
    ] {
        let n = weights.normalized();
        println!(
            "  {:<15} content {:.2}  url {:.2}  llm {:.2}  ledger {:.2}",
            name, n.content, n.url, n.llm, n.reputation
        );
    }
    println!(
        "  Ledger: {} (key mode {:?})",
        if config.reputation.enabled { "enabled" } else { "disabled" },
        config.reputation.key_mode
    );
    println!(
        "  LLM: {} ({})",
        config.llm.model,
        if config.llm.api_key.is_some() {
            "API key set"
        } else {
            "no API key"
        }
    );
    println!(
        "  Auto-report: {} (min confidence {:.2})",
        config.reporting.auto_report, config.reporting.min_confidence
    );
    println!("✅ Configuration is valid");
}

fn read_request(path: &str) -> anyhow::Result<EmailInput> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("invalid request JSON in {path}"))
}

fn read_email(path: &str) -> anyhow::Result<EmailInput> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
    let parsed = MessageParser::parse(&String::from_utf8_lossy(&bytes));
    log::info!("📧 From: {} | Subject: {}", parsed.sender, parsed.subject);
    Ok(parsed.into_email_input())
}

fn print_result(result: &RiskResult) {
    print_json(&result.to_wire());
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("Error serializing output: {e}");
            process::exit(1);
        }
    }
}
