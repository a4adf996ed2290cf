//! # evalpanel-cli: A CLI for the evaluation panel
//!
//! Drives the evaluation panel against the configured spreadsheet and
//! webhooks from a terminal: list metrics, check pasted templates, submit
//! ratings or new metrics, and diagnose a page context.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use evalpanel::controller::add::AddTab;
use evalpanel::controller::panel::build_cards;
use evalpanel::template::analyze_structure;
use evalpanel::{
    normalize_template_json, EvalController, OpenOutcome, Session, SheetSource, StaticHostPage,
    WebhookClient,
};
use evalpanel_sheets::GoogleSheetSource;
use serde_json::Value;
use std::fs::{self, File};
use std::io::Read;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a config file; defaults to the bundled `config.yml`.
    #[arg(long, global = true, env = "EVALPANEL_CONFIG")]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the metric cards that apply to a skill
    Metrics(MetricsArgs),
    /// Normalize a pasted JSON template and show its inferred structure
    Normalize(NormalizeArgs),
    /// Rate a closed conversation from a JSON file of input values
    Rate(RateArgs),
    /// Add metric definitions sharing one JSON template
    Add(AddArgs),
    /// Report which page markers and sheet data are available
    Diagnose(ContextArgs),
}

#[derive(Parser, Debug)]
struct ContextArgs {
    /// The evaluator, as shown in the user badge
    #[arg(long)]
    user: String,
    #[arg(long)]
    skill: String,
    #[arg(long, default_value = "")]
    conversation: String,
}

#[derive(Parser, Debug)]
struct MetricsArgs {
    #[arg(long)]
    skill: String,
}

#[derive(Parser, Debug)]
struct NormalizeArgs {
    /// File holding the pasted template; reads stdin when omitted
    #[arg(long)]
    file: Option<String>,
}

#[derive(Parser, Debug)]
struct RateArgs {
    #[command(flatten)]
    context: ContextArgs,
    /// JSON object mapping input names (e.g. `greeting.Opening.greeted`) to values
    #[arg(long)]
    inputs: String,
    /// Rate even if the conversation was already rated
    #[arg(long)]
    force: bool,
    /// Print the rating batch instead of submitting it
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser, Debug)]
struct AddArgs {
    /// The evaluator, who must be allowed to add metrics
    #[arg(long)]
    user: String,
    /// Metric name; repeat for several names sharing the template
    #[arg(long = "name", required = true)]
    names: Vec<String>,
    /// Description matched to `--name` by position
    #[arg(long = "description")]
    descriptions: Vec<String>,
    /// File holding the sample JSON template
    #[arg(long)]
    template: String,
    /// Skill to apply the metric to; repeat, or omit for all skills
    #[arg(long = "skill")]
    skills: Vec<String>,
    /// Print the rows instead of submitting them
    #[arg(long)]
    dry_run: bool,
}

// --- Main Application Entry ---

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Setup logging to a file
    let log_file = File::create("evalpanel-cli.log")?;
    let subscriber = fmt::Subscriber::builder()
        .with_writer(log_file)
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let app_config = config::get_config(cli.config.as_deref())?;

    let result = match &cli.command {
        Commands::Metrics(args) => handle_metrics(&app_config, args).await,
        Commands::Normalize(args) => handle_normalize(args),
        Commands::Rate(args) => handle_rate(&app_config, args).await,
        Commands::Add(args) => handle_add(&app_config, args).await,
        Commands::Diagnose(args) => handle_diagnose(&app_config, args).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

// --- Command Handlers ---

fn sheet_source(app_config: &config::AppConfig) -> Result<Arc<dyn SheetSource>> {
    let mut source = GoogleSheetSource::new(&app_config.sheet_id)?;
    if let Some(base_url) = &app_config.sheets_base_url {
        source = source.with_base_url(base_url.clone());
    }
    Ok(Arc::new(source))
}

fn closed_page(context: &ContextArgs) -> Arc<StaticHostPage> {
    let page =
        StaticHostPage::closed_conversation(&context.user, &context.skill, &context.conversation);
    page.set_modal_attached(true);
    Arc::new(page)
}

async fn handle_metrics(app_config: &config::AppConfig, args: &MetricsArgs) -> Result<()> {
    let mut session = Session::new(sheet_source(app_config)?);
    session.refresh(&args.skill, "").await?;

    let cards = build_cards(session.metrics_for_skill());
    println!("{} metric card(s) for skill '{}':", cards.len(), args.skill);
    for card in &cards {
        println!("- {}", card.names().join(", "));
        for description in card.descriptions() {
            println!("    {description}");
        }
        match card.template() {
            Some(template) => println!("    template: {}", template.to_json_string()),
            None => println!(
                "    type: {}",
                card.legacy_metric()
                    .legacy_type
                    .map(|t| format!("{t:?}"))
                    .unwrap_or_else(|| "unsupported".to_string())
            ),
        }
    }
    Ok(())
}

fn handle_normalize(args: &NormalizeArgs) -> Result<()> {
    let raw = match &args.file {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading {path}"))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let sample = normalize_template_json(&raw)?;
    println!("{}", serde_json::to_string_pretty(&Value::Object(sample.clone()))?);

    let analysis = analyze_structure(&sample)?;
    let template = analysis.finalize("metric")?;
    let kind = if analysis.is_complex() { "complex" } else { "simple" };
    println!("structure ({kind}): {}", template.to_json_string());
    Ok(())
}

async fn handle_rate(app_config: &config::AppConfig, args: &RateArgs) -> Result<()> {
    let inputs: serde_json::Map<String, Value> = serde_json::from_str(
        &fs::read_to_string(&args.inputs).with_context(|| format!("reading {}", args.inputs))?,
    )
    .context("inputs must be a JSON object")?;

    let mut controller = EvalController::new(
        closed_page(&args.context),
        sheet_source(app_config)?,
        WebhookClient::new(app_config.webhook_config())?,
        app_config.watch_config(),
    );
    if controller.open().await? == OpenOutcome::AlreadyRated {
        if !args.force {
            bail!("conversation already rated; pass --force to rate it again");
        }
        controller.open_anyway();
    }

    for (name, value) in &inputs {
        match value {
            Value::Bool(b) => controller
                .rate_tab_mut()
                .context("panel is not open")?
                .inputs_mut()
                .choose(name, *b),
            Value::Number(n) => controller.enter_count(name, &n.to_string())?,
            Value::String(s) => controller
                .rate_tab_mut()
                .context("panel is not open")?
                .inputs_mut()
                .enter_text(name, s),
            Value::Array(items) => {
                let tab = controller.rate_tab_mut().context("panel is not open")?;
                for item in items.iter().filter_map(Value::as_str) {
                    tab.inputs_mut().toggle_selection(name, item);
                }
            }
            other => bail!("unsupported value for '{name}': {other}"),
        }
    }

    if args.dry_run {
        let batch = controller
            .rate_tab()
            .context("panel is not open")?
            .build_batch()?;
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        controller.submit().await?;
        if let Some(alert) = controller.alert(evalpanel::Tab::Rate) {
            println!("{}", alert.message);
        }
    }
    controller.close().await;
    Ok(())
}

async fn handle_add(app_config: &config::AppConfig, args: &AddArgs) -> Result<()> {
    let page = StaticHostPage::new();
    page.set_user(&args.user);
    let mut session = Session::new(sheet_source(app_config)?);
    session.load(&page).await?;
    if !session.has_permission_to_add_metric() {
        bail!("'{}' is not allowed to add metrics", args.user);
    }

    let mut tab = AddTab::new(session.selectable_skills());
    let id = tab.forms()[0].id;
    let form = tab.form_mut(id).context("missing metric form")?;
    for (index, name) in args.names.iter().enumerate() {
        if index > 0 {
            form.add_row();
        }
        let description = args.descriptions.get(index).map(String::as_str).unwrap_or("");
        form.set_row(index, name, description);
    }
    form.template_json = fs::read_to_string(&args.template)
        .with_context(|| format!("reading {}", args.template))?;
    if args.skills.is_empty() {
        form.skills.set_all(true);
    } else {
        for skill in &args.skills {
            form.skills.toggle(skill);
        }
    }

    tab.process(|name| session.metric_exists(name))?;
    let rows = tab.finalize()?;
    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    info!("Submitting {} metric row(s)", rows.len());
    let response = WebhookClient::new(app_config.webhook_config())?
        .submit_metrics(rows)
        .await?;
    println!("{}", response.message_or(evalpanel::controller::ADD_SUCCESS));
    Ok(())
}

async fn handle_diagnose(app_config: &config::AppConfig, args: &ContextArgs) -> Result<()> {
    let page = closed_page(args);
    let mut session = Session::new(sheet_source(app_config)?);
    if let Err(e) = session.load(page.as_ref()).await {
        eprintln!("Sheets unavailable: {e}");
    }

    let diagnostics = session.diagnose(page.as_ref());
    println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    for problem in diagnostics.problems() {
        println!("- {problem}");
    }
    Ok(())
}
