use anyhow::{bail, Context as _, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use uuid::Uuid;

use liftrs::config::AppConfig;
use liftrs::context::{build_daily_context, build_monthly_context, build_weekly_context, to_map};
use liftrs::error::ErrorSeverity;
use liftrs::import::{load_heads_csv, read_log_file, BulkImporter};
use liftrs::logging::init_logging;
use liftrs::nutrition::NutritionProfile;
use liftrs::prediction::prediction_history;
use liftrs::rules::load_templates_from_file;
use liftrs::store::UserStore;
use liftrs::units::{HeightUnit, WeightUnit};
use liftrs::{
    ActivityLevel, Context, ContextFields, ContextValue, Database, Goal, Insight, Insights,
    LiftError, ModelArtifacts, MonthKey, RecoveryPredictor, RuleTemplate, Sex, SplitSession,
    SplitTemplate, Timeframe, UserProfile,
};

/// LiftRS - Training log insights and recovery prediction
///
/// Builds daily, weekly and monthly contexts from strength training logs,
/// evaluates authored rules against them and predicts next-day recovery.
#[derive(Parser)]
#[command(name = "liftrs")]
#[command(author = "LiftRS Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Training log insights and recovery prediction", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overrides the database path from the config
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the computed context for a day, week or month
    Context {
        #[arg(short, long)]
        user: Option<String>,

        /// daily, weekly or monthly
        #[arg(short, long, default_value = "daily")]
        timeframe: Timeframe,

        /// Day (daily) or last day of the window (weekly); defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Month for the monthly context (YYYY-MM); defaults to the date's month
        #[arg(short, long, value_parser = parse_month)]
        month: Option<MonthKey>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rule alerts and micro-tips for a day
    Digest {
        #[arg(short, long)]
        user: Option<String>,

        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Context plus the rule advice it triggers
    Insights {
        #[arg(short, long)]
        user: Option<String>,

        #[arg(short, long, default_value = "daily")]
        timeframe: Timeframe,

        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(short, long, value_parser = parse_month)]
        month: Option<MonthKey>,
    },

    /// Predict and store the recovery score for a day
    Predict {
        #[arg(short, long)]
        user: Option<String>,

        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Print the feature vector and intermediate scores
        #[arg(long)]
        debug: bool,
    },

    /// Stored recovery scores for a date range
    History {
        #[arg(short, long)]
        user: Option<String>,

        #[arg(short, long)]
        from: NaiveDate,

        #[arg(short, long)]
        to: NaiveDate,
    },

    /// Import a JSON array of daily logs, scoring each row
    Import {
        #[arg(short, long)]
        user: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: PathBuf,

        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Load per-user heads from the trainer's CSV
    Heads {
        /// CSV path; defaults to settings.heads_csv
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Manage rule templates
    Rules {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Store a split template and its sessions from JSON
    Splits {
        /// File with {"template": {...}, "sessions": [...]}
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Create or update a user profile and recompute nutrition targets
    Profile {
        #[arg(short, long)]
        user: Option<String>,

        #[arg(long)]
        age: Option<u32>,

        #[arg(long)]
        sex: Option<Sex>,

        #[arg(long)]
        height: Option<f64>,

        #[arg(long)]
        height_unit: Option<HeightUnit>,

        #[arg(long)]
        weight: Option<f64>,

        #[arg(long)]
        weight_unit: Option<WeightUnit>,

        #[arg(long)]
        goal: Option<Goal>,

        #[arg(long)]
        activity: Option<ActivityLevel>,

        #[arg(long)]
        weight_target: Option<f64>,

        #[arg(long)]
        weight_target_unit: Option<WeightUnit>,

        #[arg(long)]
        split_template: Option<String>,
    },
}

#[derive(Subcommand)]
enum RuleAction {
    /// List stored templates
    List,

    /// Add or replace one template from a JSON file; a missing id is generated
    Add {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Add or replace every template in a JSON array file
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show one template as JSON
    Show { id: String },

    /// Delete a template by id
    Delete { id: String },
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Date")]
    date: NaiveDate,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Computed")]
    computed: String,
}

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Timeframe")]
    timeframe: String,
    #[tabled(rename = "Goals")]
    goals: String,
    #[tabled(rename = "Conditions")]
    conditions: usize,
    #[tabled(rename = "Advice")]
    advice: String,
}

fn parse_month(value: &str) -> std::result::Result<MonthKey, String> {
    MonthKey::parse(value).map_err(|e| e.to_string())
}

fn format_value(value: &ContextValue) -> String {
    match value {
        ContextValue::Number(n) if n.fract() == 0.0 => format!("{}", n),
        ContextValue::Number(n) => format!("{:.2}", n),
        ContextValue::Text(s) if s.is_empty() => "-".dimmed().to_string(),
        ContextValue::Text(s) => s.clone(),
        ContextValue::Soreness(s) if s.is_empty() => "-".dimmed().to_string(),
        ContextValue::Soreness(s) => serde_json::to_string(&s.0).unwrap_or_default(),
    }
}

fn print_fields(ctx: &dyn ContextFields) {
    let rows: Vec<FieldRow> = ctx
        .entries()
        .into_iter()
        .map(|(field, value)| FieldRow {
            field: field.to_string(),
            value: format_value(&value),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn print_advice(title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    println!("{}", title.bold());
    for line in lines {
        println!("  • {}", line);
    }
}

struct App {
    config: AppConfig,
    db: Database,
}

impl App {
    fn user_id(&self, explicit: Option<String>) -> Result<String> {
        explicit
            .or_else(|| self.config.settings.default_user.clone())
            .context("No user given; pass --user or set settings.default_user")
    }

    fn predictor(&self) -> Result<RecoveryPredictor> {
        let dir = &self.config.settings.model_dir;
        let artifacts = ModelArtifacts::load_from_dir(dir)
            .with_context(|| format!("Failed to load recovery model from {}", dir.display()))?;
        tracing::info!(
            fingerprint = artifacts.fingerprint(),
            width = artifacts.encoded_width(),
            "Loaded recovery model"
        );
        Ok(RecoveryPredictor::new(Arc::new(artifacts))
            .with_rolling_window(self.config.prediction.rolling_window)
            .with_require_checkin(self.config.prediction.require_checkin))
    }

    fn insight(
        &self,
        user_id: &str,
        timeframe: Timeframe,
        date: NaiveDate,
        month: Option<MonthKey>,
    ) -> Result<Insight> {
        let insights = Insights::new(&self.db);
        let insight = match timeframe {
            Timeframe::Daily => insights.daily(user_id, date)?,
            Timeframe::Weekly => insights.weekly(user_id, date)?,
            Timeframe::Monthly => {
                insights.monthly(user_id, month.unwrap_or_else(|| MonthKey::containing(date)))?
            }
        };
        Ok(insight)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    init_logging(&config.logging.clone().with_verbosity(cli.verbose))?;

    let db_path = cli
        .database
        .clone()
        .unwrap_or_else(|| config.settings.database_path.clone());
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }
    let db = Database::new(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    let app = App { config, db };
    if let Err(err) = run(&app, cli.command) {
        if let Some(lift) = err.downcast_ref::<LiftError>() {
            let label = match lift.severity() {
                ErrorSeverity::Warning | ErrorSeverity::Info => "Warning:".yellow().bold(),
                ErrorSeverity::Error | ErrorSeverity::Critical => "Error:".red().bold(),
            };
            eprintln!("{} {}", label, lift.user_message());
            if lift.is_retryable() {
                eprintln!("{}", "This may be temporary; try again.".dimmed());
            }
            std::process::exit(1);
        }
        return Err(err);
    }
    Ok(())
}

fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Context {
            user,
            timeframe,
            date,
            month,
            json,
        } => {
            let user_id = app.user_id(user)?;
            let user = require_user(&app.db, &user_id)?;
            let date = date.unwrap_or_else(today);

            let ctx = match timeframe {
                Timeframe::Daily => Context::Daily(build_daily_context(&user, date, &app.db)?),
                Timeframe::Weekly => Context::Weekly(build_weekly_context(&user, date, &app.db)?),
                Timeframe::Monthly => Context::Monthly(build_monthly_context(
                    &user,
                    month.unwrap_or_else(|| MonthKey::containing(date)),
                    &app.db,
                )?),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&to_map(&ctx))?);
            } else {
                println!("{}", format!("{} context for {}", timeframe, user_id).cyan().bold());
                print_fields(&ctx);
            }
        }

        Commands::Digest { user, date } => {
            let user_id = app.user_id(user)?;
            let date = date.unwrap_or_else(today);
            let digest = Insights::new(&app.db).daily_digest(&user_id, date)?;

            println!("{}", format!("Daily digest for {} on {}", user_id, date).cyan().bold());
            if digest.is_empty() {
                println!("{}", "Nothing to report for this day".dimmed());
            }
            print_advice("Alerts", &digest.alerts);
            print_advice("Micro-tips", &digest.micro_tips);
        }

        Commands::Insights {
            user,
            timeframe,
            date,
            month,
        } => {
            let user_id = app.user_id(user)?;
            let insight = app.insight(&user_id, timeframe, date.unwrap_or_else(today), month)?;

            println!("{}", format!("{} insights for {}", timeframe, user_id).cyan().bold());
            print_fields(&insight.context);
            if insight.alerts.is_empty() {
                println!("{}", "No rules fired".dimmed());
            }
            print_advice("Alerts", &insight.alerts);
        }

        Commands::Predict { user, date, debug } => {
            let user_id = app.user_id(user)?;
            let date = date.unwrap_or_else(today);
            let predictor = app.predictor()?;

            let diagnostics = predictor.predict_with_diagnostics(&app.db, &user_id, date)?;
            println!(
                "{} {}",
                format!("Recovery score for {} on {}:", user_id, date).green().bold(),
                format!("{:.1}", diagnostics.prediction.score).bold()
            );

            if debug {
                println!("{}", serde_json::to_string_pretty(&diagnostics)?);
            }
        }

        Commands::History { user, from, to } => {
            let user_id = app.user_id(user)?;
            if from > to {
                bail!("--from {} is after --to {}", from, to);
            }
            let history = prediction_history(&app.db, &user_id, from, to)?;
            if history.is_empty() {
                println!("{}", "No stored predictions in range".dimmed());
                return Ok(());
            }

            let rows: Vec<HistoryRow> = history
                .iter()
                .map(|p| HistoryRow {
                    date: p.date,
                    score: format!("{:.1}", p.score),
                    computed: p.created_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }

        Commands::Import { user, file, quiet } => {
            let user_id = app.user_id(user)?;
            let rows = read_log_file(&file)?;
            let predictor = app.predictor()?;

            println!("{}", format!("Importing {} rows...", rows.len()).green().bold());
            let (summary, _) = BulkImporter::new(&predictor)
                .with_progress(!quiet)
                .import_json(&app.db, &user_id, rows)?;

            let message = summary.message();
            if summary.errors > 0 {
                println!("{}", message.yellow());
            } else {
                println!("{}", format!("✓ {}", message).green());
            }
        }

        Commands::Heads { file } => {
            let path = file
                .or_else(|| app.config.settings.heads_csv.clone())
                .context("No heads file; pass --file or set settings.heads_csv")?;
            let loaded = load_heads_csv(&app.db, &path)?;
            println!(
                "{}",
                format!("✓ Loaded {} heads from {}", loaded.written, path.display()).green()
            );
            if loaded.skipped > 0 {
                println!(
                    "{}",
                    format!("Skipped {} rows for unknown users", loaded.skipped).yellow()
                );
            }
        }

        Commands::Rules { action } => run_rules(app, action)?,

        Commands::Splits { file } => {
            let value = read_json(&file)?;
            let template: SplitTemplate = serde_json::from_value(value["template"].clone())
                .context("Invalid or missing \"template\"")?;
            let sessions: Vec<SplitSession> = serde_json::from_value(value["sessions"].clone())
                .context("Invalid or missing \"sessions\"")?;
            if sessions.iter().any(|s| s.template_id != template.id) {
                bail!("Every session must belong to template {}", template.id);
            }

            app.db.upsert_split_template(&template, &sessions)?;
            println!(
                "{}",
                format!("✓ Stored split {} with {} sessions", template.id, sessions.len()).green()
            );
        }

        Commands::Profile {
            user,
            age,
            sex,
            height,
            height_unit,
            weight,
            weight_unit,
            goal,
            activity,
            weight_target,
            weight_target_unit,
            split_template,
        } => {
            let user_id = app.user_id(user)?;
            let mut profile = app
                .db
                .get_user(&user_id)?
                .unwrap_or_else(|| UserProfile::new(user_id.clone()));

            profile.age = age.or(profile.age);
            profile.sex = sex.or(profile.sex);
            profile.height = height.or(profile.height);
            profile.height_unit = height_unit.unwrap_or(profile.height_unit);
            profile.weight = weight.or(profile.weight);
            profile.weight_unit = weight_unit.unwrap_or(profile.weight_unit);
            profile.goal = goal.or(profile.goal);
            profile.activity_level = activity.or(profile.activity_level);
            profile.weight_target = weight_target.or(profile.weight_target);
            profile.weight_target_unit = weight_target_unit.unwrap_or(profile.weight_target_unit);
            profile.split_template_id = split_template.or(profile.split_template_id);

            match NutritionProfile::for_user(&profile) {
                Ok(targets) => targets.apply_to(&mut profile),
                Err(e) => println!("{}", format!("Nutrition targets not updated: {}", e).yellow()),
            }
            app.db.upsert_user(&profile)?;

            println!("{}", format!("✓ Saved profile {}", user_id).green());
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }

    Ok(())
}

fn run_rules(app: &App, action: RuleAction) -> Result<()> {
    match action {
        RuleAction::List => {
            let rules = app.db.list_rules()?;
            if rules.is_empty() {
                println!("{}", "No rule templates stored".dimmed());
                return Ok(());
            }
            let rows: Vec<RuleRow> = rules
                .iter()
                .map(|r| RuleRow {
                    id: r.id.clone(),
                    timeframe: r.timeframe.to_string(),
                    goals: r
                        .for_goals
                        .as_ref()
                        .filter(|g| !g.is_empty())
                        .map(|g| g.join(", "))
                        .unwrap_or_else(|| "all".to_string()),
                    conditions: r.conditions.len(),
                    advice: r.advice.clone(),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }

        RuleAction::Add { file } => {
            let mut value = read_json(&file)?;
            if !value.is_object() {
                bail!("{} must hold a single rule object", file.display());
            }
            let has_id = value
                .get("id")
                .and_then(Value::as_str)
                .map_or(false, |id| !id.trim().is_empty());
            if !has_id {
                value["id"] = Value::String(Uuid::new_v4().to_string());
            }
            let rule: RuleTemplate =
                serde_json::from_value(value).context("Invalid rule template")?;
            app.db.upsert_rule(&rule)?;
            println!("{}", format!("✓ Stored rule {}", rule.id).green());
        }

        RuleAction::Import { file } => {
            let rules = load_templates_from_file(&file)?;
            for rule in &rules {
                app.db.upsert_rule(rule)?;
            }
            println!("{}", format!("✓ Stored {} rules", rules.len()).green());
        }

        RuleAction::Show { id } => match app.db.get_rule(&id)? {
            Some(rule) => println!("{}", serde_json::to_string_pretty(&rule)?),
            None => bail!("No rule with id {}", id),
        },

        RuleAction::Delete { id } => {
            if app.db.delete_rule(&id)? {
                println!("{}", format!("✓ Deleted rule {}", id).green());
            } else {
                bail!("No rule with id {}", id);
            }
        }
    }
    Ok(())
}

fn require_user(db: &Database, user_id: &str) -> Result<UserProfile> {
    db.get_user(user_id)?
        .with_context(|| format!("Unknown user: {}", user_id))
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}
