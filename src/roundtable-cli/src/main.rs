//! Roundtable CLI - multi-participant AI debates
//!
//! Runs a full debate session in the terminal: turns, streaming thoughts,
//! per-round judging and the final standings.

use clap::{ArgAction, Parser};
use colored::Colorize;
use roundtable_core::{
    DebateError, OpenAiProvider, OpenAiSettings, Participant, RankedEntry, SessionConfig,
    SessionEvent, SessionStatus, StatementKind, Statistics, TurnScheduler, default_config, format,
};
use std::collections::HashMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "roundtable",
    version,
    about = "Roundtable - judged, round-based AI debates",
    long_about = "A CLI tool for running scored, multi-round debates between AI and human participants using OpenAI-compatible APIs."
)]
struct Cli {
    /// The topic to debate (required unless a config file sets one)
    #[arg(value_name = "TOPIC")]
    topic: Option<String>,

    /// Session configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of rounds
    #[arg(short, long, value_name = "ROUNDS")]
    rounds: Option<u32>,

    /// Debate format to use
    #[arg(long, value_name = "FORMAT")]
    debate_format: Option<String>,

    /// Models for the debaters, in speaking order (repeat per debater)
    #[arg(short, long, action = ArgAction::Append, value_name = "MODEL")]
    model: Vec<String>,

    /// Names for the debaters (optional, same order as models)
    #[arg(long, action = ArgAction::Append, value_name = "NAME")]
    name: Vec<String>,

    /// Model used by the judge and by debaters without their own model
    #[arg(long, default_value = "gpt-4o-mini", value_name = "MODEL")]
    default_model: String,

    /// Print inner thoughts all at once instead of streaming them
    #[arg(long)]
    no_reveal: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    // Get API configuration from environment
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    let provider = OpenAiProvider::new(
        OpenAiSettings::new(api_base, api_key).with_default_model(&cli.default_model),
    )?;

    print_header(&config);

    let names: HashMap<String, String> = config
        .participants
        .iter()
        .map(|p| (p.id.clone(), p.name.clone()))
        .collect();

    let mut scheduler = TurnScheduler::new(config, Arc::new(provider))?
        .with_callback(create_console_callback(names));

    if let Some(total) = scheduler.snapshot().malformed_weight_total {
        eprintln!(
            "{}",
            format!("Warning: scoring weights sum to {} instead of 100.", total).yellow()
        );
    }

    scheduler.start()?;
    run_session(&mut scheduler).await?;
    scheduler.shutdown();

    print_statistics(&scheduler.statistics());
    print_rankings(&scheduler.rankings());

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  Debate concluded.".bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

/// Load the config file or the built-in default, then apply CLI overrides.
fn build_config(cli: &Cli) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    let mut config = match (&cli.config, &cli.topic) {
        (Some(path), _) => SessionConfig::load(path)?,
        (None, Some(topic)) => default_config(topic),
        (None, None) => return Err("A topic is required unless --config is given.".into()),
    };

    if let (Some(_), Some(topic)) = (&cli.config, &cli.topic) {
        config.topic.title = topic.clone();
    }

    if let Some(rounds) = cli.rounds {
        config.rounds = rounds;
    }

    if let Some(name) = &cli.debate_format {
        config.format = format::get_format(name).ok_or_else(|| {
            format!(
                "Unknown debate format: '{}'. Available formats: {}",
                name,
                format::available_formats().join(", ")
            )
        })?;
    }

    if cli.no_reveal {
        config.reveal.enabled = false;
    }

    let debaters: Vec<&mut Participant> = config
        .participants
        .iter_mut()
        .filter(|p| p.role.is_speaker())
        .collect();
    if cli.model.len() > debaters.len() {
        return Err(DebateError::ConfigError(format!(
            "{} models were given but the session has only {} debaters",
            cli.model.len(),
            debaters.len()
        ))
        .into());
    }
    for (i, participant) in debaters.into_iter().enumerate() {
        if let Some(model) = cli.model.get(i) {
            participant.model = Some(model.clone());
        }
        if let Some(name) = cli.name.get(i) {
            participant.name = name.clone();
        }
    }

    Ok(config)
}

/// Drive the scheduler until the session completes.
async fn run_session(scheduler: &mut TurnScheduler) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        match scheduler.status() {
            SessionStatus::Ongoing => match scheduler.run_turn().await {
                Ok(_) => {}
                Err(DebateError::GenerationExhausted(failure)) => {
                    eprintln!("{} {}", "Error:".red().bold(), failure);
                    if prompt_yes_no("Retry this turn? [Y/n] ")? {
                        info!(participant_id = %failure.participant_id, "Retrying turn");
                    } else {
                        scheduler.skip_current_speaker()?;
                    }
                }
                Err(DebateError::HumanTurnPending { participant_id }) => {
                    let name = scheduler
                        .participant(&participant_id)
                        .map(|p| p.name.clone())
                        .unwrap_or(participant_id);
                    let speech = prompt_line(&format!("{} > ", name.bright_cyan().bold()))?;
                    scheduler.submit_human_statement(speech)?;
                }
                Err(e) => return Err(e.into()),
            },
            SessionStatus::RoundComplete => {
                println!();
                println!("{}", "  ⚖  The judge is scoring this round...".bright_magenta());
                scheduler.score_round().await?;
            }
            SessionStatus::Completed => return Ok(()),
            other => return Err(format!("Unexpected session status: {}", other).into()),
        }
    }
}

fn prompt_line(prompt: &str) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_yes_no(prompt: &str) -> io::Result<bool> {
    let answer = prompt_line(prompt)?;
    Ok(!answer.eq_ignore_ascii_case("n") && !answer.eq_ignore_ascii_case("no"))
}

fn print_header(config: &SessionConfig) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "Roundtable".bold(), config.format.display_name())
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), config.topic.title.bright_white());
    if !config.topic.description.is_empty() {
        println!("       {}", config.topic.description.dimmed());
    }
    println!("{} {}", "Rounds:".bold(), config.rounds);
    println!();
    println!("{}", "Participants:".bold());
    for (i, p) in config.participants.iter().enumerate() {
        let controller = if p.ai_controlled {
            p.model.as_deref().unwrap_or("default model").dimmed()
        } else {
            "human".green()
        };
        println!(
            "  {}. {} ({}) - {}",
            i + 1,
            p.name.bright_cyan(),
            p.role.display_name().yellow(),
            controller
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

/// Create a callback that prints session events to the console.
fn create_console_callback(
    names: HashMap<String, String>,
) -> Box<dyn Fn(SessionEvent) + Send + Sync> {
    let name_of = move |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());

    Box::new(move |event| match event {
        SessionEvent::RoundStarted { round, total_rounds } => {
            println!();
            println!("{}", "═".repeat(70).bright_magenta());
            println!(
                "{}",
                format!("  📢 ROUND {} OF {}", round, total_rounds)
                    .bright_magenta()
                    .bold()
            );
            println!("{}", "═".repeat(70).bright_magenta());
            println!();
        }
        SessionEvent::SpeakerStarted { name, role, .. } => {
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                name.bright_cyan().bold(),
                format!("({})", role).yellow()
            );
        }
        SessionEvent::ThoughtChunk { text, progress, .. } => {
            if progress == 0 {
                print!("  {} ", "💭".dimmed());
            }
            print!("{}", text.dimmed().italic());
            let _ = io::stdout().flush();
        }
        SessionEvent::ThoughtsComplete { .. } => {
            println!();
            println!();
        }
        SessionEvent::StatementAdded(statement) => {
            if statement.kind != StatementKind::FormalStatement {
                return;
            }
            if statement.content.is_empty() {
                println!(
                    "  {}",
                    format!("({} passes this turn)", name_of(&statement.participant_id)).dimmed()
                );
            } else {
                for line in wrap_statement(&statement.content, 66) {
                    println!("  {}", line);
                }
            }
            println!();
        }
        SessionEvent::ScoreAdded { record, fallback } => {
            let source = if fallback {
                " (fallback score)".yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "  {:<20} {:>6.1}{}",
                name_of(&record.participant_id).bright_cyan(),
                record.total_score,
                source
            );
            if !record.comment.is_empty() && !fallback {
                println!("  {}", record.comment.dimmed());
            }
        }
        SessionEvent::TurnFailed(_) | SessionEvent::StatusChanged { .. } => {
            // Handled by the session loop and the log
        }
        SessionEvent::SessionCompleted => {
            // Handled in main
        }
    })
}

fn print_statistics(stats: &Statistics) {
    println!();
    println!("{}", "─".repeat(70).dimmed());
    println!("{}", "Statistics".bold());
    println!(
        "  Overall: average {:.1}, highest {:.1}, lowest {:.1} over {} scores",
        stats.overall.average, stats.overall.highest, stats.overall.lowest, stats.overall.count
    );
    let bands: Vec<String> = stats
        .overall
        .distribution
        .iter()
        .map(|(label, count)| format!("{}: {}", label, count))
        .collect();
    println!("  Distribution: {}", bands.join(", ").dimmed());
    for (dimension, summary) in &stats.dimensions {
        println!(
            "  {:<12} average {:.1} (range {:.1}-{:.1})",
            dimension, summary.average, summary.lowest, summary.highest
        );
    }
}

fn print_rankings(rankings: &[RankedEntry]) {
    println!();
    println!("{}", "Rankings".bold());
    for entry in rankings {
        let line = format!(
            "  {}. {:<20} total {:>7.1}  average {:>5.1}  ({} statements)",
            entry.rank,
            entry.participant_name,
            entry.total_score,
            entry.average_score,
            entry.statement_count
        );
        if entry.rank == 1 {
            println!("{}", line.bright_green().bold());
        } else {
            println!("{}", line);
        }
    }
}

/// Wrap a statement into lines of at most `width` characters. Words longer
/// than `width` get a line of their own.
fn wrap_statement(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_width = 0;

    for word in text.split_whitespace() {
        let word_width = word.chars().count();
        if line_width > 0 && line_width + 1 + word_width > width {
            lines.push(std::mem::take(&mut line));
            line_width = 0;
        }
        if line_width > 0 {
            line.push(' ');
            line_width += 1;
        }
        line.push_str(word);
        line_width += word_width;
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines
}
