//! Command-line interface for the Lane A knowledge governance core. Each
//! subcommand is a thin shell over one `lanea-*` crate operation: parse
//! arguments, load the Repository Registry and a production `GitSurface`/
//! `LlmOracle`, call the operation, render the result.

use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;

use lanea_config::{BackendKind, LlmProfile};
use lanea_git::{GitSurface, SystemGit};
use lanea_llm::{AnthropicBackend, ClaudeCliBackend, LlmOracle};
use lanea_staleness::StalenessThreshold;
use lanea_utils::types::{RepositoryRegistry, Scope};

mod exit_codes;
pub use exit_codes::{codes, Outcome};

/// Marker error for an argument that failed our own validation (the
/// shapes clap's derive can't express, like the `system`/`repo:<id>`
/// scope grammar). Kept distinct from other `anyhow::Error`s so `run()`
/// can map it to [`codes::CLI_ARGS`] instead of a generic fatal exit.
#[derive(Debug)]
struct CliArgError(String);

impl std::fmt::Display for CliArgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CliArgError {}

#[derive(Parser)]
#[command(name = "lanea")]
#[command(about = "Lane A knowledge governance core: staleness, committee, sufficiency, phase, meeting, packet, status, and delivery-gate operations")]
#[command(version)]
pub struct Cli {
    /// Named LLM profile from `config/LLM_PROFILES.json` (used by committee
    /// and meeting commands that consult the oracle).
    #[arg(long, global = true, default_value = "default")]
    pub llm_profile: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate staleness for a scope (`system` or `repo:<id>`).
    Staleness {
        #[arg(long)]
        scope: String,
    },
    /// Sufficiency Ledger operations.
    #[command(subcommand)]
    Sufficiency(SufficiencyCommand),
    /// Committee Orchestrator operations.
    #[command(subcommand)]
    Committee(CommitteeCommand),
    /// Phase State Machine operations.
    #[command(subcommand)]
    Phase(PhaseCommand),
    /// Review/Update Meeting operations.
    #[command(subcommand)]
    Meeting(MeetingCommand),
    /// Decision Packet operations.
    #[command(subcommand)]
    Packet(PacketCommand),
    /// Work Status Checkpoint operations.
    #[command(subcommand)]
    Status(StatusCommand),
    /// Delivery Gate check.
    Gate {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        current_version: String,
        #[arg(long)]
        force_override: bool,
    },
}

#[derive(Subcommand)]
pub enum SufficiencyCommand {
    Propose {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        knowledge_version: String,
    },
    Approve {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        knowledge_version: String,
        #[arg(long)]
        by: String,
    },
    Reject {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        knowledge_version: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        notes: String,
    },
}

#[derive(Subcommand)]
pub enum CommitteeCommand {
    RunRepo {
        #[arg(long)]
        repo_id: String,
        #[arg(long)]
        force: bool,
    },
    /// Run every active repo's committee (bounded thread pool).
    RunAllRepos {
        #[arg(long)]
        force: bool,
    },
    RunIntegration {
        #[arg(long)]
        force: bool,
    },
    RunQaStrategist,
}

#[derive(Subcommand)]
pub enum PhaseCommand {
    KickoffReverse {
        #[arg(long)]
        by: String,
    },
    KickoffForward {
        #[arg(long)]
        by: String,
    },
    ConfirmV1 {
        #[arg(long)]
        by: String,
        #[arg(long)]
        notes: Option<String>,
    },
    Close {
        /// `reverse` or `forward`.
        #[arg(long)]
        half: String,
        #[arg(long)]
        by: String,
    },
    RefreshPrereqs {
        #[arg(long)]
        knowledge_version: String,
    },
}

#[derive(Subcommand)]
pub enum MeetingCommand {
    Start {
        /// `update` or `review`.
        #[arg(long)]
        kind: String,
        #[arg(long)]
        scope: String,
        #[arg(long)]
        knowledge_version_target: String,
    },
    Continue {
        #[arg(long)]
        meeting_id: String,
        #[arg(long)]
        force: bool,
    },
    Answer {
        #[arg(long)]
        meeting_id: String,
        #[arg(long)]
        text: String,
    },
    Close {
        #[arg(long)]
        meeting_id: String,
        #[arg(long)]
        decision: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PacketCommand {
    Answer {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        scope: String,
    },
}

#[derive(Subcommand)]
pub enum StatusCommand {
    Update {
        #[arg(long)]
        work_id: String,
        #[arg(long)]
        stage: String,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        blocked: bool,
        #[arg(long)]
        blocking_reason: Option<String>,
        /// Repeatable `key=value` artifact entry.
        #[arg(long = "artifact", value_parser = parse_key_value)]
        artifacts: Vec<(String, String)>,
        /// Repeatable `repo_id=head_sha` entry.
        #[arg(long = "repo", value_parser = parse_key_value)]
        repos: Vec<(String, String)>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

fn parse_scope(raw: &str) -> Result<Scope> {
    if raw == "system" {
        return Ok(Scope::system());
    }
    match raw.strip_prefix("repo:") {
        Some(id) if !id.is_empty() => Ok(Scope::repo(id)),
        _ => Err(CliArgError(format!("scope must be \"system\" or \"repo:<id>\", got {raw:?}")).into()),
    }
}

fn build_oracle(profile: &LlmProfile) -> Result<Box<dyn LlmOracle>> {
    match profile.backend {
        BackendKind::ClaudeCli => {
            let binary = profile
                .binary
                .clone()
                .context("claude_cli profile has no binary configured")?;
            let mut backend = ClaudeCliBackend::new(binary);
            if let Some(secs) = profile.timeout_secs {
                backend = backend.with_timeout(std::time::Duration::from_secs(secs));
            }
            Ok(Box::new(backend))
        }
        BackendKind::Anthropic => {
            let model = profile.model.clone().context("anthropic profile has no model configured")?;
            let key_env = profile
                .api_key_env
                .clone()
                .context("anthropic profile has no api_key_env configured")?;
            let api_key = std::env::var(&key_env)
                .with_context(|| format!("reading API key from ${key_env}"))?;
            Ok(Box::new(AnthropicBackend::new(api_key, model)?))
        }
    }
}

fn load_registry() -> Result<RepositoryRegistry> {
    Ok(lanea_config::load_repository_registry()?)
}

fn load_oracle(llm_profile: &str) -> Result<Box<dyn LlmOracle>> {
    let profiles = lanea_config::load_llm_profiles()?;
    let profile = profiles
        .get(llm_profile)
        .with_context(|| format!("no LLM profile named {llm_profile:?} in config/LLM_PROFILES.json"))?;
    build_oracle(profile)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse arguments, dispatch, and print a contextual error report on
/// failure. Never panics on a recognized operation failure: gate/phase/
/// meeting refusals print their `ok: false` outcome and exit with the §7
/// taxonomy code that matches their refusal kind rather than propagating
/// an `Err`.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            eprint!("{}", lanea_error_reporter::ErrorReport::new(&err));
            exit_codes::classify_err(&err).exit_code()
        }
    }
}

/// Returns the §7 taxonomy bucket a completed invocation landed in. `Err`
/// is reserved for faults outside that taxonomy (config/IO/parse errors).
fn dispatch(cli: &Cli) -> Result<Outcome> {
    let now = Utc::now();

    match &cli.command {
        Commands::Staleness { scope } => {
            let scope = parse_scope(scope)?;
            let registry = load_registry()?;
            let git = SystemGit::new();
            let threshold = StalenessThreshold::from_env()?;
            let snapshot = lanea_staleness::evaluate_scope_staleness(&scope, now, &registry, &git, threshold)?;
            print_json(&snapshot)?;
            Ok(if snapshot.hard_stale { Outcome::StaleBlocked } else { Outcome::Success })
        }

        Commands::Sufficiency(cmd) => run_sufficiency(cmd, now),
        Commands::Committee(cmd) => run_committee(cmd, cli, now),
        Commands::Phase(cmd) => run_phase(cmd, now),
        Commands::Meeting(cmd) => run_meeting(cmd, cli, now),
        Commands::Packet(cmd) => run_packet(cmd, now),
        Commands::Status(cmd) => run_status(cmd, now),

        Commands::Gate { scope, current_version, force_override } => {
            let scope = parse_scope(scope)?;
            let registry = load_registry()?;
            let git = SystemGit::new();
            let threshold = StalenessThreshold::from_env()?;
            let ledger = lanea_gate::JsonlLedger;
            let outcome = lanea_gate::require_confirmed_sufficiency_for_delivery(
                &scope,
                current_version,
                *force_override,
                now,
                &registry,
                &git,
                threshold,
                &ledger,
            )?;
            let ok = outcome.ok;
            print_json(&json!({
                "ok": outcome.ok,
                "via": outcome.via,
                "message": outcome.message,
                "override_event": outcome.override_event,
            }))?;
            Ok(if ok { Outcome::Success } else { Outcome::GateRefusal })
        }
    }
}

fn run_sufficiency(cmd: &SufficiencyCommand, now: DateTime<Utc>) -> Result<Outcome> {
    let registry = load_registry()?;
    let git = SystemGit::new();
    let threshold = StalenessThreshold::from_env()?;

    match cmd {
        SufficiencyCommand::Propose { scope, knowledge_version } => {
            let scope = parse_scope(scope)?;
            let record = lanea_sufficiency::propose(&scope, knowledge_version, now, &registry, &git, threshold)?;
            let ok = record.blockers.is_empty();
            print_json(&record)?;
            Ok(if ok { Outcome::Success } else { Outcome::InvalidInput })
        }
        SufficiencyCommand::Approve { scope, knowledge_version, by } => {
            let scope = parse_scope(scope)?;
            let outcome = lanea_sufficiency::approve(&scope, knowledge_version, by, now, &registry, &git, threshold)?;
            print_json(&json!({ "ok": outcome.ok, "message": outcome.message, "record": outcome.record }))?;
            Ok(if outcome.ok { Outcome::Success } else { Outcome::GateRefusal })
        }
        SufficiencyCommand::Reject { scope, knowledge_version, by, notes } => {
            let scope = parse_scope(scope)?;
            let record = lanea_sufficiency::reject(&scope, knowledge_version, by, notes, now)?;
            print_json(&record)?;
            Ok(Outcome::Success)
        }
    }
}

fn run_committee(cmd: &CommitteeCommand, cli: &Cli, now: DateTime<Utc>) -> Result<Outcome> {
    let registry = load_registry()?;
    let git = SystemGit::new();
    let threshold = StalenessThreshold::from_env()?;

    match cmd {
        CommitteeCommand::RunRepo { repo_id, force } => {
            let oracle = load_oracle(&cli.llm_profile)?;
            let outcome = lanea_committee::run_repo_committee(repo_id, now, &registry, &git, oracle.as_ref(), threshold, *force)?;
            let result = exit_codes::from_run_state(outcome.state);
            print_json(&repo_outcome_json(&outcome))?;
            Ok(result)
        }
        CommitteeCommand::RunAllRepos { force } => {
            let oracle = load_oracle(&cli.llm_profile)?;
            let repo_ids: Vec<String> = registry.active_repo_ids().into_iter().map(str::to_string).collect();
            let outcomes = lanea_committee::run_repo_committees(&repo_ids, now, &registry, &git, oracle.as_ref(), threshold, *force)?;
            let worst = outcomes
                .iter()
                .map(|o| exit_codes::from_run_state(o.state))
                .max_by_key(|o| o.code_value())
                .unwrap_or(Outcome::Success);
            let rendered: Vec<_> = outcomes.iter().map(repo_outcome_json).collect();
            print_json(&rendered)?;
            Ok(worst)
        }
        CommitteeCommand::RunIntegration { force } => {
            let oracle = load_oracle(&cli.llm_profile)?;
            let outcome = lanea_committee::run_integration_committee(now, &registry, &git, oracle.as_ref(), threshold, *force)?;
            let result = exit_codes::from_run_state(outcome.state);
            print_json(&json!({
                "state": outcome.state.as_str(),
                "ok": outcome.ok,
                "reason_code": outcome.reason_code,
                "message": outcome.message,
                "status": outcome.status,
            }))?;
            Ok(result)
        }
        CommitteeCommand::RunQaStrategist => {
            let oracle = load_oracle(&cli.llm_profile)?;
            let outcome = lanea_committee::run_qa_strategist(now, &registry, &git, oracle.as_ref())?;
            let result = exit_codes::from_run_state(outcome.state);
            print_json(&json!({
                "state": outcome.state.as_str(),
                "ok": outcome.ok,
                "reason_code": outcome.reason_code,
                "message": outcome.message,
                "evidence_valid": outcome.evidence_valid,
            }))?;
            Ok(result)
        }
    }
}

fn repo_outcome_json(outcome: &lanea_committee::RepoCommitteeOutcome) -> serde_json::Value {
    json!({
        "repo_id": outcome.repo_id,
        "state": outcome.state.as_str(),
        "ok": outcome.ok,
        "reason_code": outcome.reason_code,
        "message": outcome.message,
        "status": outcome.status,
    })
}

fn run_phase(cmd: &PhaseCommand, now: DateTime<Utc>) -> Result<Outcome> {
    match cmd {
        PhaseCommand::KickoffReverse { by } => {
            let state = lanea_phase::kickoff_reverse(by, now)?;
            print_json(&state)?;
            Ok(Outcome::Success)
        }
        PhaseCommand::KickoffForward { by } => {
            let outcome = lanea_phase::kickoff_forward(by, now)?;
            let ok = outcome.ok;
            print_json(&json!({ "ok": outcome.ok, "reasons": outcome.reasons, "state": outcome.state }))?;
            Ok(if ok { Outcome::Success } else { Outcome::GateRefusal })
        }
        PhaseCommand::ConfirmV1 { by, notes } => {
            let outcome = lanea_phase::confirm_v1(by, notes.as_deref(), now)?;
            let ok = outcome.ok;
            print_json(&json!({ "ok": outcome.ok, "reasons": outcome.reasons, "state": outcome.state }))?;
            Ok(if ok { Outcome::Success } else { Outcome::GateRefusal })
        }
        PhaseCommand::Close { half, by } => {
            let half = match half.as_str() {
                "reverse" => lanea_utils::types::CurrentPhase::Reverse,
                "forward" => lanea_utils::types::CurrentPhase::Forward,
                other => return Err(CliArgError(format!("--half must be \"reverse\" or \"forward\", got {other:?}")).into()),
            };
            let state = lanea_phase::close(half, by, now)?;
            print_json(&state)?;
            Ok(Outcome::Success)
        }
        PhaseCommand::RefreshPrereqs { knowledge_version } => {
            let registry = load_registry()?;
            let git = SystemGit::new();
            let threshold = StalenessThreshold::from_env()?;
            let state = lanea_phase::refresh_prereqs(knowledge_version, now, &registry, &git, threshold)?;
            print_json(&state)?;
            Ok(Outcome::Success)
        }
    }
}

fn run_meeting(cmd: &MeetingCommand, cli: &Cli, now: DateTime<Utc>) -> Result<Outcome> {
    let registry = load_registry()?;
    let git = SystemGit::new();
    let threshold = StalenessThreshold::from_env()?;

    match cmd {
        MeetingCommand::Start { kind, scope, knowledge_version_target } => {
            let kind = match kind.as_str() {
                "update" => lanea_meeting::MeetingKind::Update,
                "review" => lanea_meeting::MeetingKind::Review,
                other => return Err(CliArgError(format!("--kind must be \"update\" or \"review\", got {other:?}")).into()),
            };
            let scope = parse_scope(scope)?;
            let session = lanea_meeting::start(kind, &scope, knowledge_version_target, now, &registry, &git, threshold)?;
            print_json(&session)?;
            Ok(Outcome::Success)
        }
        MeetingCommand::Continue { meeting_id, force } => {
            let oracle = load_oracle(&cli.llm_profile)?;
            let session = lanea_meeting::continue_meeting(meeting_id, now, &registry, &git, oracle.as_ref(), threshold, *force)?;
            print_json(&session)?;
            Ok(Outcome::Success)
        }
        MeetingCommand::Answer { meeting_id, text } => {
            let session = lanea_meeting::answer(meeting_id, text, now)?;
            print_json(&session)?;
            Ok(Outcome::Success)
        }
        MeetingCommand::Close { meeting_id, decision, by, notes } => {
            let outcome = lanea_meeting::close(meeting_id, decision, by, notes.as_deref(), now, &registry, &git, threshold)?;
            let ok = outcome.ok;
            print_json(&json!({ "ok": outcome.ok, "message": outcome.message, "session": outcome.session }))?;
            Ok(if ok { Outcome::Success } else { Outcome::GateRefusal })
        }
    }
}

fn run_packet(cmd: &PacketCommand, now: DateTime<Utc>) -> Result<Outcome> {
    match cmd {
        PacketCommand::Answer { kind, scope } => {
            let scope = parse_scope(scope)?;
            let packet = lanea_packet::answer_packet(kind, &scope, now)?;
            print_json(&packet)?;
            Ok(Outcome::Success)
        }
    }
}

fn run_status(cmd: &StatusCommand, now: DateTime<Utc>) -> Result<Outcome> {
    match cmd {
        StatusCommand::Update { work_id, stage, note, blocked, blocking_reason, artifacts, repos } => {
            let artifacts: BTreeMap<String, String> = artifacts.iter().cloned().collect();
            let repos: BTreeMap<String, String> = repos.iter().cloned().collect();
            let status = lanea_status::update(
                work_id,
                stage,
                note.as_deref(),
                *blocked,
                blocking_reason.as_deref(),
                artifacts,
                repos,
                now,
            )?;
            print_json(&status)?;
            Ok(Outcome::Success)
        }
    }
}
