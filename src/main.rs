//! resource-advisor CLI
//!
//! Runs planning cycles over a JSON snapshot and feeds human verdicts back
//! into the learned ranking.
//!
//! Run with: cargo run -- plan snapshot.json --project apollo

use anyhow::{bail, Context, Result};
use chrono::Utc;
use resource_advisor::{
    outcome, CycleMode, CycleOptions, CycleReport, EngineSettings, MeasuredDeltas, PlanningSnapshot,
    RecommendationEngine, SqliteArmStore, Verdict,
};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_PROJECT: &str = "default";

fn main() -> Result<()> {
    // Logs go to stderr so `--json` output stays clean
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "plan" => return run_plan(&args[2..]),
            "decide" => return run_decide(&args[2..]),
            "outcome" => return run_outcome_cmd(&args[2..]),
            "--arms" => return run_arms(&args[2..]),
            "--learning-stats" => return run_learning_stats(&args[2..]),
            "--decay" => return run_decay(&args[2..]),
            "--history" => return run_history(&args[2..]),
            "--help" | "-h" | "help" => {}
            other => {
                eprintln!("Unknown command: {}\n", other);
            }
        }
    }

    print_usage();
    Ok(())
}

fn print_usage() {
    println!("resource-advisor - resource-allocation recommendations that learn\n");
    println!("Usage:");
    println!("  resource-advisor plan <snapshot.json> [--project NAME] [--seed N] [--json | --records] [--no-wait]");
    println!("  resource-advisor decide <recommendation-id> accept|reject [--reason \"...\"]");
    println!("  resource-advisor outcome <recommendation-id> --delivery N --cost N --burnout N [--on-time]");
    println!("  resource-advisor --arms [PROJECT]");
    println!("  resource-advisor --learning-stats [PROJECT]");
    println!("  resource-advisor --decay <factor> [PROJECT]");
    println!("  resource-advisor --history [PROJECT]");
    println!();
    println!("Environment:");
    println!("  ADVISOR_DATA_DIR           database location (default: platform data dir)");
    println!("  ADVISOR_EXPLORATION_FLOOR  chance a candidate skips its Thompson draw");
    println!("  ADVISOR_MAX_RETRIES        arm update attempts before giving up");
    println!("  ADVISOR_DECAY_FACTOR       default factor for --decay");
}

fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("ADVISOR_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }

    // Use XDG data dir on Linux, ~/Library/Application Support on macOS
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

    Ok(base.join("resource-advisor"))
}

fn open_store() -> Result<Arc<SqliteArmStore>> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {:?}", data_dir))?;
    let db_path = data_dir.join("advisor.db");
    let store = SqliteArmStore::open(&db_path)
        .with_context(|| format!("Failed to open store at {:?}", db_path))?;
    tracing::debug!("Store opened at {:?}", db_path);
    Ok(Arc::new(store))
}

fn engine_for(store: &Arc<SqliteArmStore>) -> RecommendationEngine {
    RecommendationEngine::with_settings(store.clone(), EngineSettings::from_env())
}

/// Value following `flag`, if present
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match flag_value(args, flag) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", flag, raw, e)),
        None => Ok(None),
    }
}

fn project_arg(args: &[String]) -> String {
    args.first()
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_PROJECT.to_string())
}

fn run_plan(args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("Usage: resource-advisor plan <snapshot.json> [--project NAME] [--seed N] [--json]");
    };

    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let snapshot: PlanningSnapshot =
        serde_json::from_str(&raw).with_context(|| format!("Invalid snapshot in {}", path))?;

    let project = flag_value(args, "--project").unwrap_or(DEFAULT_PROJECT);
    let options = CycleOptions {
        mode: if has_flag(args, "--no-wait") {
            CycleMode::Reject
        } else {
            CycleMode::Block
        },
        seed: parse_flag(args, "--seed")?,
    };

    let store = open_store()?;
    let engine = engine_for(&store);
    let report = engine.run_cycle(project, &snapshot, options)?;
    store.save_cycle(&report)?;

    if has_flag(args, "--records") {
        for r in &report.recommendations {
            println!("{}", serde_json::to_string(&r.to_record(&report.project))?);
        }
    } else if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!("\nPLANNING CYCLE {} ({})\n", report.cycle_id, report.project);
    println!("Confidence: {}/100", report.confidence);
    println!("Snapshot:   {}", report.snapshot_hash);
    println!("Seed:       {}", report.seed);
    println!();

    let risky: Vec<_> = report.risks.iter().filter(|r| r.score >= 40.0).collect();
    if !risky.is_empty() {
        println!("AT-RISK TASKS:");
        for risk in risky {
            println!(
                "   {:>5.1} {:?}  {}  ({})",
                risk.score,
                risk.level,
                risk.task_id,
                risk.factors.join(", ")
            );
        }
        println!();
    }

    if report.recommendations.is_empty() {
        println!("No recommendations this cycle ({} candidates considered).", report.candidates_considered);
    } else {
        println!(
            "RECOMMENDATIONS ({} of {} candidates):",
            report.recommendations.len(),
            report.candidates_considered
        );
        for r in &report.recommendations {
            let c = &r.candidate;
            println!("   {}. [{}] {}", r.rank, c.kind, c.title);
            println!("      {}", c.description);
            println!("      Why: {}", c.reason);
            println!(
                "      Impact: delivery {:+.1}, cost {:+.1}%, burnout {:+.1}  score {:.2}",
                c.impact.delivery_delta, c.impact.cost_delta, c.impact.burnout_delta, r.final_score
            );
            println!("      id: {}", r.id);
        }
    }

    if !report.warnings.is_empty() {
        println!();
        println!("WARNINGS:");
        for w in &report.warnings {
            println!("   {}", w);
        }
    }
    println!();
}

fn run_decide(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("Usage: resource-advisor decide <recommendation-id> accept|reject [--reason \"...\"]");
    }

    let id = &args[0];
    let verdict: Verdict = args[1].parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let reason = flag_value(args, "--reason").map(|s| s.to_string());

    let store = open_store()?;
    let engine = engine_for(&store);
    engine
        .record_decision(id, verdict, reason)
        .with_context(|| format!("Failed to record decision for {}", id))?;

    println!("Recorded {} for {}", verdict.as_str(), id);
    Ok(())
}

fn run_outcome_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        println!("Usage: resource-advisor outcome <recommendation-id> --delivery N --cost N --burnout N [--on-time]\n");
        println!("Examples:");
        println!("  resource-advisor outcome 5f0c... --delivery 6 --cost -2 --burnout -4 --on-time");
        return Ok(());
    }

    let id = &args[0];
    let measured = MeasuredDeltas {
        delivery_delta: parse_flag(args, "--delivery")?.unwrap_or(0.0),
        cost_delta: parse_flag(args, "--cost")?.unwrap_or(0.0),
        burnout_delta: parse_flag(args, "--burnout")?.unwrap_or(0.0),
        on_time: has_flag(args, "--on-time"),
    };

    let store = open_store()?;
    let engine = engine_for(&store);
    engine
        .record_outcome(id, measured, Utc::now())
        .with_context(|| format!("Failed to record outcome for {}", id))?;

    println!("Outcome stored for {}", id);
    Ok(())
}

fn run_arms(args: &[String]) -> Result<()> {
    let project = project_arg(args);
    let store = open_store()?;
    let stats = engine_for(&store).arm_stats(&project)?;

    println!("\nBANDIT ARMS: {}\n", project);
    if stats.is_empty() {
        println!("No arms yet. Run `resource-advisor plan` to create them.");
        return Ok(());
    }

    for s in &stats {
        let ci = format!("[{:.2}, {:.2}]", s.ci_lower, s.ci_upper);
        let cold = if s.is_cold { "cold" } else { "" };
        println!(
            "   {:18} alpha {:6.2}  beta {:6.2}  mean {:.2}  CI {:15}  +{} -{}  {}",
            s.kind.as_str(),
            s.alpha,
            s.beta,
            s.mean,
            ci,
            s.accepts,
            s.rejects,
            cold
        );
    }
    println!();
    Ok(())
}

fn run_learning_stats(args: &[String]) -> Result<()> {
    let project = project_arg(args);
    let store = open_store()?;
    let stats = engine_for(&store).learning_stats(&project)?;
    outcome::print_learning_stats(&stats);
    Ok(())
}

fn run_decay(args: &[String]) -> Result<()> {
    let factor = match args.first() {
        Some(raw) => Some(
            raw.parse::<f64>()
                .with_context(|| format!("Invalid decay factor: {}", raw))?,
        ),
        None => None,
    };
    let project = project_arg(args.get(1..).unwrap_or(&[]));

    let store = open_store()?;
    let arms = engine_for(&store).apply_decay(&project, factor)?;
    println!("Decayed {} arm(s) in {}", arms.len(), project);
    for s in &arms {
        println!("   {:18} alpha {:6.2}  beta {:6.2}  mean {:.2}", s.kind.as_str(), s.alpha, s.beta, s.mean);
    }
    Ok(())
}

fn run_history(args: &[String]) -> Result<()> {
    let project = project_arg(args);
    let store = open_store()?;
    let cycles = store.recent_cycles(&project, 10)?;

    println!("\nRECENT CYCLES: {}\n", project);
    for c in &cycles {
        println!(
            "   {}  confidence {:>3}  {} recommendation(s)  {}",
            c.cycle_at.format("%Y-%m-%d %H:%M"),
            c.confidence,
            c.recommendations.len(),
            &c.snapshot_hash[..12.min(c.snapshot_hash.len())]
        );
    }
    if cycles.is_empty() {
        println!("   (none)");
    }
    println!();
    Ok(())
}
