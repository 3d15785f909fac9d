use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use injury_risk::biomech::compute_biomech_flags;
use injury_risk::config::{AppConfig, resolve_config_path};
use injury_risk::dataset::{load_players, write_players_csv};
use injury_risk::export::export_risk_report;
use injury_risk::features::derive_features;
use injury_risk::model::TrainedModel;
use injury_risk::predict::{predict_risk, rank_by_risk};
use injury_risk::record::PlayerRecord;
use injury_risk::synthetic::generate_synthetic_players;
use injury_risk::train::{TrainingOptions, train_model};

const DEFAULT_MODEL_PATH: &str = "models/injury_model.json";
const DEFAULT_SYNTH_PATH: &str = "data/raw/synthetic_players.csv";

const USAGE: &str = "usage: injury_risk <command> [options]

commands:
  synth     --out FILE.csv [--n 300] [--seed 42]
  features  --data FILE [--head 10]
  biomech   --data FILE [--config FILE] [--head 10]
  train     [--data FILE | --synthetic N] [--config FILE] [--out model.json]
  predict   --model FILE --data FILE [--config FILE] [--out scores.json] [--xlsx report.xlsx] [--head 20]";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let args = env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };
    let rest = &args[1..];
    match command.as_str() {
        "synth" => run_synth(rest),
        "features" => run_features(rest),
        "biomech" => run_biomech(rest),
        "train" => run_train(rest),
        "predict" => run_predict(rest),
        "help" | "--help" | "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        other => Err(anyhow!("unknown command `{other}`\n\n{USAGE}")),
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("INJURY_RISK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_synth(args: &[String]) -> Result<()> {
    let n = parse_arg::<usize>(args, "--n")?.unwrap_or(300);
    let seed = parse_arg::<u64>(args, "--seed")?.unwrap_or(42);
    let out = arg_value(args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SYNTH_PATH));

    let batch = generate_synthetic_players(n, seed);
    write_players_csv(&out, &batch)?;
    println!("synthetic batch written: {} ({} players)", out.display(), batch.len());
    Ok(())
}

fn run_features(args: &[String]) -> Result<()> {
    let batch = load_batch(args, None)?;
    let head = parse_arg::<usize>(args, "--head")?.unwrap_or(10);
    println!(
        "{:24} {:>8} {:>8} {:>7} {:>9} {:>9} {:>7}",
        "player", "acute", "chronic", "a:c", "intensity", "travel", "fatigue"
    );
    for row in derive_features(&batch).iter().take(head) {
        let f = &row.features;
        println!(
            "{:24} {:>8.2} {:>8.2} {:>7} {:>9} {:>9} {:>7.3}",
            truncate(&row.record.name, 24),
            f.acute_load,
            f.chronic_load,
            fmt_opt(f.acute_chronic_ratio, 2),
            fmt_opt(f.match_intensity, 1),
            fmt_opt(f.travel_burden, 1),
            f.fatigue_score
        );
    }
    Ok(())
}

fn run_biomech(args: &[String]) -> Result<()> {
    let config = load_config(args)?;
    let batch = load_batch(args, Some(&config))?;
    let head = parse_arg::<usize>(args, "--head")?.unwrap_or(10);

    let mut scored = compute_biomech_flags(&derive_features(&batch), &config.biomech)?;
    scored.sort_by(|a, b| b.biomech_risk_score.total_cmp(&a.biomech_risk_score));
    println!(
        "{:24} {:>7} {:>7} {:>5} {:>5} {:>5} {:>6}",
        "player", "a:c", "fatigue", "a:c!", "spike", "fatg", "score"
    );
    for b in scored.iter().take(head) {
        println!(
            "{:24} {:>7} {:>7.3} {:>5} {:>5} {:>5} {:>6.3}",
            truncate(&b.featured.record.name, 24),
            fmt_opt(b.featured.features.acute_chronic_ratio, 2),
            b.featured.features.fatigue_score,
            mark(b.flags.flag_acute_chronic),
            mark(b.flags.flag_workload_spike),
            mark(b.flags.flag_fatigue),
            b.biomech_risk_score
        );
    }
    Ok(())
}

fn run_train(args: &[String]) -> Result<()> {
    let config = load_config(args)?;
    let batch = match parse_arg::<usize>(args, "--synthetic")? {
        Some(n) => generate_synthetic_players(n, config.data.random_state),
        None => load_batch(args, Some(&config))?,
    };
    let out = arg_value(args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));

    let options = TrainingOptions::from_config(&config)?;
    let result = train_model(&batch, &options)?;
    let m = &result.metrics;

    println!(
        "trained on {} rows (train={} test={} test_positives={})",
        batch.len(),
        m.train_samples,
        m.test_samples,
        m.test_positives
    );
    println!(
        "roc_auc={:.4} log_loss={:.4} brier={:.4} accuracy={:.4}",
        m.roc_auc, m.log_loss, m.brier, m.report.accuracy
    );
    for (class, cm) in &m.report.classes {
        println!(
            "  class {class}: precision={:.3} recall={:.3} f1={:.3} support={}",
            cm.precision, cm.recall, cm.f1_score, cm.support
        );
    }
    println!();
    println!("Top feature importances:");
    for (name, importance) in result.model.feature_importances().iter().take(10) {
        println!("  {name:36} {importance:.4}");
    }

    result.model.save(&out)?;
    println!();
    println!("model written: {}", out.display());
    Ok(())
}

fn run_predict(args: &[String]) -> Result<()> {
    let model_path = arg_value(args, "--model")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));
    let model = TrainedModel::load(&model_path)?;
    let batch = load_batch(args, None)?;
    let head = parse_arg::<usize>(args, "--head")?.unwrap_or(20);

    let ranked = rank_by_risk(predict_risk(&model, &batch)?);
    println!("{:24} {:16} {:12} {:>8}", "player", "team", "position", "risk");
    for p in ranked.iter().take(head) {
        let r = &p.featured.record;
        println!(
            "{:24} {:16} {:12} {:>8.4}",
            truncate(&r.name, 24),
            truncate(&r.team, 16),
            truncate(&r.position, 12),
            p.injury_risk_score
        );
    }

    if let Some(out) = arg_value(args, "--out").map(PathBuf::from) {
        let raw = serde_json::to_string_pretty(&ranked).context("serialize predictions")?;
        write_file(&out, &raw)?;
        println!("predictions written: {}", out.display());
    }

    if let Some(xlsx) = arg_value(args, "--xlsx").map(PathBuf::from) {
        let config = load_config(args)?;
        let features = ranked.iter().map(|p| p.featured.clone()).collect::<Vec<_>>();
        let biomech = compute_biomech_flags(&features, &config.biomech)?;
        let report = export_risk_report(&xlsx, &model, &ranked, &biomech)?;
        println!(
            "workbook written: {} ({} players, {} metrics)",
            xlsx.display(),
            report.players,
            report.metric_rows
        );
    }
    Ok(())
}

fn load_config(args: &[String]) -> Result<AppConfig> {
    let path = resolve_config_path(arg_value(args, "--config").map(PathBuf::from));
    AppConfig::load(&path)
}

fn load_batch(args: &[String], config: Option<&AppConfig>) -> Result<Vec<PlayerRecord>> {
    let path = arg_value(args, "--data")
        .map(PathBuf::from)
        .or_else(|| config.and_then(|c| c.data.raw_path.clone()))
        .ok_or_else(|| anyhow!("no input batch: pass --data FILE"))?;
    let batch = load_players(&path)?;
    if batch.is_empty() {
        return Err(anyhow!("{} contains no players", path.display()));
    }
    Ok(batch)
}

fn write_file(path: &Path, raw: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&prefix)
            && !v.trim().is_empty()
        {
            return Some(v.to_string());
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.clone());
        }
    }
    None
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match arg_value(args, flag) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("invalid value for {flag}: {raw}")),
        None => Ok(None),
    }
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_else(|| "-".to_string())
}

fn mark(flag: bool) -> &'static str {
    if flag { "x" } else { "." }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_file_creates_parents_and_reports_blocked_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("out").join("scores.json");
        write_file(&nested, "[]").expect("nested write");
        assert_eq!(fs::read_to_string(&nested).expect("read back"), "[]");

        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").expect("blocker file");
        let err = write_file(&blocker.join("scores.json"), "[]").expect_err("parent is a file");
        assert!(format!("{err:#}").contains("create"), "{err:#}");
    }

    #[test]
    fn flag_values_accept_both_spellings() {
        let args: Vec<String> = ["--n", "40", "--out=a.csv"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(parse_arg::<usize>(&args, "--n").expect("numeric"), Some(40));
        assert_eq!(arg_value(&args, "--out").as_deref(), Some("a.csv"));
        assert_eq!(arg_value(&args, "--seed"), None);
        assert!(parse_arg::<usize>(&args, "--out").is_err());
    }
}
