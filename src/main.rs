// src/main.rs

use clap::Parser;
use log::{debug, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use blackbox_autotune::apply::channels::LogConnectionMonitor;
use blackbox_autotune::apply::cli_script::CliScript;
use blackbox_autotune::apply::{ApplyOrchestrator, ApplyRequest};
use blackbox_autotune::config::AnalysisConfig;
use blackbox_autotune::data_analysis::{noise_analysis, step_analysis};
use blackbox_autotune::data_analysis::{FilterAnalysisResult, FlightStyle, PidAnalysisResult};
use blackbox_autotune::data_input::csv_export::export_session_csv;
use blackbox_autotune::data_input::{decode_file, LogSession};
use blackbox_autotune::progress::{
    AnalysisProgressEvent, ApplyProgressEvent, DecodeProgressEvent,
};
use blackbox_autotune::recommendation::Recommendation;

#[derive(Parser)]
#[command(author, version, about = "Blackbox log noise and step-response tuning assistant")]
struct Args {
    /// Blackbox log file (.bbl / .bfl)
    log: PathBuf,
    /// Analyse only this session (1-based, as numbered in the output)
    #[arg(long)]
    session: Option<usize>,
    /// Flight style the step-response targets are chosen for
    #[arg(long, default_value = "balanced")]
    style: FlightStyle,
    /// JSON file overriding analysis thresholds
    #[arg(long)]
    config: Option<PathBuf>,
    /// Export each analysed session as CSV into this directory
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Write the analysis results as JSON
    #[arg(long)]
    json: Option<PathBuf>,
    /// Render the recommended changes as a CLI paste script
    #[arg(long)]
    script: Option<PathBuf>,
    /// Do not include a snapshot (`diff all`) in the script
    #[arg(long, default_value_t = false)]
    no_snapshot: bool,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct SessionReport {
    session: usize,
    frame_count: usize,
    duration_s: f64,
    sample_rate_hz: f64,
    corrupted_frame_count: usize,
    warnings: Vec<String>,
    filter_analysis: Option<FilterAnalysisResult>,
    filter_error: Option<String>,
    pid_analysis: Option<PidAnalysisResult>,
    pid_error: Option<String>,
}

fn print_recommendations(title: &str, recommendations: &[Recommendation]) {
    let changes: Vec<&Recommendation> = recommendations.iter().filter(|r| r.is_change()).collect();
    if changes.is_empty() {
        println!("  {}: no changes recommended", title);
        return;
    }
    println!("  {}:", title);
    for rec in changes {
        println!("    {}", rec);
    }
}

fn analyze_session(
    session: &LogSession,
    style: FlightStyle,
    config: &AnalysisConfig,
) -> SessionReport {
    let data = &session.flight_data;
    println!(
        "\nSession {}: {} frames, {:.1} s at {:.0} Hz, {} corrupted frame(s)",
        session.index + 1,
        data.frame_count,
        data.duration_s,
        data.sample_rate_hz,
        session.corrupted_frame_count
    );
    for warning in &session.warnings {
        println!("  warning: {}", warning);
    }
    if data.pid_metadata.has_gains() {
        for (axis, gains) in data.pid_metadata.axes.iter().enumerate() {
            println!(
                "  {} PID: {}",
                blackbox_autotune::axis_names::axis_name(axis),
                gains.summary()
            );
        }
    }

    let mut analysis_progress = |e: AnalysisProgressEvent| debug!("{} {:.0}%", e.step, e.percent);

    // The analyzers are independent; one failing does not skip the other.
    let (filter_analysis, filter_error) =
        match noise_analysis::analyze(data, session.index, config, &mut analysis_progress) {
            Ok(result) => {
                println!("  Noise: {}", result.summary);
                print_recommendations("Filter", &result.recommendations);
                (Some(result), None)
            }
            Err(err) => {
                println!("  Noise analysis skipped: {}", err);
                (None, Some(err.to_string()))
            }
        };

    let (pid_analysis, pid_error) = match step_analysis::analyze(
        data,
        session.index,
        Some(style),
        config,
        &mut analysis_progress,
    ) {
        Ok(result) => {
            println!("  Step response: {}", result.summary);
            print_recommendations("PID", &result.recommendations);
            (Some(result), None)
        }
        Err(err) => {
            println!("  Step-response analysis skipped: {}", err);
            (None, Some(err.to_string()))
        }
    };

    SessionReport {
        session: session.index + 1,
        frame_count: data.frame_count,
        duration_s: data.duration_s,
        sample_rate_hz: data.sample_rate_hz,
        corrupted_frame_count: session.corrupted_frame_count,
        warnings: session.warnings.clone(),
        filter_analysis,
        filter_error,
        pid_analysis,
        pid_error,
    }
}

fn write_script(
    report: &SessionReport,
    create_snapshot: bool,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let filter_recs = report
        .filter_analysis
        .as_ref()
        .map(|r| r.recommendations.as_slice())
        .unwrap_or_default();
    let pid_recs = report
        .pid_analysis
        .as_ref()
        .map(|r| r.recommendations.as_slice())
        .unwrap_or_default();
    let request = ApplyRequest::from_recommendations(filter_recs, pid_recs, create_snapshot);

    let script = CliScript::new();
    let mut commands = script.clone();
    let mut snapshots = script.clone();
    let mut parameters = script.parameter_channel();
    let mut monitor = LogConnectionMonitor;
    let mut orchestrator =
        ApplyOrchestrator::new(&mut commands, &mut parameters, &mut snapshots, &mut monitor);
    orchestrator.begin_confirm()?;
    let result = orchestrator.apply(&request, &mut |e: ApplyProgressEvent| {
        debug!("[{}] {} ({:.0}%)", e.stage, e.message, e.percent)
    })?;
    if !result.success {
        return Err(format!(
            "script rendering failed: {}",
            result.error.unwrap_or_default()
        )
        .into());
    }

    script.write_to(path)?;
    println!(
        "\nWrote {} filter and {} PID change(s) for session {} to {}",
        result.applied_filters,
        result.applied_pids,
        report.session,
        path.display()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };

    let parsed = decode_file(
        &args.log,
        &config.decoder,
        &mut |e: DecodeProgressEvent| {
            debug!(
                "Decoded {}/{} bytes ({:.0}%), session {}",
                e.bytes_processed, e.total_bytes, e.percent, e.current_session
            )
        },
    )?;
    println!(
        "{}: {} session(s), {} corrupted frame(s)",
        args.log.display(),
        parsed.sessions.len(),
        parsed.corrupted_frame_count
    );
    for warning in &parsed.warnings {
        warn!("{}", warning);
    }
    if parsed.sessions.is_empty() {
        return Err("no flight sessions found in log".into());
    }

    let selected: Vec<&LogSession> = match args.session {
        Some(number) => {
            let session = number
                .checked_sub(1)
                .and_then(|index| parsed.session(index))
                .ok_or_else(|| {
                    format!(
                        "session {} not found (log has {})",
                        number,
                        parsed.sessions.len()
                    )
                })?;
            vec![session]
        }
        None => parsed.sessions.iter().collect(),
    };

    if let Some(dir) = &args.csv {
        fs::create_dir_all(dir)?;
        let stem = args
            .log
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "log".to_string());
        for session in &selected {
            let path = export_session_csv(session, dir, &stem)?;
            println!("Exported session {} to {}", session.index + 1, path.display());
        }
    }

    let reports: Vec<SessionReport> = selected
        .iter()
        .map(|session| analyze_session(session, args.style, &config))
        .collect();

    if let Some(path) = &args.json {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &reports)?;
        info!("Wrote JSON report to {}", path.display());
    }

    if let Some(path) = &args.script {
        // Without --session the longest session's recommendations are used.
        let report = reports
            .iter()
            .max_by_key(|r| r.frame_count)
            .ok_or("no analysed session for the script")?;
        write_script(report, !args.no_snapshot, path)?;
    }

    Ok(())
}
