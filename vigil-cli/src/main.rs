//! vigil-cli — command-line client for the Vigil warehouse vision API
//!
//! # Subcommands
//! - `analyze <file> [--name <label>] [--json]` — upload an image for analysis
//! - `history [--json]`                         — most recent analyses
//! - `stats [--json]`                           — counts per safety score
//! - `status`                                   — show server status

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8001";
const ANALYZE_TIMEOUT_SECS: u64 = 120;
const READ_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "vigil-cli",
    version,
    about = "Vigil warehouse vision — analyze images and inspect results"
)]
struct Cli {
    /// Vigil HTTP server URL (overrides VIGIL_HTTP_URL env var)
    #[arg(long, env = "VIGIL_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload an image and print the analysis
    Analyze {
        /// Image file to analyze
        file: String,

        /// Label stored with the analysis (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show the most recent analyses, newest first
    History {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show analysis counts per safety score
    Stats {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show Vigil server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct ItemView {
    pub category: String,
    pub name: String,
    pub description: String,
    pub confidence: String,
    pub priority: String,
    pub action: String,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AnalysisView {
    pub id: String,
    pub timestamp: String,
    pub image_name: String,
    pub detected_items: Vec<ItemView>,
    pub overall_safety_score: String,
    pub summary: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatsView {
    pub total_analyses: u64,
    pub safe_count: u64,
    pub caution_count: u64,
    pub danger_count: u64,
    #[serde(default)]
    pub unknown_count: u64,
}

// ============================================================================
// Formatting
// ============================================================================

/// Base64-encode image bytes for the `image_base64` request field.
pub fn encode_image(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Label to store with an upload: explicit name, else the file name.
pub fn image_label(path: &str, name: Option<&str>) -> String {
    match name {
        Some(n) if !n.trim().is_empty() => n.to_string(),
        _ => Path::new(path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string()),
    }
}

/// Multi-line human-readable rendering of one analysis.
pub fn format_analysis(a: &AnalysisView) -> String {
    let mut out = format!(
        "{} [{}]  {}\n{}\n",
        a.image_name, a.overall_safety_score, a.timestamp, a.summary
    );
    if a.detected_items.is_empty() {
        out.push_str("  (no items detected)\n");
    }
    for item in &a.detected_items {
        out.push_str(&format!(
            "  - {} ({}, priority {}, confidence {})\n    {}\n    → {}\n",
            item.name, item.category, item.priority, item.confidence, item.description, item.action
        ));
        if let Some(loc) = item.location.as_deref().filter(|l| !l.is_empty()) {
            out.push_str(&format!("    at {}\n", loc));
        }
    }
    out
}

/// One line per analysis for history listings.
pub fn format_history_line(a: &AnalysisView) -> String {
    let short_id: String = a.id.chars().take(8).collect();
    format!(
        "{}  {:<8} {:>2} items  {}  {}",
        short_id,
        a.overall_safety_score,
        a.detected_items.len(),
        a.timestamp,
        a.image_name
    )
}

pub fn format_stats(s: &StatsView) -> String {
    format!(
        "Total:    {}\nSafe:     {}\nCaution:  {}\nDanger:   {}\nUnknown:  {}",
        s.total_analyses, s.safe_count, s.caution_count, s.danger_count, s.unknown_count
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Fail with the server's `detail` (or raw body) on non-2xx responses.
fn check_status(
    url: &str,
    resp: reqwest::blocking::Response,
) -> anyhow::Result<reqwest::blocking::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["detail"].as_str().map(str::to_string))
        .unwrap_or(body);
    anyhow::bail!("{} returned {}: {}", url, status, detail)
}

fn do_analyze(server: &str, file: &str, name: Option<&str>, json_output: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", file, e))?;

    let url = format!("{}/api/analyze", server);
    let body = serde_json::json!({
        "image_base64": encode_image(&bytes),
        "image_name": image_label(file, name),
    });

    let resp = client(ANALYZE_TIMEOUT_SECS)?.post(&url).json(&body).send()?;
    let analysis: AnalysisView = check_status(&url, resp)?.json()?;

    if json_output {
        print_json(&analysis)
    } else {
        print!("{}", format_analysis(&analysis));
        Ok(())
    }
}

fn do_history(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/history", server);
    let resp = client(READ_TIMEOUT_SECS)?.get(&url).send()?;
    let history: Vec<AnalysisView> = check_status(&url, resp)?.json()?;

    if json_output {
        return print_json(&history);
    }
    if history.is_empty() {
        eprintln!("No analyses yet");
        return Ok(());
    }
    for a in &history {
        println!("{}", format_history_line(a));
    }
    Ok(())
}

fn do_stats(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/stats", server);
    let resp = client(READ_TIMEOUT_SECS)?.get(&url).send()?;
    let stats: StatsView = check_status(&url, resp)?.json()?;

    if json_output {
        print_json(&stats)
    } else {
        println!("{}", format_stats(&stats));
        Ok(())
    }
}

/// Show the server status by calling GET /api/.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/", server);
    let resp = client(READ_TIMEOUT_SECS)?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Vigil server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Service:      {}", body["message"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("vigil-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("vigil-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Analyze { file, name, json } => do_analyze(&server, &file, name.as_deref(), json),
        Commands::History { json } => do_history(&server, json),
        Commands::Stats { json } => do_stats(&server, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("vigil-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
