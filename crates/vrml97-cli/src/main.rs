use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser as ClapParser, Subcommand};
use log::debug;
use serde::Serialize;
use vrml97::resource::FileFetcher;
use vrml97::viewer::{RecordingViewer, ViewerCall};
use vrml97::{Browser, BrowserConfig, BrowserState, FieldType, FieldValue};

#[derive(ClapParser)]
#[command(name = "vrml97")]
#[command(about = "VRML97 scene graph CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a world loads, printing any warnings
    Check {
        /// Path to .wrl file
        file: PathBuf,
    },
    /// Print the loaded scene graph as VRML
    Print {
        /// Path to .wrl file
        file: PathBuf,
    },
    /// Run a world headless and summarize what it renders
    Run {
        /// Path to .wrl file
        file: PathBuf,
        /// Number of frames to run
        #[arg(long, default_value_t = 60)]
        frames: u32,
        /// TOML file with browser settings
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse one field value and print it back in canonical form
    Field {
        /// Field type, e.g. SFVec3f or MFString
        field_type: String,
        /// The value text
        text: String,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { file } => check(&file),
        Commands::Print { file } => print(&file),
        Commands::Run {
            file,
            frames,
            config,
            json,
        } => run(&file, frames, config.as_deref(), json),
        Commands::Field { field_type, text } => field(&field_type, &text),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn load(file: &Path, config: BrowserConfig) -> Result<Browser> {
    let source = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let mut browser = Browser::new(Arc::new(FileFetcher), config);
    browser
        .load_str(&source, &file.to_string_lossy())
        .with_context(|| format!("loading {}", file.display()))?;
    browser.update(0.0)?;
    browser.wait_for_loads();
    Ok(browser)
}

fn check(file: &Path) -> Result<()> {
    let browser = load(file, BrowserConfig::default())?;
    for warning in browser.warnings() {
        eprintln!("warning: {warning}");
    }
    let nodes = browser.scene().map_or(0, |scene| scene.node_count());
    println!("{}: OK ({nodes} nodes, {} warnings)", file.display(), browser.warnings().len());
    Ok(())
}

fn print(file: &Path) -> Result<()> {
    let browser = load(file, BrowserConfig::default())?;
    let Some(scene) = browser.scene() else {
        bail!("{} did not load", file.display());
    };
    print!("{}", scene.write_vrml());
    Ok(())
}

fn read_config(path: Option<&Path>) -> Result<BrowserConfig> {
    let Some(path) = path else {
        return Ok(BrowserConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Serialize)]
struct RunSummary {
    file: String,
    state: BrowserState,
    config: BrowserConfig,
    frames: u32,
    redraws: u32,
    warnings: Vec<String>,
    /// Viewer calls by kind, over all frames.
    call_counts: BTreeMap<String, usize>,
    /// Everything the last redrawn frame sent to the viewer.
    last_frame: Vec<ViewerCall>,
}

fn call_kind(call: &ViewerCall) -> String {
    let json = serde_json::to_value(call).unwrap_or_default();
    json.get("call")
        .and_then(|kind| kind.as_str())
        .unwrap_or("unknown")
        .to_string()
}

fn run(file: &Path, frames: u32, config: Option<&Path>, json: bool) -> Result<()> {
    let config = read_config(config)?;
    let mut browser = load(file, config.clone())?;
    let mut viewer = RecordingViewer::new();
    let mut summary = RunSummary {
        file: file.display().to_string(),
        state: browser.state(),
        config: config.clone(),
        frames,
        redraws: 0,
        warnings: Vec::new(),
        call_counts: BTreeMap::new(),
        last_frame: Vec::new(),
    };

    for frame in 0..frames {
        let time = f64::from(frame) * config.frame_interval;
        if !browser.update(time)? && frame > 0 {
            continue;
        }
        debug!("redrawing frame {frame} at {time:.3}s");
        browser.render(&mut viewer)?;
        let calls = viewer.take_calls();
        for call in &calls {
            *summary.call_counts.entry(call_kind(call)).or_default() += 1;
        }
        summary.redraws += 1;
        summary.last_frame = calls;
    }
    summary.state = browser.state();
    summary.warnings = browser.warnings().iter().map(ToString::to_string).collect();
    browser.shutdown();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("{}: {} frames, {} redraws", summary.file, summary.frames, summary.redraws);
    for (kind, count) in &summary.call_counts {
        println!("  {kind}: {count}");
    }
    for warning in &summary.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

fn field(field_type: &str, text: &str) -> Result<()> {
    let field_type: FieldType = field_type.parse()?;
    let value = FieldValue::from_vrml(field_type, text)?;
    println!("{value}");
    Ok(())
}
