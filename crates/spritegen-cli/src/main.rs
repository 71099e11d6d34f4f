use std::fs;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use spritegen_core::{GenerationOutput, SpriteConfig, SpriteService};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "spritegen",
    about = "Build CSS sprites and keep them up to date",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate every configured sprite once and exit
    Build(RunArgs),
    /// Generate every sprite, then regenerate whenever a source or output changes
    Watch(WatchArgs),
    /// Print the merged configuration (after YAML/CLI) and exit
    PrintConfig(PrintArgs),
}

#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// YAML config file listing the sprite groups
    #[arg(help_heading = "Input")]
    config: PathBuf,
    /// Directory virtual paths resolve against (overrides `root`)
    #[arg(long, help_heading = "Input")]
    root: Option<PathBuf>,
    /// Pixels reserved around each image (overrides `border_width`)
    #[arg(long, help_heading = "Layout")]
    border_width: Option<u32>,
    /// Generate groups in parallel (requires core feature `parallel`)
    #[arg(long, default_value_t = false, help_heading = "Layout")]
    parallel: bool,
    /// Export per-group stats (JSON) to this file
    #[arg(long, help_heading = "Export")]
    export_stats: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
struct WatchArgs {
    #[command(flatten)]
    run: RunArgs,
    /// Poll interval in milliseconds (overrides `poll_interval_ms`)
    #[arg(long, help_heading = "Watch")]
    poll_ms: Option<u64>,
    /// Stop after this many seconds instead of waiting for stdin to close
    #[arg(long, help_heading = "Watch")]
    for_secs: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
struct PrintArgs {
    #[command(flatten)]
    run: RunArgs,
    /// Output format: json|yaml
    #[arg(long, default_value = "yaml", value_parser = ["json", "yaml"])]
    format: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Build(args) => run_build(args),
        Commands::Watch(args) => run_watch(args),
        Commands::PrintConfig(args) => {
            let cfg = load_config(&args.run)?;
            match args.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&cfg)?),
                _ => println!("{}", serde_yaml::to_string(&cfg)?),
            }
            Ok(())
        }
    }
}

fn load_config(args: &RunArgs) -> anyhow::Result<SpriteConfig> {
    let file = fs::read_to_string(&args.config)
        .with_context(|| format!("read config {}", args.config.display()))?;
    let mut cfg: SpriteConfig = serde_yaml::from_str(&file)
        .with_context(|| format!("parse config {}", args.config.display()))?;
    // Relative roots are relative to the config file, not the working directory.
    if let Some(root) = &args.root {
        cfg.root = root.clone();
    } else if cfg.root.is_relative() {
        if let Some(dir) = args.config.parent() {
            cfg.root = dir.join(&cfg.root);
        }
    }
    if let Some(v) = args.border_width {
        cfg.border_width = v;
    }
    if args.parallel {
        cfg.parallel = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn run_build(args: &RunArgs) -> anyhow::Result<()> {
    let cfg = load_config(args)?;
    let service = SpriteService::with_file_watch(cfg)?;
    let outputs = service.render_all()?;
    info!(groups = outputs.len(), "sprites written");
    export_stats(args, &outputs)
}

fn run_watch(args: &WatchArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.run)?;
    if let Some(ms) = args.poll_ms {
        cfg.poll_interval_ms = ms;
    }
    let service = SpriteService::with_file_watch(cfg)?;
    let outputs = service.start()?;
    export_stats(&args.run, &outputs)?;

    match args.for_secs {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => {
            info!(
                groups = outputs.len(),
                "watching for changes; press Enter or close stdin to stop"
            );
            let stdin = std::io::stdin();
            let mut line = String::new();
            let _ = stdin.lock().read_line(&mut line);
        }
    }
    service.stop();
    Ok(())
}

fn export_stats(args: &RunArgs, outputs: &[GenerationOutput]) -> anyhow::Result<()> {
    let Some(path) = &args.export_stats else {
        return Ok(());
    };
    let groups: Vec<serde_json::Value> = outputs
        .iter()
        .map(|o| {
            serde_json::json!({
                "key": o.key.as_str(),
                "fingerprint": o.fingerprint,
                "stats": o.stats,
            })
        })
        .collect();
    let value = serde_json::json!({ "groups": groups });
    fs::write(path, serde_json::to_string_pretty(&value)?)
        .with_context(|| format!("write {}", path.display()))?;
    info!(?path, "stats exported");
    Ok(())
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(config: PathBuf) -> RunArgs {
        RunArgs {
            config,
            root: None,
            border_width: None,
            parallel: false,
            export_stats: None,
        }
    }

    const YAML: &str = r#"
root: site
groups:
  - name: icons
    image: ~/img/icons.png
    css: ~/css/icons.css
    images:
      - { name: home, path: ~/img/home.png }
"#;

    #[test]
    fn relative_root_follows_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprites.yaml");
        fs::write(&path, YAML).unwrap();
        let cfg = load_config(&args(path)).unwrap();
        assert_eq!(cfg.root, dir.path().join("site"));
        assert_eq!(cfg.groups[0].serving_url(), "/img/icons.png");
    }

    #[test]
    fn cli_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprites.yaml");
        fs::write(&path, YAML).unwrap();
        let mut a = args(path);
        a.root = Some(PathBuf::from("/srv/www"));
        a.border_width = Some(2);
        let cfg = load_config(&a).unwrap();
        assert_eq!(cfg.root, PathBuf::from("/srv/www"));
        assert_eq!(cfg.border_width, 2);
    }

    #[test]
    fn invalid_group_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprites.yaml");
        fs::write(&path, "groups:\n  - name: x\n    image: a.png\n    css: a.css\n").unwrap();
        assert!(load_config(&args(path)).is_err());
    }

    #[test]
    fn cli_parses_watch_flags() {
        let cli = Cli::parse_from(["spritegen", "watch", "s.yaml", "--poll-ms", "250", "-v"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Watch(w) => assert_eq!(w.poll_ms, Some(250)),
            _ => panic!("expected watch"),
        }
    }
}
