use std::path::Path;

use {
    anyhow::{Result, bail},
    clap::Subcommand,
};

use vkbridge_config::{Severity, validate};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the resolved configuration with the token masked.
    Show,
}

pub fn handle_config(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(path, verbose),
        ConfigAction::Show => show(path),
    }
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn label(severity: Severity) -> (&'static str, &'static str) {
    match severity {
        Severity::Error => (RED, "error"),
        Severity::Warning => (YELLOW, "warning"),
        Severity::Info => (CYAN, "info"),
    }
}

fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate(path);
    match result.config_path {
        Some(ref file) => eprintln!("Checking {}", file.display()),
        None => eprintln!("No config file found, checking defaults and environment"),
    }

    let visible = result
        .diagnostics
        .iter()
        .filter(|d| verbose || d.severity != Severity::Info);
    for d in visible {
        let (color, name) = label(d.severity);
        let location = if d.path.is_empty() {
            String::new()
        } else {
            format!("{}: ", d.path)
        };
        eprintln!("  {BOLD}{color}{name}{RESET} [{}] {location}{}", d.category, d.message);
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("Config OK");
        return Ok(());
    }
    eprintln!("{errors} error(s), {warnings} warning(s)");
    if result.has_errors() {
        bail!("configuration has {errors} error(s)");
    }
    Ok(())
}

fn show(path: Option<&Path>) -> Result<()> {
    let config = crate::load_config(path)?;
    print!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}
