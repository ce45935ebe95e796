use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Directory to scan for image archives
    #[arg(short, long)]
    pub root: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Number of analysis worker threads (overrides config when set)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Use the fast resize path (lower quality, quicker previews)
    #[arg(long)]
    pub fast_resize: bool,

    /// Load a cover preview for each valid archive after the scan
    #[arg(long)]
    pub covers: bool,

    /// Cover preview bounds as WIDTHxHEIGHT
    #[arg(long, default_value = "280x280", value_parser = parse_bounds)]
    pub cover_size: (u32, u32),

    /// Print per-tier cache statistics after the run
    #[arg(long)]
    pub stats: bool,

    /// Raise the soft open-file limit before scanning (Unix only)
    #[arg(long)]
    pub max_open_files: Option<u64>,
}

fn parse_bounds(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: u32 = w.parse().map_err(|_| format!("invalid width '{w}'"))?;
    let height: u32 = h.parse().map_err(|_| format!("invalid height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("bounds must be non-zero".to_string());
    }
    Ok((width, height))
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
