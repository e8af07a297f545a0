//! CLI mode - fetch URLs from the command line through the download center.

mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{BatchOptions, DownloadCenter, DownloadResult, FetchConfig, RequestSpec};

use progress::{Line, ProgressBars, print_summary};

/// Parsed command-line arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub specs: Vec<RequestSpec>,
    pub output_dir: PathBuf,
    pub memory: bool,
    pub ca_bundle: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub help: bool,
}

pub fn print_usage() {
    eprintln!("Usage: fetch [OPTIONS] <URL[#CHECKSUM]>...");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output-dir <DIR>   Directory downloads are moved into (default: .)");
    eprintln!("      --memory             Keep downloads in memory and only report sizes");
    eprintln!("      --ca-bundle <PEM>    Trust the certificates in this PEM bundle too");
    eprintln!("      --config <TOML>      Read configuration from this file");
    eprintln!("  -h, --help               Show this help");
    eprintln!();
    eprintln!("CHECKSUM is a hex digest, optionally prefixed with md5:, sha256: or sha512:.");
    eprintln!("Any other #fragment stays part of the URL.");
    eprintln!("Files are saved under the last path segment; existing files are not overwritten.");
}

/// Splits `URL#CHECKSUM` into a request specifier.
fn parse_spec(arg: &str) -> RequestSpec {
    match arg.rsplit_once('#') {
        Some((url, checksum)) if looks_like_checksum(checksum) => (url, checksum).into(),
        _ => arg.into(),
    }
}

/// Hex digest, optionally prefixed with a known algorithm name.
fn looks_like_checksum(fragment: &str) -> bool {
    let digest = ["md5:", "sha256:", "sha512:"]
        .iter()
        .find_map(|prefix| fragment.strip_prefix(prefix))
        .unwrap_or(fragment);
    !digest.is_empty() && digest.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parses arguments (without the program name).
///
/// # Errors
///
/// Returns [`crate::Error::Config`] for a missing option value or an unknown
/// option.
pub fn parse_args<I>(args: I) -> crate::Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs {
        output_dir: PathBuf::from("."),
        ..CliArgs::default()
    };
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| crate::Error::Config(format!("{name} requires a value")))
        };
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "--memory" => parsed.memory = true,
            "-o" | "--output-dir" => parsed.output_dir = PathBuf::from(value(&arg)?),
            "--ca-bundle" => parsed.ca_bundle = Some(PathBuf::from(value(&arg)?)),
            "--config" => parsed.config = Some(PathBuf::from(value(&arg)?)),
            other if other.starts_with('-') => {
                return Err(crate::Error::Config(format!("unknown option {other}")));
            }
            url => parsed.specs.push(parse_spec(url)),
        }
    }

    Ok(parsed)
}

/// File name a persisted download is moved to.
fn target_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .unwrap_or("download")
        .to_string()
}

/// Moves a finished download into place and describes it.
fn deliver(url: &str, result: DownloadResult, output_dir: &Path) -> (Line, u64) {
    let (outcome, bytes) = match result {
        DownloadResult::File(file) => {
            let bytes = file.as_file().metadata().map_or(0, |m| m.len());
            let target = output_dir.join(target_name(url));
            match file.persist_noclobber(&target) {
                Ok(_) => (Ok(target.display().to_string()), bytes),
                Err(e) => (Err(format!("could not save {}: {}", target.display(), e.error)), 0),
            }
        }
        DownloadResult::Buffer(buffer) => {
            let bytes = buffer.get_ref().len() as u64;
            (Ok(format!("{bytes} bytes in memory")), bytes)
        }
        DownloadResult::Error(error) => (Err(error), 0),
    };
    (
        Line {
            url: url.to_string(),
            outcome,
        },
        bytes,
    )
}

/// Runs the `fetch` command.
///
/// Returns `Ok(true)` when every URL was fetched.
///
/// # Errors
///
/// Returns an error for invalid arguments or configuration.
pub async fn run<I>(args: I) -> crate::Result<bool>
where
    I: IntoIterator<Item = String>,
{
    let args = parse_args(args)?;
    if args.help || args.specs.is_empty() {
        print_usage();
        return Ok(args.help);
    }

    let mut config = match &args.config {
        Some(path) => FetchConfig::load(path)?,
        None => FetchConfig::load_or_default()?,
    };
    if let Some(bundle) = args.ca_bundle {
        config = config.with_ca_bundle(bundle);
    }
    if !args.memory {
        std::fs::create_dir_all(&args.output_dir)?;
        // Same file system as the output directory, so persisting is a rename.
        if config.temp_dir.is_none() {
            config = config.with_temp_dir(&args.output_dir);
        }
    }

    let center = DownloadCenter::new(config)?;
    let bars = Arc::new(ProgressBars::new());
    let bars_for_progress = Arc::clone(&bars);
    let mut options = BatchOptions::new().with_progress(move |map| bars_for_progress.update(&map));
    if args.memory {
        options = options.in_memory();
    }

    // Summary keeps the order the URLs were given in.
    let mut order: Vec<String> = Vec::new();
    for spec in &args.specs {
        if !order.iter().any(|u| u == spec.url()) {
            order.push(spec.url().to_string());
        }
    }

    let mut results = center.fetch_all(args.specs, options).await;
    bars.clear();

    let mut lines = Vec::with_capacity(order.len());
    let mut total_bytes = 0;
    for url in order {
        if let Some(result) = results.remove(&url) {
            let (line, bytes) = deliver(&url, result, &args.output_dir);
            if let Err(error) = &line.outcome {
                log::error!("{url}: {error}");
            }
            total_bytes += bytes;
            lines.push(line);
        }
    }

    print_summary(&lines, total_bytes);
    Ok(lines.iter().all(|line| line.outcome.is_ok()))
}
