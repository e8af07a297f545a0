//! Progress bars and summary reporting for the `fetch` command.

use std::collections::HashMap;
use std::sync::Mutex;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::{ProgressMap, ProgressSnapshot};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Formats a byte count as a human-readable string (B, KB, MB, GB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Label shown next to a bar: the last path segment of the URL.
fn label(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(url)
}

/// One progress bar per URL, created on its first snapshot.
pub struct ProgressBars {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressBars {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Brings every bar in line with the latest progress map.
    pub fn update(&self, progress: &ProgressMap) {
        let mut bars = self
            .bars
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (url, snapshot) in progress {
            let bar = bars
                .entry(url.clone())
                .or_insert_with(|| self.multi.add(make_bar(url, snapshot)));
            bar.set_position(snapshot.current);
            if snapshot.size.is_some_and(|size| snapshot.current >= size) {
                bar.finish();
            }
        }
    }

    /// Stops all bars and removes them from the terminal.
    pub fn clear(&self) {
        let bars = self
            .bars
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for bar in bars.values() {
            bar.finish_and_clear();
        }
        let _ = self.multi.clear();
    }
}

fn make_bar(url: &str, snapshot: &ProgressSnapshot) -> ProgressBar {
    let (bar, template) = snapshot.size.map_or_else(
        || {
            (
                ProgressBar::new_spinner(),
                "{spinner:.cyan} {bytes} @ {bytes_per_sec} - {msg}",
            )
        },
        |size| {
            (
                ProgressBar::new(size),
                "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
            )
        },
    );
    bar.set_style(
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━━╌"),
    );
    bar.set_message(label(url).to_string());
    bar
}

/// Outcome of one URL as shown in the summary.
pub struct Line {
    pub url: String,
    pub outcome: std::result::Result<String, String>,
}

/// Prints one line per URL and the totals.
pub fn print_summary(lines: &[Line], total_bytes: u64) {
    if lines.is_empty() {
        println!("Nothing to fetch.");
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Fetch Summary");
    println!("{SEPARATOR}");

    for line in lines {
        match &line.outcome {
            Ok(detail) => println!("  {} {} ({detail})", style("✓").green(), line.url),
            Err(error) => println!("  {} {}: {error}", style("✗").red(), line.url),
        }
    }

    let failed = lines.iter().filter(|l| l.outcome.is_err()).count();
    println!("{SEPARATOR}");
    println!(
        "  {} fetched, {failed} failed, {} total",
        lines.len() - failed,
        format_bytes(total_bytes)
    );
    println!("{SEPARATOR}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(1_073_741_824), "1.00 GB");
        assert_eq!(format_bytes(5 * 1_099_511_627_776), "5120.00 GB");
    }

    #[test]
    fn label_is_last_segment() {
        assert_eq!(label("http://h/a/tool.tar.gz"), "tool.tar.gz");
        assert_eq!(label("http://h/dir/"), "dir");
        assert_eq!(label("plain"), "plain");
    }

    #[test]
    fn bars_follow_progress_map() {
        let bars = ProgressBars::new();
        let mut map = ProgressMap::new();
        map.insert("http://h/a".into(), ProgressSnapshot { size: Some(100), current: 0 });
        bars.update(&map);
        map.insert("http://h/a".into(), ProgressSnapshot { size: Some(100), current: 40 });
        map.insert("http://h/b".into(), ProgressSnapshot { size: None, current: 7 });
        bars.update(&map);

        let tracked = bars.bars.lock().unwrap();
        assert_eq!(tracked.len(), 2);
        assert_eq!(tracked["http://h/a"].position(), 40);
        assert_eq!(tracked["http://h/b"].position(), 7);
    }
}
