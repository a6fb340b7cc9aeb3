//! Local training data → row count, format, and token-length statistics.
//!
//! Lengths are estimated from characters (`⌈chars / 4⌉` over every string in
//! a row), so no tokenizer is loaded. The numbers are meant for picking a
//! sequence length, not for exact packing.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

/// Characters per token for English-heavy text under BPE vocabularies.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Rows per million trainable parameters below which overfitting is likely.
pub const OVERFIT_ROWS_PER_MILLION: f64 = 10.0;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read dataset '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset '{}' line {line}: {source}", path.display())]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("dataset '{}' must be .jsonl or .json", path.display())]
    UnsupportedExtension { path: PathBuf },

    #[error("dataset '{}' has no rows", path.display())]
    Empty { path: PathBuf },
}

/// Row layout, detected from the keys of the first row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    /// `instruction` / `input` / `output`.
    #[display("alpaca")]
    Alpaca,
    /// `conversations: [{from, value}]`.
    #[display("sharegpt")]
    ShareGpt,
    /// `messages: [{role, content}]`.
    #[display("chat")]
    Chat,
    /// `prompt` / `completion`.
    #[display("completion")]
    Completion,
    /// A single `text` field.
    #[display("text")]
    Text,
    #[display("unknown")]
    Unknown,
}

impl DatasetFormat {
    fn detect(row: &Value) -> Self {
        let Some(obj) = row.as_object() else {
            return DatasetFormat::Unknown;
        };
        let has = |key: &str| obj.contains_key(key);
        if has("conversations") {
            DatasetFormat::ShareGpt
        } else if has("messages") {
            DatasetFormat::Chat
        } else if has("instruction") && (has("output") || has("response")) {
            DatasetFormat::Alpaca
        } else if has("prompt") && (has("completion") || has("response")) {
            DatasetFormat::Completion
        } else if has("text") {
            DatasetFormat::Text
        } else {
            DatasetFormat::Unknown
        }
    }
}

/// Estimated tokens per row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeqLenStats {
    pub min: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub max: u64,
}

impl SeqLenStats {
    /// Nearest-rank percentiles. `None` when every row is empty.
    fn from_lengths(mut lengths: Vec<u64>) -> Option<Self> {
        lengths.sort_unstable();
        let max = *lengths.last()?;
        if max == 0 {
            return None;
        }
        let rank = |p: f64| {
            let idx = (p * lengths.len() as f64).ceil() as usize;
            lengths[idx.saturating_sub(1).min(lengths.len() - 1)]
        };
        Some(Self {
            min: lengths[0],
            mean: lengths.iter().sum::<u64>() as f64 / lengths.len() as f64,
            p50: rank(0.50),
            p95: rank(0.95),
            max,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetProfile {
    pub source: String,
    pub num_rows: u64,
    pub detected_format: DatasetFormat,
    pub seq_len_stats: Option<SeqLenStats>,
}

impl std::fmt::Display for DatasetProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} rows, {})", self.source, self.num_rows, self.detected_format)?;
        if let Some(stats) = &self.seq_len_stats {
            write!(
                f,
                ", ~{} / {} / {} tokens p50 / p95 / max",
                stats.p50, stats.p95, stats.max
            )?;
        }
        Ok(())
    }
}

/// Reads a `.jsonl` (one object per line) or `.json` (array of objects) file.
pub fn analyze_local(path: impl AsRef<Path>) -> Result<DatasetProfile, DatasetError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DatasetError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let rows = match extension.as_deref() {
        Some("jsonl") => parse_jsonl(path, &raw)?,
        Some("json") => parse_json_array(path, &raw)?,
        _ => {
            return Err(DatasetError::UnsupportedExtension {
                path: path.to_path_buf(),
            })
        }
    };
    let Some(first) = rows.first() else {
        return Err(DatasetError::Empty {
            path: path.to_path_buf(),
        });
    };

    let detected_format = DatasetFormat::detect(first);
    let lengths = rows.iter().map(estimate_tokens).collect();
    let profile = DatasetProfile {
        source: path.display().to_string(),
        num_rows: rows.len() as u64,
        detected_format,
        seq_len_stats: SeqLenStats::from_lengths(lengths),
    };
    crate::debug!("analyzed dataset {profile}");
    Ok(profile)
}

fn parse_jsonl(path: &Path, raw: &str) -> Result<Vec<Value>, DatasetError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| DatasetError::Json {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })
        })
        .collect()
}

fn parse_json_array(path: &Path, raw: &str) -> Result<Vec<Value>, DatasetError> {
    let value: Value = serde_json::from_str(raw).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        line: source.line(),
        source,
    })?;
    Ok(match value {
        Value::Array(rows) => rows,
        other => vec![other],
    })
}

fn estimate_tokens(row: &Value) -> u64 {
    fn chars(value: &Value) -> u64 {
        match value {
            Value::String(s) => s.chars().count() as u64,
            Value::Array(items) => items.iter().map(chars).sum(),
            Value::Object(map) => map.values().map(chars).sum(),
            _ => 0,
        }
    }
    chars(row).div_ceil(CHARS_PER_TOKEN)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
pub enum Severity {
    #[display("warning")]
    Warning,
    #[display("critical")]
    Critical,
}

/// A training-data concern that is independent of memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityWarning {
    pub severity: Severity,
    pub category: &'static str,
    pub message: String,
}

impl std::fmt::Display for SanityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.message)
    }
}

/// Overfitting from too few rows per trainable parameter, and truncation
/// when the planned `seq_len` is below the dataset's p95.
pub fn check_training_sanity(
    dataset: &DatasetProfile,
    seq_len: u64,
    trainable_params: u64,
) -> Vec<SanityWarning> {
    let mut warnings = Vec::new();

    if trainable_params > 0 {
        let rows_per_million = dataset.num_rows as f64 / (trainable_params as f64 / 1e6);
        if rows_per_million < OVERFIT_ROWS_PER_MILLION {
            warnings.push(SanityWarning {
                severity: Severity::Critical,
                category: "overfit",
                message: format!(
                    "{} rows for {:.1}M trainable params ({rows_per_million:.2} rows per 1M); \
                     expect the model to memorize the data. Add rows or lower the LoRA rank",
                    dataset.num_rows,
                    trainable_params as f64 / 1e6
                ),
            });
        }
    }

    if let Some(stats) = &dataset.seq_len_stats {
        if stats.p95 > seq_len {
            warnings.push(SanityWarning {
                severity: Severity::Warning,
                category: "truncation",
                message: format!(
                    "dataset p95 is ~{} tokens but seq_len is {seq_len}; over 5% of rows will be truncated",
                    stats.p95
                ),
            });
        }
    }
    warnings
}
