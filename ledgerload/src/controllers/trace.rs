//! Submission trace files shared by `replay-rate` and `record-rate`.
//!
//! A trace holds one millisecond offset (relative to the round start) per submission, either as
//! newline separated text or as a `u32` record count followed by that many `u32` offsets.
use crate::error::RateControlError;
use ledgerload_core::{Config, ROUND_INDEX_PLACEHOLDER, WORKER_INDEX_PLACEHOLDER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceFormat {
    #[default]
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "BIN_BE")]
    BinBe,
    #[serde(rename = "BIN_LE")]
    BinLe,
}

/// Substitute the worker and round placeholders, then resolve against the workspace.
pub fn resolve_template(
    template: &str,
    worker_index: usize,
    round_index: usize,
    config: &Config,
) -> PathBuf {
    let path = template
        .replace(WORKER_INDEX_PLACEHOLDER, &worker_index.to_string())
        .replace(ROUND_INDEX_PLACEHOLDER, &round_index.to_string());
    config.resolve_path(path)
}

pub fn load(path: &Path, format: TraceFormat) -> Result<Vec<u64>, RateControlError> {
    if !path.exists() {
        return Err(RateControlError::TraceFileMissing(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|source| RateControlError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&bytes, format).map_err(|reason| RateControlError::MalformedTrace {
        path: path.to_path_buf(),
        reason,
    })
}

pub fn parse(bytes: &[u8], format: TraceFormat) -> Result<Vec<u64>, String> {
    match format {
        TraceFormat::Text => parse_text(bytes),
        TraceFormat::BinBe => parse_binary(bytes, u32::from_be_bytes),
        TraceFormat::BinLe => parse_binary(bytes, u32::from_le_bytes),
    }
}

fn parse_text(bytes: &[u8]) -> Result<Vec<u64>, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            line.trim()
                .parse::<u64>()
                .map_err(|e| format!("line {}: \"{}\": {e}", idx + 1, line.trim()))
        })
        .collect()
}

fn parse_binary(bytes: &[u8], decode: fn([u8; 4]) -> u32) -> Result<Vec<u64>, String> {
    let mut words = bytes.chunks_exact(4).map(|chunk| {
        let mut word = [0u8; 4];
        word.copy_from_slice(chunk);
        decode(word)
    });

    let count = words.next().ok_or("missing record count")? as usize;
    let offsets: Vec<u64> = words.take(count).map(u64::from).collect();
    if offsets.len() < count {
        return Err(format!(
            "expected {count} records, found {}",
            offsets.len()
        ));
    }
    Ok(offsets)
}

pub fn encode(offsets: &[u64], format: TraceFormat) -> Vec<u8> {
    let encode_binary = |encode: fn(u32) -> [u8; 4]| {
        let count = u32::try_from(offsets.len()).unwrap_or(u32::MAX);
        std::iter::once(count)
            .chain(
                offsets
                    .iter()
                    .take(count as usize)
                    .map(|o| u32::try_from(*o).unwrap_or(u32::MAX)),
            )
            .flat_map(encode)
            .collect::<Vec<u8>>()
    };

    match format {
        TraceFormat::Text => offsets
            .iter()
            .map(|o| format!("{o}\n"))
            .collect::<String>()
            .into_bytes(),
        TraceFormat::BinBe => encode_binary(u32::to_be_bytes),
        TraceFormat::BinLe => encode_binary(u32::to_le_bytes),
    }
}
