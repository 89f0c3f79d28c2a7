// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-facing configuration errors.
//!
//! Deserialization failures from figment are mapped onto [`ConfigError`]
//! values. Unknown keys are located in the TOML text they came from, so
//! miette can underline them, and get a "did you mean" hint from `strsim`.

#![allow(unused_assignments)] // emitted by the miette Diagnostic derive

use std::path::Path;

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a known key must beat to be offered as a correction.
const CLOSE_ENOUGH: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("`{key}` is not a courier setting")]
    #[diagnostic(code(courier::config::unknown_key), help("{}", unknown_key_hint(suggestion.as_deref(), valid_keys)))]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("unrecognized here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(courier::config::invalid_type), help("use a value of type {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    #[error("`{key}` is required but was not set")]
    #[diagnostic(code(courier::config::missing_key), help("set `{key}` in courier.toml or via COURIER_* env"))]
    MissingKey { key: String },

    /// Deserialized fine, rejected by a semantic check.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(courier::config::validation))]
    Validation { message: String },

    #[error("could not load configuration: {0}")]
    #[diagnostic(code(courier::config::other))]
    Other(String),
}

fn unknown_key_hint(suggestion: Option<&str>, valid_keys: &str) -> String {
    let known = format!("known keys here: {valid_keys}");
    suggestion.map_or(known.clone(), |s| format!("perhaps `{s}`? {known}"))
}

/// TOML texts a failed load may have read, keyed by display path.
#[derive(Debug, Default, Clone)]
pub struct ConfigSources {
    files: Vec<(String, String)>,
}

impl ConfigSources {
    /// A single in-memory document.
    pub fn inline(content: &str) -> Self {
        Self {
            files: vec![("<inline>".to_string(), content.to_string())],
        }
    }

    /// Read each path that exists; unreadable files are skipped.
    pub fn read<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let files = paths
            .into_iter()
            .filter_map(|path| {
                let path = std::path::absolute(path.as_ref()).ok()?;
                let content = std::fs::read_to_string(&path).ok()?;
                Some((path.display().to_string(), content))
            })
            .collect();
        Self { files }
    }

    fn pick(&self, origin: Option<&Path>) -> Option<&(String, String)> {
        match origin {
            Some(origin) => {
                let wanted = std::path::absolute(origin).ok()?;
                let wanted = wanted.display().to_string();
                self.files.iter().find(|(name, _)| *name == wanted)
            }
            // Providers built from strings carry no path.
            None if self.files.len() == 1 => self.files.first(),
            None => None,
        }
    }

    fn locate(
        &self,
        error: &figment::Error,
        key: &str,
    ) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
        let origin = error
            .metadata
            .as_ref()
            .and_then(|meta| meta.source.as_ref())
            .and_then(|source| source.file_path());

        self.pick(origin)
            .and_then(|(name, text)| {
                let at = find_key_offset(text, &error.path, key)?;
                Some((
                    Some(SourceSpan::new(at.into(), key.len())),
                    Some(NamedSource::new(name, text.clone())),
                ))
            })
            .unwrap_or((None, None))
    }
}

/// Map each failure in a figment error chain to a [`ConfigError`].
pub fn figment_to_config_errors(err: figment::Error, sources: &ConfigSources) -> Vec<ConfigError> {
    err.into_iter().map(|e| convert(&e, sources)).collect()
}

fn convert(error: &figment::Error, sources: &ConfigSources) -> ConfigError {
    match &error.kind {
        Kind::UnknownField(key, known) => {
            let (span, src) = sources.locate(error, key);
            ConfigError::UnknownKey {
                key: key.clone(),
                suggestion: suggest_key(key, known),
                valid_keys: known.join(", "),
                span,
                src,
            }
        }
        Kind::MissingField(key) => ConfigError::MissingKey {
            key: key.to_string(),
        },
        Kind::InvalidType(found, wanted) => ConfigError::InvalidType {
            key: error.path.join("."),
            detail: format!("got {found}, wanted {wanted}"),
            expected: wanted.clone(),
        },
        _ => ConfigError::Other(error.to_string()),
    }
}

/// Byte offset where `key` is assigned, searching below the `[table]` header
/// named by the first element of `path` (or the whole document at top level).
pub fn find_key_offset(content: &str, path: &[String], key: &str) -> Option<usize> {
    let base = match path.first() {
        Some(table) => {
            let header = format!("[{table}]");
            content.find(&header)? + header.len()
        }
        None => 0,
    };

    let mut cursor = base;
    for line in content[base..].split_inclusive('\n') {
        let body = line.trim_start();
        let assigns_key = body
            .strip_prefix(key)
            .is_some_and(|rest| rest.starts_with([' ', '\t', '=']));
        if assigns_key {
            return Some(cursor + (line.len() - body.len()));
        }
        cursor += line.len();
    }
    None
}

/// The known key most similar to `typo`, provided it is similar enough.
pub fn suggest_key(typo: &str, known: &[&str]) -> Option<String> {
    let mut best: Option<(f64, &str)> = None;
    for candidate in known {
        let score = strsim::jaro_winkler(typo, candidate);
        if score > CLOSE_ENOUGH && best.is_none_or(|(top, _)| score > top) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, key)| key.to_string())
}

/// Print each error to stderr as a miette report.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut report = String::new();
        match handler.render_report(&mut report, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{report}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
