// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStack client errors and their classification.
//!
//! CloudStack reports most failures as plain English strings. Classification
//! into a closed [`ErrorKind`] happens exactly once, at the client boundary
//! (`classify_api_error`); every call site matches on [`CloudError::kind`]
//! instead of re-matching substrings.

use thiserror::Error;

use crate::constants::{DEFAULT_TERMINAL_FAILURE_CODES, TERMINAL_FAILURE_CODES_ENV};

/// Closed classification of CloudStack API failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Zero matches where a resource was looked up; drives create-vs-fetch
    /// branching.
    NotFound,

    /// The mutation already happened; treated as a successful no-op.
    AlreadyExists,

    /// More than one match where exactly one was expected. Never retried.
    Ambiguous,

    /// A VM deploy failure whose embedded `CSExceptionErrorCode` is in the
    /// configured terminal set; retrying will not help.
    Terminal,

    /// Everything else: timeouts, generic API failures. Retried via requeue.
    Transient,
}

/// Errors produced by the CloudStack client packages.
#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// CloudStack API returned an error payload, already classified.
    #[error("CloudStack API error: {message}")]
    Api {
        /// Error text as returned by CloudStack.
        message: String,
        /// Classification derived from the message.
        kind: ErrorKind,
    },

    /// More than one match where exactly one was expected.
    #[error("expected exactly 1 {resource} named {name:?}, found {count}")]
    Ambiguous {
        /// Resource type being resolved (zone, network, ...).
        resource: &'static str,
        /// Identity used for the lookup.
        name: String,
        /// Number of matches found.
        count: usize,
    },

    /// A CloudStack async job did not complete within the allotted time.
    #[error("CloudStack async job {job_id} timed out")]
    JobTimeout {
        /// Identifier of the pending job.
        job_id: String,
    },

    /// JSON decode failure on a CloudStack response.
    #[error("malformed CloudStack response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CloudError {
    /// The classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::Api { kind, .. } => *kind,
            CloudError::Ambiguous { .. } => ErrorKind::Ambiguous,
            CloudError::Http(_) | CloudError::JobTimeout { .. } | CloudError::Decode(_) => {
                ErrorKind::Transient
            }
        }
    }

    /// Whether the error means "resource absent".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether the error means the mutation had already been applied.
    #[must_use]
    pub fn is_already_applied(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Construct a not-found error for a named resource.
    #[must_use]
    pub fn not_found(resource: &str, name: &str) -> Self {
        CloudError::Api {
            message: format!("no match found for {resource} {name}"),
            kind: ErrorKind::NotFound,
        }
    }
}

/// Classify a raw CloudStack error message into an API error.
///
/// This is the single place where CloudStack's English error strings are
/// pattern-matched.
#[must_use]
pub fn classify_api_error(message: String) -> CloudError {
    let lowered = message.to_ascii_lowercase();
    let kind = if lowered.contains("no match found")
        || lowered.contains("not found")
        || lowered.contains("does not exist")
    {
        ErrorKind::NotFound
    } else if lowered.contains("already exists") || lowered.contains("there is already") {
        ErrorKind::AlreadyExists
    } else if is_terminal_deploy_error(&message) {
        ErrorKind::Terminal
    } else {
        ErrorKind::Transient
    };
    CloudError::Api { message, kind }
}

/// Whether a VM deploy error message carries a terminal
/// `CSExceptionErrorCode`.
///
/// The terminal code set defaults to `4250,9999` and can be overridden via
/// the `CLOUDSTACK_TERMINAL_FAILURE_CODES` environment variable (a
/// comma-separated list of numeric codes).
#[must_use]
pub fn is_terminal_deploy_error(message: &str) -> bool {
    let Some(code) = extract_exception_code(message) else {
        return false;
    };
    terminal_failure_codes().contains(&code)
}

/// Parse the `CSExceptionErrorCode: NNNN` marker out of an error message.
fn extract_exception_code(message: &str) -> Option<u32> {
    let marker = "CSExceptionErrorCode:";
    let idx = message.find(marker)?;
    let rest = message[idx + marker.len()..].trim_start();
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// The configured set of terminal deploy failure codes.
fn terminal_failure_codes() -> Vec<u32> {
    match std::env::var(TERMINAL_FAILURE_CODES_ENV) {
        Ok(raw) => raw
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect(),
        Err(_) => DEFAULT_TERMINAL_FAILURE_CODES.to_vec(),
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
