// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Defense-in-depth file operation validation: sensitive-file pattern
//! blocking, blocked-directory detection, and read/write size limits.
//! HITL approval remains the primary safety mechanism; this is a backstop.

use ag3nt_core::defaults::{MAX_READ_SIZE_BYTES, MAX_WRITE_SIZE_BYTES};
use parking_lot::Mutex;
use regex::Regex;
use std::path::Path;

pub const BLOCKED_FILE_PATTERNS: &[(&str, &str)] = &[
    (r"\.env$", "Environment file with potential secrets"),
    (r"\.env\.[a-zA-Z0-9_]+$", "Environment file variant"),
    (r"secrets?\.(json|yaml|yml|toml)$", "Secrets configuration file"),
    (r"credentials?\.(json|yaml|yml|toml)$", "Credentials file"),
    (r"\.pem$", "PEM certificate/key file"),
    (r"\.key$", "Private key file"),
    (r"\.p12$", "PKCS#12 certificate file"),
    (r"\.pfx$", "PFX certificate file"),
    (r"id_rsa", "SSH private key"),
    (r"id_ed25519", "SSH private key (Ed25519)"),
    (r"id_ecdsa", "SSH private key (ECDSA)"),
    (r"id_dsa", "SSH private key (DSA)"),
    (r"\.aws/credentials$", "AWS credentials file"),
    (r"\.aws/config$", "AWS config file"),
    (r"gcloud.*\.json$", "Google Cloud credentials"),
    (r"service[-_]?account.*\.json$", "Service account credentials"),
    (r"\.npmrc$", "NPM config with potential tokens"),
    (r"\.pypirc$", "PyPI config with potential tokens"),
    (r"\.netrc$", "Network credentials file"),
    (r"\.docker/config\.json$", "Docker config with potential tokens"),
    (r"\.sqlite3?$", "SQLite database file"),
    (r"\.db$", "Database file"),
];

pub const BLOCKED_DIRECTORIES: &[(&str, &str)] = &[
    (r"\.git/objects", "Git object storage"),
    (r"\.git/hooks", "Git hooks directory"),
    (r"\.git/refs", "Git references"),
    (r"node_modules/\.bin", "Node.js binary directory"),
    (r"node_modules/\.cache", "Node.js cache directory"),
    (r"__pycache__", "Python bytecode cache"),
    (r"\.pytest_cache", "Pytest cache"),
    (r"\.mypy_cache", "Mypy cache"),
    (r"\.venv/", "Python virtual environment"),
    (r"venv/", "Python virtual environment"),
    (r"\.virtualenv/", "Python virtual environment"),
    (r"dist/", "Distribution directory"),
    (r"build/", "Build directory"),
    (r"\.next/", "Next.js build directory"),
    (r"\.idea/", "IntelliJ IDEA directory"),
    (r"\.vscode/", "VS Code directory"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct FileValidationResult {
    pub is_safe: bool,
    pub reason: String,
    pub matched_pattern: Option<String>,
    pub severity: Severity,
}

impl FileValidationResult {
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            reason: String::new(),
            matched_pattern: None,
            severity: Severity::Info,
        }
    }

    pub fn unsafe_(reason: impl Into<String>, pattern: Option<String>, severity: Severity) -> Self {
        Self {
            is_safe: false,
            reason: reason.into(),
            matched_pattern: pattern,
            severity,
        }
    }
}

fn compile(patterns: &[(&str, &str)]) -> Vec<(Regex, String)> {
    patterns
        .iter()
        .map(|(pattern, reason)| {
            let compiled = Regex::new(&format!("(?i){pattern}")).expect("built-in pattern is valid regex");
            (compiled, reason.to_string())
        })
        .collect()
}

/// Validates file operations for security compliance, checking paths
/// against blocked patterns and enforcing size limits.
pub struct FileSecurityValidator {
    max_read_size: u64,
    max_write_size: u64,
    file_patterns: Mutex<Vec<(Regex, String)>>,
    dir_patterns: Vec<(Regex, String)>,
    allowed_extensions: Mutex<Vec<String>>,
}

impl Default for FileSecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSecurityValidator {
    pub fn new() -> Self {
        Self {
            max_read_size: MAX_READ_SIZE_BYTES,
            max_write_size: MAX_WRITE_SIZE_BYTES,
            file_patterns: Mutex::new(compile(BLOCKED_FILE_PATTERNS)),
            dir_patterns: compile(BLOCKED_DIRECTORIES),
            allowed_extensions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_limits(max_read_size: u64, max_write_size: u64) -> Self {
        Self {
            max_read_size,
            max_write_size,
            ..Self::new()
        }
    }

    pub fn validate_read(&self, path: &str, file_size: Option<u64>) -> FileValidationResult {
        let blocked = self.check_blocked_path(path);
        if !blocked.is_safe {
            return blocked;
        }
        if let Some(size) = file_size {
            if size > self.max_read_size {
                return FileValidationResult::unsafe_(
                    format!("File too large: {size} bytes (max: {})", self.max_read_size),
                    None,
                    Severity::Warning,
                );
            }
        }
        FileValidationResult::safe()
    }

    pub fn validate_write(&self, path: &str, content_size: Option<u64>) -> FileValidationResult {
        let blocked = self.check_blocked_path(path);
        if !blocked.is_safe {
            return blocked;
        }
        if let Some(size) = content_size {
            if size > self.max_write_size {
                return FileValidationResult::unsafe_(
                    format!("Content too large: {size} bytes (max: {})", self.max_write_size),
                    None,
                    Severity::Warning,
                );
            }
        }
        FileValidationResult::safe()
    }

    pub fn validate_delete(&self, path: &str) -> FileValidationResult {
        self.check_blocked_path(path)
    }

    pub fn validate_list(&self, path: &str) -> FileValidationResult {
        let normalized = path.replace('\\', "/");
        for (pattern, reason) in &self.dir_patterns {
            if pattern.is_match(&normalized) {
                return FileValidationResult::unsafe_(
                    format!("Access to blocked directory: {reason}"),
                    Some(pattern.as_str().to_string()),
                    Severity::Warning,
                );
            }
        }
        FileValidationResult::safe()
    }

    fn check_blocked_path(&self, path: &str) -> FileValidationResult {
        let normalized = path.replace('\\', "/");

        for (pattern, reason) in self.file_patterns.lock().iter() {
            if pattern.is_match(&normalized) {
                return FileValidationResult::unsafe_(
                    format!("Access to sensitive file blocked: {reason}"),
                    Some(pattern.as_str().to_string()),
                    Severity::Critical,
                );
            }
        }

        for (pattern, reason) in &self.dir_patterns {
            if pattern.is_match(&normalized) {
                return FileValidationResult::unsafe_(
                    format!("Access to blocked directory: {reason}"),
                    Some(pattern.as_str().to_string()),
                    Severity::Warning,
                );
            }
        }

        FileValidationResult::safe()
    }

    pub fn add_blocked_pattern(&self, pattern: &str, reason: &str) {
        if let Ok(compiled) = Regex::new(&format!("(?i){pattern}")) {
            self.file_patterns.lock().push((compiled, reason.to_string()));
        } else {
            tracing::warn!(pattern, "ignoring invalid custom blocked pattern");
        }
    }

    pub fn add_allowed_extension(&self, extension: &str) {
        let normalized = if let Some(stripped) = extension.strip_prefix('.') {
            format!(".{}", stripped.to_lowercase())
        } else {
            format!(".{}", extension.to_lowercase())
        };
        let mut extensions = self.allowed_extensions.lock();
        if !extensions.contains(&normalized) {
            extensions.push(normalized);
        }
    }

    pub fn is_extension_allowed(&self, path: &str) -> bool {
        let extensions = self.allowed_extensions.lock();
        if extensions.is_empty() {
            return true;
        }
        let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
            return false;
        };
        extensions.contains(&format!(".{}", ext.to_lowercase()))
    }
}
