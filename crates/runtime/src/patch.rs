// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `apply_patch`: a multi-file structured patch format with Begin/End
//! markers and flexible context matching, so hunks still apply when a
//! model reproduces a context line with different whitespace or quote
//! style.
//!
//! ```text
//! *** Begin Patch
//! *** Add File: path/to/new_file.py
//! +line 1
//! *** Update File: path/to/existing.py
//! @@ context marker @@
//!  context line (unchanged)
//! -removed line
//! +added line
//! *** Delete File: path/to/old_file.py
//! *** End Patch
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("missing '*** Begin Patch' marker")]
    MissingBegin,
    #[error("missing '*** End Patch' marker")]
    MissingEnd,
    #[error("no file patches found in patch text")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePrefix {
    Context,
    Added,
    Removed,
}

#[derive(Debug, Clone)]
pub struct PatchLine {
    pub prefix: LinePrefix,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    Add,
    Delete,
    Update,
}

#[derive(Debug, Clone)]
pub struct FilePatch {
    pub action: PatchAction,
    pub path: String,
    pub lines: Vec<PatchLine>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchResult {
    pub success: bool,
    pub files_modified: Vec<String>,
    pub files_added: Vec<String>,
    pub files_deleted: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Parses the `*** Begin Patch` / `*** End Patch` structured format into
/// per-file hunks.
pub struct PatchParser;

impl PatchParser {
    pub fn parse(text: &str) -> Result<Vec<FilePatch>, PatchError> {
        let lines: Vec<&str> = text.trim().lines().collect();

        let start_idx = lines
            .iter()
            .position(|line| line.trim().eq_ignore_ascii_case("*** begin patch"))
            .ok_or(PatchError::MissingBegin)?;
        let end_idx = lines
            .iter()
            .position(|line| line.trim().eq_ignore_ascii_case("*** end patch"))
            .ok_or(PatchError::MissingEnd)?;

        let mut patches = Vec::new();
        let mut current: Option<FilePatch> = None;

        for line in &lines[start_idx + 1..end_idx] {
            if let Some(header) = parse_file_header(line.trim()) {
                if let Some(patch) = current.take() {
                    patches.push(patch);
                }
                current = Some(header);
                continue;
            }

            if line.trim().starts_with("@@") {
                continue;
            }

            let Some(patch) = current.as_mut() else {
                continue;
            };

            if let Some(rest) = line.strip_prefix('+') {
                patch.lines.push(PatchLine {
                    prefix: LinePrefix::Added,
                    content: rest.to_string(),
                });
            } else if let Some(rest) = line.strip_prefix('-') {
                patch.lines.push(PatchLine {
                    prefix: LinePrefix::Removed,
                    content: rest.to_string(),
                });
            } else if let Some(rest) = line.strip_prefix(' ') {
                patch.lines.push(PatchLine {
                    prefix: LinePrefix::Context,
                    content: rest.to_string(),
                });
            } else if line.trim().is_empty() {
                patch.lines.push(PatchLine {
                    prefix: LinePrefix::Context,
                    content: String::new(),
                });
            }
        }
        if let Some(patch) = current.take() {
            patches.push(patch);
        }

        if patches.is_empty() {
            return Err(PatchError::Empty);
        }
        Ok(patches)
    }
}

fn parse_file_header(line: &str) -> Option<FilePatch> {
    let lower = line.to_ascii_lowercase();
    let (action, rest) = if let Some(rest) = lower.strip_prefix("*** add file:") {
        (PatchAction::Add, rest)
    } else if let Some(rest) = lower.strip_prefix("*** delete file:") {
        (PatchAction::Delete, rest)
    } else if let Some(rest) = lower.strip_prefix("*** update file:") {
        (PatchAction::Update, rest)
    } else {
        return None;
    };
    let offset = line.len() - rest.len();
    Some(FilePatch {
        action,
        path: line[offset..].trim().to_string(),
        lines: Vec::new(),
    })
}

/// Applies parsed [`FilePatch`]es against files under a workspace root,
/// using progressively looser context matching when an exact line match
/// fails.
pub struct PatchApplier {
    workspace_root: PathBuf,
}

impl PatchApplier {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    pub fn apply(&self, patches: &[FilePatch], dry_run: bool) -> PatchResult {
        let mut result = PatchResult {
            success: true,
            ..Default::default()
        };

        for patch in patches {
            let resolved = self.resolve_path(&patch.path);
            let outcome = match patch.action {
                PatchAction::Add => self.apply_add(&resolved, patch, &mut result, dry_run),
                PatchAction::Delete => self.apply_delete(&resolved, patch, &mut result, dry_run),
                PatchAction::Update => self.apply_update(&resolved, patch, &mut result, dry_run),
            };
            if let Err(err) = outcome {
                result.errors.push(format!("error applying patch to {}: {err}", patch.path));
                result.success = false;
            }
        }

        info!(
            success = result.success,
            modified = result.files_modified.len(),
            added = result.files_added.len(),
            deleted = result.files_deleted.len(),
            "apply_patch complete"
        );
        result
    }

    fn resolve_path(&self, file_path: &str) -> PathBuf {
        let relative = file_path
            .strip_prefix("/workspace/")
            .or_else(|| file_path.strip_prefix('/'))
            .unwrap_or(file_path);
        self.workspace_root.join(relative)
    }

    fn apply_add(
        &self,
        resolved: &Path,
        patch: &FilePatch,
        result: &mut PatchResult,
        dry_run: bool,
    ) -> std::io::Result<()> {
        if resolved.exists() {
            result
                .warnings
                .push(format!("file already exists, overwriting: {}", patch.path));
        }

        let mut content: String = patch
            .lines
            .iter()
            .filter(|l| l.prefix == LinePrefix::Added)
            .map(|l| l.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }

        if !dry_run {
            if let Some(parent) = resolved.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(resolved, content)?;
        }
        result.files_added.push(patch.path.clone());
        Ok(())
    }

    fn apply_delete(
        &self,
        resolved: &Path,
        patch: &FilePatch,
        result: &mut PatchResult,
        dry_run: bool,
    ) -> std::io::Result<()> {
        if !resolved.exists() {
            result.warnings.push(format!("file not found for deletion: {}", patch.path));
            return Ok(());
        }
        if !dry_run {
            std::fs::remove_file(resolved)?;
        }
        result.files_deleted.push(patch.path.clone());
        Ok(())
    }

    fn apply_update(
        &self,
        resolved: &Path,
        patch: &FilePatch,
        result: &mut PatchResult,
        dry_run: bool,
    ) -> std::io::Result<()> {
        if !resolved.exists() {
            result.errors.push(format!("file not found for update: {}", patch.path));
            result.success = false;
            return Ok(());
        }

        let original = std::fs::read_to_string(resolved)?;
        let original_lines: Vec<&str> = original.split('\n').collect();

        let Some(new_lines) = apply_hunk(&original_lines, &patch.lines, result, &patch.path) else {
            result.success = false;
            return Ok(());
        };

        if !dry_run {
            std::fs::write(resolved, new_lines.join("\n"))?;
        }
        result.files_modified.push(patch.path.clone());
        Ok(())
    }
}

/// Walks `original_lines` and `patch_lines` in parallel once the first
/// context/removal line has been located by [`find_match`]. Returns
/// `None` (and records an error) when no match position can be found.
fn apply_hunk(
    original_lines: &[&str],
    patch_lines: &[PatchLine],
    result: &mut PatchResult,
    file_path: &str,
) -> Option<Vec<String>> {
    if patch_lines.is_empty() {
        return Some(original_lines.iter().map(|s| s.to_string()).collect());
    }

    let context_lines: Vec<&PatchLine> = patch_lines
        .iter()
        .filter(|l| matches!(l.prefix, LinePrefix::Context | LinePrefix::Removed))
        .collect();

    if context_lines.is_empty() {
        let mut new_lines: Vec<String> = original_lines.iter().map(|s| s.to_string()).collect();
        for line in patch_lines {
            if line.prefix == LinePrefix::Added {
                new_lines.push(line.content.clone());
            }
        }
        return Some(new_lines);
    }

    let first_ctx = &context_lines[0].content;
    let Some(match_pos) = find_match(original_lines, first_ctx) else {
        result.errors.push(format!(
            "could not find matching context in {file_path}: {:?}",
            &first_ctx.chars().take(60).collect::<String>()
        ));
        return None;
    };

    let mut out_lines = Vec::new();
    let mut orig_idx = 0;
    while orig_idx < match_pos {
        out_lines.push(original_lines[orig_idx].to_string());
        orig_idx += 1;
    }

    for line in patch_lines {
        match line.prefix {
            LinePrefix::Context => {
                if orig_idx < original_lines.len() {
                    out_lines.push(original_lines[orig_idx].to_string());
                    orig_idx += 1;
                } else {
                    out_lines.push(line.content.clone());
                }
            }
            LinePrefix::Removed => {
                if orig_idx < original_lines.len() {
                    if !lines_match(original_lines[orig_idx], &line.content) {
                        result.warnings.push(format!(
                            "removal mismatch in {file_path} at line {}: expected {:?}, got {:?}",
                            orig_idx + 1,
                            line.content.chars().take(40).collect::<String>(),
                            original_lines[orig_idx].chars().take(40).collect::<String>(),
                        ));
                    }
                    orig_idx += 1;
                }
            }
            LinePrefix::Added => out_lines.push(line.content.clone()),
        }
    }

    while orig_idx < original_lines.len() {
        out_lines.push(original_lines[orig_idx].to_string());
        orig_idx += 1;
    }

    Some(out_lines)
}

/// Progressively looser matching strategies: exact, right-stripped,
/// fully-stripped, then whitespace/quote-normalized.
fn find_match(lines: &[&str], target: &str) -> Option<usize> {
    if let Some(pos) = lines.iter().position(|line| *line == target) {
        return Some(pos);
    }
    let target_rstrip = target.trim_end();
    if let Some(pos) = lines.iter().position(|line| line.trim_end() == target_rstrip) {
        return Some(pos);
    }
    let target_strip = target.trim();
    if let Some(pos) = lines.iter().position(|line| line.trim() == target_strip) {
        return Some(pos);
    }
    let target_norm = normalize(target);
    lines.iter().position(|line| normalize(line) == target_norm)
}

fn lines_match(a: &str, b: &str) -> bool {
    a == b || a.trim_end() == b.trim_end() || a.trim() == b.trim() || normalize(a) == normalize(b)
}

/// Collapses internal whitespace and maps curly quotes onto their
/// straight equivalents, so a model-reproduced context line still
/// matches after minor re-typesetting.
fn normalize(text: &str) -> String {
    let collapsed = text.trim().split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201c}' | '\u{201d}' => '"',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_delete_update_in_one_patch() {
        let text = "*** Begin Patch\n\
             *** Add File: new.txt\n\
             +hello\n\
             *** Delete File: old.txt\n\
             *** Update File: existing.txt\n\
             @@ marker @@\n\
              unchanged\n\
             -old\n\
             +new\n\
             *** End Patch";
        let patches = PatchParser::parse(text).unwrap();
        assert_eq!(patches.len(), 3);
        assert_eq!(patches[0].action, PatchAction::Add);
        assert_eq!(patches[1].action, PatchAction::Delete);
        assert_eq!(patches[2].action, PatchAction::Update);
    }

    #[test]
    fn missing_markers_are_rejected() {
        assert!(matches!(PatchParser::parse("no markers here"), Err(PatchError::MissingBegin)));
    }

    #[test]
    fn add_file_creates_content_with_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let text = "*** Begin Patch\n*** Add File: greeting.txt\n+hello\n+world\n*** End Patch";
        let patches = PatchParser::parse(text).unwrap();
        let applier = PatchApplier::new(dir.path());
        let result = applier.apply(&patches, false);
        assert!(result.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("greeting.txt")).unwrap(),
            "hello\nworld\n"
        );
    }

    #[test]
    fn update_tolerates_whitespace_and_quote_differences_in_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.txt"), "def run():\n    return  \u{2018}ok\u{2019}\nend\n").unwrap();

        let text = "*** Begin Patch\n\
             *** Update File: existing.txt\n\
             @@ near run @@\n\
              return 'ok'\n\
             -end\n\
             +end  # trailing\n\
             *** End Patch";
        let patches = PatchParser::parse(text).unwrap();
        let applier = PatchApplier::new(dir.path());
        let result = applier.apply(&patches, false);

        assert!(result.success, "{:?}", result.errors);
        let updated = std::fs::read_to_string(dir.path().join("existing.txt")).unwrap();
        assert!(updated.contains("end  # trailing"));
    }

    #[test]
    fn update_reports_error_when_context_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.txt"), "alpha\nbeta\n").unwrap();

        let text = "*** Begin Patch\n\
             *** Update File: existing.txt\n\
              this line does not exist anywhere\n\
             -beta\n\
             +gamma\n\
             *** End Patch";
        let patches = PatchParser::parse(text).unwrap();
        let applier = PatchApplier::new(dir.path());
        let result = applier.apply(&patches, false);

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn dry_run_reports_changes_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let text = "*** Begin Patch\n*** Add File: new.txt\n+hi\n*** End Patch";
        let patches = PatchParser::parse(text).unwrap();
        let applier = PatchApplier::new(dir.path());
        let result = applier.apply(&patches, true);
        assert!(result.success);
        assert!(!dir.path().join("new.txt").exists());
    }
}
