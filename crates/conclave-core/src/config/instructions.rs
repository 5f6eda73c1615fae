use crate::config::split_front_matter;
use crate::constants::instructions::DISCOVERY_FILES;
use crate::error::{ConclaveError, Result};
use crate::review::{CustomInstruction, InstructionSource};
use crate::safety::{self, AuditEvent, AuditRecord};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstructionFrontMatter {
    apply_to: Option<String>,
    description: Option<String>,
}

/// Load custom instructions: explicit paths always, target-discovered files
/// only when the trust flag is set. Everything passes the safety validator;
/// unsafe instructions are dropped (the validator audits each rejection) and
/// the run continues without them.
pub fn load_instructions(
    explicit_paths: &[PathBuf],
    target_root: Option<&Path>,
    trust_target: bool,
) -> Result<Vec<CustomInstruction>> {
    let mut instructions = Vec::new();

    for path in explicit_paths {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConclaveError::config(format!("instruction file {}: {e}", path.display()))
        })?;
        if let Some(instruction) =
            build_instruction(path, &content, InstructionSource::Explicit, false)
        {
            instructions.push(instruction);
        }
    }

    if trust_target {
        if let Some(root) = target_root {
            for candidate in DISCOVERY_FILES {
                let path = root.join(candidate);
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                AuditRecord {
                    event: AuditEvent::TrustBoundary,
                    action: "load-discovered-instruction",
                    message: "loading instruction file discovered inside the review target",
                    attributes: &[
                        ("source", path.display().to_string()),
                        ("bytes", content.len().to_string()),
                    ],
                }
                .info();
                if let Some(instruction) =
                    build_instruction(&path, &content, InstructionSource::Discovered, true)
                {
                    instructions.push(instruction);
                }
            }
        }
    }

    Ok(instructions)
}

fn build_instruction(
    path: &Path,
    raw: &str,
    source: InstructionSource,
    trusted: bool,
) -> Option<CustomInstruction> {
    let (front, body) = split_front_matter(raw);
    let meta: InstructionFrontMatter = front
        .and_then(|yaml| serde_yaml_ng::from_str(yaml).ok())
        .unwrap_or_default();

    let content = body.trim();
    if content.is_empty() {
        return None;
    }

    let source_path = path.display().to_string();
    let verdict = safety::validate(content, &source_path, trusted);
    if !verdict.safe {
        return None;
    }

    Some(CustomInstruction {
        source_path,
        content: content.to_string(),
        source,
        apply_to: meta.apply_to,
        description: meta.description,
    })
}
