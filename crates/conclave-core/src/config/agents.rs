use crate::config::split_front_matter;
use crate::error::{ConclaveError, Result};
use crate::review::AgentConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

const AGENT_FILE_SUFFIX: &str = ".agent.md";
const INSTRUCTIONS_HEADING: &str = "## Instructions";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentFrontMatter {
    name: Option<String>,
    display_name: Option<String>,
    model: Option<String>,
    focus_areas: Vec<String>,
    output_format: Option<String>,
}

/// Load every `<name>.agent.md` under `dir`, sorted by file name.
///
/// Front-matter carries name, display name, model, and focus areas; the body
/// before `## Instructions` is the system-prompt role text, everything after
/// it the instruction template. At least one agent must load and names must
/// be unique.
pub fn load_agents(dir: &Path, default_model: &str) -> Result<Vec<AgentConfig>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| {
            ConclaveError::AgentDefinition(format!("cannot read agents dir {}: {e}", dir.display()))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().ends_with(AGENT_FILE_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut agents = Vec::with_capacity(paths.len());
    let mut names = HashSet::new();

    for path in paths {
        let agent = load_agent_file(&path, default_model)?;
        if !names.insert(agent.name.clone()) {
            return Err(ConclaveError::AgentDefinition(format!(
                "duplicate agent name '{}' in {}",
                agent.name,
                path.display()
            )));
        }
        agents.push(agent);
    }

    if agents.is_empty() {
        return Err(ConclaveError::AgentDefinition(format!(
            "no *.agent.md files found in {}",
            dir.display()
        )));
    }
    Ok(agents)
}

fn load_agent_file(path: &Path, default_model: &str) -> Result<AgentConfig> {
    let text = std::fs::read_to_string(path)?;
    let (front, body) = split_front_matter(&text);

    let meta: AgentFrontMatter = match front {
        Some(yaml) => serde_yaml_ng::from_str(yaml).map_err(|e| {
            ConclaveError::AgentDefinition(format!("{}: bad front-matter: {e}", path.display()))
        })?,
        None => AgentFrontMatter::default(),
    };

    let file_stem = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
        .trim_end_matches(AGENT_FILE_SUFFIX)
        .to_string();
    let name = meta.name.unwrap_or(file_stem);
    if name.is_empty() {
        return Err(ConclaveError::AgentDefinition(format!(
            "{}: agent has no name",
            path.display()
        )));
    }
    let display_name = meta.display_name.unwrap_or_else(|| name.clone());

    let (role_prompt, instruction_template) = match body.find(INSTRUCTIONS_HEADING) {
        Some(idx) => {
            let role = body[..idx].trim();
            let template = body[idx + INSTRUCTIONS_HEADING.len()..].trim();
            (role.to_string(), template.to_string())
        }
        None => (
            format!("You are {display_name}, a specialized code review agent."),
            body.trim().to_string(),
        ),
    };

    if instruction_template.is_empty() {
        return Err(ConclaveError::AgentDefinition(format!(
            "{}: agent body has no instruction text",
            path.display()
        )));
    }

    Ok(AgentConfig {
        name,
        display_name,
        model: meta.model.unwrap_or_else(|| default_model.to_string()),
        role_prompt,
        instruction_template,
        focus_areas: meta.focus_areas,
        output_format: meta.output_format.unwrap_or_default(),
    })
}
