use crate::{ReviewArgs, SkillArgs};
use anyhow::{Context, Result};
use conclave_core::safety::{redact_token, token_hash, AuditEvent, AuditRecord};
use conclave_core::{
    collect, load_agents, load_instructions, AuthToken, CollectionConfig, ConclaveError,
    ExecutionMode, ExecutiveSummarizer, HttpTransport, Orchestrator, ReportWriter, ReviewContext,
    ReviewTarget, RunStamp, Settings, SummaryConfig, TransportClient, WatchdogScheduler,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const OUTPUT_CONSTRAINTS: &str = "Report every finding as its own numbered section headed \
`### <n>. <title>`, followed by a table of `| **Priority** | ... |`, `| **Summary** | ... |`, \
`| **Location** | ... |` rows (Priority is one of Critical, High, Medium, Low), then free-form \
detail. If there is nothing to report, say so in plain prose without a section header.";

/// Validation failures exit with a distinct code; everything else that
/// bubbles up here is catastrophic.
pub fn is_validation_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ConclaveError>(),
            Some(
                ConclaveError::Config(_)
                    | ConclaveError::AgentDefinition(_)
                    | ConclaveError::UnsafeInstruction { .. }
            )
        )
    })
}

pub async fn run_review(config_path: Option<&Path>, args: ReviewArgs) -> Result<()> {
    let mut settings = Settings::load_from(config_path);
    if let Some(passes) = args.passes {
        settings.review_passes = passes;
    }
    if let Some(parallelism) = args.parallelism {
        settings.parallelism = parallelism;
    }
    if args.structured {
        settings.feature_flags.structured_concurrency = true;
    }

    let token = read_token(args.token_stdin)?;
    let target = resolve_target(
        &args.target,
        &CollectionConfig {
            max_file_size: settings.local_files.max_file_size,
            max_total_size: settings.local_files.max_total_size,
        },
    )?;

    let agents = load_agents(&args.agents_dir, &args.model).context("loading agent definitions")?;

    let target_root = match &target {
        ReviewTarget::LocalDirectory { path, .. } => Some(path.as_path()),
        ReviewTarget::Repository { .. } => None,
    };
    let instructions = load_instructions(
        &args.instructions,
        target_root,
        args.trust_target_instructions,
    )
    .context("loading custom instructions")?;

    let transport: Arc<dyn TransportClient> = Arc::new(HttpTransport::new(args.base_url.clone()));
    let ctx = build_context(&settings, transport, token, args.effort.clone(), instructions);

    let stamp = RunStamp::now();
    let writer = Arc::new(ReportWriter::new(&args.output, &target, stamp));

    let mode = if settings.feature_flags.structured_concurrency {
        ExecutionMode::Structured
    } else {
        ExecutionMode::Tasks
    };

    let checkpoint_writer = writer.clone();
    let checkpoint_token = ctx.auth_token.clone();
    let orchestrator = Orchestrator::new(
        ctx.clone(),
        settings.parallelism,
        settings.review_passes,
        mode,
        settings.orchestrator_timeout(),
    )
    .with_pass_observer(Arc::new(move |pass_result| {
        // Checkpoints are artifacts too; scrub them like the reports.
        let mut checkpoint = pass_result.clone();
        checkpoint.content = redact_token(&checkpoint.content, &checkpoint_token);
        if let Some(error) = checkpoint.error.take() {
            checkpoint.error = Some(redact_token(&error, &checkpoint_token));
        }
        if let Err(e) = checkpoint_writer.write_checkpoint(&checkpoint) {
            tracing::warn!(error = %e, "failed to write checkpoint");
        }
    }));

    let mut results = orchestrator.execute_reviews(&agents, &target).await?;

    for result in &mut results {
        result.content = redact_token(&result.content, &ctx.auth_token);
        let path = writer
            .write_agent_report(result)
            .with_context(|| format!("writing report for {}", result.agent_name))?;
        tracing::info!(agent = %result.agent_name, path = %path.display(), "report written");
    }

    let summarizer = ExecutiveSummarizer::new(
        ctx.clone(),
        SummaryConfig {
            max_content_per_agent: settings.summary.max_content_per_agent,
            max_total_prompt_content: settings.summary.max_total_prompt_content,
            fallback_excerpt_length: settings.summary.fallback_excerpt_length,
        },
        args.model.clone(),
    );
    let summary = summarizer
        .summarize(&results, &target.display_name())
        .await;
    let summary_path = writer
        .write_summary(&redact_token(&summary, &ctx.auth_token))
        .context("writing executive summary")?;

    let successful = results.iter().filter(|r| r.success).count();
    println!(
        "Review complete: {} agents, {} successful, {} failed.",
        results.len(),
        successful,
        results.len() - successful
    );
    println!("Reports: {}", writer.run_dir().display());
    println!("Summary: {}", summary_path.display());

    Ok(())
}

pub async fn run_skill_command(config_path: Option<&Path>, args: SkillArgs) -> Result<()> {
    let settings = Settings::load_from(config_path);
    let token = read_token(args.token_stdin)?;

    let prompt = if Path::new(&args.prompt).is_file() {
        std::fs::read_to_string(&args.prompt).context("reading prompt file")?
    } else {
        args.prompt.clone()
    };

    let transport: Arc<dyn TransportClient> = Arc::new(HttpTransport::new(args.base_url.clone()));
    let ctx = build_context(&settings, transport, token, None, Vec::new());

    let output = conclave_core::run_skill(&ctx, &args.model, &prompt).await?;
    println!("{}", redact_token(&output, &ctx.auth_token));
    Ok(())
}

fn build_context(
    settings: &Settings,
    transport: Arc<dyn TransportClient>,
    token: AuthToken,
    effort: Option<String>,
    instructions: Vec<conclave_core::CustomInstruction>,
) -> Arc<ReviewContext> {
    Arc::new(ReviewContext {
        transport,
        agent_timeout: settings.agent_timeout(),
        idle_timeout: settings.idle_timeout(),
        summary_timeout: settings.summary_timeout(),
        review_retry: settings.retry_policy(conclave_core::OpClass::Review),
        summary_retry: settings.retry_policy(conclave_core::OpClass::Summary),
        skill_retry: settings.retry_policy(conclave_core::OpClass::Skill),
        reasoning_effort: effort,
        output_constraints: OUTPUT_CONSTRAINTS.to_string(),
        mcp_servers: Vec::new(),
        scheduler: Arc::new(WatchdogScheduler::new()),
        breakers: Arc::new(settings.breaker_registry()),
        instructions,
        auth_token: token,
    })
}

/// Tokens enter at a narrow boundary: the environment variable or stdin.
/// There is deliberately no `--token` flag; a token on the command line would
/// land in shell history and process listings.
fn read_token(from_stdin: bool) -> Result<AuthToken> {
    let (raw, source) = if from_stdin {
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("reading token from stdin")?;
        (line.trim().to_string(), "stdin")
    } else {
        let value = std::env::var("CONCLAVE_API_TOKEN").map_err(|_| {
            ConclaveError::config(
                "no API token: set CONCLAVE_API_TOKEN or pass --token-stdin",
            )
        })?;
        (value.trim().to_string(), "env")
    };

    if raw.is_empty() {
        return Err(ConclaveError::config("API token is empty").into());
    }

    let token = AuthToken::new(raw);
    AuditRecord {
        event: AuditEvent::Auth,
        action: "token-accepted",
        message: "authentication token accepted",
        attributes: &[
            ("sha256", token_hash(&token)),
            ("source", source.to_string()),
        ],
    }
    .info();
    Ok(token)
}

fn resolve_target(raw: &str, collection: &CollectionConfig) -> Result<ReviewTarget> {
    let path = PathBuf::from(raw);
    if path.is_dir() {
        let source = collect(&path, collection)?;
        return Ok(ReviewTarget::LocalDirectory { path, source });
    }

    let looks_like_slug = raw.split('/').count() == 2
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));
    if looks_like_slug {
        return Ok(ReviewTarget::Repository {
            slug: raw.to_string(),
        });
    }

    Err(ConclaveError::config(format!(
        "target '{raw}' is neither an existing directory nor an owner/name slug"
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_targets_resolve_as_repository() {
        let target = resolve_target("acme/api", &CollectionConfig::default()).unwrap();
        assert!(matches!(target, ReviewTarget::Repository { slug } if slug == "acme/api"));
    }

    #[test]
    fn directory_targets_collect_source() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("main.rs"), "fn main() {}").unwrap();
        let target =
            resolve_target(tmp.path().to_str().unwrap(), &CollectionConfig::default()).unwrap();
        match target {
            ReviewTarget::LocalDirectory { source, .. } => {
                assert_eq!(source.file_count, 1);
                assert!(source.content.contains("fn main"));
            }
            _ => panic!("expected local directory target"),
        }
    }

    #[test]
    fn garbage_targets_are_validation_errors() {
        let error = resolve_target("not a target!!", &CollectionConfig::default()).unwrap_err();
        assert!(is_validation_error(&error));
    }
}
