use crate::constants::output as layout;
use crate::error::Result;
use crate::prompt::substitute;
use crate::review::{AgentResult, PassResult, ReviewTarget};
use std::path::{Path, PathBuf};

/// Wall-clock stamp of the run invocation. Every artifact of one run carries
/// the same stamp, including the summary written minutes later.
#[derive(Debug, Clone)]
pub struct RunStamp(String);

impl RunStamp {
    pub fn now() -> Self {
        Self(chrono::Local::now().format(layout::RUN_STAMP_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const REPORT_TEMPLATE: &str = "# Review Report: ${agent}\n\n\
Target: ${target}\n\
Generated: ${stamp}\n\
Passes: ${passes}\n\n\
---\n\n\
${content}\n";

/// Writes run artifacts under `<base>/<target-subpath>/`:
/// per-agent reports and checkpoints in the stamped run directory, the
/// executive summary beside it. Directories are owner-only on POSIX.
pub struct ReportWriter {
    subpath_dir: PathBuf,
    run_dir: PathBuf,
    stamp: RunStamp,
    target_display: String,
}

impl ReportWriter {
    pub fn new(base: &Path, target: &ReviewTarget, stamp: RunStamp) -> Self {
        let subpath_dir = base.join(target.subpath());
        let run_dir = subpath_dir.join(stamp.as_str());
        Self {
            subpath_dir,
            run_dir,
            stamp,
            target_display: target.display_name(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn write_agent_report(&self, result: &AgentResult) -> Result<PathBuf> {
        self.ensure_dirs()?;
        let content = if result.success {
            result.content.clone()
        } else {
            format!(
                "Review failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            )
        };
        let passes_line = render_provenance(result);
        let rendered = substitute(
            REPORT_TEMPLATE,
            &[
                ("agent", result.agent_name.as_str()),
                ("target", self.target_display.as_str()),
                ("stamp", self.stamp.as_str()),
                ("passes", passes_line.as_str()),
                ("content", content.as_str()),
            ],
        );

        let path = self
            .run_dir
            .join(format!("{}{}", result.agent_name, layout::REPORT_SUFFIX));
        write_owner_only(&path, &rendered)?;
        Ok(path)
    }

    pub fn write_summary(&self, content: &str) -> Result<PathBuf> {
        self.ensure_dirs()?;
        let path = self.subpath_dir.join(format!(
            "{}{}.md",
            layout::SUMMARY_PREFIX,
            self.stamp.as_str()
        ));
        write_owner_only(&path, content)?;
        Ok(path)
    }

    /// Write-only post-mortem artifact; never read back by a later run.
    pub fn write_checkpoint(&self, pass: &PassResult) -> Result<PathBuf> {
        let dir = self.run_dir.join(layout::CHECKPOINT_DIR);
        create_dir_owner_only(&dir)?;
        let path = dir.join(format!("{}-pass-{}.json", pass.agent_name, pass.pass));
        write_owner_only(&path, &serde_json::to_string_pretty(pass)?)?;
        Ok(path)
    }

    fn ensure_dirs(&self) -> Result<()> {
        create_dir_owner_only(&self.subpath_dir)?;
        create_dir_owner_only(&self.run_dir)
    }
}

fn render_provenance(result: &AgentResult) -> String {
    if result.passes.is_empty() {
        return "none".to_string();
    }
    result
        .passes
        .iter()
        .map(|p| {
            format!(
                "{} ({}, {} ms)",
                p.pass,
                if p.success { "ok" } else { "failed" },
                p.duration.as_millis()
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_dir_owner_only(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn write_owner_only(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::PassProvenance;
    use std::time::Duration;

    fn result_with_content() -> AgentResult {
        AgentResult {
            agent_name: "security".to_string(),
            success: true,
            content: "### 1. Issue | Priority: High".to_string(),
            passes: vec![PassProvenance {
                pass: 1,
                success: true,
                duration: Duration::from_millis(42),
                error: None,
            }],
            error: None,
        }
    }

    #[test]
    fn report_lands_in_stamped_run_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let target = ReviewTarget::Repository {
            slug: "acme/api".to_string(),
        };
        let writer = ReportWriter::new(tmp.path(), &target, RunStamp::now());
        let path = writer.write_agent_report(&result_with_content()).unwrap();

        assert!(path.ends_with(
            Path::new(writer.run_dir().file_name().unwrap()).join("security-report.md")
        ));
        assert!(path.starts_with(tmp.path().join("acme_api")));
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("# Review Report: security"));
        assert!(body.contains("### 1. Issue"));
    }

    #[test]
    fn summary_sits_beside_run_directory_with_same_stamp() {
        let tmp = tempfile::tempdir().unwrap();
        let target = ReviewTarget::Repository {
            slug: "acme/api".to_string(),
        };
        let stamp = RunStamp::now();
        let stamp_str = stamp.as_str().to_string();
        let writer = ReportWriter::new(tmp.path(), &target, stamp);
        let path = writer.write_summary("summary body").unwrap();

        assert_eq!(path.parent().unwrap(), tmp.path().join("acme_api"));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains(&stamp_str));
    }

    #[cfg(unix)]
    #[test]
    fn artifacts_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let target = ReviewTarget::Repository {
            slug: "a/b".to_string(),
        };
        let writer = ReportWriter::new(tmp.path(), &target, RunStamp::now());
        let path = writer.write_agent_report(&result_with_content()).unwrap();

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(writer.run_dir())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}
