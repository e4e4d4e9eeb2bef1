//! Schema conversion via the external `sqldata` tool.
//!
//! The runner builds the tool's positional arguments from the source and
//! target connection descriptors, executes it, and parses its log for the
//! `Tables:` and `Target DDL:` summary lines. Nonzero failure counts are
//! tolerated: they downgrade to warnings and the pipeline continues into
//! data replication.

use crate::error::{ProvisionError, Result};
use dbferry_core::ProvisioningContext;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

const SOURCE_ENGINE: &str = "oracle";
const TARGET_ENGINE: &str = "mariadb";
const DEFAULT_DATA: &str = "no";
const TOOL_NAME: &str = "sqldata";
const LOG_NAME: &str = "sqldata.log";

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub db_name: String,
    pub source: String,
    pub s_port: Option<String>,
    pub service_name: String,
    pub s_user: String,
    pub s_password: String,
    pub target: String,
    pub t_user: String,
    pub t_password: String,
    pub t_port: Option<String>,
    pub data: String,
}

impl MigrationConfig {
    pub fn from_context(ctx: &ProvisioningContext) -> Result<Self> {
        Ok(Self {
            db_name: ctx.require_str("db_name", "DB Name")?.to_string(),
            source: ctx.require_str("source", "Source")?.to_string(),
            s_port: ctx.get_str("s_port").map(str::to_string),
            service_name: ctx.require_str("service_name", "Service Name")?.to_string(),
            s_user: ctx.require_str("s_user", "Source User")?.to_string(),
            s_password: ctx.require_str("s_password", "Source Password")?.to_string(),
            target: ctx.require_str("target", "Target")?.to_string(),
            t_user: ctx.require_str("t_user", "Target User")?.to_string(),
            t_password: ctx.require_str("t_password", "Target Password")?.to_string(),
            t_port: ctx.get_str("t_port").map(str::to_string),
            data: ctx.get_str("data").unwrap_or(DEFAULT_DATA).to_string(),
        })
    }

    /// Positional arguments for the conversion tool:
    /// `-data=<yes|no> -t=* -sd=oracle,<user>/<password>@<host>[:<port>]/<service>
    /// -td=mariadb,<user>/<password>@<host>[:<port>],<database>`.
    pub fn arguments(&self) -> Vec<String> {
        let source_host = match &self.s_port {
            Some(port) => format!("{}:{}", self.source, port),
            None => self.source.clone(),
        };
        let target_host = match &self.t_port {
            Some(port) => format!("{}:{}", self.target, port),
            None => self.target.clone(),
        };
        vec![
            format!("-data={}", self.data),
            "-t=*".to_string(),
            format!(
                "-sd={SOURCE_ENGINE},{}/{}@{}/{}",
                self.s_user, self.s_password, source_host, self.service_name
            ),
            format!(
                "-td={TARGET_ENGINE},{}/{}@{},{}",
                self.t_user, self.t_password, target_host, self.db_name
            ),
        ]
    }
}

/// Per-category conversion counts from the tool's summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionCounts {
    pub succeeded: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationSummary {
    pub tables: ConversionCounts,
    pub ddl: ConversionCounts,
}

impl MigrationSummary {
    pub fn is_clean(&self) -> bool {
        self.tables.failed == 0 && self.ddl.failed == 0
    }

    /// One warning per degraded counter.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.tables.failed > 0 {
            warnings.push(format!(
                "found [{}] errors converting tables, check logs for more information",
                self.tables.failed
            ));
        }
        if self.ddl.failed > 0 {
            warnings.push(format!(
                "found [{}] errors converting table structure, check logs for more information",
                self.ddl.failed
            ));
        }
        warnings
    }
}

pub struct MigrationRunner {
    config: MigrationConfig,
}

impl MigrationRunner {
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Locate the conversion executable somewhere under the home directory.
    /// Its absence is fatal.
    pub fn find_tool(home: &Path) -> Result<PathBuf> {
        let pattern = format!("{}/**/{TOOL_NAME}", home.display());
        let hit = glob::glob(&pattern)
            .map_err(|e| ProvisionError::Validation(format!("bad search pattern: {e}")))?
            .filter_map(std::result::Result::ok)
            .find(|p| p.is_file());
        hit.ok_or_else(|| {
            ProvisionError::Validation(format!(
                "{TOOL_NAME} executable not found under {}; download and install it first",
                home.display()
            ))
        })
    }

    /// Run the conversion tool to completion. Non-zero exit is fatal.
    pub async fn run(&self, tool: &Path) -> Result<()> {
        let args = self.config.arguments();
        info!(tool = %tool.display(), "running schema conversion");
        let status = Command::new(tool)
            .args(&args)
            .stdout(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(ProvisionError::Subprocess(format!(
                "{TOOL_NAME} exited with {status}"
            )));
        }
        Ok(())
    }

    /// Parse the tool's log for the two summary lines. A missing line is a
    /// parse error, not a silent skip.
    pub fn parse_summary(&self, log_dir: &Path) -> Result<MigrationSummary> {
        let log_path = log_dir.join(LOG_NAME);
        let content = std::fs::read_to_string(&log_path).map_err(|e| {
            ProvisionError::SummaryParse(format!("cannot read {}: {e}", log_path.display()))
        })?;
        let tables = parse_counts(&content, "Tables:")?;
        let ddl = parse_counts(&content, "Target DDL:")?;
        Ok(MigrationSummary { tables, ddl })
    }

    /// Log the summary; degraded counters warn but never abort.
    pub fn report(&self, summary: &MigrationSummary) {
        info!(
            tables_succeeded = summary.tables.succeeded,
            tables_failed = summary.tables.failed,
            ddl_succeeded = summary.ddl.succeeded,
            ddl_failed = summary.ddl.failed,
            "schema conversion results"
        );
        for warning in summary.warnings() {
            warn!("{warning}");
        }
        if !summary.is_clean() {
            warn!("manual intervention will be required to resolve these errors");
            info!("continuing with data migration, these are minor failures");
        }
    }
}

/// Extract `(<n> succeeded, <m> failed)` from the line containing `label`.
fn parse_counts(content: &str, label: &str) -> Result<ConversionCounts> {
    let line = content
        .lines()
        .find(|line| line.contains(label))
        .ok_or_else(|| ProvisionError::SummaryParse(format!("no '{label}' line in the log")))?;
    let open = line
        .rfind('(')
        .ok_or_else(|| ProvisionError::SummaryParse(format!("no counts on the '{label}' line")))?;
    let counts = line[open + 1..].trim_end().trim_end_matches(')');
    let mut parts = counts.split(',');
    let succeeded = parse_count(parts.next(), "succeeded", label)?;
    let failed = parse_count(parts.next(), "failed", label)?;
    Ok(ConversionCounts { succeeded, failed })
}

fn parse_count(part: Option<&str>, suffix: &str, label: &str) -> Result<u32> {
    part.and_then(|p| p.trim().strip_suffix(suffix))
        .and_then(|n| n.trim().parse().ok())
        .ok_or_else(|| {
            ProvisionError::SummaryParse(format!("malformed '{suffix}' count on the '{label}' line"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config() -> MigrationConfig {
        MigrationConfig {
            db_name: "sales".to_string(),
            source: "oracle.example.com".to_string(),
            s_port: Some("1521".to_string()),
            service_name: "ORCL".to_string(),
            s_user: "scott".to_string(),
            s_password: "tiger".to_string(),
            target: "mariadb.example.com".to_string(),
            t_user: "admin".to_string(),
            t_password: "secret".to_string(),
            t_port: Some("3306".to_string()),
            data: "no".to_string(),
        }
    }

    #[test]
    fn arguments_include_ports_when_present() {
        let args = config().arguments();
        assert_eq!(args[0], "-data=no");
        assert_eq!(args[1], "-t=*");
        assert_eq!(args[2], "-sd=oracle,scott/tiger@oracle.example.com:1521/ORCL");
        assert_eq!(args[3], "-td=mariadb,admin/secret@mariadb.example.com:3306,sales");
    }

    #[test]
    fn arguments_omit_missing_ports() {
        let mut config = config();
        config.s_port = None;
        config.t_port = None;
        let args = config.arguments();
        assert_eq!(args[2], "-sd=oracle,scott/tiger@oracle.example.com/ORCL");
        assert_eq!(args[3], "-td=mariadb,admin/secret@mariadb.example.com,sales");
    }

    #[test]
    fn degraded_summary_warns_once_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(LOG_NAME),
            "header\n     Tables: (8 succeeded, 2 failed)\n     Target DDL: (5 succeeded, 0 failed)\n",
        )
        .unwrap();

        let runner = MigrationRunner::new(config());
        let summary = runner.parse_summary(dir.path()).unwrap();
        assert_eq!(summary.tables, ConversionCounts { succeeded: 8, failed: 2 });
        assert_eq!(summary.ddl, ConversionCounts { succeeded: 5, failed: 0 });
        assert!(!summary.is_clean());
        // exactly one warning: the table failures
        assert_eq!(summary.warnings().len(), 1);
    }

    #[test]
    fn clean_summary_has_no_warnings() {
        let summary = MigrationSummary {
            tables: ConversionCounts { succeeded: 10, failed: 0 },
            ddl: ConversionCounts { succeeded: 4, failed: 0 },
        };
        assert!(summary.is_clean());
        assert!(summary.warnings().is_empty());
    }

    #[test]
    fn missing_summary_line_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOG_NAME), "Tables: (8 succeeded, 2 failed)\n").unwrap();

        let runner = MigrationRunner::new(config());
        let err = runner.parse_summary(dir.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::SummaryParse(_)));
    }

    #[test]
    fn missing_tool_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = MigrationRunner::find_tool(dir.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(_)));
    }

    #[test]
    fn tool_is_found_in_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("tools/sqldata-1.0");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join(TOOL_NAME), "#!/bin/sh\n").unwrap();

        let tool = MigrationRunner::find_tool(dir.path()).unwrap();
        assert!(tool.ends_with("tools/sqldata-1.0/sqldata"));
    }
}
