use clap::{Parser, Subcommand};
use repodeck_core::app::ReadProjection;
use repodeck_core::domain::ErrorTrace;
use repodeck_core::ports::RecordStore;
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser, Debug, PartialEq)]
#[command(name = "repodeck")]
#[command(about = "Clone, pull, check out and track local copies of remote Git repositories")]
pub struct CliArgs {
    /// Directory that holds the cloned repositories (overrides config)
    #[arg(long, global = true)]
    pub repos_dir: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum CliCommand {
    /// Show every known repository and its state
    List,

    /// Clone a remote repository
    Clone {
        name: String,
        address: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Name or folder of a failed clone this one replaces
        #[arg(long)]
        replaces: Option<String>,
    },

    /// Clone a failed repository again
    Retry {
        name: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Fast-forward the checked out branch from its remote
    Pull {
        name: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Check out a tag or remote branch
    Checkout { name: String, reference: String },

    /// List refs available for checkout and the current one
    Refs { name: String },

    /// Show recent commits
    Log {
        name: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Remove a repository and its working directory
    Delete { name: String },

    /// Show what git reported for the last failed operation
    Trace,
}

/// Reload the projection's records; a store error keeps the old list
pub fn reload_records(projection: &mut ReadProjection, store: &dyn RecordStore) {
    match store.list_all() {
        Ok(records) => projection.replace_records(records),
        Err(e) => warn!("Could not reload records: {:#}", e),
    }
}

/// Record name for a progress row, the folder when the record is unknown
pub fn row_label<'a>(projection: &'a ReadProjection, folder: &'a str) -> &'a str {
    projection
        .records
        .iter()
        .find(|r| r.folder == folder)
        .map(|r| r.name.as_str())
        .unwrap_or(folder)
}

/// Text printed by the `trace` command
pub fn describe_trace(trace: Option<&ErrorTrace>) -> String {
    match trace {
        Some(trace) => trace.to_string(),
        None => "No git errors recorded.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        let args = CliArgs::parse_from(["repodeck"]);
        assert_eq!(args.repos_dir, None);
        assert_eq!(args.config, None);
        assert_eq!(args.command, None);
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let args = CliArgs::parse_from([
            "repodeck",
            "list",
            "--repos-dir",
            "/test/repos",
            "--config",
            "/custom/config.toml",
        ]);
        assert_eq!(args.repos_dir, Some(PathBuf::from("/test/repos")));
        assert_eq!(args.config, Some(PathBuf::from("/custom/config.toml")));
        assert_eq!(args.command, Some(CliCommand::List));
    }

    #[test]
    fn test_cli_parse_clone_with_credentials() {
        let args = CliArgs::parse_from([
            "repodeck",
            "clone",
            "demo",
            "https://example.com/demo.git",
            "--user",
            "bob",
            "--password",
            "secret",
        ]);
        assert_eq!(
            args.command,
            Some(CliCommand::Clone {
                name: "demo".to_string(),
                address: "https://example.com/demo.git".to_string(),
                user: Some("bob".to_string()),
                password: Some("secret".to_string()),
                replaces: None,
            })
        );
    }

    #[test]
    fn test_cli_parse_checkout_and_log() {
        let args = CliArgs::parse_from(["repodeck", "checkout", "demo", "refs/tags/v1.0"]);
        assert_eq!(
            args.command,
            Some(CliCommand::Checkout {
                name: "demo".to_string(),
                reference: "refs/tags/v1.0".to_string(),
            })
        );

        let args = CliArgs::parse_from(["repodeck", "log", "demo", "--limit", "5"]);
        assert_eq!(
            args.command,
            Some(CliCommand::Log {
                name: "demo".to_string(),
                limit: Some(5),
            })
        );
    }

    #[test]
    fn test_cli_parse_trace() {
        let args = CliArgs::parse_from(["repodeck", "trace"]);
        assert_eq!(args.command, Some(CliCommand::Trace));
    }

    #[test]
    fn test_describe_trace() {
        use repodeck_core::error::{GitError, GitFailure};

        assert_eq!(describe_trace(None), "No git errors recorded.");

        let error = GitError::new(
            GitFailure::NotARepository,
            "git clone failed (Http/GenericError): unexpected http status code: 404",
        );
        let trace = ErrorTrace::new("77", "clone", &error, 0);
        let text = describe_trace(Some(&trace));
        assert!(text.starts_with("clone of 77 failed on 1970-01-01"));
        assert!(text.ends_with("unexpected http status code: 404"));
    }

    #[test]
    fn test_progress_rows_follow_reloaded_records() -> anyhow::Result<()> {
        use crate::adapters::MemoryRecordStore;
        use repodeck_core::domain::{Event, ProgressEvent, RepoRecord, RepoState};

        let store = MemoryRecordStore::new();
        let mut projection = ReadProjection::new();
        reload_records(&mut projection, &store);
        assert_eq!(row_label(&projection, "42"), "42");

        let mut record = store.add(&RepoRecord::new("demo", "https://example.com/demo.git", None))?;
        projection.apply(&Event::Progress(ProgressEvent {
            receiver_id: record.folder.clone(),
            task: "Receiving objects".to_string(),
            percent: 40,
            sequence: 1,
        }));
        reload_records(&mut projection, &store);
        assert_eq!(row_label(&projection, &record.folder), "demo");
        assert_eq!(projection.progress_for(&record.folder).map(|p| p.percent), Some(40));

        // Refresh after the clone finished drops the row's progress
        record.mark_local(Some(10));
        store.update(&record)?;
        projection.apply(&Event::Refresh);
        assert!(projection.needs_reload);
        reload_records(&mut projection, &store);
        assert!(!projection.needs_reload);
        assert_eq!(projection.records[0].state, RepoState::Local);
        assert!(projection.progress_for(&record.folder).is_none());
        Ok(())
    }

    #[test]
    fn test_cli_rejects_missing_address() {
        assert!(CliArgs::try_parse_from(["repodeck", "clone", "demo"]).is_err());
    }
}
