use super::{bootstrap, Startup};
use anyhow::bail;
use std::io::{self, Write};
use strata_core::AppConfig;
use strata_migrate::{CommandRequest, CommandResponse, Orchestrator};

/// Run a command that answers immediately and print its JSON response
pub async fn run_query(config: &AppConfig, cmd: &str, startup: Startup) -> anyhow::Result<()> {
    let orchestrator = bootstrap(config, startup).await?;
    let response = orchestrator.handle_command(&CommandRequest::new(cmd)).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        bail!("{}", response.message.unwrap_or_default());
    }
    Ok(())
}

/// Start `migrate` or `finalize` and follow the worker until it stops
pub async fn run_worker(config: &AppConfig, cmd: &str, verbose: bool) -> anyhow::Result<()> {
    let orchestrator = bootstrap(config, Startup::Initialize).await?;
    let mut stdout = io::stdout();
    follow(&orchestrator, cmd, verbose, &mut stdout).await?;
    Ok(())
}

/// Issue `cmd`, then poll `progress` until the worker has finished,
/// streaming new output lines to `out`
pub async fn follow<W: Write>(
    orchestrator: &Orchestrator,
    cmd: &str,
    verbose: bool,
    out: &mut W,
) -> anyhow::Result<CommandResponse> {
    let poll_interval = *orchestrator.config().get_poll_interval();
    let mut response = orchestrator
        .handle_command(&CommandRequest::new(cmd).verbose(verbose))
        .await?;
    if !response.success {
        bail!("{}", response.message.as_deref().unwrap_or("Command failed"));
    }

    let mut printed = 0;
    loop {
        printed = write_unseen(out, response.output.as_deref(), printed)?;
        if !response.is_running() || response.exception.is_some() {
            break;
        }

        let worker_gone = !orchestrator.progress().is_worker_alive();
        if !worker_gone {
            tokio::time::sleep(poll_interval).await;
        }
        response = orchestrator
            .handle_command(&CommandRequest::new("progress"))
            .await?;
        if worker_gone {
            printed = write_unseen(out, response.output.as_deref(), printed)?;
            break;
        }
    }

    if let Some(exception) = &response.exception {
        bail!("Migration failed: {}", exception);
    }
    if let Some(status) = response.status {
        writeln!(out, "Migration status: {}", status)?;
    }
    Ok(response)
}

/// Write the part of `output` past the first `printed` bytes
///
/// Progress snapshots always repeat the full worker output, so the number
/// of bytes already written is enough to find the new tail.
fn write_unseen<W: Write>(out: &mut W, output: Option<&str>, printed: usize) -> io::Result<usize> {
    match output {
        Some(text) if text.len() > printed && text.is_char_boundary(printed) => {
            out.write_all(text[printed..].as_bytes())?;
            out.flush()?;
            Ok(text.len())
        }
        _ => Ok(printed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strata_migrate::{Catalog, OrchestratorConfigBuilder, SqlMigration};
    use strata_store::{MemoryDatabase, MigrationState};

    fn orchestrator(db: &MemoryDatabase) -> Orchestrator {
        let catalog = Catalog::builder()
            .register(Arc::new(
                SqlMigration::parse(
                    101,
                    "copy users",
                    "-- migrate\nINSERT INTO user_m SELECT * FROM user_t;\n-- finalize\nDROP TABLE user_t;\n",
                )
                .unwrap(),
            ))
            .build(100)
            .unwrap();
        let config = OrchestratorConfigBuilder::testing()
            .build()
            .expect("Failed to build config");
        Orchestrator::new(Arc::new(db.clone()), catalog, config)
    }

    #[test]
    fn test_write_unseen_only_writes_the_tail() {
        let mut out = Vec::new();
        let printed = write_unseen(&mut out, Some("started\n"), 0).unwrap();
        let printed = write_unseen(&mut out, Some("started\n"), printed).unwrap();
        let printed = write_unseen(&mut out, Some("started\nfinished\n"), printed).unwrap();
        let printed = write_unseen(&mut out, None, printed).unwrap();

        assert_eq!(printed, 17);
        assert_eq!(String::from_utf8(out).unwrap(), "started\nfinished\n");
    }

    #[tokio::test]
    async fn test_follow_finalize_to_completion() {
        let db = MemoryDatabase::new();
        let orchestrator = orchestrator(&db);
        orchestrator.initialize().await.unwrap();

        let mut out = Vec::new();
        let response = follow(&orchestrator, "finalize", true, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(response.status, Some(MigrationState::Finalized));
        assert!(text.contains("finalizing index 101 (copy users)"));
        assert!(text.ends_with("Migration status: FINALIZED\n"));
    }

    #[tokio::test]
    async fn test_follow_reports_worker_failure() {
        let db = MemoryDatabase::new();
        db.fail_statements_containing("user_m");
        let orchestrator = orchestrator(&db);
        orchestrator.initialize().await.unwrap();

        let mut out = Vec::new();
        let err = follow(&orchestrator, "migrate", false, &mut out)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Migration failed:"));
        assert_eq!(db.state_of(101), Some(MigrationState::MigrationRunning));
    }

    #[tokio::test]
    async fn test_follow_rejects_unknown_command() {
        let db = MemoryDatabase::new();
        let orchestrator = orchestrator(&db);

        let mut out = Vec::new();
        let err = follow(&orchestrator, "rollback", false, &mut out)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown command: rollback");
    }
}
