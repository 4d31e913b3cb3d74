//! toolmesh command-line host.
//!
//! Reads one message per stdin line, runs it through the orchestrator and
//! prints the JSON response. Ctrl-C or end of input stops the service and
//! releases every tool server session.
//!
//! Usage: `toolmesh [settings.yaml]` (or set `TOOLMESH_CONFIG`).

use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use toolmesh::{ChatRequest, OrchestratorService, Settings};

/// Rate-limit identity for the interactive caller.
const CLI_IDENTITY: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::resolve(cli_path.as_deref()).context("failed to load settings")?;
    toolmesh::init_tracing(settings.logging.json);

    let service = OrchestratorService::from_settings(&settings).context("failed to build orchestrator")?;
    service.start().await;

    let stdin = BufReader::new(tokio::io::stdin());
    serve(&service, stdin).await?;
    tracing::info!("shut down gracefully");
    Ok(())
}

/// Run the read loop, then stop the service whether or not the loop failed.
async fn serve<R>(service: &OrchestratorService, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let result = read_loop(service, input).await;
    service.stop().await;
    result
}

async fn read_loop<R>(service: &OrchestratorService, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let session_id = uuid::Uuid::new_v4().to_string();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let request = ChatRequest {
            message: line,
            session_id: Some(session_id.clone()),
        };
        let response = service.handle_message(CLI_IDENTITY, request).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serve_stops_service_on_read_error() {
        let service = OrchestratorService::from_settings(&Settings::default()).unwrap();
        let input: &[u8] = b"\xff\xfe\n";

        let err = serve(&service, input).await.unwrap_err();
        assert!(err.to_string().contains("failed to read stdin"));
        assert!(service.client().is_stopped());
    }

    #[tokio::test]
    async fn test_serve_stops_service_at_end_of_input() {
        let service = OrchestratorService::from_settings(&Settings::default()).unwrap();
        let input: &[u8] = b"\n  \n";

        serve(&service, input).await.unwrap();
        assert!(service.client().is_stopped());
    }
}
