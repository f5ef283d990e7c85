//! Agent process.
//!
//! Usage: `viralcut-agent <stage>`. Reads one request line from stdin,
//! writes protocol messages to stdout and logs to stderr. Exits 0 only
//! after a `completed` message.

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use viralcut_models::{AgentMessage, AgentOutput, AgentRequest, StageType};
use viralcut_worker::logging::init_tracing;
use viralcut_worker::{PipelineConfig, StageRunner, StageServices};

fn emit(message: &AgentMessage) -> Result<()> {
    println!("{}", message.to_line()?);
    Ok(())
}

async fn read_request(stage: StageType) -> Result<AgentRequest> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    if line.trim().is_empty() {
        return Err(anyhow!("no request on stdin"));
    }
    let request: AgentRequest = serde_json::from_str(line.trim())?;
    if request.stage() != stage {
        return Err(anyhow!(
            "launched for {} but received a {} request",
            stage,
            request.stage()
        ));
    }
    Ok(request)
}

async fn run(stage: StageType) -> Result<AgentOutput> {
    let request = read_request(stage).await?;
    emit(&AgentMessage::log(format!("{} stage started", stage)))?;

    let config = PipelineConfig::from_env();
    let services = StageServices::discover(&config)?;
    let runner = StageRunner::new(config, services);
    Ok(runner.execute(request).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let stage: StageType = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: viralcut-agent <download|analyze|extract>"))?
        .parse()
        .map_err(|e: String| anyhow!(e))?;

    match run(stage).await {
        Ok(output) => emit(&AgentMessage::Completed { output }),
        Err(e) => {
            error!(stage = %stage, "Agent failed: {:#}", e);
            emit(&AgentMessage::Failed {
                error: format!("{:#}", e),
            })?;
            std::process::exit(1);
        }
    }
}
