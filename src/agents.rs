//! Agent directory and signer selection

use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::fs;

use crate::error::Result;
use crate::types::AgentRecord;

/// Read access to the stored agent metadata (`agents.json`)
///
/// Registration and key encryption are owned by the credential collaborator;
/// this side only lists what is already stored.
pub struct AgentDirectory {
    path: PathBuf,
}

impl AgentDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn load_agents(&self) -> Result<Vec<AgentRecord>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Persist the full agent list (seeding/demo utility).
    pub async fn write_agents(&self, agents: &[AgentRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(agents)?).await?;
        Ok(())
    }
}

/// Pick the signing agent for a start request.
///
/// Precedence: an explicitly preferred agent owned by the wallet, then the
/// wallet's first owned agent, then any registered agent. Pure so the
/// precedence order is independently verifiable.
pub fn select_agent<'a>(
    wallet_address: &str,
    preferred: Option<&str>,
    agents: &'a [AgentRecord],
) -> Option<&'a AgentRecord> {
    if let Some(preferred) = preferred {
        let owned = agents.iter().find(|agent| {
            agent.agent_address.eq_ignore_ascii_case(preferred)
                && agent.wallet_address.eq_ignore_ascii_case(wallet_address)
        });
        if owned.is_some() {
            return owned;
        }
    }
    agents
        .iter()
        .find(|agent| agent.wallet_address.eq_ignore_ascii_case(wallet_address))
        .or_else(|| agents.first())
}
