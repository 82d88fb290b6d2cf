//! Executor boundary: the per-tenant provisioning step.
//!
//! Executors are called from blocking cluster-runner threads, one tenant at a
//! time per cluster. Any error is a recoverable per-tenant failure; the
//! runner stamps the attempt in the catalog either way.

use std::process::Command;
use tracing::debug;
use tup_common::{EnvType, ExecutorConfig, ExecutorError, Tenant};

/// Bytes of stderr kept in [`ExecutorError::CommandFailed`].
const STDERR_TAIL: usize = 2048;

pub trait Executor: Send + Sync {
    /// Refresh `env_types` of `tenant`.
    fn update(
        &self,
        tenant: &Tenant,
        acting_user: Option<&str>,
        env_types: &[EnvType],
        allow_self_healing: bool,
    ) -> Result<(), ExecutorError>;
}

/// Runs an external program once per tenant.
///
/// The program receives `TUP_TENANT_ID`, `TUP_OS_USERNAME`, `TUP_ENV_TYPES`
/// (comma separated), `TUP_SELF_HEALING` and, when set, `TUP_ACTING_USER`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `None` when no program is configured.
    pub fn from_config(config: &ExecutorConfig) -> Option<Self> {
        config
            .program
            .as_ref()
            .map(|program| Self::new(program.clone(), config.args.clone()))
    }
}

impl Executor for CommandExecutor {
    fn update(
        &self,
        tenant: &Tenant,
        acting_user: Option<&str>,
        env_types: &[EnvType],
        allow_self_healing: bool,
    ) -> Result<(), ExecutorError> {
        let types = env_types
            .iter()
            .map(EnvType::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("TUP_TENANT_ID", &tenant.id)
            .env("TUP_OS_USERNAME", &tenant.os_username)
            .env("TUP_ENV_TYPES", &types)
            .env("TUP_SELF_HEALING", allow_self_healing.to_string());
        if let Some(user) = acting_user {
            command.env("TUP_ACTING_USER", user);
        }

        debug!(tenant_id = %tenant.id, program = %self.program, env_types = %types, "running update command");
        let output = command.output().map_err(|source| ExecutorError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ExecutorError::CommandFailed {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            })
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_TAIL {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}
