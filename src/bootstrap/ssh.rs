//! Bootstrapper that drives hosts over `ssh`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::OpenStackCredentials;
use crate::error::{BootstrapError, Result};

use super::salt_cloud::{CloudProvider, PROVIDER_CONFIG_PATH};
use super::{Bootstrapper, HA_PILLAR_PATH, HaConfig};

/// Maximum time to wait for a new host to accept SSH.
const SSH_READY_TIMEOUT: Duration = Duration::from_secs(180);

/// Time between SSH connection attempts.
const SSH_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Salt bootstrap script location.
const SALT_BOOTSTRAP_URL: &str = "https://bootstrap.saltstack.com";

/// Where salt states live on the control server.
const SALT_STATES_DIR: &str = "/srv/salt";

/// Where root's private key goes on the control server.
const ROOT_PRIVATE_KEY_PATH: &str = "/root/.ssh/id_rsa";

/// Connection options for [`SshBootstrapper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    /// Remote login user.
    pub user: String,
    /// Private key passed with `-i`.
    pub identity_file: Option<PathBuf>,
    /// `ConnectTimeout` in seconds.
    pub connect_timeout_secs: u64,
    /// Git repository holding the salt states.
    pub states_repo: String,
}

impl SshOptions {
    /// Creates options for a user and a states repository.
    #[must_use]
    pub fn new(user: impl Into<String>, states_repo: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            identity_file: None,
            connect_timeout_secs: 10,
            states_repo: states_repo.into(),
        }
    }

    /// Sets the identity file.
    #[must_use]
    pub fn with_identity_file(mut self, path: Option<PathBuf>) -> Self {
        self.identity_file = path;
        self
    }
}

/// Runs the bootstrap steps through the system `ssh` binary.
#[derive(Clone)]
pub struct SshBootstrapper {
    options: SshOptions,
    credentials: OpenStackCredentials,
    public_network: String,
}

impl std::fmt::Debug for SshBootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshBootstrapper")
            .field("options", &self.options)
            .field("public_network", &self.public_network)
            .finish_non_exhaustive()
    }
}

/// Quotes a value for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn download_salt_bootstrap() -> String {
    format!("curl -fsSL {SALT_BOOTSTRAP_URL} -o /tmp/bootstrap-salt.sh")
}

/// Installs the salt master with salt-cloud, then clones or updates the states.
fn control_bootstrap_command(states_repo: &str) -> String {
    format!(
        "{download} && sudo sh /tmp/bootstrap-salt.sh -M -L -N && \
         (test -d {SALT_STATES_DIR} || sudo git clone {repo} {SALT_STATES_DIR}) && \
         cd {SALT_STATES_DIR} && sudo git pull",
        download = download_salt_bootstrap(),
        repo = shell_quote(states_repo),
    )
}

/// Installs a minion that reports to the master.
fn worker_bootstrap_command(control_address: &str) -> String {
    format!(
        "{} && sudo sh /tmp/bootstrap-salt.sh -A {}",
        download_salt_bootstrap(),
        shell_quote(control_address)
    )
}

/// Accepts each minion key. `None` when there is nothing to accept.
fn register_command(worker_ids: &[String]) -> Option<String> {
    if worker_ids.is_empty() {
        return None;
    }
    Some(
        worker_ids
            .iter()
            .map(|id| format!("sudo salt-key -y -a {}", shell_quote(id)))
            .collect::<Vec<_>>()
            .join(" && "),
    )
}

/// Writes stdin to `path` with the given mode.
fn write_file_command(path: &str, mode: &str) -> String {
    let dir = path.rsplit_once('/').map_or("/", |(dir, _)| dir);
    format!(
        "sudo mkdir -p {dir} && sudo tee {path} > /dev/null && sudo chmod {mode} {path}",
        dir = shell_quote(dir),
        path = shell_quote(path),
    )
}

impl SshBootstrapper {
    /// Creates a bootstrapper.
    #[must_use]
    pub fn new(
        options: SshOptions,
        credentials: OpenStackCredentials,
        public_network: impl Into<String>,
    ) -> Self {
        Self {
            options,
            credentials,
            public_network: public_network.into(),
        }
    }

    fn ssh_args(&self, address: &str) -> Vec<String> {
        let mut args = vec![
            String::from("-o"),
            String::from("StrictHostKeyChecking=no"),
            String::from("-o"),
            String::from("UserKnownHostsFile=/dev/null"),
            String::from("-o"),
            format!("ConnectTimeout={}", self.options.connect_timeout_secs),
            String::from("-o"),
            String::from("BatchMode=yes"),
        ];
        if let Some(identity) = &self.options.identity_file {
            args.push(String::from("-i"));
            args.push(identity.display().to_string());
        }
        args.push(format!("{}@{address}", self.options.user));
        args
    }

    /// Waits until the host accepts SSH logins.
    async fn wait_for_ssh(&self, address: &str) -> Result<()> {
        let start = std::time::Instant::now();
        let mut attempt = 0u32;

        while start.elapsed() < SSH_READY_TIMEOUT {
            attempt += 1;
            debug!("Checking SSH on {address} (attempt {attempt})");

            let status = Command::new("ssh")
                .args(self.ssh_args(address))
                .arg("true")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;

            match status {
                Ok(status) if status.success() => {
                    debug!("SSH ready on {address} after {}s", start.elapsed().as_secs());
                    return Ok(());
                }
                Ok(_) => debug!("SSH not ready on {address} yet"),
                Err(e) => warn!("SSH check on {address} failed: {e}"),
            }

            tokio::time::sleep(SSH_RETRY_INTERVAL).await;
        }

        Err(BootstrapError::Spawn {
            host: address.to_string(),
            message: format!("SSH not available after {} seconds", SSH_READY_TIMEOUT.as_secs()),
        }
        .into())
    }

    /// Runs a command on the host, feeding `stdin` when given.
    async fn run(&self, address: &str, command: &str, stdin: Option<&str>) -> Result<String> {
        debug!("Running on {address}: {command}");

        let mut child = Command::new("ssh")
            .args(self.ssh_args(address))
            .arg(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BootstrapError::Spawn {
                host: address.to_string(),
                message: e.to_string(),
            })?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BootstrapError::CommandFailed {
                host: address.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn write_file(&self, address: &str, path: &str, contents: &str, mode: &str) -> Result<()> {
        self.run(address, &write_file_command(path, mode), Some(contents))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Bootstrapper for SshBootstrapper {
    async fn bootstrap_control_server(&self, address: &str) -> Result<()> {
        info!("Bootstrapping salt master on {address}");
        self.wait_for_ssh(address).await?;
        self.run(address, &control_bootstrap_command(&self.options.states_repo), None)
            .await?;
        Ok(())
    }

    async fn configure_cloud_provider(
        &self,
        control_address: &str,
        network_name: &str,
    ) -> Result<()> {
        info!("Configuring salt-cloud on {control_address}");
        let document =
            CloudProvider::new(&self.credentials, &self.public_network, network_name).render()?;
        self.write_file(control_address, PROVIDER_CONFIG_PATH, &document, "600")
            .await
    }

    async fn install_private_key(&self, control_address: &str, private_key: &str) -> Result<()> {
        info!("Writing private key for salt-cloud on {control_address}");
        self.write_file(control_address, ROOT_PRIVATE_KEY_PATH, private_key, "600")
            .await
    }

    async fn bootstrap_worker(&self, address: &str, control_address: &str) -> Result<()> {
        info!("Bootstrapping salt minion on {address}");
        self.wait_for_ssh(address).await?;
        self.run(address, &worker_bootstrap_command(control_address), None)
            .await?;
        Ok(())
    }

    async fn register_workers(&self, control_address: &str, worker_ids: &[String]) -> Result<()> {
        let Some(command) = register_command(worker_ids) else {
            debug!("No minion keys to accept");
            return Ok(());
        };
        info!("Accepting {} minion key(s) on {control_address}", worker_ids.len());
        self.run(control_address, &command, None).await?;
        Ok(())
    }

    async fn place_ha_config(&self, control_address: &str, config: &HaConfig) -> Result<()> {
        info!("Placing keepalived pillar on {control_address}");
        let document = config.render()?;
        self.write_file(control_address, HA_PILLAR_PATH, &document, "644")
            .await
    }

    async fn apply_configuration(&self, control_address: &str) -> Result<()> {
        info!("Applying salt states from {control_address}");
        let output = self
            .run(control_address, "sudo salt '*' state.apply", None)
            .await?;
        debug!("state.apply output:\n{output}");
        Ok(())
    }
}
