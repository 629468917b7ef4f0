//! TOML configuration for every tier.
//!
//! All sections are optional; a missing file section falls back to the
//! defaults below, which match the well-known ports and search constants the
//! fleet has always used.
//!
//! ```toml
//! [ports]
//! coordinator = 10188
//! trial_up = 12486
//!
//! [search]
//! fermat_attempts = 1000
//!
//! [network]
//! advertise_host = "10.0.0.12"
//! retry_backoff_ms = 1000
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::kind::FactorKind;
use crate::transport::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FleetConfig {
    #[serde(default)]
    pub ports: PortConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

/// The `[ports]` section: the coordinator's port and one fixed port per dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortConfig {
    pub coordinator: u16,
    pub trial_up: u16,
    pub trial_down: u16,
    pub fermat: u16,
    pub pollard_p1: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        PortConfig {
            coordinator: 10188,
            trial_up: FactorKind::TrialUp.default_port(),
            trial_down: FactorKind::TrialDown.default_port(),
            fermat: FactorKind::Fermat.default_port(),
            pollard_p1: FactorKind::PollardP1.default_port(),
        }
    }
}

impl PortConfig {
    pub fn dispatcher(&self, kind: FactorKind) -> u16 {
        match kind {
            FactorKind::TrialUp => self.trial_up,
            FactorKind::TrialDown => self.trial_down,
            FactorKind::Fermat => self.fermat,
            FactorKind::PollardP1 => self.pollard_p1,
        }
    }
}

/// The `[search]` section: per-round work sizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Largest trial-division slice handed to one worker per round.
    pub trial_increment_cap: u64,
    /// Values of `a` tried per Fermat round.
    pub fermat_attempts: u64,
    /// Growth of the Pollard upper bound per worker.
    pub pollard_step: u64,
    /// Upper bound the Pollard dispatcher falls back to after a base change.
    pub pollard_initial_upper: u64,
    /// Miller-Rabin rounds for the coordinator's primality checks.
    pub mr_rounds: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            trial_increment_cap: 100_000_000,
            fermat_attempts: 1000,
            pollard_step: 1000,
            pollard_initial_upper: 100,
            mr_rounds: 25,
        }
    }
}

/// The `[network]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host other tiers use to call back into this process. It goes out in
    /// every `new-client` and `register-subserver`, so it must be reachable
    /// from the coordinator host and from every dispatcher host. The loopback
    /// default only works when the whole fleet runs on one machine.
    pub advertise_host: String,
    /// Interface listeners bind to.
    pub bind_host: String,
    pub retry_backoff_ms: u64,
    /// Give up on a peer after this many failed sends (absent: retry until shutdown).
    pub send_retry_limit: Option<u32>,
    pub ready_poll_ms: u64,
    pub ready_poll_attempts: u32,
    /// How long a finishing node keeps delivering queued messages.
    pub drain_grace_ms: u64,
    /// Interval of the background progress line (0 disables it).
    pub progress_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            advertise_host: "127.0.0.1".to_string(),
            bind_host: "0.0.0.0".to_string(),
            retry_backoff_ms: 1000,
            send_retry_limit: None,
            ready_poll_ms: 1000,
            ready_poll_attempts: 30,
            drain_grace_ms: 5000,
            progress_interval_secs: 30,
        }
    }
}

impl NetworkConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    /// True when `advertise_host` names this machine's loopback interface.
    pub fn advertises_loopback(&self) -> bool {
        is_loopback(&self.advertise_host)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: self.retry_backoff(),
            limit: self.send_retry_limit,
        }
    }
}

/// `localhost` or a loopback IP literal.
pub fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

impl FleetConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(FleetConfig::default()),
        }
    }

    /// Apply command-line overrides on top of the loaded file.
    pub fn override_advertise_host(&mut self, host: Option<&str>) -> Result<()> {
        if let Some(host) = host {
            self.network.advertise_host = host.to_string();
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.advertise_host.trim().is_empty() {
            anyhow::bail!("network.advertise_host must not be empty");
        }
        if self.search.fermat_attempts == 0 {
            anyhow::bail!("search.fermat_attempts must be positive");
        }
        if self.search.trial_increment_cap == 0 {
            anyhow::bail!("search.trial_increment_cap must be positive");
        }
        if self.search.pollard_step == 0 {
            anyhow::bail!("search.pollard_step must be positive");
        }
        if self.search.mr_rounds == 0 {
            anyhow::bail!("search.mr_rounds must be positive");
        }
        let mut ports = vec![self.ports.coordinator];
        ports.extend(FactorKind::ALL.iter().map(|k| self.ports.dispatcher(*k)));
        let mut sorted = ports.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != ports.len() {
            anyhow::bail!("ports must be distinct, got {:?}", ports);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = FleetConfig::from_toml("").unwrap();
        assert_eq!(config, FleetConfig::default());
        assert_eq!(config.ports.coordinator, 10188);
        assert_eq!(config.ports.dispatcher(FactorKind::Fermat), 12458);
        assert_eq!(config.search.fermat_attempts, 1000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = FleetConfig::from_toml(
            r#"
            [network]
            advertise_host = "10.1.2.3"

            [search]
            pollard_step = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.network.advertise_host, "10.1.2.3");
        assert_eq!(config.network.retry_backoff_ms, 1000);
        assert_eq!(config.search.pollard_step, 500);
        assert_eq!(config.search.trial_increment_cap, 100_000_000);
    }

    #[test]
    fn duplicate_ports_rejected() {
        let err = FleetConfig::from_toml("[ports]\ncoordinator = 12486\n").unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(FleetConfig::from_toml("[search]\nfermat_attempts = 0\n").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, "[ports]\ncoordinator = 20000\n").unwrap();
        let config = FleetConfig::load(Some(&path)).unwrap();
        assert_eq!(config.ports.coordinator, 20000);
        assert!(FleetConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn advertise_host_override_wins_over_file() {
        let mut config = FleetConfig::from_toml("[network]\nadvertise_host = \"10.1.2.3\"\n").unwrap();
        config.override_advertise_host(None).unwrap();
        assert_eq!(config.network.advertise_host, "10.1.2.3");
        assert!(!config.network.advertises_loopback());

        config.override_advertise_host(Some("node-7.lan")).unwrap();
        assert_eq!(config.network.advertise_host, "node-7.lan");
        assert!(config.override_advertise_host(Some(" ")).is_err());
    }

    #[test]
    fn loopback_hosts_recognised() {
        assert!(FleetConfig::default().network.advertises_loopback());
        for host in ["127.0.0.1", "127.4.5.6", "::1", "LOCALHOST"] {
            assert!(is_loopback(host), "{host}");
        }
        for host in ["10.0.0.5", "node-7", "0.0.0.0"] {
            assert!(!is_loopback(host), "{host}");
        }
    }

    #[test]
    fn serialized_config_parses_back() {
        let config = FleetConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert_eq!(FleetConfig::from_toml(&toml_str).unwrap(), config);
    }
}
