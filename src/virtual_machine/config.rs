//! Machine configuration.
//!
//! [`MachineConfig::default`] gives a single-threaded instance without
//! networking. [`MachineConfig::from_env`] layers `NEOVM_*` environment
//! variables on top of the defaults.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::program::Program;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default per-stack byte budget.
pub const DEFAULT_STACK_SIZE: usize = 8192;

pub const ENV_THREADS: &str = "NEOVM_THREADS";
pub const ENV_STACK_SIZE: &str = "NEOVM_STACK_SIZE";
pub const ENV_IP: &str = "NEOVM_IP";
pub const ENV_PORT: &str = "NEOVM_PORT";
pub const ENV_POLL_MS: &str = "NEOVM_POLL_MS";
pub const ENV_MAX_INSTRUCTIONS: &str = "NEOVM_MAX_INSTRUCTIONS";
pub const ENV_WAIT_LIMIT: &str = "NEOVM_WAIT_LIMIT";

/// Base address for the per-thread sockets. Thread `i` binds `ip:(port + i)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetConfig {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl NetConfig {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Loopback address with an OS-assigned port for every thread.
    pub fn loopback() -> Self {
        Self::new(Ipv4Addr::LOCALHOST, 0)
    }
}

/// Construction parameters of an [`Instance`](crate::virtual_machine::vm::Instance).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineConfig {
    /// Number of thread control blocks.
    pub threads: usize,
    /// Byte budget of each stack; a stack of width `w` gets `stack_size / w` bytes.
    pub stack_size: usize,
    /// Socket base address, `None` to run without networking.
    pub network: Option<NetConfig>,
    /// Extra sleep after a step that left the thread waiting. Zero only yields.
    pub poll_interval: Duration,
    /// Upper bound on the number of decoded instructions.
    pub max_instructions: usize,
    /// Consecutive waiting steps a thread may take before the instance
    /// halts. `None` waits forever.
    pub wait_limit: Option<u32>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            stack_size: DEFAULT_STACK_SIZE,
            network: None,
            poll_interval: Duration::ZERO,
            max_instructions: Program::CAPACITY,
            wait_limit: None,
        }
    }
}

impl MachineConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, VMError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from `lookup`, falling back to the defaults
    /// for every key it does not provide.
    ///
    /// Networking is enabled when [`ENV_IP`] is present; the port defaults
    /// to zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, VMError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_THREADS) {
            config.threads = parse(ENV_THREADS, &value)?;
        }
        if let Some(value) = lookup(ENV_STACK_SIZE) {
            config.stack_size = parse(ENV_STACK_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_MS) {
            config.poll_interval = Duration::from_millis(parse(ENV_POLL_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_MAX_INSTRUCTIONS) {
            config.max_instructions = parse(ENV_MAX_INSTRUCTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_WAIT_LIMIT) {
            config.wait_limit = Some(parse(ENV_WAIT_LIMIT, &value)?);
        }
        if let Some(ip) = lookup(ENV_IP) {
            let ip = parse(ENV_IP, &ip)?;
            let port = match lookup(ENV_PORT) {
                Some(value) => parse(ENV_PORT, &value)?,
                None => 0,
            };
            config.network = Some(NetConfig::new(ip, port));
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations no instance can be built from.
    pub fn validate(&self) -> Result<(), VMError> {
        if self.threads == 0 {
            return Err(VMError::Config {
                key: ENV_THREADS,
                value: "0".into(),
            });
        }
        if self.wait_limit == Some(0) {
            return Err(VMError::Config {
                key: ENV_WAIT_LIMIT,
                value: "0".into(),
            });
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, VMError> {
    value.trim().parse().map_err(|_| VMError::Config {
        key,
        value: value.to_string(),
    })
}
