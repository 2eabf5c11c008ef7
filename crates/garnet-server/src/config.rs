//! Server configuration.
//!
//! Reads a `key value` configuration file (one directive per line,
//! `#` comments) and converts CLI-friendly strings like "100M" into
//! the internal types used by the engine.

use std::fs;
use std::path::{Path, PathBuf};

use garnet_core::{EvictionPolicy, KeyspaceConfig};
use garnet_persistence::FsyncPolicy;
use thiserror::Error;

/// A snapshot trigger: every `every_secs` seconds, snapshot if at
/// least `changes` keys changed since the last check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRule {
    pub every_secs: u64,
    pub changes: u64,
}

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("config line {line}: {msg}")]
    Directive { line: usize, msg: String },
}

/// Immutable server configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base directory for the AOF and snapshot files.
    pub dir: PathBuf,
    /// TCP listen port.
    pub port: u16,
    pub aof_enabled: bool,
    pub aof_file: String,
    pub aof_fsync: FsyncPolicy,
    pub rdb_file: String,
    pub snapshot_rules: Vec<SnapshotRule>,
    /// Memory budget in bytes. 0 means unlimited.
    pub max_memory: i64,
    pub eviction: EvictionPolicy,
    pub mem_samples: usize,
    pub require_pass: bool,
    pub password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            port: 6379,
            aof_enabled: false,
            aof_file: "appendonly.aof".into(),
            aof_fsync: FsyncPolicy::EverySec,
            rdb_file: "dump.rdb".into(),
            snapshot_rules: Vec::new(),
            max_memory: 0,
            eviction: EvictionPolicy::NoEviction,
            mem_samples: 5,
            require_pass: false,
            password: String::new(),
        }
    }
}

impl Config {
    /// Loads a configuration file, starting from the defaults.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)?;
        let mut config = Config::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let key = parts.next().unwrap_or_default();
            let args: Vec<&str> = parts.collect();
            config
                .apply(key, &args)
                .map_err(|msg| ConfigError::Directive { line: idx + 1, msg })?;
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, args: &[&str]) -> Result<(), String> {
        match key.to_ascii_lowercase().as_str() {
            "dir" => self.dir = PathBuf::from(one_arg(key, args)?),
            "port" => {
                self.port = one_arg(key, args)?
                    .parse()
                    .map_err(|_| format!("invalid port '{}'", args[0]))?;
            }
            "appendonly" => self.aof_enabled = parse_yes_no(one_arg(key, args)?)?,
            "appendfilename" => self.aof_file = one_arg(key, args)?.to_string(),
            "appendfsync" => self.aof_fsync = parse_fsync_policy(one_arg(key, args)?)?,
            "dbfilename" => self.rdb_file = one_arg(key, args)?.to_string(),
            "save" => {
                if args.len() != 2 {
                    return Err("'save' expects <seconds> <changes>".into());
                }
                let every_secs = args[0]
                    .parse()
                    .map_err(|_| format!("invalid seconds '{}'", args[0]))?;
                let changes = args[1]
                    .parse()
                    .map_err(|_| format!("invalid change count '{}'", args[1]))?;
                self.snapshot_rules.push(SnapshotRule { every_secs, changes });
            }
            "maxmemory" => self.max_memory = parse_byte_size(one_arg(key, args)?)?,
            "maxmemory-policy" => self.eviction = parse_eviction_policy(one_arg(key, args)?)?,
            "maxmemory-samples" => {
                self.mem_samples = one_arg(key, args)?
                    .parse()
                    .map_err(|_| format!("invalid sample count '{}'", args[0]))?;
            }
            "requirepass" => {
                self.require_pass = true;
                self.password = one_arg(key, args)?.to_string();
            }
            other => return Err(format!("unknown directive '{other}'")),
        }
        Ok(())
    }

    pub fn aof_path(&self) -> PathBuf {
        self.dir.join(&self.aof_file)
    }

    pub fn rdb_path(&self) -> PathBuf {
        self.dir.join(&self.rdb_file)
    }

    /// Budget settings handed to the keyspace engine.
    pub fn keyspace_config(&self) -> KeyspaceConfig {
        KeyspaceConfig {
            max_memory: self.max_memory,
            eviction: self.eviction,
            mem_samples: self.mem_samples,
        }
    }
}

fn one_arg<'a>(key: &str, args: &[&'a str]) -> Result<&'a str, String> {
    match args {
        [arg] => Ok(arg),
        _ => Err(format!("'{key}' expects exactly one argument")),
    }
}

fn parse_yes_no(input: &str) -> Result<bool, String> {
    match input.to_ascii_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(format!("expected yes/no, got '{input}'")),
    }
}

/// Parses a human-readable byte size into a number of bytes.
///
/// Supports suffixes K/KB, M/MB, G/GB (powers of 1024); plain numbers
/// are bytes. Case insensitive.
pub fn parse_byte_size(input: &str) -> Result<i64, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty byte size string".into());
    }

    let upper = input.to_ascii_uppercase();
    let (num_str, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = upper.strip_suffix('G') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix('M') {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix('K') {
        (n, 1024)
    } else {
        (upper.as_str(), 1)
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| format!("invalid byte size: '{input}'"))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| format!("byte size overflow: '{input}'"))
}

/// Parses an eviction policy name.
pub fn parse_eviction_policy(input: &str) -> Result<EvictionPolicy, String> {
    match input.to_ascii_lowercase().as_str() {
        "noeviction" => Ok(EvictionPolicy::NoEviction),
        "allkeys-random" => Ok(EvictionPolicy::AllKeysRandom),
        "allkeys-lru" => Ok(EvictionPolicy::AllKeysLru),
        "allkeys-lfu" => Ok(EvictionPolicy::AllKeysLfu),
        _ => Err(format!(
            "unknown eviction policy '{input}'. valid options: noeviction, allkeys-random, allkeys-lru, allkeys-lfu"
        )),
    }
}

/// Parses an fsync policy name.
pub fn parse_fsync_policy(input: &str) -> Result<FsyncPolicy, String> {
    match input.to_ascii_lowercase().as_str() {
        "always" => Ok(FsyncPolicy::Always),
        "everysec" => Ok(FsyncPolicy::EverySec),
        "no" => Ok(FsyncPolicy::No),
        _ => Err(format!(
            "unknown fsync policy '{input}'. valid options: always, everysec, no"
        )),
    }
}
