use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use vdb_core::{Durability, MetricKind};

use crate::error::ServerError;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the key=value configuration file.
    #[arg(long, default_value = "node.conf")]
    pub config: PathBuf,

    /// Overrides `node_id` from the config file.
    #[arg(long)]
    pub node_id: Option<u64>,

    /// Overrides `http_server_port` from the config file.
    #[arg(long)]
    pub http_port: Option<u16>,
}

/// Everything a node needs to boot, resolved from the key=value config file
/// with CLI flags taking precedence over what it contains.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub db_path: PathBuf,
    pub node_id: u64,
    pub endpoint: String,
    pub replication_port: u16,
    pub http_server_address: String,
    pub http_server_port: u16,
    pub wal_sync_mode: Durability,
    pub dimension: usize,
    pub metric: MetricKind,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    pub snapshot_interval_secs: u64,
    pub log_level: String,
}

impl NodeConfig {
    pub fn load(args: &Args) -> Result<Self, ServerError> {
        let raw = parse_key_value_file(&args.config)?;
        let get = |key: &str| raw.get(key).cloned();

        let node_id = args
            .node_id
            .or_else(|| get("node_id").and_then(|v| v.parse().ok()))
            .unwrap_or(1);

        let http_server_port = args
            .http_port
            .or_else(|| get("http_server_port").and_then(|v| v.parse().ok()))
            .unwrap_or(8080);

        Ok(Self {
            db_path: PathBuf::from(get("db_path").unwrap_or_else(|| "data".into())),
            node_id,
            endpoint: get("endpoint").unwrap_or_else(|| "127.0.0.1:9000".into()),
            replication_port: get("port").and_then(|v| v.parse().ok()).unwrap_or(9000),
            http_server_address: get("http_server_address").unwrap_or_else(|| "0.0.0.0".into()),
            http_server_port,
            wal_sync_mode: get("wal_sync_mode")
                .and_then(|v| Durability::parse(&v))
                .unwrap_or_default(),
            dimension: get("dimension").and_then(|v| v.parse().ok()).unwrap_or(128),
            metric: get("metric")
                .and_then(|v| MetricKind::parse(&v))
                .unwrap_or(MetricKind::L2),
            hnsw_m: get("hnsw_m").and_then(|v| v.parse().ok()).unwrap_or(16),
            hnsw_ef_construction: get("hnsw_ef_construction")
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            hnsw_ef_search: get("hnsw_ef_search")
                .and_then(|v| v.parse().ok())
                .unwrap_or(64),
            snapshot_interval_secs: get("snapshot_interval_secs")
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            log_level: get("log_level").unwrap_or_else(|| "info".into()),
        })
    }
}

fn parse_key_value_file(path: &Path) -> Result<HashMap<String, String>, ServerError> {
    let mut map = HashMap::new();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(map),
        Err(err) => return Err(ServerError::Config(err.to_string())),
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let args = Args {
            config: PathBuf::from("/nonexistent/node.conf"),
            node_id: None,
            http_port: None,
        };
        let config = NodeConfig::load(&args).unwrap();
        assert_eq!(config.node_id, 1);
        assert_eq!(config.dimension, 128);
    }

    #[test]
    fn cli_flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.conf");
        std::fs::write(&path, "node_id=5\nhttp_server_port=9090\n").unwrap();
        let args = Args {
            config: path,
            node_id: Some(42),
            http_port: None,
        };
        let config = NodeConfig::load(&args).unwrap();
        assert_eq!(config.node_id, 42);
        assert_eq!(config.http_server_port, 9090);
    }
}
