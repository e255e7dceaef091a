//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use holo_thread::config::LeaderCfg;
use holo_thread::mle::RouterTableSnapshot;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: Logging,
    pub leader: LeaderCfg,
    #[serde(rename = "router-table")]
    pub router_table: RouterTableSnapshot,
}

// Logs are written to stderr, leaving stdout for the replay output.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub enabled: bool,
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    #[default]
    Full,
    Json,
    Pretty,
}

// ===== impl Config =====

impl Config {
    pub(crate) fn load(config_file: Option<&str>) -> Config {
        let Some(config_file) = config_file else {
            return Config::default();
        };

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => toml::from_str(&config_str)
                .expect("Failed to parse configuration file"),
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Config::default()
            }
        }
    }
}

// ===== impl Logging =====

impl Default for Logging {
    fn default() -> Logging {
        Logging {
            enabled: true,
            style: Default::default(),
            colors: false,
            show_thread_id: false,
            show_source: false,
        }
    }
}
