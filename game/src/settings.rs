use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RELAY_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:3000/ws";
pub const DEFAULT_CHANNEL_NAME: &str = "tetris-control";
/// Loopback address where every process on this machine meets for local channels.
pub const DEFAULT_LOCAL_BUS_ADDR: &str = "127.0.0.1:47100";

pub const MIN_CONTROLLER_SCALE: f32 = 0.5;
pub const MAX_CONTROLLER_SCALE: f32 = 2.0;

/// Per-device preferences. Never synchronized between devices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub high_score: u32,
    #[serde(default = "default_controller_scale")]
    pub controller_scale: f32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: default_version(),
            high_score: 0,
            controller_scale: default_controller_scale(),
        }
    }
}

impl Preferences {
    pub fn sanitized(mut self) -> Self {
        self.version = default_version();
        self.controller_scale = if self.controller_scale.is_finite() {
            self.controller_scale
                .clamp(MIN_CONTROLLER_SCALE, MAX_CONTROLLER_SCALE)
        } else {
            default_controller_scale()
        };
        self
    }

    /// Raise the stored best if `score` beats it. Returns whether it changed.
    pub fn record_score(&mut self, score: u32) -> bool {
        if score <= self.high_score {
            return false;
        }
        self.high_score = score;
        true
    }
}

fn default_version() -> u32 {
    1
}

fn default_controller_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        if let Some(explicit) = std::env::var_os("TANDEM_PREFS_PATH") {
            return Self {
                path: PathBuf::from(explicit),
            };
        }

        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|home| {
                    let mut p = PathBuf::from(home);
                    p.push(".config");
                    p
                })
            })
            .unwrap_or_else(|| PathBuf::from("."));

        let mut path = base;
        path.push("tandem");
        path.push("preferences.json");
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn load(&self) -> Preferences {
        let Ok(bytes) = fs::read(&self.path) else {
            return Preferences::default();
        };
        serde_json::from_slice::<Preferences>(&bytes)
            .map(Preferences::sanitized)
            .unwrap_or_else(|err| {
                log::warn!("ignoring unreadable preferences at {:?}: {err}", self.path);
                Preferences::default()
            })
    }

    pub fn save(&self, prefs: &Preferences) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(prefs)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, text)
    }
}

/// Listen address for the relay server.
///
/// `TANDEM_RELAY_ADDR` wins, then `TANDEM_RELAY_PORT` on all interfaces,
/// then [`DEFAULT_RELAY_ADDR`]. Unparseable values fall through.
pub fn resolve_relay_addr<F>(mut get_env: F) -> SocketAddr
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(addr) = get_env("TANDEM_RELAY_ADDR").and_then(|v| v.parse().ok()) {
        return addr;
    }

    if let Some(port) = get_env("TANDEM_RELAY_PORT").and_then(|v| v.parse::<u16>().ok()) {
        return SocketAddr::from(([0, 0, 0, 0], port));
    }

    SocketAddr::from(([0, 0, 0, 0], 3000))
}

/// WebSocket URL clients use to reach the relay.
pub fn resolve_relay_url<F>(mut get_env: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    get_env("TANDEM_RELAY_URL")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string())
}

/// Address of the same-device bus behind the local channel.
///
/// `TANDEM_LOCAL_BUS_ADDR` wins when it parses, otherwise [`DEFAULT_LOCAL_BUS_ADDR`].
pub fn resolve_local_bus_addr<F>(mut get_env: F) -> SocketAddr
where
    F: FnMut(&str) -> Option<String>,
{
    get_env("TANDEM_LOCAL_BUS_ADDR")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 47100)))
}
