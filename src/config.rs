use log::{LevelFilter, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

pub const CONFIG_PATH: &str = "texcache.ini";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.load_str(&content);
        Ok(())
    }

    pub fn load_str(&mut self, content: &str) {
        self.sections.clear();
        let mut current_section = String::new();

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Section header: [SectionName]
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current_section = name.trim().to_string();
                self.sections.entry(current_section.clone()).or_default();
                continue;
            }

            // Key/value pair: key=value
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                self.sections
                    .entry(current_section.clone())
                    .or_default()
                    .insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_level: LogLevel,
    /// Upper bound on the decode thread's idle wait, in milliseconds.
    pub decode_idle_wait_ms: u16,
    /// Poll interval while waiting for the decode thread to stop.
    pub stop_poll_interval_ms: u16,
    // 0 = drain every decoded texture each frame
    // N >= 1 = upload at most N per frame
    pub upload_budget: u32,
    /// Base directory for relative texture paths (None = working directory).
    pub asset_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            decode_idle_wait_ms: 16,
            stop_poll_interval_ms: 5,
            upload_budget: 0,
            asset_root: None,
        }
    }
}

// Global, mutable configuration instance.
static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

fn render_config(cfg: &Config) -> String {
    let mut content = String::new();
    content.push_str("[Options]\n");
    content.push_str(&format!("LogLevel={}\n", cfg.log_level.as_str()));
    content.push_str(&format!("DecodeIdleWaitMs={}\n", cfg.decode_idle_wait_ms));
    content.push_str(&format!("StopPollIntervalMs={}\n", cfg.stop_poll_interval_ms));
    content.push_str(&format!("UploadBudget={}\n", cfg.upload_budget));
    content.push_str(&format!(
        "AssetRoot={}\n",
        cfg.asset_root
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    content
}

fn create_default_config_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating with default values.", path.display());
    std::fs::write(path, render_config(&Config::default()))
}

/// Builds a config from parsed INI data, using defaults for anything missing
/// or malformed.
pub fn from_ini(conf: &SimpleIni) -> Config {
    let default = Config::default();
    Config {
        log_level: conf
            .get("Options", "LogLevel")
            .and_then(|v| LogLevel::from_str(&v).ok())
            .unwrap_or(default.log_level),
        decode_idle_wait_ms: conf
            .get("Options", "DecodeIdleWaitMs")
            .and_then(|v| v.parse::<u16>().ok())
            .map_or(default.decode_idle_wait_ms, |v| v.clamp(1, 1000)),
        stop_poll_interval_ms: conf
            .get("Options", "StopPollIntervalMs")
            .and_then(|v| v.parse::<u16>().ok())
            .map_or(default.stop_poll_interval_ms, |v| v.clamp(1, 1000)),
        upload_budget: conf
            .get("Options", "UploadBudget")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(default.upload_budget),
        asset_root: conf
            .get("Options", "AssetRoot")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or(default.asset_root),
    }
}

/// Loads `path` into the global config, creating it with defaults if absent.
pub fn load<P: AsRef<Path>>(path: P) {
    let path = path.as_ref();
    if !path.exists()
        && let Err(e) = create_default_config_file(path)
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(path) {
        Ok(()) => {
            *CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = from_ini(&conf);
            info!("Configuration loaded from '{}'.", path.display());
        }
        Err(e) => {
            warn!(
                "Failed to load '{}': {e}. Using default settings.",
                path.display()
            );
        }
    }
}

pub fn get() -> Config {
    CONFIG.lock().unwrap_or_else(PoisonError::into_inner).clone()
}
