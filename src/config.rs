use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "docx-pii.toml";
pub const CONFIG_ENV: &str = "DOCX_PII_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub detector: DetectorSection,
    #[serde(default)]
    pub replace: ReplaceSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct DetectorSection {
    /// "http" (GLiNER-compatible inference server) or "pattern" (offline regexes).
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Model name sent with each request. Defaults depend on the command.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Texts per detector request.
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Longest text sent in one piece; longer documents are cut between paragraphs.
    /// 0 sends every document whole.
    #[serde(default)]
    pub max_chunk_chars: Option<usize>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ReplaceSection {
    /// "synthetic" or "placeholder".
    #[serde(default)]
    pub mode: Option<String>,
    /// Fixed seed for reproducible synthetic values.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub preserve_case: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    /// Worker threads for extraction and rewriting; 0 or unset uses all cores.
    #[serde(default)]
    pub jobs: Option<usize>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

/// `--config`, then `$DOCX_PII_CONFIG`, then `docx-pii.toml` searched upwards.
pub fn locate_config(explicit: Option<&Path>, workdir: &Path) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(p));
    }
    find_default_config(workdir, CONFIG_FILE_NAME)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text)
        .with_context(|| format!("parse config toml: {}", path.display()))?;
    Ok(cfg)
}

pub const DEFAULT_CONFIG_TOML: &str = r#"# docx-pii configuration. Command-line flags override these values.

[detector]
# "http" talks to a GLiNER-compatible server; "pattern" uses built-in regexes.
kind = "http"
endpoint = "http://127.0.0.1:8080/predict"
# model = "wordcab/wordcab-pii-detection-large-v0.2"
timeout_secs = 60
batch_size = 8
max_chunk_chars = 2000
retry_backoff_ms = 500

[replace]
# "synthetic" or "placeholder"
mode = "synthetic"
# seed = 42
preserve_case = true

[pipeline]
# 0 = one worker per core
jobs = 0
"#;

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        anyhow::bail!(
            "config already exists: {} (use --force to overwrite)",
            cfg_path.display()
        );
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
