use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;

use crate::config::{load_config, AppConfig};
use crate::labels::LabelSet;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/predict";
pub const DETECT_MODEL: &str = "wordcab/wordcab-pii-detection-large-v0.2";
pub const REPLACE_MODEL: &str = "knowledgator/gliner-multitask-large-v0.5";
pub const DETECT_THRESHOLD: f32 = 0.5;
pub const REPLACE_THRESHOLD: f32 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Detect,
    Replace,
}

impl Command {
    pub fn default_threshold(self) -> f32 {
        match self {
            Self::Detect => DETECT_THRESHOLD,
            Self::Replace => REPLACE_THRESHOLD,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Detect => DETECT_MODEL,
            Self::Replace => REPLACE_MODEL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DetectorKind {
    /// GLiNER-style inference server.
    #[value(alias = "gliner")]
    Http,
    /// Built-in regular expressions, no server needed.
    #[value(alias = "regex")]
    Pattern,
}

impl DetectorKind {
    /// Accepts the same names as `--detector`, ignoring case.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        <Self as ValueEnum>::from_str(s.trim(), true).map_err(|_| {
            anyhow::anyhow!("unknown detector kind: {} (expected http or pattern)", s.trim())
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplaceMode {
    Synthetic,
    Placeholder,
}

impl ReplaceMode {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthetic" | "fake" => Ok(Self::Synthetic),
            "placeholder" | "redact" => Ok(Self::Placeholder),
            other => anyhow::bail!("unknown replace mode: {other} (expected synthetic or placeholder)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub batch_size: usize,
    pub max_chunk_chars: usize,
    pub retry_backoff: Duration,
}

/// Values given on the command line; `None` defers to the config file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub detector: Option<DetectorKind>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub threshold: Option<f32>,
    pub batch_size: Option<usize>,
    pub jobs: Option<usize>,
    pub seed: Option<u64>,
    pub placeholder: bool,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// File the settings were read from, if any.
    pub config_path: Option<PathBuf>,
    pub command: Command,
    pub detector: DetectorSettings,
    pub labels: LabelSet,
    pub threshold: f32,
    pub replace_mode: ReplaceMode,
    pub seed: Option<u64>,
    pub preserve_case: bool,
    /// 0 lets rayon pick.
    pub jobs: usize,
}

impl PipelineConfig {
    pub fn load(
        config_path: Option<PathBuf>,
        command: Command,
        labels: LabelSet,
        overrides: &Overrides,
    ) -> anyhow::Result<Self> {
        let file = match config_path.as_deref() {
            Some(p) => load_config(p).context("load config")?,
            None => AppConfig::default(),
        };
        let mut cfg = Self::resolve(&file, command, labels, overrides)?;
        cfg.config_path = config_path;
        Ok(cfg)
    }

    /// Merges CLI overrides over file values over built-in defaults.
    pub fn resolve(
        file: &AppConfig,
        command: Command,
        labels: LabelSet,
        o: &Overrides,
    ) -> anyhow::Result<Self> {
        let d = &file.detector;
        let kind = match (o.detector, d.kind.as_deref()) {
            (Some(kind), _) => kind,
            (None, Some(s)) => DetectorKind::parse(s)?,
            (None, None) => DetectorKind::Http,
        };
        let threshold = o.threshold.unwrap_or_else(|| command.default_threshold());
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("threshold must be within [0, 1], got {threshold}");
        }
        let batch_size = o.batch_size.or(d.batch_size).unwrap_or(8);
        if batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        let replace_mode = if o.placeholder {
            ReplaceMode::Placeholder
        } else {
            match file.replace.mode.as_deref() {
                Some(s) => ReplaceMode::parse(s)?,
                None => ReplaceMode::Synthetic,
            }
        };

        Ok(Self {
            config_path: None,
            command,
            detector: DetectorSettings {
                kind,
                endpoint: o
                    .endpoint
                    .clone()
                    .or_else(|| d.endpoint.clone())
                    .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                model: o
                    .model
                    .clone()
                    .or_else(|| d.model.clone())
                    .unwrap_or_else(|| command.default_model().to_string()),
                timeout: Duration::from_secs(d.timeout_secs.unwrap_or(60)),
                batch_size,
                max_chunk_chars: d.max_chunk_chars.unwrap_or(2000),
                retry_backoff: Duration::from_millis(d.retry_backoff_ms.unwrap_or(500)),
            },
            labels,
            threshold,
            replace_mode,
            seed: o.seed.or(file.replace.seed),
            preserve_case: file.replace.preserve_case.unwrap_or(true),
            jobs: o.jobs.or(file.pipeline.jobs).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelSelection;

    fn labels() -> LabelSet {
        LabelSelection::All.resolve().expect("labels")
    }

    #[test]
    fn defaults_depend_on_command() {
        let file = AppConfig::default();
        let o = Overrides::default();
        let detect = PipelineConfig::resolve(&file, Command::Detect, labels(), &o).expect("cfg");
        let replace = PipelineConfig::resolve(&file, Command::Replace, labels(), &o).expect("cfg");
        assert_eq!(detect.threshold, 0.5);
        assert_eq!(replace.threshold, 0.3);
        assert_eq!(detect.detector.model, DETECT_MODEL);
        assert_eq!(replace.detector.model, REPLACE_MODEL);
        assert_eq!(replace.replace_mode, ReplaceMode::Synthetic);
        assert!(replace.preserve_case);
    }

    #[test]
    fn cli_overrides_file() {
        let file: AppConfig = toml::from_str(
            "[detector]\nkind = \"http\"\nbatch_size = 4\n[replace]\nseed = 1\nmode = \"synthetic\"\n",
        )
        .expect("toml");
        let o = Overrides {
            detector: Some(DetectorKind::Pattern),
            batch_size: Some(2),
            seed: Some(9),
            placeholder: true,
            ..Overrides::default()
        };
        let cfg = PipelineConfig::resolve(&file, Command::Replace, labels(), &o).expect("cfg");
        assert_eq!(cfg.detector.kind, DetectorKind::Pattern);
        assert_eq!(cfg.detector.batch_size, 2);
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.replace_mode, ReplaceMode::Placeholder);
    }

    #[test]
    fn rejects_bad_values() {
        let file = AppConfig::default();
        let bad_threshold = Overrides {
            threshold: Some(1.5),
            ..Overrides::default()
        };
        assert!(PipelineConfig::resolve(&file, Command::Detect, labels(), &bad_threshold).is_err());
        let bad_kind: AppConfig = toml::from_str("[detector]\nkind = \"oracle\"\n").expect("toml");
        let o = Overrides::default();
        assert!(PipelineConfig::resolve(&bad_kind, Command::Detect, labels(), &o).is_err());
    }

    #[test]
    fn load_remembers_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("docx-pii.toml");
        std::fs::write(&path, "[detector]\nkind = \"regex\"\n").expect("write");
        let o = Overrides::default();
        let cfg = PipelineConfig::load(Some(path.clone()), Command::Detect, labels(), &o)
            .expect("cfg");
        assert_eq!(cfg.config_path, Some(path));
        assert_eq!(cfg.detector.kind, DetectorKind::Pattern);

        let none = PipelineConfig::load(None, Command::Detect, labels(), &o).expect("cfg");
        assert!(none.config_path.is_none());
    }

    #[test]
    fn detector_kind_accepts_aliases_in_any_case() {
        assert_eq!(DetectorKind::parse("GLiNER").expect("kind"), DetectorKind::Http);
        assert_eq!(DetectorKind::parse(" regex ").expect("kind"), DetectorKind::Pattern);
        let names: Vec<String> = DetectorKind::value_variants()
            .iter()
            .filter_map(|k| k.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["http", "pattern"]);
    }
}
