//! Render settings and their on-disk store.
//!
//! `RenderConfig` is a validated value object: every setter checks bounds, so
//! the frame loop never has to. `ConfigStore` persists it as JSON next to the
//! detector path. Loading is forgiving: a missing or corrupt field falls back
//! to its default and is reported as a warning, never an error.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SessionError;

pub const CONFIG_ENV: &str = "FISHSCOPE_CONFIG";
pub const MODEL_PATH_ENV: &str = "FISHSCOPE_MODEL_PATH";
pub const CONF_THRESHOLD_ENV: &str = "FISHSCOPE_CONF_THRESHOLD";

const DEFAULT_CONFIG_PATH: &str = "fishscope.json";
const DEFAULT_MODEL_PATH: &str = "models/best.onnx";
const DEFAULT_BOX_COLOR: [u8; 3] = [0, 173, 181];
const DEFAULT_BOX_THICKNESS: u32 = 2;
const DEFAULT_FONT_SCALE: f32 = 0.8;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;

pub const BOX_THICKNESS_RANGE: (u32, u32) = (1, 10);
pub const FONT_SCALE_RANGE: (f32, f32) = (0.5, 3.0);

/// Overlay rendering options plus the detection threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    box_color: [u8; 3],
    box_thickness: u32,
    font_scale: f32,
    confidence_threshold: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            box_color: DEFAULT_BOX_COLOR,
            box_thickness: DEFAULT_BOX_THICKNESS,
            font_scale: DEFAULT_FONT_SCALE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl RenderConfig {
    /// Build a config, rejecting any out-of-range value.
    pub fn new(
        box_color: [u8; 3],
        box_thickness: u32,
        font_scale: f32,
        confidence_threshold: f32,
    ) -> Result<Self> {
        let mut cfg = Self {
            box_color,
            ..Self::default()
        };
        cfg.set_box_thickness(box_thickness)?;
        cfg.set_font_scale(font_scale)?;
        cfg.set_confidence_threshold(confidence_threshold)?;
        Ok(cfg)
    }

    pub fn box_color(&self) -> [u8; 3] {
        self.box_color
    }

    pub fn box_thickness(&self) -> u32 {
        self.box_thickness
    }

    pub fn font_scale(&self) -> f32 {
        self.font_scale
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn set_box_color(&mut self, color: [u8; 3]) {
        self.box_color = color;
    }

    pub fn set_box_thickness(&mut self, thickness: u32) -> Result<()> {
        let (min, max) = BOX_THICKNESS_RANGE;
        if !(min..=max).contains(&thickness) {
            bail!("box thickness must be in {}..={}, got {}", min, max, thickness);
        }
        self.box_thickness = thickness;
        Ok(())
    }

    pub fn set_font_scale(&mut self, scale: f32) -> Result<()> {
        let (min, max) = FONT_SCALE_RANGE;
        if !scale.is_finite() || !(min..=max).contains(&scale) {
            bail!("font scale must be in {}..={}, got {}", min, max, scale);
        }
        self.font_scale = scale;
        Ok(())
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) -> Result<()> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            bail!("confidence threshold must be in 0..=1, got {}", threshold);
        }
        self.confidence_threshold = threshold;
        Ok(())
    }
}

/// Everything the configuration store persists.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub model_path: String,
    pub render: RenderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL_PATH.to_string(),
            render: RenderConfig::default(),
        }
    }
}

/// Result of loading: the config plus any per-field fallbacks that happened.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub warnings: Vec<SessionError>,
}

#[derive(Serialize)]
struct ConfigFile<'a> {
    model_path: &'a str,
    render: RenderSection,
}

#[derive(Serialize)]
struct RenderSection {
    box_color: [u8; 3],
    box_thickness: u32,
    font_scale: f32,
    confidence_threshold: f32,
}

/// JSON-backed configuration store.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$FISHSCOPE_CONFIG`, or `fishscope.json` in the working directory.
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config, then apply environment overrides.
    ///
    /// Never fails: unreadable files and bad fields degrade to defaults.
    pub fn load(&self) -> LoadedConfig {
        let mut warnings = Vec::new();
        let config = match read_config_value(&self.path) {
            Ok(Some(value)) => from_value(&value, &mut warnings),
            Ok(None) => {
                log::debug!("no config at {}, using defaults", self.path.display());
                AppConfig::default()
            }
            Err(e) => {
                warnings.push(SessionError::ConfigParse {
                    field: "file",
                    reason: format!("{:#}", e),
                });
                AppConfig::default()
            }
        };
        let mut loaded = LoadedConfig { config, warnings };
        apply_env(&mut loaded);
        for warning in &loaded.warnings {
            log::warn!("config: {}", warning);
        }
        loaded
    }

    /// Persist the config atomically (temp file + rename).
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let file = ConfigFile {
            model_path: &config.model_path,
            render: RenderSection {
                box_color: config.render.box_color(),
                box_thickness: config.render.box_thickness(),
                font_scale: config.render.font_scale(),
                confidence_threshold: config.render.confidence_threshold(),
            },
        };
        let mut encoded = serde_json::to_vec_pretty(&file).context("encode config")?;
        encoded.push(b'\n');
        write_atomic(&self.path, &encoded)
            .with_context(|| format!("write config {}", self.path.display()))
    }
}

fn read_config_value(path: &Path) -> Result<Option<Value>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(anyhow!("failed to read config file {}: {}", path.display(), e)),
    };
    let value = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(Some(value))
}

fn from_value(value: &Value, warnings: &mut Vec<SessionError>) -> AppConfig {
    let mut cfg = AppConfig::default();

    match value.get("model_path") {
        None => {}
        Some(Value::String(path)) if !path.trim().is_empty() => cfg.model_path = path.clone(),
        Some(other) => warnings.push(field_error("model_path", other)),
    }

    let Some(render) = value.get("render") else {
        return cfg;
    };

    if let Some(raw) = render.get("box_color") {
        match parse_color(raw) {
            Some(color) => cfg.render.set_box_color(color),
            None => warnings.push(field_error("box_color", raw)),
        }
    }
    if let Some(raw) = render.get("box_thickness") {
        let parsed = raw
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| anyhow!("not an integer"))
            .and_then(|v| cfg.render.set_box_thickness(v));
        if let Err(e) = parsed {
            warnings.push(SessionError::ConfigParse {
                field: "box_thickness",
                reason: format!("{}: {}", raw, e),
            });
        }
    }
    if let Some(raw) = render.get("font_scale") {
        let parsed = raw
            .as_f64()
            .ok_or_else(|| anyhow!("not a number"))
            .and_then(|v| cfg.render.set_font_scale(v as f32));
        if let Err(e) = parsed {
            warnings.push(SessionError::ConfigParse {
                field: "font_scale",
                reason: format!("{}: {}", raw, e),
            });
        }
    }
    if let Some(raw) = render.get("confidence_threshold") {
        let parsed = raw
            .as_f64()
            .ok_or_else(|| anyhow!("not a number"))
            .and_then(|v| cfg.render.set_confidence_threshold(v as f32));
        if let Err(e) = parsed {
            warnings.push(SessionError::ConfigParse {
                field: "confidence_threshold",
                reason: format!("{}: {}", raw, e),
            });
        }
    }
    cfg
}

/// Accepts `[r, g, b]` or the legacy `"r,g,b"` string form.
fn parse_color(raw: &Value) -> Option<[u8; 3]> {
    let parts: Vec<u64> = match raw {
        Value::Array(items) => items.iter().map(Value::as_u64).collect::<Option<_>>()?,
        Value::String(s) => split_csv(s)
            .iter()
            .map(|p| p.parse().ok())
            .collect::<Option<_>>()?,
        _ => return None,
    };
    match parts.as_slice() {
        [r, g, b] => Some([
            u8::try_from(*r).ok()?,
            u8::try_from(*g).ok()?,
            u8::try_from(*b).ok()?,
        ]),
        _ => None,
    }
}

fn apply_env(loaded: &mut LoadedConfig) {
    if let Ok(path) = std::env::var(MODEL_PATH_ENV) {
        if !path.trim().is_empty() {
            loaded.config.model_path = path;
        }
    }
    if let Ok(threshold) = std::env::var(CONF_THRESHOLD_ENV) {
        let parsed = threshold
            .trim()
            .parse::<f32>()
            .map_err(|e| anyhow!("{}", e))
            .and_then(|v| loaded.config.render.set_confidence_threshold(v));
        if let Err(e) = parsed {
            loaded.warnings.push(SessionError::ConfigParse {
                field: "confidence_threshold",
                reason: format!("{}={}: {}", CONF_THRESHOLD_ENV, threshold, e),
            });
        }
    }
}

fn field_error(field: &'static str, raw: &Value) -> SessionError {
    SessionError::ConfigParse {
        field,
        reason: format!("unexpected value {}", raw),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn setters_enforce_bounds() {
        let mut cfg = RenderConfig::default();
        assert!(cfg.set_box_thickness(0).is_err());
        assert!(cfg.set_box_thickness(11).is_err());
        assert!(cfg.set_box_thickness(10).is_ok());
        assert!(cfg.set_font_scale(0.4).is_err());
        assert!(cfg.set_font_scale(f32::NAN).is_err());
        assert!(cfg.set_font_scale(3.0).is_ok());
        assert!(cfg.set_confidence_threshold(1.01).is_err());
        assert!(cfg.set_confidence_threshold(0.0).is_ok());
        assert_eq!(cfg.box_thickness(), 10);
        assert_eq!(cfg.font_scale(), 3.0);
        assert_eq!(cfg.confidence_threshold(), 0.0);
    }

    #[test]
    fn corrupt_fields_fall_back_individually() {
        let value = json!({
            "model_path": "weights/carp.onnx",
            "render": {
                "box_color": "255,0,abc",
                "box_thickness": 4,
                "font_scale": 9.5,
                "confidence_threshold": 0.55
            }
        });
        let mut warnings = Vec::new();
        let cfg = from_value(&value, &mut warnings);

        assert_eq!(cfg.model_path, "weights/carp.onnx");
        assert_eq!(cfg.render.box_color(), DEFAULT_BOX_COLOR);
        assert_eq!(cfg.render.box_thickness(), 4);
        assert_eq!(cfg.render.font_scale(), DEFAULT_FONT_SCALE);
        assert_eq!(cfg.render.confidence_threshold(), 0.55);

        let fields: Vec<_> = warnings
            .iter()
            .map(|w| match w {
                SessionError::ConfigParse { field, .. } => *field,
                other => panic!("unexpected warning {other:?}"),
            })
            .collect();
        assert_eq!(fields, vec!["box_color", "font_scale"]);
        assert!(warnings.iter().all(|w| w.kind() == ErrorKind::ConfigParse));
    }

    #[test]
    fn parses_both_color_forms() {
        assert_eq!(parse_color(&json!([1, 2, 3])), Some([1, 2, 3]));
        assert_eq!(parse_color(&json!("10, 20,30")), Some([10, 20, 30]));
        assert_eq!(parse_color(&json!([1, 2, 256])), None);
        assert_eq!(parse_color(&json!([1, 2])), None);
        assert_eq!(parse_color(&json!(7)), None);
    }
}
