//! File configuration for CLI defaults.
//!
//! The file is a flat list of `key = value` lines; `#` starts a comment
//! outside double-quoted strings. Values given on the command line win over
//! the file, which wins over built-in defaults.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};

/// Defaults read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Directory downloads land in.
    pub output_dir: Option<PathBuf>,
    /// Simultaneous transfers (1..=100).
    pub concurrency: Option<u8>,
    /// Retries per request (0..=10).
    pub max_retries: Option<u8>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Per-read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Send a random browser User-Agent instead of the tool's own.
    pub rotate_user_agent: Option<bool>,
}

impl FileConfig {
    /// Checks every present value against the ranges the CLI accepts.
    ///
    /// # Errors
    ///
    /// Names the first offending key and its accepted range.
    pub fn validate(&self) -> Result<()> {
        check_range("concurrency", self.concurrency.map(u64::from), 1, 100)?;
        check_range("max_retries", self.max_retries.map(u64::from), 0, 10)?;
        check_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        check_range("read_timeout_secs", self.read_timeout_secs, 1, 3600)?;
        Ok(())
    }
}

fn check_range(key: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    match value {
        Some(v) if !(min..=max).contains(&v) => {
            bail!("Invalid config value for `{key}`: {v}. Expected range: {min}..={max}")
        }
        _ => Ok(()),
    }
}

/// Config path: `$XDG_CONFIG_HOME/netdrive/config.toml`, else
/// `$HOME/.config/netdrive/config.toml`. Empty variables count as unset.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = non_empty_var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join("netdrive").join("config.toml"));
    }
    let home = non_empty_var("HOME")?;
    Some(PathBuf::from(home).join(".config").join("netdrive").join("config.toml"))
}

fn non_empty_var(name: &str) -> Option<OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

/// Loads the default config file; a missing file yields `None`.
///
/// # Errors
///
/// Fails when the file exists but cannot be read, parsed or validated.
pub fn load_default_config() -> Result<Option<FileConfig>> {
    match default_config_path() {
        Some(path) if path.exists() => load_config(&path).map(Some),
        _ => Ok(None),
    }
}

/// Loads and validates the config file at `path`.
///
/// # Errors
///
/// Fails with the path in context when reading or parsing fails.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (index, raw_line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let (key, value) = (key.trim(), value.trim());
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(parse_string(value).with_context(context)?));
            }
            "concurrency" => cfg.concurrency = Some(parse_u8(value).with_context(context)?),
            "max_retries" => cfg.max_retries = Some(parse_u8(value).with_context(context)?),
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_u64(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_u64(value).with_context(context)?);
            }
            "rotate_user_agent" => {
                cfg.rotate_user_agent = Some(parse_bool(value).with_context(context)?);
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut quoted = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string(value: &str) -> Result<String> {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Expected double-quoted string"))
}

fn parse_u64(value: &str) -> Result<u64> {
    if value.starts_with('-') {
        bail!("Expected non-negative integer");
    }
    Ok(value.parse::<u64>()?)
}

fn parse_u8(value: &str) -> Result<u8> {
    u8::try_from(parse_u64(value)?).map_err(|_| anyhow!("Integer value out of range for u8"))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_parse_all_keys() {
        let cfg = parse_config_str(
            r#"
# netdrive defaults
output_dir = "/data/downloads"   # where files go
concurrency = 8
max_retries = 2
connect_timeout_secs = 15
read_timeout_secs = 120
rotate_user_agent = false
"#,
        )
        .unwrap();
        assert_eq!(
            cfg,
            FileConfig {
                output_dir: Some(PathBuf::from("/data/downloads")),
                concurrency: Some(8),
                max_retries: Some(2),
                connect_timeout_secs: Some(15),
                read_timeout_secs: Some(120),
                rotate_user_agent: Some(false),
            }
        );
    }

    #[test]
    fn test_hash_inside_quotes_is_not_a_comment() {
        let cfg = parse_config_str(r#"output_dir = "/tmp/#1""#).unwrap();
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/tmp/#1")));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for (raw, key) in [
            ("concurrency = 0", "concurrency"),
            ("concurrency = 101", "concurrency"),
            ("max_retries = 11", "max_retries"),
            ("read_timeout_secs = 0", "read_timeout_secs"),
        ] {
            let err = parse_config_str(raw).unwrap_err();
            assert!(format!("{err:#}").contains(key), "{raw}: {err:#}");
        }
    }

    #[test]
    fn test_rejects_malformed_values() {
        for raw in [
            "concurrency = 4 trailing",
            "concurrency = -1",
            "concurrency = 300",
            "output_dir = /unquoted",
            "rotate_user_agent = yes",
        ] {
            assert!(parse_config_str(raw).is_err(), "{raw} should fail");
        }
    }

    #[test]
    fn test_rejects_unknown_key_and_bad_syntax() {
        let err = parse_config_str("rate_limit = 5").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key: 'rate_limit'"));

        let err = parse_config_str("just words").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_load_config_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "concurrency = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));

        std::fs::write(&path, "concurrency = 3\n").unwrap();
        assert_eq!(load_config(&path).unwrap().concurrency, Some(3));
    }
}
