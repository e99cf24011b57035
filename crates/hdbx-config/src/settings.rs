use config::{Config, Environment, File, FileFormat, Map, Source, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{ParseError, Result};

/// 环境变量覆盖前缀：`HDBX_DBHOST=...` 覆盖 `dbhost`
pub const ENV_PREFIX: &str = "HDBX";

/// key=value 配置存储
///
/// 键不区分大小写（统一存为小写）。加载一次后只读。
#[derive(Debug, Clone, Default)]
pub struct HdbxSettings {
    values: BTreeMap<String, String>,
}

impl HdbxSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从文件加载配置并合并到现有键值中
    ///
    /// 文件格式为 `key = value`，`#` 和 `;` 开头的行是注释。
    /// 同名键以后加载的为准；已有的其它键保留。
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let load_err = |message: String| ParseError::Load {
            path: path.display().to_string(),
            message,
        };

        let path_str = path
            .to_str()
            .ok_or_else(|| load_err("path is not valid UTF-8".to_string()))?;

        let config = Config::builder()
            .add_source(File::new(path_str, FileFormat::Ini))
            .build()
            .map_err(|e| load_err(e.to_string()))?;

        let table = config.collect().map_err(|e| load_err(e.to_string()))?;
        let before = self.values.len();
        self.merge_table(None, table);

        debug!(
            path = %path.display(),
            keys = self.values.len(),
            added = self.values.len() - before,
            "Settings loaded"
        );
        Ok(())
    }

    /// 用 `HDBX_*` 环境变量覆盖已有配置
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_environment(Environment::with_prefix(ENV_PREFIX))
    }

    /// 用指定的环境变量源覆盖配置
    pub fn with_environment(mut self, environment: Environment) -> Result<Self> {
        let config = Config::builder()
            .add_source(environment)
            .build()
            .map_err(|e| ParseError::Load {
                path: format!("{}_* environment", ENV_PREFIX),
                message: e.to_string(),
            })?;

        let table = config.collect().map_err(|e| ParseError::Load {
            path: format!("{}_* environment", ENV_PREFIX),
            message: e.to_string(),
        })?;
        self.merge_table(None, table);
        Ok(self)
    }

    // INI 段 `[section]` 中的键展开为 `section.key`
    fn merge_table(&mut self, prefix: Option<&str>, table: Map<String, Value>) {
        for (key, value) in table {
            let key = match prefix {
                Some(prefix) => format!("{}.{}", prefix, key.to_lowercase()),
                None => key.to_lowercase(),
            };

            match value.clone().into_table() {
                Ok(nested) => self.merge_table(Some(&key), nested),
                Err(_) => match value.into_string() {
                    Ok(text) => {
                        self.values.insert(key, text.trim().to_string());
                    }
                    Err(e) => warn!(key = %key, error = %e, "Ignoring non-scalar setting"),
                },
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// 必需的键
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| ParseError::MissingKey(key.to_lowercase()))
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_lowercase())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_lowercase(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        self.get_parsed(key, "an integer")
    }

    pub fn get_double(&self, key: &str) -> Result<Option<f64>> {
        self.get_parsed(key, "a number")
    }

    /// `true/yes/1/on` 和 `false/no/0/off`，不区分大小写
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(Some(true)),
            "false" | "no" | "0" | "off" => Ok(Some(false)),
            _ => Err(ParseError::InvalidValue {
                key: key.to_lowercase(),
                value: raw.to_string(),
                expected: "a boolean",
            }),
        }
    }

    /// 逗号分隔的列表，忽略空项
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get_parsed<T: FromStr>(&self, key: &str, expected: &'static str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| ParseError::InvalidValue {
                    key: key.to_lowercase(),
                    value: raw.to_string(),
                    expected,
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_settings(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hdbx.ini");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_key_values() {
        let (_dir, path) = write_settings(
            r#"
# archive connection
dbuser = hdbbrowser
dbpass = secret
DBHost = archive.example.org
; legacy schema
dbname = hdb
batch_size = 500
"#,
        );

        let mut settings = HdbxSettings::new();
        settings.load_from_file(&path).unwrap();

        assert_eq!(settings.get("dbuser"), Some("hdbbrowser"));
        assert_eq!(settings.get("dbhost"), Some("archive.example.org"));
        assert_eq!(settings.get("DBHOST"), Some("archive.example.org"));
        assert_eq!(settings.get_int("batch_size").unwrap(), Some(500));
        assert!(!settings.has_key("dbport"));
        assert_eq!(settings.get_or("dbport", "3306"), "3306");
    }

    #[test]
    fn test_load_merges_into_existing() {
        let (_dir, path) = write_settings("dbname = hdbpp\n");

        let mut settings = HdbxSettings::new();
        settings.set("dbuser", "operator");
        settings.set("dbname", "hdb");
        settings.load_from_file(&path).unwrap();

        assert_eq!(settings.get("dbuser"), Some("operator"));
        assert_eq!(settings.get("dbname"), Some("hdbpp"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let mut settings = HdbxSettings::new();
        let result = settings.load_from_file(dir.path().join("absent.ini"));
        assert!(matches!(result, Err(ParseError::Load { .. })));
    }

    #[test]
    fn test_typed_getters() {
        let mut settings = HdbxSettings::new();
        settings.set("threshold", "7.5");
        settings.set("enabled", "Yes");
        settings.set("port", "not-a-port");
        settings.set("sources", "a/b/c/d, ,e/f/g/h");

        assert_eq!(settings.get_double("threshold").unwrap(), Some(7.5));
        assert_eq!(settings.get_bool("enabled").unwrap(), Some(true));
        assert_eq!(settings.get_bool("missing").unwrap(), None);
        assert!(matches!(
            settings.get_int("port"),
            Err(ParseError::InvalidValue { .. })
        ));
        assert_eq!(settings.get_list("sources"), vec!["a/b/c/d", "e/f/g/h"]);
        assert!(matches!(
            settings.require("dbpass"),
            Err(ParseError::MissingKey(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut env = Map::new();
        env.insert("HDBX_DBHOST".to_string(), "replica".to_string());
        env.insert("HDBX_BATCH_SIZE".to_string(), "10".to_string());

        let mut settings = HdbxSettings::new();
        settings.set("dbhost", "primary");
        settings.set("dbuser", "operator");

        let settings = settings
            .with_environment(Environment::with_prefix(ENV_PREFIX).source(Some(env)))
            .unwrap();

        assert_eq!(settings.get("dbhost"), Some("replica"));
        assert_eq!(settings.get("dbuser"), Some("operator"));
        assert_eq!(settings.get_int("batch_size").unwrap(), Some(10));
    }
}
