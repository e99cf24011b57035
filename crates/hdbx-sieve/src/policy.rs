use hdbx_config::{HdbxSettings, ParseError};
use hdbx_types::DataFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

/// 时间对齐策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// 不补点
    #[default]
    None,
    /// 在两个样本之间，用前一个样本填充其它数据源出现的时间戳
    CarryForward,
}

impl FillPolicy {
    fn parse_for_key(key: &str, value: &str) -> Result<Self, ParseError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(FillPolicy::None),
            "carry_forward" | "carryforward" | "carry-forward" => Ok(FillPolicy::CarryForward),
            _ => Err(ParseError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                expected: "none or carry_forward",
            }),
        }
    }
}

impl FromStr for FillPolicy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_for_key("fill_policy", s)
    }
}

/// 分拣器配置
///
/// 策略解析顺序：按数据源覆盖，否则按数据格式的默认值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SieveConfig {
    pub scalar: FillPolicy,
    /// spectrum 和 image 共用
    pub vector: FillPolicy,
    pub overrides: HashMap<String, FillPolicy>,
}

impl SieveConfig {
    /// 读取 `fill_scalar`、`fill_vector` 和 `carry_forward_sources`
    pub fn from_settings(settings: &HdbxSettings) -> Result<Self, ParseError> {
        let mut config = Self::default();

        if let Some(raw) = settings.get("fill_scalar") {
            config.scalar = FillPolicy::parse_for_key("fill_scalar", raw)?;
        }
        if let Some(raw) = settings.get("fill_vector") {
            config.vector = FillPolicy::parse_for_key("fill_vector", raw)?;
        }
        for source in settings.get_list("carry_forward_sources") {
            config.overrides.insert(source, FillPolicy::CarryForward);
        }

        debug!(
            scalar = ?config.scalar,
            vector = ?config.vector,
            overrides = config.overrides.len(),
            "Sieve configuration loaded"
        );
        Ok(config)
    }

    pub fn with_default(mut self, format: DataFormat, policy: FillPolicy) -> Self {
        match format {
            DataFormat::Scalar => self.scalar = policy,
            DataFormat::Vector | DataFormat::Matrix => self.vector = policy,
        }
        self
    }

    pub fn with_override(mut self, source: impl Into<String>, policy: FillPolicy) -> Self {
        self.overrides.insert(source.into(), policy);
        self
    }

    pub fn policy_for(&self, source: &str, format: DataFormat) -> FillPolicy {
        if let Some(policy) = self.overrides.get(source) {
            return *policy;
        }
        match format {
            DataFormat::Scalar => self.scalar,
            DataFormat::Vector | DataFormat::Matrix => self.vector,
        }
    }
}
