use hdbx_config::{HdbxSettings, ParseError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// 默认的补点阈值（时间范围的百分比）
pub const DEFAULT_FILL_THRESHOLD_PERCENT: f64 = 5.0;

/// 从过去补点的模式
///
/// 查询窗口开头没有数据时，取窗口之前最近的一个样本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FillFromPastMode {
    #[default]
    None,
    /// 样本时间戳改写为窗口起点
    KeepWindow,
    /// 保留样本原时间戳，窗口向前扩展
    WidenWindow,
}

impl FromStr for FillFromPastMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(FillFromPastMode::None),
            "keepwindow" | "keep_window" => Ok(FillFromPastMode::KeepWindow),
            "widenwindow" | "widen_window" => Ok(FillFromPastMode::WidenWindow),
            _ => Err(ParseError::InvalidValue {
                key: "fillfromthepastmode".to_string(),
                value: s.to_string(),
                expected: "None, KeepWindow or WidenWindow",
            }),
        }
    }
}

/// 提取引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// 每轮交给缓冲区的记录数
    pub batch_size: usize,
    /// 两次进度检查之间的最长间隔
    pub poll_interval: Duration,
    /// 同时提取的数据源个数
    pub max_parallel_sources: usize,
    pub pool_max_connections: u32,
    pub connect_timeout: Duration,
    pub fill_from_past: FillFromPastMode,
    pub fill_threshold_percent: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            poll_interval: Duration::from_millis(200),
            max_parallel_sources: 1,
            pool_max_connections: 4,
            connect_timeout: Duration::from_secs(10),
            fill_from_past: FillFromPastMode::None,
            fill_threshold_percent: DEFAULT_FILL_THRESHOLD_PERCENT,
        }
    }
}

impl ExtractorConfig {
    /// 从配置存储读取，缺失的键使用默认值
    pub fn from_settings(settings: &HdbxSettings) -> Result<Self, ParseError> {
        let mut config = Self::default();

        if let Some(n) = positive(settings, "batch_size")? {
            config.batch_size = n as usize;
        }
        if let Some(ms) = settings.get_int("poll_interval_ms")? {
            config.poll_interval = Duration::from_millis(ms.max(0) as u64);
        }
        if let Some(n) = positive(settings, "max_parallel_sources")? {
            config.max_parallel_sources = n as usize;
        }
        if let Some(n) = positive(settings, "pool_max_connections")? {
            config.pool_max_connections = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(secs) = positive(settings, "connect_timeout_secs")? {
            config.connect_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(mode) = settings.get("fillfromthepastmode") {
            config.fill_from_past = mode.parse()?;
        }
        config.fill_threshold_percent =
            threshold_percent(settings.get("fillfromthepastthresholdpercent"));

        Ok(config)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_parallel_sources(mut self, n: usize) -> Self {
        self.max_parallel_sources = n.max(1);
        self
    }

    pub fn with_fill_from_past(mut self, mode: FillFromPastMode, threshold_percent: f64) -> Self {
        self.fill_from_past = mode;
        self.fill_threshold_percent = if (0.0..=100.0).contains(&threshold_percent) {
            threshold_percent
        } else {
            DEFAULT_FILL_THRESHOLD_PERCENT
        };
        self
    }
}

fn positive(settings: &HdbxSettings, key: &str) -> Result<Option<i64>, ParseError> {
    match settings.get_int(key)? {
        Some(n) if n <= 0 => Err(ParseError::InvalidValue {
            key: key.to_string(),
            value: n.to_string(),
            expected: "a positive integer",
        }),
        other => Ok(other),
    }
}

// 无效的阈值回退到默认值，不报错
fn threshold_percent(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return DEFAULT_FILL_THRESHOLD_PERCENT;
    };
    match raw.trim().parse::<f64>() {
        Ok(pct) if (0.0..=100.0).contains(&pct) => pct,
        _ => {
            warn!(
                value = %raw,
                default = DEFAULT_FILL_THRESHOLD_PERCENT,
                "Invalid fill threshold percent, using default"
            );
            DEFAULT_FILL_THRESHOLD_PERCENT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = ExtractorConfig::from_settings(&HdbxSettings::new()).unwrap();
        assert_eq!(config, ExtractorConfig::default());
        assert_eq!(config.max_parallel_sources, 1);
        assert_eq!(config.fill_from_past, FillFromPastMode::None);
    }

    #[test]
    fn test_from_settings() {
        let mut settings = HdbxSettings::new();
        settings.set("batch_size", "50");
        settings.set("poll_interval_ms", "10");
        settings.set("max_parallel_sources", "4");
        settings.set("FillFromThePastMode", "KeepWindow");
        settings.set("fillfromthepastthresholdpercent", "12.5");

        let config = ExtractorConfig::from_settings(&settings).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.max_parallel_sources, 4);
        assert_eq!(config.fill_from_past, FillFromPastMode::KeepWindow);
        assert_eq!(config.fill_threshold_percent, 12.5);
    }

    #[test]
    fn test_invalid_threshold_falls_back() {
        let mut settings = HdbxSettings::new();
        settings.set("fillfromthepastthresholdpercent", "lots");
        let config = ExtractorConfig::from_settings(&settings).unwrap();
        assert_eq!(config.fill_threshold_percent, DEFAULT_FILL_THRESHOLD_PERCENT);

        settings.set("fillfromthepastthresholdpercent", "150");
        let config = ExtractorConfig::from_settings(&settings).unwrap();
        assert_eq!(config.fill_threshold_percent, DEFAULT_FILL_THRESHOLD_PERCENT);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut settings = HdbxSettings::new();
        settings.set("batch_size", "0");
        assert!(ExtractorConfig::from_settings(&settings).is_err());

        let mut settings = HdbxSettings::new();
        settings.set("fillfromthepastmode", "sometimes");
        assert!(ExtractorConfig::from_settings(&settings).is_err());
    }
}
