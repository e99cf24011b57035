use anyhow::{bail, Context};
use clap::Parser;
use hdbx_types::TimeRange;
use std::path::PathBuf;

/// hdbxtest 命令行参数
#[derive(Parser, Debug)]
#[command(
    name = "hdbxtest",
    author,
    version,
    about = "Extract historical data from an HDB or HDB++ database",
    after_help = "Example: hdbxtest hdb.ini domain/family/member/attribute \"2014-07-20 10:00:00\" \"2014-07-20 12:00:00\""
)]
pub struct Args {
    /// <config-file> [source ...] <start-date> <stop-date>
    #[arg(required = true, value_name = "ARGS")]
    pub positionals: Vec<String>,

    /// Spectrum elements printed per record (0 prints all)
    #[arg(long, default_value_t = 2)]
    pub max_vector_elements: usize,

    /// Number of sources extracted concurrently
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Print the archived sources matching SUBSTRING and exit
    #[arg(long, value_name = "SUBSTRING", num_args = 0..=1, default_missing_value = "")]
    pub list_sources: Option<String>,

    /// Print the error records of each source instead of its values
    #[arg(long)]
    pub find_errors: bool,
}

/// 解析后的请求
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ListSources {
        substring: Option<String>,
    },
    Fetch {
        sources: Vec<String>,
        range: TimeRange,
        find_errors: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub config: PathBuf,
    pub request: Request,
}

impl Args {
    /// 拆分位置参数：第一个是配置文件，最后两个是起止时间，中间都是数据源
    pub fn invocation(&self) -> anyhow::Result<Invocation> {
        let Some((config, rest)) = self.positionals.split_first() else {
            bail!("missing configuration file");
        };
        let config = PathBuf::from(config);

        if let Some(substring) = &self.list_sources {
            if !rest.is_empty() {
                bail!("--list-sources takes only the configuration file");
            }
            let substring = Some(substring.clone()).filter(|s| !s.is_empty());
            return Ok(Invocation {
                config,
                request: Request::ListSources { substring },
            });
        }

        if rest.len() < 2 {
            bail!("expected <config-file> [source ...] <start-date> <stop-date>");
        }
        let (sources, dates) = rest.split_at(rest.len() - 2);
        let range = TimeRange::parse(&dates[0], &dates[1])
            .with_context(|| format!("invalid time range {} .. {}", dates[0], dates[1]))?;

        Ok(Invocation {
            config,
            request: Request::Fetch {
                sources: sources.to_vec(),
                range,
                find_errors: self.find_errors,
            },
        })
    }
}
