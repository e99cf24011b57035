use anyhow::Context;
use clap::Parser;
use hdbx_cli::{fetch_and_sieve, print_errors, print_sieve, Args, Request, ValuePrinter};
use hdbx_config::{ConnectionSettings, HdbxSettings};
use hdbx_extractor::{Extractor, ExtractorConfig};
use hdbx_sieve::SieveConfig;
use std::io::{self, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志输出到 stderr，stdout 留给数据
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,hdbx_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let invocation = args.invocation()?;

    let mut settings = HdbxSettings::new();
    settings
        .load_from_file(&invocation.config)
        .with_context(|| format!("cannot read {}", invocation.config.display()))?;
    let settings = settings.with_env_overrides()?;

    let connection = ConnectionSettings::from_settings(&settings)?;
    let mut config = ExtractorConfig::from_settings(&settings)?;
    if let Some(n) = args.parallel {
        config = config.with_max_parallel_sources(n);
    }
    let sieve_config = SieveConfig::from_settings(&settings)?;

    tracing::info!(
        backend = %connection.backend,
        host = %connection.host,
        database = %connection.database,
        "Starting hdbxtest"
    );

    let (mut extractor, mut events) = Extractor::new(config);
    extractor
        .connect(
            connection.backend,
            &connection.host,
            &connection.database,
            &connection.user,
            &connection.password,
            connection.port,
        )
        .await
        .context("cannot connect to the historical database")?;

    let printer = ValuePrinter::new(args.max_vector_elements);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match invocation.request {
        Request::ListSources { substring } => {
            let sources = match substring {
                Some(sub) => extractor.find_source(&sub).await?,
                None => extractor.sources_list().await?,
            };
            for source in sources {
                writeln!(out, "{}", source)?;
            }
        }
        Request::Fetch {
            sources,
            range,
            find_errors: true,
        } => {
            print_errors(&extractor, &sources, range, &printer, &mut out).await?;
        }
        Request::Fetch { sources, range, .. } => {
            let sieve =
                fetch_and_sieve(&extractor, &mut events, &sources, range, sieve_config, &mut out)
                    .await?;
            print_sieve(&sieve, &printer, &mut out)?;
        }
    }

    out.flush()?;
    extractor.disconnect();
    Ok(())
}
