use hdbx_core::{
    channel, ConnectError, EventSender, ExtractionEvent, ExtractionEvents, QueryError,
    SourceFetchError,
};
use hdbx_types::{Backend, SourceId, TimeRange, ValueRecord};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::buffer::{Drain, RowBuffer};
use crate::config::ExtractorConfig;
use crate::schema::{schema_for, DbSchema};
use crate::task::{SourceOutcome, SourceTask};

/// 已建立的连接信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub backend: Backend,
    /// 去掉密码的连接地址
    pub url: String,
}

/// 一次提取的汇总
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionSummary {
    pub id: Uuid,
    pub total_rows: usize,
    pub elapsed: f64,
    pub finished: Vec<(SourceId, usize)>,
    pub failed: Vec<(SourceId, SourceFetchError)>,
}

/// `get_data` 返回的句柄，可等待提取结束
#[derive(Debug)]
pub struct ExtractionHandle {
    id: Uuid,
    handle: JoinHandle<ExtractionSummary>,
}

impl ExtractionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 等待提取结束
    pub async fn wait(self) -> Result<ExtractionSummary, QueryError> {
        self.handle
            .await
            .map_err(|e| QueryError::Aborted(e.to_string()))
    }
}

/// 历史数据库提取引擎
///
/// `get_data` 立即返回，提取在后台任务中进行；记录进入内部缓冲区，
/// 事件进入 `Extractor::new` 返回的通道，消费者通过 `get` 取走记录。
pub struct Extractor {
    config: ExtractorConfig,
    db: Option<Arc<DatabaseConnection>>,
    schema: Option<Arc<dyn DbSchema>>,
    connection: Option<ConnectionInfo>,
    buffer: RowBuffer,
    events: EventSender,
    running: Arc<AtomicBool>,
    last_error: Arc<Mutex<String>>,
}

impl Extractor {
    /// 创建提取引擎和它的事件接收端
    pub fn new(config: ExtractorConfig) -> (Self, ExtractionEvents) {
        let (events, receiver) = channel();
        let extractor = Self {
            config,
            db: None,
            schema: None,
            connection: None,
            buffer: RowBuffer::new(),
            events,
            running: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(String::new())),
        };
        (extractor, receiver)
    }

    /// 连接 MySQL 上的历史数据库
    pub async fn connect(
        &mut self,
        backend: Backend,
        host: &str,
        schema: &str,
        user: &str,
        password: &str,
        port: u16,
    ) -> Result<ConnectionInfo, ConnectError> {
        let url = mysql_url(host, schema, user, password, port)?;
        self.connect_url(backend, &url).await
    }

    /// 用完整的连接地址连接；接受 `mysql://` 和 `sqlite:`
    pub async fn connect_url(
        &mut self,
        backend: Backend,
        url: &str,
    ) -> Result<ConnectionInfo, ConnectError> {
        let is_sqlite = url.starts_with("sqlite:");
        if !url.starts_with("mysql://") && !is_sqlite {
            return Err(match url.split_once("://") {
                Some((scheme, _)) => ConnectError::UnsupportedDatabase(scheme.to_string()),
                None => ConnectError::InvalidUrl(redact(url)),
            });
        }
        if Url::parse(url).is_err() {
            return Err(ConnectError::InvalidUrl(redact(url)));
        }

        let mut options = ConnectOptions::new(url.to_string());
        options
            .max_connections(if is_sqlite { 1 } else { self.config.pool_max_connections })
            .connect_timeout(self.config.connect_timeout)
            .sqlx_logging(false);

        let db = Database::connect(options).await?;
        let info = self.attach(backend, db);
        let info = ConnectionInfo {
            url: redact(url),
            ..info
        };
        self.connection = Some(info.clone());

        info!(backend = %backend, url = %info.url, "Connected to historical database");
        Ok(info)
    }

    /// 使用已有的数据库连接
    pub fn attach(&mut self, backend: Backend, db: DatabaseConnection) -> ConnectionInfo {
        let info = ConnectionInfo {
            backend,
            url: String::new(),
        };
        self.db = Some(Arc::new(db));
        self.schema = Some(schema_for(backend));
        self.connection = Some(info.clone());
        info
    }

    /// 断开连接；正在进行的提取持有连接池的引用，会继续完成
    pub fn disconnect(&mut self) {
        if self.db.take().is_some() {
            info!("Disconnected from historical database");
        }
        self.schema = None;
        self.connection = None;
    }

    pub fn is_connected(&self) -> bool {
        self.db.is_some()
    }

    pub fn backend(&self) -> Option<Backend> {
        self.schema.as_ref().map(|s| s.backend())
    }

    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref()
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// 更新配置；提取进行中时拒绝
    pub fn configure(&mut self, config: ExtractorConfig) -> Result<(), QueryError> {
        if self.is_running() {
            return Err(QueryError::Busy);
        }
        debug!(?config, "Extractor configured");
        self.config = config;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn connected(&self) -> Result<(Arc<DatabaseConnection>, Arc<dyn DbSchema>), QueryError> {
        match (&self.db, &self.schema) {
            (Some(db), Some(schema)) => Ok((db.clone(), schema.clone())),
            _ => Err(QueryError::NotConnected),
        }
    }

    /// 开始提取一组数据源在 `range` 内的数据
    ///
    /// 请求在返回前同步校验，出错时不发出任何事件。成功时立即返回，
    /// 每个数据源恰好产生一个 `SourceFinished` 或 `SourceFailed`，
    /// 最后产生一个 `AllFinished`。必须在 tokio 运行时中调用。
    pub fn get_data<S: AsRef<str>>(
        &self,
        sources: &[S],
        range: TimeRange,
    ) -> Result<ExtractionHandle, QueryError> {
        let (db, schema) = self.connected()?;

        if sources.is_empty() {
            return Err(QueryError::EmptyRequest);
        }
        let mut seen = HashSet::with_capacity(sources.len());
        for source in sources {
            if !seen.insert(source.as_ref()) {
                return Err(QueryError::DuplicateSource(source.as_ref().to_string()));
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| QueryError::Aborted(e.to_string()))?;

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(QueryError::Busy);
        }

        self.clear_error();
        self.buffer.start();

        let id = Uuid::new_v4();
        let sources: Vec<String> = sources.iter().map(|s| s.as_ref().to_string()).collect();
        info!(
            extraction_id = %id,
            sources = sources.len(),
            range = %range,
            "Starting extraction"
        );

        let coordinator = Coordinator {
            id,
            db,
            schema,
            config: self.config.clone(),
            buffer: self.buffer.clone(),
            events: self.events.clone(),
            running: self.running.clone(),
            last_error: self.last_error.clone(),
        };
        let handle = runtime.spawn(coordinator.run(sources, range));

        Ok(ExtractionHandle { id, handle })
    }

    /// 把已缓冲的记录追加到 `out` 末尾
    ///
    /// 不阻塞；每条记录只交付一次。可以在事件回调中调用。
    pub fn get(&self, out: &mut Vec<ValueRecord>) -> Drain {
        self.buffer.drain_into(out)
    }

    /// 最近一次错误信息；没有错误时为空
    pub fn error_message(&self) -> String {
        self.last_error
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn has_error(&self) -> bool {
        !self.error_message().is_empty()
    }

    fn clear_error(&self) {
        if let Ok(mut last) = self.last_error.lock() {
            last.clear();
        }
    }

    fn keep_error<T>(&self, result: Result<T, QueryError>) -> Result<T, QueryError> {
        if let Err(e) = &result {
            if let Ok(mut last) = self.last_error.lock() {
                *last = e.to_string();
            }
        }
        result
    }

    /// 列出所有数据源
    pub async fn sources_list(&self) -> Result<Vec<String>, QueryError> {
        let (db, schema) = self.connected()?;
        let result = schema.sources_list(&db, None).await;
        self.keep_error(result)
    }

    /// 名称包含 `substring` 的数据源
    pub async fn find_source(&self, substring: &str) -> Result<Vec<String>, QueryError> {
        let (db, schema) = self.connected()?;
        let result = schema.sources_list(&db, Some(substring)).await;
        self.keep_error(result)
    }

    /// `range` 内质量为 Invalid 或带错误描述的记录
    pub async fn find_errors(
        &self,
        source: &str,
        range: TimeRange,
    ) -> Result<Vec<ValueRecord>, QueryError> {
        let (db, schema) = self.connected()?;
        self.clear_error();

        let result = async {
            let info = schema.source_info(&db, source).await?;
            schema.find_errors(&db, &info, &range).await
        }
        .await;

        self.keep_error(result)
    }
}

/// 协调一次提取的后台任务
struct Coordinator {
    id: Uuid,
    db: Arc<DatabaseConnection>,
    schema: Arc<dyn DbSchema>,
    config: ExtractorConfig,
    buffer: RowBuffer,
    events: EventSender,
    running: Arc<AtomicBool>,
    last_error: Arc<Mutex<String>>,
}

impl Coordinator {
    async fn run(self, sources: Vec<String>, range: TimeRange) -> ExtractionSummary {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_sources.max(1)));
        let mut tasks = JoinSet::new();

        for source in &sources {
            // 在派发前获取许可，保证数据源按提交顺序开始
            let permit = semaphore.clone().acquire_owned().await;
            let task = SourceTask {
                source: source.clone(),
                range,
                db: self.db.clone(),
                schema: self.schema.clone(),
                config: self.config.clone(),
                buffer: self.buffer.clone(),
                events: self.events.clone(),
                last_error: self.last_error.clone(),
            };
            tasks.spawn(async move {
                let _permit = permit;
                task.run().await
            });
        }

        let mut summary = ExtractionSummary {
            id: self.id,
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(SourceOutcome::Finished { source, rows }) => {
                    summary.total_rows += rows;
                    summary.finished.push((source, rows));
                }
                Ok(SourceOutcome::Failed { source, error }) => {
                    summary.failed.push((source, error));
                }
                Err(e) => {
                    error!(extraction_id = %self.id, error = %e, "Source task aborted");
                }
            }
        }

        // 任务异常退出的数据源补发失败事件，保证每个数据源都有终结事件
        for source in &sources {
            let reported = summary.finished.iter().any(|(s, _)| s == source)
                || summary.failed.iter().any(|(s, _)| s == source);
            if !reported {
                let error = SourceFetchError::decode(source.as_str(), "extraction task aborted");
                warn!(source = %source, "No terminal event from source task");
                if let Ok(mut last) = self.last_error.lock() {
                    *last = error.to_string();
                }
                self.events.send(ExtractionEvent::SourceFailed {
                    source: source.clone(),
                    error: error.clone(),
                });
                summary.failed.push((source.clone(), error));
            }
        }

        summary.elapsed = started.elapsed().as_secs_f64();

        // 先结束状态再通知，回调中可以立即发起下一次提取
        self.buffer.finish();
        self.running.store(false, Ordering::SeqCst);
        self.events.send(ExtractionEvent::AllFinished {
            total_rows: summary.total_rows,
            elapsed: summary.elapsed,
        });

        info!(
            extraction_id = %self.id,
            total_rows = summary.total_rows,
            finished = summary.finished.len(),
            failed = summary.failed.len(),
            elapsed = summary.elapsed,
            "Extraction finished"
        );
        summary
    }
}

/// 拼装 MySQL 连接地址，用户名和密码按百分号编码
fn mysql_url(
    host: &str,
    schema: &str,
    user: &str,
    password: &str,
    port: u16,
) -> Result<String, ConnectError> {
    let invalid = || ConnectError::InvalidUrl(format!("mysql://{}:***@{}:{}/{}", user, host, port, schema));

    let mut url = Url::parse("mysql://localhost").map_err(|_| invalid())?;
    url.set_host(Some(host)).map_err(|_| invalid())?;
    url.set_port(Some(port)).map_err(|_| invalid())?;
    url.set_username(&urlencoding::encode(user)).map_err(|_| invalid())?;
    url.set_password(Some(urlencoding::encode(password).as_ref()))
        .map_err(|_| invalid())?;
    url.set_path(&format!("/{}", urlencoding::encode(schema)));
    Ok(url.into())
}

/// 去掉连接地址中的密码
fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    // 密码里可能有 '@'，主机部分取最后一个 '@' 之后
    match rest.rsplit_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{}://{}:***@{}", scheme, user, host)
        }
        None => url.to_string(),
    }
}
