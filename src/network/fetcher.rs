//! 抓取实现
//!
//! [`Fetcher`] 是多路复用器与真实网络之间的接缝：`start` 不得阻塞，
//! 完成结果由主机循环通过 `poll` 非阻塞地取回。

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};

use crate::config::NetworkConfig;
use crate::core::error::{NetworkError, NetworkResult};

/// 一次抓取的结果
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCompletion {
    pub request: u32,
    pub result: Result<Vec<u8>, String>,
}

/// 异步抓取后端
pub trait Fetcher: Send {
    /// 开始抓取；必须立即返回
    fn start(&mut self, request: u32, url: &str) -> NetworkResult<()>;

    /// 取回已完成的抓取（不阻塞）
    fn poll(&mut self) -> Vec<FetchCompletion>;
}

// ---------------------------------------------------------------------------
// MemoryFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    routes: HashMap<String, Result<Vec<u8>, String>>,
    auto_complete: bool,
    started: VecDeque<(u32, String)>,
    completed: VecDeque<FetchCompletion>,
}

impl MemoryState {
    fn resolve(&self, request: u32, url: &str) -> FetchCompletion {
        let result = self
            .routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(format!("no route for {}", url)));
        FetchCompletion { request, result }
    }
}

/// 内存路由表抓取器
///
/// 克隆共享同一状态，嵌入方（或测试）可以在主机线程之外控制完成时机。
#[derive(Debug, Clone)]
pub struct MemoryFetcher {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFetcher {
    /// 默认在下一次 `poll` 时完成
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                auto_complete: true,
                ..Default::default()
            })),
        }
    }

    /// 抓取保持 Pending，直到调用 [`MemoryFetcher::complete_all`]
    pub fn manual() -> Self {
        let fetcher = Self::new();
        fetcher.lock().auto_complete = false;
        fetcher
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.lock().routes.insert(url.into(), Ok(body.into()));
    }

    pub fn fail(&self, url: impl Into<String>, reason: impl Into<String>) {
        self.lock().routes.insert(url.into(), Err(reason.into()));
    }

    /// 尚未完成的抓取数
    pub fn in_flight(&self) -> usize {
        self.lock().started.len()
    }

    /// 完成所有已开始的抓取
    pub fn complete_all(&self) {
        let mut state = self.lock();
        while let Some((request, url)) = state.started.pop_front() {
            let completion = state.resolve(request, &url);
            state.completed.push_back(completion);
        }
    }
}

impl Fetcher for MemoryFetcher {
    fn start(&mut self, request: u32, url: &str) -> NetworkResult<()> {
        let mut state = self.lock();
        if state.auto_complete {
            let completion = state.resolve(request, url);
            state.completed.push_back(completion);
        } else {
            state.started.push_back((request, url.to_string()));
        }
        Ok(())
    }

    fn poll(&mut self) -> Vec<FetchCompletion> {
        self.lock().completed.drain(..).collect()
    }
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

enum FetchTask {
    File { request: u32, path: PathBuf },
    Http { request: u32, url: String },
}

/// `file://` 与 `http(s)://` 抓取器
///
/// 在专用线程上运行单线程 tokio 运行时，每个抓取是一个任务。
pub struct HttpFetcher {
    tx: mpsc::UnboundedSender<FetchTask>,
    rx: mpsc::UnboundedReceiver<FetchCompletion>,
    worker_handle: Option<std::thread::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl HttpFetcher {
    pub fn new(config: &NetworkConfig) -> NetworkResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| NetworkError::WorkerStart(e.to_string()))?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NetworkError::WorkerStart(e.to_string()))?;

        let (task_tx, task_rx) = mpsc::unbounded_channel::<FetchTask>();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker_handle = std::thread::Builder::new()
            .name("net-fetch".to_string())
            .spawn(move || {
                rt.block_on(async move {
                    let mut shutdown_rx = shutdown_rx;
                    let mut task_rx = task_rx;

                    loop {
                        tokio::select! {
                            _ = &mut shutdown_rx => {
                                tracing::info!(target: "bridge::net", "Fetch worker received shutdown signal");
                                break;
                            }
                            task = task_rx.recv() => {
                                match task {
                                    Some(task) => {
                                        let tx = done_tx.clone();
                                        let client = client.clone();
                                        tokio::spawn(async move {
                                            let completion = run_task(&client, task).await;
                                            let _ = tx.send(completion);
                                        });
                                    }
                                    None => {
                                        tracing::info!(target: "bridge::net", "Fetch task channel closed");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                });
            })
            .map_err(|e| NetworkError::WorkerStart(e.to_string()))?;

        Ok(Self {
            tx: task_tx,
            rx: done_rx,
            worker_handle: Some(worker_handle),
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

async fn run_task(client: &reqwest::Client, task: FetchTask) -> FetchCompletion {
    match task {
        FetchTask::File { request, path } => FetchCompletion {
            request,
            result: tokio::fs::read(&path)
                .await
                .map_err(|e| format!("{}: {}", path.display(), e)),
        },
        FetchTask::Http { request, url } => FetchCompletion {
            request,
            result: fetch_http(client, &url).await,
        },
    }
}

async fn fetch_http(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, String> {
    let resp = client.get(url).send().await.map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status()));
    }
    let body = resp.bytes().await.map_err(|e| e.to_string())?;
    Ok(body.to_vec())
}

impl Fetcher for HttpFetcher {
    fn start(&mut self, request: u32, url: &str) -> NetworkResult<()> {
        let task = if let Some(path) = url.strip_prefix("file://") {
            FetchTask::File {
                request,
                path: PathBuf::from(path),
            }
        } else if url.starts_with("http://") || url.starts_with("https://") {
            FetchTask::Http {
                request,
                url: url.to_string(),
            }
        } else {
            return Err(NetworkError::UnsupportedUrl(url.to_string()));
        };
        self.tx.send(task).map_err(|_| NetworkError::WorkerGone)
    }

    fn poll(&mut self) -> Vec<FetchCompletion> {
        let mut done = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            done.push(completion);
        }
        done
    }
}

impl Drop for HttpFetcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("running", &self.worker_handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, Instant};

    #[test]
    fn test_memory_fetcher_manual_completion() {
        let mut fetcher = MemoryFetcher::manual();
        fetcher.serve("http://x/data", b"abcdef".to_vec());
        fetcher.start(0, "http://x/data").unwrap();
        assert!(fetcher.poll().is_empty());
        assert_eq!(fetcher.in_flight(), 1);

        fetcher.complete_all();
        let done = fetcher.poll();
        assert_eq!(
            done,
            vec![FetchCompletion {
                request: 0,
                result: Ok(b"abcdef".to_vec())
            }]
        );
    }

    #[test]
    fn test_memory_fetcher_unknown_route_fails() {
        let mut fetcher = MemoryFetcher::new();
        fetcher.start(4, "http://nowhere").unwrap();
        let done = fetcher.poll();
        assert_eq!(done[0].request, 4);
        assert!(done[0].result.is_err());
    }

    #[test]
    fn test_http_fetcher_reads_file_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello file").unwrap();
        let url = format!("file://{}", file.path().display());

        let mut fetcher = HttpFetcher::new(&NetworkConfig::default()).unwrap();
        fetcher.start(1, &url).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut done = Vec::new();
        while done.is_empty() && Instant::now() < deadline {
            done = fetcher.poll();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(done[0].result, Ok(b"hello file".to_vec()));
    }

    #[test]
    fn test_http_fetcher_rejects_unknown_scheme() {
        let mut fetcher = HttpFetcher::new(&NetworkConfig::default()).unwrap();
        assert_eq!(
            fetcher.start(0, "gopher://old"),
            Err(NetworkError::UnsupportedUrl("gopher://old".to_string()))
        );
    }
}
