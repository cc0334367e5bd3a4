//! 网络请求多路复用模块
//!
//! 跟踪进行中的异步抓取，对计算侧提供非阻塞的完成查询与分块读取。
//!
//! ## 请求状态
//!
//! ```text
//! Pending ──► Ready(body)
//!    │
//!    └──────► Failed(reason)
//! ```
//!
//! - 状态只前进不回退；Ready 与 Failed 统称"已完成"
//! - 不重试：一次抓取失败即进入 Failed
//! - 读游标单调前进，永远不超过正文长度

pub mod fetcher;

pub use fetcher::{FetchCompletion, Fetcher, HttpFetcher, MemoryFetcher};

use serde::{Deserialize, Serialize};

use crate::core::error::ResourceResult;
use crate::resources::{Handle, ResourceTable};

/// 网络请求句柄
pub type RequestHandle = Handle<NetworkRequest>;

/// 请求状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Pending,
    Ready,
    Failed(String),
}

impl RequestState {
    /// `net-get-status` 的数值编码
    pub fn code(&self) -> u32 {
        match self {
            RequestState::Pending => 0,
            RequestState::Ready => 1,
            RequestState::Failed(_) => 2,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, RequestState::Pending)
    }
}

/// 网络请求表条目
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    pub url: String,
    state: RequestState,
    body: Option<Vec<u8>>,
    cursor: usize,
}

impl NetworkRequest {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            state: RequestState::Pending,
            body: None,
            cursor: 0,
        }
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn body_len(&self) -> Option<usize> {
        self.body.as_ref().map(Vec::len)
    }

    /// 从游标处读取至多 `max_len` 字节并推进游标
    ///
    /// 未就绪或失败时返回空；读尽后重复读取也返回空。
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        let Some(body) = &self.body else {
            return Vec::new();
        };
        let end = self.cursor.saturating_add(max_len).min(body.len());
        let chunk = body[self.cursor..end].to_vec();
        self.cursor = end;
        chunk
    }

    fn settle(&mut self, result: Result<Vec<u8>, String>) -> bool {
        if self.state.is_settled() {
            return false;
        }
        match result {
            Ok(body) => {
                self.body = Some(body);
                self.state = RequestState::Ready;
            }
            Err(reason) => self.state = RequestState::Failed(reason),
        }
        true
    }
}

/// 网络请求多路复用器
pub struct NetworkMultiplexer {
    requests: ResourceTable<NetworkRequest>,
    fetcher: Box<dyn Fetcher>,
}

impl NetworkMultiplexer {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            requests: ResourceTable::new("network request"),
            fetcher,
        }
    }

    pub fn requests(&self) -> &ResourceTable<NetworkRequest> {
        &self.requests
    }

    /// 登记 Pending 请求并开始抓取，不阻塞
    ///
    /// 抓取无法开始时（不支持的 URL 等）请求直接进入 Failed，句柄仍然有效。
    pub fn fetch(&mut self, url: &str) -> ResourceResult<RequestHandle> {
        let handle = self.requests.create(NetworkRequest::new(url))?;
        tracing::debug!(target: "bridge::net", request = handle.raw(), url, "Fetch started");
        if let Err(e) = self.fetcher.start(handle.raw(), url) {
            tracing::warn!(target: "bridge::net", request = handle.raw(), url, error = %e, "Fetch could not start");
            self.requests.get_mut(handle)?.settle(Err(e.to_string()));
        }
        Ok(handle)
    }

    /// 收取已完成的抓取，返回本次完成的请求数
    pub fn poll(&mut self) -> usize {
        let mut settled = 0;
        for completion in self.fetcher.poll() {
            let handle = Handle::from_raw(completion.request);
            let Ok(request) = self.requests.get_mut(handle) else {
                tracing::error!(target: "bridge::net", request = completion.request, "Completion for unknown request");
                continue;
            };
            match &completion.result {
                Ok(body) => {
                    tracing::debug!(target: "bridge::net", request = completion.request, bytes = body.len(), "Fetch completed")
                }
                Err(reason) => {
                    tracing::warn!(target: "bridge::net", request = completion.request, url = %request.url, reason = %reason, "Fetch failed")
                }
            }
            if request.settle(completion.result) {
                settled += 1;
            }
        }
        settled
    }

    /// 是否已完成（Ready 或 Failed）
    pub fn is_ready(&self, handle: RequestHandle) -> ResourceResult<bool> {
        Ok(self.requests.get(handle)?.state.is_settled())
    }

    pub fn status(&self, handle: RequestHandle) -> ResourceResult<u32> {
        Ok(self.requests.get(handle)?.state.code())
    }

    pub fn read(&mut self, handle: RequestHandle, max_len: usize) -> ResourceResult<Vec<u8>> {
        Ok(self.requests.get_mut(handle)?.read(max_len))
    }

    pub fn pending(&self) -> usize {
        self.requests
            .iter()
            .filter(|(_, r)| !r.state.is_settled())
            .count()
    }
}

impl std::fmt::Debug for NetworkMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMultiplexer")
            .field("requests", &self.requests.len())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ResourceError;
    use proptest::prelude::*;

    fn manual() -> (NetworkMultiplexer, MemoryFetcher) {
        let fetcher = MemoryFetcher::manual();
        (NetworkMultiplexer::new(Box::new(fetcher.clone())), fetcher)
    }

    #[test]
    fn test_chunked_read() {
        let (mut net, fetcher) = manual();
        fetcher.serve("http://x/data", b"abcdef".to_vec());
        let h = net.fetch("http://x/data").unwrap();
        assert_eq!(h.raw(), 0);
        assert!(!net.is_ready(h).unwrap());
        assert!(net.read(h, 4).unwrap().is_empty());

        fetcher.complete_all();
        assert_eq!(net.poll(), 1);
        assert!(net.is_ready(h).unwrap());
        assert_eq!(net.read(h, 4).unwrap(), b"abcd");
        assert_eq!(net.read(h, 4).unwrap(), b"ef");
        assert!(net.read(h, 4).unwrap().is_empty());
        assert_eq!(net.requests().get(h).unwrap().cursor(), 6);
    }

    #[test]
    fn test_failed_request_settles() {
        let (mut net, fetcher) = manual();
        fetcher.fail("http://x/broken", "HTTP 500");
        let h = net.fetch("http://x/broken").unwrap();
        assert_eq!(net.status(h).unwrap(), 0);
        fetcher.complete_all();
        net.poll();
        assert_eq!(net.status(h).unwrap(), 2);
        assert!(net.is_ready(h).unwrap());
        assert!(net.read(h, 16).unwrap().is_empty());
    }

    #[test]
    fn test_start_failure_marks_failed() {
        struct Refusing;
        impl Fetcher for Refusing {
            fn start(&mut self, _: u32, url: &str) -> crate::core::error::NetworkResult<()> {
                Err(crate::core::error::NetworkError::UnsupportedUrl(url.to_string()))
            }
            fn poll(&mut self) -> Vec<FetchCompletion> {
                Vec::new()
            }
        }
        let mut net = NetworkMultiplexer::new(Box::new(Refusing));
        let h = net.fetch("ftp://x").unwrap();
        assert_eq!(net.status(h).unwrap(), 2);
    }

    #[test]
    fn test_invalid_handle() {
        let (net, _) = manual();
        assert!(matches!(
            net.is_ready(Handle::from_raw(3)),
            Err(ResourceError::InvalidHandle { handle: 3, .. })
        ));
    }

    proptest! {
        // 读取结果拼接后恰为完整正文，每次读取不超过 min(n, 剩余)
        #[test]
        fn reads_concatenate_to_body(
            body in proptest::collection::vec(any::<u8>(), 0..512),
            sizes in proptest::collection::vec(0usize..64, 1..64),
        ) {
            let (mut net, fetcher) = manual();
            fetcher.serve("http://x/p", body.clone());
            let h = net.fetch("http://x/p").unwrap();
            fetcher.complete_all();
            net.poll();

            let mut out = Vec::new();
            let mut ready_seen = false;
            for n in sizes.iter().cycle().take(body.len() + sizes.len()) {
                let remaining = body.len() - out.len();
                let chunk = net.read(h, *n).unwrap();
                prop_assert!(chunk.len() <= (*n).min(remaining));
                out.extend(chunk);
                let ready = net.is_ready(h).unwrap();
                prop_assert!(ready || !ready_seen);
                ready_seen |= ready;
            }
            let rest = net.read(h, usize::MAX).unwrap();
            out.extend(rest);
            prop_assert_eq!(out, body);
        }
    }
}
