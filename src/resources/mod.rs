//! 资源表模块
//!
//! 主机侧持有的只增不减的索引集合（UI元素、画布上下文、图像、音频源、网络请求）。
//!
//! ## 句柄语义
//!
//! - 插入时分配句柄 = 插入前的表长度，进程生命周期内稳定
//! - 没有删除操作，句柄永不复用；`handle < len` 即有效，有效性单调
//! - 越界查找返回 `ResourceError::InvalidHandle`，而不是未定义行为
//!
//! 没有 destroy 意味着表只会增长，适合页面级生命周期的短进程；
//! 长时间运行的宿主需要自行限制创建频率。

pub mod bitmap;

pub use bitmap::{ImageFormat, UploadedImage};

/// 图像表句柄
pub type ImageHandle = Handle<UploadedImage>;

use std::fmt;
use std::marker::PhantomData;

use crate::core::error::{ResourceError, ResourceResult};

/// 指向某一张资源表条目的稳定整数句柄
///
/// 类型参数把句柄绑定到唯一一张表；跨线程传输时使用 [`Handle::raw`]。
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// 从线上传输的原始整数构造句柄（未校验，查找时才校验）
    pub const fn from_raw(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub const fn raw(self) -> u32 {
        self.index
    }

    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// 只增不减的资源表
pub struct ResourceTable<T> {
    /// 表名（用于错误信息与日志）
    name: &'static str,
    entries: Vec<T>,
}

impl<T> ResourceTable<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 追加条目并返回新句柄
    pub fn create(&mut self, entry: T) -> ResourceResult<Handle<T>> {
        let index = u32::try_from(self.entries.len())
            .map_err(|_| ResourceError::TableFull(self.name))?;
        if index == u32::MAX {
            return Err(ResourceError::TableFull(self.name));
        }
        self.entries.push(entry);
        tracing::trace!(target: "bridge::resources", table = self.name, handle = index, "Created entry");
        Ok(Handle::from_raw(index))
    }

    /// 下一次 `create` 将返回的句柄
    pub fn next_handle(&self) -> Handle<T> {
        Handle::from_raw(self.entries.len() as u32)
    }

    pub fn get(&self, handle: Handle<T>) -> ResourceResult<&T> {
        let len = self.entries.len();
        self.entries
            .get(handle.index())
            .ok_or(ResourceError::InvalidHandle {
                table: self.name,
                handle: handle.raw(),
                len,
            })
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> ResourceResult<&mut T> {
        let len = self.entries.len();
        let name = self.name;
        self.entries
            .get_mut(handle.index())
            .ok_or(ResourceError::InvalidHandle {
                table: name,
                handle: handle.raw(),
                len,
            })
    }

    /// 句柄是否有效（`handle < len`）
    pub fn contains(&self, handle: Handle<T>) -> bool {
        handle.index() < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按句柄顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (Handle::from_raw(i as u32), entry))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.entries
            .iter_mut()
            .enumerate()
            .map(|(i, entry)| (Handle::from_raw(i as u32), entry))
    }
}

impl<T: fmt::Debug> fmt::Debug for ResourceTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTable")
            .field("name", &self.name)
            .field("len", &self.entries.len())
            .finish()
    }
}
