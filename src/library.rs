//! 文件库状态：存储目录、元数据文档与串行化写操作的全局锁。

use tokio::sync::{Mutex, MutexGuard};

use crate::metadata::MetadataStore;
use crate::storage::Storage;

/// 由服务进程持有并注入到各处理器的共享状态。
///
/// 存储目录与元数据文档的每次“读取-修改-写回”都必须在 [`Library::write_lock`]
/// 之内完成，否则并发上传会互相覆盖文件或丢失元数据更新。
#[derive(Debug)]
pub struct Library {
    storage: Storage,
    metadata: MetadataStore,
    lock: Mutex<()>,
}

impl Library {
    pub fn new(storage: Storage, metadata: MetadataStore) -> Self {
        Self {
            storage,
            metadata,
            lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}
