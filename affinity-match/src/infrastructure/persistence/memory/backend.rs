//! 进程内文档库
//!
//! 多个设备会话共享同一个 `InMemoryBackend`。所有写入在同一把写锁内完成，
//! 因此 `create_if_absent` 是原子的；服务器时钟严格递增。

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use affinity_core::{AffinityError, AffinityResult, ErrorKind, micros_to_datetime};
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, watch};
use tracing::{debug, trace};
use uuid::Uuid;

use super::query::CollectionQuery;
use super::rules;
use crate::domain::model::CreateOutcome;
use crate::infrastructure::persistence::paths::{is_valid_segment, split_document_path};

/// 写入时替换为服务器时间的占位值
pub const SERVER_TIMESTAMP_SENTINEL: &str = "$server_timestamp";

pub fn server_timestamp() -> Value {
    Value::String(SERVER_TIMESTAMP_SENTINEL.to_string())
}

/// 已存储的文档
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    pub path: String,
    pub data: Value,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl StoredDocument {
    pub fn id(&self) -> &str {
        split_document_path(&self.path)
            .map(|(_, id)| id)
            .unwrap_or(self.path.as_str())
    }
}

/// 可注入故障的操作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendOp {
    Read,
    Write,
    Query,
    Listen,
}

#[derive(Debug)]
struct FaultRule {
    op: Option<BackendOp>,
    kind: ErrorKind,
    remaining: usize,
}

struct Listener {
    query: CollectionQuery,
    sender: watch::Sender<Vec<StoredDocument>>,
}

#[derive(Default)]
struct DocumentTree {
    documents: BTreeMap<String, StoredDocument>,
    last_server_micros: i64,
}

impl DocumentTree {
    /// 严格递增的服务器时间
    fn next_server_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let micros = now.max(self.last_server_micros + 1);
        self.last_server_micros = micros;
        micros_to_datetime(micros).unwrap_or_else(Utc::now)
    }
}

/// 进程内 "Profile & Messaging Store"
pub struct InMemoryBackend {
    tree: RwLock<DocumentTree>,
    listeners: DashMap<u64, Listener>,
    next_listener_id: AtomicU64,
    faults: Mutex<VecDeque<FaultRule>>,
    latency: Duration,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(DocumentTree::default()),
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
            faults: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
        }
    }

    /// 每次操作前的模拟网络延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 接下来 `times` 次操作（任意类型）失败
    pub fn fail_next(&self, times: usize, kind: ErrorKind) {
        self.push_fault(None, times, kind);
    }

    /// 接下来 `times` 次指定类型的操作失败
    pub fn fail_next_on(&self, op: BackendOp, times: usize, kind: ErrorKind) {
        self.push_fault(Some(op), times, kind);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn push_fault(&self, op: Option<BackendOp>, times: usize, kind: ErrorKind) {
        if times == 0 {
            return;
        }
        self.faults.lock().push_back(FaultRule {
            op,
            kind,
            remaining: times,
        });
    }

    fn take_fault(&self, op: BackendOp) -> Option<AffinityError> {
        let mut faults = self.faults.lock();
        let index = faults
            .iter()
            .position(|rule| rule.op.is_none_or(|target| target == op))?;
        let rule = &mut faults[index];
        rule.remaining -= 1;
        let kind = rule.kind;
        if rule.remaining == 0 {
            faults.remove(index);
        }
        Some(AffinityError::from_kind(
            kind,
            format!("injected {:?} failure", op),
        ))
    }

    async fn enter(&self, op: BackendOp) -> AffinityResult<()> {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
        match self.take_fault(op) {
            Some(err) => {
                debug!(op = ?op, error = %err, "Injected backend failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // 读取
    // ------------------------------------------------------------------

    pub async fn get(&self, caller: Option<&str>, path: &str) -> AffinityResult<Option<StoredDocument>> {
        self.enter(BackendOp::Read).await?;
        let tree = self.tree.read().await;
        rules::check_read(&tree.documents, caller, path)?;
        Ok(tree.documents.get(path).cloned())
    }

    pub async fn query(
        &self,
        caller: Option<&str>,
        query: &CollectionQuery,
    ) -> AffinityResult<Vec<StoredDocument>> {
        self.enter(BackendOp::Query).await?;
        let tree = self.tree.read().await;
        rules::check_query(&tree.documents, caller, query)?;
        Ok(query.run(&tree.documents))
    }

    // ------------------------------------------------------------------
    // 写入
    // ------------------------------------------------------------------

    /// 覆盖写入（upsert），保留原创建时间
    pub async fn set(
        &self,
        caller: Option<&str>,
        path: &str,
        data: Value,
    ) -> AffinityResult<StoredDocument> {
        self.enter(BackendOp::Write).await?;
        check_document_path(path)?;
        let mut tree = self.tree.write().await;
        rules::check_write(&tree.documents, caller, path, &data)?;

        let now = tree.next_server_time();
        let create_time = tree
            .documents
            .get(path)
            .map(|existing| existing.create_time)
            .unwrap_or(now);
        let stored = StoredDocument {
            path: path.to_string(),
            data: resolve_server_timestamps(data, now),
            create_time,
            update_time: now,
        };
        tree.documents.insert(path.to_string(), stored.clone());
        self.notify(&tree.documents, path);
        trace!(path = %path, "Document set");
        Ok(stored)
    }

    /// 原子条件创建：不存在时写入，存在时返回已有文档
    pub async fn create_if_absent(
        &self,
        caller: Option<&str>,
        path: &str,
        data: Value,
    ) -> AffinityResult<CreateOutcome<StoredDocument>> {
        self.enter(BackendOp::Write).await?;
        check_document_path(path)?;
        let mut tree = self.tree.write().await;
        if let Some(existing) = tree.documents.get(path) {
            rules::check_read(&tree.documents, caller, path)?;
            return Ok(CreateOutcome::Existing(existing.clone()));
        }
        rules::check_write(&tree.documents, caller, path, &data)?;

        let now = tree.next_server_time();
        let stored = StoredDocument {
            path: path.to_string(),
            data: resolve_server_timestamps(data, now),
            create_time: now,
            update_time: now,
        };
        tree.documents.insert(path.to_string(), stored.clone());
        self.notify(&tree.documents, path);
        debug!(path = %path, "Document created");
        Ok(CreateOutcome::Created(stored))
    }

    /// 合并更新顶层字段，文档不存在返回 `NotFound`
    pub async fn update(
        &self,
        caller: Option<&str>,
        path: &str,
        fields: Map<String, Value>,
    ) -> AffinityResult<StoredDocument> {
        self.enter(BackendOp::Write).await?;
        let mut tree = self.tree.write().await;
        let existing = match tree.documents.get(path) {
            Some(existing) => existing.clone(),
            None => {
                // 未登录优先于不存在
                rules::require_auth(caller)?;
                return Err(AffinityError::NotFound(path.to_string()));
            }
        };

        let mut merged = existing.data.clone();
        if let Value::Object(target) = &mut merged {
            target.extend(fields);
        }
        rules::check_write(&tree.documents, caller, path, &merged)?;

        let now = tree.next_server_time();
        let stored = StoredDocument {
            path: path.to_string(),
            data: resolve_server_timestamps(merged, now),
            create_time: existing.create_time,
            update_time: now,
        };
        tree.documents.insert(path.to_string(), stored.clone());
        self.notify(&tree.documents, path);
        trace!(path = %path, "Document updated");
        Ok(stored)
    }

    /// 以随机 ID 追加文档
    pub async fn add(
        &self,
        caller: Option<&str>,
        collection: &str,
        data: Value,
    ) -> AffinityResult<StoredDocument> {
        let path = format!("{}/{}", collection, Uuid::new_v4().simple());
        self.set(caller, &path, data).await
    }

    // ------------------------------------------------------------------
    // 实时监听
    // ------------------------------------------------------------------

    /// 注册监听，接收端的当前值即订阅时的结果集
    pub async fn listen(
        &self,
        caller: Option<&str>,
        query: CollectionQuery,
    ) -> AffinityResult<(u64, watch::Receiver<Vec<StoredDocument>>)> {
        self.enter(BackendOp::Listen).await?;
        let tree = self.tree.read().await;
        rules::check_query(&tree.documents, caller, &query)?;

        let (sender, receiver) = watch::channel(query.run(&tree.documents));
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        debug!(listener_id = id, collection = %query.collection, "Listener registered");
        self.listeners.insert(id, Listener { query, sender });
        Ok((id, receiver))
    }

    /// 注销监听，返回是否确实移除了
    pub fn remove_listener(&self, id: u64) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            debug!(listener_id = id, "Listener removed");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// 在写锁内推送变更，保证快照顺序与写入顺序一致
    fn notify(&self, documents: &BTreeMap<String, StoredDocument>, changed_path: &str) {
        for listener in self.listeners.iter() {
            if !listener.query.covers_path(changed_path) {
                continue;
            }
            let snapshot = listener.query.run(documents);
            listener.sender.send_if_modified(|current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
        }
    }

    // ------------------------------------------------------------------
    // 测试辅助
    // ------------------------------------------------------------------

    /// 绕过访问规则直接写入（如导入旧客户端数据）
    pub async fn seed_document(&self, path: &str, data: Value) -> AffinityResult<StoredDocument> {
        check_document_path(path)?;
        let mut tree = self.tree.write().await;
        let now = tree.next_server_time();
        let stored = StoredDocument {
            path: path.to_string(),
            data: resolve_server_timestamps(data, now),
            create_time: now,
            update_time: now,
        };
        tree.documents.insert(path.to_string(), stored.clone());
        self.notify(&tree.documents, path);
        Ok(stored)
    }

    /// 集合下直接子文档数量（绕过访问规则）
    pub async fn document_count(&self, collection: &str) -> usize {
        let tree = self.tree.read().await;
        CollectionQuery::collection(collection)
            .run(&tree.documents)
            .len()
    }

    /// 读取原始文档（绕过访问规则）
    pub async fn raw_document(&self, path: &str) -> Option<StoredDocument> {
        self.tree.read().await.documents.get(path).cloned()
    }
}

fn check_document_path(path: &str) -> AffinityResult<()> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() % 2 != 0 || !segments.iter().all(|s| is_valid_segment(s)) {
        return Err(AffinityError::InvalidArgument(format!(
            "'{}' is not a document path",
            path
        )));
    }
    Ok(())
}

fn resolve_server_timestamps(mut data: Value, now: DateTime<Utc>) -> Value {
    if let Value::Object(fields) = &mut data {
        let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        for value in fields.values_mut() {
            if value.as_str() == Some(SERVER_TIMESTAMP_SENTINEL) {
                *value = Value::String(stamp.clone());
            }
        }
    }
    data
}
