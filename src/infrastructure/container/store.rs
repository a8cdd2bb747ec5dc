//! 底层服务存储
//!
//! 保存每个标识符的原始绑定、解析结果和冻结状态。只向容器门面暴露，
//! 自己的错误类型 [`StoreError`] 在门面边界统一映射为 [`ContainerError`]。
//!
//! 并发模型：
//! - 槽位表使用 `DashMap`，调用工厂时不持有任何分片锁
//! - 每个槽位一把可重入锁，首次解析在锁内完成，保证工厂最多成功调用一次
//! - 同一线程在工厂内重入同一标识符的解析会得到 `Circular` 错误
//! - 工厂 panic 被捕获并作为工厂失败返回，标识符保持未冻结

use super::binding::{Binding, Decorator, Factory, Service};
use super::identifier::ServiceId;
use super::v2::ServiceContainer;
use crate::errors::{BoxError, ContainerError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Identifier \"{0}\" is not defined.")]
    UnknownIdentifier(ServiceId),
    #[error("Cannot override frozen service \"{0}\".")]
    Frozen(ServiceId),
    #[error("Identifier \"{0}\" does not contain an object definition.")]
    NotExtendable(ServiceId),
    #[error("{0}")]
    NotInvokable(String),
    #[error("Circular resolution of service \"{0}\".")]
    Circular(ServiceId),
    #[error("Service \"{id}\" could not be created: {source}")]
    FactoryFailed {
        id: ServiceId,
        #[source]
        source: BoxError,
    },
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },
}

/// 存储层错误到公开错误的映射
pub(crate) fn into_public(error: StoreError) -> ContainerError {
    match error {
        StoreError::UnknownIdentifier(id) => ContainerError::NotFound(id),
        StoreError::Frozen(id) => ContainerError::FrozenService(id),
        StoreError::NotExtendable(id) => ContainerError::ExpectedInvokable(format!(
            "Identifier \"{}\" does not contain an invokable definition.",
            id
        )),
        StoreError::NotInvokable(message) => ContainerError::ExpectedInvokable(message),
        other @ (StoreError::Circular(_)
        | StoreError::FactoryFailed { .. }
        | StoreError::TypeMismatch { .. }) => ContainerError::Container(Box::new(other)),
    }
}

impl From<StoreError> for ContainerError {
    fn from(error: StoreError) -> Self {
        into_public(error)
    }
}

/// 解析结果，区分是否命中缓存
pub(crate) enum Resolution {
    Cached(Service),
    Fresh(Service),
}

impl Resolution {
    pub(crate) fn into_service(self) -> Service {
        match self {
            Resolution::Cached(service) | Resolution::Fresh(service) => service,
        }
    }
}

struct SlotState {
    binding: Binding,
    resolved: Option<Service>,
    frozen: bool,
    resolving: bool,
}

struct Slot {
    /// 插入顺序，用于稳定的 `keys()` 输出
    seq: u64,
    removed: AtomicBool,
    state: ReentrantMutex<RefCell<SlotState>>,
}

impl Slot {
    fn new(seq: u64, binding: Binding) -> Self {
        Self {
            seq,
            removed: AtomicBool::new(false),
            state: ReentrantMutex::new(RefCell::new(SlotState {
                binding,
                resolved: None,
                frozen: false,
                resolving: false,
            })),
        }
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub(crate) struct ServiceStore {
    slots: DashMap<ServiceId, Arc<Slot>>,
    next_seq: AtomicU64,
}

impl ServiceStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 取出槽位句柄，分片锁在返回前释放
    fn slot(&self, id: &ServiceId) -> Option<Arc<Slot>> {
        self.slots.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn contains(&self, id: &ServiceId) -> bool {
        self.slots.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// 按插入顺序返回所有标识符
    pub(crate) fn keys(&self) -> Vec<ServiceId> {
        let mut keys: Vec<(u64, ServiceId)> = self
            .slots
            .iter()
            .map(|entry| (entry.value().seq, entry.key().clone()))
            .collect();
        keys.sort_by_key(|(seq, _)| *seq);
        keys.into_iter().map(|(_, id)| id).collect()
    }

    pub(crate) fn insert(&self, id: ServiceId, binding: Binding) -> Result<(), StoreError> {
        loop {
            let slot = match self.slots.entry(id.clone()) {
                Entry::Occupied(entry) => Arc::clone(entry.get()),
                Entry::Vacant(entry) => {
                    let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                    entry.insert(Arc::new(Slot::new(seq, binding)));
                    trace!(service = %id, "binding created");
                    return Ok(());
                }
            };

            let guard = slot.state.lock();
            let mut state = guard.borrow_mut();
            if slot.is_removed() {
                continue;
            }
            if state.frozen || state.resolving {
                return Err(StoreError::Frozen(id));
            }
            state.binding = binding;
            state.resolved = None;
            trace!(service = %id, "binding replaced");
            return Ok(());
        }
    }

    pub(crate) fn remove(&self, id: &ServiceId) {
        if let Some((_, slot)) = self.slots.remove(id) {
            slot.removed.store(true, Ordering::Release);
            trace!(service = %id, "binding removed");
        }
    }

    pub(crate) fn raw(&self, id: &ServiceId) -> Result<Binding, StoreError> {
        loop {
            let slot = self
                .slot(id)
                .ok_or_else(|| StoreError::UnknownIdentifier(id.clone()))?;
            let guard = slot.state.lock();
            if slot.is_removed() {
                continue;
            }
            let binding = guard.borrow().binding.clone();
            return Ok(binding);
        }
    }

    pub(crate) fn extend(&self, id: &ServiceId, decorator: Decorator) -> Result<Binding, StoreError> {
        loop {
            let slot = self
                .slot(id)
                .ok_or_else(|| StoreError::UnknownIdentifier(id.clone()))?;
            let guard = slot.state.lock();
            let mut state = guard.borrow_mut();
            if slot.is_removed() {
                continue;
            }
            if state.frozen || state.resolving {
                return Err(StoreError::Frozen(id.clone()));
            }

            let extended = match &state.binding {
                Binding::Factory(factory) => Binding::Factory(factory.decorate(decorator)),
                Binding::Transient(factory) => Binding::Transient(factory.decorate(decorator)),
                Binding::Value(_) | Binding::Protected(_) => {
                    return Err(StoreError::NotExtendable(id.clone()));
                }
            };
            state.binding = extended.clone();
            state.resolved = None;
            debug!(service = %id, kind = extended.kind(), "binding extended");
            return Ok(extended);
        }
    }

    pub(crate) fn resolve(
        &self,
        id: &ServiceId,
        container: &ServiceContainer,
    ) -> Result<Resolution, StoreError> {
        loop {
            let slot = self
                .slot(id)
                .ok_or_else(|| StoreError::UnknownIdentifier(id.clone()))?;
            let guard = slot.state.lock();
            if slot.is_removed() {
                continue;
            }

            let pending = {
                let mut state = guard.borrow_mut();
                if let Some(service) = &state.resolved {
                    return Ok(Resolution::Cached(service.clone()));
                }
                match state.binding.clone() {
                    Binding::Value(service) => {
                        state.resolved = Some(service.clone());
                        state.frozen = true;
                        return Ok(Resolution::Fresh(service));
                    }
                    Binding::Protected(factory) => {
                        let service: Service = Arc::new(factory);
                        state.resolved = Some(service.clone());
                        state.frozen = true;
                        return Ok(Resolution::Fresh(service));
                    }
                    Binding::Factory(_) if state.resolving => {
                        return Err(StoreError::Circular(id.clone()));
                    }
                    Binding::Factory(factory) => {
                        state.resolving = true;
                        Pending::Once(factory)
                    }
                    Binding::Transient(factory) => Pending::EachTime(factory),
                }
            };

            return match pending {
                Pending::EachTime(factory) => {
                    drop(guard);
                    invoke_guarded(&factory, container)
                        .map(Resolution::Fresh)
                        .map_err(|source| StoreError::FactoryFailed {
                            id: id.clone(),
                            source,
                        })
                }
                Pending::Once(factory) => {
                    // 可重入锁保持到工厂返回，其它线程在此等待
                    let flag = ResolvingFlag { state: &*guard };
                    let result = invoke_guarded(&factory, container);
                    drop(flag);

                    let mut state = guard.borrow_mut();
                    match result {
                        Ok(service) => {
                            state.resolved = Some(service.clone());
                            state.frozen = true;
                            debug!(service = %id, type_name = factory.type_name(), "service resolved and frozen");
                            Ok(Resolution::Fresh(service))
                        }
                        Err(source) => Err(StoreError::FactoryFailed {
                            id: id.clone(),
                            source,
                        }),
                    }
                }
            };
        }
    }
}

/// 调用工厂，把 panic 转换为普通错误
fn invoke_guarded(factory: &Factory, container: &ServiceContainer) -> Result<Service, BoxError> {
    panic::catch_unwind(AssertUnwindSafe(|| factory.invoke(container))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Err(format!("factory panicked: {}", message).into())
    })
}

enum Pending {
    Once(Factory),
    EachTime(Factory),
}

/// 工厂返回或 panic 时清除解析中标记
struct ResolvingFlag<'a> {
    state: &'a RefCell<SlotState>,
}

impl Drop for ResolvingFlag<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.resolving = false;
        }
    }
}
