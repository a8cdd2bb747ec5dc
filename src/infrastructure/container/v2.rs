//! 键控服务容器
//!
//! 以字符串或整数为键保存字面值或惰性工厂：
//! - 工厂在第一次 `get` 时调用，结果被缓存，标识符随即冻结
//! - 冻结的标识符不能再 `set` 或 `extend`，只能 `remove` 后重新定义
//! - 受保护的可调用对象原样返回，不会被当作工厂调用
//!
//! 所有失败都以 [`ContainerError`] 返回，存储层错误不会泄漏到调用方。

use super::binding::{Binding, Decorator, Factory, Service};
use super::identifier::{IntoServiceId, ServiceId};
use super::store::{Resolution, ServiceStore, StoreError};
use crate::config::{ConfigLoader, ContainerConfig};
use crate::errors::{BoxError, ConfigError, ContainerError};
use crate::infrastructure::provider::{ParameterProvider, ServiceProvider};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 服务容器
///
/// 克隆得到的是同一份状态的句柄。
#[derive(Clone)]
pub struct ServiceContainer {
    store: Arc<ServiceStore>,
    /// 容器统计信息（内部原子计数器）
    stats: Arc<InnerStats>,
}

#[derive(Default)]
struct InnerStats {
    total_resolutions: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

impl ServiceContainer {
    /// 创建空容器
    pub fn new() -> Self {
        Self {
            store: Arc::new(ServiceStore::new()),
            stats: Arc::new(InnerStats::default()),
        }
    }

    /// 创建容器并预先绑定一组定义
    pub fn with_values<I, K>(values: I) -> Result<Self, ContainerError>
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: IntoServiceId,
    {
        let container = Self::new();
        for (id, binding) in values {
            container.set(id, binding)?;
        }
        Ok(container)
    }

    /// 根据配置创建容器，`parameters` 中的每一项绑定为 `serde_json::Value` 字面值
    pub fn from_config(config: &ContainerConfig) -> Result<Self, ContainerError> {
        let container = Self::new();
        container.register(&ParameterProvider::from_config(config))?;
        info!(parameters = container.len(), "container created from configuration");
        Ok(container)
    }

    /// 加载配置文件并创建容器
    pub fn load(loader: &ConfigLoader) -> Result<Self, ConfigError> {
        let config = loader.load_config()?;
        Ok(Self::from_config(&config)?)
    }

    /// 解析服务
    ///
    /// 工厂在第一次访问时调用并缓存结果，之后返回同一个实例。
    /// 工厂失败时标识符保持未解析状态，下一次 `get` 会重新调用。
    pub fn get<K: IntoServiceId>(&self, id: K) -> Result<Service, ContainerError> {
        let id = id.into_service_id()?;
        self.stats.total_resolutions.fetch_add(1, Ordering::Relaxed);

        match self.store.resolve(&id, self) {
            Ok(Resolution::Cached(service)) => {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                Ok(service)
            }
            Ok(fresh) => {
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                Ok(fresh.into_service())
            }
            Err(error) => {
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                debug!(service = %id, error = %error, "service resolution failed");
                Err(error.into())
            }
        }
    }

    /// 解析服务并转换为具体类型
    pub fn get_as<T: Send + Sync + 'static>(&self, id: impl IntoServiceId) -> Result<Arc<T>, ContainerError> {
        let service = self.get(id)?;
        let actual = format!("{:?}", Any::type_id(&*service));
        service.downcast::<T>().map_err(|_| {
            StoreError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                actual,
            }
            .into()
        })
    }

    /// 是否定义了该标识符；非法标识符返回 `false`
    pub fn has<K: IntoServiceId>(&self, id: K) -> bool {
        id.into_service_id()
            .map(|id| self.store.contains(&id))
            .unwrap_or(false)
    }

    /// 定义或覆盖绑定，已冻结的标识符返回 `FrozenService`
    pub fn set<K: IntoServiceId>(&self, id: K, binding: impl Into<Binding>) -> Result<(), ContainerError> {
        let id = id.into_service_id()?;
        let binding = binding.into();
        debug!(service = %id, kind = binding.kind(), "setting binding");
        self.store.insert(id, binding).map_err(ContainerError::from)
    }

    pub fn set_value<K, T>(&self, id: K, value: T) -> Result<(), ContainerError>
    where
        K: IntoServiceId,
        T: Send + Sync + 'static,
    {
        self.set(id, Binding::value(value))
    }

    /// 注册惰性工厂（解析一次并缓存）
    pub fn set_factory<K, T, F>(&self, id: K, factory: F) -> Result<(), ContainerError>
    where
        K: IntoServiceId,
        F: Fn(&ServiceContainer) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.set(id, Binding::factory(factory))
    }

    /// 注册瞬态工厂（每次解析都创建新实例）
    pub fn set_transient<K, T, F>(&self, id: K, factory: F) -> Result<(), ContainerError>
    where
        K: IntoServiceId,
        F: Fn(&ServiceContainer) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.set(id, Binding::transient(factory))
    }

    /// 删除标识符及其冻结状态；不存在或非法的标识符不做任何事
    pub fn remove<K: IntoServiceId>(&self, id: K) {
        if let Ok(id) = id.into_service_id() {
            self.store.remove(&id);
        }
    }

    /// 返回原始绑定，不解析也不改变冻结状态
    pub fn raw<K: IntoServiceId>(&self, id: K) -> Result<Binding, ContainerError> {
        let id = id.into_service_id()?;
        self.store.raw(&id).map_err(ContainerError::from)
    }

    /// 用装饰器包装一个尚未冻结的工厂
    ///
    /// 此处不调用原工厂也不调用装饰器；返回新的组合绑定。
    pub fn extend<K: IntoServiceId>(&self, id: K, decorator: Decorator) -> Result<Binding, ContainerError> {
        let id = id.into_service_id()?;
        self.store.extend(&id, decorator).map_err(ContainerError::from)
    }

    /// 带类型的 [`extend`](Self::extend)
    pub fn extend_with<K, T, U, F>(&self, id: K, decorator: F) -> Result<Binding, ContainerError>
    where
        K: IntoServiceId,
        F: Fn(Arc<T>, &ServiceContainer) -> Result<U, BoxError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
    {
        self.extend(id, Decorator::typed(decorator))
    }

    /// 把可调用对象标记为受保护，`get` 时原样返回
    ///
    /// 不修改任何容器状态，调用方需要自行 `set` 返回的绑定。
    pub fn protect(callable: impl Into<Binding>) -> Result<Binding, ContainerError> {
        callable.into().into_protected().map_err(ContainerError::from)
    }

    /// 带类型的 [`protect`](Self::protect)，闭包总是可调用的
    pub fn protect_fn<T, F>(callable: F) -> Binding
    where
        F: Fn(&ServiceContainer) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Binding::Protected(Factory::new(callable))
    }

    /// 通过服务提供者批量注册
    pub fn register<P: ServiceProvider + ?Sized>(&self, provider: &P) -> Result<&Self, ContainerError> {
        provider.register(self)?;
        debug!(services = self.len(), "service provider registered");
        Ok(self)
    }

    /// 注册服务提供者，随后用 `values` 覆盖或补充绑定
    pub fn register_with<P, I, K>(&self, provider: &P, values: I) -> Result<&Self, ContainerError>
    where
        P: ServiceProvider + ?Sized,
        I: IntoIterator<Item = (K, Binding)>,
        K: IntoServiceId,
    {
        self.register(provider)?;
        for (id, binding) in values {
            self.set(id, binding)?;
        }
        Ok(self)
    }

    /// 按定义顺序返回所有标识符
    pub fn keys(&self) -> Vec<ServiceId> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获取容器统计信息
    pub fn get_stats(&self) -> ContainerStats {
        ContainerStats {
            total_resolutions: self.stats.total_resolutions.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// 获取缓存命中率
    pub fn get_cache_hit_rate(&self) -> f64 {
        self.get_stats().hit_rate()
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStats {
    pub total_resolutions: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl ContainerStats {
    /// 获取总解析次数
    pub fn total(&self) -> usize {
        self.total_resolutions
    }

    /// 获取缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct TestService {
        id: usize,
    }

    #[test]
    fn test_value_round_trip() {
        let container = ServiceContainer::new();
        container.set_value("name", "keyed".to_string()).unwrap();
        container.set_value(7, 3.5f64).unwrap();

        assert_eq!(*container.get_as::<String>("name").unwrap(), "keyed");
        assert_eq!(*container.get_as::<f64>(7).unwrap(), 3.5);
    }

    #[test]
    fn test_factory_invoked_once() {
        let container = ServiceContainer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        container
            .set_factory("service", move |_| {
                let id = counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok(TestService { id })
            })
            .unwrap();

        let first = container.get_as::<TestService>("service").unwrap();
        let second = container.get_as::<TestService>("service").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_on_frozen_service() {
        let container = ServiceContainer::new();
        container.set_factory("service", |_| Ok(TestService { id: 1 })).unwrap();
        container.get("service").unwrap();

        let result = container.set_value("service", 2u8);
        assert!(matches!(result, Err(ContainerError::FrozenService(id)) if id == ServiceId::from("service")));

        container.remove("service");
        assert!(container.set_value("service", 2u8).is_ok());
        assert_eq!(*container.get_as::<u8>("service").unwrap(), 2);
    }

    #[test]
    fn test_not_found() {
        let container = ServiceContainer::new();

        assert!(matches!(container.get("missing"), Err(ContainerError::NotFound(_))));
        assert!(matches!(container.raw("missing"), Err(ContainerError::NotFound(_))));
        assert!(!container.has("missing"));
    }

    #[test]
    fn test_invalid_identifier() {
        let container = ServiceContainer::new();

        let result = container.set(json!([1, 2]), Binding::value("bad id type disallowed"));
        assert!(matches!(result, Err(ContainerError::InvalidIdentifier(_))));
        assert!(matches!(
            container.get(json!({"id": 1})),
            Err(ContainerError::InvalidIdentifier(_))
        ));
        assert!(!container.has(json!([1, 2])));
        container.remove(json!(null));
    }

    #[test]
    fn test_integer_strings_share_integer_keys() {
        let container = ServiceContainer::new();
        container.set_value("5", "five").unwrap();

        assert!(container.has(5));
        assert_eq!(*container.get_as::<&str>(5).unwrap(), "five");
        assert_eq!(container.keys(), vec![ServiceId::Index(5)]);

        container.set_value(7, "seven").unwrap();
        assert!(container.has("7"));
        assert!(container.has(json!(7.9)));

        // 非规范写法仍是字符串键
        assert!(!container.has("05"));
        container.remove("7");
        assert!(!container.has(7));
    }

    #[test]
    fn test_extend_is_lazy() {
        let container = ServiceContainer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        container
            .set_factory("number", move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok(5i32)
            })
            .unwrap();

        let extended = container
            .extend_with("number", |value: Arc<i32>, _| Ok(*value + 1))
            .unwrap();
        assert_eq!(extended.kind(), "factory");
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(*container.get_as::<i32>("number").unwrap(), 6);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_extend_errors() {
        let container = ServiceContainer::new();
        let decorator = || Decorator::new(|previous, _| Ok(previous));

        assert!(matches!(
            container.extend("missing", decorator()),
            Err(ContainerError::NotFound(_))
        ));

        container.set_value("literal", 1u8).unwrap();
        assert!(matches!(
            container.extend("literal", decorator()),
            Err(ContainerError::ExpectedInvokable(_))
        ));

        container
            .set("protected", ServiceContainer::protect_fn(|_| Ok(1u8)))
            .unwrap();
        assert!(matches!(
            container.extend("protected", decorator()),
            Err(ContainerError::ExpectedInvokable(_))
        ));

        container.set_factory("frozen", |_| Ok(1u8)).unwrap();
        container.get("frozen").unwrap();
        assert!(matches!(
            container.extend("frozen", decorator()),
            Err(ContainerError::FrozenService(_))
        ));
    }

    #[test]
    fn test_protect_returns_callable() {
        let container = ServiceContainer::new();
        let callable = Factory::new(|_| Ok("invoked"));
        let protected = ServiceContainer::protect(callable.clone()).unwrap();
        container.set("callable", protected).unwrap();

        let resolved = container.get_as::<Factory>("callable").unwrap();
        assert!(resolved.ptr_eq(&callable));

        let output = resolved.invoke(&container).unwrap();
        assert_eq!(*output.downcast::<&str>().unwrap(), "invoked");
    }

    #[test]
    fn test_protect_rejects_values() {
        let result = ServiceContainer::protect(Binding::value(42u32));
        assert!(matches!(result, Err(ContainerError::ExpectedInvokable(_))));
    }

    #[test]
    fn test_factory_failure_leaves_service_unfrozen() {
        let container = ServiceContainer::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        container
            .set_factory("flaky", move |_| {
                if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Box::new(std::io::Error::other("connection refused")) as BoxError)
                } else {
                    Ok(TestService { id: 7 })
                }
            })
            .unwrap();

        let error = container.get("flaky").unwrap_err();
        assert!(matches!(error, ContainerError::Container(_)));
        assert!(error.to_string().contains("connection refused"));

        // 再次解析会重新调用工厂
        assert_eq!(container.get_as::<TestService>("flaky").unwrap().id, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_get_as_type_mismatch() {
        let container = ServiceContainer::new();
        container.set_value("number", 1u64).unwrap();

        let result = container.get_as::<String>("number");
        assert!(matches!(result, Err(ContainerError::Container(_))));
    }

    #[test]
    fn test_register_with_overrides_provider_values() {
        let container = ServiceContainer::new();
        let provider = |c: &ServiceContainer| -> Result<(), ContainerError> {
            c.set_value("greeting", "hello")?;
            c.set_value("name", "world")
        };

        container
            .register_with(&provider, [("name", Binding::value("keyed")), ("extra", Binding::value("!"))])
            .unwrap();

        assert_eq!(*container.get_as::<&str>("greeting").unwrap(), "hello");
        assert_eq!(*container.get_as::<&str>("name").unwrap(), "keyed");
        assert_eq!(container.keys().len(), 3);
    }

    #[test]
    fn test_factory_panic_becomes_container_error() {
        let container = ServiceContainer::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        container
            .set_factory("fragile", move |_| {
                if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("pool exhausted");
                }
                Ok(TestService { id: 3 })
            })
            .unwrap();

        let error = container.get("fragile").unwrap_err();
        assert!(matches!(error, ContainerError::Container(_)));
        assert!(error.to_string().contains("pool exhausted"));

        // panic 之后标识符仍可重新解析
        assert_eq!(container.get_as::<TestService>("fragile").unwrap().id, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_container_stats() {
        let container = ServiceContainer::new();
        container.set_factory("service", |_| Ok(TestService { id: 42 })).unwrap();

        for _ in 0..10 {
            container.get("service").unwrap();
        }

        let stats = container.get_stats();
        assert_eq!(stats.total(), 10);
        assert_eq!(stats.cache_hits, 9); // 第一次miss，后面都是hit
        assert_eq!(stats.cache_misses, 1);
        assert!(container.get_cache_hit_rate() > 0.8);
    }
}
