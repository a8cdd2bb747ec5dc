//! 绑定定义
//!
//! 每个标识符对应一个绑定：字面值、工厂、受保护的可调用对象或瞬态工厂。
//! 工厂与受保护对象共用 [`Factory`] 表示，由枚举标签区分是否会被 `get` 调用。

use super::store::StoreError;
use super::v2::ServiceContainer;
use crate::errors::BoxError;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 容器中存放的服务实例
pub type Service = Arc<dyn Any + Send + Sync>;

type FactoryFn = dyn Fn(&ServiceContainer) -> Result<Service, BoxError> + Send + Sync;
type DecoratorFn = dyn Fn(Service, &ServiceContainer) -> Result<Service, BoxError> + Send + Sync;

/// 以容器为参数的可调用对象
#[derive(Clone)]
pub struct Factory {
    factory_fn: Arc<FactoryFn>,
    type_name: &'static str,
}

impl Factory {
    /// 从返回具体类型的闭包创建工厂
    pub fn new<T, F>(factory_fn: F) -> Self
    where
        F: Fn(&ServiceContainer) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Self {
            factory_fn: Arc::new(move |container: &ServiceContainer| {
                let service = factory_fn(container)?;
                Ok(Arc::new(service) as Service)
            }),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn invoke(&self, container: &ServiceContainer) -> Result<Service, BoxError> {
        (self.factory_fn)(container)
    }

    /// 产出服务的类型名称（用于日志和错误信息）
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 两个句柄是否指向同一个可调用对象
    pub fn ptr_eq(&self, other: &Factory) -> bool {
        Arc::ptr_eq(&self.factory_fn, &other.factory_fn)
    }

    /// 组合：先调用当前工厂，再把结果交给装饰器
    ///
    /// 只构造新的闭包，两者都不会在这里被调用。
    pub fn decorate(&self, decorator: Decorator) -> Factory {
        let inner = self.clone();
        Factory {
            factory_fn: Arc::new(move |container: &ServiceContainer| {
                let previous = inner.invoke(container)?;
                decorator.invoke(previous, container)
            }),
            type_name: self.type_name,
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// 扩展已有工厂的装饰器，契约为 `(previous, container) -> new`
#[derive(Clone)]
pub struct Decorator {
    decorator_fn: Arc<DecoratorFn>,
}

impl Decorator {
    pub fn new<F>(decorator_fn: F) -> Self
    where
        F: Fn(Service, &ServiceContainer) -> Result<Service, BoxError> + Send + Sync + 'static,
    {
        Self {
            decorator_fn: Arc::new(decorator_fn),
        }
    }

    /// 带类型的装饰器，前一个值无法转换为 `T` 时返回类型错误
    pub fn typed<T, U, F>(decorator_fn: F) -> Self
    where
        F: Fn(Arc<T>, &ServiceContainer) -> Result<U, BoxError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
    {
        Self::new(move |previous: Service, container: &ServiceContainer| {
            let actual = format!("{:?}", Any::type_id(&*previous));
            let previous = previous.downcast::<T>().map_err(|_| {
                Box::new(StoreError::TypeMismatch {
                    expected: std::any::type_name::<T>(),
                    actual,
                }) as BoxError
            })?;
            let decorated = decorator_fn(previous, container)?;
            Ok(Arc::new(decorated) as Service)
        })
    }

    pub fn invoke(&self, previous: Service, container: &ServiceContainer) -> Result<Service, BoxError> {
        (self.decorator_fn)(previous, container)
    }
}

impl fmt::Debug for Decorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorator").finish_non_exhaustive()
    }
}

/// 标识符对应的原始绑定
#[derive(Clone)]
pub enum Binding {
    /// 字面值，原样返回
    Value(Service),
    /// 惰性工厂，最多成功调用一次，结果被缓存
    Factory(Factory),
    /// 受保护的可调用对象，`get` 返回它本身而不调用
    Protected(Factory),
    /// 瞬态工厂，每次 `get` 都重新调用，不缓存也不冻结
    Transient(Factory),
}

impl Binding {
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Binding::Value(Arc::new(value))
    }

    pub fn factory<T, F>(factory_fn: F) -> Self
    where
        F: Fn(&ServiceContainer) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Binding::Factory(Factory::new(factory_fn))
    }

    pub fn transient<T, F>(factory_fn: F) -> Self
    where
        F: Fn(&ServiceContainer) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Binding::Transient(Factory::new(factory_fn))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Value(_) => "value",
            Binding::Factory(_) => "factory",
            Binding::Protected(_) => "protected",
            Binding::Transient(_) => "transient",
        }
    }

    /// 绑定是否持有可调用对象
    pub fn is_invokable(&self) -> bool {
        !matches!(self, Binding::Value(_))
    }

    pub fn as_factory(&self) -> Option<&Factory> {
        match self {
            Binding::Value(_) => None,
            Binding::Factory(factory) | Binding::Protected(factory) | Binding::Transient(factory) => {
                Some(factory)
            }
        }
    }

    /// 字面值绑定的带类型视图
    pub fn downcast_value<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self {
            Binding::Value(service) => service.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// 转换为受保护绑定
    ///
    /// 字面值只有在其内容本身是 [`Factory`] 时才可被保护。
    pub(crate) fn into_protected(self) -> Result<Binding, StoreError> {
        match self {
            Binding::Factory(factory) | Binding::Protected(factory) | Binding::Transient(factory) => {
                Ok(Binding::Protected(factory))
            }
            Binding::Value(service) => match service.downcast::<Factory>() {
                Ok(factory) => Ok(Binding::Protected((*factory).clone())),
                Err(_) => Err(StoreError::NotInvokable(
                    "Callable is not an invokable definition.".to_string(),
                )),
            },
        }
    }
}

impl From<Factory> for Binding {
    fn from(factory: Factory) -> Self {
        Binding::Factory(factory)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Value(_) => f.write_str("Binding::Value(..)"),
            Binding::Factory(factory) => f.debug_tuple("Binding::Factory").field(factory).finish(),
            Binding::Protected(factory) => f.debug_tuple("Binding::Protected").field(factory).finish(),
            Binding::Transient(factory) => f.debug_tuple("Binding::Transient").field(factory).finish(),
        }
    }
}
