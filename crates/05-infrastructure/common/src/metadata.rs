//! 元数据定义
//!
//! 提供组件类型的元数据信息：方法签名、注解、契约视图与生命周期方法。
//! 组件实例在容器中以 [`Instance`] 的形式流转，契约视图负责把类型擦除的
//! 实例还原为调用方需要的 `Arc<dyn Contract>`。

use crate::component::{ComponentRole, Instance};
use crate::errors::BoxError;
use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// 类型信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// 类型名称
    pub name: String,
    /// 类型ID
    pub id: TypeId,
    /// 模块路径
    pub module_path: String,
}

impl TypeInfo {
    /// 从类型获取类型信息
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full = std::any::type_name::<T>();
        Self {
            name: short_type_name(full).to_string(),
            id: TypeId::of::<T>(),
            module_path: full.to_string(),
        }
    }

    /// 获取简短的类型名称（不包含模块路径）
    pub fn short_name(&self) -> &str {
        &self.name
    }
}

fn short_type_name(full: &str) -> &str {
    // 泛型参数里也有路径分隔符，只截取泛型之前的部分
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

/// 方法签名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// 方法名称
    pub name: String,
    /// 参数类型
    pub parameter_types: Vec<String>,
    /// 返回值类型
    pub return_type: String,
    /// 方法注解
    pub annotations: BTreeSet<String>,
}

impl MethodSignature {
    /// 创建无参数、无返回值的方法签名
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_types: Vec::new(),
            return_type: "()".to_string(),
            annotations: BTreeSet::new(),
        }
    }

    /// 设置参数类型
    #[must_use]
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = params.into_iter().map(Into::into).collect();
        self
    }

    /// 设置返回值类型
    #[must_use]
    pub fn returning(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    /// 添加注解
    #[must_use]
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.insert(annotation.into());
        self
    }

    /// 是否带有指定注解
    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.contains(annotation)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) -> {}",
            self.name,
            self.parameter_types.join(", "),
            self.return_type
        )
    }
}

/// 契约信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractInfo {
    /// 契约名称
    pub name: String,
    /// 契约类型ID（通常是某个 `dyn Trait`）
    pub id: TypeId,
}

impl ContractInfo {
    /// 从类型获取契约信息
    pub fn of<C: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: TypeId::of::<C>(),
        }
    }
}

type ViewCaster = Arc<dyn Fn(Instance) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// 契约视图：把某个具体类型的实例转换为契约引用
#[derive(Clone)]
struct ContractView {
    contract: ContractInfo,
    source: TypeId,
    cast: ViewCaster,
}

/// 生命周期方法（初始化或销毁回调）
pub type LifecycleMethod = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

/// 组件类型
///
/// 描述一个组件的可拦截表面：方法签名、注解、角色，以及从实例还原契约引用的视图。
/// 代理实现同一组契约时，也通过这里注册的视图对外暴露。
#[derive(Clone)]
pub struct ComponentType {
    info: TypeInfo,
    annotations: BTreeSet<String>,
    methods: Vec<MethodSignature>,
    role: ComponentRole,
    contracts: Vec<ContractInfo>,
    views: Vec<ContractView>,
    lifecycle_methods: HashMap<String, LifecycleMethod>,
    extensions: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ComponentType {
    /// 为具体类型创建组件类型
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            info: TypeInfo::of::<T>(),
            annotations: BTreeSet::new(),
            methods: Vec::new(),
            role: ComponentRole::Application,
            contracts: Vec::new(),
            views: Vec::new(),
            lifecycle_methods: HashMap::new(),
            extensions: HashMap::new(),
        }
    }

    /// 添加类型注解
    #[must_use]
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.insert(annotation.into());
        self
    }

    /// 声明一个方法
    #[must_use]
    pub fn with_method(mut self, method: MethodSignature) -> Self {
        self.methods.push(method);
        self
    }

    /// 设置组件角色
    #[must_use]
    pub fn with_role(mut self, role: ComponentRole) -> Self {
        self.role = role;
        self
    }

    /// 声明组件对外暴露的契约，并注册原始实例到契约的视图
    #[must_use]
    pub fn exposes<T, C>(mut self, contract: &str, cast: fn(Arc<T>) -> Arc<C>) -> Self
    where
        T: Any + Send + Sync,
        C: ?Sized + Send + Sync + 'static,
    {
        let info = ContractInfo::of::<C>(contract);
        if !self.contracts.contains(&info) {
            self.contracts.push(info);
        }
        self.with_view(contract, cast)
    }

    /// 注册从任意来源类型到契约的视图，不改变对外契约列表
    ///
    /// 代理类型通过它声明自己能以同一契约的形式出现。
    #[must_use]
    pub fn with_view<S, C>(mut self, contract: &str, cast: fn(Arc<S>) -> Arc<C>) -> Self
    where
        S: Any + Send + Sync,
        C: ?Sized + Send + Sync + 'static,
    {
        let caster: ViewCaster = Arc::new(move |instance: Instance| {
            instance
                .downcast::<S>()
                .ok()
                .map(|source| Box::new(cast(source)) as Box<dyn Any + Send + Sync>)
        });
        self.views.retain(|view| {
            !(view.contract.id == TypeId::of::<C>() && view.source == TypeId::of::<S>())
        });
        self.views.push(ContractView {
            contract: ContractInfo::of::<C>(contract),
            source: TypeId::of::<S>(),
            cast: caster,
        });
        self
    }

    /// 注册命名生命周期方法
    #[must_use]
    pub fn with_lifecycle_method<T>(
        mut self,
        name: impl Into<String>,
        method: fn(&T) -> Result<(), BoxError>,
    ) -> Self
    where
        T: Any + Send + Sync,
    {
        let name = name.into();
        let method_name = name.clone();
        let callback: LifecycleMethod = Arc::new(move |instance: &Instance| {
            let target = instance.downcast_ref::<T>().ok_or_else(|| -> BoxError {
                format!(
                    "生命周期方法 {method_name} 需要 {} 类型的实例",
                    std::any::type_name::<T>()
                )
                .into()
            })?;
            method(target)
        });
        self.lifecycle_methods.insert(name, callback);
        self
    }

    /// 附加扩展数据（例如代理构造器）
    #[must_use]
    pub fn with_extension<E: Any + Send + Sync>(mut self, extension: E) -> Self {
        self.extensions.insert(TypeId::of::<E>(), Arc::new(extension));
        self
    }

    /// 类型信息
    pub fn info(&self) -> &TypeInfo {
        &self.info
    }

    /// 简短类型名称
    pub fn name(&self) -> &str {
        self.info.short_name()
    }

    /// 组件角色
    pub fn role(&self) -> ComponentRole {
        self.role
    }

    /// 是否带有指定类型注解
    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.contains(annotation)
    }

    /// 类型注解
    pub fn annotations(&self) -> &BTreeSet<String> {
        &self.annotations
    }

    /// 已声明的方法
    pub fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    /// 按名称查找方法
    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// 对外暴露的契约
    pub fn contracts(&self) -> &[ContractInfo] {
        &self.contracts
    }

    /// 是否存在从指定来源类型到契约的视图
    pub fn has_view(&self, contract: TypeId, source: TypeId) -> bool {
        self.views
            .iter()
            .any(|view| view.contract.id == contract && view.source == source)
    }

    /// 把实例转换为契约引用
    pub fn view<C>(&self, instance: &Instance) -> Option<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let source = Any::type_id(&**instance);
        self.views
            .iter()
            .filter(|view| view.contract.id == TypeId::of::<C>() && view.source == source)
            .find_map(|view| (view.cast)(instance.clone()))
            .and_then(|boxed| boxed.downcast::<Arc<C>>().ok())
            .map(|contract| *contract)
    }

    /// 按名称查找生命周期方法
    pub fn lifecycle_method(&self, name: &str) -> Option<&LifecycleMethod> {
        self.lifecycle_methods.get(name)
    }

    /// 获取扩展数据
    pub fn extension<E: Any + Send + Sync>(&self) -> Option<Arc<E>> {
        self.extensions
            .get(&TypeId::of::<E>())
            .cloned()
            .and_then(|extension| extension.downcast::<E>().ok())
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.info.name)
            .field("role", &self.role)
            .field("annotations", &self.annotations)
            .field("methods", &self.methods.len())
            .field(
                "contracts",
                &self.contracts.iter().map(|c| &c.name).collect::<Vec<_>>(),
            )
            .field(
                "lifecycle_methods",
                &self.lifecycle_methods.keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
