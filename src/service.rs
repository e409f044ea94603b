//! Service registration. A registered method is reduced to a trampoline: a
//! boxed closure that takes raw argument bytes and returns raw reply bytes,
//! so the dispatcher never needs to know the concrete request/response
//! types a method was built with.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use quick_error::quick_error;
quick_error! {
    #[derive(Debug)]
    pub enum Error {
        DuplicateService(name: String) {
            display("service {:?} is already registered", name)
        }
        NotFound(service_method: String) {
            display("can't find service/method {:?}", service_method)
        }
        MalformedServiceMethod(service_method: String) {
            display("service/method {:?} is not of the form Service.Method", service_method)
        }
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type Trampoline = Arc<dyn Fn(Vec<u8>) -> BoxFuture<Result<Vec<u8>, String>> + Send + Sync>;

/// One registered method. Tracks how many times it has been invoked, which
/// a caller can read back through [`ServiceBinding::method`].
pub struct MethodBinding {
    trampoline: Trampoline,
    num_calls: AtomicU64,
}

impl MethodBinding {
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    pub(crate) async fn invoke(&self, args: Vec<u8>) -> Result<Vec<u8>, String> {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        (self.trampoline)(args).await
    }
}

/// A named group of methods, as produced by [`ServiceBuilder::build`] and
/// held by a [`ServiceRegistry`].
pub struct ServiceBinding {
    name: String,
    methods: HashMap<String, MethodBinding>,
}

impl ServiceBinding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<&MethodBinding> {
        self.methods.get(name)
    }
}

/// Builds a [`ServiceBinding`] one method at a time. Each method is given
/// as an async closure from a deserializable request type to a
/// `Result<Reply, String>`; the builder wraps it in the type-erased
/// trampoline the dispatcher actually calls.
pub struct ServiceBuilder {
    name: String,
    methods: HashMap<String, MethodBinding>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ServiceBuilder {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    pub fn method<Req, Res, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let trampoline: Trampoline = Arc::new(move |raw: Vec<u8>| {
            let handler = handler.clone();
            Box::pin(async move {
                let req: Req = bincode::deserialize(&raw)
                    .map_err(|err| format!("argument decode error: {}", err))?;
                let res = handler(req).await?;
                bincode::serialize(&res).map_err(|err| format!("reply encode error: {}", err))
            })
        });
        self.methods.insert(
            name.into(),
            MethodBinding {
                trampoline,
                num_calls: AtomicU64::new(0),
            },
        );
        self
    }

    pub fn build(self) -> ServiceBinding {
        ServiceBinding {
            name: self.name,
            methods: self.methods,
        }
    }
}

/// Holds every service a [`crate::server::Server`] knows how to dispatch
/// to. Lookups split `"Service.Method"` on the first `.`.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<ServiceBinding>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        ServiceRegistry::default()
    }

    pub fn register(&self, binding: ServiceBinding) -> Result<(), Error> {
        let mut services = self.services.write().unwrap();
        if services.contains_key(binding.name()) {
            return Err(Error::DuplicateService(binding.name().to_string()));
        }
        services.insert(binding.name().to_string(), Arc::new(binding));
        Ok(())
    }

    pub fn lookup(&self, service_method: &str) -> Result<(Arc<ServiceBinding>, String), Error> {
        let (service_name, method_name) = service_method
            .split_once('.')
            .ok_or_else(|| Error::MalformedServiceMethod(service_method.to_string()))?;
        let services = self.services.read().unwrap();
        let binding = services
            .get(service_name)
            .cloned()
            .ok_or_else(|| Error::NotFound(service_method.to_string()))?;
        if binding.method(method_name).is_none() {
            return Err(Error::NotFound(service_method.to_string()));
        }
        Ok((binding, method_name.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn registers_and_dispatches() {
        let registry = ServiceRegistry::new();
        let binding = ServiceBuilder::new("Arith")
            .method("Sum", |(a, b): (i64, i64)| async move { Ok::<i64, String>(a + b) })
            .build();
        registry.register(binding).unwrap();

        let (binding, method_name) = registry.lookup("Arith.Sum").unwrap();
        let method = binding.method(&method_name).unwrap();
        let args = bincode::serialize(&(2i64, 3i64)).unwrap();
        let reply = method.invoke(args).await.unwrap();
        let sum: i64 = bincode::deserialize(&reply).unwrap();
        assert_eq!(sum, 5);
        assert_eq!(method.num_calls(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ServiceRegistry::new();
        registry.register(ServiceBuilder::new("Arith").build()).unwrap();
        match registry.register(ServiceBuilder::new("Arith").build()) {
            Err(Error::DuplicateService(name)) => assert_eq!(name, "Arith"),
            other => panic!("expected DuplicateService, got {:?}", other),
        }
    }

    #[test]
    fn lookup_of_unknown_method_fails() {
        let registry = ServiceRegistry::new();
        registry
            .register(ServiceBuilder::new("Arith").method("Sum", |(): ()| async { Ok::<(), String>(()) }).build())
            .unwrap();
        assert!(matches!(registry.lookup("Arith.Missing"), Err(Error::NotFound(_))));
        assert!(matches!(registry.lookup("Missing.Sum"), Err(Error::NotFound(_))));
        assert!(matches!(registry.lookup("NoDot"), Err(Error::MalformedServiceMethod(_))));
    }
}
