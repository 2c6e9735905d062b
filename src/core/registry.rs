//! Purpose: Memoize compiled method descriptors per service and method.
//! Exports: `DescriptorRegistry`.
//! Role: Owned by a `ServiceClient`; shared by every clone of that client.
//! Invariants: Concurrent first access may compile twice; the first inserted entry wins.
//! Invariants: Compile failures are returned to the caller and never stored.
//! Invariants: Entries are never evicted; size tracks the distinct methods actually called.
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::core::descriptor::{ServiceMethodDescriptor, compile_method};
use crate::core::error::Error;
use crate::core::manifest::ServiceManifest;

type MethodTable = DashMap<String, Arc<ServiceMethodDescriptor>>;

#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    services: DashMap<String, Arc<MethodTable>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        service: &ServiceManifest,
        method: &str,
    ) -> Result<Arc<ServiceMethodDescriptor>, Error> {
        let table = self.method_table(&service.name);
        if let Some(found) = table.get(method) {
            return Ok(Arc::clone(found.value()));
        }

        let manifest = service.method(method).ok_or_else(|| {
            Error::configuration(format!("unknown method `{method}`"))
                .with_service(service.name.clone())
                .with_hint("Run `wirecall describe <manifest>` to list declared methods.")
        })?;
        let compiled = Arc::new(compile_method(service, manifest)?);
        debug!(
            service = %service.name,
            method = %method,
            http_method = compiled.http_method().as_str(),
            "compiled method descriptor"
        );
        let entry = table.entry(method.to_string()).or_insert(compiled);
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.services.iter().map(|table| table.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn method_table(&self, service: &str) -> Arc<MethodTable> {
        if let Some(table) = self.services.get(service) {
            return Arc::clone(table.value());
        }
        let entry = self.services.entry(service.to_string()).or_default();
        Arc::clone(entry.value())
    }
}
