use crate::healthcheck::threads::ThreadRegistry;
use crate::interface::fetch::HttpFetch;
use crate::interface::storage::TileStorage;
use crate::schema::catalog::inventory::Catalog;
use crate::schema::catalog::layer::Layer;
use crate::schema::catalog::services::ServicesConfiguration;
use crate::schema::exception::{ExceptionCode, ServiceException, ServiceFamily};
use crate::schema::request::Request;
use crate::schema::response::DataStream;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use std::boxed::Box;
use std::collections::hash_map::HashMap;
use std::option::Option;
use std::result::Result;
use std::string::String;


/// Process identity surfaced by the global and health services.
#[derive(Clone, Copy, Debug)]
pub struct ServerStatus {
    pub version: &'static str,
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub serving: bool,
    pub worker_count: usize,
}

/// Everything a service handler may touch while processing one request.
/// The catalog reference is one loaded snapshot, stable for the whole
/// request even if an administration operation publishes a newer one
/// concurrently.
pub struct ServiceContext<'c> {
    pub catalog: &'c Catalog,
    pub services: &'c ServicesConfiguration,
    pub threads: &'c ThreadRegistry,
    pub storage: &'c dyn TileStorage,
    pub fetcher: &'c dyn HttpFetch,
    pub admin: &'c dyn CatalogAdmin,
    pub capabilities: &'c CapabilitiesCache,
    pub status: ServerStatus,
}

#[derive(Debug, Error, PartialEq)]
pub enum MutationError {
    #[error("Layer {0} already exists")]
    Conflict(String),
    #[error("Layer {0} does not exist")]
    NotFound(String),
}

/// Mutation side of the catalog, implemented by the server. Mutations are
/// serialized against each other and publish whole snapshots, never
/// field-level edits.
pub trait CatalogAdmin: Send + Sync {
    fn add_layer(&self, layer: Layer) -> Result<(), MutationError>;

    fn update_layer(&self, layer: Layer) -> Result<(), MutationError>;

    fn delete_layer(&self, id: &str) -> Result<(), MutationError>;

    fn set_serving(&self, serving: bool);
}

/// Built capability documents, invalidated as a whole by administration
/// mutations and rebuilt lazily by the owning service.
#[derive(Default)]
pub struct CapabilitiesCache {
    entries: Mutex<HashMap<ServiceFamily, String>>,
}

impl CapabilitiesCache {
    pub fn new() -> CapabilitiesCache {
        CapabilitiesCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn read(&self, family: ServiceFamily) -> Option<String> {
        self.entries.lock().get(&family).cloned()
    }

    pub fn store(&self, family: ServiceFamily, document: String) {
        self.entries.lock().insert(family, document);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// The three-stage dispatch protocol every protocol handler implements:
/// validate the parameters, resolve and authorize against the catalog,
/// build the response stream. Failure at any stage is a single
/// `ServiceException` carrying the protocol's code.
pub trait Service: Send + Sync {
    fn family(&self) -> ServiceFamily;

    fn process_request(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException>;
}

pub fn missing_parameter(family: ServiceFamily, name: &str) -> ServiceException {
    ServiceException::new(
        family,
        ExceptionCode::OwsMissingParameterValue,
        format!("{} query parameter missing", name.to_uppercase()),
    )
}

pub fn invalid_parameter(family: ServiceFamily, name: &str, reason: &str) -> ServiceException {
    ServiceException::new(
        family,
        ExceptionCode::OwsInvalidParameterValue,
        format!("{} query parameter invalid: {}", name.to_uppercase(), reason),
    )
}

pub fn operation_not_supported(family: ServiceFamily) -> ServiceException {
    ServiceException::new(
        family,
        ExceptionCode::OwsOperationNotSupported,
        String::from("REQUEST query parameter unknown"),
    )
}

/// Fetches a mandatory query parameter, raising the family's
/// missing-parameter exception when absent or empty.
pub fn require_parameter<'r>(
    request: &'r Request,
    family: ServiceFamily,
    name: &str,
) -> Result<&'r str, ServiceException> {
    match request.get_query_param(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(missing_parameter(family, name)),
    }
}

/// Rejects parameter values carrying markup, which would otherwise be
/// reflected into XML reports.
pub fn reject_markup(
    family: ServiceFamily,
    name: &str,
    value: &str,
) -> Result<(), ServiceException> {
    if value.contains('<') || value.contains('>') {
        warn!("Forbidden char detected in {} parameter {}", name, value);
        return Err(invalid_parameter(family, name, "forbidden character"));
    }
    return Ok(());
}


#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::interface::fetch::HttpFetch;
    use crate::interface::storage::MemoryTileStorage;

    pub struct NoOpCatalogAdmin;

    impl CatalogAdmin for NoOpCatalogAdmin {
        fn add_layer(&self, _layer: Layer) -> Result<(), MutationError> {
            return Ok(());
        }

        fn update_layer(&self, _layer: Layer) -> Result<(), MutationError> {
            return Ok(());
        }

        fn delete_layer(&self, _id: &str) -> Result<(), MutationError> {
            return Ok(());
        }

        fn set_serving(&self, _serving: bool) {}
    }

    /// Owns everything a `ServiceContext` borrows, so service tests can
    /// build a context in one line.
    pub struct TestHarness {
        pub catalog: Catalog,
        pub services: ServicesConfiguration,
        pub threads: ThreadRegistry,
        pub storage: MemoryTileStorage,
        pub capabilities: CapabilitiesCache,
        pub admin: NoOpCatalogAdmin,
    }

    impl TestHarness {
        pub fn new(catalog: Catalog) -> TestHarness {
            TestHarness {
                catalog,
                services: ServicesConfiguration::from_json("{}").unwrap(),
                threads: ThreadRegistry::new(),
                storage: MemoryTileStorage::new(),
                capabilities: CapabilitiesCache::new(),
                admin: NoOpCatalogAdmin,
            }
        }

        pub fn context<'c>(&'c self, fetcher: &'c dyn HttpFetch) -> ServiceContext<'c> {
            ServiceContext {
                catalog: &self.catalog,
                services: &self.services,
                threads: &self.threads,
                storage: &self.storage,
                fetcher,
                admin: &self.admin,
                capabilities: &self.capabilities,
                status: ServerStatus {
                    version: env!("CARGO_PKG_VERSION"),
                    pid: std::process::id(),
                    start_time: Utc::now(),
                    serving: true,
                    worker_count: 4,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error;

    #[test]
    fn test_capabilities_cache_read_through() -> Result<(), Box<dyn Error>> {
        let cache = CapabilitiesCache::new();
        assert_eq!(None, cache.read(ServiceFamily::Wms), "Empty cache must miss");
        cache.store(ServiceFamily::Wms, String::from("<caps/>"));
        assert_eq!(
            Some(String::from("<caps/>")),
            cache.read(ServiceFamily::Wms),
            "Stored document lost"
        );
        assert_eq!(None, cache.read(ServiceFamily::Wmts), "Families must not share entries");
        cache.clear();
        assert_eq!(None, cache.read(ServiceFamily::Wms), "Clear must drop every entry");
        Ok(())
    }

    #[test]
    fn test_require_parameter() -> Result<(), Box<dyn Error>> {
        let request = Request::new(http::Method::GET, "/wms?LAYERS=roads&EMPTY=", None);
        assert_eq!(
            "roads",
            require_parameter(&request, ServiceFamily::Wms, "layers")?,
            "Present parameter rejected"
        );
        assert!(
            require_parameter(&request, ServiceFamily::Wms, "styles").is_err(),
            "Absent parameter accepted"
        );
        assert!(
            require_parameter(&request, ServiceFamily::Wms, "empty").is_err(),
            "Empty parameter accepted"
        );
        Ok(())
    }

    #[test]
    fn test_reject_markup() -> Result<(), Box<dyn Error>> {
        assert!(reject_markup(ServiceFamily::Wms, "layer", "roads").is_ok(), "Plain value rejected");
        assert!(
            reject_markup(ServiceFamily::Wms, "layer", "<script>").is_err(),
            "Markup accepted"
        );
        Ok(())
    }
}
