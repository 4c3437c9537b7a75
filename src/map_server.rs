use crate::core::identifier::generate_request_id;
use crate::framework::http::{read_request, write_response};
use crate::healthcheck::threads::ThreadRegistry;
use crate::interface::fetch::HttpFetch;
use crate::interface::storage::TileStorage;
use crate::router::{RouteOutcome, Router};
use crate::schema::catalog::inventory::Catalog;
use crate::schema::catalog::layer::Layer;
use crate::schema::catalog::server::ServerConfiguration;
use crate::schema::catalog::services::ServicesConfiguration;
use crate::schema::exception::{ExceptionCode, ServiceException};
use crate::schema::request::{Request, ServiceType};
use crate::schema::response::{DataStream, MessageDataStream};
use crate::service::admin::AdminService;
use crate::service::common::CommonService;
use crate::service::health::HealthService;
use crate::service::interface::{
    CapabilitiesCache, CatalogAdmin, MutationError, Service, ServiceContext, ServerStatus,
};
use crate::service::tiles::TilesService;
use crate::service::tms::TmsService;
use crate::service::wms::WmsService;
use crate::service::wmts::WmtsService;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver};
use http::status::StatusCode;
use parking_lot::Mutex;

use std::boxed::Box;
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::result::Result;
use std::string::String;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;


pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The server: owns the socket, the configuration, the worker pool and the
/// published catalog snapshot, and wires Router -> Service -> response for
/// every accepted connection.
pub struct MapServer {
    server_config: ServerConfiguration,
    services_config: ServicesConfiguration,
    router: Router,
    catalog: ArcSwap<Catalog>,
    admin_lock: Mutex<()>,
    serving: AtomicBool,
    pub threads: ThreadRegistry,
    storage: Box<dyn TileStorage>,
    fetcher: Box<dyn HttpFetch>,
    capabilities: CapabilitiesCache,
    common_service: CommonService,
    admin_service: AdminService,
    health_service: HealthService,
    tiles_service: TilesService,
    tms_service: TmsService,
    wms_service: WmsService,
    wmts_service: WmtsService,
    pid: u32,
    start_time: DateTime<Utc>,
}

impl MapServer {
    pub fn new(
        server_config: ServerConfiguration,
        services_config: ServicesConfiguration,
        catalog: Catalog,
        storage: Box<dyn TileStorage>,
        fetcher: Box<dyn HttpFetch>,
    ) -> MapServer {
        let router = Router::new(&services_config);
        let serving = AtomicBool::new(server_config.enabled);
        MapServer {
            server_config,
            services_config,
            router,
            catalog: ArcSwap::from_pointee(catalog),
            admin_lock: Mutex::new(()),
            serving,
            threads: ThreadRegistry::new(),
            storage,
            fetcher,
            capabilities: CapabilitiesCache::new(),
            common_service: CommonService,
            admin_service: AdminService,
            health_service: HealthService,
            tiles_service: TilesService,
            tms_service: TmsService,
            wms_service: WmsService,
            wmts_service: WmtsService,
            pid: std::process::id(),
            start_time: Utc::now(),
        }
    }

    /// Routes and dispatches one request. Never fails: every outcome,
    /// including handler panics, is rendered into a response stream.
    pub fn handle_request(&self, request: &mut Request) -> Box<dyn DataStream> {
        if self.router.resolve(request) == RouteOutcome::NotMatched {
            return not_found_stream();
        }
        let service: &dyn Service = match self.select_service(request.service_type) {
            Some(service) => service,
            None => return not_found_stream(),
        };
        if is_protocol_service(request.service_type) && !self.serving.load(Ordering::SeqCst) {
            let exception = ServiceException::new(
                service.family(),
                ExceptionCode::ServiceUnavailable,
                String::from("Server is disabled"),
            );
            return Box::new(exception.into_data_stream());
        }

        let catalog = self.catalog.load_full();
        let context = ServiceContext {
            catalog: catalog.as_ref(),
            services: &self.services_config,
            threads: &self.threads,
            storage: self.storage.as_ref(),
            fetcher: self.fetcher.as_ref(),
            admin: self,
            capabilities: &self.capabilities,
            status: ServerStatus {
                version: VERSION,
                pid: self.pid,
                start_time: self.start_time,
                serving: self.serving.load(Ordering::SeqCst),
                worker_count: self.server_config.worker_count,
            },
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            service.process_request(request, &context)
        }));
        match outcome {
            Ok(Ok(stream)) => stream,
            Ok(Err(exception)) => {
                debug!(
                    "MapServer::handle_request - {} {} failed: {}",
                    request.method, request.path, exception
                );
                Box::new(exception.into_data_stream())
            },
            Err(_) => {
                error!(
                    "MapServer::handle_request - handler panicked on {} {}",
                    request.method, request.path
                );
                let exception = ServiceException::new(
                    service.family(),
                    ExceptionCode::InternalServerError,
                    String::from("Unexpected failure while processing the request"),
                );
                Box::new(exception.into_data_stream())
            },
        }
    }

    fn select_service(&self, service_type: ServiceType) -> Option<&dyn Service> {
        match service_type {
            ServiceType::Global if self.services_config.common.enabled => {
                Some(&self.common_service)
            },
            ServiceType::Admin if self.services_config.admin.enabled => Some(&self.admin_service),
            ServiceType::HealthCheck if self.services_config.health.enabled => {
                Some(&self.health_service)
            },
            ServiceType::Tiles if self.services_config.tiles.enabled => Some(&self.tiles_service),
            ServiceType::Tms if self.services_config.tms.enabled => Some(&self.tms_service),
            ServiceType::Wms if self.services_config.wms.common.enabled => {
                Some(&self.wms_service)
            },
            ServiceType::Wmts if self.services_config.wmts.common.enabled => {
                Some(&self.wmts_service)
            },
            _ => None,
        }
    }

    /// Binds the configured socket and serves until the listener fails.
    pub fn run(server: Arc<MapServer>) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(&server.server_config.bind_address)?;
        return Self::run_with_listener(server, listener);
    }

    /// One acceptor feeding a fixed pool of workers over a shared, bounded
    /// channel. Each worker serves one request end to end, blocking I/O
    /// throughout.
    pub fn run_with_listener(
        server: Arc<MapServer>,
        listener: TcpListener,
    ) -> Result<(), std::io::Error> {
        let (sender, receiver) = bounded::<TcpStream>(server.server_config.backlog);
        for _ in 0..server.server_config.worker_count {
            let worker_server = Arc::clone(&server);
            let worker_receiver = receiver.clone();
            thread::spawn(move || {
                worker_server.worker_loop(worker_receiver);
            });
        }
        info!(
            "MapServer::run - listening on {} with {} workers",
            listener.local_addr()?,
            server.server_config.worker_count,
        );
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if sender.send(stream).is_err() {
                        break;
                    }
                },
                Err(why) => {
                    warn!("MapServer::run - failed to accept a connection: {}", why);
                },
            }
        }
        return Ok(());
    }

    fn worker_loop(&self, receiver: Receiver<TcpStream>) {
        let pid = thread_id::get();
        self.threads.register(pid);
        debug!("MapServer::worker_loop - worker {} ready", pid);
        loop {
            let stream = match receiver.recv() {
                Ok(stream) => stream,
                Err(_) => break,
            };
            self.threads.mark_serving(pid);
            match self.serve_connection(stream) {
                Ok(()) => self.threads.mark_idle(pid),
                Err(why) => {
                    warn!("MapServer::worker_loop - worker {} connection failed: {}", pid, why);
                    self.threads.mark_error(pid);
                },
            }
        }
        debug!("MapServer::worker_loop - worker {} stopping", pid);
    }

    fn serve_connection(&self, stream: TcpStream) -> Result<(), std::io::Error> {
        let request_id = generate_request_id();
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;
        match read_request(&mut reader) {
            Ok(mut request) => {
                info!("[{}] {} {}", request_id, request.method, request.path);
                let mut response = self.handle_request(&mut request);
                let written = write_response(&mut writer, response.as_mut())?;
                debug!(
                    "[{}] {} - {} bytes written",
                    request_id,
                    response.http_status(),
                    written,
                );
            },
            Err(why) => {
                warn!("[{}] unreadable request: {}", request_id, why);
                let mut response = MessageDataStream::new(
                    serde_json::json!({
                        "error": "BadRequest",
                        "error_description": why.to_string(),
                    })
                    .to_string(),
                    mime::APPLICATION_JSON,
                    StatusCode::BAD_REQUEST,
                );
                write_response(&mut writer, &mut response)?;
            },
        }
        return Ok(());
    }
}

/// Administration mutations: strictly serialized against each other, each
/// publishing a whole new catalog snapshot. In-flight readers keep the
/// snapshot they loaded.
impl CatalogAdmin for MapServer {
    fn add_layer(&self, layer: Layer) -> Result<(), MutationError> {
        let _guard = self.admin_lock.lock();
        let current = self.catalog.load_full();
        if current.contains(&layer.id) {
            return Err(MutationError::Conflict(layer.id));
        }
        self.catalog.store(Arc::new(current.with_layer(layer)));
        return Ok(());
    }

    fn update_layer(&self, layer: Layer) -> Result<(), MutationError> {
        let _guard = self.admin_lock.lock();
        let current = self.catalog.load_full();
        if !current.contains(&layer.id) {
            return Err(MutationError::NotFound(layer.id));
        }
        self.catalog.store(Arc::new(current.with_layer(layer)));
        return Ok(());
    }

    fn delete_layer(&self, id: &str) -> Result<(), MutationError> {
        let _guard = self.admin_lock.lock();
        let current = self.catalog.load_full();
        if !current.contains(id) {
            return Err(MutationError::NotFound(id.to_string()));
        }
        self.catalog.store(Arc::new(current.without_layer(id)));
        return Ok(());
    }

    fn set_serving(&self, serving: bool) {
        self.serving.store(serving, Ordering::SeqCst);
    }
}

fn is_protocol_service(service_type: ServiceType) -> bool {
    matches!(
        service_type,
        ServiceType::Wms
            | ServiceType::Wmts
            | ServiceType::Tms
            | ServiceType::Tiles
            | ServiceType::Global
    )
}

/// Router misses carry no protocol context, so the body is the plain JSON
/// not-found report rather than a protocol exception.
fn not_found_stream() -> Box<dyn DataStream> {
    Box::new(MessageDataStream::new(
        serde_json::json!({
            "error": "NotFound",
            "error_description": "Unknown request path",
        })
        .to_string(),
        mime::APPLICATION_JSON,
        StatusCode::NOT_FOUND,
    ))
}
