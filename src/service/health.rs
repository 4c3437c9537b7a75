use crate::healthcheck::info_thread::ThreadStatus;
use crate::schema::catalog::layer::FeatureInfoSource;
use crate::schema::exception::{ExceptionCode, ServiceException, ServiceFamily};
use crate::schema::request::{Request, RequestType};
use crate::schema::response::{DataStream, MessageDataStream};
use crate::service::interface::{Service, ServiceContext};

use std::boxed::Box;
use std::result::Result;
use std::string::String;
use std::time::Duration;
use std::vec::Vec;


const FAMILY: ServiceFamily = ServiceFamily::Health;

/// Bound for the single reachability probe per dependency; depend-status
/// must never hold a worker for a full cascade timeout ladder.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HealthService;

impl Service for HealthService {
    fn family(&self) -> ServiceFamily {
        FAMILY
    }

    fn process_request(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        match request.request_type {
            RequestType::GetHealthStatus => self.get_health(context),
            RequestType::GetInfoStatus => self.get_infos(context),
            RequestType::GetThreadStatus => self.get_threads(context),
            RequestType::GetDependStatus => self.get_dependencies(context),
            _ => Err(ServiceException::new(
                FAMILY,
                ExceptionCode::OwsOperationNotSupported,
                String::from("Unknown health request path"),
            )),
        }
    }
}

impl HealthService {
    fn get_health(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let status = if context.status.serving { "OK" } else { "DISABLED" };
        let document = serde_json::json!({
            "status": status,
            "version": context.status.version,
            "pid": context.status.pid,
            "time": context.status.start_time.timestamp(),
        });
        return Ok(Box::new(MessageDataStream::ok_json(document.to_string())));
    }

    fn get_infos(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let layers = context.catalog.layer_ids();
        let mut tile_matrix_sets: Vec<&str> = Vec::new();
        let mut styles: Vec<&str> = Vec::new();
        for layer in context.catalog.iter_layers() {
            for tms in &layer.authorized_tile_matrix_sets {
                if !tile_matrix_sets.contains(&tms.as_str()) {
                    tile_matrix_sets.push(tms.as_str());
                }
            }
            for style in &layer.styles {
                if !styles.contains(&style.id.as_str()) {
                    styles.push(style.id.as_str());
                }
            }
        }
        tile_matrix_sets.sort_unstable();
        styles.sort_unstable();
        let document = serde_json::json!({
            "layers": layers,
            "tms": tile_matrix_sets,
            "styles": styles,
        });
        return Ok(Box::new(MessageDataStream::ok_json(document.to_string())));
    }

    fn get_threads(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let snapshot = context.threads.snapshot();
        let serving = snapshot
            .iter()
            .filter(|record| record.status == ThreadStatus::Serving)
            .count();
        let idle = snapshot
            .iter()
            .filter(|record| record.status == ThreadStatus::Idle)
            .count();
        let records: Vec<serde_json::Value> = snapshot
            .iter()
            .map(|record| {
                serde_json::json!({
                    "pid": record.pid,
                    "status": record.status.as_str(),
                    "count": record.served_count,
                    "time": record.job_start.timestamp(),
                    "duration_ms": record.last_duration_ms,
                })
            })
            .collect();
        let document = serde_json::json!({
            "number": snapshot.len(),
            "serving": serving,
            "idle": idle,
            "threads": records,
        });
        return Ok(Box::new(MessageDataStream::ok_json(document.to_string())));
    }

    /// Probes each distinct remote source once, with a short bound, so the
    /// answer reflects reachability without stalling the worker.
    fn get_dependencies(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let mut urls: Vec<&str> = Vec::new();
        for layer in context.catalog.iter_layers() {
            if let Some(FeatureInfoSource::ExternalWms(source)) = &layer.feature_info {
                if !urls.contains(&source.web_service.url.as_str()) {
                    urls.push(source.web_service.url.as_str());
                }
            }
        }
        urls.sort_unstable();
        let mut dependencies = Vec::new();
        for url in urls {
            let probe = crate::interface::fetch::FetchRequest {
                url: url.to_string(),
                timeout: PROBE_TIMEOUT,
                user_agent: String::from(crate::webservice::DEFAULT_USER_AGENT),
                referer: None,
                credentials: None,
            };
            let reachable = context.fetcher.fetch(&probe).is_ok();
            dependencies.push(serde_json::json!({
                "url": url,
                "reachable": reachable,
            }));
        }
        let document = serde_json::json!({ "dependencies": dependencies });
        return Ok(Box::new(MessageDataStream::ok_json(document.to_string())));
    }
}
