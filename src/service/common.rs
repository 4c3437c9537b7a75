use crate::router::TMS_VERSION;
use crate::schema::exception::{ExceptionCode, ServiceException, ServiceFamily};
use crate::schema::request::{Request, RequestType};
use crate::schema::response::{DataStream, MessageDataStream};
use crate::service::interface::{Service, ServiceContext};

use std::boxed::Box;
use std::result::Result;
use std::string::String;


const FAMILY: ServiceFamily = ServiceFamily::Common;

/// The landing endpoints shared by every deployment: which services this
/// process publishes, and which build is answering.
pub struct CommonService;

impl Service for CommonService {
    fn family(&self) -> ServiceFamily {
        FAMILY
    }

    fn process_request(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        match request.request_type {
            RequestType::GetServices => self.get_services(context),
            RequestType::GetVersion => self.get_version(context),
            _ => Err(ServiceException::new(
                FAMILY,
                ExceptionCode::OwsOperationNotSupported,
                String::from("Unknown common request path"),
            )),
        }
    }
}

impl CommonService {
    fn get_services(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let services = context.services;
        let mut entries = Vec::new();
        if services.wms.common.enabled {
            entries.push(serde_json::json!({
                "title": &services.wms.common.title,
                "type": "WMS",
                "versions": &services.wms.versions,
                "href": format!(
                    "{}?SERVICE=WMS&REQUEST=GetCapabilities",
                    services.wms.common.endpoint_uri
                ),
            }));
        }
        if services.wmts.common.enabled {
            entries.push(serde_json::json!({
                "title": &services.wmts.common.title,
                "type": "WMTS",
                "versions": ["1.0.0"],
                "href": format!(
                    "{}?SERVICE=WMTS&REQUEST=GetCapabilities",
                    services.wmts.common.endpoint_uri
                ),
            }));
        }
        if services.tms.enabled {
            entries.push(serde_json::json!({
                "title": &services.tms.title,
                "type": "TMS",
                "versions": [TMS_VERSION],
                "href": format!("{}/{}", services.tms.endpoint_uri, TMS_VERSION),
            }));
        }
        if services.tiles.enabled {
            entries.push(serde_json::json!({
                "title": &services.tiles.title,
                "type": "Tiles",
                "href": format!("{}/collections", services.tiles.endpoint_uri),
            }));
        }
        let document = serde_json::json!({ "services": entries });
        return Ok(Box::new(MessageDataStream::ok_json(document.to_string())));
    }

    fn get_version(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let document = serde_json::json!({
            "version": context.status.version,
            "pid": context.status.pid,
            "start_time": context.status.start_time.to_rfc3339(),
        });
        return Ok(Box::new(MessageDataStream::ok_json(document.to_string())));
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::fetch::MockHttpFetch;
    use crate::schema::catalog::inventory::Catalog;
    use crate::schema::response::drain;
    use crate::service::interface::test_utils::TestHarness;

    use http::method::Method;

    use std::error::Error;

    #[test]
    fn test_services_document_lists_enabled_protocols() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::new());
        let fetcher = MockHttpFetch::new();
        let mut request = Request::new(Method::GET, "/", None);
        request.request_type = RequestType::GetServices;
        let mut stream = CommonService.process_request(&request, &harness.context(&fetcher))?;
        let body: serde_json::Value = serde_json::from_slice(&drain(stream.as_mut()))?;
        let services = body["services"].as_array().unwrap();
        assert_eq!(4, services.len(), "All four protocol endpoints must be listed");
        Ok(())
    }

    #[test]
    fn test_version_document_carries_build_identity() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::new());
        let fetcher = MockHttpFetch::new();
        let mut request = Request::new(Method::GET, "/version", None);
        request.request_type = RequestType::GetVersion;
        let mut stream = CommonService.process_request(&request, &harness.context(&fetcher))?;
        let body: serde_json::Value = serde_json::from_slice(&drain(stream.as_mut()))?;
        assert_eq!(env!("CARGO_PKG_VERSION"), body["version"], "Wrong version");
        assert!(body["pid"].as_u64().unwrap() > 0, "Missing pid");
        Ok(())
    }
}
