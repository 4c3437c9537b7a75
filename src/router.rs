use crate::schema::catalog::services::ServicesConfiguration;
use crate::schema::request::{OgcTemplate, Request, RequestType, ServiceType};

use const_format::concatcp;
use http::method::Method;

use std::option::Option;
use std::string::String;
use std::vec::Vec;


pub const TMS_VERSION: &str = "1.0.0";

const TMS_ROOT_PATTERN: &str = concatcp!("/", TMS_VERSION);
const TMS_LAYER_PATTERN: &str = concatcp!(TMS_ROOT_PATTERN, "/{}");
const TMS_METADATA_PATTERN: &str = concatcp!(TMS_ROOT_PATTERN, "/{}/metadata.json");
const TMS_GDAL_PATTERN: &str = concatcp!(TMS_ROOT_PATTERN, "/{}/gdal.xml");
const TMS_TILE_PATTERN: &str = concatcp!(TMS_ROOT_PATTERN, "/{}/{}/{}/{}");

const COLLECTION_LIST_PATTERN: &str = "/collections";
const COLLECTION_TILE_PATTERN: &str = "/collections/{}/styles/{}/map/tiles/{}/{}/{}/{}";
const COLLECTION_TILE_INFO_PATTERN: &str = concatcp!(COLLECTION_TILE_PATTERN, "/info");

#[derive(Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    Matched,
    NotMatched,
}

/// Maps a request path onto exactly one (service type, request type) pair.
/// The router establishes routing identity only; it never validates
/// operation semantics, so a matched KVP route with an absent or unknown
/// REQUEST parameter yields a Missing/Unknown request type for the service
/// layer to convert into the protocol's exception.
pub struct Router {
    wms_root: String,
    wmts_root: String,
    tms_root: String,
    tiles_root: String,
    admin_root: String,
    health_root: String,
}

impl Router {
    pub fn new(services: &ServicesConfiguration) -> Router {
        Router {
            wms_root: services.wms.common.root_path.clone(),
            wmts_root: services.wmts.common.root_path.clone(),
            tms_root: services.tms.root_path.clone(),
            tiles_root: services.tiles.root_path.clone(),
            admin_root: services.admin.root_path.clone(),
            health_root: services.health.root_path.clone(),
        }
    }

    /// Resolves the request in route-table order, most specific pattern
    /// first. On a match the routing identity and path parameters are
    /// written into the request.
    pub fn resolve(&self, request: &mut Request) -> RouteOutcome {
        if self.resolve_health(request)
            || self.resolve_admin(request)
            || self.resolve_global(request)
            || self.resolve_tiles(request)
            || self.resolve_tms(request)
            || self.resolve_kvp(request)
        {
            return RouteOutcome::Matched;
        }
        debug!("Router::resolve - no route for {} {}", request.method, request.path);
        return RouteOutcome::NotMatched;
    }

    fn resolve_health(&self, request: &mut Request) -> bool {
        let rest = match strip_root(&self.health_root, &request.path) {
            Some(rest) => rest,
            None => return false,
        };
        if request.method != Method::GET {
            return false;
        }
        let request_type = match rest {
            "" => RequestType::GetHealthStatus,
            "/info" => RequestType::GetInfoStatus,
            "/threads" => RequestType::GetThreadStatus,
            "/depends" => RequestType::GetDependStatus,
            _ => return false,
        };
        request.service_type = ServiceType::HealthCheck;
        request.request_type = request_type;
        return true;
    }

    fn resolve_admin(&self, request: &mut Request) -> bool {
        let rest = match strip_root(&self.admin_root, &request.path) {
            Some(rest) => rest,
            None => return false,
        };
        if let Some(params) = match_segments("/layers/{}", rest) {
            let request_type = match request.method {
                Method::POST => RequestType::AddLayer,
                Method::PUT => RequestType::UpdateLayer,
                Method::DELETE => RequestType::DeleteLayer,
                _ => return false,
            };
            request.service_type = ServiceType::Admin;
            request.request_type = request_type;
            request.path_params = params;
            return true;
        }
        let request_type = match (rest, &request.method) {
            ("/capabilities", &Method::POST) => RequestType::BuildCapabilities,
            ("/on", &Method::PUT) => RequestType::TurnOn,
            ("/off", &Method::PUT) => RequestType::TurnOff,
            _ => return false,
        };
        request.service_type = ServiceType::Admin;
        request.request_type = request_type;
        return true;
    }

    fn resolve_global(&self, request: &mut Request) -> bool {
        if request.method != Method::GET {
            return false;
        }
        let request_type = match request.path.as_str() {
            "/" => RequestType::GetServices,
            "/version" => RequestType::GetVersion,
            _ => return false,
        };
        request.service_type = ServiceType::Global;
        request.request_type = request_type;
        return true;
    }

    fn resolve_tiles(&self, request: &mut Request) -> bool {
        let rest = match strip_root(&self.tiles_root, &request.path) {
            Some(rest) => rest,
            None => return false,
        };
        if request.method != Method::GET {
            return false;
        }
        // the "by collection" templates outrank the generic tile route
        if rest == COLLECTION_LIST_PATTERN {
            request.service_type = ServiceType::Tiles;
            request.request_type = RequestType::GetCapabilities;
            request.template = OgcTemplate::CollectionList;
            return true;
        }
        if let Some(params) = match_segments(COLLECTION_TILE_INFO_PATTERN, rest) {
            request.service_type = ServiceType::Tiles;
            request.request_type = RequestType::GetFeatureInfo;
            request.template = OgcTemplate::CollectionTileInfo;
            request.path_params = params;
            return true;
        }
        if let Some(params) = match_segments(COLLECTION_TILE_PATTERN, rest) {
            request.service_type = ServiceType::Tiles;
            request.request_type = RequestType::GetMapTile;
            request.template = OgcTemplate::CollectionTile;
            request.path_params = params;
            return true;
        }
        return false;
    }

    fn resolve_tms(&self, request: &mut Request) -> bool {
        let rest = match strip_root(&self.tms_root, &request.path) {
            Some(rest) => rest,
            None => return false,
        };
        if request.method != Method::GET {
            return false;
        }
        if rest == TMS_ROOT_PATTERN {
            request.service_type = ServiceType::Tms;
            request.request_type = RequestType::GetCapabilities;
            return true;
        }
        let table = [
            (TMS_METADATA_PATTERN, RequestType::GetLayerMetadata),
            (TMS_GDAL_PATTERN, RequestType::GetLayerGdal),
            (TMS_TILE_PATTERN, RequestType::GetTile),
            (TMS_LAYER_PATTERN, RequestType::GetLayer),
        ];
        for (pattern, request_type) in &table {
            if let Some(params) = match_segments(pattern, rest) {
                request.service_type = ServiceType::Tms;
                request.request_type = *request_type;
                request.path_params = params;
                return true;
            }
        }
        return false;
    }

    /// WMS and WMTS are query-routed: the path selects the service and the
    /// REQUEST parameter selects the operation.
    fn resolve_kvp(&self, request: &mut Request) -> bool {
        let service_type = if request.path == self.wms_root {
            ServiceType::Wms
        } else if request.path == self.wmts_root {
            ServiceType::Wmts
        } else {
            return false;
        };
        if request.method != Method::GET {
            return false;
        }
        request.service_type = service_type;
        request.request_type = match request.get_query_param("request") {
            None => RequestType::Missing,
            Some(operation) => match operation.to_lowercase().as_str() {
                "getcapabilities" => RequestType::GetCapabilities,
                "getmap" if service_type == ServiceType::Wms => RequestType::GetMap,
                "gettile" if service_type == ServiceType::Wmts => RequestType::GetTile,
                "getfeatureinfo" => RequestType::GetFeatureInfo,
                _ => RequestType::Unknown,
            },
        };
        return true;
    }
}

fn strip_root<'p>(root: &str, path: &'p str) -> Option<&'p str> {
    if root.is_empty() {
        return None;
    }
    match path.strip_prefix(root) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

/// Matches a `/`-separated pattern where `{}` captures one non-empty
/// segment. Returns the captured parameters in order.
fn match_segments(pattern: &str, path: &str) -> Option<Vec<String>> {
    let mut params = Vec::new();
    let mut pattern_segments = pattern.split('/');
    let mut path_segments = path.split('/');
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return Some(params),
            (Some("{}"), Some(value)) if !value.is_empty() => params.push(value.to_string()),
            (Some(expected), Some(value)) if expected == value => {},
            _ => return None,
        }
    }
}
