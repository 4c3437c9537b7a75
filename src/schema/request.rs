use http::method::Method;

use std::collections::hash_map::HashMap;
use std::option::Option;
use std::string::String;
use std::vec::Vec;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceType {
    Unknown,
    Missing,
    Wmts,
    Wms,
    Tms,
    Tiles,
    Global,
    Admin,
    HealthCheck,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestType {
    Unknown,
    Missing,
    GetCapabilities,
    GetVersion,
    GetServices,
    GetLayer,
    GetLayerMetadata,
    GetLayerGdal,
    GetMap,
    GetTile,
    GetMapTile,
    GetFeatureInfo,
    AddLayer,
    UpdateLayer,
    DeleteLayer,
    BuildCapabilities,
    TurnOn,
    TurnOff,
    GetHealthStatus,
    GetInfoStatus,
    GetThreadStatus,
    GetDependStatus,
}

/// Marks requests routed through the OGC API "by collection" templates, which
/// take precedence over the generic tile routes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OgcTemplate {
    None,
    CollectionList,
    CollectionTile,
    CollectionTileInfo,
}

/// One decoded inbound request. Created per connection, never shared between
/// requests. Routing identity (service and request type) starts out as
/// `Missing` and is established by the `Router`; resolution failure is data,
/// not an error.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub path_params: Vec<String>,
    pub body: Option<String>,
    pub service_type: ServiceType,
    pub request_type: RequestType,
    pub template: OgcTemplate,
    query_params: HashMap<String, String>,
}

impl Request {
    /// Decodes a raw request target of the form `/path?K=V&K2=V2`. Parameter
    /// names are matched case-insensitively and duplicate names resolve to
    /// the last-seen value. Unknown parameters are kept, not rejected.
    pub fn new(method: Method, target: &str, body: Option<String>) -> Request {
        let (raw_path, raw_query) = match target.find('?') {
            Some(index) => (&target[..index], &target[index + 1..]),
            None => (target, ""),
        };
        let mut query_params = HashMap::new();
        for pair in raw_query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (name, value) = match pair.find('=') {
                Some(index) => (&pair[..index], &pair[index + 1..]),
                None => (pair, ""),
            };
            let name = urlencoding::decode(name)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| name.to_string());
            let value = urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string());
            query_params.insert(name.to_lowercase(), value);
        }
        let path = urlencoding::decode(raw_path)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw_path.to_string());
        let path = if path.len() > 1 {
            path.trim_end_matches('/').to_string()
        } else {
            path
        };
        Request {
            method,
            path,
            path_params: Vec::new(),
            body,
            service_type: ServiceType::Missing,
            request_type: RequestType::Missing,
            template: OgcTemplate::None,
            query_params,
        }
    }

    pub fn has_query_param(&self, name: &str) -> bool {
        self.query_params.contains_key(&name.to_lowercase())
    }

    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .get(&name.to_lowercase())
            .map(|value| value.as_str())
    }

    /// Multi-value parameters (e.g. WMS LAYERS) split on the fixed `,`
    /// delimiter.
    pub fn get_query_param_list(&self, name: &str) -> Vec<&str> {
        match self.get_query_param(name) {
            Some(value) if !value.is_empty() => value.split(',').collect(),
            _ => Vec::new(),
        }
    }
}
