use crate::interface::fetch::HttpFetch;
use crate::schema::catalog::layer::ExternalWmsSource;
use crate::schema::exception::{ExceptionCode, ServiceException, ServiceFamily};
use crate::schema::request::Request;
use crate::schema::response::{DataSource, SourceDataStream};

use std::result::Result;
use std::string::String;
use std::vec::Vec;


/// Addressing parameters forwarded verbatim to the remote source when they
/// are present on the inbound request.
const FORWARDED_PARAMS: [&str; 11] = [
    "bbox",
    "width",
    "height",
    "i",
    "j",
    "info_format",
    "feature_count",
    "tilematrixset",
    "tilematrix",
    "tilerow",
    "tilecol",
];

/// Performs a cascaded GetFeatureInfo against the layer's remote WMS. The
/// calling worker blocks for the duration of every attempt; the attempt
/// count and per-attempt timeout are bounded by the source configuration.
pub fn feature_info(
    family: ServiceFamily,
    source: &ExternalWmsSource,
    request: &Request,
    fetcher: &dyn HttpFetch,
) -> Result<SourceDataStream, ServiceException> {
    let query = build_query(source, request);
    match source.web_service.perform_request(fetcher, &query) {
        Ok(payload) => {
            let content_type = payload
                .content_type
                .parse::<mime::Mime>()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM);
            Ok(SourceDataStream::new(DataSource::new(
                content_type,
                payload.body,
            )))
        },
        Err(error) => {
            error!("Cascaded feature info failed: {}", error);
            Err(ServiceException::new(
                family,
                ExceptionCode::RemoteSourceUnavailable,
                format!("Remote source {} is unreachable", source.web_service.url),
            ))
        },
    }
}

fn build_query(source: &ExternalWmsSource, request: &Request) -> String {
    let mut pairs: Vec<(String, String)> = vec![
        (String::from("service"), String::from("WMS")),
        (String::from("version"), String::from("1.3.0")),
        (String::from("request"), String::from("GetFeatureInfo")),
        (String::from("layers"), source.layers.clone()),
        (String::from("query_layers"), source.layers.clone()),
    ];
    let crs = match &source.forced_crs {
        Some(forced) => Some(forced.clone()),
        None => request.get_query_param("crs").map(String::from),
    };
    if let Some(crs) = crs {
        pairs.push((String::from("crs"), crs));
    }
    for name in &FORWARDED_PARAMS {
        if let Some(value) = request.get_query_param(name) {
            pairs.push((name.to_string(), value.to_string()));
        }
    }
    for (name, value) in &source.extra_params {
        pairs.push((name.clone(), value.clone()));
    }
    let encoded: Vec<String> = pairs
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                name,
                urlencoding::encode(value).into_owned(),
            )
        })
        .collect();
    return encoded.join("&");
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::fetch::{FetchError, FetchRequest, FetchedPayload, MockHttpFetch};
    use crate::schema::catalog::layer::{FeatureInfoSource, test_utils};
    use crate::schema::response::DataStream;

    use http::method::Method;

    use std::error::Error;

    fn external_source(url: &str, retries: u32) -> ExternalWmsSource {
        let layer = test_utils::cascading_layer("cascaded", url, 1, retries);
        match layer.feature_info {
            Some(FeatureInfoSource::ExternalWms(mut source)) => {
                source.web_service.interval = std::time::Duration::from_secs(0);
                source
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_successful_cascade_returns_remote_payload() -> Result<(), Box<dyn Error>> {
        let mut fetcher = MockHttpFetch::new();
        fetcher
            .expect_fetch()
            .times(1)
            .withf(|request: &FetchRequest| {
                request.url.contains("request=GetFeatureInfo")
                    && request.url.contains("query_layers=remote")
                    && request.url.contains("i=10")
            })
            .returning(|_| {
                Ok(FetchedPayload {
                    content_type: String::from("application/json"),
                    body: b"{\"features\": []}".to_vec(),
                })
            });
        let source = external_source("http://upstream/wms", 1);
        let request = Request::new(
            Method::GET,
            "/wms?REQUEST=GetFeatureInfo&I=10&J=20&BBOX=0,0,1,1",
            None,
        );
        let mut stream = feature_info(ServiceFamily::Wms, &source, &request, &fetcher)?;
        assert_eq!(
            Some(mime::APPLICATION_JSON),
            stream.content_type(),
            "Remote content type lost"
        );
        assert!(!stream.eof(), "Payload is empty");
        Ok(())
    }

    #[test]
    fn test_exhausted_cascade_raises_remote_source_exception() -> Result<(), Box<dyn Error>> {
        let mut fetcher = MockHttpFetch::new();
        fetcher
            .expect_fetch()
            .times(3)
            .returning(|_| Err(FetchError::Timeout));
        let source = external_source("http://upstream/wms", 3);
        let request = Request::new(Method::GET, "/wms?REQUEST=GetFeatureInfo", None);
        let error = feature_info(ServiceFamily::Wms, &source, &request, &fetcher).unwrap_err();
        assert_eq!(
            ExceptionCode::RemoteSourceUnavailable,
            error.code,
            "Wrong exception code"
        );
        assert_eq!(ServiceFamily::Wms, error.family, "Wrong family");
        Ok(())
    }

    #[test]
    fn test_forced_crs_overrides_the_inbound_one() -> Result<(), Box<dyn Error>> {
        let mut source = external_source("http://upstream/wms", 1);
        source.forced_crs = Some(String::from("EPSG:4326"));
        let mut fetcher = MockHttpFetch::new();
        fetcher
            .expect_fetch()
            .times(1)
            .withf(|request: &FetchRequest| {
                request.url.contains("crs=EPSG%3A4326") && !request.url.contains("EPSG%3A3857")
            })
            .returning(|_| {
                Ok(FetchedPayload {
                    content_type: String::from("text/xml"),
                    body: Vec::new(),
                })
            });
        let request = Request::new(Method::GET, "/wms?CRS=EPSG:3857", None);
        feature_info(ServiceFamily::Wms, &source, &request, &fetcher)?;
        Ok(())
    }
}
