use crate::schema::catalog::layer::{BoundingBox, FeatureInfoSource, Layer};
use crate::schema::exception::{ExceptionCode, ServiceException, ServiceFamily};
use crate::schema::request::{Request, RequestType};
use crate::schema::response::{DataStream, MessageDataStream, SourceDataStream};
use crate::service::cascade;
use crate::service::interface::{
    invalid_parameter, missing_parameter, operation_not_supported, reject_markup,
    require_parameter, Service, ServiceContext,
};

use std::boxed::Box;
use std::result::Result;
use std::string::String;
use std::sync::Arc;
use std::vec::Vec;


const FAMILY: ServiceFamily = ServiceFamily::Wms;
const DEFAULT_MAX_SIZE: u32 = 5000;

pub struct WmsService;

impl Service for WmsService {
    fn family(&self) -> ServiceFamily {
        FAMILY
    }

    fn process_request(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let service = require_parameter(request, FAMILY, "service")?;
        if !service.eq_ignore_ascii_case("wms") {
            return Err(invalid_parameter(FAMILY, "service", "have to be WMS"));
        }
        if let Some(version) = request.get_query_param("version") {
            if !version.is_empty() && !context.services.wms.versions.iter().any(|v| v == version) {
                return Err(invalid_parameter(
                    FAMILY,
                    "version",
                    "have to be 1.3.0 or empty",
                ));
            }
        }
        match request.request_type {
            RequestType::GetCapabilities => self.get_capabilities(context),
            RequestType::GetMap => self.get_map(request, context),
            RequestType::GetFeatureInfo => self.get_feature_info(request, context),
            RequestType::Missing => Err(missing_parameter(FAMILY, "request")),
            _ => Err(operation_not_supported(FAMILY)),
        }
    }
}

impl WmsService {
    fn get_capabilities(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        if let Some(document) = context.capabilities.read(FAMILY) {
            return Ok(Box::new(MessageDataStream::ok_xml(document)));
        }
        let document = build_capabilities(context);
        context.capabilities.store(FAMILY, document.clone());
        return Ok(Box::new(MessageDataStream::ok_xml(document)));
    }

    fn get_map(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let layers = resolve_layers(request, context)?;
        validate_styles(request, &layers)?;
        validate_crs(request, context, &layers)?;
        let bbox = parse_bbox(request)?;
        let (width, height) = parse_dimensions(request, context)?;
        let format = require_parameter(request, FAMILY, "format")?;
        reject_markup(FAMILY, "format", format)?;
        if !context.services.wms.formats.iter().any(|f| f == format) {
            return Err(ServiceException::new(
                FAMILY,
                ExceptionCode::WmsInvalidFormat,
                format!("Format {} unknown", format),
            ));
        }

        // painting order: the last layer of the list is on top
        for layer in layers.iter().rev() {
            let payload = context
                .storage
                .read_map(layer, &bbox, width, height, format)
                .map_err(|error| {
                    ServiceException::new(
                        FAMILY,
                        ExceptionCode::InternalServerError,
                        format!("Pyramid read failed: {}", error),
                    )
                })?;
            if let Some(source) = payload {
                return Ok(Box::new(SourceDataStream::new(source)));
            }
        }
        return Err(ServiceException::new(
            FAMILY,
            ExceptionCode::HttpNotFound,
            String::from("No data found"),
        ));
    }

    fn get_feature_info(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let layers = resolve_layers(request, context)?;
        let query_layer_ids = request.get_query_param_list("query_layers");
        if query_layer_ids.is_empty() {
            return Err(missing_parameter(FAMILY, "query_layers"));
        }
        for id in &query_layer_ids {
            if !layers.iter().any(|layer| layer.id == *id) {
                return Err(invalid_parameter(
                    FAMILY,
                    "query_layers",
                    "have to be a subset of LAYERS",
                ));
            }
        }
        validate_crs(request, context, &layers)?;
        parse_bbox(request)?;
        let (width, height) = parse_dimensions(request, context)?;
        let column = parse_pixel(request, "i", width)?;
        let _row = parse_pixel(request, "j", height)?;
        let info_format = require_parameter(request, FAMILY, "info_format")?;
        if !context.services.wms.info_formats.iter().any(|f| f == info_format) {
            return Err(invalid_parameter(FAMILY, "info_format", "unsupported format"));
        }
        debug!("WmsService::get_feature_info - query column {}", column);

        let queried = layers
            .iter()
            .find(|layer| layer.id == query_layer_ids[0])
            .ok_or_else(|| invalid_parameter(FAMILY, "query_layers", "unresolved layer"))?;
        if !queried.gfi_enabled {
            return Err(not_queryable(&queried.id));
        }
        match &queried.feature_info {
            None => Err(not_queryable(&queried.id)),
            Some(FeatureInfoSource::Pyramid) => {
                // raster layers have no attribute table: an empty collection
                Ok(Box::new(MessageDataStream::ok_json(String::from(
                    "{\"type\": \"FeatureCollection\", \"features\": []}",
                ))))
            },
            Some(FeatureInfoSource::ExternalWms(source)) => {
                let stream = cascade::feature_info(FAMILY, source, request, context.fetcher)?;
                Ok(Box::new(stream))
            },
        }
    }
}

fn not_queryable(layer_id: &str) -> ServiceException {
    ServiceException::new(
        FAMILY,
        ExceptionCode::WmsLayerNotQueryable,
        format!("Layer {} is not queryable", layer_id),
    )
}

fn layer_not_defined(layer_id: &str) -> ServiceException {
    ServiceException::new(
        FAMILY,
        ExceptionCode::WmsLayerNotDefined,
        format!("Layer {} unknown", layer_id),
    )
}

/// Stage two of the dispatch protocol: every requested layer must exist and
/// be published over WMS.
fn resolve_layers(
    request: &Request,
    context: &ServiceContext,
) -> Result<Vec<Arc<Layer>>, ServiceException> {
    let ids = request.get_query_param_list("layers");
    if ids.is_empty() {
        return Err(missing_parameter(FAMILY, "layers"));
    }
    let mut layers = Vec::with_capacity(ids.len());
    for id in ids {
        reject_markup(FAMILY, "layers", id)?;
        match context.catalog.get_layer(id) {
            Some(layer) if layer.wms_enabled => layers.push(Arc::clone(layer)),
            _ => return Err(layer_not_defined(id)),
        }
    }
    return Ok(layers);
}

fn validate_styles(request: &Request, layers: &[Arc<Layer>]) -> Result<(), ServiceException> {
    let styles = request.get_query_param_list("styles");
    if styles.is_empty() {
        return Ok(());
    }
    if styles.len() != layers.len() {
        return Err(invalid_parameter(
            FAMILY,
            "styles",
            "have to name one style per layer",
        ));
    }
    for (style, layer) in styles.iter().zip(layers.iter()) {
        if style.is_empty() {
            continue;
        }
        if layer.get_style(style).is_none() {
            return Err(ServiceException::new(
                FAMILY,
                ExceptionCode::WmsStyleNotDefined,
                format!("Style {} unknown for layer {}", style, layer.id),
            ));
        }
    }
    return Ok(());
}

fn validate_crs(
    request: &Request,
    context: &ServiceContext,
    layers: &[Arc<Layer>],
) -> Result<(), ServiceException> {
    let crs = require_parameter(request, FAMILY, "crs")?;
    reject_markup(FAMILY, "crs", crs)?;
    for layer in layers {
        let authorized = layer.is_crs_authorized(crs)
            || layer
                .authorized_crs
                .iter()
                .any(|candidate| context.services.are_crs_equal(candidate, crs));
        if !authorized {
            return Err(ServiceException::new(
                FAMILY,
                ExceptionCode::WmsInvalidCrs,
                format!("CRS {} unauthorized for layer {}", crs, layer.id),
            ));
        }
    }
    return Ok(());
}

fn parse_bbox(request: &Request) -> Result<BoundingBox, ServiceException> {
    let raw = require_parameter(request, FAMILY, "bbox")?;
    let coordinates: Vec<&str> = raw.split(',').collect();
    if coordinates.len() != 4 {
        return Err(invalid_parameter(FAMILY, "bbox", "have to hold 4 coordinates"));
    }
    let mut values = [0f64; 4];
    for (index, coordinate) in coordinates.iter().enumerate() {
        values[index] = coordinate
            .parse::<f64>()
            .map_err(|_| invalid_parameter(FAMILY, "bbox", "coordinates have to be numbers"))?;
    }
    if values[0] >= values[2] || values[1] >= values[3] {
        return Err(invalid_parameter(FAMILY, "bbox", "emptiness is not allowed"));
    }
    return Ok(BoundingBox {
        crs: request.get_query_param("crs").map(String::from),
        min_x: values[0],
        min_y: values[1],
        max_x: values[2],
        max_y: values[3],
    });
}

fn parse_dimensions(
    request: &Request,
    context: &ServiceContext,
) -> Result<(u32, u32), ServiceException> {
    let width = parse_size(request, "width", context.services.wms.max_width)?;
    let height = parse_size(request, "height", context.services.wms.max_height)?;
    return Ok((width, height));
}

fn parse_size(
    request: &Request,
    name: &str,
    limit: Option<u32>,
) -> Result<u32, ServiceException> {
    let raw = require_parameter(request, FAMILY, name)?;
    let value = raw
        .parse::<u32>()
        .map_err(|_| invalid_parameter(FAMILY, name, "have to be a positive integer"))?;
    let limit = limit.unwrap_or(DEFAULT_MAX_SIZE);
    if value == 0 || value > limit {
        return Err(invalid_parameter(FAMILY, name, "out of the allowed range"));
    }
    return Ok(value);
}

fn parse_pixel(request: &Request, name: &str, limit: u32) -> Result<u32, ServiceException> {
    let raw = require_parameter(request, FAMILY, name)?;
    let value = raw
        .parse::<u32>()
        .map_err(|_| invalid_parameter(FAMILY, name, "have to be a positive integer"))?;
    if value >= limit {
        return Err(invalid_parameter(FAMILY, name, "outside the requested image"));
    }
    return Ok(value);
}

fn build_capabilities(context: &ServiceContext) -> String {
    let section = &context.services.wms;
    let mut document = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    document.push_str(
        "<WMS_Capabilities xmlns=\"http://www.opengis.net/wms\" version=\"1.3.0\">\n",
    );
    document.push_str("  <Service>\n    <Name>WMS</Name>\n");
    document.push_str(&format!("    <Title>{}</Title>\n", section.common.title));
    document.push_str(&format!("    <Abstract>{}</Abstract>\n", section.common.abstract_));
    document.push_str(&format!(
        "    <OnlineResource xlink:href=\"{}\"/>\n",
        section.common.endpoint_uri
    ));
    document.push_str("  </Service>\n  <Capability>\n");
    for format in &section.formats {
        document.push_str(&format!("    <Format>{}</Format>\n", format));
    }
    document.push_str("    <Layer>\n");
    document.push_str(&format!("      <Title>{}</Title>\n", section.common.title));
    for id in context.catalog.layer_ids() {
        let layer = match context.catalog.get_layer(id) {
            Some(layer) if layer.wms_enabled => layer,
            _ => continue,
        };
        let queryable = if layer.gfi_enabled { "1" } else { "0" };
        document.push_str(&format!("      <Layer queryable=\"{}\">\n", queryable));
        document.push_str(&format!("        <Name>{}</Name>\n", layer.id));
        document.push_str(&format!("        <Title>{}</Title>\n", layer.title));
        document.push_str(&format!("        <Abstract>{}</Abstract>\n", layer.abstract_));
        for crs in &layer.authorized_crs {
            document.push_str(&format!("        <CRS>{}</CRS>\n", crs));
        }
        document.push_str(&format!(
            concat!(
                "        <EX_GeographicBoundingBox>",
                "<westBoundLongitude>{}</westBoundLongitude>",
                "<eastBoundLongitude>{}</eastBoundLongitude>",
                "<southBoundLatitude>{}</southBoundLatitude>",
                "<northBoundLatitude>{}</northBoundLatitude>",
                "</EX_GeographicBoundingBox>\n",
            ),
            layer.geographic_bbox.min_x,
            layer.geographic_bbox.max_x,
            layer.geographic_bbox.min_y,
            layer.geographic_bbox.max_y,
        ));
        for style in &layer.styles {
            document.push_str(&format!(
                "        <Style><Name>{}</Name><Title>{}</Title></Style>\n",
                style.id, style.title
            ));
        }
        document.push_str("      </Layer>\n");
    }
    document.push_str("    </Layer>\n  </Capability>\n</WMS_Capabilities>\n");
    return document;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::fetch::MockHttpFetch;
    use crate::schema::catalog::inventory::Catalog;
    use crate::schema::catalog::layer::test_utils::basic_layer;
    use crate::service::interface::test_utils::TestHarness;

    use http::method::Method;

    use std::error::Error;

    fn wms_request(target: &str, request_type: RequestType) -> Request {
        let mut request = Request::new(Method::GET, target, None);
        request.request_type = request_type;
        request
    }

    fn process(
        harness: &TestHarness,
        target: &str,
        request_type: RequestType,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let fetcher = MockHttpFetch::new();
        let request = wms_request(target, request_type);
        WmsService.process_request(&request, &harness.context(&fetcher))
    }

    #[test]
    fn test_undeclared_style_answers_style_not_defined() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        let error = process(
            &harness,
            "/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=roads&STYLES=sepia&CRS=EPSG:3857\
             &BBOX=0,0,10,10&WIDTH=256&HEIGHT=256&FORMAT=image/png",
            RequestType::GetMap,
        )
        .unwrap_err();
        assert_eq!(ExceptionCode::WmsStyleNotDefined, error.code, "Wrong exception code");
        Ok(())
    }

    #[test]
    fn test_unauthorized_crs_answers_invalid_crs() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        let error = process(
            &harness,
            "/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=roads&CRS=EPSG:2154\
             &BBOX=0,0,10,10&WIDTH=256&HEIGHT=256&FORMAT=image/png",
            RequestType::GetMap,
        )
        .unwrap_err();
        assert_eq!(ExceptionCode::WmsInvalidCrs, error.code, "Wrong exception code");
        Ok(())
    }

    #[test]
    fn test_equivalent_crs_is_accepted() -> Result<(), Box<dyn Error>> {
        let mut harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        harness.services.crs_equivalences =
            vec![vec![String::from("EPSG:3857"), String::from("EPSG:900913")]];
        harness
            .storage
            .insert_map("roads", mime::IMAGE_PNG, vec![1]);
        let mut stream = process(
            &harness,
            "/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=roads&CRS=EPSG:900913\
             &BBOX=0,0,10,10&WIDTH=256&HEIGHT=256&FORMAT=image/png",
            RequestType::GetMap,
        )?;
        assert_eq!(
            http::status::StatusCode::OK,
            stream.http_status(),
            "Equivalent CRS rejected"
        );
        Ok(())
    }

    #[test]
    fn test_malformed_bbox_answers_invalid_parameter() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        for bbox in &["0,0,10", "a,b,c,d", "10,0,0,10"] {
            let error = process(
                &harness,
                &format!(
                    "/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=roads&CRS=EPSG:3857\
                     &BBOX={}&WIDTH=256&HEIGHT=256&FORMAT=image/png",
                    bbox,
                ),
                RequestType::GetMap,
            )
            .unwrap_err();
            assert_eq!(
                ExceptionCode::OwsInvalidParameterValue,
                error.code,
                "Wrong exception code"
            );
        }
        Ok(())
    }

    #[test]
    fn test_wrong_service_parameter_is_rejected() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        let error = process(
            &harness,
            "/wms?SERVICE=WMTS&REQUEST=GetCapabilities",
            RequestType::GetCapabilities,
        )
        .unwrap_err();
        assert_eq!(
            ExceptionCode::OwsInvalidParameterValue,
            error.code,
            "Wrong exception code"
        );
        Ok(())
    }

    #[test]
    fn test_capabilities_are_cached_until_invalidated() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        process(
            &harness,
            "/wms?SERVICE=WMS&REQUEST=GetCapabilities",
            RequestType::GetCapabilities,
        )?;
        assert!(
            harness.capabilities.read(FAMILY).is_some(),
            "Capabilities not cached after the first build"
        );
        harness.capabilities.clear();
        assert!(
            harness.capabilities.read(FAMILY).is_none(),
            "Cache survived invalidation"
        );
        Ok(())
    }
}
