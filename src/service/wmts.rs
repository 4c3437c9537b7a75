use crate::schema::catalog::layer::{FeatureInfoSource, Layer, TileMatrixLimits};
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


const FAMILY: ServiceFamily = ServiceFamily::Wmts;

pub struct WmtsService;

impl Service for WmtsService {
    fn family(&self) -> ServiceFamily {
        FAMILY
    }

    fn process_request(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let service = require_parameter(request, FAMILY, "service")?;
        if !service.eq_ignore_ascii_case("wmts") {
            return Err(invalid_parameter(FAMILY, "service", "have to be WMTS"));
        }
        if let Some(version) = request.get_query_param("version") {
            if !version.is_empty() && version != "1.0.0" {
                return Err(invalid_parameter(
                    FAMILY,
                    "version",
                    "have to be 1.0.0 or empty",
                ));
            }
        }
        match request.request_type {
            RequestType::GetCapabilities => self.get_capabilities(context),
            RequestType::GetTile => self.get_tile(request, context),
            RequestType::GetFeatureInfo => self.get_feature_info(request, context),
            RequestType::Missing => Err(missing_parameter(FAMILY, "request")),
            _ => Err(operation_not_supported(FAMILY)),
        }
    }
}

/// The addressing part shared by GetTile and GetFeatureInfo once the layer
/// is resolved.
struct TileAddress {
    level: String,
    column: u32,
    row: u32,
}

impl WmtsService {
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

    fn get_tile(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let layer = resolve_layer(request, context)?;
        let address = resolve_tile_address(request, &layer)?;

        let format = require_parameter(request, FAMILY, "format")?;
        reject_markup(FAMILY, "format", format)?;
        if format != layer.pyramid.format {
            return Err(ServiceException::new(
                FAMILY,
                ExceptionCode::WmsInvalidFormat,
                format!("Format {} unknown", format),
            ));
        }
        let style = require_parameter(request, FAMILY, "style")?;
        reject_markup(FAMILY, "style", style)?;
        if layer.get_style(style).is_none() {
            return Err(ServiceException::new(
                FAMILY,
                ExceptionCode::WmsStyleNotDefined,
                format!("Style {} unknown", style),
            ));
        }

        let payload = context
            .storage
            .read_tile(&layer, &address.level, address.column, address.row)
            .map_err(|error| {
                ServiceException::new(
                    FAMILY,
                    ExceptionCode::InternalServerError,
                    format!("Pyramid read failed: {}", error),
                )
            })?;
        match payload {
            Some(source) => Ok(Box::new(SourceDataStream::new(source))),
            None => Err(ServiceException::new(
                FAMILY,
                ExceptionCode::HttpNotFound,
                String::from("No data found"),
            )),
        }
    }

    fn get_feature_info(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let layer = resolve_layer(request, context)?;
        resolve_tile_address(request, &layer)?;
        let info_format = require_parameter(request, FAMILY, "infoformat")?;
        if !context.services.wmts.info_formats.iter().any(|f| f == info_format) {
            return Err(invalid_parameter(FAMILY, "infoformat", "unsupported format"));
        }
        require_parameter(request, FAMILY, "i")?;
        require_parameter(request, FAMILY, "j")?;

        if !layer.gfi_enabled {
            return Err(not_queryable(&layer.id));
        }
        match &layer.feature_info {
            None => Err(not_queryable(&layer.id)),
            Some(FeatureInfoSource::Pyramid) => Ok(Box::new(MessageDataStream::ok_json(
                String::from("{\"type\": \"FeatureCollection\", \"features\": []}"),
            ))),
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

fn resolve_layer(
    request: &Request,
    context: &ServiceContext,
) -> Result<Arc<Layer>, ServiceException> {
    let id = require_parameter(request, FAMILY, "layer")?;
    reject_markup(FAMILY, "layer", id)?;
    match context.catalog.get_layer(id) {
        Some(layer) if layer.wmts_enabled => Ok(Arc::clone(layer)),
        _ => Err(ServiceException::new(
            FAMILY,
            ExceptionCode::WmsLayerNotDefined,
            format!("Layer {} unknown", id),
        )),
    }
}

/// Validates TILEMATRIXSET/TILEMATRIX/TILEROW/TILECOL against the layer's
/// authorizations and pyramid limits.
fn resolve_tile_address(
    request: &Request,
    layer: &Layer,
) -> Result<TileAddress, ServiceException> {
    let tms = require_parameter(request, FAMILY, "tilematrixset")?;
    reject_markup(FAMILY, "tilematrixset", tms)?;
    if !layer.is_tile_matrix_set_authorized(tms) {
        return Err(invalid_parameter(FAMILY, "tilematrixset", "unknown tile matrix set"));
    }

    let level = require_parameter(request, FAMILY, "tilematrix")?;
    reject_markup(FAMILY, "tilematrix", level)?;
    let limits = match layer.pyramid.get_level(level) {
        Some(limits) => limits,
        None => {
            return Err(ServiceException::new(
                FAMILY,
                ExceptionCode::WmtsInvalidTileMatrix,
                format!("Tile matrix {} unknown", level),
            ));
        },
    };

    let column = parse_index(request, "tilecol")?;
    let row = parse_index(request, "tilerow")?;
    check_limits(limits, column, row)?;

    return Ok(TileAddress {
        level: level.to_string(),
        column,
        row,
    });
}

fn parse_index(request: &Request, name: &str) -> Result<u32, ServiceException> {
    let raw = require_parameter(request, FAMILY, name)?;
    raw.parse::<u32>()
        .map_err(|_| invalid_parameter(FAMILY, name, "have to be a positive integer"))
}

fn check_limits(
    limits: &TileMatrixLimits,
    column: u32,
    row: u32,
) -> Result<(), ServiceException> {
    if !limits.contain_tile(column, row) {
        return Err(ServiceException::new(
            FAMILY,
            ExceptionCode::WmtsTileOutOfRange,
            format!("Tile indices ({}, {}) out of range", column, row),
        ));
    }
    return Ok(());
}

fn build_capabilities(context: &ServiceContext) -> String {
    let section = &context.services.wmts;
    let mut document = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    document.push_str(
        "<Capabilities xmlns=\"http://www.opengis.net/wmts/1.0\" version=\"1.0.0\">\n",
    );
    document.push_str("  <ows:ServiceIdentification>\n");
    document.push_str(&format!("    <ows:Title>{}</ows:Title>\n", section.common.title));
    document.push_str(&format!(
        "    <ows:Abstract>{}</ows:Abstract>\n",
        section.common.abstract_
    ));
    document.push_str("  </ows:ServiceIdentification>\n  <Contents>\n");
    for id in context.catalog.layer_ids() {
        let layer = match context.catalog.get_layer(id) {
            Some(layer) if layer.wmts_enabled => layer,
            _ => continue,
        };
        document.push_str("    <Layer>\n");
        document.push_str(&format!("      <ows:Title>{}</ows:Title>\n", layer.title));
        document.push_str(&format!("      <ows:Identifier>{}</ows:Identifier>\n", layer.id));
        document.push_str(&format!("      <Format>{}</Format>\n", layer.pyramid.format));
        for style in &layer.styles {
            let is_default = style.id == layer.default_style;
            document.push_str(&format!(
                "      <Style isDefault=\"{}\"><ows:Identifier>{}</ows:Identifier></Style>\n",
                is_default, style.id
            ));
        }
        for tms in &layer.authorized_tile_matrix_sets {
            document.push_str(&format!(
                "      <TileMatrixSetLink><TileMatrixSet>{}</TileMatrixSet></TileMatrixSetLink>\n",
                tms
            ));
        }
        document.push_str("    </Layer>\n");
    }
    document.push_str("  </Contents>\n</Capabilities>\n");
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

    fn process(
        harness: &TestHarness,
        target: &str,
        request_type: RequestType,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let fetcher = MockHttpFetch::new();
        let mut request = Request::new(Method::GET, target, None);
        request.request_type = request_type;
        WmtsService.process_request(&request, &harness.context(&fetcher))
    }

    #[test]
    fn test_unknown_tile_matrix_answers_invalid_tile_matrix() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        let error = process(
            &harness,
            "/wmts?SERVICE=WMTS&REQUEST=GetTile&LAYER=roads&TILEMATRIXSET=PM&TILEMATRIX=99\
             &TILEROW=0&TILECOL=0&FORMAT=image/png&STYLE=normal",
            RequestType::GetTile,
        )
        .unwrap_err();
        assert_eq!(ExceptionCode::WmtsInvalidTileMatrix, error.code, "Wrong exception code");
        Ok(())
    }

    #[test]
    fn test_format_mismatch_answers_invalid_format() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        let error = process(
            &harness,
            "/wmts?SERVICE=WMTS&REQUEST=GetTile&LAYER=roads&TILEMATRIXSET=PM&TILEMATRIX=10\
             &TILEROW=0&TILECOL=0&FORMAT=image/jpeg&STYLE=normal",
            RequestType::GetTile,
        )
        .unwrap_err();
        assert_eq!(ExceptionCode::WmsInvalidFormat, error.code, "Wrong exception code");
        Ok(())
    }

    #[test]
    fn test_unauthorized_tile_matrix_set_is_rejected() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        let error = process(
            &harness,
            "/wmts?SERVICE=WMTS&REQUEST=GetTile&LAYER=roads&TILEMATRIXSET=UTM31\
             &TILEMATRIX=10&TILEROW=0&TILECOL=0&FORMAT=image/png&STYLE=normal",
            RequestType::GetTile,
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
    fn test_feature_info_on_non_queryable_layer() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        let error = process(
            &harness,
            "/wmts?SERVICE=WMTS&REQUEST=GetFeatureInfo&LAYER=roads&TILEMATRIXSET=PM\
             &TILEMATRIX=10&TILEROW=0&TILECOL=0&INFOFORMAT=application/json&I=1&J=1",
            RequestType::GetFeatureInfo,
        )
        .unwrap_err();
        assert_eq!(ExceptionCode::WmsLayerNotQueryable, error.code, "Wrong exception code");
        Ok(())
    }

    #[test]
    fn test_capabilities_carry_wmts_layers_and_links() -> Result<(), Box<dyn Error>> {
        let harness = TestHarness::new(Catalog::from_layers(vec![basic_layer("roads")]));
        let mut stream = process(
            &harness,
            "/wmts?SERVICE=WMTS&REQUEST=GetCapabilities",
            RequestType::GetCapabilities,
        )?;
        let body = String::from_utf8(crate::schema::response::drain(stream.as_mut()))?;
        assert!(body.contains("<ows:Identifier>roads</ows:Identifier>"), "Layer missing");
        assert!(body.contains("<TileMatrixSet>PM</TileMatrixSet>"), "TMS link missing");
        Ok(())
    }
}
