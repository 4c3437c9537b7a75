use crate::router::TMS_VERSION;
use crate::schema::catalog::layer::Layer;
use crate::schema::exception::{ExceptionCode, ServiceException, ServiceFamily};
use crate::schema::request::{Request, RequestType};
use crate::schema::response::{DataStream, MessageDataStream, SourceDataStream};
use crate::service::interface::{invalid_parameter, Service, ServiceContext};

use scan_fmt::scan_fmt;

use std::boxed::Box;
use std::result::Result;
use std::string::String;
use std::sync::Arc;


const FAMILY: ServiceFamily = ServiceFamily::Tms;

pub struct TmsService;

impl Service for TmsService {
    fn family(&self) -> ServiceFamily {
        FAMILY
    }

    fn process_request(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        match request.request_type {
            RequestType::GetCapabilities => self.get_capabilities(context),
            RequestType::GetLayer => self.get_layer(request, context),
            RequestType::GetLayerMetadata => self.get_layer_metadata(request, context),
            RequestType::GetLayerGdal => self.get_layer_gdal(request, context),
            RequestType::GetTile => self.get_tile(request, context),
            _ => Err(ServiceException::new(
                FAMILY,
                ExceptionCode::OwsOperationNotSupported,
                String::from("Unknown TMS request path"),
            )),
        }
    }
}

impl TmsService {
    fn get_capabilities(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        if let Some(document) = context.capabilities.read(FAMILY) {
            return Ok(Box::new(MessageDataStream::ok_xml(document)));
        }
        let section = &context.services.tms;
        let mut document = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        document.push_str(&format!(
            "<TileMapService version=\"{}\" services=\"{}\">\n",
            TMS_VERSION, section.endpoint_uri
        ));
        document.push_str(&format!("  <Title>{}</Title>\n", section.title));
        document.push_str(&format!("  <Abstract>{}</Abstract>\n", section.abstract_));
        document.push_str("  <TileMaps>\n");
        for id in context.catalog.layer_ids() {
            let layer = match context.catalog.get_layer(id) {
                Some(layer) if layer.tms_enabled => layer,
                _ => continue,
            };
            document.push_str(&format!(
                "    <TileMap title=\"{}\" srs=\"{}\" href=\"{}/{}/{}\"/>\n",
                layer.title,
                layer.native_bbox.crs.as_deref().unwrap_or(""),
                section.endpoint_uri,
                TMS_VERSION,
                layer.id,
            ));
        }
        document.push_str("  </TileMaps>\n</TileMapService>\n");
        context.capabilities.store(FAMILY, document.clone());
        return Ok(Box::new(MessageDataStream::ok_xml(document)));
    }

    fn get_layer(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let layer = resolve_layer(request, context)?;
        let section = &context.services.tms;
        let mut document = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        document.push_str(&format!(
            "<TileMap version=\"{}\" tilemapservice=\"{}/{}\">\n",
            TMS_VERSION, section.endpoint_uri, TMS_VERSION
        ));
        document.push_str(&format!("  <Title>{}</Title>\n", layer.title));
        document.push_str(&format!("  <Abstract>{}</Abstract>\n", layer.abstract_));
        document.push_str(&format!(
            "  <SRS>{}</SRS>\n",
            layer.native_bbox.crs.as_deref().unwrap_or("")
        ));
        document.push_str(&format!(
            "  <BoundingBox minx=\"{}\" miny=\"{}\" maxx=\"{}\" maxy=\"{}\"/>\n",
            layer.native_bbox.min_x,
            layer.native_bbox.min_y,
            layer.native_bbox.max_x,
            layer.native_bbox.max_y,
        ));
        document.push_str(&format!(
            "  <TileFormat mime-type=\"{}\" extension=\"{}\"/>\n",
            layer.pyramid.format,
            extension_for(&layer.pyramid.format),
        ));
        document.push_str("  <TileSets profile=\"local\">\n");
        for (level, _limits) in &layer.pyramid.levels {
            document.push_str(&format!(
                "    <TileSet href=\"{}/{}/{}/{}\" order=\"{}\"/>\n",
                section.endpoint_uri, TMS_VERSION, layer.id, level, level,
            ));
        }
        document.push_str("  </TileSets>\n</TileMap>\n");
        return Ok(Box::new(MessageDataStream::ok_xml(document)));
    }

    fn get_layer_metadata(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let layer = resolve_layer(request, context)?;
        let levels: Vec<&String> = layer.pyramid.levels.keys().collect();
        let document = serde_json::json!({
            "name": &layer.id,
            "title": &layer.title,
            "description": &layer.abstract_,
            "format": extension_for(&layer.pyramid.format),
            "minzoom": levels.first(),
            "maxzoom": levels.last(),
            "bounds": [
                layer.geographic_bbox.min_x,
                layer.geographic_bbox.min_y,
                layer.geographic_bbox.max_x,
                layer.geographic_bbox.max_y,
            ],
        });
        return Ok(Box::new(MessageDataStream::ok_json(document.to_string())));
    }

    fn get_layer_gdal(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let layer = resolve_layer(request, context)?;
        let section = &context.services.tms;
        let mut document = String::from("<GDAL_WMS>\n  <Service name=\"TMS\">\n");
        document.push_str(&format!(
            "    <ServerUrl>{}/{}/{}/${{z}}/${{x}}/${{y}}.{}</ServerUrl>\n",
            section.endpoint_uri,
            TMS_VERSION,
            layer.id,
            extension_for(&layer.pyramid.format),
        ));
        document.push_str("  </Service>\n  <DataWindow>\n");
        document.push_str(&format!("    <UpperLeftX>{}</UpperLeftX>\n", layer.native_bbox.min_x));
        document.push_str(&format!("    <UpperLeftY>{}</UpperLeftY>\n", layer.native_bbox.max_y));
        document.push_str(&format!("    <LowerRightX>{}</LowerRightX>\n", layer.native_bbox.max_x));
        document.push_str(&format!("    <LowerRightY>{}</LowerRightY>\n", layer.native_bbox.min_y));
        document.push_str("  </DataWindow>\n");
        document.push_str(&format!(
            "  <Projection>{}</Projection>\n",
            layer.native_bbox.crs.as_deref().unwrap_or("")
        ));
        document.push_str("</GDAL_WMS>\n");
        return Ok(Box::new(MessageDataStream::ok_xml(document)));
    }

    fn get_tile(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let layer = resolve_layer(request, context)?;
        let level = &request.path_params[1];
        let column = parse_index(&request.path_params[2], "x")?;
        let (row, extension) =
            scan_fmt!(&request.path_params[3], "{d}.{}", u32, String).map_err(|_| {
                invalid_parameter(FAMILY, "y", "have to be row.extension")
            })?;
        if extension != extension_for(&layer.pyramid.format) {
            return Err(invalid_parameter(FAMILY, "extension", "unsupported extension"));
        }
        let limits = match layer.pyramid.get_level(level) {
            Some(limits) => limits,
            None => {
                return Err(invalid_parameter(FAMILY, "z", "unknown level"));
            },
        };
        if !limits.contain_tile(column, row) {
            return Err(ServiceException::new(
                FAMILY,
                ExceptionCode::HttpNotFound,
                String::from("No data found"),
            ));
        }
        let payload = context
            .storage
            .read_tile(&layer, level, column, row)
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
}

/// TMS publishes no authorization-specific code: an unknown id and a layer
/// not published over TMS both answer not-found.
fn resolve_layer(
    request: &Request,
    context: &ServiceContext,
) -> Result<Arc<Layer>, ServiceException> {
    let id = &request.path_params[0];
    match context.catalog.get_layer(id) {
        Some(layer) if layer.tms_enabled => Ok(Arc::clone(layer)),
        _ => Err(ServiceException::new(
            FAMILY,
            ExceptionCode::HttpNotFound,
            format!("Layer {} unknown", id),
        )),
    }
}

fn parse_index(raw: &str, name: &str) -> Result<u32, ServiceException> {
    raw.parse::<u32>()
        .map_err(|_| invalid_parameter(FAMILY, name, "have to be a positive integer"))
}

pub fn extension_for(format: &str) -> &'static str {
    match format {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/tiff" | "image/geotiff" => "tif",
        "application/x-protobuf" => "pbf",
        _ => "bin",
    }
}
