use crate::schema::catalog::layer::{FeatureInfoSource, Layer};
use crate::schema::exception::{ExceptionCode, ServiceException, ServiceFamily};
use crate::schema::request::{OgcTemplate, Request, RequestType};
use crate::schema::response::{DataStream, MessageDataStream, SourceDataStream};
use crate::service::cascade;
use crate::service::interface::{invalid_parameter, Service, ServiceContext};

use std::boxed::Box;
use std::result::Result;
use std::string::String;
use std::sync::Arc;


const FAMILY: ServiceFamily = ServiceFamily::Tiles;

/// The OGC API Tiles front: collection-based routing over the same catalog
/// the WMTS service publishes.
pub struct TilesService;

impl Service for TilesService {
    fn family(&self) -> ServiceFamily {
        FAMILY
    }

    fn process_request(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        match (request.request_type, request.template) {
            (RequestType::GetCapabilities, OgcTemplate::CollectionList) => {
                self.get_collections(context)
            },
            (RequestType::GetMapTile, OgcTemplate::CollectionTile) => {
                self.get_map_tile(request, context)
            },
            (RequestType::GetFeatureInfo, OgcTemplate::CollectionTileInfo) => {
                self.get_tile_info(request, context)
            },
            _ => Err(ServiceException::new(
                FAMILY,
                ExceptionCode::OwsOperationNotSupported,
                String::from("Unknown tiles request path"),
            )),
        }
    }
}

impl TilesService {
    fn get_collections(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        if let Some(document) = context.capabilities.read(FAMILY) {
            return Ok(Box::new(MessageDataStream::ok_json(document)));
        }
        let mut collections = Vec::new();
        for id in context.catalog.layer_ids() {
            let layer = match context.catalog.get_layer(id) {
                Some(layer) if layer.wmts_enabled => layer,
                _ => continue,
            };
            collections.push(serde_json::json!({
                "id": &layer.id,
                "title": &layer.title,
                "description": &layer.abstract_,
                "extent": {
                    "spatial": {
                        "bbox": [[
                            layer.geographic_bbox.min_x,
                            layer.geographic_bbox.min_y,
                            layer.geographic_bbox.max_x,
                            layer.geographic_bbox.max_y,
                        ]],
                    },
                },
                "styles": layer.styles.iter().map(|style| style.id.clone()).collect::<Vec<String>>(),
                "tileMatrixSets": &layer.authorized_tile_matrix_sets,
            }));
        }
        let document = serde_json::json!({ "collections": collections }).to_string();
        context.capabilities.store(FAMILY, document.clone());
        return Ok(Box::new(MessageDataStream::ok_json(document)));
    }

    fn get_map_tile(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let (layer, level, column, row) = resolve_collection_tile(request, context)?;
        let payload = context
            .storage
            .read_tile(&layer, &level, column, row)
            .map_err(|error| {
                ServiceException::new(
                    FAMILY,
                    ExceptionCode::InternalServerError,
                    format!("Pyramid read failed: {}", error),
                )
            })?;
        match payload {
            Some(source) => Ok(Box::new(SourceDataStream::new(source))),
            None => Err(not_found("No data found")),
        }
    }

    fn get_tile_info(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let (layer, _level, _column, _row) = resolve_collection_tile(request, context)?;
        if !layer.gfi_enabled {
            return Err(invalid_parameter(
                FAMILY,
                "collection",
                "collection is not queryable",
            ));
        }
        match &layer.feature_info {
            None => Err(invalid_parameter(
                FAMILY,
                "collection",
                "collection is not queryable",
            )),
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

fn not_found(message: &str) -> ServiceException {
    ServiceException::new(FAMILY, ExceptionCode::HttpNotFound, message.to_string())
}

/// Resolves `{collection}/{style}/.../{tms}/{z}/{row}/{col}` path parameters
/// against the catalog.
fn resolve_collection_tile(
    request: &Request,
    context: &ServiceContext,
) -> Result<(Arc<Layer>, String, u32, u32), ServiceException> {
    let collection = &request.path_params[0];
    let style = &request.path_params[1];
    let tms = &request.path_params[2];
    let level = &request.path_params[3];

    let layer = match context.catalog.get_layer(collection) {
        Some(layer) if layer.wmts_enabled => Arc::clone(layer),
        _ => return Err(not_found(&format!("Collection {} unknown", collection))),
    };
    if layer.get_style(style).is_none() {
        return Err(invalid_parameter(FAMILY, "style", "unknown style"));
    }
    if !layer.is_tile_matrix_set_authorized(tms) {
        return Err(invalid_parameter(FAMILY, "tilematrixset", "unknown tile matrix set"));
    }
    let limits = match layer.pyramid.get_level(level) {
        Some(limits) => *limits,
        None => return Err(invalid_parameter(FAMILY, "tilematrix", "unknown level")),
    };
    let row = parse_index(&request.path_params[4], "tilerow")?;
    let column = parse_index(&request.path_params[5], "tilecol")?;
    if !limits.contain_tile(column, row) {
        return Err(not_found("Tile indices outside the collection extent"));
    }
    return Ok((layer, level.to_string(), column, row));
}

fn parse_index(raw: &str, name: &str) -> Result<u32, ServiceException> {
    raw.parse::<u32>()
        .map_err(|_| invalid_parameter(FAMILY, name, "have to be a positive integer"))
}
