use crate::webservice::WebService;

use serde::Deserialize;
use thiserror::Error;

use std::collections::BTreeMap;
use std::collections::hash_map::HashMap;
use std::option::Option;
use std::string::String;
use std::time::Duration;
use std::vec::Vec;


#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoundingBox {
    #[serde(default)]
    pub crs: Option<String>,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Style {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TileMatrixLimits {
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
}

impl TileMatrixLimits {
    pub fn contain_tile(&self, column: u32, row: u32) -> bool {
        column >= self.min_col
            && column <= self.max_col
            && row >= self.min_row
            && row <= self.max_row
    }
}

/// The published multi-resolution dataset behind a layer. Decoding the
/// pyramid content is an external concern; the catalog only knows its
/// addressing scheme.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Pyramid {
    pub format: String,
    pub tile_matrix_set: String,
    pub levels: BTreeMap<String, TileMatrixLimits>,
}

impl Pyramid {
    pub fn get_level(&self, id: &str) -> Option<&TileMatrixLimits> {
        self.levels.get(id)
    }
}

/// Where GetFeatureInfo answers come from for a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureInfoSource {
    Pyramid,
    ExternalWms(ExternalWmsSource),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalWmsSource {
    pub web_service: WebService,
    pub layers: String,
    pub extra_params: Vec<(String, String)>,
    pub forced_crs: Option<String>,
}

#[derive(Debug, Error)]
pub enum LayerLoadError {
    #[error("Layer definition is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Layer definition is missing the mandatory field '{0}'")]
    MissingField(&'static str),
    #[error("Layer field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
struct LayerDef {
    title: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    attribution: Option<String>,
    #[serde(default)]
    metadata_urls: Vec<String>,
    bbox: Option<BoundingBox>,
    geographic_bbox: Option<BoundingBox>,
    pyramid: Option<Pyramid>,
    #[serde(default)]
    styles: Vec<Style>,
    #[serde(default)]
    default_style: Option<String>,
    #[serde(default)]
    wms: ProtocolDef,
    #[serde(default)]
    wmts: ProtocolDef,
    #[serde(default)]
    tms: ProtocolDef,
    #[serde(default)]
    feature_info: Option<FeatureInfoDef>,
}

#[derive(Debug, Default, Deserialize)]
struct ProtocolDef {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    crs: Vec<String>,
    #[serde(default)]
    tile_matrix_sets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FeatureInfoDef {
    #[serde(default)]
    enabled: bool,
    #[serde(rename = "type")]
    source_type: Option<String>,
    url: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    retries: Option<u32>,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    layers: Option<String>,
    #[serde(default)]
    extra_params: HashMap<String, String>,
    #[serde(default)]
    forced_crs: Option<String>,
}

/// One published layer of the catalog. Immutable once constructed; the
/// administration service replaces whole `Layer` values, never fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: String,
    pub title: String,
    pub abstract_: String,
    pub keywords: Vec<String>,
    pub attribution: Option<String>,
    pub metadata_urls: Vec<String>,
    pub native_bbox: BoundingBox,
    pub geographic_bbox: BoundingBox,
    pub pyramid: Pyramid,
    pub authorized_crs: Vec<String>,
    pub authorized_tile_matrix_sets: Vec<String>,
    pub styles: Vec<Style>,
    pub default_style: String,
    pub feature_info: Option<FeatureInfoSource>,
    pub wms_enabled: bool,
    pub wmts_enabled: bool,
    pub tms_enabled: bool,
    pub gfi_enabled: bool,
}

impl Layer {
    /// Builds a layer from its JSON definition. Validation is all-or-nothing:
    /// a failed parse never yields a partial layer.
    pub fn from_json(id: &str, document: &str) -> Result<Layer, LayerLoadError> {
        let def: LayerDef = serde_json::from_str(document)?;

        let title = def.title.ok_or(LayerLoadError::MissingField("title"))?;
        let native_bbox = def.bbox.ok_or(LayerLoadError::MissingField("bbox"))?;
        let geographic_bbox = def
            .geographic_bbox
            .ok_or(LayerLoadError::MissingField("geographic_bbox"))?;
        let pyramid = def.pyramid.ok_or(LayerLoadError::MissingField("pyramid"))?;
        if pyramid.levels.is_empty() {
            return Err(LayerLoadError::InvalidField {
                field: "pyramid",
                reason: String::from("a pyramid needs at least one level"),
            });
        }

        let styles = if def.styles.is_empty() {
            vec![Style {
                id: String::from("normal"),
                title: String::from("Normal"),
            }]
        } else {
            def.styles
        };
        let default_style = match def.default_style {
            Some(style) => style,
            None => styles[0].id.clone(),
        };
        if !styles.iter().any(|style| style.id == default_style) {
            return Err(LayerLoadError::InvalidField {
                field: "default_style",
                reason: format!("style {} is not declared by the layer", default_style),
            });
        }

        let authorized_tile_matrix_sets = if def.wmts.tile_matrix_sets.is_empty() {
            vec![pyramid.tile_matrix_set.clone()]
        } else {
            def.wmts.tile_matrix_sets
        };

        let mut gfi_enabled = false;
        let feature_info = match def.feature_info {
            None => None,
            Some(info) => {
                gfi_enabled = info.enabled;
                match info.source_type.as_deref() {
                    None | Some("PYRAMID") => Some(FeatureInfoSource::Pyramid),
                    Some("EXTERNALWMS") => {
                        let url = info.url.ok_or(LayerLoadError::MissingField("feature_info.url"))?;
                        let mut web_service = WebService::new(url);
                        web_service.user = info.user;
                        web_service.password = info.password;
                        if let Some(seconds) = info.timeout {
                            web_service.timeout = Duration::from_secs(seconds);
                        }
                        if let Some(retries) = info.retries {
                            web_service.retries = retries;
                        }
                        if let Some(seconds) = info.interval {
                            web_service.interval = Duration::from_secs(seconds);
                        }
                        let mut extra_params: Vec<(String, String)> =
                            info.extra_params.into_iter().collect();
                        extra_params.sort();
                        Some(FeatureInfoSource::ExternalWms(ExternalWmsSource {
                            web_service,
                            layers: info.layers.unwrap_or_default(),
                            extra_params,
                            forced_crs: info.forced_crs,
                        }))
                    },
                    Some(other) => {
                        return Err(LayerLoadError::InvalidField {
                            field: "feature_info.type",
                            reason: format!("unsupported source type {}", other),
                        });
                    },
                }
            },
        };

        return Ok(Layer {
            id: id.to_string(),
            title,
            abstract_: def.abstract_,
            keywords: def.keywords,
            attribution: def.attribution,
            metadata_urls: def.metadata_urls,
            native_bbox,
            geographic_bbox,
            pyramid,
            authorized_crs: def.wms.crs,
            authorized_tile_matrix_sets,
            styles,
            default_style,
            feature_info,
            wms_enabled: def.wms.enabled,
            wmts_enabled: def.wmts.enabled,
            tms_enabled: def.tms.enabled,
            gfi_enabled,
        });
    }

    pub fn get_style(&self, id: &str) -> Option<&Style> {
        self.styles.iter().find(|style| style.id == id)
    }

    pub fn is_crs_authorized(&self, crs: &str) -> bool {
        self.authorized_crs
            .iter()
            .any(|authorized| authorized.eq_ignore_ascii_case(crs))
    }

    pub fn is_tile_matrix_set_authorized(&self, tms_id: &str) -> bool {
        self.authorized_tile_matrix_sets
            .iter()
            .any(|authorized| authorized == tms_id)
    }
}


#[cfg(test)]
pub mod test_utils {
    use super::*;

    pub fn basic_layer_json() -> String {
        String::from(
            r#"{
                "title": "Roads",
                "abstract": "Road network",
                "keywords": ["transport"],
                "bbox": {"crs": "EPSG:3857", "min_x": 0.0, "min_y": 0.0, "max_x": 100.0, "max_y": 100.0},
                "geographic_bbox": {"min_x": -10.0, "min_y": -10.0, "max_x": 10.0, "max_y": 10.0},
                "pyramid": {
                    "format": "image/png",
                    "tile_matrix_set": "PM",
                    "levels": {
                        "0": {"min_row": 0, "max_row": 0, "min_col": 0, "max_col": 0},
                        "10": {"min_row": 0, "max_row": 1023, "min_col": 0, "max_col": 1023}
                    }
                },
                "wms": {"enabled": true, "crs": ["EPSG:3857", "EPSG:4326"]},
                "wmts": {"enabled": true},
                "tms": {"enabled": true}
            }"#,
        )
    }

    pub fn basic_layer(id: &str) -> Layer {
        Layer::from_json(id, &basic_layer_json()).unwrap()
    }

    pub fn cascading_layer(id: &str, url: &str, timeout: u64, retries: u32) -> Layer {
        let document = format!(
            r#"{{
                "title": "Cascaded",
                "bbox": {{"crs": "EPSG:3857", "min_x": 0.0, "min_y": 0.0, "max_x": 100.0, "max_y": 100.0}},
                "geographic_bbox": {{"min_x": -10.0, "min_y": -10.0, "max_x": 10.0, "max_y": 10.0}},
                "pyramid": {{
                    "format": "image/png",
                    "tile_matrix_set": "PM",
                    "levels": {{"0": {{"min_row": 0, "max_row": 0, "min_col": 0, "max_col": 0}}}}
                }},
                "wms": {{"enabled": true, "crs": ["EPSG:3857"]}},
                "wmts": {{"enabled": true}},
                "feature_info": {{
                    "enabled": true,
                    "type": "EXTERNALWMS",
                    "url": "{}",
                    "timeout": {},
                    "retries": {},
                    "interval": 0,
                    "layers": "remote"
                }}
            }}"#,
            url, timeout, retries,
        );
        Layer::from_json(id, &document).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error;

    #[test]
    fn test_full_definition_parses() -> Result<(), Box<dyn Error>> {
        let layer = Layer::from_json("roads", &test_utils::basic_layer_json())?;
        assert_eq!("roads", layer.id, "Wrong id");
        assert_eq!("Roads", layer.title, "Wrong title");
        assert!(layer.wms_enabled && layer.wmts_enabled && layer.tms_enabled, "Flags lost");
        assert!(!layer.gfi_enabled, "GFI must default to disabled");
        assert_eq!(2, layer.pyramid.levels.len(), "Wrong level count");
        assert_eq!(
            vec![String::from("PM")],
            layer.authorized_tile_matrix_sets,
            "Tile matrix sets must default to the pyramid's"
        );
        Ok(())
    }

    #[test]
    fn test_missing_title_is_named_in_the_error() -> Result<(), Box<dyn Error>> {
        let document = r#"{
            "bbox": {"min_x": 0.0, "min_y": 0.0, "max_x": 1.0, "max_y": 1.0},
            "geographic_bbox": {"min_x": 0.0, "min_y": 0.0, "max_x": 1.0, "max_y": 1.0},
            "pyramid": {"format": "image/png", "tile_matrix_set": "PM",
                        "levels": {"0": {"min_row": 0, "max_row": 0, "min_col": 0, "max_col": 0}}}
        }"#;
        let error = Layer::from_json("roads", document).unwrap_err();
        assert!(error.to_string().contains("title"), "Error does not name the missing field");
        Ok(())
    }

    #[test]
    fn test_empty_pyramid_is_rejected() -> Result<(), Box<dyn Error>> {
        let document = r#"{
            "title": "Roads",
            "bbox": {"min_x": 0.0, "min_y": 0.0, "max_x": 1.0, "max_y": 1.0},
            "geographic_bbox": {"min_x": 0.0, "min_y": 0.0, "max_x": 1.0, "max_y": 1.0},
            "pyramid": {"format": "image/png", "tile_matrix_set": "PM", "levels": {}}
        }"#;
        assert!(Layer::from_json("roads", document).is_err(), "Empty pyramid was accepted");
        Ok(())
    }

    #[test]
    fn test_default_style_is_injected_when_absent() -> Result<(), Box<dyn Error>> {
        let layer = Layer::from_json("roads", &test_utils::basic_layer_json())?;
        assert_eq!("normal", layer.default_style, "Default style not injected");
        assert!(layer.get_style("normal").is_some(), "Injected style not declared");
        Ok(())
    }

    #[test]
    fn test_undeclared_default_style_is_rejected() -> Result<(), Box<dyn Error>> {
        let document = r#"{
            "title": "Roads",
            "bbox": {"min_x": 0.0, "min_y": 0.0, "max_x": 1.0, "max_y": 1.0},
            "geographic_bbox": {"min_x": 0.0, "min_y": 0.0, "max_x": 1.0, "max_y": 1.0},
            "pyramid": {"format": "image/png", "tile_matrix_set": "PM",
                        "levels": {"0": {"min_row": 0, "max_row": 0, "min_col": 0, "max_col": 0}}},
            "styles": [{"id": "hillshade"}],
            "default_style": "missing"
        }"#;
        assert!(Layer::from_json("roads", document).is_err(), "Undeclared default style accepted");
        Ok(())
    }

    #[test]
    fn test_external_wms_feature_info_source() -> Result<(), Box<dyn Error>> {
        let layer = test_utils::cascading_layer("cascaded", "http://upstream/wms", 2, 3);
        assert!(layer.gfi_enabled, "GFI flag lost");
        match layer.feature_info {
            Some(FeatureInfoSource::ExternalWms(ref source)) => {
                assert_eq!("http://upstream/wms", source.web_service.url, "Wrong url");
                assert_eq!(Duration::from_secs(2), source.web_service.timeout, "Wrong timeout");
                assert_eq!(3, source.web_service.retries, "Wrong retry count");
                assert_eq!("remote", source.layers, "Wrong remote layers");
            },
            ref other => panic!("Expected an external WMS source, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_tile_matrix_limits_containment() -> Result<(), Box<dyn Error>> {
        let limits = TileMatrixLimits {
            min_row: 2,
            max_row: 4,
            min_col: 1,
            max_col: 3,
        };
        assert!(limits.contain_tile(1, 2), "Lower corner must be inside");
        assert!(limits.contain_tile(3, 4), "Upper corner must be inside");
        assert!(!limits.contain_tile(0, 2), "Column below range accepted");
        assert!(!limits.contain_tile(4, 2), "Column above range accepted");
        assert!(!limits.contain_tile(1, 5), "Row above range accepted");
        Ok(())
    }
}
