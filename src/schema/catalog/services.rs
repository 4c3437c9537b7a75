use serde::Deserialize;

use std::string::String;
use std::vec::Vec;


fn default_true() -> bool {
    true
}

/// Metadata common to every published protocol endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub endpoint_uri: String,
    #[serde(default)]
    pub root_path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ServiceSection {
    fn with_defaults(mut self, title: &str, root_path: &str) -> ServiceSection {
        if self.title.is_empty() {
            self.title = title.to_string();
        }
        if self.root_path.is_empty() {
            self.root_path = root_path.to_string();
        }
        if self.endpoint_uri.is_empty() {
            self.endpoint_uri = format!("http://localhost{}", self.root_path);
        }
        self
    }
}

impl Default for ServiceSection {
    fn default() -> ServiceSection {
        ServiceSection {
            title: String::new(),
            abstract_: String::new(),
            keywords: Vec::new(),
            endpoint_uri: String::new(),
            root_path: String::new(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WmsSection {
    #[serde(flatten)]
    pub common: ServiceSection,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub info_formats: Vec<String>,
    #[serde(default)]
    pub max_width: Option<u32>,
    #[serde(default)]
    pub max_height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WmtsSection {
    #[serde(flatten)]
    pub common: ServiceSection,
    #[serde(default)]
    pub info_formats: Vec<String>,
    #[serde(default)]
    pub reprojection: bool,
}

/// Process-wide service descriptions: read by every worker on every request,
/// loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicesConfiguration {
    #[serde(default)]
    pub wms: WmsSection,
    #[serde(default)]
    pub wmts: WmtsSection,
    #[serde(default)]
    pub tms: ServiceSection,
    #[serde(default)]
    pub tiles: ServiceSection,
    #[serde(default)]
    pub admin: ServiceSection,
    #[serde(default)]
    pub health: ServiceSection,
    #[serde(default)]
    pub common: ServiceSection,
    /// Groups of CRS identifiers treated as interchangeable when authorizing
    /// a WMS request against a layer.
    #[serde(default)]
    pub crs_equivalences: Vec<Vec<String>>,
}

impl ServicesConfiguration {
    pub fn from_json(document: &str) -> Result<ServicesConfiguration, serde_json::Error> {
        let parsed: ServicesConfiguration = serde_json::from_str(document)?;
        return Ok(parsed.normalised());
    }

    fn normalised(mut self) -> ServicesConfiguration {
        self.wms.common = self.wms.common.with_defaults("WMS service", "/wms");
        self.wmts.common = self.wmts.common.with_defaults("WMTS service", "/wmts");
        self.tms = self.tms.with_defaults("TMS service", "/tms");
        self.tiles = self.tiles.with_defaults("Tiles service", "/tiles");
        self.admin = self.admin.with_defaults("Administration", "/admin");
        self.health = self.health.with_defaults("Health check", "/healthcheck");
        self.common = self.common.with_defaults("Landing", "");
        if self.wms.versions.is_empty() {
            self.wms.versions.push(String::from("1.3.0"));
        }
        if self.wms.formats.is_empty() {
            self.wms.formats.push(String::from("image/png"));
            self.wms.formats.push(String::from("image/jpeg"));
        }
        if self.wms.info_formats.is_empty() {
            self.wms.info_formats.push(String::from("application/json"));
            self.wms.info_formats.push(String::from("text/xml"));
        }
        if self.wmts.info_formats.is_empty() {
            self.wmts.info_formats.push(String::from("application/json"));
        }
        self
    }

    pub fn are_crs_equal(&self, left: &str, right: &str) -> bool {
        if left.eq_ignore_ascii_case(right) {
            return true;
        }
        for group in &self.crs_equivalences {
            let has_left = group.iter().any(|crs| crs.eq_ignore_ascii_case(left));
            let has_right = group.iter().any(|crs| crs.eq_ignore_ascii_case(right));
            if has_left && has_right {
                return true;
            }
        }
        return false;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error;

    #[test]
    fn test_defaults_are_applied_on_empty_document() -> Result<(), Box<dyn Error>> {
        let services = ServicesConfiguration::from_json("{}")?;
        assert_eq!("/wms", services.wms.common.root_path, "Default WMS root path missing");
        assert_eq!("/tms", services.tms.root_path, "Default TMS root path missing");
        assert_eq!("/healthcheck", services.health.root_path, "Default health root path missing");
        assert_eq!(vec![String::from("1.3.0")], services.wms.versions, "Default WMS version missing");
        assert!(services.wms.common.enabled, "Services must default to enabled");
        Ok(())
    }

    #[test]
    fn test_section_overrides_survive_normalisation() -> Result<(), Box<dyn Error>> {
        let services = ServicesConfiguration::from_json(
            r#"{
                "wms": {"title": "My WMS", "root_path": "/ows/wms", "enabled": false},
                "crs_equivalences": [["EPSG:4326", "CRS:84"]]
            }"#,
        )?;
        assert_eq!("My WMS", services.wms.common.title, "Title override lost");
        assert_eq!("/ows/wms", services.wms.common.root_path, "Root path override lost");
        assert!(!services.wms.common.enabled, "Enabled override lost");
        Ok(())
    }

    #[test]
    fn test_crs_equivalence_lookup() -> Result<(), Box<dyn Error>> {
        let services = ServicesConfiguration::from_json(
            r#"{"crs_equivalences": [["EPSG:4326", "CRS:84"], ["EPSG:3857", "EPSG:900913"]]}"#,
        )?;
        assert!(services.are_crs_equal("EPSG:4326", "CRS:84"), "Declared equivalence missed");
        assert!(services.are_crs_equal("epsg:3857", "EPSG:900913"), "Equivalence must ignore case");
        assert!(services.are_crs_equal("EPSG:2154", "epsg:2154"), "Identity must always hold");
        assert!(!services.are_crs_equal("EPSG:4326", "EPSG:3857"), "Distinct groups reported equal");
        Ok(())
    }
}
