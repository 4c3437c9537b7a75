use ogc_tile_server::interface::fetch::ReqwestFetch;
use ogc_tile_server::interface::storage::MemoryTileStorage;
use ogc_tile_server::map_server::MapServer;
use ogc_tile_server::schema::catalog::inventory::Catalog;
use ogc_tile_server::schema::catalog::layer::Layer;
use ogc_tile_server::schema::catalog::server::ServerConfiguration;
use ogc_tile_server::schema::catalog::services::ServicesConfiguration;

use log::{error, info, warn};

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;


fn main() {
    env_logger::init();
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("server.ini"));
    if let Err(why) = serve(&config_path) {
        error!("Server start failed: {}", why);
        std::process::exit(1);
    }
}

fn serve(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let server_config = if config_path.exists() {
        ServerConfiguration::load(config_path)?
    } else {
        warn!(
            "Configuration file {} not found, using defaults",
            config_path.display(),
        );
        ServerConfiguration::new()
    };

    let services_config = match &server_config.services_file {
        Some(path) => ServicesConfiguration::from_json(&std::fs::read_to_string(path)?)?,
        None => ServicesConfiguration::from_json("{}")?,
    };

    let mut layers = Vec::new();
    if let Some(directory) = &server_config.layers_directory {
        for entry in std::fs::read_dir(directory)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let id = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(id) => id.to_string(),
                None => continue,
            };
            match Layer::from_json(&id, &std::fs::read_to_string(&path)?) {
                Ok(layer) => {
                    info!("Loaded layer {} from {}", id, path.display());
                    layers.push(layer);
                },
                Err(why) => {
                    warn!("Skipping layer file {}: {}", path.display(), why);
                },
            }
        }
    }

    let server = MapServer::new(
        server_config,
        services_config,
        Catalog::from_layers(layers),
        Box::new(MemoryTileStorage::new()),
        Box::new(ReqwestFetch),
    );
    return Ok(MapServer::run(Arc::new(server))?);
}
