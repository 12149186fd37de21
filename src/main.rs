use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use debug::setup_debugging;
use futures::executor::block_on;
use loader::config_loader::LoadableConfig;
use loader::source::ModelSource;
use tracing::{error, info};
use viewer::backend::HeadlessBackend;
use viewer::host::{FixedContainer, HostPage};
use viewer::{ModelViewerSession, ViewerConfiguration};

const CONFIG_PATH: &str = "viewer.json";
const FRAMES_PER_MODEL: u32 = 3;

fn main() {
    let _guard = setup_debugging();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match args.iter().position(|arg| arg == "--config") {
        Some(index) if index + 1 < args.len() => {
            let path = args.remove(index + 1);
            args.remove(index);
            path
        }
        _ => CONFIG_PATH.to_string(),
    };

    let config = match ViewerConfiguration::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "could not read the configuration");
            std::process::exit(1);
        }
    };

    let container = Rc::new(FixedContainer::new(1280, 720));
    let host = HostPage::new().with_container(config.container_id.clone(), container);
    let session = match ModelViewerSession::initialize(config, &host, Box::new(HeadlessBackend::new())) {
        Ok(session) => session,
        Err(err) => {
            error!(%err, "could not start the viewer");
            std::process::exit(1);
        }
    };

    if !block_on(session.loaders_ready()) {
        error!("model loaders are not available");
        std::process::exit(1);
    }

    let mut timestamp = Duration::ZERO;
    let mut failures = 0;
    for location in &args {
        match block_on(session.load(ModelSource::url(location.as_str()))) {
            Ok(model) => info!(
                location = %location,
                meshes = model.mesh_count,
                materials = model.material_count,
                triangles = model.triangle_count,
                size = ?model.size,
                center = ?model.center,
                "model info"
            ),
            Err(err) => {
                error!(location = %location, "{}", err.user_message(&session.config().accepted_extensions()));
                failures += 1;
                continue;
            }
        }

        for _ in 0..FRAMES_PER_MODEL {
            timestamp += Duration::from_millis(16);
            if let Err(err) = session.frame_at(timestamp) {
                error!(%err, "frame failed");
            }
        }
    }

    session.dispose();
    if failures > 0 {
        std::process::exit(1);
    }
}
