use crate::Config;
use std::path::{Path, PathBuf};
use tracing::info;

const UPLOADS_DIR: &str = "uploads";
const TEMP_DIR_PREFIX: &str = "frame-sampler-";

fn init_workspace(workspace: &Path) -> std::io::Result<PathBuf> {
    let uploads_dir = workspace.join(UPLOADS_DIR);
    std::fs::create_dir_all(&uploads_dir)?;
    Ok(uploads_dir)
}

/// Frames land in the configured directory, or in a fresh temp directory
/// that outlives the process.
fn init_temp_dir(temp_dir: Option<&str>) -> std::io::Result<PathBuf> {
    match temp_dir {
        Some(dir) => {
            let dir = PathBuf::from(dir);
            std::fs::create_dir_all(&dir)?;
            Ok(dir)
        }
        None => Ok(tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir()?
            .keep()),
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub uploads_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub frames: usize,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let uploads_dir = init_workspace(Path::new(&config.workspace))?;
        let temp_dir = init_temp_dir(config.temp_dir.as_deref())?;
        info!(uploads_dir = %uploads_dir.display(), temp_dir = %temp_dir.display(), "Workspace ready");

        Ok(Self {
            uploads_dir,
            temp_dir,
            frames: config.frames,
        })
    }

    pub fn uploads_dir(&self) -> &Path {
        self.uploads_dir.as_path()
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.as_path()
    }
}
