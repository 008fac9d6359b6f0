use std::path::{Path, PathBuf};

use crate::fs::workspace_directory;
use crate::io_models::env_file::{EnvFile, EnvFileError};
use crate::io_models::workshop::WorkshopConfig;

/// Settings shared by every stage, resolved once from the command line.
#[derive(Debug, Clone)]
pub struct Context {
    workspace_root_dir: PathBuf,
    env_file_path: PathBuf,
    kubeconfig: Option<PathBuf>,
    config: WorkshopConfig,
}

impl Context {
    /// A relative `env_file_path` is resolved from `workspace_root_dir`.
    pub fn new(
        workspace_root_dir: PathBuf,
        env_file_path: PathBuf,
        kubeconfig: Option<PathBuf>,
        config: WorkshopConfig,
    ) -> Self {
        let env_file_path = match env_file_path.is_absolute() {
            true => env_file_path,
            false => workspace_root_dir.join(env_file_path),
        };

        Context {
            workspace_root_dir,
            env_file_path,
            kubeconfig,
            config,
        }
    }

    pub fn workspace_root_dir(&self) -> &Path {
        &self.workspace_root_dir
    }

    pub fn env_file_path(&self) -> &Path {
        &self.env_file_path
    }

    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    pub fn config(&self) -> &WorkshopConfig {
        &self.config
    }

    pub fn load_env_file(&self) -> Result<EnvFile, EnvFileError> {
        EnvFile::load(&self.env_file_path)
    }

    pub fn workspace_directory(&self, dir_name: &str) -> Result<PathBuf, std::io::Error> {
        workspace_directory(&self.workspace_root_dir, dir_name)
    }
}
