use color_eyre::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Holds the id of the dataset selected last, restored on the next start.
const LAST_DATASET_FILE: &str = "last_dataset.txt";

/// Small per-user state kept between runs, next to the log file.
#[derive(Clone, Debug)]
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    /// Create a new StateManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let state_dir = dirs::cache_dir()
            .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine cache directory"))?
            .join(app_name);

        Ok(Self { state_dir })
    }

    pub fn with_dir(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_file(&self, filename: &str) -> PathBuf {
        self.state_dir.join(filename)
    }

    pub fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir)?;
        }
        Ok(())
    }

    /// Id saved by [`StateManager::save_last_dataset`], if any.
    pub fn load_last_dataset(&self) -> Result<Option<String>> {
        let path = self.state_file(LAST_DATASET_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let id = fs::read_to_string(&path)?.trim().to_string();
        Ok((!id.is_empty()).then_some(id))
    }

    pub fn save_last_dataset(&self, dataset_id: &str) -> Result<()> {
        self.ensure_state_dir()?;
        fs::write(self.state_file(LAST_DATASET_FILE), format!("{}\n", dataset_id))?;
        Ok(())
    }

    pub fn clear_last_dataset(&self) -> Result<()> {
        let path = self.state_file(LAST_DATASET_FILE);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_last_dataset_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = StateManager::with_dir(dir.path().join("rowpager"));
        assert_eq!(state.load_last_dataset().unwrap(), None);

        state.save_last_dataset("sales_2").unwrap();
        assert_eq!(
            state.load_last_dataset().unwrap().as_deref(),
            Some("sales_2")
        );

        state.clear_last_dataset().unwrap();
        assert_eq!(state.load_last_dataset().unwrap(), None);
    }

    #[test]
    fn test_blank_state_file_means_nothing_saved() {
        let dir = TempDir::new().unwrap();
        let state = StateManager::with_dir(dir.path().to_path_buf());
        fs::write(state.state_file(LAST_DATASET_FILE), "  \n").unwrap();
        assert_eq!(state.load_last_dataset().unwrap(), None);
    }
}
