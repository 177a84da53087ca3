use std::path::PathBuf;
use std::sync::Arc;

use crate::application::ports::{AudioStore, AudioStoreError};
use crate::presentation::config::{StorageProvider, StorageSettings};

use super::object_audio_store::ObjectAudioStore;

pub struct AudioStoreFactory;

impl AudioStoreFactory {
    pub fn create(settings: &StorageSettings) -> Result<Arc<dyn AudioStore>, AudioStoreError> {
        match settings.provider {
            StorageProvider::Local => {
                let store = ObjectAudioStore::local(PathBuf::from(&settings.audio_dir))?;
                Ok(Arc::new(store))
            }
            StorageProvider::Memory => Ok(Arc::new(ObjectAudioStore::in_memory())),
        }
    }
}
