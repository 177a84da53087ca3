mod audio_store;
mod result_sink;
mod stage_client;

pub use audio_store::{AudioStore, AudioStoreError};
pub use result_sink::{ResultSink, ResultSinkError};
pub use stage_client::{DispatchRequest, StageClient, StageClientError, StagePayload};
