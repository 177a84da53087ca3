mod http_stage_client;

pub use http_stage_client::{HttpStageClient, StageEndpoint};
