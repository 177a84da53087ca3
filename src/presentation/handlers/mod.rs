mod callbacks;
mod health;
mod ingest;
mod job_status;

use serde::Serialize;

pub use callbacks::{asr_callback_handler, ml_callback_handler};
pub use health::healthz_handler;
pub use ingest::ingest_audio_handler;
pub use job_status::job_status_handler;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
