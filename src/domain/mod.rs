mod job;
mod job_id;
mod job_status;
mod ml_result;
mod stage;
mod storage_path;

pub use job::{Job, TransitionError};
pub use job_id::JobId;
pub use job_status::JobStatus;
pub use ml_result::MlResult;
pub use stage::Stage;
pub use storage_path::StoragePath;
