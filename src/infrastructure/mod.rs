pub mod export;
pub mod observability;
pub mod stages;
pub mod storage;
