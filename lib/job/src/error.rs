use thiserror::Error;

use crate::JobType;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("JobError - Serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("JobError - InitializerMissing: {0}")]
    InitializerMissing(JobType),
    #[error("JobError - Init: {0}")]
    Init(String),
}
