//! HTTP route handlers.

mod health;
mod workflows;

pub use health::health_handler;
pub use workflows::{
    cancel_job_handler, execute_workflow_handler, get_job_handler, recent_jobs_handler,
};
