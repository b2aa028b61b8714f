pub mod blob_handlers;
pub mod health_handlers;
pub mod paper_handlers;
pub mod task_handlers;
pub mod upload_handlers;
