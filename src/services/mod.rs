pub mod paper_service;
pub mod recognition_service;
pub mod storage_service;
pub mod translation_service;
pub mod upload_service;

pub use paper_service::PaperService;
pub use recognition_service::RecognitionService;
pub use storage_service::LocalBlobStore;
pub use translation_service::TranslationService;
pub use upload_service::UploadService;
