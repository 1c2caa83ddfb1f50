pub mod codec;
pub mod command;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod pen;
pub mod queue;
pub mod response;
pub mod sim;
pub mod stitch;
pub mod timing;
pub mod upload;


// Re-export the PP1 struct for easy access
pub use device::PP1;
pub use error::{ErrorKind, PP1Error, UploadStep};
