pub mod build_queue;
pub mod command;
pub mod fatal;
pub mod files;
pub mod image;
pub mod image_builder;
pub mod kickstart;
pub mod ostree;
pub mod repo_builder;
pub mod scheduler;

pub use build_queue::{BuildDispatcher, BuildJob, BuildJobHandler, BuildQueue};
pub use command::{CommandRunner, ProcessCommandRunner, ScriptedCommandRunner};
pub use files::{FilesService, HttpDownloader, LocalUploader, TarExtractor};
pub use fatal::{ExitOnFatal, FatalHandler};
pub use image::{BuildSettings, ImageService};
pub use image_builder::{ImageBuilder, ImageBuilderClient};
pub use ostree::OstreeCli;
pub use repo_builder::{RepoBuilder, RepoSettings};
