pub mod build_status;
pub mod commit;
pub mod image;
pub mod image_set;
pub mod installed_package;
pub mod installer;
pub mod repo;
pub mod update_transaction;
pub mod update_transaction_old_commit;

pub use build_status::{final_image_status, BuildStatus, OutputType};

#[allow(unused_imports)]
pub mod prelude {
    pub use super::commit::{self, Entity as Commit};
    pub use super::image::{self, Entity as Image};
    pub use super::image_set::{self, Entity as ImageSet};
    pub use super::installed_package::{self, Entity as InstalledPackage};
    pub use super::installer::{self, Entity as Installer};
    pub use super::repo::{self, Entity as Repo};
    pub use super::update_transaction::{self, Entity as UpdateTransaction};
    pub use super::update_transaction_old_commit::{self, Entity as UpdateTransactionOldCommit};
}
