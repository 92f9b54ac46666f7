pub mod loader;
pub mod schema;

pub use loader::{load_document, load_document_from_str};
pub use schema::{
    DatabaseConfig, Document, ExtensionConfig, GeneralConfig, RoleConfig, UserAuth, UserConfig,
};
