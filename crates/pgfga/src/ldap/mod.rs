//! Directory group membership resolution.

pub mod config;
pub mod directory;
pub mod error;
pub mod member;
pub mod membership;
pub mod resolver;

pub use config::DirectoryConfig;
pub use directory::{DirectoryEntry, DirectorySearch, LdapDirectory};
pub use error::DirectoryError;
pub use member::{Member, MemberGraph, MemberId, MemberKind};
pub use membership::Membership;
pub use resolver::{MembershipResolver, ResolvedGroup};
