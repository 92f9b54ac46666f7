//! Catalog queries used by the reconcilers.
//!
//! Every observation a reconciler makes is one of these statements. Parameters
//! are always text; columns compared against other types are cast in SQL.

use super::option::RoleOption;

pub const ROLE_EXISTS: &str = "SELECT rolname FROM pg_roles WHERE rolname = $1";

/// Holds when the role exists and is not the connecting user.
pub const ROLE_DROPPABLE: &str =
    "SELECT rolname FROM pg_roles WHERE rolname = $1 AND rolname != CURRENT_USER";

/// Holds when the stored password differs from `$2` (canonical form).
pub const ROLE_PASSWORD_DIFFERS: &str = "SELECT rolname FROM pg_roles WHERE rolname = $1 \
     AND rolname NOT IN (SELECT usename FROM pg_shadow WHERE usename = $1 AND COALESCE(passwd, '') = $2)";

pub const ROLE_HAS_PASSWORD: &str = "SELECT usename FROM pg_shadow WHERE usename = $1 \
     AND passwd IS NOT NULL AND usename != CURRENT_USER";

/// Holds when the expiry is unset or differs from `$2` (RFC 3339).
pub const ROLE_EXPIRY_DIFFERS: &str = "SELECT rolname FROM pg_roles WHERE rolname = $1 \
     AND (rolvaliduntil IS NULL OR rolvaliduntil != $2::timestamptz)";

pub const ROLE_HAS_EXPIRY: &str = "SELECT rolname FROM pg_roles WHERE rolname = $1 \
     AND rolvaliduntil IS NOT NULL AND rolvaliduntil != 'infinity'";

/// Prefix of the per-option check; see [`role_option_matches`].
pub const ROLE_OPTION_PREFIX: &str = "SELECT rolname FROM pg_roles WHERE rolname = $1 AND ";

/// Holds when the role already carries the option.
pub fn role_option_matches(option: &RoleOption) -> String {
    format!("{}{}", ROLE_OPTION_PREFIX, option.sql_predicate())
}

pub const DATABASES_OWNED_BY: &str = "SELECT db.datname::text FROM pg_database db \
     JOIN pg_roles r ON db.datdba = r.oid WHERE r.rolname = $1 ORDER BY db.datname";

/// `$1` granted role, `$2` grantee.
pub const GRANT_EXISTS: &str = "SELECT granted.rolname FROM pg_auth_members auth \
     JOIN pg_roles granted ON auth.roleid = granted.oid \
     JOIN pg_roles grantee ON auth.member = grantee.oid \
     WHERE granted.rolname = $1 AND grantee.rolname = $2";

/// Like [`GRANT_EXISTS`], excluding the connecting user as grantee.
pub const GRANT_REVOCABLE: &str = "SELECT granted.rolname FROM pg_auth_members auth \
     JOIN pg_roles granted ON auth.roleid = granted.oid \
     JOIN pg_roles grantee ON auth.member = grantee.oid \
     WHERE granted.rolname = $1 AND grantee.rolname = $2 AND grantee.rolname != CURRENT_USER";

pub const DATABASE_EXISTS: &str = "SELECT datname FROM pg_database WHERE datname = $1";

/// `$1` database, `$2` expected owner.
pub const DATABASE_OWNED_BY: &str = "SELECT datname FROM pg_database db \
     JOIN pg_roles rol ON db.datdba = rol.oid WHERE datname = $1 AND rolname = $2";

/// Schemas holding tables not yet readable by `$1`.
pub const SCHEMAS_PENDING_SELECT: &str = "SELECT DISTINCT schemaname::text FROM pg_tables \
     WHERE schemaname NOT IN ('pg_catalog', 'information_schema') \
     AND schemaname || '.' || tablename NOT IN (\
     SELECT table_schema || '.' || table_name FROM information_schema.role_table_grants \
     WHERE grantee = $1 AND privilege_type = 'SELECT') ORDER BY 1";

pub const EXTENSION_AVAILABLE: &str = "SELECT name FROM pg_available_extensions WHERE name = $1";

pub const EXTENSION_VERSION_AVAILABLE: &str =
    "SELECT name FROM pg_available_extension_versions WHERE name = $1 AND version = $2";

pub const EXTENSION_INSTALLED: &str = "SELECT extname FROM pg_extension WHERE extname = $1";

pub const EXTENSION_VERSION: &str = "SELECT extversion::text FROM pg_extension WHERE extname = $1";

pub const EXTENSION_SCHEMA: &str = "SELECT n.nspname::text FROM pg_extension e \
     JOIN pg_namespace n ON e.extnamespace = n.oid WHERE e.extname = $1";

pub const SLOT_EXISTS: &str = "SELECT slot_name FROM pg_replication_slots WHERE slot_name = $1";

pub const SLOT_CREATE: &str = "SELECT pg_create_physical_replication_slot($1)";

pub const SLOT_DROP: &str = "SELECT pg_drop_replication_slot($1)";
