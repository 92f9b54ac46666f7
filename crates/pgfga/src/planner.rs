//! Turns a desired-state document into declarations.

use tracing::{debug, info, Instrument, Span};

use crate::config::{Document, UserAuth, UserConfig};
use crate::error::{ConfigError, Result};
use crate::ldap::member::short_name;
use crate::ldap::{DirectorySearch, LdapDirectory, MemberKind, MembershipResolver};
use crate::pg::option::parse_options;
use crate::pg::{
    Capability, Database, Extension, ReplicationSlot, Role, RoleOption, RoleOptionMap, State,
};
use crate::registry::{Declarations, Registry};

/// Collects declarations from one document.
///
/// The resolver is only consulted for Present `ldap-group` users.
pub struct Planner<'a, D: DirectorySearch> {
    document: &'a Document,
    resolver: Option<MembershipResolver<D>>,
    span: Span,
}

impl<'a> Planner<'a, LdapDirectory> {
    /// Planner backed by the document's own `ldap` section, if any.
    pub fn from_document(document: &'a Document, span: Span) -> Self {
        let resolver = document.ldap.clone().map(|config| {
            MembershipResolver::new(
                LdapDirectory::new(config),
                tracing::info_span!(parent: &span, "ldap"),
            )
        });
        Self::new(document, resolver, span)
    }
}

impl<'a, D: DirectorySearch> Planner<'a, D> {
    pub fn new(document: &'a Document, resolver: Option<MembershipResolver<D>>, span: Span) -> Self {
        Self {
            document,
            resolver,
            span,
        }
    }

    /// Collects and merges everything the document declares.
    pub async fn registry(&mut self) -> Result<Registry> {
        let declarations = self.plan().await?;
        declarations.resolve(&self.document.strict)
    }

    pub async fn plan(&mut self) -> Result<Declarations> {
        let span = self.span.clone();
        async {
            let mut declarations = Declarations::new();
            self.plan_roles(&mut declarations)?;
            self.plan_users(&mut declarations).await?;
            self.plan_databases(&mut declarations);
            self.plan_slots(&mut declarations);
            Ok(declarations)
        }
        .instrument(span)
        .await
    }

    fn plan_roles(&self, declarations: &mut Declarations) -> Result<()> {
        for (name, config) in &self.document.roles {
            let options = compose(&config.options)?;
            declarations.role(Role::new(name.as_str(), options, config.state));
            if config.state.is_present() {
                for granted in &config.member {
                    declarations.grant(name, granted, State::Present);
                }
            }
            for granted in &config.not_member {
                declarations.grant(name, granted, State::Absent);
            }
        }
        Ok(())
    }

    async fn plan_users(&mut self, declarations: &mut Declarations) -> Result<()> {
        let document = self.document;
        for (name, config) in &document.users {
            let mut options = compose(&config.options)?;
            debug!(user = %name, auth = config.auth.name(), "Planning user");

            match &config.auth {
                UserAuth::LdapGroup {
                    ldapbasedn,
                    ldapfilter,
                } => {
                    let base_dn = ldapbasedn.as_deref().unwrap_or_default();
                    let filter = ldapfilter.as_deref().unwrap_or_default();
                    if base_dn.is_empty() || filter.is_empty() {
                        return Err(ConfigError::MissingDirectoryQuery { user: name.clone() }.into());
                    }
                    self.plan_ldap_group(declarations, config, base_dn, filter, options)
                        .await?;
                }
                UserAuth::LdapUser | UserAuth::ClientCert => {
                    options.add(RoleOption::new(Capability::Login));
                    declarations.role(Role::new(name.as_str(), options, config.state));
                    plan_memberships(declarations, name, config);
                }
                UserAuth::Password { password, expiry } | UserAuth::Md5 { password, expiry } => {
                    options.add(RoleOption::new(Capability::Login));
                    let mut role = Role::new(name.as_str(), options, config.state);
                    if config.state.is_present() {
                        if let Some(password) = password {
                            role.set_password(password.resolve()?);
                        }
                        if let Some(expiry) = expiry {
                            role.set_expiry(*expiry);
                        }
                    }
                    declarations.role(role);
                    plan_memberships(declarations, name, config);
                }
            }
        }
        Ok(())
    }

    /// A Present group is expanded through the directory. Otherwise only the
    /// base group role is declared and the directory is not queried.
    async fn plan_ldap_group(
        &mut self,
        declarations: &mut Declarations,
        config: &UserConfig,
        base_dn: &str,
        filter: &str,
        options: RoleOptionMap,
    ) -> Result<()> {
        if !config.state.is_present() {
            let name = short_name(base_dn);
            declarations.role(Role::new(name.as_str(), options, config.state));
            for granted in &config.not_memberof {
                declarations.grant(&name, granted, State::Absent);
            }
            return Ok(());
        }

        let resolver = self
            .resolver
            .as_mut()
            .ok_or(ConfigError::MissingDirectoryConfig)?;
        let group = resolver.resolve(base_dn, filter).await?;
        info!(
            group = %group.name,
            memberships = group.memberships.len(),
            "Expanded directory group"
        );

        declarations.role(Role::new(group.name.as_str(), options, config.state));
        for membership in &group.memberships {
            let member_options: RoleOptionMap = match membership.member_kind {
                MemberKind::User => [RoleOption::new(Capability::Login)].into_iter().collect(),
                _ => RoleOptionMap::new(),
            };
            declarations.role(Role::new(
                membership.member.as_str(),
                member_options,
                State::Present,
            ));
            declarations.grant(&membership.member, &membership.member_of, State::Present);
        }
        plan_memberships(declarations, &group.name, config);
        Ok(())
    }

    fn plan_databases(&self, declarations: &mut Declarations) {
        let conventions = &self.document.conventions;
        for (name, config) in &self.document.databases {
            let mut database = Database::new(name.as_str(), config.state);
            if let Some(owner) = &config.owner {
                database = database.with_owner(owner.as_str());
            }
            for (extension_name, extension_config) in &config.extensions {
                let mut extension = Extension::new(extension_name.as_str());
                extension.schema = extension_config.schema.clone();
                extension.version = extension_config.version.clone();
                extension.state = extension_config.state;
                database.add_extension(extension);
            }

            if config.state.is_present() {
                let readonly = conventions.readonly_role(name);
                declarations.role(Role::new(
                    readonly.as_str(),
                    RoleOptionMap::new(),
                    State::Present,
                ));
                if let Some(group) = &conventions.readonly_group {
                    declarations.grant(&readonly, group, State::Present);
                }
                if let Some(group) = &conventions.owner_group {
                    declarations.grant(&database.owner, group, State::Present);
                }
            }
            declarations.database(database);
        }
    }

    fn plan_slots(&self, declarations: &mut Declarations) {
        for name in &self.document.replication_slots {
            declarations.slot(ReplicationSlot::new(name.as_str(), State::Present));
        }
    }
}

fn compose(tokens: &[String]) -> Result<RoleOptionMap> {
    let options = parse_options(tokens)?;
    Ok(RoleOptionMap::compose(&options)?)
}

/// `memberof` grants for Present users, `not_memberof` revokes always.
fn plan_memberships(declarations: &mut Declarations, name: &str, config: &UserConfig) {
    if config.state.is_present() {
        for granted in &config.memberof {
            declarations.grant(name, granted, State::Present);
        }
    }
    for granted in &config.not_memberof {
        declarations.grant(name, granted, State::Absent);
    }
}
