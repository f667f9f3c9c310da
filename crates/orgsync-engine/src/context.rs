//! Tenant context resolution.
//!
//! Turns the claims of an already-authenticated principal into a
//! [`CallerContext`]. Token acquisition and signature checks happen
//! upstream; this module only interprets claims, and fails closed when they
//! do not identify a principal.

use orgsync_core::error::{OrgSyncError, OrgSyncResult};
use orgsync_core::models::context::{CallerContext, CallerRole};
use orgsync_core::models::organization::organization_id_for_domain;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Claims carried by the security context of an inbound request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalClaims {
    /// Principal object id (`sub` / `oid`).
    pub subject: String,
    pub email: Option<String>,
    /// Explicit organization claim; takes precedence over the email domain.
    pub organization_id: Option<String>,
    pub roles: Vec<String>,
}

pub struct TenantContextResolver;

impl TenantContextResolver {
    /// Resolve the caller's organization and roles.
    ///
    /// The organization comes from the explicit claim when present (UUIDs
    /// compare case-insensitively), otherwise from the email domain through
    /// the same derivation used to register organizations.
    pub fn resolve(claims: &PrincipalClaims) -> OrgSyncResult<CallerContext> {
        let subject = claims.subject.trim();
        if subject.is_empty() {
            return Err(Self::reject(claims, "missing principal identifier"));
        }

        let organization_id = match claims.organization_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                Uuid::parse_str(raw)
                    .map_err(|_| Self::reject(claims, "malformed organization claim"))?,
            ),
            _ => claims
                .email
                .as_deref()
                .and_then(email_domain)
                .map(organization_id_for_domain),
        };

        let mut roles: Vec<CallerRole> = claims.roles.iter().filter_map(|r| parse_role(r)).collect();
        roles.sort_by_key(|r| *r as u8);
        roles.dedup();
        if !roles.contains(&CallerRole::Member) {
            roles.push(CallerRole::Member);
        }

        Ok(CallerContext {
            principal: subject.to_string(),
            email: claims.email.clone(),
            organization_id,
            roles,
        })
    }

    fn reject(claims: &PrincipalClaims, reason: &str) -> OrgSyncError {
        warn!(
            target: "security_audit",
            subject = %claims.subject,
            reason,
            "Rejected security context"
        );
        OrgSyncError::IsolationViolation {
            operation: "resolve_context".into(),
            actor: claims.subject.clone(),
            caller_organization: None,
            requested_organization: claims.organization_id.clone().unwrap_or_default(),
            reason: reason.into(),
        }
    }
}

fn email_domain(email: &str) -> Option<&str> {
    let (_, domain) = email.rsplit_once('@')?;
    let domain = domain.trim();
    (!domain.is_empty()).then_some(domain)
}

fn parse_role(raw: &str) -> Option<CallerRole> {
    let normalized: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "superadmin" | "superadministrator" | "globaladmin" => Some(CallerRole::SuperAdmin),
        "orgadmin" | "organizationadmin" | "admin" => Some(CallerRole::OrgAdmin),
        "member" | "user" => Some(CallerRole::Member),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> PrincipalClaims {
        PrincipalClaims {
            subject: "oid-123".into(),
            email: Some("alice@Contoso.com".into()),
            organization_id: None,
            roles: vec![],
        }
    }

    #[test]
    fn organization_derived_from_email_domain() {
        let ctx = TenantContextResolver::resolve(&claims()).unwrap();
        assert_eq!(ctx.organization_id, Some(organization_id_for_domain("contoso.com")));
        assert_eq!(ctx.roles, vec![CallerRole::Member]);
    }

    #[test]
    fn explicit_claim_wins_and_ignores_case() {
        let id = Uuid::new_v4();
        let mut c = claims();
        c.organization_id = Some(id.to_string().to_uppercase());
        let ctx = TenantContextResolver::resolve(&c).unwrap();
        assert_eq!(ctx.organization_id, Some(id));
    }

    #[test]
    fn malformed_claim_fails_closed() {
        let mut c = claims();
        c.organization_id = Some("not-a-uuid".into());
        let err = TenantContextResolver::resolve(&c).unwrap_err();
        assert!(err.is_access_denied());
    }

    #[test]
    fn missing_subject_fails_closed() {
        let mut c = claims();
        c.subject = "  ".into();
        assert!(TenantContextResolver::resolve(&c).unwrap_err().is_access_denied());
    }

    #[test]
    fn roles_parsed_loosely() {
        let mut c = claims();
        c.roles = vec!["Super_Admin".into(), "Org-Admin".into(), "viewer".into()];
        let ctx = TenantContextResolver::resolve(&c).unwrap();
        assert!(ctx.is_super_admin());
        assert!(ctx.is_org_admin());
        assert!(ctx.has_role(CallerRole::Member));
    }

    #[test]
    fn no_email_and_no_claim_means_unbound() {
        let c = PrincipalClaims {
            subject: "svc".into(),
            ..Default::default()
        };
        let ctx = TenantContextResolver::resolve(&c).unwrap();
        assert!(ctx.organization_id.is_none());
    }
}
