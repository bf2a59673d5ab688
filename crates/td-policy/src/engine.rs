// engine.rs — Access policy evaluation.
//
// The AccessPolicy decides who can see a new ticket space and who may
// manage (close, extend) an existing one. For a new space it checks, in
// order:
//
// 1. Is this a gang ticket? → the requester must hold a gang role, else Deny
// 2. Base grant: everyone denied
// 3. Requester, service identity, staff role → read + write
// 4. Gang ticket → every holder of the first matching gang role → read + write
//
// Nothing here talks to the platform. Role membership is looked up by the
// caller and passed in, so evaluation stays a pure function.

use td_ticket::{Role, RoleId, TicketKind, UserId};

use crate::error::PolicyError;
use crate::grant::{GrantSet, Principal};

/// Access policy for ticket spaces.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    /// The bot's own identity; always admitted so it can manage the space.
    service: UserId,
    /// Staff role admitted to every ticket and allowed to close any ticket.
    staff_role: Option<RoleId>,
    /// Role-name prefix marking gang roles (e.g. "Gang-").
    gang_prefix: String,
}

impl AccessPolicy {
    pub fn new(service: UserId, staff_role: Option<RoleId>, gang_prefix: impl Into<String>) -> Self {
        Self {
            service,
            staff_role,
            gang_prefix: gang_prefix.into(),
        }
    }

    pub fn staff_role(&self) -> Option<RoleId> {
        self.staff_role
    }

    /// The gang role that qualifies `roles` for a ticket of `kind`.
    ///
    /// Returns `Ok(None)` for kinds without a gang requirement. For gang
    /// tickets the first role (in the order given) whose name starts with
    /// the gang prefix wins; no such role is `PermissionDenied`.
    pub fn gang_role<'a>(
        &self,
        kind: TicketKind,
        roles: &'a [Role],
    ) -> Result<Option<&'a Role>, PolicyError> {
        if kind != TicketKind::Gang {
            return Ok(None);
        }
        roles
            .iter()
            .find(|role| role.name.starts_with(&self.gang_prefix))
            .map(Some)
            .ok_or_else(|| PolicyError::denied("you must have a gang role to create a gang ticket"))
    }

    /// Compute the grants for a new ticket space.
    ///
    /// `co_members` are the holders of the role returned by [`gang_role`]
    /// (ignored for other kinds). The requester need not be excluded from
    /// it; grants are a set.
    ///
    /// [`gang_role`]: AccessPolicy::gang_role
    pub fn grants_for(
        &self,
        kind: TicketKind,
        requester: UserId,
        roles: &[Role],
        co_members: &[UserId],
    ) -> Result<GrantSet, PolicyError> {
        let gang_role = self.gang_role(kind, roles)?;

        let mut grants = GrantSet::default_deny();
        grants.allow_read_write(Principal::User(requester));
        grants.allow_read_write(Principal::User(self.service));
        if let Some(staff) = self.staff_role {
            grants.allow_read_write(Principal::Role(staff));
        }

        if let Some(role) = gang_role {
            for member in co_members {
                grants.allow_read_write(Principal::User(*member));
            }
            tracing::debug!(
                role = %role.name,
                members = co_members.len(),
                "shared gang ticket with role holders"
            );
        }

        Ok(grants)
    }

    /// Whether `roles` include the staff role.
    pub fn is_staff(&self, roles: &[Role]) -> bool {
        self.staff_role
            .is_some_and(|staff| roles.iter().any(|r| r.id == staff))
    }

    /// Whether `actor` may manage a ticket opened by `creator`: the creator
    /// themselves or any staff member.
    pub fn can_manage(&self, creator: UserId, actor: UserId, roles: &[Role]) -> bool {
        actor == creator || self.is_staff(roles)
    }

    /// Like [`can_manage`](AccessPolicy::can_manage), as a `Result`.
    pub fn authorize_manage(
        &self,
        creator: UserId,
        actor: UserId,
        roles: &[Role],
        what: &str,
    ) -> Result<(), PolicyError> {
        if self.can_manage(creator, actor, roles) {
            Ok(())
        } else {
            Err(PolicyError::denied(format!(
                "you don't have permission to {}",
                what
            )))
        }
    }

    /// Staff-only operations (adding members, retrieving archives).
    pub fn authorize_staff(&self, roles: &[Role], what: &str) -> Result<(), PolicyError> {
        if self.is_staff(roles) {
            Ok(())
        } else {
            Err(PolicyError::denied(format!(
                "only staff can {}",
                what
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::Permission;

    const BOT: UserId = UserId(1);
    const STAFF: RoleId = RoleId(50);
    const REQUESTER: UserId = UserId(7);

    fn policy() -> AccessPolicy {
        AccessPolicy::new(BOT, Some(STAFF), "Gang-")
    }

    fn rw(set: &GrantSet, principal: Principal) -> bool {
        set.allows(principal, Permission::Read) && set.allows(principal, Permission::Write)
    }

    #[test]
    fn normal_ticket_admits_requester_bot_and_staff() {
        let grants = policy()
            .grants_for(TicketKind::Normal, REQUESTER, &[], &[])
            .unwrap();
        assert!(rw(&grants, Principal::User(REQUESTER)));
        assert!(rw(&grants, Principal::User(BOT)));
        assert!(rw(&grants, Principal::Role(STAFF)));
        assert_eq!(grants.principals().len(), 3);
        assert!(!grants.allows(Principal::Everyone, Permission::Read));
    }

    #[test]
    fn staff_role_is_optional() {
        let policy = AccessPolicy::new(BOT, None, "Gang-");
        let grants = policy
            .grants_for(TicketKind::Support, REQUESTER, &[], &[])
            .unwrap();
        assert_eq!(grants.principals().len(), 2);
    }

    #[test]
    fn gang_ticket_without_gang_role_is_denied() {
        let roles = vec![Role::new(3u64, "Civilian"), Role::new(4u64, "gang-lowercase")];
        let result = policy().grants_for(TicketKind::Gang, REQUESTER, &roles, &[UserId(8)]);
        assert!(matches!(result, Err(PolicyError::PermissionDenied { .. })));
    }

    #[test]
    fn gang_ticket_shares_with_role_holders() {
        let roles = vec![Role::new(3u64, "Civilian"), Role::new(4u64, "Gang-Ballas")];
        let grants = policy()
            .grants_for(TicketKind::Gang, REQUESTER, &roles, &[REQUESTER, UserId(8), UserId(9)])
            .unwrap();
        assert!(rw(&grants, Principal::User(UserId(8))));
        assert!(rw(&grants, Principal::User(UserId(9))));
        assert!(rw(&grants, Principal::User(REQUESTER)));
    }

    #[test]
    fn first_gang_role_in_platform_order_wins() {
        let roles = vec![Role::new(4u64, "Gang-Vagos"), Role::new(5u64, "Gang-Ballas")];
        let role = policy().gang_role(TicketKind::Gang, &roles).unwrap().unwrap();
        assert_eq!(role.name, "Gang-Vagos");
    }

    #[test]
    fn non_gang_kinds_need_no_gang_role() {
        assert!(policy().gang_role(TicketKind::Normal, &[]).unwrap().is_none());
        assert!(policy().gang_role(TicketKind::Support, &[]).unwrap().is_none());
    }

    #[test]
    fn co_members_ignored_for_normal_tickets() {
        let grants = policy()
            .grants_for(TicketKind::Normal, REQUESTER, &[], &[UserId(8)])
            .unwrap();
        assert!(!grants.allows(Principal::User(UserId(8)), Permission::Read));
    }

    #[test]
    fn manage_requires_creator_or_staff() {
        let staff_roles = vec![Role::new(STAFF.0, "Staff")];
        let p = policy();
        assert!(p.can_manage(REQUESTER, REQUESTER, &[]));
        assert!(p.can_manage(REQUESTER, UserId(99), &staff_roles));
        assert!(!p.can_manage(REQUESTER, UserId(99), &[]));
        assert!(p
            .authorize_manage(REQUESTER, UserId(99), &[], "close this ticket")
            .is_err());
    }

    #[test]
    fn staff_only_operations() {
        let p = policy();
        assert!(p.authorize_staff(&[Role::new(STAFF.0, "Staff")], "add members").is_ok());
        assert!(p.authorize_staff(&[], "add members").is_err());
        assert!(!AccessPolicy::new(BOT, None, "Gang-").is_staff(&[Role::new(STAFF.0, "Staff")]));
    }
}
