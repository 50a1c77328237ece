//! Per-request access policy. A pure function of the resolved identity and
//! the route's static policy.

use super::session::Identity;

/// Where anonymous visitors of a protected route are sent.
pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    Public,
    RequiresAuthentication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny { redirect_to: &'static str },
}

#[must_use]
pub const fn authorize(identity: &Identity, policy: RoutePolicy) -> Access {
    match (policy, identity) {
        (RoutePolicy::RequiresAuthentication, Identity::Anonymous) => Access::Deny {
            redirect_to: LOGIN_ROUTE,
        },
        _ => Access::Allow,
    }
}
