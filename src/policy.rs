//! Authorization predicates over a verified [`User`].

use std::sync::Arc;

use crate::config::PolicyConfig;
use crate::credential::User;

/// Host-supplied acceptance predicate.
pub type ValidateUser = Arc<dyn Fn(&User) -> bool + Send + Sync>;

/// Guardian staff: a guardian.co.uk email and a multi-factor login.
#[must_use]
pub fn guardian_validation(user: &User) -> bool {
    user.email.contains("guardian.co.uk") && user.multifactor
}

/// Accept everyone.
#[must_use]
pub fn allow_all() -> ValidateUser {
    Arc::new(|_| true)
}

/// Accept users whose email domain is one of `domains`, optionally requiring
/// multi-factor. An empty list accepts any domain.
#[must_use]
pub fn email_domain_policy(domains: Vec<String>, require_multifactor: bool) -> ValidateUser {
    let domains: Vec<String> = domains.into_iter().map(|d| d.to_ascii_lowercase()).collect();
    Arc::new(move |user| {
        if require_multifactor && !user.multifactor {
            return false;
        }
        if domains.is_empty() {
            return true;
        }
        user.email
            .rsplit_once('@')
            .is_some_and(|(_, domain)| domains.iter().any(|d| d.eq_ignore_ascii_case(domain)))
    })
}

impl PolicyConfig {
    /// Build the predicate this section describes
    #[must_use]
    pub fn predicate(&self) -> ValidateUser {
        email_domain_policy(self.allowed_email_domains.clone(), self.require_multifactor)
    }
}
