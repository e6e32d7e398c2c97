//! Committer identity checks against the pushing account.

use crate::cache::DirectorySnapshot;
use crate::domain::changeset::Committer;
use crate::domain::identity::AccountIdentity;
use crate::domain::settings::IdentityRequirements;
use crate::result::{IdentityCheck, IdentityResult, IdentityViolation};

/// Compare a commit's committer with the pusher.
///
/// Name and email are compared exactly and case-sensitively; each enabled
/// check contributes its own violation. The known-committer check only runs
/// when a directory snapshot is supplied.
pub fn verify_identity(
    committer: &Committer,
    pusher: &AccountIdentity,
    requirements: &IdentityRequirements,
    directory: Option<&DirectorySnapshot>,
) -> IdentityResult {
    let name_matches = committer.name == pusher.display_name;
    let email_matches = committer.email == pusher.email;
    let committer_known = match directory {
        Some(snapshot) if requirements.require_known_committer => Some(
            snapshot.lookup(&committer.email).is_some()
                || snapshot.lookup(&committer.name).is_some(),
        ),
        _ => None,
    };

    let mut violations = Vec::new();
    if requirements.require_matching_name && !name_matches {
        violations.push(IdentityViolation {
            check: IdentityCheck::Name,
            message: requirements.require_matching_name_message.clone(),
        });
    }
    if requirements.require_matching_email && !email_matches {
        violations.push(IdentityViolation {
            check: IdentityCheck::Email,
            message: requirements.require_matching_email_message.clone(),
        });
    }
    if committer_known == Some(false) {
        violations.push(IdentityViolation {
            check: IdentityCheck::KnownCommitter,
            message: requirements.require_known_committer_message.clone(),
        });
    }

    IdentityResult {
        name_matches,
        email_matches,
        committer_known,
        violations,
    }
}
