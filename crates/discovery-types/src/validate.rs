//! Argument validation.
//!
//! These checks run client-side before any request is dispatched, so an
//! invalid call never reaches the network.

use std::collections::HashSet;

use thiserror::Error;

use crate::options::ListMembersOptions;
use crate::types::{LeaseTimeoutMicros, Member};

/// A call argument that the discovery tier would reject.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("group path must not be empty")]
    EmptyGroupPath,

    #[error("member id must not be empty")]
    EmptyMemberId,

    #[error("duplicate attribute key {key:?} on member {member_id:?}")]
    DuplicateAttribute { member_id: String, key: String },

    #[error("lease timeout must be positive, got {0}us")]
    NonPositiveLease(LeaseTimeoutMicros),

    #[error("list limit must be positive, got {0}")]
    NonPositiveLimit(i32),
}

pub fn group_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::EmptyGroupPath);
    }
    Ok(())
}

/// Check a member's id and attribute keys.
pub fn member(member: &Member) -> Result<(), ValidationError> {
    if member.id.is_empty() {
        return Err(ValidationError::EmptyMemberId);
    }

    let mut seen = HashSet::with_capacity(member.attributes.len());
    for attr in &member.attributes {
        if !seen.insert(attr.key.as_str()) {
            return Err(ValidationError::DuplicateAttribute {
                member_id: member.id.clone(),
                key: attr.key.clone(),
            });
        }
    }

    Ok(())
}

pub fn lease_timeout(micros: LeaseTimeoutMicros) -> Result<(), ValidationError> {
    if micros <= 0 {
        return Err(ValidationError::NonPositiveLease(micros));
    }
    Ok(())
}

pub fn list_options(options: &ListMembersOptions) -> Result<(), ValidationError> {
    match options.limit {
        Some(limit) if limit <= 0 => Err(ValidationError::NonPositiveLimit(limit)),
        _ => Ok(()),
    }
}

/// All heartbeat preconditions, checked in argument order.
pub fn heartbeat(
    path: &str,
    m: &Member,
    micros: LeaseTimeoutMicros,
) -> Result<(), ValidationError> {
    group_path(path)?;
    member(m)?;
    lease_timeout(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_path_rejected() {
        assert_eq!(group_path(""), Err(ValidationError::EmptyGroupPath));
        assert!(group_path("/test/heartbeat").is_ok());
    }

    #[test]
    fn empty_member_id_rejected() {
        assert_eq!(
            member(&Member::default()),
            Err(ValidationError::EmptyMemberId)
        );
    }

    #[test]
    fn duplicate_attribute_rejected() {
        let m = Member::new("m1")
            .with_attribute("host", "a")
            .with_attribute("host", "b");
        assert!(matches!(
            member(&m),
            Err(ValidationError::DuplicateAttribute { ref key, .. }) if key == "host"
        ));
    }

    #[test]
    fn lease_must_be_positive() {
        assert_eq!(lease_timeout(0), Err(ValidationError::NonPositiveLease(0)));
        assert_eq!(lease_timeout(-5), Err(ValidationError::NonPositiveLease(-5)));
        assert!(lease_timeout(60_000_000).is_ok());
    }

    #[test]
    fn limit_must_be_positive_when_set() {
        assert!(list_options(&ListMembersOptions::default()).is_ok());
        assert!(list_options(&ListMembersOptions::with_limit(10)).is_ok());
        assert_eq!(
            list_options(&ListMembersOptions::with_limit(0)),
            Err(ValidationError::NonPositiveLimit(0))
        );
    }

    #[test]
    fn heartbeat_checks_path_first() {
        let err = heartbeat("", &Member::default(), 0).unwrap_err();
        assert_eq!(err, ValidationError::EmptyGroupPath);
    }
}
