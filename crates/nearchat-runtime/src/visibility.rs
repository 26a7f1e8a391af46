//! Visibility queries for `refresh`

use nearchat_core::{distance, ProximityPolicy, VisibleUser};

use crate::managers::ConnectionRegistry;

/// Users within range of `username`, never including `username` itself.
///
/// Computed from a registry snapshot on every call; an unregistered
/// requester sees nobody.
pub fn visible_users(
    registry: &ConnectionRegistry,
    proximity: ProximityPolicy,
    username: &str,
) -> Vec<VisibleUser> {
    let Some(requester) = registry.lookup(username) else {
        return Vec::new();
    };

    registry
        .snapshot()
        .into_iter()
        .filter(|session| session.username != requester.username)
        .filter(|session| proximity.within_range(requester.location, session.location))
        .map(|session| {
            let d = distance(requester.location, session.location);
            VisibleUser::new(session.username, d)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::ConnectionHandle;
    use nearchat_core::Coordinates;

    async fn create_test_registry(users: &[(&str, f64, f64)]) -> ConnectionRegistry {
        let registry = ConnectionRegistry::new();
        for (name, lat, lon) in users {
            let (_client, server) = tokio::io::duplex(64);
            registry
                .register(name, Coordinates::new(*lat, *lon).unwrap(), ConnectionHandle::new(server))
                .await;
        }
        registry
    }

    #[tokio::test]
    async fn test_visible_users_excludes_self_and_far_users() {
        let registry = create_test_registry(&[
            ("alice", 0.0, 0.0),
            ("bob", 100.0, 0.0),
            ("carol", 1000.0, 0.0),
            ("dave", 120.0, 160.0),
        ])
        .await;

        let visible = visible_users(&registry, ProximityPolicy::default(), "alice");
        assert_eq!(
            visible,
            vec![VisibleUser::new("bob", 100.0), VisibleUser::new("dave", 200.0)]
        );
        assert!(visible.iter().all(|u| u.username != "alice"));
    }

    #[tokio::test]
    async fn test_unregistered_requester_sees_nobody() {
        let registry = create_test_registry(&[("alice", 0.0, 0.0)]).await;
        assert!(visible_users(&registry, ProximityPolicy::default(), "zed").is_empty());
    }

    #[tokio::test]
    async fn test_distances_are_whole_units() {
        let registry = create_test_registry(&[("alice", 0.0, 0.0), ("bob", 100.0, 100.0)]).await;
        let visible = visible_users(&registry, ProximityPolicy::default(), "alice");
        assert_eq!(visible[0].distance, 141);
    }
}
