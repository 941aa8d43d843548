use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use tracing::info;

use crate::{db::User, error::SocialError, realtime::pm_room_for};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Friend {
    pub id: i64,
    pub username: String,
    /// Private room shared with this friend.
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct IncomingRequest {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Accept,
    Decline,
}

/// Friend requests and friendships between registered users.
#[derive(Debug, Clone)]
pub struct SocialGraph {
    db_pool: SqlitePool,
}

impl SocialGraph {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// The room two friends chat in. Same name the realtime core uses.
    pub fn private_room(me: &User, friend_id: i64) -> String {
        pm_room_for(me.id, friend_id)
    }

    pub async fn friends(&self, me: &User) -> Result<Vec<Friend>, SocialError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT u.id,u.username FROM friendships f JOIN users u ON u.id=f.friend_id
             WHERE f.user_id=? ORDER BY u.username",
        )
        .bind(me.id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, username)| Friend { id, username, room: Self::private_room(me, id) })
            .collect())
    }

    pub async fn are_friends(&self, a: i64, b: i64) -> Result<bool, SocialError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM friendships WHERE user_id=? AND friend_id=?")
            .bind(a)
            .bind(b)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.is_some())
    }

    /// Sends `me`'s request to `target`, who has to accept it.
    /// A previously declined request is reopened.
    pub async fn send_request(&self, me: &User, target: &str) -> Result<i64, SocialError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(SocialError::TargetRequired);
        }
        if target == me.username {
            return Err(SocialError::SelfRequest);
        }

        let Some((other_id,)): Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username=?")
            .bind(target)
            .fetch_optional(&self.db_pool)
            .await?
        else {
            return Err(SocialError::UnknownUser(target.to_owned()));
        };

        if self.are_friends(me.id, other_id).await? {
            return Err(SocialError::AlreadyFriends(target.to_owned()));
        }

        let pending: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM friend_requests WHERE requester_id=? AND recipient_id=? AND status='pending'",
        )
        .bind(me.id)
        .bind(other_id)
        .fetch_optional(&self.db_pool)
        .await?;
        if pending.is_some() {
            return Err(SocialError::AlreadyPending);
        }

        let (request_id,): (i64,) = sqlx::query_as(
            "INSERT INTO friend_requests (requester_id,recipient_id,status,created_at) VALUES (?,?,'pending',?)
             ON CONFLICT (requester_id,recipient_id) DO UPDATE SET status='pending', created_at=excluded.created_at
             RETURNING id",
        )
        .bind(me.id)
        .bind(other_id)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.db_pool)
        .await?;

        info!(request_id, from = %me.username, to = target, "friend request sent");
        Ok(request_id)
    }

    /// Pending requests addressed to `me`, oldest first.
    pub async fn incoming(&self, me: &User) -> Result<Vec<IncomingRequest>, SocialError> {
        let requests = sqlx::query_as(
            "SELECT r.id,u.username FROM friend_requests r JOIN users u ON u.id=r.requester_id
             WHERE r.recipient_id=? AND r.status='pending' ORDER BY r.created_at, r.id",
        )
        .bind(me.id)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(requests)
    }

    /// Only the recipient may answer. Accepting makes the friendship mutual.
    pub async fn respond(&self, me: &User, request_id: i64, answer: Answer) -> Result<(), SocialError> {
        let mut tx = self.db_pool.begin().await?;

        let request: Option<(i64, i64)> =
            sqlx::query_as("SELECT requester_id,recipient_id FROM friend_requests WHERE id=?")
                .bind(request_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((requester_id, recipient_id)) = request else {
            return Err(SocialError::RequestNotFound);
        };
        if recipient_id != me.id {
            return Err(SocialError::RequestNotFound);
        }

        let status = match answer {
            Answer::Accept => {
                sqlx::query("INSERT OR IGNORE INTO friendships (user_id,friend_id) VALUES (?,?),(?,?)")
                    .bind(me.id)
                    .bind(requester_id)
                    .bind(requester_id)
                    .bind(me.id)
                    .execute(&mut *tx)
                    .await?;
                "accepted"
            }
            Answer::Decline => "declined",
        };

        sqlx::query("UPDATE friend_requests SET status=? WHERE id=?")
            .bind(status)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(request_id, by = %me.username, status, "friend request answered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{accounts::AccountStore, db};

    async fn setup() -> (SocialGraph, User, User) {
        let db_pool = db::in_memory().await.unwrap();
        let accounts = AccountStore::new(db_pool.clone());
        let alice = accounts.create("alice", "x").await.unwrap();
        let bob = accounts.create("bob", "x").await.unwrap();
        (SocialGraph::new(db_pool), alice, bob)
    }

    #[tokio::test]
    async fn accepted_request_creates_mutual_friendship() {
        let (social, alice, bob) = setup().await;

        let request_id = social.send_request(&alice, "bob").await.unwrap();
        assert_eq!(
            social.incoming(&bob).await.unwrap(),
            vec![IncomingRequest { id: request_id, username: "alice".into() }]
        );
        assert!(social.incoming(&alice).await.unwrap().is_empty());

        social.respond(&bob, request_id, Answer::Accept).await.unwrap();

        let alice_friends = social.friends(&alice).await.unwrap();
        let bob_friends = social.friends(&bob).await.unwrap();
        assert_eq!(alice_friends, vec![Friend { id: bob.id, username: "bob".into(), room: "pm:1:2".into() }]);
        assert_eq!(bob_friends, vec![Friend { id: alice.id, username: "alice".into(), room: "pm:1:2".into() }]);
        assert!(social.incoming(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_request_rejects_bad_targets() {
        let (social, alice, bob) = setup().await;

        assert!(matches!(social.send_request(&alice, " ").await, Err(SocialError::TargetRequired)));
        assert!(matches!(social.send_request(&alice, "alice").await, Err(SocialError::SelfRequest)));
        assert!(matches!(social.send_request(&alice, "carol").await, Err(SocialError::UnknownUser(_))));

        let request_id = social.send_request(&alice, "bob").await.unwrap();
        assert!(matches!(social.send_request(&alice, "bob").await, Err(SocialError::AlreadyPending)));

        social.respond(&bob, request_id, Answer::Accept).await.unwrap();
        assert!(matches!(social.send_request(&alice, "bob").await, Err(SocialError::AlreadyFriends(_))));
        assert!(matches!(social.send_request(&bob, "alice").await, Err(SocialError::AlreadyFriends(_))));
    }

    #[tokio::test]
    async fn only_the_recipient_can_answer() {
        let (social, alice, bob) = setup().await;
        let request_id = social.send_request(&alice, "bob").await.unwrap();

        assert!(matches!(
            social.respond(&alice, request_id, Answer::Accept).await,
            Err(SocialError::RequestNotFound)
        ));
        assert!(matches!(
            social.respond(&bob, request_id + 100, Answer::Accept).await,
            Err(SocialError::RequestNotFound)
        ));
        assert!(social.friends(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn declined_request_can_be_sent_again() {
        let (social, alice, bob) = setup().await;
        let request_id = social.send_request(&alice, "bob").await.unwrap();
        social.respond(&bob, request_id, Answer::Decline).await.unwrap();

        assert!(social.incoming(&bob).await.unwrap().is_empty());
        assert!(social.friends(&bob).await.unwrap().is_empty());

        let again = social.send_request(&alice, "bob").await.unwrap();
        assert_eq!(again, request_id);
        assert_eq!(social.incoming(&bob).await.unwrap().len(), 1);
    }
}
