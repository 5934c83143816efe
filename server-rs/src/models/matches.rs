use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Match {
    pub id: Uuid,
    pub title: String,
    pub location: Option<String>,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    pub capacity: i32,
    pub taken: i32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Participant {
    #[serde(rename = "matchId")]
    pub match_id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(rename = "joinedAt")]
    pub joined_at: DateTime<Utc>,
}

/// Outcome of a capacity-checked join decision against a match snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    AlreadyMember,
    Admitted,
    Full,
}

/// Outcome of a leave decision against a match snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    NotMember,
    Released,
}

impl Match {
    pub fn is_full(&self) -> bool {
        self.taken >= self.capacity
    }

    /// Decide a join. Must be evaluated while the match record is locked so
    /// that `taken` cannot move between the check and the write.
    pub fn admit(&self, already_member: bool) -> Admission {
        if already_member {
            Admission::AlreadyMember
        } else if self.is_full() {
            Admission::Full
        } else {
            Admission::Admitted
        }
    }

    /// Decide a leave. Same locking requirement as [`Match::admit`].
    pub fn release(&self, is_member: bool) -> Release {
        if is_member {
            Release::Released
        } else {
            Release::NotMember
        }
    }
}

/// Roster order: earliest join first; join timestamps can collide at second
/// resolution, so ties break on user id.
pub fn order_roster(rows: &mut [Participant]) {
    rows.sort_by(|a, b| {
        a.joined_at
            .cmp(&b.joined_at)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
}

#[derive(Debug, Clone)]
pub struct NewMatch {
    pub title: String,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub capacity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateMatchRequest {
    pub title: String,
    pub location: Option<String>,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    pub capacity: i32,
}

impl From<CreateMatchRequest> for NewMatch {
    fn from(req: CreateMatchRequest) -> Self {
        NewMatch {
            title: req.title,
            location: req.location,
            starts_at: req.starts_at,
            capacity: req.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_with(taken: i32, capacity: i32) -> Match {
        Match {
            id: Uuid::new_v4(),
            title: "Tuesday five-a-side".to_string(),
            location: None,
            starts_at: Utc::now(),
            capacity,
            taken,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn admits_until_capacity() {
        assert_eq!(match_with(0, 2).admit(false), Admission::Admitted);
        assert_eq!(match_with(1, 2).admit(false), Admission::Admitted);
        assert_eq!(match_with(2, 2).admit(false), Admission::Full);
    }

    #[test]
    fn existing_member_is_admitted_even_when_full() {
        assert_eq!(match_with(2, 2).admit(true), Admission::AlreadyMember);
    }

    #[test]
    fn release_is_a_noop_for_non_members() {
        assert_eq!(match_with(1, 2).release(false), Release::NotMember);
        assert_eq!(match_with(1, 2).release(true), Release::Released);
    }

    #[test]
    fn roster_orders_by_join_time_then_user_id() {
        let mid = Uuid::new_v4();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);
        let low = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let high = Uuid::parse_str("ffffffff-ffff-ffff-ffff-ffffffffffff").unwrap();
        let mid_id = Uuid::parse_str("88888888-8888-8888-8888-888888888888").unwrap();

        let mut rows = vec![
            Participant {
                match_id: mid,
                user_id: high,
                joined_at: t0,
            },
            Participant {
                match_id: mid,
                user_id: mid_id,
                joined_at: t1,
            },
            Participant {
                match_id: mid,
                user_id: low,
                joined_at: t0,
            },
        ];
        order_roster(&mut rows);

        let ids: Vec<Uuid> = rows.iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![low, high, mid_id]);
    }
}
