use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A registered account. `password` holds an argon2 PHC string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum PollStatus {
    Open,
    Closed,
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollStatus::Open => f.write_str("Open"),
            PollStatus::Closed => f.write_str("Closed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Question {
    /// Published within the last day, future questions excluded.
    pub fn was_published_recently_at(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.pub_date && self.pub_date <= now
    }

    pub fn was_published_recently(&self) -> bool {
        self.was_published_recently_at(Utc::now())
    }

    pub fn is_published_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.pub_date
    }

    pub fn is_published(&self) -> bool {
        self.is_published_at(Utc::now())
    }

    /// Voting window is `[pub_date, end_date]`, open-ended when there is no end date.
    pub fn can_vote_at(&self, now: DateTime<Utc>) -> bool {
        match self.end_date {
            None => now >= self.pub_date,
            Some(end) => self.pub_date <= now && now <= end,
        }
    }

    pub fn can_vote(&self) -> bool {
        self.can_vote_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> PollStatus {
        if self.can_vote_at(now) {
            PollStatus::Open
        } else {
            PollStatus::Closed
        }
    }

    pub fn status(&self) -> PollStatus {
        self.status_at(Utc::now())
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.question_text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.choice_text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: i64,
    pub user_id: i64,
    pub choice_id: i64,
    pub question_id: i64,
}

/// A choice together with the number of votes it received.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChoiceTally {
    #[serde(flatten)]
    pub choice: Choice,
    pub votes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Created,
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn question(pub_offset: Duration, end_offset: Option<Duration>, now: DateTime<Utc>) -> Question {
        Question {
            id: 1,
            question_text: "q".to_string(),
            pub_date: now + pub_offset,
            end_date: end_offset.map(|d| now + d),
        }
    }

    #[rstest]
    #[case::future(Duration::days(30), false)]
    #[case::older_than_a_day(-(Duration::days(1) + Duration::seconds(1)), false)]
    #[case::within_a_day(-(Duration::hours(23) + Duration::minutes(59) + Duration::seconds(59)), true)]
    fn published_recently(#[case] offset: Duration, #[case] expected: bool) {
        let now = Utc::now();
        assert_eq!(question(offset, None, now).was_published_recently_at(now), expected);
    }

    #[rstest]
    #[case::future(Duration::days(5), false)]
    #[case::now(Duration::zero(), true)]
    #[case::past(-Duration::days(30), true)]
    fn published(#[case] offset: Duration, #[case] expected: bool) {
        let now = Utc::now();
        assert_eq!(question(offset, None, now).is_published_at(now), expected);
    }

    #[rstest]
    #[case::past_no_end(-Duration::days(5), None, true)]
    #[case::future_no_end(Duration::days(5), None, false)]
    #[case::inside_window(-Duration::days(5), Some(Duration::days(5)), true)]
    #[case::after_end(-Duration::days(10), Some(-Duration::days(5)), false)]
    #[case::at_publication(Duration::zero(), None, true)]
    #[case::at_end(-Duration::days(1), Some(Duration::zero()), true)]
    #[case::just_after_end(-Duration::days(1), Some(-Duration::seconds(1)), false)]
    #[case::future_window(Duration::days(5), Some(Duration::days(10)), false)]
    fn voting_window(
        #[case] pub_offset: Duration,
        #[case] end_offset: Option<Duration>,
        #[case] expected: bool,
    ) {
        let now = Utc::now();
        let q = question(pub_offset, end_offset, now);
        assert_eq!(q.can_vote_at(now), expected);
        let status = if expected { PollStatus::Open } else { PollStatus::Closed };
        assert_eq!(q.status_at(now), status);
    }
}
