//! Poll tallying and single-choice voting.
//!
//! Options hold independent voter lists, so nothing in the data stops a
//! user from appearing under two options. [`vote`] keeps that from
//! happening: a user is cleared from every other option before being added,
//! and never added twice.

use crate::domain::models::{OptionTally, Poll, PollOption};
use crate::error::{ServiceError, ServiceResult};
use identity_core::UserId;
use std::collections::HashSet;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;

impl Poll {
    /// Build a poll with ids `option_1..option_n`.
    ///
    /// Question and option texts are trimmed; blank or duplicate texts and
    /// an option count outside 2..=4 are rejected.
    pub fn new<I, S>(question: &str, options: I) -> ServiceResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::InvalidInput(
                "poll question must not be empty".to_string(),
            ));
        }

        let texts: Vec<String> = options
            .into_iter()
            .map(|text| text.as_ref().trim().to_string())
            .collect();
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&texts.len()) {
            return Err(ServiceError::InvalidInput(format!(
                "a poll needs {MIN_OPTIONS} to {MAX_OPTIONS} options, got {}",
                texts.len()
            )));
        }

        let mut seen = HashSet::new();
        for text in &texts {
            if text.is_empty() {
                return Err(ServiceError::InvalidInput(
                    "poll options must not be empty".to_string(),
                ));
            }
            if !seen.insert(text.to_lowercase()) {
                return Err(ServiceError::InvalidInput(format!(
                    "duplicate poll option {text:?}"
                )));
            }
        }

        let options = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| PollOption {
                id: format!("option_{}", index + 1),
                text,
                voters: Vec::new(),
            })
            .collect();

        Ok(Self {
            question: question.to_string(),
            options,
        })
    }

    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }
}

pub fn total_votes(poll: &Poll) -> usize {
    poll.options.iter().map(|option| option.voters.len()).sum()
}

/// The option whose voters include `user`, scanning in option order
pub fn user_choice<'a>(poll: &'a Poll, user: &UserId) -> Option<&'a str> {
    poll.options
        .iter()
        .find(|option| option.voters.contains(user))
        .map(|option| option.id.as_str())
}

/// Share of all votes in `poll` held by `option`, in 0..=100.
/// Zero when nobody has voted.
pub fn percentage(option: &PollOption, poll: &Poll) -> f64 {
    let total = total_votes(poll);
    if total == 0 {
        return 0.0;
    }
    100.0 * option.voters.len() as f64 / total as f64
}

pub fn tally(poll: &Poll) -> Vec<OptionTally> {
    poll.options
        .iter()
        .map(|option| OptionTally {
            option_id: option.id.clone(),
            text: option.text.clone(),
            votes: option.voters.len(),
            percentage: percentage(option, poll),
        })
        .collect()
}

/// Record `voter`'s choice of `option_id`.
///
/// Returns whether the poll changed; voting again for the current choice is
/// a no-op.
pub fn vote(poll: &mut Poll, option_id: &str, voter: Option<&UserId>) -> ServiceResult<bool> {
    let voter = voter.ok_or(ServiceError::Unauthenticated)?;
    if poll.option(option_id).is_none() {
        return Err(ServiceError::InvalidInput(format!(
            "unknown poll option {option_id:?}"
        )));
    }

    let mut changed = false;
    for option in &mut poll.options {
        if option.id == option_id {
            if !option.voters.contains(voter) {
                option.voters.push(voter.clone());
                changed = true;
            }
        } else {
            let before = option.voters.len();
            option.voters.retain(|existing| existing != voter);
            changed |= option.voters.len() != before;
        }
    }

    Ok(changed)
}

/// Remove `voter` from every option. Returns whether anything was removed.
pub fn retract_vote(poll: &mut Poll, voter: Option<&UserId>) -> ServiceResult<bool> {
    let voter = voter.ok_or(ServiceError::Unauthenticated)?;

    let mut changed = false;
    for option in &mut poll.options {
        let before = option.voters.len();
        option.voters.retain(|existing| existing != voter);
        changed |= option.voters.len() != before;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn two_option_poll() -> Poll {
        Poll {
            question: "Tabs or spaces?".to_string(),
            options: vec![
                PollOption {
                    id: "A".to_string(),
                    text: "Tabs".to_string(),
                    voters: Vec::new(),
                },
                PollOption {
                    id: "B".to_string(),
                    text: "Spaces".to_string(),
                    voters: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn test_empty_poll_is_all_zero() {
        let poll = two_option_poll();

        assert_eq!(total_votes(&poll), 0);
        for option in &poll.options {
            assert_eq!(percentage(option, &poll), 0.0);
        }
    }

    #[test]
    fn test_first_vote_takes_everything() {
        let mut poll = two_option_poll();
        assert!(vote(&mut poll, "A", Some(&uid("u1"))).unwrap());

        assert_eq!(total_votes(&poll), 1);
        assert_eq!(percentage(&poll.options[0], &poll), 100.0);
        assert_eq!(percentage(&poll.options[1], &poll), 0.0);
        assert_eq!(user_choice(&poll, &uid("u1")), Some("A"));
    }

    #[test]
    fn test_revote_moves_the_vote() {
        let mut poll = two_option_poll();
        vote(&mut poll, "A", Some(&uid("u1"))).unwrap();
        vote(&mut poll, "B", Some(&uid("u1"))).unwrap();

        assert_eq!(user_choice(&poll, &uid("u1")), Some("B"));
        assert!(!poll.options[0].voters.contains(&uid("u1")));
        assert_eq!(total_votes(&poll), 1);
    }

    #[test]
    fn test_double_submit_is_noop() {
        let mut poll = two_option_poll();
        vote(&mut poll, "A", Some(&uid("u1"))).unwrap();

        assert!(!vote(&mut poll, "A", Some(&uid("u1"))).unwrap());
        assert_eq!(poll.options[0].voters, vec![uid("u1")]);
    }

    #[test]
    fn test_vote_clears_corrupted_duplicates() {
        let mut poll = two_option_poll();
        poll.options[0].voters.push(uid("u1"));
        poll.options[1].voters.push(uid("u1"));

        assert!(vote(&mut poll, "B", Some(&uid("u1"))).unwrap());
        assert!(poll.options[0].voters.is_empty());
        assert_eq!(total_votes(&poll), 1);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let mut poll = Poll::new("Pick one", ["a", "b", "c"]).unwrap();
        for (user, option) in [("u1", "option_1"), ("u2", "option_2"), ("u3", "option_2")] {
            vote(&mut poll, option, Some(&uid(user))).unwrap();
        }

        let sum: f64 = tally(&poll).iter().map(|t| t.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert_eq!(tally(&poll)[1].votes, 2);
    }

    #[test]
    fn test_vote_requires_viewer_and_known_option() {
        let mut poll = two_option_poll();

        assert!(matches!(
            vote(&mut poll, "A", None),
            Err(ServiceError::Unauthenticated)
        ));
        assert!(matches!(
            vote(&mut poll, "Z", Some(&uid("u1"))),
            Err(ServiceError::InvalidInput(_))
        ));
        assert_eq!(total_votes(&poll), 0);
    }

    #[test]
    fn test_retract_vote() {
        let mut poll = two_option_poll();
        vote(&mut poll, "A", Some(&uid("u1"))).unwrap();

        assert!(retract_vote(&mut poll, Some(&uid("u1"))).unwrap());
        assert!(!retract_vote(&mut poll, Some(&uid("u1"))).unwrap());
        assert_eq!(user_choice(&poll, &uid("u1")), None);
    }

    #[test]
    fn test_poll_new_validation() {
        let poll = Poll::new("  Lunch? ", [" Pizza", "Sushi "]).unwrap();
        assert_eq!(poll.question, "Lunch?");
        assert_eq!(poll.options[1].id, "option_2");
        assert_eq!(poll.options[1].text, "Sushi");

        assert!(Poll::new("", ["a", "b"]).is_err());
        assert!(Poll::new("Q", ["only"]).is_err());
        assert!(Poll::new("Q", ["a", "b", "c", "d", "e"]).is_err());
        assert!(Poll::new("Q", ["a", " "]).is_err());
        assert!(Poll::new("Q", ["Same", "same"]).is_err());
    }
}
