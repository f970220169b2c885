//! Plaintext domain records: [`User`] and the [`CreditCard`]s it owns.
//!
//! These values only exist in request-local memory. `Debug` output never
//! includes sensitive fields.

use std::fmt;

use chrono::Utc;
use common::protocol::{CreditCardView, UserView};
use thiserror::Error;
use uuid::Uuid;

use crate::store::RecordMeta;

/// Character used to mask card numbers in outward views.
pub const MASK_CHAR: char = '*';

/// Number of trailing card-number characters left visible.
pub const VISIBLE_DIGITS: usize = 4;

/// A card holder and the cards they own.
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub credit_cards: Vec<CreditCard>,
    pub meta: RecordMeta,
}

/// A payment card owned by exactly one [`User`].
#[derive(Clone)]
pub struct CreditCard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub number: String,
    pub expire_at: String,
    pub cva: String,
    pub meta: RecordMeta,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &"[REDACTED]")
            .field("credit_cards", &self.credit_cards)
            .field("meta", &self.meta)
            .finish()
    }
}

impl fmt::Debug for CreditCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreditCard")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("number", &self.censored_number())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl CreditCard {
    /// The card number with every character but the last four masked.
    pub fn censored_number(&self) -> String {
        redact(&self.number)
    }

    /// Outward view: redacted number, plaintext expiry, no CVA.
    pub fn to_view(&self) -> CreditCardView {
        CreditCardView {
            created_at: self.meta.created_at,
            number: self.censored_number(),
            expire_at: self.expire_at.clone(),
        }
    }
}

impl User {
    pub fn to_view(&self) -> UserView {
        UserView {
            id: self.id,
            name: self.name.clone(),
            credit_cards: self.credit_cards.iter().map(CreditCard::to_view).collect(),
        }
    }
}

/// Mask all but the last [`VISIBLE_DIGITS`] characters of `number`, keeping its length.
pub fn redact(number: &str) -> String {
    let len = number.chars().count();
    let masked = len.saturating_sub(VISIBLE_DIGITS);
    number
        .chars()
        .enumerate()
        .map(|(i, c)| if i < masked { MASK_CHAR } else { c })
        .collect()
}

/// Reasons a [`UserBuilder`] refuses to build.
///
/// Messages never echo the rejected value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("at least one credit card is required")]
    NoCards,

    #[error("card {0}: number must be 12 to 19 digits")]
    InvalidNumber(usize),

    #[error("card {0}: expiry must not be empty")]
    EmptyExpiry(usize),

    #[error("card {0}: cva must be 3 or 4 digits")]
    InvalidCva(usize),
}

struct PendingCard {
    number: String,
    expire_at: String,
    cva: String,
}

/// Staged construction of a [`User`] aggregate.
///
/// ```ignore
/// let user = UserBuilder::new("Alice")
///     .add_card("4000000000000002", "03/25", "123")
///     .build()?;
/// ```
pub struct UserBuilder {
    name: String,
    cards: Vec<PendingCard>,
}

impl UserBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cards: Vec::new(),
        }
    }

    pub fn add_card(
        mut self,
        number: impl Into<String>,
        expire_at: impl Into<String>,
        cva: impl Into<String>,
    ) -> Self {
        self.cards.push(PendingCard {
            number: number.into(),
            expire_at: expire_at.into(),
            cva: cva.into(),
        });
        self
    }

    /// Validate the accumulated values and assign fresh identifiers.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, checking the name first
    /// and then each card in insertion order.
    pub fn build(self) -> Result<User, ValidationError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.cards.is_empty() {
            return Err(ValidationError::NoCards);
        }

        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let mut credit_cards = Vec::with_capacity(self.cards.len());
        for (idx, card) in self.cards.into_iter().enumerate() {
            if !is_digits(&card.number, 12..=19) {
                return Err(ValidationError::InvalidNumber(idx));
            }
            if card.expire_at.trim().is_empty() {
                return Err(ValidationError::EmptyExpiry(idx));
            }
            if !is_digits(&card.cva, 3..=4) {
                return Err(ValidationError::InvalidCva(idx));
            }
            credit_cards.push(CreditCard {
                id: Uuid::new_v4(),
                user_id,
                number: card.number,
                expire_at: card.expire_at.trim().to_owned(),
                cva: card.cva,
                meta: RecordMeta::new(now),
            });
        }

        Ok(User {
            id: user_id,
            name,
            credit_cards,
            meta: RecordMeta::new(now),
        })
    }
}

fn is_digits(value: &str, len: std::ops::RangeInclusive<usize>) -> bool {
    len.contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_all_but_last_four() {
        assert_eq!(redact("4111111111111111"), "************1111");
        assert_eq!(redact("4000000000000002"), "************0002");
    }

    #[test]
    fn redact_keeps_short_values() {
        assert_eq!(redact("1234"), "1234");
        assert_eq!(redact("12"), "12");
        assert_eq!(redact(""), "");
    }

    #[test]
    fn builder_assigns_ids_and_owner() {
        let user = UserBuilder::new("Alice")
            .add_card("4000000000000002", "03/25", "123")
            .add_card("5500000000000004", "10/22", "432")
            .build()
            .unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.credit_cards.len(), 2);
        assert!(user.credit_cards.iter().all(|c| c.user_id == user.id));
        assert_ne!(user.credit_cards[0].id, user.credit_cards[1].id);
        assert_ne!(user.credit_cards[0].id, user.id);
    }

    #[test]
    fn builder_requires_a_card() {
        let err = UserBuilder::new("Alice").build().unwrap_err();
        assert_eq!(err, ValidationError::NoCards);
    }

    #[test]
    fn builder_rejects_blank_name() {
        let err = UserBuilder::new("   ")
            .add_card("4000000000000002", "03/25", "123")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyName);
    }

    #[test]
    fn builder_rejects_bad_number_without_echoing_it() {
        let err = UserBuilder::new("Alice")
            .add_card("4000-0000-0000-0002", "03/25", "123")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidNumber(0));
        assert!(!err.to_string().contains("4000"));
    }

    #[test]
    fn builder_rejects_bad_cva() {
        let err = UserBuilder::new("Alice")
            .add_card("4000000000000002", "03/25", "12")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidCva(0));
    }

    #[test]
    fn view_redacts_number_and_omits_cva() {
        let user = UserBuilder::new("Alice")
            .add_card("4000000000000002", "03/25", "123")
            .build()
            .unwrap();
        let view = serde_json::to_value(user.to_view()).unwrap();
        assert_eq!(view["name"], "Alice");
        assert_eq!(view["credit_cards"][0]["number"], "************0002");
        assert_eq!(view["credit_cards"][0]["expire_at"], "03/25");
        assert!(view["credit_cards"][0].get("cva").is_none());
    }

    #[test]
    fn debug_hides_sensitive_fields() {
        let user = UserBuilder::new("Alice")
            .add_card("4000000000000002", "03/25", "123")
            .build()
            .unwrap();
        let dbg = format!("{user:?}");
        assert!(!dbg.contains("Alice"));
        assert!(!dbg.contains("4000000000000002"));
        assert!(dbg.contains("************0002"));
    }
}
