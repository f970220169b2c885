//! [`FieldCodec`]: translation between plaintext records and encrypted rows.
//!
//! Every sensitive field is bound to the id of the record that directly owns
//! it. A card's fields use the card id, never the owning user's id, so a
//! ciphertext copied onto any other row fails authentication.

use thiserror::Error;
use uuid::Uuid;

use super::model::{CreditCard, User};
use crate::crypto::{CryptoError, FieldCipher};
use crate::store::{CardRow, StoredUser, UserRow};

/// A sensitive field of a specific record could not be sealed or opened.
#[derive(Debug, Error)]
#[error("{field} of record {record}: {source}")]
pub struct CodecError {
    pub record: Uuid,
    pub field: &'static str,
    #[source]
    pub source: CryptoError,
}

/// Associated data for every sensitive field of the record `id`: its
/// hyphenated, lowercase textual form.
pub fn associated_data(id: &Uuid) -> String {
    id.hyphenated().to_string()
}

/// Encrypts records before they are written and decrypts them after they are read.
#[derive(Clone)]
pub struct FieldCodec {
    cipher: FieldCipher,
}

impl FieldCodec {
    pub fn new(cipher: FieldCipher) -> Self {
        Self { cipher }
    }

    /// Seal the user's name and every card field.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] naming the first field that failed.
    pub fn encrypt_user(&self, user: &User) -> Result<StoredUser, CodecError> {
        let aad = associated_data(&user.id);
        let name = self.seal(user.id, "name", &user.name, &aad)?;
        let cards = user
            .credit_cards
            .iter()
            .map(|card| self.encrypt_card(card))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StoredUser {
            user: UserRow {
                id: user.id,
                name,
                meta: user.meta.clone(),
            },
            cards,
        })
    }

    /// Open every sensitive field of `stored`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] naming the first field that failed; no
    /// partially decrypted record is ever produced.
    pub async fn decrypt_user(&self, stored: StoredUser) -> Result<User, CodecError> {
        let StoredUser { user, cards } = stored;
        let aad = associated_data(&user.id);
        let name = self.open(user.id, "name", &user.name, &aad).await?;

        let mut credit_cards = Vec::with_capacity(cards.len());
        for card in cards {
            credit_cards.push(self.decrypt_card(card).await?);
        }

        Ok(User {
            id: user.id,
            name,
            credit_cards,
            meta: user.meta,
        })
    }

    fn encrypt_card(&self, card: &CreditCard) -> Result<CardRow, CodecError> {
        let aad = associated_data(&card.id);
        Ok(CardRow {
            id: card.id,
            user_id: card.user_id,
            number: self.seal(card.id, "number", &card.number, &aad)?,
            expire_at: self.seal(card.id, "expire_at", &card.expire_at, &aad)?,
            cva: self.seal(card.id, "cva", &card.cva, &aad)?,
            meta: card.meta.clone(),
        })
    }

    async fn decrypt_card(&self, row: CardRow) -> Result<CreditCard, CodecError> {
        let aad = associated_data(&row.id);
        Ok(CreditCard {
            id: row.id,
            user_id: row.user_id,
            number: self.open(row.id, "number", &row.number, &aad).await?,
            expire_at: self.open(row.id, "expire_at", &row.expire_at, &aad).await?,
            cva: self.open(row.id, "cva", &row.cva, &aad).await?,
            meta: row.meta,
        })
    }

    fn seal(
        &self,
        record: Uuid,
        field: &'static str,
        plaintext: &str,
        aad: &str,
    ) -> Result<String, CodecError> {
        self.cipher
            .encrypt(plaintext.as_bytes(), aad.as_bytes())
            .map_err(|source| CodecError {
                record,
                field,
                source,
            })
    }

    async fn open(
        &self,
        record: Uuid,
        field: &'static str,
        encoded: &str,
        aad: &str,
    ) -> Result<String, CodecError> {
        let fail = |source| CodecError {
            record,
            field,
            source,
        };
        let bytes = self
            .cipher
            .decrypt(encoded, aad.as_bytes())
            .await
            .map_err(fail)?;
        // Only valid UTF-8 is ever sealed; anything else means corruption.
        String::from_utf8(bytes).map_err(|_| fail(CryptoError::DecodingFailure))
    }
}
