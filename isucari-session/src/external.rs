//! Client side of the payment service, as the browser would call it.

use crate::session::{check_status, decode, join, transport_error, Session};
use crate::types::{CardRequest, CardResponse};
use isucari_core::constants::{CORRECT_CARD_NUMBER, FAILED_CARD_NUMBER, PAYMENT_SHOP_ID};
use isucari_core::Result;
use reqwest::header::{CONTENT_TYPE, ORIGIN};
use reqwest::StatusCode;

impl Session {
    /// `POST /card` on the payment service; returns the card token.
    ///
    /// # Errors
    /// Returns an application failure unless the service answers 200.
    pub async fn payment_card(&self, card_number: &str, shop_id: &str) -> Result<String> {
        let label = "[payment service] POST /card";
        let body = serde_json::to_vec(&CardRequest { card_number, shop_id })?;
        let request = self
            .client()
            .post(join(self.urls().payment_url.as_str(), "/card"))
            .header(CONTENT_TYPE, "application/json")
            .header(ORIGIN, "http://localhost:8000")
            .body(body);
        let response = request.send().await.map_err(|e| transport_error(label, &e))?;
        let response = check_status(label, response, StatusCode::OK).await?;
        let card: CardResponse = decode(label, response).await?;
        Ok(card.token)
    }

    /// Token for the card that always succeeds.
    ///
    /// # Errors
    /// See [`Session::payment_card`].
    pub async fn valid_card_token(&self) -> Result<String> {
        self.payment_card(CORRECT_CARD_NUMBER, PAYMENT_SHOP_ID).await
    }

    /// Token for the card that is always declined.
    ///
    /// # Errors
    /// See [`Session::payment_card`].
    pub async fn failing_card_token(&self) -> Result<String> {
        self.payment_card(FAILED_CARD_NUMBER, PAYMENT_SHOP_ID).await
    }
}
