// =============================================================================
// Paper Venue — simulated order book for dry runs
// =============================================================================
//
// No request leaves the process. Market orders fill immediately; limit and
// stop orders rest until cancelled. Every submission and cancellation is kept
// so a run can be inspected afterwards.
// =============================================================================

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::VenueError;
use crate::types::{Credentials, OrderHandle, OrderKind, OrderRequest, Session};
use crate::venue::{Authenticator, ExecutionVenue};

/// Lifecycle of a simulated order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperOrderStatus {
    Open,
    Filled,
    Cancelled,
}

/// A simulated order as recorded by the paper venue.
#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub handle: OrderHandle,
    pub request: OrderRequest,
    pub status: PaperOrderStatus,
}

#[derive(Debug, Default)]
struct Book {
    orders: Vec<PaperOrder>,
    cancellations: Vec<OrderHandle>,
}

/// In-process execution venue and authenticator.
#[derive(Debug, Default)]
pub struct PaperVenue {
    book: Mutex<Book>,
}

impl PaperVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All submitted orders in submission order.
    pub fn orders(&self) -> Vec<PaperOrder> {
        self.book.lock().orders.clone()
    }

    /// Handles of every successful cancellation, in order.
    pub fn cancellations(&self) -> Vec<OrderHandle> {
        self.book.lock().cancellations.clone()
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderHandle, VenueError> {
        if !(order.quantity.is_finite() && order.quantity > 0.0) {
            return Err(VenueError::OrderRejected(format!(
                "quantity must be positive, got {}",
                order.quantity
            )));
        }

        let handle = OrderHandle::new(format!("paper-{}", Uuid::new_v4()));
        let status = match order.kind {
            OrderKind::Market => PaperOrderStatus::Filled,
            OrderKind::Limit { .. } | OrderKind::Stop { .. } => PaperOrderStatus::Open,
        };

        info!(
            order_id = %handle,
            symbol = %order.symbol,
            side = %order.side,
            kind = %order.kind,
            quantity = order.quantity,
            ?status,
            "paper order accepted"
        );

        self.book.lock().orders.push(PaperOrder {
            handle: handle.clone(),
            request: order.clone(),
            status,
        });
        Ok(handle)
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> Result<(), VenueError> {
        let mut guard = self.book.lock();
        let book = &mut *guard;
        let order = book
            .orders
            .iter_mut()
            .find(|o| &o.handle == handle)
            .ok_or_else(|| VenueError::OrderNotFound(handle.to_string()))?;

        match order.status {
            PaperOrderStatus::Filled => Err(VenueError::AlreadyFilled(handle.to_string())),
            PaperOrderStatus::Cancelled => Err(VenueError::OrderNotFound(handle.to_string())),
            PaperOrderStatus::Open => {
                order.status = PaperOrderStatus::Cancelled;
                book.cancellations.push(handle.clone());
                info!(order_id = %handle, "paper order cancelled");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Authenticator for PaperVenue {
    async fn login(&self, credentials: &Credentials) -> Result<Session, VenueError> {
        if credentials.username.trim().is_empty() {
            return Err(VenueError::AuthenticationFailed("username is empty".into()));
        }
        info!(username = %credentials.username, "paper session opened");
        Ok(Session {
            access_token: Uuid::new_v4().to_string(),
            token_type: "Paper".into(),
            expires_in: 86_400,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn status_of(venue: &PaperVenue, handle: &OrderHandle) -> Option<PaperOrderStatus> {
        venue
            .orders()
            .into_iter()
            .find(|o| &o.handle == handle)
            .map(|o| o.status)
    }

    #[tokio::test]
    async fn market_orders_fill_and_limits_rest() {
        let venue = PaperVenue::new();
        let m = venue
            .submit_order(&OrderRequest::market("AAPL", Side::Buy, 1.0))
            .await
            .unwrap();
        let l = venue
            .submit_order(&OrderRequest::take_profit("AAPL", 1.0, 110.0))
            .await
            .unwrap();
        assert_eq!(status_of(&venue, &m), Some(PaperOrderStatus::Filled));
        assert_eq!(status_of(&venue, &l), Some(PaperOrderStatus::Open));
        assert_eq!(venue.orders().len(), 2);
    }

    #[tokio::test]
    async fn cancel_semantics() {
        let venue = PaperVenue::new();
        let filled = venue
            .submit_order(&OrderRequest::market("AAPL", Side::Buy, 1.0))
            .await
            .unwrap();
        let resting = venue
            .submit_order(&OrderRequest::stop_loss("AAPL", 1.0, 90.0))
            .await
            .unwrap();

        assert!(matches!(
            venue.cancel_order(&filled).await,
            Err(VenueError::AlreadyFilled(_))
        ));
        assert!(matches!(
            venue.cancel_order(&OrderHandle::new("nope")).await,
            Err(VenueError::OrderNotFound(_))
        ));

        venue.cancel_order(&resting).await.unwrap();
        assert_eq!(status_of(&venue, &resting), Some(PaperOrderStatus::Cancelled));
        assert_eq!(venue.cancellations(), vec![resting.clone()]);

        // A second cancel of the same order is an unknown order to the venue.
        assert!(matches!(
            venue.cancel_order(&resting).await,
            Err(VenueError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn zero_quantity_rejected() {
        let venue = PaperVenue::new();
        let err = venue
            .submit_order(&OrderRequest::market("AAPL", Side::Buy, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::OrderRejected(_)));
        assert!(venue.orders().is_empty());
    }

    #[tokio::test]
    async fn login_requires_username() {
        let venue = PaperVenue::new();
        let creds = Credentials {
            username: String::new(),
            password: "x".into(),
            mfa_code: None,
        };
        assert!(matches!(
            venue.login(&creds).await,
            Err(VenueError::AuthenticationFailed(_))
        ));
    }
}
