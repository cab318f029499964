use crate::{
    balance::AccountSnapshot,
    error::ExecutionError,
    order::{Fill, Order, OrderId},
};
use async_trait::async_trait;
use kestrel_data::Symbol;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Interface every execution venue implements. Real connectors live outside
/// the engine core; the engine ships only the mock.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Submit an order; resolves to the acknowledged order (id assigned).
    async fn open_order(&self, order: Order) -> Result<Order, ExecutionError>;

    /// Cancel one working order by id.
    async fn cancel_order(&self, id: &OrderId) -> Result<(), ExecutionError>;

    /// Cancel every working order, optionally scoped to one symbol.
    async fn cancel_all(&self, symbol: Option<&Symbol>) -> Result<Vec<OrderId>, ExecutionError>;

    /// Fetch the current account snapshot.
    async fn account_snapshot(&self) -> Result<AccountSnapshot, ExecutionError>;

    /// Remaining rate-limit tokens, so the executor can pace submissions.
    fn rate_limit_tokens(&self) -> u32;
}

/// Scripted behaviour for the next [`MockExecutionClient`] submission.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Acknowledge and immediately fill with the given fills.
    FillWith(Vec<Fill>),
    /// Acknowledge; order rests (no fills).
    Ack,
    /// Fail with the given error.
    Fail(ExecutionError),
}

/// In-process mock venue. Tests and backtests script responses; the mock
/// records every submission and cancel for assertions.
#[derive(Debug, Clone)]
pub struct MockExecutionClient {
    state: Arc<Mutex<MockState>>,
    snapshot: Arc<Mutex<Option<AccountSnapshot>>>,
}

#[derive(Debug, Default)]
struct MockState {
    responses: VecDeque<MockResponse>,
    cancel_failure: Option<ExecutionError>,
    submitted: Vec<Order>,
    cancelled: Vec<OrderId>,
    working: Vec<Order>,
    next_id: u64,
}

impl Default for MockExecutionClient {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            snapshot: Arc::new(Mutex::new(None)),
        }
    }
}

impl MockExecutionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response for the next submission. Without a scripted
    /// response the mock acknowledges.
    pub fn script(&self, response: MockResponse) {
        self.state.lock().responses.push_back(response);
    }

    /// Fail the next cancel call with the given error.
    pub fn fail_next_cancel(&self, error: ExecutionError) {
        self.state.lock().cancel_failure = Some(error);
    }

    pub fn set_snapshot(&self, snapshot: AccountSnapshot) {
        *self.snapshot.lock() = Some(snapshot);
    }

    pub fn submitted(&self) -> Vec<Order> {
        self.state.lock().submitted.clone()
    }

    pub fn cancelled(&self) -> Vec<OrderId> {
        self.state.lock().cancelled.clone()
    }

    pub fn working(&self) -> Vec<Order> {
        self.state.lock().working.clone()
    }
}

#[async_trait]
impl ExecutionClient for MockExecutionClient {
    async fn open_order(&self, mut order: Order) -> Result<Order, ExecutionError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        order.id = OrderId::new(format!("mock-{}", state.next_id));

        let response = state.responses.pop_front().unwrap_or(MockResponse::Ack);
        match response {
            MockResponse::Fail(error) => {
                state.submitted.push(order);
                Err(error)
            }
            MockResponse::Ack => {
                state.submitted.push(order.clone());
                state.working.push(order.clone());
                Ok(order)
            }
            MockResponse::FillWith(fills) => {
                for fill in &fills {
                    let mut fill = fill.clone();
                    fill.order_id = order.id.clone();
                    order.apply_fill(&fill)?;
                }
                state.submitted.push(order.clone());
                if !order.status.is_terminal() {
                    state.working.push(order.clone());
                }
                Ok(order)
            }
        }
    }

    async fn cancel_order(&self, id: &OrderId) -> Result<(), ExecutionError> {
        let mut state = self.state.lock();
        if let Some(error) = state.cancel_failure.take() {
            return Err(error);
        }
        let position = state
            .working
            .iter()
            .position(|order| &order.id == id)
            .ok_or_else(|| ExecutionError::UnknownOrder(id.clone()))?;
        state.working.remove(position);
        state.cancelled.push(id.clone());
        Ok(())
    }

    async fn cancel_all(&self, symbol: Option<&Symbol>) -> Result<Vec<OrderId>, ExecutionError> {
        let mut state = self.state.lock();
        if let Some(error) = state.cancel_failure.take() {
            return Err(error);
        }
        let (matching, rest): (Vec<Order>, Vec<Order>) = state
            .working
            .drain(..)
            .partition(|order| symbol.is_none_or(|symbol| &order.symbol == symbol));
        state.working = rest;
        let ids: Vec<OrderId> = matching.into_iter().map(|order| order.id).collect();
        state.cancelled.extend(ids.clone());
        Ok(ids)
    }

    async fn account_snapshot(&self) -> Result<AccountSnapshot, ExecutionError> {
        self.snapshot
            .lock()
            .clone()
            .ok_or_else(|| ExecutionError::TransientVenue {
                venue: kestrel_data::Venue::Mock,
                reason: "no snapshot scripted".into(),
            })
    }

    fn rate_limit_tokens(&self) -> u32 {
        u32::MAX
    }
}
