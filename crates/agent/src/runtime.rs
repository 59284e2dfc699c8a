use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agentcart_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use agentcart_core::checkout::{
    AttemptCounter, AttemptToken, CheckoutEvent, CheckoutMachine, CheckoutStage,
    TransitionOutcome,
};
use agentcart_core::commerce::ledger::summarize;
use agentcart_core::commerce::{cheapest, CartLedger, CatalogLookup};
use agentcart_core::config::AgentConfig;
use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::product::{Product, ProductId};
use agentcart_core::domain::shopper::Shopper;
use agentcart_core::domain::transaction::{ReceiptRecord, Transaction, TransactionId};
use agentcart_core::errors::{ApplicationError, DomainError};
use agentcart_core::payment::{
    CardFields, ChargeOutcome, DeclineReason, GatewayError, PaymentGateway, ReceiptMinter,
};
use agentcart_db::{CartRepository, TransactionRepository};

use crate::dispatcher::{plan_turn, search_payload, MintRequest, TurnPlan};
use crate::llm::{AgentBackend, AgentTurn, BackendError, ConversationEntry, FunctionResult};
use crate::notify::{OrderConfirmation, OrderNotifier};
use crate::prompts;
use crate::recorder::TransactionRecorder;
use crate::session::{AgentProfile, AgentRole, AgentSession, SideContext};
use crate::tools::{INITIATE_PAYMENT, SEARCH_CATALOG};

const NEXT_ORDER_HINT: &str = "Type 'next' to start a new order.";
const PAYMENT_CANCELLED: &str = "Payment cancelled. You can continue shopping.";

/// Collaborators of one runtime. Everything is shared so a binary can wire a
/// single set of services into many shopper sessions.
#[derive(Clone)]
pub struct RuntimeDeps {
    pub backend: Arc<dyn AgentBackend>,
    pub catalog: Arc<dyn CatalogLookup>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub minter: Arc<dyn ReceiptMinter>,
    pub carts: Arc<dyn CartRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub notifier: Arc<dyn OrderNotifier>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub max_search_rounds: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { max_search_rounds: 5 }
    }
}

impl From<&AgentConfig> for RuntimeSettings {
    fn from(config: &AgentConfig) -> Self {
        Self { max_search_rounds: config.max_search_rounds }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    ShoppingAgent,
    PaymentAgent,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    SearchResults(Vec<Product>),
    Receipt(ReceiptRecord),
}

/// One entry of the shopper-visible transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self { id: Uuid::new_v4(), role, content }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, MessageContent::Text(text.into()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Handle for a charge started with [`AgentRuntime::begin_payment`].
#[derive(Clone, Debug)]
pub struct PaymentTicket {
    pub attempt: AttemptToken,
    pub card: CardFields,
}

struct BusySignal {
    depth: AtomicUsize,
    sender: watch::Sender<bool>,
}

/// Holds the busy signal raised until dropped. Guards nest.
struct BusyGuard(Arc<BusySignal>);

impl BusyGuard {
    fn raise(signal: &Arc<BusySignal>) -> Self {
        signal.depth.fetch_add(1, Ordering::SeqCst);
        signal.sender.send_replace(true);
        Self(Arc::clone(signal))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if self.0.depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.sender.send_replace(false);
        }
    }
}

/// State that lives exactly as long as one checkout attempt.
struct CheckoutSession {
    attempt: AttemptToken,
    cart_snapshot: Vec<CartItem>,
    total: Decimal,
    session: AgentSession,
    transaction_id: Option<TransactionId>,
    charge: Option<BusyGuard>,
    /// Minted receipt whose transaction has not been recorded yet.
    receipt: Option<ReceiptRecord>,
}

enum ActiveAgent {
    Shopping,
    Payment(Box<CheckoutSession>),
}

/// One shopper's conversational checkout.
///
/// Every operation takes `&mut self`, so at most one agent call or cart
/// mutation is in flight. Operations return the transcript entries they
/// appended; failures are surfaced as system messages rather than errors.
/// The payment agent is active exactly while the stage is `Initiated`,
/// `AwaitingPayment` or `Finalizing`.
pub struct AgentRuntime {
    deps: RuntimeDeps,
    settings: RuntimeSettings,
    shopper: Shopper,
    machine: CheckoutMachine,
    stage: CheckoutStage,
    attempts: AttemptCounter,
    ledger: CartLedger,
    recorder: TransactionRecorder,
    shopping: AgentSession,
    active: ActiveAgent,
    transcript: Vec<ChatMessage>,
    last_results: Vec<Product>,
    completed_order: Option<ReceiptRecord>,
    correlation_id: String,
    busy: Arc<BusySignal>,
}

impl AgentRuntime {
    /// Restores the shopper's cart and purchase history and greets them.
    pub async fn start(
        deps: RuntimeDeps,
        settings: RuntimeSettings,
        shopper: Shopper,
    ) -> Result<Self, ApplicationError> {
        let items = deps
            .carts
            .load_cart(&shopper.uid)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        let mut recorder = TransactionRecorder::for_shopper(&shopper, deps.transactions.clone());
        recorder
            .load(&shopper.uid)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        let (sender, _) = watch::channel(false);
        let machine = CheckoutMachine::new();
        let mut runtime = Self {
            deps,
            settings,
            stage: machine.initial_stage(),
            machine,
            attempts: AttemptCounter::default(),
            ledger: CartLedger::from_items(items),
            recorder,
            shopping: AgentSession::new(AgentProfile::shopping()),
            active: ActiveAgent::Shopping,
            transcript: Vec::new(),
            last_results: Vec::new(),
            completed_order: None,
            correlation_id: Uuid::new_v4().to_string(),
            busy: Arc::new(BusySignal { depth: AtomicUsize::new(0), sender }),
            shopper,
        };
        runtime.push_text(Role::ShoppingAgent, prompts::shopping_greeting(&runtime.shopper));

        info!(
            event_name = "runtime.started",
            shopper_uid = %runtime.shopper.uid,
            guest = runtime.shopper.is_anonymous,
            cart_lines = runtime.ledger.len(),
            transactions = runtime.recorder.history().len(),
            "agent runtime started"
        );
        Ok(runtime)
    }

    pub fn shopper(&self) -> &Shopper {
        &self.shopper
    }

    pub fn stage(&self) -> CheckoutStage {
        self.stage
    }

    pub fn active_role(&self) -> AgentRole {
        match self.active {
            ActiveAgent::Shopping => AgentRole::Shopping,
            ActiveAgent::Payment(_) => AgentRole::Payment,
        }
    }

    pub fn active_attempt(&self) -> Option<AttemptToken> {
        match &self.active {
            ActiveAgent::Payment(checkout) => Some(checkout.attempt),
            ActiveAgent::Shopping => None,
        }
    }

    pub fn cart(&self) -> &[CartItem] {
        self.ledger.items()
    }

    pub fn cart_total(&self) -> Option<Decimal> {
        self.ledger.total()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.recorder.history()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn last_search_results(&self) -> &[Product] {
        &self.last_results
    }

    pub fn completed_order(&self) -> Option<&ReceiptRecord> {
        self.completed_order.as_ref()
    }

    pub fn gateway(&self) -> Arc<dyn PaymentGateway> {
        Arc::clone(&self.deps.gateway)
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.sender.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.sender.borrow()
    }

    /// Routes free text from the shopper.
    pub async fn handle_user_input(&mut self, text: &str) -> Vec<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let _busy = BusyGuard::raise(&self.busy);

        match self.stage {
            CheckoutStage::Completed if text.eq_ignore_ascii_case("next") => {
                self.next_order();
                self.transcript.clone()
            }
            CheckoutStage::Completed => {
                let mark = self.transcript.len();
                self.push_text(Role::System, NEXT_ORDER_HINT);
                self.appended_since(mark)
            }
            CheckoutStage::Initiated
            | CheckoutStage::AwaitingPayment
            | CheckoutStage::Finalizing => {
                let mark = self.transcript.len();
                self.push_text(
                    Role::System,
                    "Please complete or cancel the payment before continuing to shop.",
                );
                self.appended_since(mark)
            }
            CheckoutStage::Idle | CheckoutStage::Cancelled => {
                let mark = self.transcript.len();
                self.push_text(Role::User, text);
                self.run_shopping_turn(text).await;
                self.appended_since(mark)
            }
        }
    }

    /// Adds one unit of a product at its cheapest supplier's price.
    pub async fn quick_add(&mut self, product_id: &ProductId) -> Vec<ChatMessage> {
        let _busy = BusyGuard::raise(&self.busy);
        let mark = self.transcript.len();
        if self.refuse_cart_edit() {
            return self.appended_since(mark);
        }

        let product = self
            .last_results
            .iter()
            .find(|product| &product.id == product_id)
            .cloned()
            .or_else(|| self.deps.catalog.find(product_id));
        let Some(product) = product else {
            self.push_text(Role::System, format!("Product {} was not found.", product_id.as_str()));
            return self.appended_since(mark);
        };
        let Some(supplier) = cheapest(&product.suppliers).cloned() else {
            self.push_text(Role::System, format!("{} has no supplier offers.", product.name));
            return self.appended_since(mark);
        };

        if !self.ledger.apply_quick_add(&product, &supplier) {
            self.push_text(
                Role::System,
                format!("I couldn't add {}: the cart total is too large.", product.name),
            );
            return self.appended_since(mark);
        }
        self.last_results.clear();
        self.push_text(Role::System, format!("Added {} to your cart.", product.name));
        self.persist_cart().await;
        self.appended_since(mark)
    }

    /// Sets a line's quantity directly. Zero or less removes the line.
    pub async fn set_quantity(&mut self, product_id: &ProductId, quantity: i64) -> Vec<ChatMessage> {
        let _busy = BusyGuard::raise(&self.busy);
        let mark = self.transcript.len();
        if self.refuse_cart_edit() {
            return self.appended_since(mark);
        }

        if self.ledger.get(product_id).is_none() {
            self.push_text(
                Role::System,
                format!("{} is not in your cart.", product_id.as_str()),
            );
        } else if self.ledger.set_quantity(product_id, quantity) {
            self.persist_cart().await;
        }
        self.appended_since(mark)
    }

    /// Hands the cart to the payment agent.
    pub async fn start_checkout(&mut self) -> Vec<ChatMessage> {
        let _busy = BusyGuard::raise(&self.busy);
        let mark = self.transcript.len();
        self.begin_checkout().await;
        self.appended_since(mark)
    }

    /// Charges the card against the live checkout attempt.
    pub async fn submit_payment(&mut self, card: CardFields) -> Vec<ChatMessage> {
        let _busy = BusyGuard::raise(&self.busy);
        let mark = self.transcript.len();
        match self.begin_payment(card) {
            Ok(ticket) => {
                let gateway = Arc::clone(&self.deps.gateway);
                let outcome = gateway.charge(&ticket.card).await;
                self.resolve_payment(ticket, outcome).await;
            }
            Err(error) => self.surface(&error),
        }
        self.appended_since(mark)
    }

    /// First half of a charge for callers that run the gateway call
    /// themselves. The busy signal stays raised until the ticket is resolved
    /// or the checkout ends.
    pub fn begin_payment(&mut self, card: CardFields) -> Result<PaymentTicket, ApplicationError> {
        let stage = self.stage;
        let checkout = match &mut self.active {
            ActiveAgent::Payment(checkout) if stage == CheckoutStage::AwaitingPayment => checkout,
            _ => {
                return Err(DomainError::CheckoutRefused(
                    "There is no payment waiting for card details.".to_string(),
                )
                .into())
            }
        };
        if checkout.charge.is_some() {
            return Err(DomainError::CheckoutRefused(
                "A payment is already being processed.".to_string(),
            )
            .into());
        }

        checkout.charge = Some(BusyGuard::raise(&self.busy));
        debug!(
            event_name = "payment.charge_started",
            attempt = checkout.attempt.0,
            card_last4 = %card.last4(),
            "charge started"
        );
        Ok(PaymentTicket { attempt: checkout.attempt, card })
    }

    /// Second half of a charge. Outcomes for an attempt that is no longer
    /// live are discarded.
    pub async fn resolve_payment(
        &mut self,
        ticket: PaymentTicket,
        outcome: Result<ChargeOutcome, GatewayError>,
    ) -> Vec<ChatMessage> {
        let mark = self.transcript.len();
        let stage = self.stage;
        let live_attempt = self.active_attempt();
        let checkout = match &mut self.active {
            ActiveAgent::Payment(checkout)
                if checkout.attempt == ticket.attempt
                    && stage == CheckoutStage::AwaitingPayment =>
            {
                checkout
            }
            _ => {
                debug!(
                    event_name = "payment.stale_response_discarded",
                    attempt = ticket.attempt.0,
                    live_attempt = ?live_attempt,
                    stage = stage.as_str(),
                    "discarding payment outcome for an attempt that is no longer live"
                );
                return Vec::new();
            }
        };
        checkout.charge = None;

        let reason = match outcome {
            Ok(ChargeOutcome::Approved { transaction_id }) => {
                checkout.transaction_id = Some(transaction_id.clone());
                if let Err(error) = self.transition(CheckoutEvent::PaymentSucceeded) {
                    self.surface(&error);
                    return self.appended_since(mark);
                }
                self.emit_audit(
                    "payment.charge_approved",
                    AuditCategory::Payment,
                    AuditOutcome::Success,
                    Some(transaction_id.as_str()),
                );
                self.push_text(Role::System, "Payment successful. Finalizing order...");
                self.resume_after_payment().await;
                return self.appended_since(mark);
            }
            Ok(ChargeOutcome::Declined { reason }) => reason,
            Err(error) => {
                warn!(
                    event_name = "payment.gateway_failed",
                    attempt = ticket.attempt.0,
                    error = %error,
                    "payment gateway call failed"
                );
                DeclineReason::ProcessingError
            }
        };

        if let Err(error) = self.transition(CheckoutEvent::PaymentDeclined) {
            self.surface(&error);
            return self.appended_since(mark);
        }
        self.emit_audit(
            "payment.charge_declined",
            AuditCategory::Payment,
            AuditOutcome::Rejected,
            None,
        );
        self.push_text(Role::System, reason.to_string());
        self.appended_since(mark)
    }

    /// Leaves checkout and returns to the shopping agent. Refused once the
    /// payment has been taken.
    pub async fn cancel_payment(&mut self) -> Vec<ChatMessage> {
        let _busy = BusyGuard::raise(&self.busy);
        let mark = self.transcript.len();
        let event = match self.stage {
            CheckoutStage::AwaitingPayment => CheckoutEvent::PaymentCancelled,
            CheckoutStage::Initiated => CheckoutEvent::CheckoutAbandoned,
            CheckoutStage::Finalizing => {
                self.push_text(
                    Role::System,
                    "Your payment has already been processed. The order is being finalized.",
                );
                return self.appended_since(mark);
            }
            _ => {
                self.push_text(Role::System, "There is no payment to cancel.");
                return self.appended_since(mark);
            }
        };

        match self.transition(event) {
            Ok(_) => {
                self.active = ActiveAgent::Shopping;
                self.push_text(Role::System, PAYMENT_CANCELLED);
            }
            Err(error) => self.surface(&error),
        }
        self.appended_since(mark)
    }

    /// Re-sends "Proceed with checkout." when the payment agent stalled
    /// before opening the payment form.
    pub async fn retry_checkout(&mut self) -> Vec<ChatMessage> {
        let _busy = BusyGuard::raise(&self.busy);
        let mark = self.transcript.len();
        if self.stage == CheckoutStage::Initiated {
            self.kick_off_payment_agent().await;
        } else {
            self.push_text(Role::System, "There is no stalled checkout to retry.");
        }
        self.appended_since(mark)
    }

    /// Asks the payment agent again for the receipt after a successful charge.
    pub async fn retry_finalize(&mut self) -> Vec<ChatMessage> {
        let _busy = BusyGuard::raise(&self.busy);
        let mark = self.transcript.len();
        let minted = matches!(&self.active, ActiveAgent::Payment(checkout) if checkout.receipt.is_some());
        match self.stage {
            CheckoutStage::Finalizing if minted => self.record_order().await,
            CheckoutStage::Finalizing => self.resume_after_payment().await,
            _ => self.push_text(Role::System, "There is no order waiting to be finalized."),
        }
        self.appended_since(mark)
    }

    /// Retries whichever checkout step is stalled.
    pub async fn retry(&mut self) -> Vec<ChatMessage> {
        match self.stage {
            CheckoutStage::Finalizing => self.retry_finalize().await,
            _ => self.retry_checkout().await,
        }
    }

    async fn run_shopping_turn(&mut self, text: &str) {
        let context = SideContext::new(self.ledger.items().to_vec(), self.last_results.clone());
        let reply = self.shopping.send_text(self.deps.backend.as_ref(), text, &context).await;
        let mut turn = match reply {
            Ok(turn) => turn,
            Err(error) => return self.backend_failed(AgentRole::Shopping, error),
        };

        let mut rounds = 0;
        loop {
            match plan_turn(&turn, self.shopping.registry()) {
                TurnPlan::Search { query } => {
                    if rounds >= self.settings.max_search_rounds {
                        warn!(
                            event_name = "agent.search_loop_bounded",
                            rounds,
                            query = %query,
                            "shopping agent exceeded search rounds for one turn"
                        );
                        self.push_text(
                            Role::System,
                            "I couldn't settle on the right products. Could you be more specific?",
                        );
                        return;
                    }
                    rounds += 1;
                    turn = match self.run_search(&query).await {
                        Ok(turn) => turn,
                        Err(error) => return self.backend_failed(AgentRole::Shopping, error),
                    };
                }
                TurnPlan::StartCheckout => {
                    self.begin_checkout().await;
                    return;
                }
                TurnPlan::CartMutations(mutations) => {
                    let confirmation = self.ledger.apply_batch(&mutations);
                    self.last_results.clear();
                    if let Some(confirmation) = confirmation {
                        self.push_text(Role::ShoppingAgent, confirmation);
                        self.persist_cart().await;
                    }
                    return;
                }
                TurnPlan::Text(text) => {
                    self.push_text(Role::ShoppingAgent, text);
                    return;
                }
                TurnPlan::Malformed => {
                    self.surface(&ApplicationError::MalformedTurn);
                    return;
                }
                TurnPlan::InitiatePayment | TurnPlan::MintReceipt(_) | TurnPlan::Ignored => {
                    return;
                }
            }
        }
    }

    async fn run_search(&mut self, query: &str) -> Result<AgentTurn, BackendError> {
        self.push_text(Role::System, format!("Searching for \"{query}\"..."));
        let products = self.deps.catalog.search(query);
        info!(
            event_name = "catalog.searched",
            query,
            results = products.len(),
            "catalog search executed"
        );
        let payload = search_payload(&products);
        self.last_results = products.clone();
        self.push(Role::ShoppingAgent, MessageContent::SearchResults(products));

        self.shopping
            .send_function_results(
                self.deps.backend.as_ref(),
                vec![FunctionResult::new(SEARCH_CATALOG, payload)],
            )
            .await
    }

    async fn begin_checkout(&mut self) {
        match self.stage {
            CheckoutStage::Idle | CheckoutStage::Cancelled => {}
            CheckoutStage::Completed => {
                self.push_text(Role::System, NEXT_ORDER_HINT);
                return;
            }
            _ => {
                self.push_text(Role::System, "A checkout is already in progress.");
                return;
            }
        }
        if self.ledger.is_empty() {
            info!(event_name = "checkout.refused_empty_cart", "checkout refused for empty cart");
            self.surface(&ApplicationError::from(DomainError::CheckoutRefused(
                "Your cart is empty. Add something before checking out.".to_string(),
            )));
            return;
        }
        let Some(total) = self.ledger.total() else {
            warn!(event_name = "checkout.total_overflow", "cart total could not be computed");
            self.surface(&ApplicationError::from(DomainError::CheckoutRefused(
                "Your cart total is too large to check out. Remove some items first.".to_string(),
            )));
            return;
        };

        let attempt = self.attempts.next();
        if let Err(error) = self.transition_for(Some(attempt), CheckoutEvent::CheckoutRequested) {
            self.surface(&error);
            return;
        }

        let cart_snapshot = self.ledger.items().to_vec();
        let opening = prompts::payment_greeting(&cart_snapshot, total);
        let session = AgentSession::seeded(
            AgentProfile::payment(),
            prompts::checkout_briefing(&cart_snapshot, total),
            opening.clone(),
        );
        self.last_results.clear();
        self.active = ActiveAgent::Payment(Box::new(CheckoutSession {
            attempt,
            cart_snapshot,
            total,
            session,
            transaction_id: None,
            charge: None,
            receipt: None,
        }));

        self.push_text(Role::System, "Transferring to secure payment agent...");
        self.push_text(Role::PaymentAgent, opening);
        self.kick_off_payment_agent().await;
    }

    async fn kick_off_payment_agent(&mut self) {
        let ActiveAgent::Payment(checkout) = &mut self.active else {
            return;
        };
        let reply = checkout
            .session
            .send_instruction(self.deps.backend.as_ref(), prompts::PROCEED_WITH_CHECKOUT)
            .await;

        match reply {
            Ok(turn) => self.handle_payment_turn(turn).await,
            Err(error) => {
                warn!(
                    event_name = "checkout.start_failed",
                    error = %error,
                    "payment agent did not start"
                );
                if let Err(error) = self.transition(CheckoutEvent::StartFailed) {
                    self.surface(&error);
                    return;
                }
                self.active = ActiveAgent::Shopping;
                self.surface(&ApplicationError::CheckoutStart(error.to_string()));
            }
        }
    }

    async fn resume_after_payment(&mut self) {
        let ActiveAgent::Payment(checkout) = &mut self.active else {
            return;
        };
        let Some(transaction_id) = checkout.transaction_id.clone() else {
            return;
        };

        let awaiting_result = matches!(
            checkout.session.history().last(),
            Some(ConversationEntry::Model(AgentTurn::Calls(_)))
        );
        let backend = self.deps.backend.as_ref();
        let reply = if awaiting_result {
            let result = FunctionResult::new(
                INITIATE_PAYMENT,
                json!({ "status": "success", "transactionId": transaction_id.as_str() }),
            );
            checkout.session.send_function_results(backend, vec![result]).await
        } else {
            let instruction = format!(
                "The payment succeeded with transaction ID {}. Please mint the receipt now.",
                transaction_id.as_str()
            );
            checkout.session.send_instruction(backend, &instruction).await
        };

        match reply {
            Ok(turn) => self.handle_payment_turn(turn).await,
            Err(error) => {
                error!(
                    event_name = "checkout.finalize_stalled",
                    transaction_id = %transaction_id.as_str(),
                    error = %error,
                    "payment agent failed after a successful charge"
                );
                self.surface(&ApplicationError::Finalization(error.to_string()));
            }
        }
    }

    async fn handle_payment_turn(&mut self, turn: AgentTurn) {
        let ActiveAgent::Payment(checkout) = &self.active else {
            return;
        };
        let plan = plan_turn(&turn, checkout.session.registry());

        match (plan, self.stage) {
            (TurnPlan::Text(text), CheckoutStage::Initiated | CheckoutStage::Finalizing) => {
                match self.transition(CheckoutEvent::AgentRepliedWithText) {
                    Ok(_) => self.push_text(Role::PaymentAgent, text),
                    Err(error) => self.surface(&error),
                }
            }
            (TurnPlan::InitiatePayment, CheckoutStage::Initiated) => {
                match self.transition(CheckoutEvent::PaymentFormRequested) {
                    Ok(_) => self.push_text(
                        Role::System,
                        "Please enter your card details to complete the payment.",
                    ),
                    Err(error) => self.surface(&error),
                }
            }
            (TurnPlan::MintReceipt(request), CheckoutStage::Finalizing) => {
                self.finalize(request).await;
            }
            (plan, stage) => {
                debug!(
                    event_name = "checkout.agent_turn_ignored",
                    plan = ?plan,
                    stage = stage.as_str(),
                    "payment agent turn not actionable in current stage"
                );
            }
        }
    }

    async fn finalize(&mut self, request: MintRequest) {
        let ActiveAgent::Payment(checkout) = &self.active else {
            return;
        };
        let Some(transaction_id) = checkout.transaction_id.clone() else {
            return;
        };
        let cart_snapshot = checkout.cart_snapshot.clone();
        let total = checkout.total;
        let already_minted = checkout.receipt.is_some();

        if request.total.is_some_and(|claimed| claimed != total) {
            warn!(
                event_name = "receipt.total_mismatch",
                claimed = ?request.total,
                recorded = %total,
                "agent-supplied total differs from cart snapshot"
            );
        }
        if request.transaction_id.as_deref().is_some_and(|id| id != transaction_id.as_str()) {
            warn!(
                event_name = "receipt.transaction_id_mismatch",
                claimed = ?request.transaction_id,
                recorded = %transaction_id.as_str(),
                "agent-supplied transaction id differs from gateway id"
            );
        }

        if already_minted {
            debug!(
                event_name = "receipt.already_minted",
                transaction_id = %transaction_id.as_str(),
                "receipt exists; recording the order without minting again"
            );
            return self.record_order().await;
        }

        let order_summary = summarize(&cart_snapshot);
        self.push_text(Role::System, "Minting your proof-of-purchase NFT receipt...");
        let minted = self.deps.minter.mint(&transaction_id, &order_summary, total).await;
        let minted = match minted {
            Ok(minted) => minted,
            Err(error) => {
                error!(
                    event_name = "receipt.mint_failed",
                    transaction_id = %transaction_id.as_str(),
                    error = %error,
                    "receipt minting failed"
                );
                if let Err(error) = self.transition(CheckoutEvent::MintFailed) {
                    self.surface(&error);
                    return;
                }
                self.active = ActiveAgent::Shopping;
                self.surface(&ApplicationError::Finalization(error.to_string()));
                return;
            }
        };

        self.emit_audit(
            "receipt.minted",
            AuditCategory::Receipt,
            AuditOutcome::Success,
            Some(transaction_id.as_str()),
        );
        if let ActiveAgent::Payment(checkout) = &mut self.active {
            checkout.receipt = Some(ReceiptRecord {
                order_summary,
                total,
                transaction_id,
                nft_url: minted.nft_url,
                explorer_url: minted.explorer_url,
            });
        }
        self.record_order().await;
    }

    /// Commits the minted order. The checkout completes and the cart is
    /// cleared only once the transaction is stored; on failure the stage stays
    /// `Finalizing` with the receipt kept for `retry_finalize`.
    async fn record_order(&mut self) {
        let ActiveAgent::Payment(checkout) = &self.active else {
            return;
        };
        let Some(receipt) = checkout.receipt.clone() else {
            return;
        };
        let cart_snapshot = checkout.cart_snapshot.clone();

        let committed = self
            .recorder
            .commit(
                &self.shopper.uid,
                receipt.transaction_id.clone(),
                cart_snapshot,
                receipt.total,
            )
            .await;
        let transaction = match committed {
            Ok(history) => history.last().cloned(),
            Err(error) => {
                error!(
                    event_name = "transaction.record_failed",
                    transaction_id = %receipt.transaction_id.as_str(),
                    error = %error,
                    "transaction could not be recorded"
                );
                self.surface(&ApplicationError::Finalization(error.to_string()));
                return;
            }
        };

        if let Err(error) = self.transition(CheckoutEvent::ReceiptMinted) {
            self.surface(&error);
            return;
        }
        self.push(Role::PaymentAgent, MessageContent::Receipt(receipt.clone()));
        self.ledger.clear();
        self.persist_cart().await;

        if let Some(transaction) = transaction {
            let confirmation = OrderConfirmation {
                shopper_uid: self.shopper.uid.clone(),
                salutation: self.shopper.salutation(),
                email: self.shopper.email.clone(),
                transaction,
                receipt: receipt.clone(),
            };
            if let Err(error) = self.deps.notifier.order_completed(&confirmation).await {
                warn!(
                    event_name = "order.notify_failed",
                    error = %error,
                    "order confirmation could not be delivered"
                );
            }
        }

        self.completed_order = Some(receipt);
        self.active = ActiveAgent::Shopping;
        self.push_text(Role::System, NEXT_ORDER_HINT);
    }

    fn next_order(&mut self) {
        if let Err(error) = self.transition(CheckoutEvent::NextOrderRequested) {
            self.surface(&error);
            return;
        }
        self.shopping = AgentSession::new(AgentProfile::shopping());
        self.active = ActiveAgent::Shopping;
        self.last_results.clear();
        self.completed_order = None;
        self.transcript.clear();
        self.push_text(Role::ShoppingAgent, prompts::shopping_greeting(&self.shopper));
        info!(event_name = "runtime.next_order", shopper_uid = %self.shopper.uid, "conversation reset");
    }

    fn refuse_cart_edit(&mut self) -> bool {
        let message = match self.stage {
            CheckoutStage::Idle | CheckoutStage::Cancelled => return false,
            CheckoutStage::Completed => NEXT_ORDER_HINT,
            _ => "Your cart is locked while checkout is in progress.",
        };
        self.surface(&ApplicationError::from(DomainError::CheckoutRefused(message.to_string())));
        true
    }

    async fn persist_cart(&mut self) {
        let saved = self.deps.carts.save_cart(&self.shopper.uid, self.ledger.items()).await;
        if let Err(error) = saved {
            warn!(
                event_name = "cart.persist_failed",
                shopper_uid = %self.shopper.uid,
                error = %error,
                "cart could not be saved"
            );
            self.surface(&ApplicationError::Persistence(error.to_string()));
        }
    }

    fn backend_failed(&mut self, role: AgentRole, error: BackendError) {
        warn!(
            event_name = "agent.backend_failed",
            agent = ?role,
            error = %error,
            "agent backend call failed"
        );
        self.surface(&ApplicationError::Backend(error.to_string()));
    }

    fn transition(&mut self, event: CheckoutEvent) -> Result<TransitionOutcome, ApplicationError> {
        self.transition_for(self.active_attempt(), event)
    }

    fn transition_for(
        &mut self,
        attempt: Option<AttemptToken>,
        event: CheckoutEvent,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let context = self.audit_context(attempt);
        let outcome = self
            .machine
            .apply_with_audit(self.stage, event, self.deps.audit.as_ref(), &context)
            .map_err(DomainError::from)?;
        self.stage = outcome.to;
        Ok(outcome)
    }

    fn audit_context(&self, attempt: Option<AttemptToken>) -> AuditContext {
        AuditContext::new(
            self.shopper.uid.as_str(),
            attempt,
            self.correlation_id.as_str(),
            "agentcart-runtime",
        )
    }

    fn emit_audit(
        &self,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        transaction_id: Option<&str>,
    ) {
        let mut event = AuditEvent::from_context(
            &self.audit_context(self.active_attempt()),
            event_type,
            category,
            outcome,
        );
        if let Some(transaction_id) = transaction_id {
            event = event.with_metadata("transaction_id", transaction_id);
        }
        self.deps.audit.emit(event);
    }

    fn surface(&mut self, error: &ApplicationError) {
        self.push_text(Role::System, error.user_message());
    }

    fn push_text(&mut self, role: Role, text: impl Into<String>) {
        self.transcript.push(ChatMessage::text(role, text));
    }

    fn push(&mut self, role: Role, content: MessageContent) {
        self.transcript.push(ChatMessage::new(role, content));
    }

    fn appended_since(&self, mark: usize) -> Vec<ChatMessage> {
        self.transcript.get(mark..).map(<[ChatMessage]>::to_vec).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use tokio::sync::watch;

    use super::{BusyGuard, BusySignal, ChatMessage, Role, RuntimeSettings};
    use agentcart_core::config::AgentConfig;

    #[test]
    fn busy_guards_nest() {
        let (sender, receiver) = watch::channel(false);
        let signal = Arc::new(BusySignal { depth: AtomicUsize::new(0), sender });

        let outer = BusyGuard::raise(&signal);
        let inner = BusyGuard::raise(&signal);
        drop(inner);
        assert!(*receiver.borrow());
        drop(outer);
        assert!(!*receiver.borrow());
    }

    #[test]
    fn settings_follow_agent_config() {
        let settings = RuntimeSettings::from(&AgentConfig { max_search_rounds: 2 });
        assert_eq!(settings.max_search_rounds, 2);
        assert_eq!(RuntimeSettings::default().max_search_rounds, 5);
    }

    #[test]
    fn text_messages_expose_their_text() {
        let message = ChatMessage::text(Role::System, "hello");
        assert_eq!(message.as_text(), Some("hello"));
        assert_ne!(message.id, ChatMessage::text(Role::System, "hello").id);
    }
}
