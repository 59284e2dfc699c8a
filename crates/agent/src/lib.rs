//! Conversational checkout runtime.
//!
//! Two LLM-backed agents share one shopper session:
//! - the **shopping agent** searches the catalog and requests cart changes
//! - the **payment agent** opens the payment form and mints the receipt
//!
//! # Architecture
//!
//! 1. **Sessions** (`session`) hold each agent's conversation history
//! 2. **Dispatcher** (`dispatcher`) turns an agent turn into exactly one plan
//! 3. **Runtime** (`runtime`) executes plans against the cart ledger and
//!    drives the checkout state machine from `agentcart-core`
//! 4. **Recorder** (`recorder`) commits the transaction once per order
//!
//! The agents never mutate state directly. Prices, totals and the
//! transaction record are computed from the cart snapshot, never taken from
//! model output.

pub mod dispatcher;
pub mod llm;
pub mod notify;
pub mod prompts;
pub mod recorder;
pub mod runtime;
pub mod session;
pub mod tools;

pub use dispatcher::{plan_turn, search_payload, MintRequest, TurnPlan};
pub use llm::{
    AgentBackend, AgentTurn, BackendError, ConversationEntry, FunctionCallRequest,
    FunctionResult, OpenAiCompatibleBackend, TurnRequest,
};
pub use notify::{LogNotifier, NotifyError, OrderConfirmation, OrderNotifier};
pub use recorder::TransactionRecorder;
pub use runtime::{
    AgentRuntime, ChatMessage, MessageContent, PaymentTicket, Role, RuntimeDeps, RuntimeSettings,
};
pub use session::{AgentProfile, AgentRole, AgentSession, SideContext};
pub use tools::{CallKind, FunctionDeclaration, FunctionRegistry};
