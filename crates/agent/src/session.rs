use serde_json::json;

use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::product::Product;

use crate::llm::{
    AgentBackend, AgentTurn, BackendError, ConversationEntry, FunctionResult, TurnRequest,
};
use crate::prompts;
use crate::tools::FunctionRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentRole {
    Shopping,
    Payment,
}

/// Instruction set and callable functions of one agent.
#[derive(Clone, Debug)]
pub struct AgentProfile {
    pub role: AgentRole,
    pub instruction: String,
    pub registry: FunctionRegistry,
}

impl AgentProfile {
    pub fn shopping() -> Self {
        Self {
            role: AgentRole::Shopping,
            instruction: prompts::SHOPPING_INSTRUCTION.to_string(),
            registry: FunctionRegistry::shopping(),
        }
    }

    pub fn payment() -> Self {
        Self {
            role: AgentRole::Payment,
            instruction: prompts::PAYMENT_INSTRUCTION.to_string(),
            registry: FunctionRegistry::payment(),
        }
    }
}

/// Application state injected alongside a shopper's message.
#[derive(Clone, Debug, Default)]
pub struct SideContext {
    pub cart: Vec<CartItem>,
    pub search_results: Vec<Product>,
}

impl SideContext {
    pub fn new(cart: Vec<CartItem>, search_results: Vec<Product>) -> Self {
        Self { cart, search_results }
    }

    pub fn render(&self, user_text: &str) -> String {
        let cart = serde_json::to_string(&self.cart).unwrap_or_else(|_| "[]".to_string());
        let mut prompt = format!("CONTEXT: The current cart is {cart}.");
        if !self.search_results.is_empty() {
            let results = json!({ "products": self.search_results });
            prompt.push_str(&format!(
                " The most recent search results, with every supplier, are {results}."
            ));
        }
        prompt.push_str(&format!(" User says: \"{user_text}\""));
        prompt
    }
}

/// One agent's conversation. Calls take `&mut self`, so at most one request
/// per session is ever outstanding. A failed backend call leaves the history
/// untouched.
#[derive(Clone, Debug)]
pub struct AgentSession {
    profile: AgentProfile,
    history: Vec<ConversationEntry>,
}

impl AgentSession {
    pub fn new(profile: AgentProfile) -> Self {
        Self { profile, history: Vec::new() }
    }

    /// Session that starts from a user briefing and a pre-written reply.
    pub fn seeded(profile: AgentProfile, briefing: String, opening: String) -> Self {
        Self {
            profile,
            history: vec![
                ConversationEntry::User(briefing),
                ConversationEntry::Model(AgentTurn::Text(opening)),
            ],
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.profile.registry
    }

    pub fn history(&self) -> &[ConversationEntry] {
        &self.history
    }

    pub async fn send_text(
        &mut self,
        backend: &dyn AgentBackend,
        text: &str,
        context: &SideContext,
    ) -> Result<AgentTurn, BackendError> {
        self.exchange(backend, ConversationEntry::User(context.render(text))).await
    }

    pub async fn send_instruction(
        &mut self,
        backend: &dyn AgentBackend,
        text: &str,
    ) -> Result<AgentTurn, BackendError> {
        self.exchange(backend, ConversationEntry::User(text.to_string())).await
    }

    pub async fn send_function_results(
        &mut self,
        backend: &dyn AgentBackend,
        results: Vec<FunctionResult>,
    ) -> Result<AgentTurn, BackendError> {
        let results = self.bind_call_ids(results);
        self.exchange(backend, ConversationEntry::FunctionResults(results)).await
    }

    async fn exchange(
        &mut self,
        backend: &dyn AgentBackend,
        entry: ConversationEntry,
    ) -> Result<AgentTurn, BackendError> {
        let mut history = self.history.clone();
        history.push(entry);

        let request = TurnRequest {
            system_instruction: self.profile.instruction.clone(),
            functions: self.profile.registry.declarations().to_vec(),
            history,
        };
        let turn = backend.send_turn(&request).await?;

        self.history = request.history;
        self.history.push(ConversationEntry::Model(turn.clone()));
        Ok(turn)
    }

    /// Fills missing call ids from the most recent call batch, matching by name.
    fn bind_call_ids(&self, mut results: Vec<FunctionResult>) -> Vec<FunctionResult> {
        let last_calls = self.history.iter().rev().find_map(|entry| match entry {
            ConversationEntry::Model(AgentTurn::Calls(calls)) => Some(calls),
            _ => None,
        });
        let Some(calls) = last_calls else {
            return results;
        };

        let mut claimed: Vec<&str> = Vec::new();
        for result in results.iter_mut().filter(|result| result.call_id.is_none()) {
            let matching = calls.iter().find(|call| {
                call.name == result.name && !claimed.contains(&call.call_id.as_str())
            });
            if let Some(call) = matching {
                claimed.push(call.call_id.as_str());
                result.call_id = Some(call.call_id.clone());
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::{AgentProfile, AgentSession, SideContext};
    use crate::llm::{
        AgentBackend, AgentTurn, BackendError, ConversationEntry, FunctionCallRequest,
        FunctionResult, TurnRequest,
    };

    struct OneShot {
        reply: Mutex<Option<Result<AgentTurn, BackendError>>>,
    }

    impl OneShot {
        fn new(reply: Result<AgentTurn, BackendError>) -> Self {
            Self { reply: Mutex::new(Some(reply)) }
        }
    }

    #[async_trait]
    impl AgentBackend for OneShot {
        async fn send_turn(&self, _request: &TurnRequest) -> Result<AgentTurn, BackendError> {
            self.reply
                .lock()
                .map_err(|_| BackendError::Transport("poisoned".to_string()))?
                .take()
                .unwrap_or_else(|| Err(BackendError::Transport("exhausted".to_string())))
        }
    }

    #[tokio::test]
    async fn successful_turn_appends_input_and_reply() {
        let backend = OneShot::new(Ok(AgentTurn::text("Sure!")));
        let mut session = AgentSession::new(AgentProfile::shopping());

        let turn = session
            .send_text(&backend, "show me laptops", &SideContext::default())
            .await
            .expect("turn");

        assert_eq!(turn, AgentTurn::text("Sure!"));
        assert_eq!(session.history().len(), 2);
        assert!(matches!(
            &session.history()[0],
            ConversationEntry::User(prompt) if prompt.contains("show me laptops")
        ));
    }

    #[tokio::test]
    async fn failed_turn_leaves_history_untouched() {
        let backend = OneShot::new(Err(BackendError::Transport("offline".to_string())));
        let mut session = AgentSession::seeded(
            AgentProfile::payment(),
            "briefing".to_string(),
            "opening".to_string(),
        );

        let result = session.send_instruction(&backend, "Proceed with checkout.").await;

        assert!(result.is_err());
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn function_results_inherit_call_ids_by_name() {
        let backend = OneShot::new(Ok(AgentTurn::Calls(vec![FunctionCallRequest::new(
            "call_42",
            "searchCatalog",
            json!({ "query": "watch" }),
        )])));
        let mut session = AgentSession::new(AgentProfile::shopping());
        session.send_instruction(&backend, "watches?").await.expect("turn");

        let bound = session
            .bind_call_ids(vec![FunctionResult::new("searchCatalog", json!({ "products": [] }))]);
        assert_eq!(bound[0].call_id.as_deref(), Some("call_42"));
    }

    #[test]
    fn side_context_includes_search_results_only_when_held() {
        let empty = SideContext::default().render("hello");
        assert!(!empty.contains("search results"));
        assert!(empty.ends_with("User says: \"hello\""));
    }
}
