//! Injected callbacks that customize the loop without subclassing it.
//!
//! Every hook has a neutral default: observers do nothing, the end-of-round
//! transform returns the history unchanged, and the content-filter handler
//! hands the error straight back.

use std::sync::Arc;
use toolrun_core::{Message, ProviderError, ProviderResponse, ToolCall};

/// Called after every model response with `(iteration, response, history)`.
pub type ResponseHook = Arc<dyn Fn(usize, &ProviderResponse, &[Message]) + Send + Sync>;

/// Called after each tool result is appended, with `(iteration, call, result)`.
pub type AfterToolHook = Arc<dyn Fn(usize, &ToolCall, &Message) + Send + Sync>;

/// Rewrites the history between rounds (pruning, summarization).
pub type EndOfRoundHook = Arc<dyn Fn(usize, Vec<Message>) -> Vec<Message> + Send + Sync>;

/// Substitutes a response when the backend refused the content.
///
/// Returning `Err` ends the run with that error.
pub type ContentFilterHook =
    Arc<dyn Fn(ProviderError, &[Message]) -> Result<ProviderResponse, ProviderError> + Send + Sync>;

/// The set of hooks an [`AgentLoop`](crate::AgentLoop) calls.
#[derive(Clone)]
pub struct LoopHooks {
    pub(crate) on_response: ResponseHook,
    pub(crate) after_tool: AfterToolHook,
    pub(crate) end_of_round: EndOfRoundHook,
    pub(crate) on_content_filtered: ContentFilterHook,
}

impl Default for LoopHooks {
    fn default() -> Self {
        Self {
            on_response: Arc::new(|_, _, _| {}),
            after_tool: Arc::new(|_, _, _| {}),
            end_of_round: Arc::new(|_, history| history),
            on_content_filtered: Arc::new(|err, _| Err(err)),
        }
    }
}

impl LoopHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, &ProviderResponse, &[Message]) + Send + Sync + 'static,
    {
        self.on_response = Arc::new(hook);
        self
    }

    pub fn after_tool<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, &ToolCall, &Message) + Send + Sync + 'static,
    {
        self.after_tool = Arc::new(hook);
        self
    }

    pub fn end_of_round<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, Vec<Message>) -> Vec<Message> + Send + Sync + 'static,
    {
        self.end_of_round = Arc::new(hook);
        self
    }

    pub fn on_content_filtered<F>(mut self, hook: F) -> Self
    where
        F: Fn(ProviderError, &[Message]) -> Result<ProviderResponse, ProviderError> + Send + Sync + 'static,
    {
        self.on_content_filtered = Arc::new(hook);
        self
    }

    /// Keep at most `max_messages` non-system messages between rounds.
    pub fn with_history_limit(self, max_messages: usize) -> Self {
        self.end_of_round(move |_, history| crate::history::truncate(history, max_messages))
    }
}

impl std::fmt::Debug for LoopHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHooks").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_neutral() {
        let hooks = LoopHooks::default();
        let history = vec![Message::user("a"), Message::assistant("b")];
        assert_eq!((hooks.end_of_round)(0, history.clone()), history);

        let err = (hooks.on_content_filtered)(ProviderError::ContentFiltered("x".into()), &history)
            .unwrap_err();
        assert!(err.is_content_filtered());
    }

    #[test]
    fn content_filter_hook_can_substitute() {
        let hooks = LoopHooks::new().on_content_filtered(|_, _| {
            Ok(ProviderResponse::new(Message::assistant("I can't help with that."), "fallback"))
        });
        let response = (hooks.on_content_filtered)(ProviderError::ContentFiltered("x".into()), &[]).unwrap();
        assert_eq!(response.model, "fallback");
    }
}
