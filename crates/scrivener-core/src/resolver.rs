//! Disambiguation Resolver: turns a selection on a parked session into
//! full Items.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{SessionError, TranslationError, TranslatorError};
use crate::item::Item;
use crate::sandbox::{ExecutionMode, ExecutionOutcome, Sandbox};
use crate::session::{Completion, SessionStore};

#[derive(Clone)]
pub struct Resolver {
    sessions: Arc<SessionStore>,
    sandbox: Sandbox,
}

impl Resolver {
    pub fn new(sessions: Arc<SessionStore>, sandbox: Sandbox) -> Self {
        Self { sessions, sandbox }
    }

    /// Validate the selection and consume the session.
    pub fn claim(&self, token: &str, selected: &[String]) -> Result<Completion, SessionError> {
        self.sessions.complete(token, selected)
    }

    /// Run the session's translator over the selected ids, under the snapshot
    /// the session was opened with. An empty result is a valid success.
    pub async fn run(
        &self,
        completion: Completion,
        cancel: &CancellationToken,
    ) -> Result<Vec<Item>, TranslationError> {
        let session = completion.session;
        let id = session.translator.id.clone();

        tracing::info!(
            translator = %id,
            selected = completion.selected.len(),
            offered = session.pending.len(),
            "completing selection"
        );

        let outcome = self
            .sandbox
            .execute(
                session.snapshot,
                session.translator,
                session.input,
                ExecutionMode::Complete(completion.selected),
                cancel,
            )
            .await?;
        match outcome {
            ExecutionOutcome::Items(items) => Ok(items),
            ExecutionOutcome::Selection(_) => Err(TranslatorError::malformed(
                &id,
                "completion produced another selection",
            )
            .into()),
        }
    }

    /// [`Resolver::claim`] then [`Resolver::run`].
    pub async fn resolve(
        &self,
        token: &str,
        selected: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Item>, TranslationError> {
        let completion = self.claim(token, selected)?;
        self.run(completion, cancel).await
    }
}
