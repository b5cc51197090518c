use crate::{
    console::{self, Answer, OperatorConsole},
    llm::{CompletionParams, LlmClient},
    prompts::PromptAssembler,
    retry::RetryPolicy,
    similarity::SimilarityGate,
    strategy::{strategy_for, ResponseStrategy, TurnContext},
};
use cryptochat_core::config::{LlmConfig, RoomConfig, SimilarityConfig};
use cryptochat_core::turn_taking::{
    maybe_reaction, opening_line, pick_participants, select_next_speaker, should_ask_question,
    turn_budget,
};
use cryptochat_core::{
    ChatConfig, ChatError, Enrichment, PersonaRegistry, Session, TopicEnrichment,
    TranscriptStore, Turn,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Discussion state machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscussionState {
    Idle,
    AwaitingTopic,
    InRound,
    AwaitingContinue,
    AwaitingTopicChange,
    Ended,
}

impl DiscussionState {
    pub fn can_transition_to(self, next: DiscussionState) -> bool {
        use DiscussionState::*;
        matches!(
            (self, next),
            (Idle, AwaitingTopic)
                | (AwaitingTopic, InRound)
                | (AwaitingTopic, Ended)
                | (InRound, AwaitingContinue)
                | (AwaitingContinue, InRound)
                | (AwaitingContinue, AwaitingTopicChange)
                | (AwaitingContinue, Ended)
                | (AwaitingTopicChange, InRound)
                | (AwaitingTopicChange, Ended)
                | (Ended, Idle)
        )
    }
}

impl std::fmt::Display for DiscussionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Everything observable about a running discussion. Reactions only travel here.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscussionEvent {
    Started {
        room_id: String,
        topic: String,
        participants: Vec<String>,
    },
    Turn(Turn),
    Reaction {
        after_seq: usize,
        symbol: &'static str,
    },
    TopicChanged {
        topic: String,
        participants: Vec<String>,
    },
    Ended {
        room_id: String,
        turns: usize,
    },
}

type EventSink = Box<dyn FnMut(&DiscussionEvent) + Send>;

/// Time allowed for one completion call: the configured budget, widened to fit
/// every attempt of the client's retry policy.
fn completion_budget(llm: &LlmConfig) -> Duration {
    let configured = Duration::from_secs(llm.timeout_secs);
    let needed = RetryPolicy::from_config(llm).call_budget();
    if needed > configured {
        tracing::debug!(
            "Raising completion budget from {:?} to {:?} to fit {} attempts",
            configured,
            needed,
            llm.max_attempts
        );
    }
    configured.max(needed)
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct DiscussionOrchestrator {
    registry: Arc<PersonaRegistry>,
    client: Arc<dyn LlmClient>,
    store: Arc<dyn TranscriptStore>,
    enrichment: Option<Arc<dyn TopicEnrichment>>,
    strategy: Box<dyn ResponseStrategy>,
    gate: SimilarityGate,
    similarity: SimilarityConfig,
    room: RoomConfig,
    base_params: CompletionParams,
    call_timeout: Duration,
    rng: StdRng,
    state: DiscussionState,
    on_event: Option<EventSink>,
}

impl DiscussionOrchestrator {
    pub fn new(
        registry: Arc<PersonaRegistry>,
        client: Arc<dyn LlmClient>,
        store: Arc<dyn TranscriptStore>,
        config: &ChatConfig,
    ) -> Self {
        let call_timeout = completion_budget(&config.llm);
        let rng = match config.room.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            gate: SimilarityGate::new(client.clone(), config.similarity.threshold)
                .with_timeout(call_timeout),
            registry,
            client,
            store,
            enrichment: None,
            strategy: strategy_for(config.strategy),
            similarity: config.similarity.clone(),
            room: config.room.clone(),
            base_params: CompletionParams::from(&config.sampling),
            call_timeout,
            rng,
            state: DiscussionState::Idle,
            on_event: None,
        }
    }

    pub fn with_enrichment(mut self, enrichment: Arc<dyn TopicEnrichment>) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ResponseStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&DiscussionEvent) + Send + 'static,
    {
        self.on_event = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> DiscussionState {
        self.state
    }

    fn transition(&mut self, next: DiscussionState) -> Result<(), ChatError> {
        if !self.state.can_transition_to(next) {
            return Err(ChatError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!("Discussion state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn emit(&mut self, event: DiscussionEvent) {
        if let Some(callback) = self.on_event.as_mut() {
            callback(&event);
        }
    }

    // ------------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------------

    /// Validate the topic and pool, open the transcript room and enter `InRound`.
    pub async fn start_session(&mut self, topic: &str, pool: Vec<String>) -> Result<Session, ChatError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ChatError::EmptyTopic);
        }
        if pool.is_empty() {
            return Err(ChatError::EmptyPool);
        }
        for handle in &pool {
            self.registry.require(handle)?;
        }

        if self.state == DiscussionState::Idle {
            self.transition(DiscussionState::AwaitingTopic)?;
        }

        let session = Session::new(topic, pool);
        self.store
            .create_room(&session.room_id)
            .await
            .map_err(|source| ChatError::RoomSetup {
                room_id: session.room_id.clone(),
                source,
            })?;

        self.transition(DiscussionState::InRound)?;
        tracing::info!(
            "Discussion {} started in {} on {:?} with {:?}",
            session.id,
            session.room_id,
            session.topic,
            session.pool
        );
        self.emit(DiscussionEvent::Started {
            room_id: session.room_id.clone(),
            topic: session.topic.clone(),
            participants: session.pool.clone(),
        });
        Ok(session)
    }

    /// Post the scripted opening line for the current topic.
    pub async fn open_round(&mut self, session: &mut Session) -> Result<(), ChatError> {
        let last = session.last_speaker().map(str::to_string);
        let speaker = select_next_speaker(&session.pool, &mut session.usage, last.as_deref(), &mut self.rng)?;
        let (text, question) = opening_line(&session.topic, &mut self.rng);
        let turn = session.record(&speaker, text, question, false).clone();
        self.persist(&session.room_id, &turn).await;
        self.emit(DiscussionEvent::Turn(turn));
        Ok(())
    }

    /// Generate, vet and record one persona turn.
    #[tracing::instrument(skip(self, session), fields(room = %session.room_id))]
    pub async fn play_turn(&mut self, session: &mut Session) -> Result<(), ChatError> {
        let last = session.last_speaker().map(str::to_string);
        let speaker = select_next_speaker(&session.pool, &mut session.usage, last.as_deref(), &mut self.rng)?;
        let registry = Arc::clone(&self.registry);
        let persona = registry.require(&speaker)?;

        let answer_previous = session.last_turn().is_some_and(|t| t.is_question);
        let ask_question = should_ask_question(answer_previous, &mut self.rng);

        let grounding = if self.strategy.wants_grounding() {
            self.lookup_grounding(session).await
        } else {
            None
        };

        let window = session.recent(self.room.context_window);
        let ctx = TurnContext {
            topic: &session.topic,
            recent: window,
            answer_previous,
            ask_question,
            grounding: grounding.as_ref(),
        };
        let system = self.strategy.system_prompt(persona);
        let user = self.strategy.turn_prompt(persona, &ctx);
        let params = self.strategy.sampling(&self.base_params);
        tracing::debug!("Prompting {} (question: {})", speaker, ask_question);

        let mut reply = match self.generate(&system, &user, params.clone()).await {
            Some(raw) => Some(self.strategy.finish(persona, &raw, &mut self.rng)),
            None => None,
        }
        .filter(|styled| !styled.text.is_empty());

        let draft = reply
            .as_ref()
            .filter(|_| self.similarity.enabled)
            .map(|styled| styled.text.clone());
        if let Some(draft) = draft {
            let history: Vec<String> = session
                .recent(self.similarity.history_window)
                .iter()
                .map(|t| t.text.clone())
                .collect();
            if self.gate.is_too_similar(&draft, &history).await {
                tracing::info!("{} repeated the room, regenerating once", speaker);
                let retry_prompt = PromptAssembler::regeneration(&user, &draft);
                let hotter = params.hotter(self.similarity.regeneration_temperature_boost);
                if let Some(raw) = self.generate(&system, &retry_prompt, hotter).await {
                    let styled = self.strategy.finish(persona, &raw, &mut self.rng);
                    if !styled.text.is_empty() {
                        reply = Some(styled);
                    }
                }
            }
        }

        let turn = match reply {
            Some(styled) => session
                .record(&speaker, styled.text, styled.is_question, false)
                .clone(),
            None => {
                tracing::warn!("No usable reply from {}, posting placeholder", speaker);
                session
                    .record(&speaker, self.room.fallback_line.clone(), false, true)
                    .clone()
            }
        };
        self.persist(&session.room_id, &turn).await;
        let seq = turn.seq;
        self.emit(DiscussionEvent::Turn(turn));

        if let Some(symbol) = maybe_reaction(&mut self.rng) {
            self.emit(DiscussionEvent::Reaction { after_seq: seq, symbol });
        }
        Ok(())
    }

    /// Play up to `turns` turns, pacing between them. Running out of eligible
    /// speakers ends the round early.
    pub async fn run_round(&mut self, session: &mut Session, turns: usize) -> Result<usize, ChatError> {
        let mut played = 0;
        for i in 0..turns {
            if i > 0 {
                self.pace().await;
            }
            match self.play_turn(session).await {
                Ok(()) => played += 1,
                Err(ChatError::NoEligibleSpeaker { last }) => {
                    tracing::warn!("Round ended early, only {} is left to speak", last);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(played)
    }

    fn finish_session(&mut self, session: &Session) -> Result<(), ChatError> {
        self.transition(DiscussionState::Ended)?;
        tracing::info!("Discussion {} ended after {} turns", session.id, session.turns.len());
        self.emit(DiscussionEvent::Ended {
            room_id: session.room_id.clone(),
            turns: session.turns.len(),
        });
        self.transition(DiscussionState::Idle)
    }

    // ------------------------------------------------------------------------
    // Batch mode
    // ------------------------------------------------------------------------

    /// One bounded discussion with random participants and a random turn budget.
    pub async fn simulate_discussion(&mut self, topic: &str) -> Result<Session, ChatError> {
        let pool = pick_participants(
            &self.registry,
            self.room.participants_min,
            self.room.participants_max,
            &mut self.rng,
        );
        let mut session = self.start_session(topic, pool).await?;
        self.open_round(&mut session).await?;
        let budget = turn_budget(self.room.turns_min, self.room.turns_max, &mut self.rng);
        self.run_round(&mut session, budget).await?;
        self.transition(DiscussionState::AwaitingContinue)?;
        self.finish_session(&session)?;
        Ok(session)
    }

    /// Run each topic in turn, or the configured topic list when `topics` is empty.
    pub async fn simulate_multiple_discussions(&mut self, topics: &[String]) -> Result<Vec<Session>, ChatError> {
        let topics = if topics.is_empty() {
            self.room.topics.clone()
        } else {
            topics.to_vec()
        };

        let mut sessions = Vec::with_capacity(topics.len());
        for (i, topic) in topics.iter().enumerate() {
            sessions.push(self.simulate_discussion(topic).await?);
            if i + 1 < topics.len() && self.room.discussion_gap_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.room.discussion_gap_ms)).await;
            }
        }
        Ok(sessions)
    }

    // ------------------------------------------------------------------------
    // Interactive mode
    // ------------------------------------------------------------------------

    /// Operator-driven discussion. `None` when the operator backs out before
    /// a session starts.
    pub async fn run_interactive(
        &mut self,
        console: &mut dyn OperatorConsole,
    ) -> Result<Option<Session>, ChatError> {
        self.transition(DiscussionState::AwaitingTopic)?;
        let roster = self.registry.handles();

        let (topic, pool) = loop {
            let Some(topic) = console::ask_topic(console) else {
                self.transition(DiscussionState::Ended)?;
                self.transition(DiscussionState::Idle)?;
                return Ok(None);
            };
            if let Some(pool) = console::ask_selection(console, &roster) {
                break (topic, pool);
            }
        };

        let mut session = self.start_session(&topic, pool).await?;
        self.open_round(&mut session).await?;

        loop {
            self.run_round(&mut session, 1).await?;
            self.transition(DiscussionState::AwaitingContinue)?;

            match console::ask_yes_no(console, "continue? (yes/no): ") {
                Answer::Yes => {}
                Answer::No | Answer::Back => break,
            }

            if console::ask_yes_no(console, "change topic? (yes/no): ") != Answer::Yes {
                self.transition(DiscussionState::InRound)?;
                continue;
            }

            self.transition(DiscussionState::AwaitingTopicChange)?;
            let Some(topic) = console::ask_topic(console) else {
                self.transition(DiscussionState::InRound)?;
                continue;
            };
            let pool = console::ask_selection(console, &roster).unwrap_or_else(|| session.pool.clone());
            session.change_topic(&topic, pool);
            tracing::info!("Topic changed to {:?} with {:?}", session.topic, session.pool);
            self.emit(DiscussionEvent::TopicChanged {
                topic: session.topic.clone(),
                participants: session.pool.clone(),
            });
            self.transition(DiscussionState::InRound)?;
            self.open_round(&mut session).await?;
        }

        self.finish_session(&session)?;
        Ok(Some(session))
    }

    // ------------------------------------------------------------------------
    // Probing
    // ------------------------------------------------------------------------

    /// One-off completion for a single persona, outside any session.
    pub async fn probe_persona(&self, handle: &str, prompt: &str) -> Result<String, ChatError> {
        let persona = self.registry.require(handle)?;
        let system = self.strategy.system_prompt(persona);
        let params = self.strategy.sampling(&self.base_params);
        Ok(self
            .generate(&system, prompt, params)
            .await
            .map(|text| text.trim().to_string())
            .unwrap_or_else(|| self.room.fallback_line.clone()))
    }

    // ------------------------------------------------------------------------
    // Collaborator boundaries
    // ------------------------------------------------------------------------

    /// Completion with a timeout. Failures and empty replies become `None`.
    async fn generate(&self, system: &str, user: &str, params: CompletionParams) -> Option<String> {
        match tokio::time::timeout(self.call_timeout, self.client.complete(system, user, params)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => {
                tracing::warn!("Completion came back empty");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!("Completion failed: {:#}", e);
                None
            }
            Err(_) => {
                tracing::warn!("Completion timed out after {:?}", self.call_timeout);
                None
            }
        }
    }

    async fn lookup_grounding(&self, session: &Session) -> Option<Enrichment> {
        let enrichment = self.enrichment.as_ref()?;
        let context = PromptAssembler::chat_history(session.recent(self.room.context_window));
        match tokio::time::timeout(self.call_timeout, enrichment.lookup(&session.topic, &context)).await {
            Ok(Ok(found)) if !found.is_empty() => Some(found),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!("Topic enrichment failed: {:#}", e);
                None
            }
            Err(_) => {
                tracing::warn!("Topic enrichment timed out");
                None
            }
        }
    }

    async fn persist(&self, room_id: &str, turn: &Turn) {
        if let Err(e) = self.store.append_message(room_id, &turn.speaker, &turn.text).await {
            tracing::warn!("Failed to persist turn {} in {}: {:#}", turn.seq, room_id, e);
        }
    }

    async fn pace(&mut self) {
        let (min, max) = (self.room.pacing_min_ms, self.room.pacing_max_ms);
        let delay = if max > min { self.rng.gen_range(min..max) } else { min };
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DiscussionState::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(Idle.can_transition_to(AwaitingTopic));
        assert!(AwaitingTopic.can_transition_to(InRound));
        assert!(InRound.can_transition_to(AwaitingContinue));
        assert!(AwaitingContinue.can_transition_to(InRound));
        assert!(AwaitingContinue.can_transition_to(AwaitingTopicChange));
        assert!(AwaitingContinue.can_transition_to(Ended));
        assert!(AwaitingTopicChange.can_transition_to(InRound));
        assert!(Ended.can_transition_to(Idle));
    }

    #[test]
    fn test_completion_budget_fits_all_attempts() {
        let llm = LlmConfig {
            timeout_secs: 5,
            request_timeout_secs: 10,
            max_attempts: 3,
            ..LlmConfig::default()
        };
        assert!(completion_budget(&llm) >= Duration::from_secs(30));

        let single = LlmConfig {
            timeout_secs: 60,
            request_timeout_secs: 10,
            max_attempts: 1,
            ..LlmConfig::default()
        };
        assert_eq!(completion_budget(&single), Duration::from_secs(60));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!Idle.can_transition_to(InRound));
        assert!(!InRound.can_transition_to(Ended));
        assert!(!InRound.can_transition_to(AwaitingTopicChange));
        assert!(!Ended.can_transition_to(InRound));
        assert!(!AwaitingTopicChange.can_transition_to(AwaitingContinue));
    }
}
