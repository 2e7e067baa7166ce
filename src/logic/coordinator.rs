//! Generation requests for battles and summons: dedup guards, retries with
//! confirmation, digesting long battles and picking the battle field.

use crate::config::{FieldPreset, GameSettings};
use crate::models::{
    validate_turns, BattleOutcome, MonsterStats, Participant, ParticipantIndex, RawTurn,
    TurnRecord,
};
use crate::services::{
    ChatMessage, ChatRequest, EmbeddingRequest, GenerationError, GenerationService, RetryPrompt,
};
use crate::session::{BattleData, PreparedBattle, Session};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// What a `run_battle` call did. Only exhausted retries are errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleRunStatus {
    /// A participant is unknown or has no finalised card yet.
    NotReady,
    /// A request for this match is running or already succeeded.
    AlreadyRequested,
    Generated,
    /// The caller declined to retry after a failure.
    Aborted,
}

/// What a `run_summon` call did.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SummonStatus {
    UnknownParticipant,
    NoImage,
    /// Another summon or a battle generation is running.
    Busy,
    Summoned { voice_line: String },
    Aborted,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Generation failed {attempts} time(s): {source}")]
    GenerationFailed {
        attempts: u32,
        #[source]
        source: GenerationError,
    },
}

#[derive(Deserialize)]
struct DigestReply {
    #[serde(rename = "BattleSituation")]
    battle_situation: Vec<RawTurn>,
}

/// Cosine similarity; `None` for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

/// Index of the preset most similar to `embedding`; earlier presets win ties.
pub fn nearest_field(embedding: &[f32], presets: &[FieldPreset]) -> usize {
    nearest_vector(embedding, presets.iter().map(|p| p.embedding.as_slice()))
}

fn nearest_vector<'a>(embedding: &[f32], candidates: impl Iterator<Item = &'a [f32]>) -> usize {
    let mut best: Option<(usize, f32)> = None;
    for (i, candidate) in candidates.enumerate() {
        let Some(score) = cosine_similarity(embedding, candidate) else {
            continue;
        };
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i).unwrap_or(0)
}

/// Serialises generation calls for the active match and stores their results in the session.
pub struct MatchRequestCoordinator {
    session: Arc<Session>,
    service: Arc<dyn GenerationService>,
    prompt: Arc<dyn RetryPrompt>,
    settings: Arc<GameSettings>,
    /// One vector per field preset, filled on first use.
    field_vectors: OnceCell<Vec<Vec<f32>>>,
}

impl MatchRequestCoordinator {
    pub fn new(
        session: Arc<Session>,
        service: Arc<dyn GenerationService>,
        prompt: Arc<dyn RetryPrompt>,
        settings: Arc<GameSettings>,
    ) -> Self {
        Self {
            session,
            service,
            prompt,
            settings,
            field_vectors: OnceCell::new(),
        }
    }

    /// Embed the labels of field presets that have no vector yet.
    ///
    /// Runs once; a failure leaves nothing cached so the next battle tries again.
    pub async fn prepare_fields(&self) -> Result<(), GenerationError> {
        self.field_vectors().await.map(|_| ())
    }

    /// Generate the battle for the active match, if there is one.
    pub async fn run_active_battle(&self) -> Result<BattleRunStatus, CoordinatorError> {
        match self.session.active_match() {
            Some(active) => {
                self.run_battle(active.participants[0], active.participants[1])
                    .await
            }
            None => Ok(BattleRunStatus::NotReady),
        }
    }

    /// Generate a battle between `a` and `b` and publish it to the session.
    ///
    /// 1. Both participants need a finalised card, otherwise nothing happens.
    /// 2. Only one request per match: later calls are no-ops while one runs or after success.
    /// 3. Failures are retried up to `max_attempts`, asking before each retry.
    pub async fn run_battle(
        &self,
        a: ParticipantIndex,
        b: ParticipantIndex,
    ) -> Result<BattleRunStatus, CoordinatorError> {
        let (Some(pa), Some(pb)) = (self.session.participant(a), self.session.participant(b)) else {
            return Ok(BattleRunStatus::NotReady);
        };
        let (Some(stats_a), Some(stats_b)) = (ready_stats(&pa), ready_stats(&pb)) else {
            log::debug!("Battle {} vs {} not ready: card missing", a, b);
            return Ok(BattleRunStatus::NotReady);
        };
        if !self.session.try_begin_request() {
            log::debug!("Battle {} vs {} already requested", a, b);
            return Ok(BattleRunStatus::AlreadyRequested);
        }
        self.session.publish_battle(BattleData::Generating);

        let request = self.battle_request(stats_a, stats_b);
        let result = self
            .with_retries(
                || self.generate_battle(&request),
                || {
                    self.session.record_request_error();
                },
            )
            .await;
        match result {
            Ok(Some(prepared)) => {
                log::info!(
                    "Battle {} vs {} generated: {} turn(s) at field {}",
                    a,
                    b,
                    prepared.outcome.turns.len(),
                    prepared.field_no
                );
                self.session
                    .publish_battle(BattleData::Ready(Arc::new(prepared)));
                self.session.finish_request(true);
                Ok(BattleRunStatus::Generated)
            }
            Ok(None) => {
                self.session.publish_battle(BattleData::Empty);
                self.session.finish_request(false);
                Ok(BattleRunStatus::Aborted)
            }
            Err(e) => {
                self.session.publish_battle(BattleData::Empty);
                self.session.finish_request(false);
                Err(e)
            }
        }
    }

    /// Generate stats for an uploaded image and finalise the participant's card.
    pub async fn run_summon(&self, index: ParticipantIndex) -> Result<SummonStatus, CoordinatorError> {
        let Some(participant) = self.session.participant(index) else {
            return Ok(SummonStatus::UnknownParticipant);
        };
        let Some(image) = participant.image.clone() else {
            return Ok(SummonStatus::NoImage);
        };
        if self.session.request_state().in_flight || !self.session.try_begin_summon() {
            return Ok(SummonStatus::Busy);
        }
        let result = self
            .with_retries(|| self.generate_stats(&image), || {})
            .await;
        let status = match result {
            Ok(Some(stats)) => self
                .session
                .update_participant(index, |p| {
                    p.apply_summon(stats, image.clone());
                    p.summon_voice_line()
                })
                .map(|voice_line| SummonStatus::Summoned { voice_line })
                .unwrap_or(SummonStatus::UnknownParticipant),
            Ok(None) => SummonStatus::Aborted,
            Err(e) => {
                self.session.finish_summon();
                return Err(e);
            }
        };
        self.session.finish_summon();
        if let SummonStatus::Summoned { .. } = status {
            log::info!("Participant {} summoned", index);
        }
        Ok(status)
    }

    /// Run `op` until it succeeds, the caller declines a retry (`Ok(None)`), or attempts run out.
    async fn with_retries<T, F, Fut>(
        &self,
        mut op: F,
        on_error: impl Fn(),
    ) -> Result<Option<T>, CoordinatorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match op().await {
                Ok(value) => return Ok(Some(value)),
                Err(e) => e,
            };
            on_error();
            log::warn!("Generation attempt {}/{} failed: {}", attempt, max_attempts, error);
            if attempt >= max_attempts {
                self.prompt.report_failure(attempt, &error);
                return Err(CoordinatorError::GenerationFailed {
                    attempts: attempt,
                    source: error,
                });
            }
            if !self.prompt.confirm_retry(attempt, max_attempts, &error).await {
                log::info!("Generation abandoned after {} attempt(s)", attempt);
                return Ok(None);
            }
        }
    }

    fn battle_request(&self, a: &MonsterStats, b: &MonsterStats) -> ChatRequest {
        let [p1, p2] = self.settings.placeholders();
        let prompts = &self.settings.prompts;
        let m1 = a.to_prompt_json(p1).to_string();
        let m2 = b.to_prompt_json(p2).to_string();
        let user = prompts
            .battle_user
            .replace("{dummyName1}", p1)
            .replace("{dummyName2}", p2)
            .replace("{max_turn}", &self.settings.max_turn_count.to_string())
            .replace("{monster1}", &m1)
            .replace("{monster2}", &m2);
        ChatRequest::json_object(
            &self.settings.battle_model,
            vec![
                ChatMessage::system(&prompts.battle_system),
                ChatMessage::user(user),
            ],
            self.settings.battle_max_tokens,
        )
    }

    async fn generate_battle(&self, request: &ChatRequest) -> Result<PreparedBattle, GenerationError> {
        let text = self.service.complete(request).await?;
        let mut outcome = BattleOutcome::from_json_str(&text)?;
        if self.settings.digest_enabled && outcome.turns.len() > self.settings.digest_turn_count {
            outcome.turns = self.digest(outcome.turns).await;
        }
        let field_no = self.classify_field(&outcome.location).await?;
        Ok(PreparedBattle { outcome, field_no })
    }

    /// Compress turns to the configured count. Any unusable reply keeps the original turns.
    async fn digest(&self, turns: Vec<TurnRecord>) -> Vec<TurnRecord> {
        let raw: Vec<RawTurn> = turns.iter().map(RawTurn::from_record).collect();
        let payload = serde_json::json!({ "BattleSituation": raw }).to_string();
        let prompts = &self.settings.prompts;
        let user = prompts
            .digest_user
            .replace("{count}", &self.settings.digest_turn_count.to_string())
            .replace("{turns}", &payload);
        let request = ChatRequest::json_object(
            &self.settings.battle_model,
            vec![ChatMessage::system(&prompts.digest_system), ChatMessage::user(user)],
            self.settings.battle_max_tokens,
        );
        let digested = match self.service.complete(&request).await {
            Ok(text) => serde_json::from_str::<DigestReply>(&text)
                .map_err(|e| e.to_string())
                .and_then(|reply| validate_turns(reply.battle_situation).map_err(|e| e.to_string())),
            Err(e) => Err(e.to_string()),
        };
        match digested {
            Ok(mut short) => {
                short[0] = turns[0].clone();
                log::debug!("Digested battle from {} to {} turn(s)", turns.len(), short.len());
                short
            }
            Err(reason) => {
                log::warn!("Battle digest unusable, keeping full battle: {}", reason);
                turns
            }
        }
    }

    async fn classify_field(&self, location: &str) -> Result<String, GenerationError> {
        let presets = &self.settings.field_presets;
        let Some(first) = presets.first() else {
            return Ok("01".to_string());
        };
        if location.trim().is_empty() {
            return Ok(first.field_no.clone());
        }
        let vectors = self.field_vectors().await?;
        if vectors.iter().all(Vec::is_empty) {
            return Ok(first.field_no.clone());
        }
        let request = EmbeddingRequest::new(&self.settings.embedding_model, location);
        let embedding = self.service.embed(&request).await?;
        let nearest = nearest_vector(&embedding, vectors.iter().map(Vec::as_slice));
        Ok(presets[nearest].field_no.clone())
    }

    async fn field_vectors(&self) -> Result<&[Vec<f32>], GenerationError> {
        let vectors = self
            .field_vectors
            .get_or_try_init(|| async {
                let mut vectors = Vec::with_capacity(self.settings.field_presets.len());
                let mut embedded = 0;
                for preset in &self.settings.field_presets {
                    if !preset.embedding.is_empty() || preset.label.trim().is_empty() {
                        vectors.push(preset.embedding.clone());
                        continue;
                    }
                    let request =
                        EmbeddingRequest::new(&self.settings.embedding_model, preset.label.as_str());
                    vectors.push(self.service.embed(&request).await?);
                    embedded += 1;
                }
                if embedded > 0 {
                    log::info!("Embedded {} field preset label(s)", embedded);
                }
                Ok::<_, GenerationError>(vectors)
            })
            .await?;
        Ok(vectors.as_slice())
    }

    async fn generate_stats(&self, image: &str) -> Result<MonsterStats, GenerationError> {
        let prompts = &self.settings.prompts;
        let request = ChatRequest::json_object(
            &self.settings.summon_model,
            vec![
                ChatMessage::system(&prompts.summon_system),
                ChatMessage::user_with_image(&prompts.summon_user, image),
            ],
            self.settings.summon_max_tokens,
        );
        let text = self.service.complete(&request).await?;
        serde_json::from_str(&text).map_err(|e| GenerationError::Malformed(e.to_string()))
    }
}

fn ready_stats(p: &Participant) -> Option<&MonsterStats> {
    if p.is_ready() {
        p.stats.as_ref()
    } else {
        None
    }
}
