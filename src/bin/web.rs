//! Single binary web server: the monster tournament as a JSON API.
//! Run with: cargo run --bin web
//! Listens on 0.0.0.0:8080 by default. Override with env: HOST, PORT.
//! Generation uses OPENAI_API_KEY / OPENAI_ENDPOINT / OPENAI_EMBEDDING_ENDPOINT,
//! game settings come from the JSON file in CHATMON_SETTINGS, and snapshots are
//! written to CHATMON_STORAGE_DIR (kept in memory when unset).

use actix_web::{
    delete, get, post,
    web::{Data, Json, Path, Query},
    App, HttpResponse, HttpServer, Responder,
};
use chatmon_tournament::logic::{PlaybackEvent, PlaybackPhase};
use chatmon_tournament::models::{name_from_file_name, MAX_BRACKET_SIZE};
use chatmon_tournament::persistence::PersistenceError;
use chatmon_tournament::services::{
    OpenAiClient, PendingRetryPrompt, RetryQuestion, SilentNarrator,
};
use chatmon_tournament::session::{ActiveMatch, MatchRequestState};
use chatmon_tournament::{
    ApiSettings, BattlePlaybackController, BracketSlot, EventLog, FileStore, GameSettings,
    KeyValueStore, MatchRequestCoordinator, MemoryStore, Participant, PersistenceGateway, Session,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fewest uploads that make a tournament.
const MIN_ROSTER: usize = 2;

/// Everything the handlers share. One tournament per server.
struct AppState {
    session: Arc<Session>,
    coordinator: Arc<MatchRequestCoordinator>,
    playback: Arc<BattlePlaybackController>,
    events: Arc<EventLog>,
    retry: Arc<PendingRetryPrompt>,
    storage: Arc<PersistenceGateway>,
    settings: Arc<GameSettings>,
}

type State = Data<AppState>;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
}

#[derive(Serialize)]
struct TournamentView {
    roster: Vec<Participant>,
    bracket: Vec<BracketSlot>,
    active_match: Option<ActiveMatch>,
    request: MatchRequestState,
    /// A failed generation waiting for /retry or /abort.
    retry_question: Option<RetryQuestion>,
    battle_ready: bool,
    complete: bool,
    champion: Option<Participant>,
    playback: PlaybackPhase,
}

#[derive(Deserialize)]
struct RosterEntry {
    /// Upload file name; a name after the last `_` names the participant.
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    /// Image reference (URL or data URL) sent to the summon request.
    #[serde(default)]
    image: Option<String>,
}

#[derive(Deserialize)]
struct RosterBody {
    entries: Vec<RosterEntry>,
}

#[derive(Deserialize)]
struct NextMatchBody {
    #[serde(default)]
    reset_cards: Option<bool>,
}

#[derive(Deserialize)]
struct ParticipantPath {
    index: usize,
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(default)]
    offset: usize,
}

#[derive(Serialize)]
struct EventsResponse {
    phase: PlaybackPhase,
    events: Vec<PlaybackEvent>,
    next_offset: usize,
}

fn error_json(message: impl ToString) -> serde_json::Value {
    serde_json::json!({ "error": message.to_string() })
}

fn tournament_view(state: &AppState) -> TournamentView {
    let session = &state.session;
    TournamentView {
        roster: session.roster(),
        bracket: session.bracket().into_slots(),
        active_match: session.active_match(),
        request: session.request_state(),
        retry_question: state.retry.pending(),
        battle_ready: session.battle_data().prepared().is_some(),
        complete: session.is_tournament_complete(),
        champion: session.champion(),
        playback: state.playback.phase(),
    }
}

/// Best-effort snapshot after a state change.
async fn persist(state: &AppState) {
    state.storage.save_or_warn(&state.session.snapshot()).await;
}

/// Roster and bracket changes are refused while something is generating or playing.
fn busy_response(state: &AppState) -> Option<HttpResponse> {
    if state.playback.is_running() {
        return Some(HttpResponse::Conflict().json(error_json("A battle is being played")));
    }
    if state.session.is_busy() {
        return Some(HttpResponse::Conflict().json(error_json("A generation request is running")));
    }
    None
}

#[get("/api/health")]
async fn api_health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        ok: true,
        service: "chatmon-tournament",
    })
}

/// Avoid 404 in browser tab: favicon not required for app logic.
#[get("/favicon.ico")]
async fn favicon() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

/// Roster, bracket and the state of the active match.
#[get("/api/tournament")]
async fn api_get_tournament(state: State) -> HttpResponse {
    HttpResponse::Ok().json(tournament_view(&state))
}

/// Replace the roster with a new upload batch and seed a fresh bracket.
#[post("/api/roster")]
async fn api_replace_roster(state: State, body: Json<RosterBody>) -> HttpResponse {
    if let Some(resp) = busy_response(&state) {
        return resp;
    }
    let count = body.entries.len();
    if !(MIN_ROSTER..=MAX_BRACKET_SIZE).contains(&count) {
        return HttpResponse::BadRequest().json(error_json(format!(
            "Upload between {} and {} monsters, got {}",
            MIN_ROSTER, MAX_BRACKET_SIZE, count
        )));
    }
    let participants = body
        .into_inner()
        .entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let name = entry
                .name
                .or_else(|| entry.file_name.as_deref().map(name_from_file_name));
            Participant::new(i, name, entry.image)
        })
        .collect();
    if let Err(e) = state.session.replace_roster(participants) {
        return HttpResponse::BadRequest().json(error_json(e));
    }
    state.events.clear();
    persist(&state).await;
    HttpResponse::Ok().json(tournament_view(&state))
}

/// Continue the previous tournament; this path requires a saved snapshot.
#[post("/api/tournament/continue")]
async fn api_continue_tournament(state: State) -> HttpResponse {
    if let Some(resp) = busy_response(&state) {
        return resp;
    }
    let snapshot = match state.storage.load_required().await {
        Ok(s) => s,
        Err(PersistenceError::NotFound) => {
            return HttpResponse::NotFound().json(error_json(PersistenceError::NotFound))
        }
        Err(e) => return HttpResponse::InternalServerError().json(error_json(e)),
    };
    match state.session.restore(snapshot) {
        Ok(()) => {
            log::info!("Restored saved tournament");
            HttpResponse::Ok().json(tournament_view(&state))
        }
        Err(e) => HttpResponse::UnprocessableEntity().json(error_json(e)),
    }
}

/// Forget the saved tournament. The in-memory one is untouched.
#[delete("/api/storage")]
async fn api_clear_storage(state: State) -> HttpResponse {
    match state.storage.remove().await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::InternalServerError().json(error_json(e)),
    }
}

/// Generate stats for a participant's image and finalise its card.
#[post("/api/participants/{index}/summon")]
async fn api_summon(state: State, path: Path<ParticipantPath>) -> HttpResponse {
    match state.coordinator.run_summon(path.index).await {
        Ok(status) => {
            persist(&state).await;
            HttpResponse::Ok().json(status)
        }
        Err(e) => HttpResponse::BadGateway().json(error_json(e)),
    }
}

/// Resolve byes, activate the next match and start generating its battle.
#[post("/api/matches/next")]
async fn api_next_match(state: State, body: Option<Json<NextMatchBody>>) -> HttpResponse {
    if let Some(resp) = busy_response(&state) {
        return resp;
    }
    let reset_cards = body
        .and_then(|b| b.reset_cards)
        .unwrap_or(state.settings.card_reset_on_match);
    let active = state.session.begin_next_match(reset_cards);
    persist(&state).await;
    let Some(active) = active else {
        return HttpResponse::Ok().json(serde_json::json!({
            "match": null,
            "complete": state.session.is_tournament_complete(),
            "champion": state.session.champion(),
        }));
    };
    state.events.clear();
    let coordinator = Arc::clone(&state.coordinator);
    actix_web::rt::spawn(async move {
        if let Err(e) = coordinator.run_active_battle().await {
            log::error!("Battle generation failed: {}", e);
        }
    });
    HttpResponse::Ok().json(serde_json::json!({ "match": active }))
}

/// Generate the active match's battle now, e.g. after summoning or a failed attempt.
/// After a failed attempt the response waits for /api/generation/retry or /abort.
#[post("/api/matches/battle")]
async fn api_generate_battle(state: State) -> HttpResponse {
    match state.coordinator.run_active_battle().await {
        Ok(status) => HttpResponse::Ok().json(serde_json::json!({ "status": status })),
        Err(e) => HttpResponse::BadGateway().json(error_json(e)),
    }
}

fn answer_retry(state: &AppState, retry: bool) -> HttpResponse {
    if state.retry.answer(retry) {
        HttpResponse::Ok().json(serde_json::json!({ "retry": retry }))
    } else {
        HttpResponse::Conflict().json(error_json("No failed generation is waiting for an answer"))
    }
}

/// Try the failed generation (battle or summon) again.
#[post("/api/generation/retry")]
async fn api_retry_generation(state: State) -> HttpResponse {
    answer_retry(&state, true)
}

/// Give up on the failed generation; it can be requested again later.
#[post("/api/generation/abort")]
async fn api_abort_generation(state: State) -> HttpResponse {
    answer_retry(&state, false)
}

/// Start playing the active match's battle; progress is read from /api/playback/events.
#[post("/api/playback/start")]
async fn api_start_playback(state: State) -> HttpResponse {
    if state.playback.is_running() {
        return HttpResponse::Conflict().json(error_json("A battle is being played"));
    }
    if state.session.active_match().is_none() {
        return HttpResponse::BadRequest().json(error_json("No match is active"));
    }
    let app = state.into_inner();
    actix_web::rt::spawn(async move {
        match app.playback.play().await {
            Ok(_) => persist(&app).await,
            Err(e) => log::warn!("Playback ended early: {}", e),
        }
    });
    HttpResponse::Accepted().json(serde_json::json!({ "started": true }))
}

#[get("/api/playback/events")]
async fn api_playback_events(state: State, query: Query<EventsQuery>) -> HttpResponse {
    let events = state.events.events_since(query.offset);
    HttpResponse::Ok().json(EventsResponse {
        phase: state.playback.phase(),
        next_offset: query.offset + events.len(),
        events,
    })
}

#[post("/api/playback/stop")]
async fn api_stop_playback(state: State) -> HttpResponse {
    state.playback.stop();
    HttpResponse::Ok().json(serde_json::json!({ "phase": state.playback.phase() }))
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn storage_from_env() -> Box<dyn KeyValueStore> {
    match std::env::var("CHATMON_STORAGE_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            log::info!("Saving tournaments to {}", dir.trim());
            Box::new(FileStore::new(dir.trim()))
        }
        _ => {
            log::info!("CHATMON_STORAGE_DIR not set, tournaments are kept in memory only");
            Box::new(MemoryStore::new())
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let host = std::env::var("HOST").unwrap_or_else(|_| default_host());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(default_port);

    let settings = Arc::new(
        GameSettings::from_env()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?,
    );
    let api = ApiSettings::from_env();
    let has_key = !api.api_key.is_empty();
    if !has_key {
        log::warn!("OPENAI_API_KEY is not set, generation requests will be rejected");
    }
    let client = OpenAiClient::new(api).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let session = Arc::new(Session::new());
    let events = Arc::new(EventLog::new());
    let storage = Arc::new(PersistenceGateway::new(
        storage_from_env(),
        settings.storage_key.clone(),
    ));
    if matches!(storage.exists().await, Ok(true)) {
        log::info!("A saved tournament can be continued via /api/tournament/continue");
    }
    let retry = Arc::new(PendingRetryPrompt::new(settings.retry_answer_timeout()));
    let coordinator = Arc::new(MatchRequestCoordinator::new(
        Arc::clone(&session),
        Arc::new(client),
        retry.clone(),
        Arc::clone(&settings),
    ));
    if has_key {
        if let Err(e) = coordinator.prepare_fields().await {
            log::warn!("Field presets not embedded yet, retrying on the first battle: {}", e);
        }
    }
    let playback = Arc::new(BattlePlaybackController::new(
        Arc::clone(&session),
        Arc::new(SilentNarrator),
        events.clone(),
        Arc::clone(&settings),
    ));
    let state = Data::new(AppState {
        session,
        coordinator,
        playback,
        events,
        retry,
        storage,
        settings,
    });

    let bind = (host.as_str(), port);
    log::info!("Starting server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(api_health)
            .service(favicon)
            .service(api_get_tournament)
            .service(api_replace_roster)
            .service(api_continue_tournament)
            .service(api_clear_storage)
            .service(api_summon)
            .service(api_next_match)
            .service(api_generate_battle)
            .service(api_retry_generation)
            .service(api_abort_generation)
            .service(api_start_playback)
            .service(api_playback_events)
            .service(api_stop_playback)
    })
    .bind(bind)?
    .run()
    .await
}
