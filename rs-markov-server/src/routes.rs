use std::collections::HashMap;
use std::sync::Mutex;

use actix_web::{HttpResponse, Responder, delete, get, post, put, web};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use rs_markov_core::MarkovError;
use rs_markov_core::corpus::format_size;
use rs_markov_core::engine::{Outcome, ResponseEngine};
use rs_markov_core::ingest::{IngestReport, ingest_feed, ingest_history};
use rs_markov_core::settings::{ChannelList, MAX_CORPUS, SettingValue};
use rs_markov_core::types::{BotIdentity, ChannelId, CommunityId, IncomingMessage};

pub struct SharedData {
	pub engine: ResponseEngine,
	/// Cancellation tokens of running ingestions, one per community.
	pub ingestions: Mutex<HashMap<CommunityId, CancellationToken>>,
}

impl SharedData {
	pub fn new(engine: ResponseEngine) -> Self {
		Self { engine, ingestions: Mutex::new(HashMap::new()) }
	}
}

/// Body of `/v1/messages`: a message and the bot identity it was received as.
#[derive(Deserialize)]
struct MessageRequest {
	message: IncomingMessage,
	bot: BotIdentity,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum OutcomeBody {
	Ignored,
	Learned { corpus_lines: usize },
	LearnDropped,
	Replied { text: String, delay_secs: Option<f64>, guidance: bool },
}

impl From<Outcome> for OutcomeBody {
	fn from(outcome: Outcome) -> Self {
		match outcome {
			Outcome::Ignored => Self::Ignored,
			Outcome::Learned { corpus_lines } => Self::Learned { corpus_lines },
			Outcome::LearnDropped => Self::LearnDropped,
			Outcome::Replied(reply) => Self::Replied {
				text: reply.text,
				delay_secs: reply.delay.map(|d| d.as_secs_f64()),
				guidance: reply.guidance,
			},
		}
	}
}

#[derive(Serialize)]
struct LearnBody {
	lines: usize,
}

#[derive(Deserialize)]
struct FeedRequest {
	items: Vec<String>,
}

#[derive(Deserialize)]
struct HistoryRequest {
	messages: Vec<String>,
}

#[derive(Serialize)]
struct IngestBody {
	#[serde(flatten)]
	report: IngestReport,
	summary: String,
}

/// Maps core errors onto HTTP statuses. Only storage faults are 500s.
fn error_response(err: MarkovError) -> HttpResponse {
	match &err {
		MarkovError::EmptyCorpus => HttpResponse::UnprocessableEntity().body(err.to_string()),
		MarkovError::CorpusOverflow { max, .. } => HttpResponse::PayloadTooLarge().body(format!(
			"Corpus has reached max size (`{}`) clear corpus or ask administrator to raise your allowance!",
			format_size(*max)
		)),
		MarkovError::NotFound(_) => HttpResponse::NotFound().body(err.to_string()),
		MarkovError::UnknownSetting(_) | MarkovError::InvalidSetting { .. } => {
			HttpResponse::BadRequest().body(err.to_string())
		}
		MarkovError::Cancelled => HttpResponse::Conflict().body(err.to_string()),
		_ => {
			error!(error = %err, "request failed");
			HttpResponse::InternalServerError().body(err.to_string())
		}
	}
}

fn community(path: &str) -> CommunityId {
	CommunityId::from(path)
}

/// HTTP POST endpoint `/v1/messages`
///
/// Runs one incoming message through the policy and engine.
#[post("/v1/messages")]
async fn post_message(data: web::Data<SharedData>, body: web::Json<MessageRequest>) -> impl Responder {
	match data.engine.handle(&body.message, &body.bot).await {
		Ok(outcome) => HttpResponse::Ok().json(OutcomeBody::from(outcome)),
		Err(e) => error_response(e),
	}
}

/// HTTP POST endpoint `/v1/communities/{community}/corpus`
///
/// Sanitizes the raw body and appends it to the corpus.
#[post("/v1/communities/{community}/corpus")]
async fn post_corpus(data: web::Data<SharedData>, path: web::Path<String>, body: String) -> impl Responder {
	match data.engine.learn(&community(&path), &body).await {
		Ok(model) => HttpResponse::Ok().json(LearnBody { lines: model.line_count() }),
		Err(e) => error_response(e),
	}
}

#[delete("/v1/communities/{community}/corpus")]
async fn delete_corpus(data: web::Data<SharedData>, path: web::Path<String>) -> impl Responder {
	match data.engine.corpus().wipe(&community(&path)).await {
		Ok(()) => HttpResponse::Ok().body("Corpus wiped."),
		Err(e) => error_response(e),
	}
}

#[get("/v1/communities/{community}/usage")]
async fn get_usage(data: web::Data<SharedData>, path: web::Path<String>) -> impl Responder {
	match data.engine.corpus().usage(&community(&path)) {
		Ok(usage) => HttpResponse::Ok().body(usage.summary()),
		Err(e) => error_response(e),
	}
}

/// A registered ingestion. Dropping it frees the community's slot, also when
/// the handler future is dropped before completion.
struct IngestionSlot<'a> {
	data: &'a SharedData,
	id: CommunityId,
	token: CancellationToken,
}

impl Drop for IngestionSlot<'_> {
	fn drop(&mut self) {
		self.token.cancel();
		self.data.ingestions.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.id);
	}
}

/// Registers a cancellation token for a new ingestion of `id`.
///
/// Returns `None` if one is already running for that community.
fn start_ingestion<'a>(data: &'a SharedData, id: &CommunityId) -> Option<IngestionSlot<'a>> {
	let mut ingestions = data.ingestions.lock().unwrap_or_else(|e| e.into_inner());
	if ingestions.contains_key(id) {
		return None;
	}
	let token = CancellationToken::new();
	ingestions.insert(id.clone(), token.clone());
	Some(IngestionSlot { data, id: id.clone(), token })
}

fn ingest_response(result: Result<IngestReport, MarkovError>) -> HttpResponse {
	match result {
		Ok(report) => HttpResponse::Ok().json(IngestBody {
			summary: format!("Loaded `{}` of data into server corpus!", format_size(report.bytes)),
			report,
		}),
		Err(e) => error_response(e),
	}
}

/// HTTP POST endpoint `/v1/communities/{community}/feed`
///
/// Copies feed item bodies into the corpus in one commit.
#[post("/v1/communities/{community}/feed")]
async fn post_feed(data: web::Data<SharedData>, path: web::Path<String>, body: web::Json<FeedRequest>) -> impl Responder {
	let id = community(&path);
	let Some(slot) = start_ingestion(&data, &id) else {
		return HttpResponse::Conflict().body("An ingestion is already running for this community");
	};
	info!(community = %id, items = body.items.len(), "feed ingestion started");
	let result = ingest_feed(data.engine.corpus().clone(), id, &body.items, slot.token.clone()).await;
	drop(slot);
	ingest_response(result)
}

/// HTTP POST endpoint `/v1/communities/{community}/history`
///
/// Copies prior channel messages into the corpus in one commit.
#[post("/v1/communities/{community}/history")]
async fn post_history(
	data: web::Data<SharedData>,
	path: web::Path<String>,
	body: web::Json<HistoryRequest>,
) -> impl Responder {
	let id = community(&path);
	let Some(slot) = start_ingestion(&data, &id) else {
		return HttpResponse::Conflict().body("An ingestion is already running for this community");
	};
	info!(community = %id, messages = body.messages.len(), "history ingestion started");
	let result = ingest_history(data.engine.corpus().clone(), id, &body.messages, slot.token.clone()).await;
	drop(slot);
	ingest_response(result)
}

/// Aborts the running ingestion of a community, if any.
#[delete("/v1/communities/{community}/ingestion")]
async fn delete_ingestion(data: web::Data<SharedData>, path: web::Path<String>) -> impl Responder {
	let id = community(&path);
	let token = data.ingestions.lock().unwrap_or_else(|e| e.into_inner()).get(&id).cloned();
	match token {
		Some(token) => {
			token.cancel();
			HttpResponse::Ok().body("Ingestion cancelled")
		}
		None => HttpResponse::NotFound().body("No ingestion running"),
	}
}

#[get("/v1/communities/{community}/settings")]
async fn get_settings(data: web::Data<SharedData>, path: web::Path<String>) -> impl Responder {
	match data.engine.corpus().settings().community(&community(&path)) {
		Ok(settings) => HttpResponse::Ok().json(settings),
		Err(e) => error_response(e),
	}
}

#[get("/v1/communities/{community}/settings/{name}")]
async fn get_setting(data: web::Data<SharedData>, path: web::Path<(String, String)>) -> impl Responder {
	let (id, name) = path.into_inner();
	match data.engine.corpus().settings().get_setting(&name, Some(&community(&id))) {
		Ok(value) => HttpResponse::Ok().json(value),
		Err(e) => error_response(e),
	}
}

#[put("/v1/communities/{community}/settings/{name}")]
async fn put_setting(
	data: web::Data<SharedData>,
	path: web::Path<(String, String)>,
	body: web::Json<SettingValue>,
) -> impl Responder {
	let (id, name) = path.into_inner();
	match data.engine.corpus().settings().set_setting(&name, body.into_inner(), Some(&community(&id))) {
		Ok(()) => HttpResponse::Ok().body(format!("Set {name}")),
		Err(e) => error_response(e),
	}
}

/// HTTP POST endpoint `/v1/communities/{community}/settings/{name}/toggle`
///
/// Flips a boolean option and reports the new state.
#[post("/v1/communities/{community}/settings/{name}/toggle")]
async fn post_toggle(data: web::Data<SharedData>, path: web::Path<(String, String)>) -> impl Responder {
	let (id, name) = path.into_inner();
	match data.engine.corpus().settings().toggle(&community(&id), &name) {
		Ok(value) => HttpResponse::Ok().json(value),
		Err(e) => error_response(e),
	}
}

#[put("/v1/communities/{community}/channels/{list}/{channel}")]
async fn put_channel(
	data: web::Data<SharedData>,
	path: web::Path<(String, ChannelList, String)>,
) -> impl Responder {
	let (id, list, channel) = path.into_inner();
	let channel = ChannelId::from(channel);
	match data.engine.corpus().settings().add_channel(&community(&id), list, &channel) {
		Ok(true) => HttpResponse::Ok().body(format!("Added <#{channel}>")),
		Ok(false) => HttpResponse::Ok().body(format!("<#{channel}> is already listed")),
		Err(e) => error_response(e),
	}
}

#[delete("/v1/communities/{community}/channels/{list}/{channel}")]
async fn delete_channel(
	data: web::Data<SharedData>,
	path: web::Path<(String, ChannelList, String)>,
) -> impl Responder {
	let (id, list, channel) = path.into_inner();
	let channel = ChannelId::from(channel);
	match data.engine.corpus().settings().remove_channel(&community(&id), list, &channel) {
		Ok(true) => HttpResponse::Ok().body(format!("Removed <#{channel}>")),
		Ok(false) => HttpResponse::Ok().body(format!("<#{channel}> is not listed")),
		Err(e) => error_response(e),
	}
}

#[get("/v1/settings/max_corpus")]
async fn get_max_corpus(data: web::Data<SharedData>) -> impl Responder {
	match data.engine.corpus().settings().get_setting(MAX_CORPUS, None) {
		Ok(value) => HttpResponse::Ok().json(value),
		Err(e) => error_response(e),
	}
}

#[put("/v1/settings/max_corpus")]
async fn put_max_corpus(data: web::Data<SharedData>, body: web::Json<u64>) -> impl Responder {
	let bytes = body.into_inner();
	match data.engine.corpus().settings().set_max_corpus(bytes) {
		Ok(()) => HttpResponse::Ok().body(format!("Max corpus size set to `{}`", format_size(bytes))),
		Err(e) => error_response(e),
	}
}

pub fn configure(cfg: &mut web::ServiceConfig) {
	cfg.service(post_message)
		.service(post_corpus)
		.service(delete_corpus)
		.service(get_usage)
		.service(post_feed)
		.service(post_history)
		.service(delete_ingestion)
		.service(get_settings)
		.service(get_setting)
		.service(put_setting)
		.service(post_toggle)
		.service(put_channel)
		.service(delete_channel)
		.service(get_max_corpus)
		.service(put_max_corpus);
}

#[cfg(test)]
mod tests {
	use std::future::Future;
	use std::sync::Arc;
	use std::task::{Context, Waker};

	use actix_web::http::StatusCode;
	use actix_web::{App, test};
	use rs_markov_core::config::MarkovConfig;
	use rs_markov_core::corpus::{CorpusStore, MemoryCorpusBackend};
	use rs_markov_core::settings::MemorySettingsStore;
	use serde_json::{Value, json};

	use super::*;

	fn shared_data(max: u64) -> web::Data<SharedData> {
		let settings = Arc::new(MemorySettingsStore::new(max));
		let corpus = Arc::new(CorpusStore::new(Arc::new(MemoryCorpusBackend::new()), settings, 2));
		web::Data::new(SharedData::new(ResponseEngine::new(corpus, MarkovConfig::default())))
	}

	fn message_body(channel: &str, content: &str) -> Value {
		json!({
			"message": {
				"community_id": "guild",
				"channel_id": channel,
				"author_id": "42",
				"author_name": "Alice",
				"content": content,
			},
			"bot": { "user_id": "bot", "display_name": "Markov" },
		})
	}

	#[actix_web::test]
	async fn mention_without_corpus_returns_guidance() {
		let app = test::init_service(App::new().app_data(shared_data(10_000)).configure(configure)).await;
		let req = test::TestRequest::post().uri("/v1/messages").set_json(message_body("general", "@Markov hi")).to_request();
		let body: Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body["outcome"], "replied");
		assert_eq!(body["guidance"], true);
	}

	#[actix_web::test]
	async fn learn_then_speak() {
		let app = test::init_service(App::new().app_data(shared_data(100_000)).configure(configure)).await;

		let req = test::TestRequest::put().uri("/v1/communities/guild/channels/learn/general").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

		let req = test::TestRequest::post()
			.uri("/v1/messages")
			.set_json(message_body("general", "hello world. hello universe."))
			.to_request();
		let body: Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body, json!({ "outcome": "learned", "corpus_lines": 2 }));

		let req = test::TestRequest::post().uri("/v1/messages").set_json(message_body("general", "@Markov hello")).to_request();
		let body: Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body["outcome"], "replied");
		assert!(body["text"].as_str().unwrap().starts_with("hello"));
		assert!(body["delay_secs"].as_f64().unwrap() > 0.0);
	}

	#[actix_web::test]
	async fn wipe_without_corpus_is_not_found() {
		let app = test::init_service(App::new().app_data(shared_data(10_000)).configure(configure)).await;
		let req = test::TestRequest::delete().uri("/v1/communities/guild/corpus").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

		let req = test::TestRequest::post().uri("/v1/communities/guild/corpus").set_payload("some text").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
		let req = test::TestRequest::delete().uri("/v1/communities/guild/corpus").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
	}

	#[actix_web::test]
	async fn overflow_is_payload_too_large() {
		let app = test::init_service(App::new().app_data(shared_data(1)).configure(configure)).await;
		let req = test::TestRequest::post().uri("/v1/communities/guild/corpus").set_payload("too big").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::PAYLOAD_TOO_LARGE);

		let req = test::TestRequest::get().uri("/v1/communities/guild/usage").to_request();
		let body = test::call_and_read_body(&app, req).await;
		assert_eq!(body, "You have used `0.0B` of your `1.0B` allowance (`0%`)");
	}

	#[actix_web::test]
	async fn feed_ingestion_reports_loaded_size() {
		let app = test::init_service(App::new().app_data(shared_data(100_000)).configure(configure)).await;
		let req = test::TestRequest::post()
			.uri("/v1/communities/guild/feed")
			.set_json(json!({ "items": ["<p>Breaking news today</p>", "<p>Weather is fine</p>"] }))
			.to_request();
		let body: Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body["items"], 2);
		assert!(body["summary"].as_str().unwrap().starts_with("Loaded `"));
	}

	#[actix_web::test]
	async fn settings_by_name() {
		let app = test::init_service(App::new().app_data(shared_data(10_000)).configure(configure)).await;

		let req = test::TestRequest::put().uri("/v1/communities/guild/settings/mention").set_json(json!(true)).to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
		let req = test::TestRequest::get().uri("/v1/communities/guild/settings/mention").to_request();
		let body: Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body, json!(true));

		let req = test::TestRequest::post().uri("/v1/communities/guild/settings/solo/toggle").to_request();
		let body: Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body, json!(true));

		let req = test::TestRequest::get().uri("/v1/communities/guild/settings/volume").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

		let req = test::TestRequest::put().uri("/v1/settings/max_corpus").set_json(json!(2048)).to_request();
		let body = test::call_and_read_body(&app, req).await;
		assert_eq!(body, "Max corpus size set to `2.0KiB`");
	}

	fn registered(data: &SharedData) -> bool {
		data.ingestions.lock().unwrap().contains_key(&CommunityId::from("guild"))
	}

	#[actix_web::test]
	async fn dropped_ingestion_request_frees_the_slot() {
		let data = shared_data(10_000_000);
		let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
		let items: Vec<String> = (0..500).map(|i| format!("<p>story number {i}</p>")).collect();

		{
			let req = test::TestRequest::post()
				.uri("/v1/communities/guild/feed")
				.set_json(json!({ "items": items }))
				.to_request();
			let mut pending = std::pin::pin!(test::call_service(&app, req));
			let mut cx = Context::from_waker(Waker::noop());
			for _ in 0..50 {
				assert!(pending.as_mut().poll(&mut cx).is_pending());
				if registered(&data) {
					break;
				}
			}
			assert!(registered(&data));
		}
		assert!(!registered(&data));

		let req = test::TestRequest::post()
			.uri("/v1/communities/guild/feed")
			.set_json(json!({ "items": ["<p>fresh start</p>"] }))
			.to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
		assert!(!registered(&data));
	}

	#[actix_web::test]
	async fn cancelling_without_ingestion_is_not_found() {
		let app = test::init_service(App::new().app_data(shared_data(10_000)).configure(configure)).await;
		let req = test::TestRequest::delete().uri("/v1/communities/guild/ingestion").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
	}
}
