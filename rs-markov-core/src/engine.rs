use std::sync::Arc;
use std::time::Duration;

use rand::seq::IndexedRandom;
use tracing::debug;

use crate::config::MarkovConfig;
use crate::corpus::CorpusStore;
use crate::error::MarkovError;
use crate::model::MarkovModel;
use crate::policy::{Action, ChannelPolicy};
use crate::sanitize::sanitize;
use crate::settings::CommunitySettings;
use crate::types::{BotIdentity, CommunityId, IncomingMessage};

/// Sent when a community has no corpus to speak from yet.
pub const GUIDANCE_MESSAGE: &str =
	"Use `!markov messages` or `!markov rss` to build a corpus, or add a learning channel";

/// Text to send back, with an optional typing delay the transport should
/// wait before delivering it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
	pub text: String,
	pub delay: Option<Duration>,
	/// `true` when `text` is [`GUIDANCE_MESSAGE`] rather than generated text.
	pub guidance: bool,
}

/// Result of handling one incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	Ignored,
	/// The message was merged into the corpus.
	/// Learned; `corpus_lines` is the size of the corpus afterwards.
	Learned { corpus_lines: usize },
	/// The message was meant for learning but yielded no lines or did not
	/// fit the allowance. Learning is best effort, so this is not an error.
	LearnDropped,
	Replied(Reply),
}

/// Turns incoming messages into corpus updates and replies.
pub struct ResponseEngine {
	corpus: Arc<CorpusStore>,
	config: MarkovConfig,
}

impl ResponseEngine {
	pub fn new(corpus: Arc<CorpusStore>, config: MarkovConfig) -> Self {
		Self { corpus, config }
	}

	pub fn corpus(&self) -> &Arc<CorpusStore> {
		&self.corpus
	}

	pub fn config(&self) -> &MarkovConfig {
		&self.config
	}

	/// Classifies a message with the community's settings and acts on it.
	///
	/// # Errors
	/// Only storage faults; expected conditions become an [`Outcome`].
	pub async fn handle(&self, message: &IncomingMessage, me: &BotIdentity) -> Result<Outcome, MarkovError> {
		let settings = self.corpus.settings().community(&message.community_id)?;
		let action = ChannelPolicy::new(&settings, &self.config.command_prefixes, self.config.solo_chance)
			.classify(message, me);
		self.act(action, message, me, &settings).await
	}

	/// Carries out an already decided action.
	pub async fn act(
		&self,
		action: Action,
		message: &IncomingMessage,
		me: &BotIdentity,
		settings: &CommunitySettings,
	) -> Result<Outcome, MarkovError> {
		match action {
			Action::Ignore => Ok(Outcome::Ignored),
			Action::Learn => match self.learn(&message.community_id, &message.content).await {
				Ok(model) => Ok(Outcome::Learned { corpus_lines: model.line_count() }),
				Err(e @ (MarkovError::EmptyCorpus | MarkovError::CorpusOverflow { .. })) => {
					debug!(community = %message.community_id, error = %e, "message not learned");
					Ok(Outcome::LearnDropped)
				}
				Err(e) => Err(e),
			},
			Action::Speak => Ok(Outcome::Replied(self.speak(message, me, settings).await?)),
		}
	}

	/// Sanitizes `raw` and appends it to the community's corpus.
	pub async fn learn(&self, community: &CommunityId, raw: &str) -> Result<Arc<MarkovModel>, MarkovError> {
		let mut text = sanitize(raw);
		text.push('\n');
		self.corpus.append(community, &text).await
	}

	/// Generates a reply to `message`.
	///
	/// The seed is a random word of the message once the bot's mention is
	/// removed, or the author's name if nothing is left. Seeded generation
	/// falls back to unconstrained generation, then to [`GUIDANCE_MESSAGE`].
	pub async fn speak(
		&self,
		message: &IncomingMessage,
		me: &BotIdentity,
		settings: &CommunitySettings,
	) -> Result<Reply, MarkovError> {
		let model = self.corpus.model(&message.community_id).await?;
		let seed = pick_seed(&message.content.replace(&me.mention(), ""), &message.author_name);
		let max_len = self.config.response_max_chars;

		let generated = tokio::task::spawn_blocking(move || {
			model.generate_from(&seed, max_len).or_else(|| model.generate_short(max_len))
		})
		.await?;

		let Some(mut text) = generated else {
			return Ok(Reply { text: GUIDANCE_MESSAGE.to_owned(), delay: None, guidance: true });
		};

		if settings.mention {
			text.insert_str(0, &self.config.mention_template.replace("{user_id}", message.author_id.as_str()));
		}
		let delay = settings.typing_delay.then(|| self.config.typing_delay(text.chars().count()));
		Ok(Reply { text, delay, guidance: false })
	}
}

/// A uniformly random word of `content`, or `fallback` if it has none.
fn pick_seed(content: &str, fallback: &str) -> String {
	let words: Vec<&str> = content.split_whitespace().collect();
	words.choose(&mut rand::rng()).map_or_else(|| fallback.to_owned(), |w| (*w).to_owned())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::corpus::MemoryCorpusBackend;
	use crate::settings::{ChannelList, MENTION, MemorySettingsStore, SOLO, SettingsStore, TYPING_DELAY};
	use crate::types::{ChannelId, UserId};

	fn engine_with_max(max: u64) -> ResponseEngine {
		let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new(max));
		let corpus = Arc::new(CorpusStore::new(Arc::new(MemoryCorpusBackend::new()), settings, 2));
		ResponseEngine::new(corpus, MarkovConfig::default())
	}

	fn me() -> BotIdentity {
		BotIdentity { user_id: UserId::from("bot"), display_name: "Markov".to_owned() }
	}

	fn guild() -> CommunityId {
		CommunityId::from("guild")
	}

	fn message(channel: &str, content: &str) -> IncomingMessage {
		IncomingMessage {
			community_id: guild(),
			channel_id: ChannelId::from(channel),
			author_id: UserId::from("42"),
			author_name: "Alice".to_owned(),
			content: content.to_owned(),
		}
	}

	fn settings_of(engine: &ResponseEngine) -> &Arc<dyn SettingsStore> {
		engine.corpus().settings()
	}

	#[test]
	fn seed_falls_back_to_author_name() {
		assert_eq!(pick_seed("", "Alice"), "Alice");
		assert_eq!(pick_seed("   ", "Alice"), "Alice");
		let seed = pick_seed("red green blue", "Alice");
		assert!(["red", "green", "blue"].contains(&seed.as_str()));
	}

	#[tokio::test]
	async fn empty_corpus_replies_with_guidance() {
		let engine = engine_with_max(10_000);
		let outcome = engine.handle(&message("general", "@Markov hello"), &me()).await.unwrap();
		let Outcome::Replied(reply) = outcome else { panic!("expected a reply, got {outcome:?}") };
		assert!(reply.guidance);
		assert_eq!(reply.text, GUIDANCE_MESSAGE);
		assert_eq!(reply.delay, None);
	}

	#[tokio::test]
	async fn learned_text_is_spoken_back() {
		let engine = engine_with_max(100_000);
		settings_of(&engine).add_channel(&guild(), ChannelList::Learn, &ChannelId::from("general")).unwrap();
		settings_of(&engine).set_setting(TYPING_DELAY, false.into(), Some(&guild())).unwrap();

		let outcome = engine.handle(&message("general", "hello world. hello universe."), &me()).await.unwrap();
		assert_eq!(outcome, Outcome::Learned { corpus_lines: 2 });
		assert!(engine.corpus().usage_bytes(&guild()).unwrap() > 0);

		let outcome = engine.handle(&message("random", "@Markov hello"), &me()).await.unwrap();
		let Outcome::Replied(reply) = outcome else { panic!("expected a reply, got {outcome:?}") };
		assert!(!reply.guidance);
		assert!(reply.text.starts_with("hello"), "{}", reply.text);
		assert_eq!(reply.delay, None);
	}

	#[tokio::test]
	async fn mention_back_and_typing_delay() {
		let engine = engine_with_max(100_000);
		engine.learn(&guild(), "cats purr loudly").await.unwrap();
		settings_of(&engine).set_setting(MENTION, true.into(), Some(&guild())).unwrap();

		let outcome = engine.handle(&message("general", "@Markov cats"), &me()).await.unwrap();
		let Outcome::Replied(reply) = outcome else { panic!("expected a reply, got {outcome:?}") };
		assert_eq!(reply.text, "<@42> cats purr loudly");
		let expected = 0.05 * reply.text.chars().count() as f64;
		assert!((reply.delay.unwrap().as_secs_f64() - expected).abs() < 1e-9);
	}

	#[tokio::test]
	async fn unknown_seed_falls_back_to_short_generation() {
		let engine = engine_with_max(100_000);
		engine.learn(&guild(), "dogs bark at night").await.unwrap();
		let settings = CommunitySettings::default();
		let reply = engine.speak(&message("general", "@Markov zebras"), &me(), &settings).await.unwrap();
		assert_eq!(reply.text, "dogs bark at night");
	}

	#[tokio::test]
	async fn overflowing_learn_is_dropped_silently() {
		let engine = engine_with_max(1);
		settings_of(&engine).add_channel(&guild(), ChannelList::Learn, &ChannelId::from("general")).unwrap();
		let outcome = engine.handle(&message("general", "this will not fit"), &me()).await.unwrap();
		assert_eq!(outcome, Outcome::LearnDropped);
		assert_eq!(engine.corpus().usage_bytes(&guild()).unwrap(), 0);
	}

	#[tokio::test]
	async fn blank_learn_is_dropped_silently() {
		let engine = engine_with_max(100_000);
		settings_of(&engine).add_channel(&guild(), ChannelList::Learn, &ChannelId::from("general")).unwrap();
		let outcome = engine.handle(&message("general", "<b></b>"), &me()).await.unwrap();
		assert_eq!(outcome, Outcome::LearnDropped);
	}

	#[tokio::test]
	async fn solo_mode_without_learn_channel_can_only_speak_or_ignore() {
		let engine = engine_with_max(100_000);
		settings_of(&engine).toggle(&guild(), SOLO).unwrap();
		for _ in 0..20 {
			let outcome = engine.handle(&message("general", "just chatting"), &me()).await.unwrap();
			assert!(matches!(outcome, Outcome::Ignored | Outcome::Replied(_)), "{outcome:?}");
		}
	}
}
