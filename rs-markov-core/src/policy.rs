use rand::Rng;
use serde::Serialize;

use crate::settings::CommunitySettings;
use crate::types::{BotIdentity, IncomingMessage};

/// What to do with an incoming message.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
	Ignore,
	Learn,
	Speak,
}

/// Decides, per community, whether a message is learned from, answered or ignored.
///
/// Never fails: every message maps to exactly one [`Action`].
#[derive(Debug, Clone, Copy)]
pub struct ChannelPolicy<'a> {
	settings: &'a CommunitySettings,
	command_prefixes: &'a [String],
	solo_chance: f64,
}

impl<'a> ChannelPolicy<'a> {
	pub fn new(settings: &'a CommunitySettings, command_prefixes: &'a [String], solo_chance: f64) -> Self {
		Self { settings, command_prefixes, solo_chance }
	}

	/// Whether a message may be used at all: not from the bot, not empty,
	/// not a command.
	pub fn is_valid_message(&self, message: &IncomingMessage, me: &BotIdentity) -> bool {
		if message.author_id == me.user_id || message.content.is_empty() {
			return false;
		}
		!self.command_prefixes.iter().any(|p| !p.is_empty() && message.content.starts_with(p.as_str()))
	}

	/// Classifies a message, rolling the solo-speak dice with the thread RNG.
	pub fn classify(&self, message: &IncomingMessage, me: &BotIdentity) -> Action {
		self.classify_with_roll(message, me, rand::rng().random::<f64>())
	}

	/// Classifies a message with a given roll in `[0, 1)`.
	///
	/// First match wins:
	/// 1. invalid message → `Ignore`
	/// 2. mentioned, or solo mode and `roll < solo_chance` → triggered
	/// 3. triggered: `Speak` unless a speak allow-list excludes the channel
	/// 4. otherwise `Learn` in learn channels while `toggle` is on, `Ignore` elsewhere
	pub fn classify_with_roll(&self, message: &IncomingMessage, me: &BotIdentity, roll: f64) -> Action {
		if !self.is_valid_message(message, me) {
			return Action::Ignore;
		}

		let triggered =
			message.content.contains(&me.mention()) || (self.settings.solo && roll < self.solo_chance);

		if triggered {
			let speak = &self.settings.speak_channels;
			if !speak.is_empty() && !speak.contains(&message.channel_id) {
				return Action::Ignore;
			}
			return Action::Speak;
		}

		if self.settings.toggle && self.settings.learn_channels.contains(&message.channel_id) {
			Action::Learn
		} else {
			Action::Ignore
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{ChannelId, CommunityId, UserId};

	fn me() -> BotIdentity {
		BotIdentity { user_id: UserId::from("bot"), display_name: "Markov".to_owned() }
	}

	fn message(channel: &str, content: &str) -> IncomingMessage {
		IncomingMessage {
			community_id: CommunityId::from("guild"),
			channel_id: ChannelId::from(channel),
			author_id: UserId::from("alice"),
			author_name: "Alice".to_owned(),
			content: content.to_owned(),
		}
	}

	fn prefixes() -> Vec<String> {
		vec!["!".to_owned()]
	}

	#[test]
	fn ignores_self_empty_and_commands() {
		let settings = CommunitySettings::default();
		let prefixes = prefixes();
		let policy = ChannelPolicy::new(&settings, &prefixes, 0.1);

		let mut own = message("general", "@Markov hi");
		own.author_id = UserId::from("bot");
		assert_eq!(policy.classify_with_roll(&own, &me(), 0.0), Action::Ignore);
		assert_eq!(policy.classify_with_roll(&message("general", ""), &me(), 0.0), Action::Ignore);
		assert_eq!(policy.classify_with_roll(&message("general", "!markov usage @Markov"), &me(), 0.0), Action::Ignore);
	}

	#[test]
	fn mention_speaks_everywhere_without_speak_list() {
		let settings = CommunitySettings::default();
		let prefixes = prefixes();
		let policy = ChannelPolicy::new(&settings, &prefixes, 0.1);
		for channel in ["general", "random", "memes"] {
			assert_eq!(policy.classify_with_roll(&message(channel, "hey @Markov"), &me(), 0.99), Action::Speak);
		}
	}

	#[test]
	fn speak_list_restricts_replies() {
		let mut settings = CommunitySettings::default();
		settings.speak_channels.insert(ChannelId::from("bots"));
		let prefixes = prefixes();
		let policy = ChannelPolicy::new(&settings, &prefixes, 0.1);
		assert_eq!(policy.classify_with_roll(&message("bots", "@Markov hi"), &me(), 0.5), Action::Speak);
		assert_eq!(policy.classify_with_roll(&message("general", "@Markov hi"), &me(), 0.5), Action::Ignore);
	}

	#[test]
	fn unmentioned_messages_learn_only_in_learn_channels() {
		let mut settings = CommunitySettings::default();
		settings.learn_channels.insert(ChannelId::from("general"));
		let prefixes = prefixes();
		let policy = ChannelPolicy::new(&settings, &prefixes, 0.1);
		assert_eq!(policy.classify_with_roll(&message("general", "nice weather"), &me(), 0.0), Action::Learn);
		for roll in [0.0, 0.05, 0.5, 0.99] {
			assert_eq!(policy.classify_with_roll(&message("random", "nice weather"), &me(), roll), Action::Ignore);
		}
	}

	#[test]
	fn solo_mode_speaks_on_low_rolls() {
		let mut settings = CommunitySettings::default();
		settings.solo = true;
		settings.learn_channels.insert(ChannelId::from("general"));
		let prefixes = prefixes();
		let policy = ChannelPolicy::new(&settings, &prefixes, 0.1);
		assert_eq!(policy.classify_with_roll(&message("general", "nice weather"), &me(), 0.05), Action::Speak);
		assert_eq!(policy.classify_with_roll(&message("general", "nice weather"), &me(), 0.10), Action::Learn);
	}

	#[test]
	fn toggle_off_pauses_learning_only() {
		let mut settings = CommunitySettings::default();
		settings.toggle = false;
		settings.learn_channels.insert(ChannelId::from("general"));
		let prefixes = prefixes();
		let policy = ChannelPolicy::new(&settings, &prefixes, 0.1);
		assert_eq!(policy.classify(&message("general", "@Markov hi"), &me()), Action::Speak);
		assert_eq!(policy.classify(&message("general", "hi"), &me()), Action::Ignore);
	}
}
